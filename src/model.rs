use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cookies::CookieJar;

/// Composite key of one archived unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupKey {
    pub source_key: String,
    pub id: String,
}

impl BackupKey {
    pub fn new(source_key: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            source_key: source_key.into(),
            id: id.into(),
        }
    }

    /// Parses the `{sourceKey}-{id}` form used in deep links. The source key
    /// never contains `-`, so the first dash separates the two parts.
    pub fn parse(raw: &str) -> Option<Self> {
        let (source_key, id) = raw.split_once('-')?;
        if source_key.is_empty() || id.is_empty() {
            return None;
        }
        Some(Self::new(source_key, id))
    }
}

impl fmt::Display for BackupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.source_key, self.id)
    }
}

/// A published mirror page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub url: String,
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Image,
    Video,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupFile {
    #[serde(rename = "type")]
    pub kind: FileKind,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded: Option<String>,
}

impl BackupFile {
    /// The uploaded copy wins over the original source.
    pub fn url(&self) -> &str {
        self.uploaded.as_deref().unwrap_or(&self.source)
    }
}

/// In-memory archive tree node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupResult {
    pub source_key: String,
    pub id: String,
    pub source: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(default)]
    pub pages: Vec<Page>,
    #[serde(default)]
    pub files: Vec<BackupFile>,
    #[serde(default)]
    pub reposted: Vec<BackupResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_data: Option<String>,
    /// Not yet durably saved. Never persisted.
    #[serde(default, skip_serializing)]
    pub just_created: bool,
}

impl BackupResult {
    pub fn key(&self) -> BackupKey {
        BackupKey::new(&self.source_key, &self.id)
    }

    /// Number of nodes in the tree rooted here.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.reposted.iter());
        }
        count
    }
}

/// On-disk form of one node: children are referenced by key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupEntity {
    pub source_key: String,
    pub id: String,
    pub source: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(default)]
    pub pages: Vec<Page>,
    #[serde(default)]
    pub files: Vec<BackupFile>,
    #[serde(default)]
    pub reposted: Vec<BackupKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_data: Option<String>,
}

impl BackupEntity {
    /// Flattens one node, keeping only the keys of its children.
    pub fn from_node(node: &BackupResult) -> Self {
        Self {
            source_key: node.source_key.clone(),
            id: node.id.clone(),
            source: node.source.clone(),
            content: node.content.clone(),
            author_name: node.author_name.clone(),
            pages: node.pages.clone(),
            files: node.files.clone(),
            reposted: node.reposted.iter().map(BackupResult::key).collect(),
            other_data: node.other_data.clone(),
        }
    }

    pub fn key(&self) -> BackupKey {
        BackupKey::new(&self.source_key, &self.id)
    }

    pub fn into_result(self, reposted: Vec<BackupResult>) -> BackupResult {
        BackupResult {
            source_key: self.source_key,
            id: self.id,
            source: self.source,
            content: self.content,
            author_name: self.author_name,
            pages: self.pages,
            files: self.files,
            reposted,
            other_data: self.other_data,
            just_created: false,
        }
    }
}

/// Storage bucket settings shared through a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageSettings {
    pub access_point: String,
    pub account_id: String,
    pub bucket: String,
    pub region: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TelegraphAccount {
    pub access_token: String,
    pub short_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_url: Option<String>,
}

/// Per-user settings record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigEntity {
    #[serde(rename = "userID")]
    pub user_id: i64,
    pub telegraph_account: TelegraphAccount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    is_owner: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    share_group: Option<String>,
    #[serde(default, rename = "awsS3", skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies: Option<CookieJar>,
}

impl ConfigEntity {
    pub fn new(user_id: i64, telegraph_account: TelegraphAccount) -> Self {
        Self {
            user_id,
            telegraph_account,
            is_owner: None,
            share_group: None,
            storage: None,
            cookies: None,
        }
    }

    pub fn share_group(&self) -> Option<&str> {
        self.share_group.as_deref()
    }

    pub fn is_owner(&self) -> bool {
        self.share_group.is_some() && self.is_owner == Some(true)
    }

    pub fn join_group(&mut self, group_id: &str) {
        self.share_group = Some(group_id.to_string());
        self.is_owner = None;
    }

    pub fn become_owner(&mut self, group_id: &str) {
        self.share_group = Some(group_id.to_string());
        self.is_owner = Some(true);
    }

    /// Membership fields are always cleared together.
    pub fn leave_group(&mut self) {
        self.share_group = None;
        self.is_owner = None;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareGroupEntity {
    pub id: String,
    /// Hex SHA-256 of the group password.
    pub password: String,
    #[serde(rename = "creatorID")]
    pub creator_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn account() -> TelegraphAccount {
        TelegraphAccount {
            access_token: "tok".into(),
            short_name: "1".into(),
            author_name: None,
            author_url: None,
        }
    }

    #[test]
    fn backup_key_parse() {
        assert_eq!(BackupKey::parse("weibo-123"), Some(BackupKey::new("weibo", "123")));
        assert_eq!(BackupKey::parse("weibo-a-b"), Some(BackupKey::new("weibo", "a-b")));
        assert_eq!(BackupKey::parse("weibo"), None);
        assert_eq!(BackupKey::parse("-1"), None);
        assert_eq!(BackupKey::new("zhihu", "9").to_string(), "zhihu-9");
    }

    #[test]
    fn config_omits_absent_fields() {
        let cfg = ConfigEntity::new(7, account());
        let value = serde_json::to_value(&cfg).unwrap();
        assert_eq!(value["userID"], json!(7));
        let obj = value.as_object().unwrap();
        assert!(!obj.contains_key("isOwner"));
        assert!(!obj.contains_key("shareGroup"));
        assert!(!obj.contains_key("awsS3"));
    }

    #[test]
    fn membership_fields_move_together() {
        let mut cfg = ConfigEntity::new(7, account());
        cfg.become_owner("team");
        assert!(cfg.is_owner());
        assert_eq!(cfg.share_group(), Some("team"));
        cfg.join_group("other");
        assert!(!cfg.is_owner());
        cfg.leave_group();
        assert_eq!(cfg.share_group(), None);
        assert!(!cfg.is_owner());
    }

    #[test]
    fn entity_keeps_child_keys_only() {
        let child = BackupResult {
            source_key: "weibo".into(),
            id: "2".into(),
            source: "https://example.com/2".into(),
            content: "child".into(),
            author_name: None,
            pages: vec![],
            files: vec![],
            reposted: vec![],
            other_data: None,
            just_created: true,
        };
        let mut parent = child.clone();
        parent.id = "1".into();
        parent.reposted = vec![child];
        let entity = BackupEntity::from_node(&parent);
        assert_eq!(entity.reposted, vec![BackupKey::new("weibo", "2")]);
        let value = serde_json::to_value(&parent).unwrap();
        assert!(value.get("justCreated").is_none());
        assert_eq!(parent.node_count(), 2);
    }
}
