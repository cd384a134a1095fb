//! Password-protected share groups and the settings their members pool.
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::SeedableRng;
use regex::Regex;
use serde_json::json;
use std::sync::{Arc, Mutex};
use tracing::{info, instrument, warn};

use crate::cookies::{CookieJar, CookiePool};
use crate::error::ShareError;
use crate::model::{ConfigEntity, ShareGroupEntity, StorageSettings};
use crate::store::{
    from_record, key_of, to_record, Store, StoreError, Tables, SHARE_GROUP_INDEX,
};
use crate::telegraph::Telegraph;
use crate::util::{hash_password, shuffle};

static GROUP_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,32}$").expect("valid group name regex"));

pub fn validate_group_name(name: &str) -> Result<(), ShareError> {
    if GROUP_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(ShareError::InvalidInput(
            "分享组名称只能包含字母、数字、下划线和连字符，且不超过 32 个字符".into(),
        ))
    }
}

pub fn validate_password(password: &str) -> Result<(), ShareError> {
    let len = password.chars().count();
    if (6..=64).contains(&len) && !password.chars().any(char::is_whitespace) {
        Ok(())
    } else {
        Err(ShareError::InvalidInput(
            "密码长度需为 6 到 64 个字符，且不能包含空白".into(),
        ))
    }
}

/// Settings resolved once per request from the caller and their group.
#[derive(Debug, Clone, Default)]
pub struct SharedSettings {
    pub cookies: CookiePool,
    pub storage: Option<StorageSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareStatus {
    None,
    Member(String),
    Owner(String),
    /// The config pointed at a group that no longer exists; membership has
    /// been cleared in memory.
    Orphaned(String),
}

pub struct ShareGroupRegistry {
    store: Arc<dyn Store>,
    tables: Tables,
    rng: Mutex<StdRng>,
}

impl ShareGroupRegistry {
    pub fn new(store: Arc<dyn Store>, tables: Tables) -> Self {
        Self::with_rng(store, tables, StdRng::from_os_rng())
    }

    /// Deterministic member order for tests.
    pub fn with_seed(store: Arc<dyn Store>, tables: Tables, seed: u64) -> Self {
        Self::with_rng(store, tables, StdRng::seed_from_u64(seed))
    }

    fn with_rng(store: Arc<dyn Store>, tables: Tables, rng: StdRng) -> Self {
        Self {
            store,
            tables,
            rng: Mutex::new(rng),
        }
    }

    pub async fn config(&self, user_id: i64) -> Result<Option<ConfigEntity>, StoreError> {
        let key = key_of([("userID", json!(user_id))]);
        match self.store.get(&self.tables.configs, &key).await? {
            Some(record) => Ok(Some(from_record(record)?)),
            None => Ok(None),
        }
    }

    pub async fn put_config(&self, config: &ConfigEntity) -> Result<(), StoreError> {
        self.store
            .put(&self.tables.configs, to_record(config)?)
            .await
    }

    /// Loads the caller's config, creating and saving it with a fresh
    /// Telegraph account on first contact.
    #[instrument(skip_all, fields(user_id = user_id))]
    pub async fn get_or_create_config(
        &self,
        user_id: i64,
        telegraph: &dyn Telegraph,
    ) -> Result<ConfigEntity> {
        if let Some(config) = self.config(user_id).await? {
            return Ok(config);
        }
        let account = telegraph
            .create_account(&user_id.to_string())
            .await
            .context("failed to create telegraph account")?;
        let config = ConfigEntity::new(user_id, account);
        self.put_config(&config).await?;
        info!("created config");
        Ok(config)
    }

    pub async fn group(&self, group_id: &str) -> Result<Option<ShareGroupEntity>, StoreError> {
        let key = key_of([("id", json!(group_id))]);
        match self.store.get(&self.tables.share_groups, &key).await? {
            Some(record) => Ok(Some(from_record(record)?)),
            None => Ok(None),
        }
    }

    async fn members(&self, group_id: &str) -> Result<Vec<ConfigEntity>, StoreError> {
        let records = self
            .store
            .index_query(&self.tables.configs, SHARE_GROUP_INDEX, &json!(group_id))
            .await?;
        records.into_iter().map(from_record).collect()
    }

    /// The caller's group if it still exists. A config left pointing at a
    /// deleted group is cleared in memory.
    async fn live_group(&self, config: &mut ConfigEntity) -> Result<Option<String>, StoreError> {
        let Some(group_id) = config.share_group().map(str::to_string) else {
            return Ok(None);
        };
        if self.group(&group_id).await?.is_some() {
            return Ok(Some(group_id));
        }
        warn!(group_id = %group_id, "clearing membership of a missing share group");
        config.leave_group();
        Ok(None)
    }

    /// Clears every config other than `keep` that still points at
    /// `group_id`.
    async fn clear_members(&self, group_id: &str, keep: i64) -> Result<usize, StoreError> {
        let mut cleared = Vec::new();
        for mut member in self.members(group_id).await? {
            if member.user_id == keep {
                continue;
            }
            member.leave_group();
            cleared.push(to_record(&member)?);
        }
        let count = cleared.len();
        self.store.put_batch(&self.tables.configs, cleared).await?;
        Ok(count)
    }

    /// Creates the group with the caller as owner, or rotates its password
    /// when the caller already owns it. Only group records and stale
    /// members are written; the caller saves `config`.
    #[instrument(skip_all, fields(user_id = config.user_id, group_id = group_id))]
    pub async fn create(
        &self,
        config: &mut ConfigEntity,
        group_id: &str,
        password: &str,
    ) -> Result<(), ShareError> {
        validate_group_name(group_id)?;
        validate_password(password)?;
        match self.live_group(config).await?.as_deref() {
            Some(current) if current != group_id => {
                return Err(ShareError::Conflict("你已经在其他分享组中，请先退出"))
            }
            Some(_) if !config.is_owner() => {
                return Err(ShareError::Unauthorized("只有分享组的创建者可以修改密码"))
            }
            _ => {}
        }
        match self.group(group_id).await? {
            Some(existing) if existing.creator_id != config.user_id => {
                return Err(ShareError::Unauthorized("该分享组名称已被占用"));
            }
            Some(_) => {}
            None => {
                // Leftovers of an interrupted dissolve must not join the new group.
                let stale = self.clear_members(group_id, config.user_id).await?;
                if stale > 0 {
                    warn!(stale, "cleared stale members before creating group");
                }
            }
        }
        let group = ShareGroupEntity {
            id: group_id.to_string(),
            password: hash_password(password),
            creator_id: config.user_id,
        };
        self.store
            .put(&self.tables.share_groups, to_record(&group)?)
            .await?;
        config.become_owner(group_id);
        info!("share group created");
        Ok(())
    }

    /// Joins on a matching password. On rejection `config` only loses a
    /// membership whose group no longer exists.
    #[instrument(skip_all, fields(user_id = config.user_id, group_id = group_id))]
    pub async fn join(
        &self,
        config: &mut ConfigEntity,
        group_id: &str,
        password: &str,
    ) -> Result<(), ShareError> {
        validate_group_name(group_id)?;
        match self.live_group(config).await?.as_deref() {
            Some(current) if current == group_id => return Ok(()),
            Some(_) => return Err(ShareError::Conflict("你已经在其他分享组中，请先退出")),
            None => {}
        }
        let group = self.group(group_id).await?;
        match group {
            Some(group) if group.password == hash_password(password) => {
                config.join_group(group_id);
                info!("joined share group");
                Ok(())
            }
            _ => {
                warn!("share group join rejected");
                Err(ShareError::Unauthorized("分享组名称或密码错误"))
            }
        }
    }

    /// Leaves the caller's group. An owner must confirm with the password,
    /// which dissolves the group and clears every other member. The caller
    /// saves `config`.
    #[instrument(skip_all, fields(user_id = config.user_id))]
    pub async fn leave(
        &self,
        config: &mut ConfigEntity,
        password: Option<&str>,
    ) -> Result<(), ShareError> {
        let Some(group_id) = config.share_group().map(str::to_string) else {
            return Err(ShareError::InvalidInput("你不在任何分享组中".into()));
        };
        if !config.is_owner() {
            config.leave_group();
            info!(group_id = %group_id, "left share group");
            return Ok(());
        }

        let Some(group) = self.group(&group_id).await? else {
            warn!(group_id = %group_id, "owned group already gone; clearing membership");
            config.leave_group();
            return Ok(());
        };
        let Some(password) = password else {
            return Err(ShareError::InvalidInput(
                "你是分享组的创建者，解散分享组需要提供密码".into(),
            ));
        };
        if group.password != hash_password(password) {
            return Err(ShareError::Unauthorized("密码错误"));
        }

        self.store
            .delete_item(&self.tables.share_groups, &key_of([("id", json!(group_id))]))
            .await?;
        let count = self.clear_members(&group_id, config.user_id).await?;
        config.leave_group();
        info!(group_id = %group_id, cleared = count, "share group dissolved");
        Ok(())
    }

    /// Reports membership, clearing it in memory when the group is gone.
    pub async fn status(&self, config: &mut ConfigEntity) -> Result<ShareStatus, ShareError> {
        let Some(group_id) = config.share_group().map(str::to_string) else {
            return Ok(ShareStatus::None);
        };
        if self.group(&group_id).await?.is_none() {
            config.leave_group();
            return Ok(ShareStatus::Orphaned(group_id));
        }
        Ok(if config.is_owner() {
            ShareStatus::Owner(group_id)
        } else {
            ShareStatus::Member(group_id)
        })
    }

    /// Cookie jars and storage settings of the caller's group in a freshly
    /// shuffled member order. Without a live group only the caller's own
    /// settings are used.
    #[instrument(skip_all, fields(user_id = config.user_id))]
    pub async fn pool_settings(&self, config: &ConfigEntity) -> Result<SharedSettings, StoreError> {
        let mut configs = match config.share_group() {
            None => vec![config.clone()],
            Some(group_id) if self.group(group_id).await?.is_none() => {
                warn!(group_id = %group_id, "config points at a missing share group");
                vec![config.clone()]
            }
            Some(group_id) => {
                let mut members = self.members(group_id).await?;
                if !members.iter().any(|m| m.user_id == config.user_id) {
                    members.push(config.clone());
                }
                members
            }
        };
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| {
            warn!("member shuffle rng lock was poisoned");
            poisoned.into_inner()
        });
        shuffle(&mut configs, &mut *rng);
        drop(rng);
        Ok(pool_from(configs))
    }
}

/// Jars in member order; the first member with storage settings wins.
pub fn pool_from(configs: Vec<ConfigEntity>) -> SharedSettings {
    let mut jars: Vec<CookieJar> = Vec::new();
    let mut storage = None;
    for c in configs {
        if let Some(jar) = c.cookies {
            jars.push(jar);
        }
        if storage.is_none() {
            storage = c.storage;
        }
    }
    SharedSettings {
        cookies: CookiePool::new(jars),
        storage,
    }
}
