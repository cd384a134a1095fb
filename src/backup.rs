//! Persistence of archive trees as flat, key-referenced records.
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::model::{BackupEntity, BackupKey, BackupResult};
use crate::store::{from_record, key_of, to_record, Record, Store, StoreError, Table};

#[derive(Clone)]
pub struct BackupStore {
    store: Arc<dyn Store>,
    table: Table,
}

fn key_record(key: &BackupKey) -> Record {
    key_of([
        ("sourceKey", json!(key.source_key)),
        ("id", json!(key.id)),
    ])
}

/// Depth-first, stack-based flattening of a tree: the root comes first and
/// every node is replaced by an entity referencing its children by key.
pub fn flatten(result: &BackupResult) -> Vec<BackupEntity> {
    let mut batch = Vec::new();
    let mut stack = vec![result];
    while let Some(node) = stack.pop() {
        stack.extend(node.reposted.iter());
        batch.push(BackupEntity::from_node(node));
    }
    batch
}

impl BackupStore {
    pub fn new(store: Arc<dyn Store>, table: Table) -> Self {
        Self { store, table }
    }

    /// Persists every node reachable from `result` with one batched write.
    #[instrument(skip_all, fields(key = %result.key()))]
    pub async fn save(&self, result: &BackupResult) -> Result<(), StoreError> {
        let records = flatten(result)
            .iter()
            .map(to_record)
            .collect::<Result<Vec<_>, _>>()?;
        debug!(nodes = records.len(), "saving archive tree");
        self.store.put_batch(&self.table, records).await
    }

    /// Rehydrates the tree rooted at `key`. Children that no longer resolve
    /// are dropped; sibling order is kept.
    pub fn load<'a>(
        &'a self,
        key: &'a BackupKey,
    ) -> BoxFuture<'a, Result<Option<BackupResult>, StoreError>> {
        async move {
            let Some(record) = self.store.get(&self.table, &key_record(key)).await? else {
                return Ok(None);
            };
            let mut entity: BackupEntity = from_record(record)?;
            let children = std::mem::take(&mut entity.reposted);
            let loaded = join_all(children.iter().map(|child| self.load(child))).await;
            let mut reposted = Vec::with_capacity(loaded.len());
            for child in loaded {
                if let Some(child) = child? {
                    reposted.push(child);
                }
            }
            Ok(Some(entity.into_result(reposted)))
        }
        .boxed()
    }

    /// Convenience for the archiver's duplicate check.
    pub async fn check_existing(
        &self,
        source_key: &str,
        id: &str,
    ) -> Result<Option<BackupResult>, StoreError> {
        self.load(&BackupKey::new(source_key, id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, children: Vec<BackupResult>) -> BackupResult {
        BackupResult {
            source_key: "weibo".into(),
            id: id.into(),
            source: format!("https://weibo.com/{}", id),
            content: format!("post {}", id),
            author_name: None,
            pages: vec![],
            files: vec![],
            reposted: children,
            other_data: None,
            just_created: false,
        }
    }

    #[test]
    fn flatten_visits_every_node_once() {
        let tree = node(
            "1",
            vec![node("2", vec![node("4", vec![])]), node("3", vec![])],
        );
        let batch = flatten(&tree);
        let ids: Vec<_> = batch.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3", "2", "4"]);
        assert_eq!(
            batch[0].reposted,
            vec![BackupKey::new("weibo", "2"), BackupKey::new("weibo", "3")]
        );
        assert!(batch.iter().find(|e| e.id == "4").unwrap().reposted.is_empty());
    }

    #[test]
    fn flatten_handles_deep_chains() {
        let mut tree = node("0", vec![]);
        for i in 1..5000 {
            tree = node(&i.to_string(), vec![tree]);
        }
        assert_eq!(flatten(&tree).len(), 5000);
        // Tear down iteratively; the derived Drop would recurse.
        let mut next = Some(tree);
        while let Some(mut n) = next {
            next = n.reposted.pop();
        }
    }
}
