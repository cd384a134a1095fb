use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use wbbubot::backup::BackupStore;
use wbbubot::model::{BackupFile, BackupKey, BackupResult, FileKind, Page};
use wbbubot::store::{key_of, SqliteStore, Store, Tables};

async fn setup_store() -> Arc<SqliteStore> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    Arc::new(SqliteStore::new(pool))
}

fn node(id: &str, children: Vec<BackupResult>) -> BackupResult {
    BackupResult {
        source_key: "weibo".into(),
        id: id.into(),
        source: format!("https://weibo.com/u/{}", id),
        content: format!("<p>post {}</p>", id),
        author_name: Some(format!("author{}", id)),
        pages: vec![Page {
            url: format!("https://telegra.ph/{}", id),
            title: format!("Post {}", id),
        }],
        files: vec![BackupFile {
            kind: FileKind::Image,
            source: format!("https://img.example/{}.jpg", id),
            uploaded: None,
        }],
        reposted: children,
        other_data: None,
        just_created: false,
    }
}

#[tokio::test]
async fn save_then_load_round_trips_tree() {
    let store = setup_store().await;
    let backups = BackupStore::new(store.clone(), Tables::default().backups);

    let tree = node(
        "1",
        vec![
            node("2", vec![node("4", vec![]), node("5", vec![])]),
            node("3", vec![]),
        ],
    );
    backups.save(&tree).await.unwrap();

    let loaded = backups.load(&BackupKey::new("weibo", "1")).await.unwrap();
    assert_eq!(loaded, Some(tree.clone()));

    // Every node is addressable on its own.
    let sub = backups.load(&BackupKey::new("weibo", "2")).await.unwrap().unwrap();
    assert_eq!(sub, tree.reposted[0]);
}

#[tokio::test]
async fn load_absent_key_is_none() {
    let store = setup_store().await;
    let backups = BackupStore::new(store, Tables::default().backups);
    let loaded = backups.load(&BackupKey::new("weibo", "missing")).await.unwrap();
    assert!(loaded.is_none());
    assert!(backups.check_existing("weibo", "missing").await.unwrap().is_none());
}

#[tokio::test]
async fn unresolvable_children_are_dropped_in_order() {
    let store = setup_store().await;
    let table = Tables::default().backups;
    let backups = BackupStore::new(store.clone(), table.clone());

    let tree = node("1", vec![node("2", vec![]), node("3", vec![]), node("4", vec![])]);
    backups.save(&tree).await.unwrap();
    store
        .delete_item(&table, &key_of([("sourceKey", json!("weibo")), ("id", json!("3"))]))
        .await
        .unwrap();

    let loaded = backups.load(&tree.key()).await.unwrap().unwrap();
    let ids: Vec<_> = loaded.reposted.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["2", "4"]);
}

#[tokio::test]
async fn large_trees_span_several_write_batches() {
    let store = setup_store().await;
    let backups = BackupStore::new(store.clone(), Tables::default().backups);

    let children: Vec<_> = (0..60).map(|i| node(&format!("c{}", i), vec![])).collect();
    let tree = node("root", children);
    backups.save(&tree).await.unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE table_name = ?")
        .bind("wbbu-backups")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(count, 61);

    let loaded = backups.load(&tree.key()).await.unwrap().unwrap();
    assert_eq!(loaded.reposted.len(), 60);
    assert_eq!(loaded.reposted[59].id, "c59");
}

#[tokio::test]
async fn stored_records_omit_absent_attributes() {
    let store = setup_store().await;
    let table = Tables::default().backups;
    let backups = BackupStore::new(store.clone(), table.clone());

    let mut tree = node("1", vec![node("2", vec![])]);
    tree.author_name = None;
    tree.just_created = true;
    backups.save(&tree).await.unwrap();

    let record = store
        .get(&table, &key_of([("sourceKey", json!("weibo")), ("id", json!("1"))]))
        .await
        .unwrap()
        .unwrap();
    assert!(!record.contains_key("authorName"));
    assert!(!record.contains_key("justCreated"));
    assert_eq!(record["reposted"], json!([{ "sourceKey": "weibo", "id": "2" }]));
    assert_eq!(record["files"][0]["type"], json!("image"));
    assert!(record["files"][0].get("uploaded").is_none());
}
