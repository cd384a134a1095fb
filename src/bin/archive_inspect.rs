use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use wbbubot::backup::BackupStore;
use wbbubot::config;
use wbbubot::model::BackupKey;
use wbbubot::render::ContentRenderer;
use wbbubot::store::{self, SqliteStore};

#[derive(Parser, Debug)]
#[command(author, version, about = "Print the rendered content items of a stored archive")]
struct Args {
    /// Path to YAML config
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Archive key as `{sourceKey}-{id}`
    #[arg(long)]
    key: String,

    /// Tree levels rendered as full text
    #[arg(long, default_value_t = 0)]
    text_depth: i32,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    let key = BackupKey::parse(&args.key)
        .ok_or_else(|| anyhow!("key must look like sourceKey-id"))?;

    let pool = store::init_pool(&cfg.database_url()).await?;
    store::run_migrations(&pool).await?;
    let backups = BackupStore::new(Arc::new(SqliteStore::new(pool)), cfg.tables().backups);

    let Some(result) = backups.load(&key).await? else {
        println!("No archive stored under {}", key);
        return Ok(());
    };
    println!("Archive {} ({} nodes)", key, result.node_count());

    let renderer = ContentRenderer::new(cfg.telegram.bot_username.clone());
    for (i, item) in renderer.render(&result, args.text_depth).iter().enumerate() {
        println!("--- item {} (preview: {})", i, item.show_preview);
        println!("{}", item.text);
        for media in &item.medias {
            println!("  media {:?}: {}", media.kind, media.url);
        }
        for file in &item.files {
            println!("  file: {}", file);
        }
        if let Some(markup) = &item.reply_markup {
            for button in markup.rows.iter().flatten() {
                println!("  [{}] {}", button.text, button.url);
            }
        }
    }
    Ok(())
}
