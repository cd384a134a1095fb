use anyhow::{Context, Result};
use clap::Parser;
use reqwest::Url;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use teloxide::dptree;
use teloxide::prelude::*;
use teloxide::types::InlineQuery;
use tracing::{error, info, warn};

use wbbubot::archiver::RemoteArchiver;
use wbbubot::backup::BackupStore;
use wbbubot::config;
use wbbubot::gateway::{MessagingGateway, SendOptions, TelegramGateway};
use wbbubot::handlers::{self, BotContext, TIMEOUT_TEXT};
use wbbubot::render::ContentRenderer;
use wbbubot::share::ShareGroupRegistry;
use wbbubot::store::{self, SqliteStore, Store};
use wbbubot::telegraph::TelegraphClient;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

/// Per-update deadline.
#[derive(Debug, Clone, Copy)]
struct Deadline(Duration);

async fn on_message(msg: Message, ctx: Arc<BotContext>, deadline: Deadline) -> ResponseResult<()> {
    let (Some(user), Some(text)) = (msg.from(), msg.text()) else {
        return respond(());
    };
    let chat_id = msg.chat.id.0;
    let user_id = user.id.0 as i64;
    let handled =
        tokio::time::timeout(deadline.0, handlers::handle_message(&ctx, chat_id, user_id, text)).await;
    if handled.is_err() {
        warn!(chat_id, "update timed out");
        if let Err(err) = ctx
            .gateway
            .send_text(chat_id, TIMEOUT_TEXT, &SendOptions::plain())
            .await
        {
            error!(?err, "failed to report timeout");
        }
    }
    respond(())
}

async fn on_inline_query(
    query: InlineQuery,
    ctx: Arc<BotContext>,
    deadline: Deadline,
) -> ResponseResult<()> {
    let user_id = query.from.id.0 as i64;
    let handled = tokio::time::timeout(
        deadline.0,
        handlers::handle_inline_query(&ctx, &query.id, user_id, &query.query),
    )
    .await;
    if handled.is_err() {
        warn!(user_id, "inline query timed out");
        handlers::answer_inline_error(&ctx, &query.id, TIMEOUT_TEXT).await;
    }
    respond(())
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
    cfg.ensure_dirs()?;

    let pool = store::init_pool(&cfg.database_url()).await?;
    store::run_migrations(&pool).await?;
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));
    let tables = cfg.tables();

    let archiver = RemoteArchiver::new(
        Url::parse(&cfg.archiver.endpoint).context("invalid archiver endpoint")?,
    )?;
    let telegraph = TelegraphClient::new(
        Url::parse(&cfg.telegraph.api_base).context("invalid telegraph api base")?,
    )?;

    let bot = Bot::new(cfg.telegram.bot_token.clone());
    let gateway: Arc<dyn MessagingGateway> = Arc::new(TelegramGateway::new(bot.clone()));

    let ctx = Arc::new(BotContext {
        backups: BackupStore::new(store.clone(), tables.backups.clone()),
        registry: ShareGroupRegistry::new(store, tables),
        renderer: ContentRenderer::new(cfg.telegram.bot_username.clone()),
        archiver: Arc::new(archiver),
        telegraph: Arc::new(telegraph),
        gateway,
        docs_url: cfg.telegram.docs_url.clone(),
    });
    let deadline = Deadline(Duration::from_secs(cfg.app.timeout_seconds));

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(on_message))
        .branch(Update::filter_inline_query().endpoint(on_inline_query));

    info!("starting telegram bot");
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![ctx, deadline])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
