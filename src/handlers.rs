use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::archiver::{Archiver, BackupOptions};
use crate::backup::BackupStore;
use crate::delivery::DeliveryBatcher;
use crate::error::{BotError, ShareError};
use crate::gateway::{InlineAnswer, InlineArticle, MessagingGateway, SendOptions};
use crate::inline;
use crate::model::{BackupKey, BackupResult};
use crate::render::{ContentRenderer, FULL_TEXT_DEPTH};
use crate::share::{ShareGroupRegistry, ShareStatus};
use crate::telegraph::Telegraph;
use crate::util::normalize_url;

/// Everything one update needs.
pub struct BotContext {
    pub backups: BackupStore,
    pub registry: ShareGroupRegistry,
    pub renderer: ContentRenderer,
    pub archiver: Arc<dyn Archiver>,
    pub telegraph: Arc<dyn Telegraph>,
    pub gateway: Arc<dyn MessagingGateway>,
    pub docs_url: String,
}

pub const TIMEOUT_TEXT: &str = "存档超时";

impl BotContext {
    async fn reply(&self, chat_id: i64, text: &str) -> Result<(), BotError> {
        self.gateway
            .send_text(chat_id, text, &SendOptions::plain())
            .await
            .map_err(BotError::Gateway)
    }

    async fn deliver(&self, chat_id: i64, result: &BackupResult, text_depth: i32) -> Result<(), BotError> {
        let items = self.renderer.render(result, text_depth);
        DeliveryBatcher::new(self.gateway.as_ref())
            .deliver(chat_id, &items)
            .await
            .map_err(BotError::Gateway)
    }
}

/// Handles one text message, replying with a user-facing message on
/// failure.
#[instrument(skip_all, fields(chat_id = chat_id, user_id = user_id))]
pub async fn handle_message(ctx: &BotContext, chat_id: i64, user_id: i64, text: &str) {
    if let Err(err) = dispatch(ctx, chat_id, user_id, text).await {
        match &err {
            BotError::InvalidInput(_) => info!(%err, "command rejected"),
            BotError::Share(e) if e.is_user_facing() => info!(%err, "command rejected"),
            BotError::Archiver { public: true, .. } => info!(%err, "archive rejected"),
            _ => error!(?err, "failed to handle message"),
        }
        if let Err(send_err) = ctx.reply(chat_id, &err.user_message()).await {
            warn!(?send_err, "failed to report error");
        }
    }
}

async fn dispatch(ctx: &BotContext, chat_id: i64, user_id: i64, text: &str) -> Result<(), BotError> {
    let mut parts = text.split_whitespace();
    let Some(command) = parts.next() else {
        return Ok(());
    };
    let args: Vec<&str> = parts.collect();
    // Commands may be addressed as `/cmd@botname` in groups.
    let command = command.split('@').next().unwrap_or(command);

    match command {
        "/start" => match args.first() {
            Some(payload) => on_view_all(ctx, chat_id, payload).await,
            None => on_help(ctx, chat_id).await,
        },
        "/help" => on_help(ctx, chat_id).await,
        "/ping" => ctx.reply(chat_id, "PONG").await,
        "/create_share" => {
            let [name, password] = args.as_slice() else {
                return Err(usage("/create_share <名称> <密码>"));
            };
            on_create_share(ctx, chat_id, user_id, name, password).await
        }
        "/join_share" => {
            let [name, password] = args.as_slice() else {
                return Err(usage("/join_share <名称> <密码>"));
            };
            on_join_share(ctx, chat_id, user_id, name, password).await
        }
        "/stop_share" => {
            if args.len() > 1 {
                return Err(usage("/stop_share [密码]"));
            }
            on_stop_share(ctx, chat_id, user_id, args.first().copied()).await
        }
        "/share_status" => on_share_status(ctx, chat_id, user_id).await,
        c if c.starts_with('/') => ctx.reply(chat_id, "未知命令").await,
        url => on_url(ctx, chat_id, user_id, url, &args).await,
    }
}

fn usage(text: &str) -> BotError {
    BotError::InvalidInput(format!("用法: {}", text))
}

async fn on_help(ctx: &BotContext, chat_id: i64) -> Result<(), BotError> {
    let text = format!("发送链接即可存档，使用说明: {}", ctx.docs_url);
    ctx.reply(chat_id, &text).await
}

/// Archive request: `<url> [text] [force]`.
async fn on_url(
    ctx: &BotContext,
    chat_id: i64,
    user_id: i64,
    url: &str,
    args: &[&str],
) -> Result<(), BotError> {
    let Some(url) = normalize_url(url) else {
        return ctx.reply(chat_id, "请发送需要存档的链接").await;
    };
    let text_depth = if args.contains(&"text") { FULL_TEXT_DEPTH } else { 0 };
    let force = args.contains(&"force");
    let result = archive(ctx, user_id, &url, force).await?;
    ctx.deliver(chat_id, &result, text_depth).await
}

/// Archives `url` with the caller's pooled settings. A freshly created
/// result is saved in the background.
async fn archive(
    ctx: &BotContext,
    user_id: i64,
    url: &str,
    force: bool,
) -> Result<BackupResult, BotError> {
    let config = ctx
        .registry
        .get_or_create_config(user_id, ctx.telegraph.as_ref())
        .await?;
    let settings = ctx
        .registry
        .pool_settings(&config)
        .await
        .map_err(BotError::ArchiveUnavailable)?;
    let mut options = BackupOptions {
        telegraph_account: Some(config.telegraph_account.clone()),
        existing: Some(ctx.backups.clone()),
        settings,
        force,
    };
    let mut result = ctx.archiver.backup(url, &mut options).await?;

    if result.just_created {
        result.just_created = false;
        let backups = ctx.backups.clone();
        let to_save = result.clone();
        tokio::spawn(async move {
            if let Err(err) = backups.save(&to_save).await {
                error!(?err, key = %to_save.key(), "failed to save archive");
            }
        });
    }
    Ok(result)
}

/// Answers an inline query holding a single URL. Anything else is left
/// unanswered.
#[instrument(skip_all, fields(user_id = user_id))]
pub async fn handle_inline_query(ctx: &BotContext, query_id: &str, user_id: i64, query: &str) {
    let mut parts = query.split_whitespace();
    let Some(url) = parts.next().and_then(normalize_url) else {
        return;
    };
    let outcome = if parts.next().is_some() {
        Err(BotError::InvalidInput("一次只能输入一个地址".into()))
    } else {
        archive(ctx, user_id, &url, false)
            .await
            .map(|result| inline::answers(&ctx.renderer, &result))
    };
    let answers = match outcome {
        Ok(answers) => answers,
        Err(err) => {
            match &err {
                BotError::InvalidInput(_) => info!(%err, "inline query rejected"),
                BotError::Archiver { public: true, .. } => info!(%err, "archive rejected"),
                _ => error!(?err, "failed to handle inline query"),
            }
            return answer_inline_error(ctx, query_id, &err.user_message()).await;
        }
    };
    if let Err(err) = ctx.gateway.answer_inline_query(query_id, &answers).await {
        error!(?err, "failed to answer inline query");
    }
}

/// Answers with a single article carrying `text`.
pub async fn answer_inline_error(ctx: &BotContext, query_id: &str, text: &str) {
    let answer = InlineAnswer::Article(InlineArticle {
        id: "error".into(),
        title: text.to_string(),
        url: None,
        text: text.to_string(),
        parse_mode: None,
        disable_preview: true,
        reply_markup: None,
    });
    if let Err(err) = ctx.gateway.answer_inline_query(query_id, &[answer]).await {
        warn!(?err, "failed to report inline error");
    }
}

/// `/start {sourceKey}-{id}` deep link: the whole tree in text mode.
async fn on_view_all(ctx: &BotContext, chat_id: i64, payload: &str) -> Result<(), BotError> {
    let Some(key) = BackupKey::parse(payload) else {
        return on_help(ctx, chat_id).await;
    };
    let result = ctx
        .backups
        .load(&key)
        .await
        .map_err(BotError::ArchiveUnavailable)?;
    match result {
        Some(result) => ctx.deliver(chat_id, &result, FULL_TEXT_DEPTH).await,
        None => ctx.reply(chat_id, "找不到存档").await,
    }
}

async fn on_create_share(
    ctx: &BotContext,
    chat_id: i64,
    user_id: i64,
    name: &str,
    password: &str,
) -> Result<(), BotError> {
    let mut config = ctx
        .registry
        .get_or_create_config(user_id, ctx.telegraph.as_ref())
        .await?;
    let rotating = config.is_owner() && config.share_group() == Some(name);
    ctx.registry.create(&mut config, name, password).await?;
    ctx.registry
        .put_config(&config)
        .await
        .map_err(ShareError::from)?;
    let text = if rotating {
        format!("已更新分享组 {} 的密码", name)
    } else {
        format!("已创建分享组 {}", name)
    };
    ctx.reply(chat_id, &text).await
}

async fn on_join_share(
    ctx: &BotContext,
    chat_id: i64,
    user_id: i64,
    name: &str,
    password: &str,
) -> Result<(), BotError> {
    let mut config = ctx
        .registry
        .get_or_create_config(user_id, ctx.telegraph.as_ref())
        .await?;
    ctx.registry.join(&mut config, name, password).await?;
    ctx.registry
        .put_config(&config)
        .await
        .map_err(ShareError::from)?;
    ctx.reply(chat_id, &format!("已加入分享组 {}", name)).await
}

async fn on_stop_share(
    ctx: &BotContext,
    chat_id: i64,
    user_id: i64,
    password: Option<&str>,
) -> Result<(), BotError> {
    let mut config = ctx
        .registry
        .get_or_create_config(user_id, ctx.telegraph.as_ref())
        .await?;
    let was_owner = config.is_owner();
    ctx.registry.leave(&mut config, password).await?;
    ctx.registry
        .put_config(&config)
        .await
        .map_err(ShareError::from)?;
    let text = if was_owner { "已解散分享组" } else { "已退出分享组" };
    ctx.reply(chat_id, text).await
}

async fn on_share_status(ctx: &BotContext, chat_id: i64, user_id: i64) -> Result<(), BotError> {
    let mut config = ctx
        .registry
        .get_or_create_config(user_id, ctx.telegraph.as_ref())
        .await?;
    let text = match ctx.registry.status(&mut config).await? {
        ShareStatus::None => "你不在任何分享组中".to_string(),
        ShareStatus::Member(group) => format!("你是分享组 {} 的成员", group),
        ShareStatus::Owner(group) => format!("你是分享组 {} 的创建者", group),
        ShareStatus::Orphaned(group) => {
            ctx.registry
                .put_config(&config)
                .await
                .map_err(ShareError::from)?;
            format!("分享组 {} 已被解散", group)
        }
    };
    ctx.reply(chat_id, &text).await
}
