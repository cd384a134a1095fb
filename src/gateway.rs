//! Outbound chat messages. Callers hand over fully computed text, captions
//! and keyboards; the gateway only maps them onto the transport.
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use teloxide::prelude::*;
use std::str::FromStr;
use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, InlineQueryResult, InlineQueryResultArticle,
    InlineQueryResultDocument, InlineQueryResultPhoto, InlineQueryResultVideo, InputFile,
    InputMedia, InputMediaPhoto, InputMediaVideo, InputMessageContent, InputMessageContentText,
    ParseMode as TgParseMode,
};
use tracing::instrument;

use crate::render::{Media, MediaKind, ParseMode, ReplyMarkup};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    pub parse_mode: Option<ParseMode>,
    pub disable_preview: bool,
    pub reply_markup: Option<ReplyMarkup>,
}

impl SendOptions {
    pub fn plain() -> Self {
        Self {
            parse_mode: None,
            disable_preview: true,
            reply_markup: None,
        }
    }
}

/// One element of a grouped-media message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMedia {
    pub media: Media,
    pub caption: String,
    pub parse_mode: Option<ParseMode>,
}

/// An inline answer that sends a text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineArticle {
    pub id: String,
    pub title: String,
    pub url: Option<String>,
    pub text: String,
    pub parse_mode: Option<ParseMode>,
    pub disable_preview: bool,
    pub reply_markup: Option<ReplyMarkup>,
}

/// An inline answer that sends one remote file with an HTML caption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineMedia {
    pub id: String,
    pub url: String,
    pub title: String,
    pub description: String,
    pub caption: String,
    pub reply_markup: Option<ReplyMarkup>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InlineAnswer {
    Article(InlineArticle),
    Photo(InlineMedia),
    Video(InlineMedia),
    Document(InlineMedia),
}

#[async_trait]
pub trait MessagingGateway: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str, opts: &SendOptions) -> Result<()>;

    async fn send_photo(
        &self,
        chat_id: i64,
        url: &str,
        caption: &str,
        opts: &SendOptions,
    ) -> Result<()>;

    async fn send_video(
        &self,
        chat_id: i64,
        url: &str,
        caption: &str,
        opts: &SendOptions,
    ) -> Result<()>;

    async fn send_media_group(&self, chat_id: i64, medias: &[GroupMedia]) -> Result<()>;

    async fn send_document(
        &self,
        chat_id: i64,
        url: &str,
        caption: &str,
        opts: &SendOptions,
    ) -> Result<()>;

    async fn answer_inline_query(&self, query_id: &str, answers: &[InlineAnswer]) -> Result<()>;
}

/// [`MessagingGateway`] over the Telegram Bot API.
#[derive(Clone)]
pub struct TelegramGateway {
    bot: Bot,
}

impl TelegramGateway {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn tg_parse_mode(mode: Option<ParseMode>) -> Option<TgParseMode> {
    mode.map(|ParseMode::Html| TgParseMode::Html)
}

fn keyboard(markup: &ReplyMarkup) -> Result<InlineKeyboardMarkup> {
    let mut rows = Vec::with_capacity(markup.rows.len());
    for row in &markup.rows {
        let mut buttons = Vec::with_capacity(row.len());
        for button in row {
            let url = Url::parse(&button.url)
                .with_context(|| format!("invalid button url {}", button.url))?;
            buttons.push(InlineKeyboardButton::url(button.text.clone(), url));
        }
        rows.push(buttons);
    }
    Ok(InlineKeyboardMarkup::new(rows))
}

fn input_file(url: &str) -> Result<InputFile> {
    let url = Url::parse(url).with_context(|| format!("invalid media url {}", url))?;
    Ok(InputFile::url(url))
}

fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).with_context(|| format!("invalid url {}", url))
}

fn mime<M>(raw: &str) -> Result<M>
where
    M: FromStr,
    M::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse::<M>()
        .with_context(|| format!("invalid mime type {}", raw))
}

fn document_mime(url: &str) -> &'static str {
    if url.to_ascii_lowercase().ends_with(".pdf") {
        "application/pdf"
    } else {
        "application/zip"
    }
}

fn inline_result(answer: &InlineAnswer) -> Result<InlineQueryResult> {
    let result = match answer {
        InlineAnswer::Article(a) => {
            let mut content =
                InputMessageContentText::new(a.text.clone()).disable_web_page_preview(a.disable_preview);
            if let Some(mode) = tg_parse_mode(a.parse_mode) {
                content = content.parse_mode(mode);
            }
            let mut article = InlineQueryResultArticle::new(
                a.id.clone(),
                a.title.clone(),
                InputMessageContent::Text(content),
            );
            if let Some(url) = &a.url {
                article = article.url(parse_url(url)?);
            }
            if let Some(markup) = &a.reply_markup {
                article = article.reply_markup(keyboard(markup)?);
            }
            InlineQueryResult::Article(article)
        }
        InlineAnswer::Photo(m) => {
            let url = parse_url(&m.url)?;
            let mut photo = InlineQueryResultPhoto::new(m.id.clone(), url.clone(), url)
                .title(m.title.clone())
                .description(m.description.clone())
                .caption(m.caption.clone())
                .parse_mode(TgParseMode::Html);
            if let Some(markup) = &m.reply_markup {
                photo = photo.reply_markup(keyboard(markup)?);
            }
            InlineQueryResult::Photo(photo)
        }
        InlineAnswer::Video(m) => {
            let url = parse_url(&m.url)?;
            let mut video = InlineQueryResultVideo::new(
                m.id.clone(),
                url.clone(),
                mime("video/mp4")?,
                url,
                m.title.clone(),
            )
            .description(m.description.clone())
            .caption(m.caption.clone())
            .parse_mode(TgParseMode::Html);
            if let Some(markup) = &m.reply_markup {
                video = video.reply_markup(keyboard(markup)?);
            }
            InlineQueryResult::Video(video)
        }
        InlineAnswer::Document(m) => {
            let mut document = InlineQueryResultDocument {
                id: m.id.clone(),
                title: m.title.clone(),
                caption: None,
                parse_mode: None,
                caption_entities: None,
                document_url: parse_url(&m.url)?,
                mime_type: mime(document_mime(&m.url))?,
                description: None,
                reply_markup: None,
                input_message_content: None,
                thumb_url: None,
                thumb_width: None,
                thumb_height: None,
            }
            .description(m.description.clone())
            .caption(m.caption.clone())
            .parse_mode(TgParseMode::Html);
            if let Some(markup) = &m.reply_markup {
                document = document.reply_markup(keyboard(markup)?);
            }
            InlineQueryResult::Document(document)
        }
    };
    Ok(result)
}

#[async_trait]
impl MessagingGateway for TelegramGateway {
    #[instrument(skip_all, fields(chat_id = chat_id))]
    async fn send_text(&self, chat_id: i64, text: &str, opts: &SendOptions) -> Result<()> {
        let mut req = self
            .bot
            .send_message(ChatId(chat_id), text)
            .disable_web_page_preview(opts.disable_preview);
        if let Some(mode) = tg_parse_mode(opts.parse_mode) {
            req = req.parse_mode(mode);
        }
        if let Some(markup) = &opts.reply_markup {
            req = req.reply_markup(keyboard(markup)?);
        }
        req.await.context("sendMessage failed")?;
        Ok(())
    }

    #[instrument(skip_all, fields(chat_id = chat_id))]
    async fn send_photo(
        &self,
        chat_id: i64,
        url: &str,
        caption: &str,
        opts: &SendOptions,
    ) -> Result<()> {
        let mut req = self.bot.send_photo(ChatId(chat_id), input_file(url)?);
        if !caption.is_empty() {
            req = req.caption(caption);
            if let Some(mode) = tg_parse_mode(opts.parse_mode) {
                req = req.parse_mode(mode);
            }
        }
        if let Some(markup) = &opts.reply_markup {
            req = req.reply_markup(keyboard(markup)?);
        }
        req.await.context("sendPhoto failed")?;
        Ok(())
    }

    #[instrument(skip_all, fields(chat_id = chat_id))]
    async fn send_video(
        &self,
        chat_id: i64,
        url: &str,
        caption: &str,
        opts: &SendOptions,
    ) -> Result<()> {
        let mut req = self.bot.send_video(ChatId(chat_id), input_file(url)?);
        if !caption.is_empty() {
            req = req.caption(caption);
            if let Some(mode) = tg_parse_mode(opts.parse_mode) {
                req = req.parse_mode(mode);
            }
        }
        if let Some(markup) = &opts.reply_markup {
            req = req.reply_markup(keyboard(markup)?);
        }
        req.await.context("sendVideo failed")?;
        Ok(())
    }

    #[instrument(skip_all, fields(chat_id = chat_id, size = medias.len()))]
    async fn send_media_group(&self, chat_id: i64, medias: &[GroupMedia]) -> Result<()> {
        // Telegram rejects groups of one.
        if let [single] = medias {
            let opts = SendOptions {
                parse_mode: single.parse_mode,
                disable_preview: true,
                reply_markup: None,
            };
            return match single.media.kind {
                MediaKind::Photo => {
                    self.send_photo(chat_id, &single.media.url, &single.caption, &opts)
                        .await
                }
                MediaKind::Video => {
                    self.send_video(chat_id, &single.media.url, &single.caption, &opts)
                        .await
                }
            };
        }
        let mut group = Vec::with_capacity(medias.len());
        for item in medias {
            let file = input_file(&item.media.url)?;
            let mode = tg_parse_mode(item.parse_mode);
            let media = match item.media.kind {
                MediaKind::Photo => {
                    let mut photo = InputMediaPhoto::new(file);
                    if !item.caption.is_empty() {
                        photo = photo.caption(item.caption.clone());
                        if let Some(mode) = mode {
                            photo = photo.parse_mode(mode);
                        }
                    }
                    InputMedia::Photo(photo)
                }
                MediaKind::Video => {
                    let mut video = InputMediaVideo::new(file);
                    if !item.caption.is_empty() {
                        video = video.caption(item.caption.clone());
                        if let Some(mode) = mode {
                            video = video.parse_mode(mode);
                        }
                    }
                    InputMedia::Video(video)
                }
            };
            group.push(media);
        }
        self.bot
            .send_media_group(ChatId(chat_id), group)
            .await
            .context("sendMediaGroup failed")?;
        Ok(())
    }

    #[instrument(skip_all, fields(chat_id = chat_id))]
    async fn send_document(
        &self,
        chat_id: i64,
        url: &str,
        caption: &str,
        opts: &SendOptions,
    ) -> Result<()> {
        let mut req = self.bot.send_document(ChatId(chat_id), input_file(url)?);
        if !caption.is_empty() {
            req = req.caption(caption);
        }
        if let Some(markup) = &opts.reply_markup {
            req = req.reply_markup(keyboard(markup)?);
        }
        req.await.context("sendDocument failed")?;
        Ok(())
    }

    #[instrument(skip_all, fields(query_id = query_id, answers = answers.len()))]
    async fn answer_inline_query(&self, query_id: &str, answers: &[InlineAnswer]) -> Result<()> {
        let results = answers
            .iter()
            .map(inline_result)
            .collect::<Result<Vec<_>>>()?;
        self.bot
            .answer_inline_query(query_id.to_string(), results)
            .is_personal(true)
            .cache_time(0)
            .await
            .context("answerInlineQuery failed")?;
        Ok(())
    }
}
