//! Inline-mode answers for an archived tree.
//!
//! Inline results cannot be grouped, so the user picks one of: the mirror
//! pages as links, the full text, or any single photo, video or file.
use crate::gateway::{InlineAnswer, InlineArticle, InlineMedia};
use crate::model::BackupResult;
use crate::render::{escape_html, plain_text, ContentItem, ContentRenderer, MediaKind, ParseMode, FULL_TEXT_DEPTH};

/// Longest visible text sent as one inline message.
pub const INLINE_TEXT_LIMIT: usize = 4000;
const CAPTION_PREVIEW: usize = 1000;
const TITLE_PREVIEW: usize = 50;

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() > limit {
        let mut out: String = text.chars().take(limit).collect();
        out.push_str("...");
        out
    } else {
        text.to_string()
    }
}

fn join_texts<'a>(items: impl Iterator<Item = &'a ContentItem>) -> String {
    items.map(|i| i.text.as_str()).collect::<Vec<_>>().join("\n")
}

/// Every answer for `result`, page article first.
pub fn answers(renderer: &ContentRenderer, result: &BackupResult) -> Vec<InlineAnswer> {
    let mut out = Vec::new();
    if let Some(article) = pages_article(renderer, result) {
        out.push(InlineAnswer::Article(article));
    }
    out.extend(inlined(renderer, result));
    out
}

/// Links to the mirror pages, root first so its page is the one previewed.
fn pages_article(renderer: &ContentRenderer, result: &BackupResult) -> Option<InlineArticle> {
    let page = result.pages.first()?;
    let items = renderer.render(result, 0);
    Some(InlineArticle {
        id: result.key().to_string(),
        title: format!("发送 Telegra.ph 页面：{}", page.title),
        url: Some(page.url.clone()),
        text: join_texts(items.iter().rev()),
        parse_mode: Some(ParseMode::Html),
        disable_preview: false,
        reply_markup: Some(renderer.inline_markup(result)),
    })
}

fn inlined(renderer: &ContentRenderer, result: &BackupResult) -> Vec<InlineAnswer> {
    let key = result.key();
    let markup = renderer.inline_markup(result);

    let mut items = renderer.render(result, FULL_TEXT_DEPTH);
    let mut text_content = join_texts(items.iter());
    if plain_text(&text_content).chars().count() > INLINE_TEXT_LIMIT {
        items = renderer.render(result, 1);
        text_content = join_texts(items.iter());
    }
    let text = plain_text(&text_content);
    let short = truncate(&text, TITLE_PREVIEW);
    let caption = if text.chars().count() > CAPTION_PREVIEW {
        escape_html(&truncate(&text, CAPTION_PREVIEW))
    } else {
        text_content.clone()
    };

    let mut out = vec![InlineAnswer::Article(InlineArticle {
        id: format!("{}-text", key),
        title: format!("发送文字内容：{}", short),
        url: result.pages.first().map(|p| p.url.clone()),
        text: text_content,
        parse_mode: Some(ParseMode::Html),
        disable_preview: true,
        reply_markup: Some(markup.clone()),
    })];

    let medias = items.iter().flat_map(|i| i.medias.iter());
    for (i, media) in medias.enumerate() {
        let label = match media.kind {
            MediaKind::Photo => "图片",
            MediaKind::Video => "视频",
        };
        let answer = InlineMedia {
            id: format!("{}-media-{}", key, i),
            url: media.url.clone(),
            title: format!("发送{} ({})", label, i + 1),
            description: short.clone(),
            caption: caption.clone(),
            reply_markup: Some(markup.clone()),
        };
        out.push(match media.kind {
            MediaKind::Photo => InlineAnswer::Photo(answer),
            MediaKind::Video => InlineAnswer::Video(answer),
        });
    }

    let files = items.iter().flat_map(|i| i.files.iter());
    for (i, file) in files.enumerate() {
        out.push(InlineAnswer::Document(InlineMedia {
            id: format!("{}-file-{}", key, i),
            url: file.clone(),
            title: format!("发送文件 ({})", i + 1),
            description: short.clone(),
            caption: caption.clone(),
            reply_markup: Some(markup.clone()),
        }));
    }
    out
}
