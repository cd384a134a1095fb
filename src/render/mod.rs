//! Turns archive trees into deliverable content items.
//!
//! - `sanitize`: allow-list filtering of archived HTML bodies.

use crate::model::{BackupResult, FileKind};

pub mod sanitize;

pub use sanitize::{plain_text, sanitize};

/// `textDepth` that forces text mode at every level.
pub const FULL_TEXT_DEPTH: i32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Video,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    pub kind: MediaKind,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    #[default]
    Html,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub text: String,
    pub url: String,
}

/// Rows of URL buttons.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReplyMarkup {
    pub rows: Vec<Vec<Button>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    pub text: String,
    pub medias: Vec<Media>,
    pub files: Vec<String>,
    pub show_preview: bool,
    pub page_urls: Vec<String>,
    pub parse_mode: ParseMode,
    pub reply_markup: Option<ReplyMarkup>,
}

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[derive(Debug, Clone)]
pub struct ContentRenderer {
    bot_username: String,
}

impl ContentRenderer {
    pub fn new(bot_username: impl Into<String>) -> Self {
        Self {
            bot_username: bot_username.into(),
        }
    }

    /// Deep link that re-delivers the whole archive in text mode.
    pub fn view_all_url(&self, result: &BackupResult) -> String {
        format!("https://t.me/{}?start={}", self.bot_username, result.key())
    }

    /// Renders reposted children before their parent, so the root is always
    /// the last item. `text_depth` drops by one per tree level.
    pub fn render(&self, result: &BackupResult, text_depth: i32) -> Vec<ContentItem> {
        let mut items = Vec::new();
        self.render_into(result, text_depth, false, &mut items);
        items
    }

    fn render_into(
        &self,
        node: &BackupResult,
        text_depth: i32,
        is_repost: bool,
        items: &mut Vec<ContentItem>,
    ) {
        for child in &node.reposted {
            self.render_into(child, text_depth - 1, true, items);
        }
        let item = if text_depth > 0 || node.pages.is_empty() {
            self.text_item(node, is_repost)
        } else {
            link_item(node, is_repost)
        };
        items.push(item);
    }

    fn text_item(&self, node: &BackupResult, is_repost: bool) -> ContentItem {
        let mut text = String::new();
        if is_repost {
            text.push_str("转发自: ");
        }
        if let Some(author) = &node.author_name {
            text.push('@');
            text.push_str(&escape_html(author));
            text.push_str(": ");
        }
        text.push_str(&sanitize(&node.content));

        let mut medias = Vec::new();
        let mut files = Vec::new();
        for file in &node.files {
            let url = file.url().to_string();
            match file.kind {
                FileKind::Image => medias.push(Media {
                    kind: MediaKind::Photo,
                    url,
                }),
                FileKind::Video => medias.push(Media {
                    kind: MediaKind::Video,
                    url,
                }),
                FileKind::Other => files.push(url),
            }
        }

        ContentItem {
            text,
            medias,
            files,
            show_preview: false,
            page_urls: page_urls(node),
            parse_mode: ParseMode::Html,
            reply_markup: Some(self.reply_markup(node)),
        }
    }

    fn reply_markup(&self, node: &BackupResult) -> ReplyMarkup {
        let mut row = Vec::new();
        if let Some(page) = node.pages.first() {
            row.push(Button {
                text: "查看存档".into(),
                url: page.url.clone(),
            });
        }
        if !node.reposted.is_empty() || node.pages.len() > 1 {
            row.push(Button {
                text: "全部存档".into(),
                url: self.view_all_url(node),
            });
        }
        row.push(Button {
            text: "查看原文".into(),
            url: node.source.clone(),
        });
        ReplyMarkup { rows: vec![row] }
    }

    /// Keyboard for inline answers, which always offer the whole tree.
    pub fn inline_markup(&self, result: &BackupResult) -> ReplyMarkup {
        let mut row = Vec::new();
        if let Some(page) = result.pages.first() {
            row.push(Button {
                text: "查看存档".into(),
                url: page.url.clone(),
            });
        }
        row.push(Button {
            text: "全部存档".into(),
            url: self.view_all_url(result),
        });
        row.push(Button {
            text: "查看原文".into(),
            url: result.source.clone(),
        });
        ReplyMarkup { rows: vec![row] }
    }
}

fn page_urls(node: &BackupResult) -> Vec<String> {
    node.pages.iter().map(|p| p.url.clone()).collect()
}

fn link_item(node: &BackupResult, is_repost: bool) -> ContentItem {
    let mut text = String::new();
    if is_repost {
        text.push_str("转发自: ");
    }
    let links: Vec<String> = node
        .pages
        .iter()
        .map(|p| {
            format!(
                "<a href=\"{}\">{}</a>",
                escape_html(&p.url),
                escape_html(&p.title)
            )
        })
        .collect();
    text.push_str(&links.join("\n"));
    ContentItem {
        text,
        medias: Vec::new(),
        files: Vec::new(),
        show_preview: true,
        page_urls: page_urls(node),
        parse_mode: ParseMode::Html,
        reply_markup: None,
    }
}
