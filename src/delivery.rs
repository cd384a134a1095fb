//! Splits rendered items into transport-sized messages.
use anyhow::Result;
use tracing::{debug, instrument};

use crate::gateway::{GroupMedia, MessagingGateway, SendOptions};
use crate::render::{ContentItem, MediaKind};

/// Longest caption the transport accepts.
pub const CAPTION_LIMIT: usize = 1024;
/// Largest grouped-media message.
pub const MEDIA_GROUP_LIMIT: usize = 10;

pub struct DeliveryBatcher<'a> {
    gateway: &'a dyn MessagingGateway,
}

fn options(item: &ContentItem) -> SendOptions {
    SendOptions {
        parse_mode: Some(item.parse_mode),
        disable_preview: !item.show_preview,
        reply_markup: item.reply_markup.clone(),
    }
}

impl<'a> DeliveryBatcher<'a> {
    pub fn new(gateway: &'a dyn MessagingGateway) -> Self {
        Self { gateway }
    }

    /// Sends every item in order. Within an item the order is text, media,
    /// then files, one message at a time.
    #[instrument(skip_all, fields(chat_id = chat_id, items = items.len()))]
    pub async fn deliver(&self, chat_id: i64, items: &[ContentItem]) -> Result<()> {
        for item in items {
            self.deliver_item(chat_id, item).await?;
        }
        Ok(())
    }

    async fn deliver_item(&self, chat_id: i64, item: &ContentItem) -> Result<()> {
        let opts = options(item);
        let fits_caption = item.text.chars().count() <= CAPTION_LIMIT;
        match item.medias.as_slice() {
            [] => {
                // Telegram rejects empty messages.
                if item.text.is_empty() {
                    debug!(files = item.files.len(), "skipping empty text");
                } else {
                    self.gateway.send_text(chat_id, &item.text, &opts).await?;
                }
            }
            [media] => {
                let caption = if fits_caption {
                    item.text.as_str()
                } else {
                    self.gateway.send_text(chat_id, &item.text, &opts).await?;
                    ""
                };
                match media.kind {
                    MediaKind::Photo => {
                        self.gateway
                            .send_photo(chat_id, &media.url, caption, &opts)
                            .await?
                    }
                    MediaKind::Video => {
                        self.gateway
                            .send_video(chat_id, &media.url, caption, &opts)
                            .await?
                    }
                }
            }
            medias => {
                if !fits_caption {
                    self.gateway.send_text(chat_id, &item.text, &opts).await?;
                }
                for (i, batch) in medias.chunks(MEDIA_GROUP_LIMIT).enumerate() {
                    let group: Vec<GroupMedia> = batch
                        .iter()
                        .enumerate()
                        .map(|(j, media)| GroupMedia {
                            media: media.clone(),
                            caption: if i == 0 && j == 0 && fits_caption {
                                item.text.clone()
                            } else {
                                String::new()
                            },
                            parse_mode: Some(item.parse_mode),
                        })
                        .collect();
                    debug!(batch = i, size = group.len(), "sending media group");
                    self.gateway.send_media_group(chat_id, &group).await?;
                }
                // Groups cannot carry a keyboard, so it rides on a trailing
                // copy of the text.
                if fits_caption && item.reply_markup.is_some() && !item.text.is_empty() {
                    self.gateway.send_text(chat_id, &item.text, &opts).await?;
                }
            }
        }
        for (i, file) in item.files.iter().enumerate() {
            let caption = format!("附件 {}", i + 1);
            self.gateway
                .send_document(chat_id, file, &caption, &SendOptions::plain())
                .await?;
        }
        Ok(())
    }
}
