use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use wbbubot::delivery::DeliveryBatcher;
use wbbubot::gateway::{GroupMedia, InlineAnswer, MessagingGateway, SendOptions};
use wbbubot::model::{BackupFile, BackupResult, FileKind};
use wbbubot::render::{Button, ContentItem, ContentRenderer, Media, MediaKind, ParseMode, ReplyMarkup};

#[derive(Debug, Clone, PartialEq)]
enum Sent {
    Text { text: String, has_markup: bool },
    Photo { url: String, caption: String },
    Video { url: String, caption: String },
    Group(Vec<GroupMedia>),
    Document { url: String, caption: String },
}

#[derive(Clone, Default)]
struct RecordingGateway {
    sent: Arc<Mutex<Vec<Sent>>>,
}

impl RecordingGateway {
    async fn sent(&self) -> Vec<Sent> {
        self.sent.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl MessagingGateway for RecordingGateway {
    async fn send_text(&self, _chat_id: i64, text: &str, opts: &SendOptions) -> Result<()> {
        self.sent.lock().await.push(Sent::Text {
            text: text.to_string(),
            has_markup: opts.reply_markup.is_some(),
        });
        Ok(())
    }

    async fn send_photo(&self, _chat_id: i64, url: &str, caption: &str, _opts: &SendOptions) -> Result<()> {
        self.sent.lock().await.push(Sent::Photo {
            url: url.to_string(),
            caption: caption.to_string(),
        });
        Ok(())
    }

    async fn send_video(&self, _chat_id: i64, url: &str, caption: &str, _opts: &SendOptions) -> Result<()> {
        self.sent.lock().await.push(Sent::Video {
            url: url.to_string(),
            caption: caption.to_string(),
        });
        Ok(())
    }

    async fn send_media_group(&self, _chat_id: i64, medias: &[GroupMedia]) -> Result<()> {
        self.sent.lock().await.push(Sent::Group(medias.to_vec()));
        Ok(())
    }

    async fn send_document(&self, _chat_id: i64, url: &str, caption: &str, _opts: &SendOptions) -> Result<()> {
        self.sent.lock().await.push(Sent::Document {
            url: url.to_string(),
            caption: caption.to_string(),
        });
        Ok(())
    }

    async fn answer_inline_query(&self, _query_id: &str, _answers: &[InlineAnswer]) -> Result<()> {
        panic!("delivery never answers inline queries");
    }
}

fn item(text: &str, medias: usize, files: usize) -> ContentItem {
    ContentItem {
        text: text.to_string(),
        medias: (0..medias)
            .map(|i| Media {
                kind: MediaKind::Photo,
                url: format!("https://img/{}.jpg", i),
            })
            .collect(),
        files: (0..files).map(|i| format!("https://f/{}.zip", i)).collect(),
        show_preview: false,
        page_urls: vec![],
        parse_mode: ParseMode::Html,
        reply_markup: None,
    }
}

fn with_keyboard(mut item: ContentItem) -> ContentItem {
    item.reply_markup = Some(ReplyMarkup {
        rows: vec![vec![Button {
            text: "查看原文".into(),
            url: "https://weibo.com/1".into(),
        }]],
    });
    item
}

fn group_sizes_and_captions(sent: &[Sent]) -> Vec<(usize, Vec<String>)> {
    sent.iter()
        .filter_map(|s| match s {
            Sent::Group(g) => Some((g.len(), g.iter().map(|m| m.caption.clone()).collect())),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn text_only_item_is_one_message() {
    let gw = RecordingGateway::default();
    DeliveryBatcher::new(&gw).deliver(1, &[item("hello", 0, 0)]).await.unwrap();
    assert_eq!(
        gw.sent().await,
        vec![Sent::Text {
            text: "hello".into(),
            has_markup: false
        }]
    );
}

#[tokio::test]
async fn single_media_takes_text_as_caption() {
    let gw = RecordingGateway::default();
    DeliveryBatcher::new(&gw).deliver(1, &[item("short", 1, 0)]).await.unwrap();
    assert_eq!(
        gw.sent().await,
        vec![Sent::Photo {
            url: "https://img/0.jpg".into(),
            caption: "short".into()
        }]
    );
}

#[tokio::test]
async fn long_text_goes_before_captionless_media() {
    let gw = RecordingGateway::default();
    let long = "字".repeat(1025);
    let mut it = item(&long, 1, 0);
    it.medias[0].kind = MediaKind::Video;
    DeliveryBatcher::new(&gw).deliver(1, &[it]).await.unwrap();
    assert_eq!(
        gw.sent().await,
        vec![
            Sent::Text {
                text: long.clone(),
                has_markup: false
            },
            Sent::Video {
                url: "https://img/0.jpg".into(),
                caption: String::new()
            },
        ]
    );

    // Exactly at the limit still fits.
    let gw = RecordingGateway::default();
    let edge = "a".repeat(1024);
    DeliveryBatcher::new(&gw).deliver(1, &[item(&edge, 1, 0)]).await.unwrap();
    assert!(matches!(&gw.sent().await[..], [Sent::Photo { caption, .. }] if *caption == edge));
}

#[tokio::test]
async fn media_groups_are_split_by_ten_in_order() {
    let gw = RecordingGateway::default();
    DeliveryBatcher::new(&gw).deliver(1, &[item("cap", 23, 0)]).await.unwrap();
    let sent = gw.sent().await;
    let groups: Vec<&Vec<GroupMedia>> = sent
        .iter()
        .filter_map(|s| match s {
            Sent::Group(g) => Some(g),
            _ => None,
        })
        .collect();
    assert_eq!(groups.iter().map(|g| g.len()).collect::<Vec<_>>(), vec![10, 10, 3]);

    let urls: Vec<_> = groups.iter().flat_map(|g| g.iter().map(|m| m.media.url.clone())).collect();
    let expected: Vec<_> = (0..23).map(|i| format!("https://img/{}.jpg", i)).collect();
    assert_eq!(urls, expected);

    let captions: Vec<_> = groups.iter().flat_map(|g| g.iter().map(|m| m.caption.as_str())).collect();
    assert_eq!(captions[0], "cap");
    assert!(captions[1..].iter().all(|c| c.is_empty()));
    // No keyboard, so no trailing text.
    assert_eq!(sent.len(), 3);
}

#[tokio::test]
async fn files_follow_media_with_numbered_captions() {
    let gw = RecordingGateway::default();
    let items = [item("first", 2, 2), item("second", 0, 1)];
    DeliveryBatcher::new(&gw).deliver(1, &items).await.unwrap();
    let sent = gw.sent().await;
    assert_eq!(sent.len(), 5);
    assert!(matches!(&sent[0], Sent::Group(g) if g.len() == 2));
    assert_eq!(
        sent[1],
        Sent::Document {
            url: "https://f/0.zip".into(),
            caption: "附件 1".into()
        }
    );
    assert_eq!(
        sent[2],
        Sent::Document {
            url: "https://f/1.zip".into(),
            caption: "附件 2".into()
        }
    );
    assert!(matches!(&sent[3], Sent::Text { text, .. } if text == "second"));
    assert!(matches!(&sent[4], Sent::Document { caption, .. } if caption == "附件 1"));
}

#[tokio::test]
async fn rendered_archive_with_23_photos_makes_three_groups() {
    let result = BackupResult {
        source_key: "weibo".into(),
        id: "9".into(),
        source: "https://weibo.com/9".into(),
        content: "<b>album</b>".into(),
        author_name: None,
        pages: vec![],
        files: (0..23)
            .map(|i| BackupFile {
                kind: FileKind::Image,
                source: format!("https://img/{}.jpg", i),
                uploaded: None,
            })
            .collect(),
        reposted: vec![],
        other_data: None,
        just_created: false,
    };
    let items = ContentRenderer::new("wbbubot").render(&result, 0);
    let gw = RecordingGateway::default();
    DeliveryBatcher::new(&gw).deliver(1, &items).await.unwrap();
    let sent = gw.sent().await;
    let sizes: Vec<_> = sent
        .iter()
        .filter_map(|s| match s {
            Sent::Group(g) => Some(g.len()),
            _ => None,
        })
        .collect();
    assert_eq!(sizes, vec![10, 10, 3]);
    // The keyboard rides on a trailing text message after the groups.
    assert_eq!(
        sent.last(),
        Some(&Sent::Text {
            text: "<b>album</b>".into(),
            has_markup: true
        })
    );
}

#[tokio::test]
async fn long_text_goes_before_uncaptioned_media_groups() {
    let gw = RecordingGateway::default();
    let long = "长".repeat(1100);
    let it = with_keyboard(item(&long, 12, 0));
    DeliveryBatcher::new(&gw).deliver(1, &[it]).await.unwrap();
    let sent = gw.sent().await;
    assert_eq!(sent.len(), 3);
    assert_eq!(
        sent[0],
        Sent::Text {
            text: long.clone(),
            has_markup: true
        }
    );
    assert_eq!(
        group_sizes_and_captions(&sent[1..]),
        vec![(10, vec![String::new(); 10]), (2, vec![String::new(); 2])]
    );
}

#[tokio::test]
async fn media_group_without_keyboard_has_no_trailing_text() {
    let gw = RecordingGateway::default();
    DeliveryBatcher::new(&gw).deliver(1, &[item("cap", 3, 0)]).await.unwrap();
    let sent = gw.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(
        group_sizes_and_captions(&sent),
        vec![(3, vec!["cap".to_string(), String::new(), String::new()])]
    );

    // With a keyboard the text follows the group to carry it.
    let gw = RecordingGateway::default();
    DeliveryBatcher::new(&gw)
        .deliver(1, &[with_keyboard(item("cap", 3, 0))])
        .await
        .unwrap();
    let sent = gw.sent().await;
    assert_eq!(sent.len(), 2);
    assert!(matches!(&sent[0], Sent::Group(g) if g.len() == 3));
    assert_eq!(
        sent[1],
        Sent::Text {
            text: "cap".into(),
            has_markup: true
        }
    );
}

#[tokio::test]
async fn empty_text_is_never_sent() {
    let gw = RecordingGateway::default();
    DeliveryBatcher::new(&gw)
        .deliver(1, &[item("", 0, 0), item("", 0, 1), item("after", 0, 0)])
        .await
        .unwrap();
    assert_eq!(
        gw.sent().await,
        vec![
            Sent::Document {
                url: "https://f/0.zip".into(),
                caption: "附件 1".into()
            },
            Sent::Text {
                text: "after".into(),
                has_markup: false
            },
        ]
    );
}
