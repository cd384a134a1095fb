//! Client side of the external archiving service.
use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::backup::BackupStore;
use crate::error::BotError;
use crate::model::{BackupKey, BackupResult, StorageSettings, TelegraphAccount};
use crate::share::SharedSettings;
use crate::store::StoreError;
use crate::util::normalize_url;

/// Per-request archiving options.
#[derive(Clone, Default)]
pub struct BackupOptions {
    pub telegraph_account: Option<TelegraphAccount>,
    /// Where already archived units are looked up before doing new work.
    pub existing: Option<BackupStore>,
    pub settings: SharedSettings,
    /// Ignore previously archived copies.
    pub force: bool,
}

impl BackupOptions {
    pub async fn check_existing(&self, key: &BackupKey) -> Result<Option<BackupResult>, StoreError> {
        match &self.existing {
            Some(store) if !self.force => store.load(key).await,
            _ => Ok(None),
        }
    }
}

#[async_trait]
pub trait Archiver: Send + Sync {
    /// Archives `url`. Results that were not found in storage come back with
    /// `just_created` set. Cookies the source hands out are fed back into
    /// `options.settings.cookies`.
    async fn backup(&self, url: &str, options: &mut BackupOptions)
        -> Result<BackupResult, BotError>;
}

#[derive(Debug, Clone)]
pub struct RemoteArchiver {
    http: Client,
    base_url: Url,
}

#[derive(Serialize)]
struct ResolveRequest<'a> {
    url: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BackupRequest<'a> {
    url: &'a str,
    force: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    telegraph_account: Option<&'a TelegraphAccount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    storage_settings: Option<&'a StorageSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cookie: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BackupResponse {
    result: BackupResult,
    #[serde(default)]
    set_cookies: Vec<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    message: String,
    #[serde(default)]
    public: bool,
}

impl RemoteArchiver {
    pub fn new(base_url: Url) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent("wbbubot/0.1")
            .build()
            .context("failed to build http client")?;
        Ok(Self { http, base_url })
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, BotError> {
        let endpoint = self
            .base_url
            .join(path)
            .context("invalid archiver base URL")?;
        let res = self
            .http
            .post(endpoint)
            .json(body)
            .send()
            .await
            .context("failed to reach archiver")?;
        let status = res.status();
        let text = res.text().await.context("failed to read archiver response")?;
        if !status.is_success() {
            warn!(%status, "archiver returned an error");
            return Err(match serde_json::from_str::<ErrorResponse>(&text) {
                Ok(err) => BotError::Archiver {
                    message: err.message,
                    public: err.public,
                },
                Err(_) => BotError::Archiver {
                    message: format!("archiver error {}: {}", status, text),
                    public: false,
                },
            });
        }
        let parsed = serde_json::from_str(&text).context("invalid archiver response JSON")?;
        Ok(parsed)
    }
}

#[async_trait]
impl Archiver for RemoteArchiver {
    #[instrument(skip_all, fields(url = url, force = options.force))]
    async fn backup(
        &self,
        url: &str,
        options: &mut BackupOptions,
    ) -> Result<BackupResult, BotError> {
        let url = normalize_url(url).unwrap_or_else(|| url.to_string());
        let url = url.as_str();
        let key: BackupKey = self.post("resolve", &ResolveRequest { url }).await?;
        if let Some(existing) = options
            .check_existing(&key)
            .await
            .map_err(BotError::ArchiveUnavailable)?
        {
            info!(key = %key, "reusing archived copy");
            return Ok(existing);
        }

        let parsed_url = Url::parse(url).context("invalid url")?;
        let request = BackupRequest {
            url,
            force: options.force,
            telegraph_account: options.telegraph_account.as_ref(),
            storage_settings: options.settings.storage.as_ref(),
            cookie: options.settings.cookies.get_cookie(&parsed_url),
        };
        let response: BackupResponse = self.post("backup", &request).await?;
        for cookie in &response.set_cookies {
            if !options.settings.cookies.set_cookie(&parsed_url, cookie) {
                debug!("dropped cookie with no matching jar");
            }
        }
        let mut result = response.result;
        result.just_created = true;
        info!(key = %result.key(), "archived");
        Ok(result)
    }
}
