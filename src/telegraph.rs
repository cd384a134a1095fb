use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{info, instrument};

use crate::model::TelegraphAccount;

/// Page-publishing service; only account creation is needed here.
#[async_trait]
pub trait Telegraph: Send + Sync {
    async fn create_account(&self, short_name: &str) -> Result<TelegraphAccount>;
}

#[derive(Debug, Clone)]
pub struct TelegraphClient {
    http: Client,
    base_url: Url,
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error: Option<String>,
}

impl TelegraphClient {
    pub fn new(base_url: Url) -> Result<Self> {
        let http = Client::builder()
            .user_agent("wbbubot/0.1")
            .build()
            .context("failed to build http client")?;
        Ok(Self { http, base_url })
    }
}

#[async_trait]
impl Telegraph for TelegraphClient {
    #[instrument(skip_all, fields(short_name = short_name))]
    async fn create_account(&self, short_name: &str) -> Result<TelegraphAccount> {
        let endpoint = self
            .base_url
            .join("createAccount")
            .context("invalid Telegraph base URL")?;
        let res = self
            .http
            .post(endpoint)
            .json(&serde_json::json!({ "short_name": short_name }))
            .send()
            .await
            .context("failed to reach Telegraph")?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("telegraph error {}: {}", status, body));
        }
        let payload: ApiResponse<TelegraphAccount> =
            res.json().await.context("invalid Telegraph response JSON")?;
        match (payload.ok, payload.result) {
            (true, Some(account)) => {
                info!("created telegraph account");
                Ok(account)
            }
            _ => Err(anyhow!(
                "telegraph rejected createAccount: {}",
                payload.error.unwrap_or_default()
            )),
        }
    }
}
