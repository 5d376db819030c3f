pub mod error;

pub use error::{BrowserlessError, Result};

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Options for a `/content` render.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRequest {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goto_options: Option<GotoOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_for_selector: Option<WaitForSelector>,
    /// Extra settle time after load, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_for_timeout: Option<u64>,
    /// Return whatever rendered when a wait condition times out instead of erroring.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub best_attempt: bool,
}

impl ContentRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn wait_until(mut self, event: &str) -> Self {
        self.goto_options = Some(GotoOptions {
            wait_until: event.to_string(),
        });
        self
    }

    pub fn wait_for(mut self, selector: &str, timeout_ms: u64) -> Self {
        self.wait_for_selector = Some(WaitForSelector {
            selector: selector.to_string(),
            timeout: timeout_ms,
        });
        self.best_attempt = true;
        self
    }

    pub fn settle(mut self, ms: u64) -> Self {
        self.wait_for_timeout = Some(ms);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GotoOptions {
    pub wait_until: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WaitForSelector {
    pub selector: String,
    pub timeout: u64,
}

pub struct BrowserlessClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BrowserlessClient {
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self> {
        // Page scripts poll in-browser for several seconds; leave headroom.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        let mut endpoint = format!("{}/{}", self.base_url, path);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }
        endpoint
    }

    /// Fetch fully-rendered HTML for a page.
    pub async fn content(&self, request: &ContentRequest) -> Result<String> {
        tracing::debug!(url = %request.url, "browserless: rendering content");

        let resp = self
            .client
            .post(self.endpoint("content"))
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserlessError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.text().await?)
    }

    /// Run a puppeteer function script and decode its JSON return value.
    ///
    /// `code` is an ES module whose default export receives `{ page, context }`
    /// and returns `{ data, type: "application/json" }`.
    pub async fn function<C, T>(&self, code: &str, context: &C) -> Result<T>
    where
        C: Serialize,
        T: DeserializeOwned,
    {
        let body = serde_json::json!({
            "code": code,
            "context": context,
        });

        let resp = self
            .client
            .post(self.endpoint("function"))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserlessError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let text = resp.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}
