use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Page credentials and group lists are not here; they live in the Store
/// and are edited at runtime.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Web server
    pub api_host: String,
    pub api_port: u16,

    // Browser automation
    pub browserless_url: String,
    pub browserless_token: Option<String>,
    pub extraction_site_url: String,
    pub extraction_timeout: Duration,

    // Local persistence
    pub download_dir: String,
    pub store_path: String,

    // Publishing
    pub graph_api_url: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            api_host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .context("API_PORT must be a number")?,
            browserless_url: std::env::var("BROWSERLESS_URL")
                .context("BROWSERLESS_URL environment variable is required")?,
            browserless_token: std::env::var("BROWSERLESS_TOKEN").ok(),
            extraction_site_url: std::env::var("EXTRACTION_SITE_URL")
                .unwrap_or_else(|_| "https://snaptwitt.com".to_string()),
            extraction_timeout: Duration::from_secs(
                std::env::var("EXTRACTION_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "45".to_string())
                    .parse()
                    .context("EXTRACTION_TIMEOUT_SECS must be a number")?,
            ),
            download_dir: std::env::var("DOWNLOAD_DIR").unwrap_or_else(|_| "downloads".to_string()),
            store_path: std::env::var("STORE_PATH")
                .unwrap_or_else(|_| "postrelay-store.json".to_string()),
            graph_api_url: std::env::var("GRAPH_API_URL")
                .unwrap_or_else(|_| "https://graph.facebook.com/v19.0".to_string()),
        };

        config.log_keys();
        Ok(config)
    }

    fn log_keys(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  BROWSERLESS_URL: {}", self.browserless_url);
        tracing::info!("  BROWSERLESS_TOKEN: {}", preview_opt(&self.browserless_token));
        tracing::info!("  EXTRACTION_SITE_URL: {}", self.extraction_site_url);
        tracing::info!("  EXTRACTION_TIMEOUT: {:?}", self.extraction_timeout);
        tracing::info!("  STORE_PATH: {}", self.store_path);
    }
}

/// First few characters of a secret, for startup logs.
fn preview_opt(val: &Option<String>) -> String {
    match val {
        Some(v) if !v.is_empty() => {
            let head: String = v.chars().take(5).collect();
            format!("{}...({} chars)", head, v.chars().count())
        }
        _ => "<not set>".to_string(),
    }
}
