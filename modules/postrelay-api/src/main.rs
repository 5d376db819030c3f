use std::sync::Arc;

use anyhow::Result;
use axum::{
    http::{header, HeaderValue},
    routing::{get, post, put},
    Router,
};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use browserless_client::BrowserlessClient;
use graph_client::GraphClient;
use postrelay_common::AppConfig;
use postrelay_core::automation::{BrowserlessComposer, BrowserlessSite, SiteAutomator};
use postrelay_core::{FsDownloader, Relay, RelayDeps, Store, TaskHost};

mod rest;

pub struct AppState {
    pub relay: Relay,
}

fn app(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/", get(|| async { "ok" }))
        // Drafts
        .route("/api/posts", post(rest::draft::api_submit_post))
        .route(
            "/api/draft",
            get(rest::draft::api_draft).delete(rest::draft::api_clear_draft),
        )
        .route("/api/draft/text", put(rest::draft::api_edit_text))
        .route("/api/draft/video", put(rest::draft::api_upload_video))
        // Extraction
        .route("/api/extractions", post(rest::extraction::api_fetch_video))
        .route(
            "/api/extractions/result",
            post(rest::extraction::api_deliver_result),
        )
        .route(
            "/api/extractions/pending",
            get(rest::extraction::api_pending_extraction),
        )
        // Publishing
        .route("/api/publish", post(rest::publish::api_publish))
        .route(
            "/api/groups",
            get(rest::publish::api_groups).put(rest::publish::api_set_groups),
        )
        .route("/api/groups/post", post(rest::publish::api_post_to_groups))
        // Settings
        .route(
            "/api/credentials",
            get(rest::settings::api_credentials_status).put(rest::settings::api_set_credentials),
        )
        .route(
            "/api/panel",
            get(rest::settings::api_panel).put(rest::settings::api_set_panel),
        )
        .with_state(state)
        // CORS: the browser extension calls from its own origin
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        // Logging layer: method + path only (bodies carry access tokens)
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("postrelay=info".parse()?))
        .init();

    let config = AppConfig::from_env()?;

    let store = Store::open(&config.store_path).await?;

    let site_browser = BrowserlessSite::new(BrowserlessClient::new(
        &config.browserless_url,
        config.browserless_token.as_deref(),
    )?);
    let automator = SiteAutomator::new(site_browser, &config.extraction_site_url);
    let composer = BrowserlessComposer::new(BrowserlessClient::new(
        &config.browserless_url,
        config.browserless_token.as_deref(),
    )?);

    let relay = Relay::new(RelayDeps {
        store,
        host: Arc::new(TaskHost::new(Arc::new(automator))),
        downloader: Arc::new(FsDownloader::new(&config.download_dir)?),
        graph: Arc::new(GraphClient::with_base_url(&config.graph_api_url)),
        composer: Arc::new(composer),
        extraction_timeout: config.extraction_timeout,
    });

    let state = Arc::new(AppState { relay });
    let app = app(state);

    let addr = format!("{}:{}", config.api_host, config.api_port);
    info!("Post relay starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
