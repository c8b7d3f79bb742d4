mod handlers;
mod metrics;
mod routes;

use anyhow::{Context, Result};
use axum::Router;
use codegrade_common::config::ServiceConfig;
use codegrade_engine::{Grader, SubmissionStore};
use redis::aio::ConnectionManager;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub struct AppState {
    pub grader: Grader,
    /// Optional result mirror; `None` when REDIS_URL is not configured
    pub redis: Option<ConnectionManager>,
    pub result_ttl_secs: u64,
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new().merge(routes::routes()).with_state(state)
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true);

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn connect_mirror(redis_url: &str) -> Option<ConnectionManager> {
    let client = match redis::Client::open(redis_url) {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "Invalid REDIS_URL, result mirror disabled");
            return None;
        }
    };
    match ConnectionManager::new(client).await {
        Ok(conn) => {
            info!("Connected to Redis: {}", redis_url);
            Some(conn)
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to Redis, result mirror disabled");
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    info!("Codegrade API booting...");

    let config = ServiceConfig::load_default().context("Failed to load service configuration")?;
    metrics::init();

    let redis = match config.redis_url.as_deref() {
        Some(url) => connect_mirror(url).await,
        None => None,
    };

    let store = Arc::new(SubmissionStore::new());
    let state = Arc::new(AppState {
        grader: Grader::new(config.sandbox.clone(), store),
        redis,
        result_ttl_secs: config.result_ttl_secs,
    });

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    info!("HTTP server listening on {}", config.bind_addr);
    info!("Ready to grade submissions");

    axum::serve(listener, app(state))
        .await
        .context("Server error")?;
    Ok(())
}
