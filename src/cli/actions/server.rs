use crate::backend::http::HttpBackend;
use crate::web::{self, AppState, PortalConfig};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::info;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub backend_url: Url,
    pub backend_anon_key: SecretString,
    pub site_url: Url,
    pub session_ttl_seconds: u64,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the backend client cannot be built or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let backend = HttpBackend::new(args.backend_url.as_str(), args.backend_anon_key)
        .context("Failed to build backend client")?;

    let config = PortalConfig::new(args.site_url.to_string())
        .with_session_ttl_seconds(args.session_ttl_seconds);

    let state = AppState::new(Arc::new(backend), config);

    web::serve(args.port, state).await
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("backend_url", args.backend_url.to_string()),
        ("site_url", args.site_url.to_string()),
        ("session_ttl_seconds", args.session_ttl_seconds.to_string()),
    ];
    for (key, value) in entries {
        info!("Startup configuration {key}={value}");
    }
}
