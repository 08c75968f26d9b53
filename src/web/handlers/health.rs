use crate::GIT_COMMIT_HASH;
use axum::{
    http::{HeaderMap, HeaderValue},
    response::{IntoResponse, Json},
};
use serde_json::json;
use tracing::error;

fn short_hash() -> &'static str {
    if GIT_COMMIT_HASH.len() > 7 {
        GIT_COMMIT_HASH.get(..7).unwrap_or_default()
    } else {
        ""
    }
}

pub async fn health() -> impl IntoResponse {
    let body = Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "commit": GIT_COMMIT_HASH,
    }));

    let app = format!(
        "{}:{}:{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_hash()
    );

    let mut headers = HeaderMap::new();
    match HeaderValue::from_str(&app) {
        Ok(value) => {
            headers.insert("X-App", value);
        }
        Err(err) => error!("Invalid X-App header: {err}"),
    }

    (headers, body)
}
