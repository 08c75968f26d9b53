use crate::cli::{
    actions::{Action, server::Args},
    commands::{self, backend},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use url::Url;

/// # Errors
/// Returns an error if required arguments are missing or malformed.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches
        .get_one::<u16>(commands::ARG_PORT)
        .copied()
        .unwrap_or(8080);

    let backend_url = matches
        .get_one::<String>(backend::ARG_BACKEND_URL)
        .context("missing required argument: --backend-url")?;
    let backend_url = Url::parse(backend_url).context("invalid PORTAL_BACKEND_URL")?;

    let backend_anon_key = matches
        .get_one::<String>(backend::ARG_BACKEND_ANON_KEY)
        .cloned()
        .map(SecretString::from)
        .context("missing required argument: --backend-anon-key")?;

    let site_url = matches
        .get_one::<String>(commands::ARG_SITE_URL)
        .context("missing required argument: --site-url")?;
    let site_url = Url::parse(site_url).context("invalid PORTAL_SITE_URL")?;

    let session_ttl_seconds = matches
        .get_one::<u64>(commands::ARG_SESSION_TTL)
        .copied()
        .context("missing required argument: --session-ttl")?;

    Ok(Action::Server(Args {
        port,
        backend_url,
        backend_anon_key,
        site_url,
        session_ttl_seconds,
    }))
}
