//! Portal configuration and shared handler state.

use crate::backend::Backend;
use crate::session::registry::SessionRegistry;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_SESSION_TTL_SECONDS: u64 = 12 * 60 * 60;
const UPDATE_PASSWORD_PATH: &str = "/update-password";

#[derive(Clone, Debug)]
pub struct PortalConfig {
    site_url: String,
    session_ttl_seconds: u64,
}

impl PortalConfig {
    #[must_use]
    pub fn new(site_url: String) -> Self {
        Self {
            site_url: site_url.trim_end_matches('/').to_string(),
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: u64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn site_url(&self) -> &str {
        &self.site_url
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> u64 {
        self.session_ttl_seconds
    }

    /// Target of the link in password-reset emails.
    #[must_use]
    pub fn reset_redirect(&self) -> String {
        format!("{}{UPDATE_PASSWORD_PATH}", self.site_url)
    }

    /// Session cookies are only marked `Secure` when the site is served over HTTPS.
    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.site_url.starts_with("https://")
    }
}

#[derive(Clone)]
pub struct AppState {
    backend: Arc<dyn Backend>,
    registry: Arc<SessionRegistry>,
    config: Arc<PortalConfig>,
}

impl AppState {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, config: PortalConfig) -> Self {
        let registry = SessionRegistry::new(
            Arc::clone(&backend),
            config.reset_redirect(),
            Duration::from_secs(config.session_ttl_seconds()),
        );
        Self {
            backend,
            registry: Arc::new(registry),
            config: Arc::new(config),
        }
    }

    #[must_use]
    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    #[must_use]
    pub fn config(&self) -> &PortalConfig {
        &self.config
    }
}
