//! Per-visitor session state.
//!
//! A [`SessionManager`] mirrors the auth client's session into a
//! [`SessionState`] snapshot (`identity`, `profile`, `loading`) that page
//! handlers read. It only changes state in response to auth events, which a
//! listener task applies in order. Operations that trigger an event wait
//! until the listener has applied it, so a handler that signs someone in can
//! redirect straight to a private page.

pub mod notify;
pub mod registry;

use crate::backend::{
    Backend, BackendError, Identity, OnboardingStatus, Profile, ProfilePatch, SignUpRequest,
    auth::{AuthClient, AuthEvent},
};
use notify::{Notification, Notifications};
use secrecy::SecretString;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, broadcast, broadcast::error::RecvError, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

pub const STATUS_UPDATE_FAILED: &str = "Kunde inte uppdatera status";
pub const PROFILE_SAVE_FAILED: &str = "Kunde inte spara ändringar";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionState {
    pub identity: Option<Identity>,
    pub profile: Option<Profile>,
    /// True until the current identity's profile has been resolved.
    pub loading: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            identity: None,
            profile: None,
            loading: true,
        }
    }
}

/// Monotonic request counter; only the latest request may apply its result.
#[derive(Debug, Default)]
struct Revision(AtomicU64);

impl Revision {
    fn issue(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_latest(&self, revision: u64) -> bool {
        self.0.load(Ordering::SeqCst) == revision
    }
}

pub struct SessionManager {
    auth: AuthClient,
    backend: Arc<dyn Backend>,
    reset_redirect: String,
    state: watch::Sender<SessionState>,
    applied: watch::Sender<u64>,
    identity_revision: Revision,
    onboarding_revision: Revision,
    company_revision: Revision,
    notifications: Notifications,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    /// `reset_redirect` is where password-reset links land.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, reset_redirect: impl Into<String>) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        let (applied, _) = watch::channel(0);
        Self {
            auth: AuthClient::new(Arc::clone(&backend)),
            backend,
            reset_redirect: reset_redirect.into(),
            state,
            applied,
            identity_revision: Revision::default(),
            onboarding_revision: Revision::default(),
            company_revision: Revision::default(),
            notifications: Notifications::default(),
            listener: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Subscribe to auth events, then resolve any existing session.
    /// Calling `start` on a running manager does nothing.
    pub async fn start(self: &Arc<Self>) {
        {
            let mut listener = self.listener.lock().await;
            if listener.is_some() {
                return;
            }
            let events = self.auth.subscribe();
            *listener = Some(tokio::spawn(listen(Arc::downgrade(self), events)));
        }

        let identity = self
            .auth
            .get_session()
            .await
            .map(|session| session.user().clone());
        self.resolve_identity(identity);
    }

    /// Stop applying auth events. Pending waits are released.
    pub async fn stop(&self) {
        if let Some(handle) = self.listener.lock().await.take() {
            handle.abort();
        }
        self.applied.send_replace(u64::MAX);
    }

    fn apply(self: &Arc<Self>, event: AuthEvent) {
        debug!(change = ?event.change, seq = event.seq, "applying auth event");
        self.resolve_identity(event.session.map(|session| session.user().clone()));
        self.mark_applied(event.seq);
    }

    fn mark_applied(&self, seq: u64) {
        self.applied.send_if_modified(|applied| {
            if seq > *applied {
                *applied = seq;
                true
            } else {
                false
            }
        });
    }

    /// Re-read the stored session after missing events.
    async fn resync(self: &Arc<Self>) {
        let seq = self.auth.last_seq();
        let identity = self
            .auth
            .current_session()
            .await
            .map(|session| session.user().clone());
        self.resolve_identity(identity);
        self.mark_applied(seq);
    }

    fn resolve_identity(self: &Arc<Self>, identity: Option<Identity>) {
        let revision = self.identity_revision.issue();

        let Some(identity) = identity else {
            self.state.send_modify(|state| {
                state.identity = None;
                state.profile = None;
                state.loading = false;
            });
            return;
        };

        let user_id = identity.id;
        self.state.send_modify(|state| {
            let same_user = state
                .identity
                .as_ref()
                .is_some_and(|current| current.id == user_id);
            if !same_user {
                state.profile = None;
                state.loading = true;
            }
            state.identity = Some(identity);
        });

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager.load_profile(revision, user_id).await;
        });
    }

    async fn load_profile(&self, revision: u64, user_id: Uuid) {
        let profile = match self.auth.access_token().await {
            Some(token) => match self.backend.fetch_profile(&token, user_id).await {
                Ok(profile) => Some(profile),
                Err(err) => {
                    error!(%user_id, "Error fetching profile: {err}");
                    None
                }
            },
            None => None,
        };

        if !self.identity_revision.is_latest(revision) {
            debug!(%user_id, "discarding profile for a superseded identity");
            return;
        }

        self.state.send_modify(|state| {
            if let Some(profile) = profile {
                if state.identity.as_ref().is_some_and(|current| current.id == user_id) {
                    state.profile = Some(profile);
                }
            }
            state.loading = false;
        });
    }

    /// Wait until the listener has applied event `seq`. Without a running
    /// listener nothing will ever apply it, so return at once.
    async fn settle(&self, seq: u64) {
        if self.listener.lock().await.is_none() {
            return;
        }
        let mut applied = self.applied.subscribe();
        // The sender lives as long as `self`.
        let _ = applied.wait_for(|applied| *applied >= seq).await;
    }

    /// # Errors
    /// Returns the backend error when the credentials are rejected.
    pub async fn sign_in(&self, email: &str, password: &SecretString) -> Result<(), BackendError> {
        let seq = self.auth.sign_in_with_password(email, password).await?;
        self.settle(seq).await;
        Ok(())
    }

    /// Register with `company_name` as profile metadata.
    ///
    /// # Errors
    /// Returns the backend error when registration fails.
    pub async fn sign_up(
        &self,
        email: &str,
        password: SecretString,
        company_name: &str,
    ) -> Result<(), BackendError> {
        let request = SignUpRequest {
            email: email.to_string(),
            password,
            company_name: company_name.to_string(),
        };
        if let Some(seq) = self.auth.sign_up(&request).await? {
            self.settle(seq).await;
        }
        Ok(())
    }

    pub async fn sign_out(&self) {
        let seq = self.auth.sign_out().await;
        self.settle(seq).await;
    }

    /// # Errors
    /// Returns the backend error when the reset email cannot be sent.
    pub async fn reset_password(&self, email: &str) -> Result<(), BackendError> {
        self.auth
            .reset_password_for_email(email, &self.reset_redirect)
            .await
    }

    /// # Errors
    /// Returns the backend error when the password is rejected or nobody is signed in.
    pub async fn update_password(&self, password: &SecretString) -> Result<(), BackendError> {
        let seq = self.auth.update_password(password).await?;
        self.settle(seq).await;
        Ok(())
    }

    /// Sign in with the one-time token of a password-reset link.
    ///
    /// # Errors
    /// Returns the backend error when the token is invalid or expired.
    pub async fn recover_session(&self, token_hash: &str) -> Result<(), BackendError> {
        let seq = self.auth.verify_recovery(token_hash).await?;
        self.settle(seq).await;
        Ok(())
    }

    fn current_user(&self) -> Option<Uuid> {
        self.state
            .borrow()
            .identity
            .as_ref()
            .map(|identity| identity.id)
    }

    async fn write_profile(&self, patch: &ProfilePatch) -> Result<Uuid, BackendError> {
        let user_id = self.current_user().ok_or(BackendError::NotSignedIn)?;
        let token = self
            .auth
            .access_token()
            .await
            .ok_or(BackendError::NotSignedIn)?;
        self.backend.update_profile(&token, user_id, patch).await?;
        Ok(user_id)
    }

    /// Persist a new onboarding status. On failure local state is left as is
    /// and a notification is queued.
    ///
    /// # Errors
    /// Returns the backend error when the profile row cannot be written.
    pub async fn update_onboarding_status(
        &self,
        status: OnboardingStatus,
    ) -> Result<(), BackendError> {
        let revision = self.onboarding_revision.issue();
        let patch = ProfilePatch::onboarding_status(status);

        match self.write_profile(&patch).await {
            Ok(user_id) => {
                if self.onboarding_revision.is_latest(revision) {
                    self.update_local_profile(user_id, |profile| {
                        profile.onboarding_status = status;
                    });
                } else {
                    debug!(%status, "newer onboarding update issued; not applying");
                }
                Ok(())
            }
            Err(err) => {
                warn!("Failed to update onboarding status: {err}");
                self.notifications
                    .push(Notification::destructive(STATUS_UPDATE_FAILED, err.to_string()));
                Err(err)
            }
        }
    }

    /// Same contract as [`SessionManager::update_onboarding_status`] for the
    /// company name.
    ///
    /// # Errors
    /// Returns the backend error when the profile row cannot be written.
    pub async fn update_company_name(&self, name: &str) -> Result<(), BackendError> {
        let revision = self.company_revision.issue();
        let name = name.trim().to_string();
        let patch = ProfilePatch::company_name(name.clone());

        match self.write_profile(&patch).await {
            Ok(user_id) => {
                if self.company_revision.is_latest(revision) {
                    self.update_local_profile(user_id, |profile| {
                        profile.company_name = Some(name);
                    });
                } else {
                    debug!("newer company name update issued; not applying");
                }
                Ok(())
            }
            Err(err) => {
                warn!("Failed to update company name: {err}");
                self.notifications
                    .push(Notification::destructive(PROFILE_SAVE_FAILED, err.to_string()));
                Err(err)
            }
        }
    }

    fn update_local_profile(&self, user_id: Uuid, change: impl FnOnce(&mut Profile)) {
        self.state.send_if_modified(|state| {
            let current = state.identity.as_ref().is_some_and(|i| i.id == user_id);
            match state.profile.as_mut() {
                Some(profile) if current => {
                    change(profile);
                    true
                }
                _ => false,
            }
        });
    }

    /// Lesson ids the signed-in member has completed; empty when signed out.
    pub async fn completed_lessons(&self) -> Vec<Uuid> {
        let Some(user_id) = self.current_user() else {
            return Vec::new();
        };
        let Some(token) = self.auth.access_token().await else {
            return Vec::new();
        };
        match self.backend.completed_lessons(&token, user_id).await {
            Ok(lessons) => lessons,
            Err(err) => {
                error!(%user_id, "Error fetching lesson progress: {err}");
                Vec::new()
            }
        }
    }

    pub fn notify(&self, notification: Notification) {
        self.notifications.push(notification);
    }

    #[must_use]
    pub fn take_notifications(&self) -> Vec<Notification> {
        self.notifications.drain()
    }

    /// Signed in, or has notifications waiting for the next page.
    #[must_use]
    pub fn holds_state(&self) -> bool {
        self.state.borrow().identity.is_some() || !self.notifications.is_empty()
    }
}

async fn listen(manager: Weak<SessionManager>, mut events: broadcast::Receiver<AuthEvent>) {
    loop {
        let received = events.recv().await;
        let Some(manager) = manager.upgrade() else {
            break;
        };
        match received {
            Ok(event) => manager.apply(event),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "auth events lagged; resynchronizing");
                manager.resync().await;
            }
            Err(RecvError::Closed) => break,
        }
    }
}
