//! Client-side session owner.
//!
//! An [`AuthClient`] holds at most one [`AuthSession`] and publishes an
//! [`AuthEvent`] whenever that session changes. Events are sequenced so a
//! subscriber can tell whether it has caught up with a given change.

use super::{AuthSession, Backend, BackendError, SignUpRequest};
use secrecy::SecretString;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, warn};

const EVENT_CAPACITY: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthChange {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    PasswordRecovery,
}

#[derive(Clone, Debug)]
pub struct AuthEvent {
    pub seq: u64,
    pub change: AuthChange,
    pub session: Option<AuthSession>,
}

pub struct AuthClient {
    backend: Arc<dyn Backend>,
    session: RwLock<Option<AuthSession>>,
    events: broadcast::Sender<AuthEvent>,
    seq: AtomicU64,
}

impl AuthClient {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            backend,
            session: RwLock::new(None),
            events,
            seq: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    /// Sequence number of the latest published event.
    #[must_use]
    pub fn last_seq(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }

    /// Store `session` and announce it. Callers hold the write guard so
    /// stored state and event order always agree.
    fn publish(
        &self,
        slot: &mut Option<AuthSession>,
        change: AuthChange,
        session: Option<AuthSession>,
    ) -> u64 {
        slot.clone_from(&session);
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        // No subscribers is fine; the session is stored either way.
        let _ = self.events.send(AuthEvent {
            seq,
            change,
            session,
        });
        debug!(?change, seq, "auth state changed");
        seq
    }

    /// Current session without refreshing it.
    pub async fn current_session(&self) -> Option<AuthSession> {
        self.session.read().await.clone()
    }

    /// Current session, refreshed first when its access token has expired.
    /// A failed refresh signs the client out.
    pub async fn get_session(&self) -> Option<AuthSession> {
        let now = chrono::Utc::now().timestamp();
        {
            let session = self.session.read().await;
            match session.as_ref() {
                None => return None,
                Some(current) if !current.is_expired(now) => return Some(current.clone()),
                Some(_) => {}
            }
        }

        let mut slot = self.session.write().await;
        let refresh_token = match slot.as_ref() {
            None => return None,
            // refreshed while we waited for the lock
            Some(current) if !current.is_expired(now) => return Some(current.clone()),
            Some(current) => current.refresh_token().clone(),
        };

        match self.backend.refresh_session(&refresh_token).await {
            Ok(session) => {
                self.publish(&mut slot, AuthChange::TokenRefreshed, Some(session.clone()));
                Some(session)
            }
            Err(err) => {
                warn!("Failed to refresh session: {err}");
                self.publish(&mut slot, AuthChange::SignedOut, None);
                None
            }
        }
    }

    pub async fn access_token(&self) -> Option<SecretString> {
        self.get_session()
            .await
            .map(|session| session.access_token().clone())
    }

    /// # Errors
    /// Returns the backend error when the credentials are rejected.
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<u64, BackendError> {
        let session = self.backend.sign_in_with_password(email, password).await?;
        let mut slot = self.session.write().await;
        Ok(self.publish(&mut slot, AuthChange::SignedIn, Some(session)))
    }

    /// Returns the event sequence when the sign-up also signed the user in.
    ///
    /// # Errors
    /// Returns the backend error when registration fails.
    pub async fn sign_up(&self, request: &SignUpRequest) -> Result<Option<u64>, BackendError> {
        let Some(session) = self.backend.sign_up(request).await? else {
            return Ok(None);
        };
        let mut slot = self.session.write().await;
        Ok(Some(self.publish(&mut slot, AuthChange::SignedIn, Some(session))))
    }

    /// Drop the local session and revoke it remotely. The local sign-out
    /// happens even when the revoke fails.
    pub async fn sign_out(&self) -> u64 {
        let mut slot = self.session.write().await;
        if let Some(current) = slot.as_ref() {
            if let Err(err) = self.backend.sign_out(current.access_token()).await {
                warn!("Failed to revoke session: {err}");
            }
        }
        self.publish(&mut slot, AuthChange::SignedOut, None)
    }

    /// # Errors
    /// Returns the backend error when the reset email cannot be sent.
    pub async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: &str,
    ) -> Result<(), BackendError> {
        self.backend
            .reset_password_for_email(email, redirect_to)
            .await
    }

    /// Sign in through a password-recovery link.
    ///
    /// # Errors
    /// Returns the backend error when the link token is invalid or expired.
    pub async fn verify_recovery(&self, token_hash: &str) -> Result<u64, BackendError> {
        let session = self.backend.verify_recovery(token_hash).await?;
        let mut slot = self.session.write().await;
        Ok(self.publish(&mut slot, AuthChange::PasswordRecovery, Some(session)))
    }

    /// # Errors
    /// Returns [`BackendError::NotSignedIn`] without a session, otherwise the
    /// backend error when the password is rejected.
    pub async fn update_password(&self, password: &SecretString) -> Result<u64, BackendError> {
        let token = self
            .access_token()
            .await
            .ok_or(BackendError::NotSignedIn)?;
        let user = self.backend.update_password(&token, password).await?;

        let mut slot = self.session.write().await;
        let mut session = slot.clone().ok_or(BackendError::NotSignedIn)?;
        session.set_user(user);
        Ok(self.publish(&mut slot, AuthChange::UserUpdated, Some(session)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;

    async fn client_with_member() -> (Arc<MemoryBackend>, AuthClient) {
        let backend = Arc::new(MemoryBackend::new());
        backend.add_member("anna@firma.se", "hemligt", "Firma AB").await;
        let client = AuthClient::new(backend.clone());
        (backend, client)
    }

    #[tokio::test]
    async fn sign_in_publishes_event() {
        let (_backend, client) = client_with_member().await;
        let mut events = client.subscribe();

        let seq = client
            .sign_in_with_password("anna@firma.se", &SecretString::from("hemligt"))
            .await
            .expect("sign in");

        let event = events.recv().await.expect("event");
        assert_eq!(event.seq, seq);
        assert_eq!(event.change, AuthChange::SignedIn);
        assert!(event.session.is_some());
        assert_eq!(client.last_seq(), seq);
        assert!(client.get_session().await.is_some());
    }

    #[tokio::test]
    async fn failed_sign_in_publishes_nothing() {
        let (_backend, client) = client_with_member().await;
        let result = client
            .sign_in_with_password("anna@firma.se", &SecretString::from("fel"))
            .await;
        assert!(matches!(result, Err(BackendError::InvalidCredentials)));
        assert_eq!(client.last_seq(), 0);
        assert!(client.get_session().await.is_none());
    }

    #[tokio::test]
    async fn expired_session_is_refreshed() {
        let (backend, client) = client_with_member().await;
        backend.set_token_ttl(-1).await;
        client
            .sign_in_with_password("anna@firma.se", &SecretString::from("hemligt"))
            .await
            .expect("sign in");
        backend.set_token_ttl(3600).await;
        let mut events = client.subscribe();

        let session = client.get_session().await.expect("refreshed session");
        assert!(!session.is_expired(chrono::Utc::now().timestamp()));
        let event = events.recv().await.expect("event");
        assert_eq!(event.change, AuthChange::TokenRefreshed);
    }

    #[tokio::test]
    async fn failed_refresh_signs_out() {
        let (backend, client) = client_with_member().await;
        backend.set_token_ttl(-1).await;
        client
            .sign_in_with_password("anna@firma.se", &SecretString::from("hemligt"))
            .await
            .expect("sign in");
        backend.revoke_refresh_tokens().await;
        let mut events = client.subscribe();

        assert!(client.get_session().await.is_none());
        let event = events.recv().await.expect("event");
        assert_eq!(event.change, AuthChange::SignedOut);
        assert!(event.session.is_none());
    }

    #[tokio::test]
    async fn sign_out_clears_session() {
        let (backend, client) = client_with_member().await;
        client
            .sign_in_with_password("anna@firma.se", &SecretString::from("hemligt"))
            .await
            .expect("sign in");

        let seq = client.sign_out().await;
        assert_eq!(seq, 2);
        assert!(client.current_session().await.is_none());
        assert_eq!(backend.sign_outs().await, 1);
    }

    #[tokio::test]
    async fn update_password_requires_session() {
        let (_backend, client) = client_with_member().await;
        let result = client.update_password(&SecretString::from("nytt-lösen")).await;
        assert!(matches!(result, Err(BackendError::NotSignedIn)));
    }

    #[tokio::test]
    async fn recovery_link_signs_in() {
        let (backend, client) = client_with_member().await;
        let token = backend
            .recovery_token("anna@firma.se")
            .await
            .expect("known account");
        let mut events = client.subscribe();

        client.verify_recovery(&token).await.expect("valid link");
        let event = events.recv().await.expect("event");
        assert_eq!(event.change, AuthChange::PasswordRecovery);

        client
            .update_password(&SecretString::from("nytt-lösen"))
            .await
            .expect("password updated");
        let event = events.recv().await.expect("event");
        assert_eq!(event.change, AuthChange::UserUpdated);

        assert!(client.verify_recovery(&token).await.is_err());
    }
}
