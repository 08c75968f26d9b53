//! Boundary to the hosted backend (auth service plus row store).
//!
//! [`Backend`] is the seam: [`http::HttpBackend`] talks to the real service.
//! With the `test-support` feature, `memory::MemoryBackend` keeps everything in
//! process for tests. [`auth::AuthClient`] sits on top and owns the current
//! session.

pub mod auth;
mod error;
pub mod http;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
mod types;

pub use error::BackendError;
pub use types::{
    AuthSession, Identity, Lesson, Module, OnboardingStatus, Profile, ProfilePatch, SignUpRequest,
};

use async_trait::async_trait;
use secrecy::SecretString;
use uuid::Uuid;

/// Module category shown on the education page.
pub const EXTERNAL_MARKET: &str = "external_market";

#[async_trait]
pub trait Backend: Send + Sync {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<AuthSession, BackendError>;

    /// Register a user. Returns a session only when the service confirms
    /// sign-ups immediately; otherwise the user has to verify their email.
    async fn sign_up(&self, request: &SignUpRequest) -> Result<Option<AuthSession>, BackendError>;

    async fn sign_out(&self, access_token: &SecretString) -> Result<(), BackendError>;

    async fn refresh_session(&self, refresh_token: &SecretString)
        -> Result<AuthSession, BackendError>;

    /// Send a password-reset email whose link points at `redirect_to`.
    async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: &str,
    ) -> Result<(), BackendError>;

    /// Exchange a recovery link token for a session.
    async fn verify_recovery(&self, token_hash: &str) -> Result<AuthSession, BackendError>;

    async fn update_password(
        &self,
        access_token: &SecretString,
        password: &SecretString,
    ) -> Result<Identity, BackendError>;

    async fn fetch_profile(
        &self,
        access_token: &SecretString,
        user_id: Uuid,
    ) -> Result<Profile, BackendError>;

    async fn update_profile(
        &self,
        access_token: &SecretString,
        user_id: Uuid,
        patch: &ProfilePatch,
    ) -> Result<(), BackendError>;

    /// Modules of `category` ordered by `order_index`.
    async fn list_modules(&self, category: &str) -> Result<Vec<Module>, BackendError>;

    /// All lessons ordered by `order_index`.
    async fn list_lessons(&self) -> Result<Vec<Lesson>, BackendError>;

    /// Ids of lessons the user has completed.
    async fn completed_lessons(
        &self,
        access_token: &SecretString,
        user_id: Uuid,
    ) -> Result<Vec<Uuid>, BackendError>;
}
