//! In-process backend used by the test suites.
//!
//! Beyond the [`Backend`] operations it exposes knobs for the situations the
//! web layer has to cope with: a profile fetch that has not answered yet,
//! failing profile writes and short-lived tokens.

use super::{
    AuthSession, Backend, BackendError, Identity, Lesson, Module, OnboardingStatus, Profile,
    ProfilePatch, SignUpRequest,
};
use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, watch};
use uuid::Uuid;

const TOKEN_TTL: i64 = 3600;

struct Account {
    identity: Identity,
    password: String,
}

#[derive(Default)]
struct Store {
    accounts: HashMap<String, Account>,
    access_tokens: HashMap<String, Uuid>,
    refresh_tokens: HashMap<String, Uuid>,
    recovery_tokens: HashMap<String, Uuid>,
    profiles: HashMap<Uuid, Profile>,
    modules: Vec<Module>,
    lessons: Vec<Lesson>,
    progress: Vec<(Uuid, Uuid)>,
    reset_requests: Vec<(String, String)>,
    sign_outs: usize,
}

impl Store {
    fn issue(&mut self, identity: &Identity, ttl: i64) -> AuthSession {
        let access = Uuid::new_v4().simple().to_string();
        let refresh = Uuid::new_v4().simple().to_string();
        self.access_tokens.insert(access.clone(), identity.id);
        self.refresh_tokens.insert(refresh.clone(), identity.id);
        AuthSession::new(
            SecretString::from(access),
            SecretString::from(refresh),
            Utc::now().timestamp() + ttl,
            identity.clone(),
        )
    }

    fn user_for(&self, access_token: &SecretString) -> Result<Uuid, BackendError> {
        self.access_tokens
            .get(access_token.expose_secret())
            .copied()
            .ok_or_else(|| BackendError::Api {
                status: 401,
                message: "invalid JWT".to_string(),
            })
    }

    fn identity(&self, id: Uuid) -> Option<Identity> {
        self.accounts
            .values()
            .find(|account| account.identity.id == id)
            .map(|account| account.identity.clone())
    }
}

pub struct MemoryBackend {
    store: Mutex<Store>,
    token_ttl: Mutex<i64>,
    profiles_open: watch::Sender<bool>,
    fail_profile_fetch: AtomicBool,
    fail_profile_updates: AtomicBool,
    auto_confirm: AtomicBool,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        let (profiles_open, _) = watch::channel(true);
        Self {
            store: Mutex::new(Store::default()),
            token_ttl: Mutex::new(TOKEN_TTL),
            profiles_open,
            fail_profile_fetch: AtomicBool::new(false),
            fail_profile_updates: AtomicBool::new(false),
            auto_confirm: AtomicBool::new(false),
        }
    }

    /// Register a confirmed account with a `new` profile and return its id.
    pub async fn add_member(&self, email: &str, password: &str, company_name: &str) -> Uuid {
        let id = Uuid::new_v4();
        let mut store = self.store.lock().await;
        store.accounts.insert(
            email.to_lowercase(),
            Account {
                identity: Identity {
                    id,
                    email: Some(email.to_string()),
                },
                password: password.to_string(),
            },
        );
        store.profiles.insert(id, new_profile(id, company_name));
        id
    }

    pub async fn add_module(&self, module: Module) {
        self.store.lock().await.modules.push(module);
    }

    pub async fn add_lesson(&self, lesson: Lesson) {
        self.store.lock().await.lessons.push(lesson);
    }

    pub async fn complete_lesson(&self, user_id: Uuid, lesson_id: Uuid) {
        self.store.lock().await.progress.push((user_id, lesson_id));
    }

    pub async fn profile(&self, user_id: Uuid) -> Option<Profile> {
        self.store.lock().await.profiles.get(&user_id).cloned()
    }

    pub async fn remove_profile(&self, user_id: Uuid) {
        self.store.lock().await.profiles.remove(&user_id);
    }

    /// `(email, redirect_to)` of every reset email sent so far.
    pub async fn reset_requests(&self) -> Vec<(String, String)> {
        self.store.lock().await.reset_requests.clone()
    }

    pub async fn sign_outs(&self) -> usize {
        self.store.lock().await.sign_outs
    }

    /// Token hash a recovery link for `email` would carry.
    pub async fn recovery_token(&self, email: &str) -> Option<String> {
        let mut store = self.store.lock().await;
        let id = store.accounts.get(&email.to_lowercase())?.identity.id;
        let token = Uuid::new_v4().simple().to_string();
        store.recovery_tokens.insert(token.clone(), id);
        Some(token)
    }

    /// Lifetime of newly issued sessions; zero or negative issues expired ones.
    pub async fn set_token_ttl(&self, seconds: i64) {
        *self.token_ttl.lock().await = seconds;
    }

    /// Revoke every refresh token so the next refresh fails.
    pub async fn revoke_refresh_tokens(&self) {
        self.store.lock().await.refresh_tokens.clear();
    }

    /// Sign-ups return a session instead of waiting for email confirmation.
    pub fn set_auto_confirm(&self, enabled: bool) {
        self.auto_confirm.store(enabled, Ordering::SeqCst);
    }

    pub fn set_fail_profile_fetch(&self, fail: bool) {
        self.fail_profile_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_profile_updates(&self, fail: bool) {
        self.fail_profile_updates.store(fail, Ordering::SeqCst);
    }

    /// Park profile fetches until [`MemoryBackend::release_profiles`].
    pub fn hold_profiles(&self) {
        self.profiles_open.send_replace(false);
    }

    pub fn release_profiles(&self) {
        self.profiles_open.send_replace(true);
    }

    async fn ttl(&self) -> i64 {
        *self.token_ttl.lock().await
    }
}

fn new_profile(id: Uuid, company_name: &str) -> Profile {
    let now = Utc::now();
    Profile {
        id,
        user_id: Some(id),
        company_name: Some(company_name.to_string()),
        onboarding_status: OnboardingStatus::New,
        created_at: now,
        updated_at: now,
    }
}

fn sorted<T: Clone>(items: &[T], key: impl Fn(&T) -> i32) -> Vec<T> {
    let mut items = items.to_vec();
    items.sort_by_key(key);
    items
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<AuthSession, BackendError> {
        let ttl = self.ttl().await;
        let mut store = self.store.lock().await;
        let identity = match store.accounts.get(&email.to_lowercase()) {
            Some(account) if account.password == password.expose_secret() => {
                account.identity.clone()
            }
            _ => return Err(BackendError::InvalidCredentials),
        };
        Ok(store.issue(&identity, ttl))
    }

    async fn sign_up(&self, request: &SignUpRequest) -> Result<Option<AuthSession>, BackendError> {
        let ttl = self.ttl().await;
        let mut store = self.store.lock().await;
        let key = request.email.to_lowercase();
        if store.accounts.contains_key(&key) {
            return Err(BackendError::AlreadyRegistered);
        }

        let identity = Identity {
            id: Uuid::new_v4(),
            email: Some(request.email.clone()),
        };
        store.accounts.insert(
            key,
            Account {
                identity: identity.clone(),
                password: request.password.expose_secret().to_string(),
            },
        );
        store
            .profiles
            .insert(identity.id, new_profile(identity.id, &request.company_name));

        if self.auto_confirm.load(Ordering::SeqCst) {
            Ok(Some(store.issue(&identity, ttl)))
        } else {
            Ok(None)
        }
    }

    async fn sign_out(&self, access_token: &SecretString) -> Result<(), BackendError> {
        let mut store = self.store.lock().await;
        store.access_tokens.remove(access_token.expose_secret());
        store.sign_outs += 1;
        Ok(())
    }

    async fn refresh_session(
        &self,
        refresh_token: &SecretString,
    ) -> Result<AuthSession, BackendError> {
        let ttl = self.ttl().await;
        let mut store = self.store.lock().await;
        let id = store
            .refresh_tokens
            .remove(refresh_token.expose_secret())
            .ok_or_else(|| BackendError::Api {
                status: 400,
                message: "Invalid Refresh Token".to_string(),
            })?;
        let identity = store.identity(id).ok_or(BackendError::NotFound)?;
        Ok(store.issue(&identity, ttl))
    }

    async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: &str,
    ) -> Result<(), BackendError> {
        if !email.contains('@') {
            return Err(BackendError::Api {
                status: 400,
                message: "Unable to validate email address: invalid format".to_string(),
            });
        }
        self.store
            .lock()
            .await
            .reset_requests
            .push((email.to_string(), redirect_to.to_string()));
        Ok(())
    }

    async fn verify_recovery(&self, token_hash: &str) -> Result<AuthSession, BackendError> {
        let ttl = self.ttl().await;
        let mut store = self.store.lock().await;
        let id = store
            .recovery_tokens
            .remove(token_hash)
            .ok_or_else(|| BackendError::Api {
                status: 403,
                message: "Email link is invalid or has expired".to_string(),
            })?;
        let identity = store.identity(id).ok_or(BackendError::NotFound)?;
        Ok(store.issue(&identity, ttl))
    }

    async fn update_password(
        &self,
        access_token: &SecretString,
        password: &SecretString,
    ) -> Result<Identity, BackendError> {
        let mut store = self.store.lock().await;
        let id = store.user_for(access_token)?;
        let account = store
            .accounts
            .values_mut()
            .find(|account| account.identity.id == id)
            .ok_or(BackendError::NotFound)?;
        account.password = password.expose_secret().to_string();
        Ok(account.identity.clone())
    }

    async fn fetch_profile(
        &self,
        access_token: &SecretString,
        user_id: Uuid,
    ) -> Result<Profile, BackendError> {
        let mut open = self.profiles_open.subscribe();
        // The sender lives as long as `self`.
        let _ = open.wait_for(|open| *open).await;

        if self.fail_profile_fetch.load(Ordering::SeqCst) {
            return Err(BackendError::Network("connection reset".to_string()));
        }
        let store = self.store.lock().await;
        store.user_for(access_token)?;
        store
            .profiles
            .get(&user_id)
            .cloned()
            .ok_or(BackendError::NotFound)
    }

    async fn update_profile(
        &self,
        access_token: &SecretString,
        user_id: Uuid,
        patch: &ProfilePatch,
    ) -> Result<(), BackendError> {
        if self.fail_profile_updates.load(Ordering::SeqCst) {
            return Err(BackendError::Api {
                status: 500,
                message: "update rejected".to_string(),
            });
        }
        let mut store = self.store.lock().await;
        if store.user_for(access_token)? != user_id {
            return Err(BackendError::NotFound);
        }
        let profile = store
            .profiles
            .get_mut(&user_id)
            .ok_or(BackendError::NotFound)?;
        if let Some(name) = &patch.company_name {
            profile.company_name = Some(name.clone());
        }
        if let Some(status) = patch.onboarding_status {
            profile.onboarding_status = status;
        }
        profile.updated_at = Utc::now();
        Ok(())
    }

    async fn list_modules(&self, category: &str) -> Result<Vec<Module>, BackendError> {
        let store = self.store.lock().await;
        let modules: Vec<Module> = store
            .modules
            .iter()
            .filter(|module| module.category == category)
            .cloned()
            .collect();
        Ok(sorted(&modules, |module| module.order_index))
    }

    async fn list_lessons(&self) -> Result<Vec<Lesson>, BackendError> {
        let store = self.store.lock().await;
        Ok(sorted(&store.lessons, |lesson| lesson.order_index))
    }

    async fn completed_lessons(
        &self,
        access_token: &SecretString,
        user_id: Uuid,
    ) -> Result<Vec<Uuid>, BackendError> {
        let store = self.store.lock().await;
        store.user_for(access_token)?;
        Ok(store
            .progress
            .iter()
            .filter(|(user, _)| *user == user_id)
            .map(|(_, lesson)| *lesson)
            .collect())
    }
}
