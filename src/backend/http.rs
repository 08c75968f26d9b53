//! REST client for the hosted backend: `/auth/v1` for identities and sessions,
//! `/rest/v1` for table rows.

use super::{
    AuthSession, Backend, BackendError, Identity, Lesson, Module, Profile, ProfilePatch,
    SignUpRequest,
};
use crate::APP_USER_AGENT;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, header::AUTHORIZATION};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tracing::{debug, instrument};
use url::Url;
use uuid::Uuid;

/// Default token lifetime when the service omits both `expires_at` and `expires_in`.
const DEFAULT_EXPIRES_IN: i64 = 3600;

pub struct HttpBackend {
    client: Client,
    base_url: Url,
    anon_key: SecretString,
}

impl HttpBackend {
    /// # Errors
    /// Returns an error if `base_url` is not a valid URL or the HTTP client cannot be built.
    pub fn new(base_url: &str, anon_key: SecretString) -> Result<Self, BackendError> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .build()
            .map_err(|err| BackendError::Config(err.to_string()))?;

        Ok(Self {
            client,
            base_url,
            anon_key,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        Ok(self.base_url.join(path)?)
    }

    /// Every request carries the anon key; `bearer` overrides the
    /// authorization for calls made on behalf of a signed-in user.
    fn request(
        &self,
        method: Method,
        path: &str,
        bearer: Option<&SecretString>,
    ) -> Result<RequestBuilder, BackendError> {
        let url = self.endpoint(path)?;
        let token = bearer.unwrap_or(&self.anon_key);
        Ok(self
            .client
            .request(method, url)
            .header("apikey", self.anon_key.expose_secret())
            .header(AUTHORIZATION, format!("Bearer {}", token.expose_secret())))
    }

    async fn session(&self, builder: RequestBuilder) -> Result<AuthSession, BackendError> {
        let wire: WireSession = send_json(builder).await?;
        Ok(wire.into_session(now()))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    #[instrument(skip_all)]
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<AuthSession, BackendError> {
        let builder = self
            .request(Method::POST, "auth/v1/token", None)?
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password.expose_secret() }));
        self.session(builder).await
    }

    #[instrument(skip_all)]
    async fn sign_up(&self, request: &SignUpRequest) -> Result<Option<AuthSession>, BackendError> {
        let builder = self.request(Method::POST, "auth/v1/signup", None)?.json(&json!({
            "email": request.email,
            "password": request.password.expose_secret(),
            "data": { "company_name": request.company_name },
        }));
        let body: Value = send_json(builder).await?;

        // With email confirmation enabled the service answers with the bare user.
        if body.get("access_token").is_none() {
            debug!("sign-up pending email confirmation");
            return Ok(None);
        }
        let wire: WireSession =
            serde_json::from_value(body).map_err(|err| BackendError::Parse(err.to_string()))?;
        Ok(Some(wire.into_session(now())))
    }

    #[instrument(skip_all)]
    async fn sign_out(&self, access_token: &SecretString) -> Result<(), BackendError> {
        let builder = self.request(Method::POST, "auth/v1/logout", Some(access_token))?;
        send_empty(builder).await
    }

    #[instrument(skip_all)]
    async fn refresh_session(
        &self,
        refresh_token: &SecretString,
    ) -> Result<AuthSession, BackendError> {
        let builder = self
            .request(Method::POST, "auth/v1/token", None)?
            .query(&[("grant_type", "refresh_token")])
            .json(&json!({ "refresh_token": refresh_token.expose_secret() }));
        self.session(builder).await
    }

    #[instrument(skip(self, email))]
    async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: &str,
    ) -> Result<(), BackendError> {
        let builder = self
            .request(Method::POST, "auth/v1/recover", None)?
            .query(&[("redirect_to", redirect_to)])
            .json(&json!({ "email": email }));
        send_empty(builder).await
    }

    #[instrument(skip_all)]
    async fn verify_recovery(&self, token_hash: &str) -> Result<AuthSession, BackendError> {
        let builder = self
            .request(Method::POST, "auth/v1/verify", None)?
            .json(&json!({ "type": "recovery", "token_hash": token_hash }));
        self.session(builder).await
    }

    #[instrument(skip_all)]
    async fn update_password(
        &self,
        access_token: &SecretString,
        password: &SecretString,
    ) -> Result<Identity, BackendError> {
        let builder = self
            .request(Method::PUT, "auth/v1/user", Some(access_token))?
            .json(&json!({ "password": password.expose_secret() }));
        send_json(builder).await
    }

    #[instrument(skip(self, access_token))]
    async fn fetch_profile(
        &self,
        access_token: &SecretString,
        user_id: Uuid,
    ) -> Result<Profile, BackendError> {
        let builder = self
            .request(Method::GET, "rest/v1/profiles", Some(access_token))?
            .query(&[
                ("select", "*".to_string()),
                ("id", format!("eq.{user_id}")),
                ("limit", "1".to_string()),
            ]);
        let rows: Vec<Profile> = send_json(builder).await?;
        rows.into_iter().next().ok_or(BackendError::NotFound)
    }

    #[instrument(skip(self, access_token))]
    async fn update_profile(
        &self,
        access_token: &SecretString,
        user_id: Uuid,
        patch: &ProfilePatch,
    ) -> Result<(), BackendError> {
        let builder = self
            .request(Method::PATCH, "rest/v1/profiles", Some(access_token))?
            .query(&[("id", format!("eq.{user_id}"))])
            .header("Prefer", "return=representation")
            .json(patch);
        // Row-level security turns a forbidden update into an empty result.
        let rows: Vec<Profile> = send_json(builder).await?;
        if rows.is_empty() {
            return Err(BackendError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_modules(&self, category: &str) -> Result<Vec<Module>, BackendError> {
        let builder = self
            .request(Method::GET, "rest/v1/modules", None)?
            .query(&[
                ("select", "*".to_string()),
                ("category", format!("eq.{category}")),
                ("order", "order_index.asc".to_string()),
            ]);
        send_json(builder).await
    }

    #[instrument(skip(self))]
    async fn list_lessons(&self) -> Result<Vec<Lesson>, BackendError> {
        let builder = self
            .request(Method::GET, "rest/v1/lessons", None)?
            .query(&[("select", "*"), ("order", "order_index.asc")]);
        send_json(builder).await
    }

    #[instrument(skip(self, access_token))]
    async fn completed_lessons(
        &self,
        access_token: &SecretString,
        user_id: Uuid,
    ) -> Result<Vec<Uuid>, BackendError> {
        #[derive(Deserialize)]
        struct Row {
            lesson_id: Uuid,
        }

        let builder = self
            .request(Method::GET, "rest/v1/user_progress", Some(access_token))?
            .query(&[
                ("select", "lesson_id".to_string()),
                ("user_id", format!("eq.{user_id}")),
            ]);
        let rows: Vec<Row> = send_json(builder).await?;
        Ok(rows.into_iter().map(|row| row.lesson_id).collect())
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

async fn send_json<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, BackendError> {
    let response = checked(builder.send().await?).await?;
    Ok(response.json::<T>().await?)
}

async fn send_empty(builder: RequestBuilder) -> Result<(), BackendError> {
    checked(builder.send().await?).await.map(|_| ())
}

async fn checked(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(map_error(status, &body))
}

#[derive(Deserialize)]
struct WireSession {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: Identity,
}

impl WireSession {
    fn into_session(self, now: i64) -> AuthSession {
        let expires_at = self
            .expires_at
            .unwrap_or_else(|| now + self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN));
        AuthSession::new(
            SecretString::from(self.access_token),
            SecretString::from(self.refresh_token),
            expires_at,
            self.user,
        )
    }
}

/// Error body shapes of both the auth service and the row store.
#[derive(Default, Deserialize)]
struct WireError {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    code: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

fn map_error(status: StatusCode, body: &str) -> BackendError {
    let wire: WireError = serde_json::from_str(body).unwrap_or_default();

    match wire.error_code.as_deref() {
        Some("invalid_credentials") => return BackendError::InvalidCredentials,
        Some("user_already_exists" | "email_exists") => return BackendError::AlreadyRegistered,
        _ => {}
    }
    if wire.code.as_ref().and_then(Value::as_str) == Some("PGRST116") {
        return BackendError::NotFound;
    }

    let message = wire
        .msg
        .or(wire.error_description)
        .or(wire.message)
        .or(wire.error)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or_default().to_string());

    if message.contains("Invalid login credentials") {
        BackendError::InvalidCredentials
    } else if message.contains("already registered") {
        BackendError::AlreadyRegistered
    } else {
        BackendError::Api {
            status: status.as_u16(),
            message,
        }
    }
}
