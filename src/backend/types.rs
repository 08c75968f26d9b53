//! Records exchanged with the hosted backend. Sessions carry bearer tokens, so
//! their `Debug` output is redacted and they must never be logged.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Authenticated principal as issued by the hosted auth service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

/// External session: tokens plus the identity they belong to.
#[derive(Clone)]
pub struct AuthSession {
    access_token: SecretString,
    refresh_token: SecretString,
    expires_at: i64,
    user: Identity,
}

impl AuthSession {
    #[must_use]
    pub fn new(
        access_token: SecretString,
        refresh_token: SecretString,
        expires_at: i64,
        user: Identity,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at,
            user,
        }
    }

    #[must_use]
    pub fn access_token(&self) -> &SecretString {
        &self.access_token
    }

    #[must_use]
    pub fn refresh_token(&self) -> &SecretString {
        &self.refresh_token
    }

    /// Expiry as unix seconds.
    #[must_use]
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    #[must_use]
    pub fn user(&self) -> &Identity {
        &self.user
    }

    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }

    pub(crate) fn set_user(&mut self, user: Identity) {
        self.user = user;
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("access_token", &"***")
            .field("refresh_token", &"***")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStatus {
    New,
    InProgress,
    Completed,
}

impl OnboardingStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    /// Label shown on the profile page.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Completed => "Slutförd",
            Self::InProgress => "Pågående",
            Self::New => "Ej påbörjad",
        }
    }
}

impl fmt::Display for OnboardingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Member profile row, keyed by the identity id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub company_name: Option<String>,
    pub onboarding_status: OnboardingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// Company name, or `None` when unset or blank.
    #[must_use]
    pub fn company(&self) -> Option<&str> {
        self.company_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

/// Partial update for a profile row; unset fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onboarding_status: Option<OnboardingStatus>,
}

impl ProfilePatch {
    #[must_use]
    pub fn onboarding_status(status: OnboardingStatus) -> Self {
        Self {
            onboarding_status: Some(status),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn company_name(name: impl Into<String>) -> Self {
        Self {
            company_name: Some(name.into()),
            ..Self::default()
        }
    }
}

/// Course module (a group of lessons).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub order_index: i32,
    #[serde(default)]
    pub category: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: Uuid,
    pub module_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub content_text: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    pub order_index: i32,
}

/// Registration payload. `company_name` travels as user metadata; the backend
/// creates the profile row from it.
#[derive(Clone, Debug)]
pub struct SignUpRequest {
    pub email: String,
    pub password: SecretString,
    pub company_name: String,
}
