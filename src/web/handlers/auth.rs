//! Login, registration and password handling.

use super::DASHBOARD_PATH;
use crate::web::{
    Visitor,
    guards::{LOGIN_PATH, require_member},
    views::{self, ForgotPasswordPage, LoginPage, UpdatePasswordPage},
};
use axum::{
    Extension, Form,
    extract::Query,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use secrecy::SecretString;
use serde::Deserialize;
use tracing::{debug, warn};

pub const LOGIN_FAILED: &str = "Felaktig e-postadress eller lösenord. Försök igen.";
pub const PASSWORD_TOO_SHORT: &str = "Lösenordet måste vara minst 6 tecken.";
pub const REGISTRATION_FAILED: &str =
    "Kunde inte skapa konto. E-postadressen kanske redan används.";
pub const REGISTRATION_SUCCEEDED: &str =
    "Konto skapat! Kontrollera din e-post för att verifiera ditt konto.";
pub const RESET_FAILED: &str = "Kunde inte skicka återställningslänk. Kontrollera e-postadressen.";
pub const PASSWORD_UPDATE_FAILED: &str = "Kunde inte uppdatera lösenordet. Försök igen.";

const MIN_PASSWORD_CHARS: usize = 6;
const REGISTER_TAB: &str = "registrera";
const UPDATE_PASSWORD_PATH: &str = "/update-password";

fn too_short(password: &str) -> bool {
    password.chars().count() < MIN_PASSWORD_CHARS
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    flik: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginForm {
    email: String,
    password: String,
}

#[derive(Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    company_name: String,
    email: String,
    password: String,
}

#[derive(Deserialize)]
pub struct EmailForm {
    email: String,
}

#[derive(Deserialize)]
pub struct PasswordForm {
    password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecoveryQuery {
    token_hash: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

pub async fn login_page(
    Extension(visitor): Extension<Visitor>,
    Query(query): Query<LoginQuery>,
) -> Response {
    let state = visitor.snapshot();
    if state.loading {
        return views::waiting();
    }
    if state.identity.is_some() {
        return Redirect::to(DASHBOARD_PATH).into_response();
    }

    let mut page = LoginPage::new(visitor.take_notifications());
    page.register_tab = query.flik.as_deref() == Some(REGISTER_TAB);
    views::render(&page)
}

pub async fn login(Extension(visitor): Extension<Visitor>, Form(form): Form<LoginForm>) -> Response {
    let password = SecretString::from(form.password);
    let result = visitor.sign_in(form.email.trim(), &password).await;

    match result {
        Ok(()) => Redirect::to(DASHBOARD_PATH).into_response(),
        Err(err) => {
            debug!("Sign-in rejected: {err}");
            let mut page = LoginPage::new(visitor.take_notifications());
            page.error = Some(LOGIN_FAILED);
            page.email = form.email;
            views::render_status(StatusCode::UNAUTHORIZED, &page)
        }
    }
}

pub async fn register(
    Extension(visitor): Extension<Visitor>,
    Form(form): Form<RegisterForm>,
) -> Response {
    let mut page = LoginPage::new(Vec::new());
    page.register_tab = true;

    if too_short(&form.password) {
        page.toasts = visitor.take_notifications();
        page.error = Some(PASSWORD_TOO_SHORT);
        page.email = form.email;
        page.company_name = form.company_name;
        return views::render_status(StatusCode::UNPROCESSABLE_ENTITY, &page);
    }

    let result = visitor
        .sign_up(
            form.email.trim(),
            SecretString::from(form.password),
            form.company_name.trim(),
        )
        .await;

    match result {
        // confirmation disabled: the sign-up already signed them in
        Ok(()) if visitor.snapshot().identity.is_some() => {
            Redirect::to(DASHBOARD_PATH).into_response()
        }
        Ok(()) => {
            page.toasts = visitor.take_notifications();
            page.success = Some(REGISTRATION_SUCCEEDED);
            views::render(&page)
        }
        Err(err) => {
            warn!("Sign-up failed: {err}");
            page.toasts = visitor.take_notifications();
            page.error = Some(REGISTRATION_FAILED);
            page.email = form.email;
            page.company_name = form.company_name;
            views::render_status(StatusCode::UNPROCESSABLE_ENTITY, &page)
        }
    }
}

pub async fn forgot_password_page(Extension(visitor): Extension<Visitor>) -> Response {
    views::render(&ForgotPasswordPage {
        toasts: visitor.take_notifications(),
        sent: false,
        error: None,
        email: String::new(),
    })
}

pub async fn forgot_password(
    Extension(visitor): Extension<Visitor>,
    Form(form): Form<EmailForm>,
) -> Response {
    let result = visitor.reset_password(form.email.trim()).await;

    let page = match result {
        Ok(()) => ForgotPasswordPage {
            toasts: visitor.take_notifications(),
            sent: true,
            error: None,
            email: form.email,
        },
        Err(err) => {
            warn!("Password reset request failed: {err}");
            ForgotPasswordPage {
                toasts: visitor.take_notifications(),
                sent: false,
                error: Some(RESET_FAILED),
                email: form.email,
            }
        }
    };
    views::render(&page)
}

pub async fn logout(Extension(visitor): Extension<Visitor>) -> Response {
    visitor.sign_out().await;
    Redirect::to(LOGIN_PATH).into_response()
}

/// Recovery links land here with a one-time token; it is exchanged for a
/// session and the visitor is redirected to the clean URL.
pub async fn update_password_page(
    Extension(visitor): Extension<Visitor>,
    Query(query): Query<RecoveryQuery>,
) -> Response {
    if let (Some(token_hash), Some("recovery")) =
        (query.token_hash.as_deref(), query.kind.as_deref())
    {
        if let Err(err) = visitor.recover_session(token_hash).await {
            warn!("Recovery link rejected: {err}");
        }
        return Redirect::to(UPDATE_PASSWORD_PATH).into_response();
    }

    if let Err(response) = require_member(visitor.snapshot()) {
        return response;
    }

    views::render(&UpdatePasswordPage {
        toasts: visitor.take_notifications(),
        error: None,
    })
}

pub async fn update_password(
    Extension(visitor): Extension<Visitor>,
    Form(form): Form<PasswordForm>,
) -> Response {
    if let Err(response) = require_member(visitor.snapshot()) {
        return response;
    }

    if too_short(&form.password) {
        return views::render_status(
            StatusCode::UNPROCESSABLE_ENTITY,
            &UpdatePasswordPage {
                toasts: visitor.take_notifications(),
                error: Some(PASSWORD_TOO_SHORT),
            },
        );
    }

    let password = SecretString::from(form.password);
    match visitor.update_password(&password).await {
        Ok(()) => Redirect::to(DASHBOARD_PATH).into_response(),
        Err(err) => {
            warn!("Password update failed: {err}");
            views::render_status(
                StatusCode::UNPROCESSABLE_ENTITY,
                &UpdatePasswordPage {
                    toasts: visitor.take_notifications(),
                    error: Some(PASSWORD_UPDATE_FAILED),
                },
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_length_counts_characters() {
        assert!(too_short("abcde"));
        assert!(!too_short("abcdef"));
        // multi-byte characters count once
        assert!(!too_short("åäöåäö"));
        assert!(too_short("åäöåä"));
    }
}
