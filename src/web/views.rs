//! Page templates and the values they display.

use crate::backend::{OnboardingStatus, Profile};
use crate::content::Block;
use crate::progress;
use crate::session::notify::Notification;
use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use chrono::{DateTime, Datelike, Utc};
use tracing::error;
use uuid::Uuid;

const MONTHS: [&str; 12] = [
    "januari",
    "februari",
    "mars",
    "april",
    "maj",
    "juni",
    "juli",
    "augusti",
    "september",
    "oktober",
    "november",
    "december",
];

pub const UNKNOWN_DATE: &str = "Okänt";
pub const COMPANY_FALLBACK: &str = "Medlem";

/// Swedish long date, e.g. `17 oktober 2026`.
#[must_use]
pub fn swedish_date(date: Option<&DateTime<Utc>>) -> String {
    let Some(date) = date else {
        return UNKNOWN_DATE.to_string();
    };
    let month = MONTHS
        .get(date.month0() as usize)
        .copied()
        .unwrap_or_default();
    format!("{} {} {}", date.day(), month, date.year())
}

#[must_use]
pub fn status_label(profile: Option<&Profile>) -> &'static str {
    profile
        .map(|profile| profile.onboarding_status.label())
        .unwrap_or(OnboardingStatus::New.label())
}

/// Render a page, mapping template failures to a bare 500.
pub fn render<T: Template>(page: &T) -> Response {
    render_status(StatusCode::OK, page)
}

pub fn render_status<T: Template>(status: StatusCode, page: &T) -> Response {
    match page.render() {
        Ok(html) => (status, Html(html)).into_response(),
        Err(err) => {
            error!("Failed to render template: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Shown by private pages until the session resolves; the page reloads itself.
#[must_use]
pub fn waiting() -> Response {
    render(&WaitingPage { toasts: Vec::new() })
}

pub struct ProgressView {
    pub width: String,
    pub label: String,
}

impl ProgressView {
    #[must_use]
    pub fn new(value: f64, max: f64) -> Self {
        let percent = progress::percentage(value, max);
        Self {
            width: format!("{percent:.1}"),
            label: progress::label(percent),
        }
    }

    #[must_use]
    pub fn onboarding(status: Option<OnboardingStatus>) -> Self {
        Self::new(progress::onboarding(status), 100.0)
    }
}

/// Header of the member area.
pub struct Chrome {
    pub path: &'static str,
    pub company: String,
}

#[derive(Template)]
#[template(path = "waiting.html")]
pub struct WaitingPage {
    pub toasts: Vec<Notification>,
}

#[derive(Template)]
#[template(path = "landing.html")]
pub struct LandingPage {
    pub toasts: Vec<Notification>,
}

#[derive(Template)]
#[template(path = "about.html")]
pub struct AboutPage {
    pub toasts: Vec<Notification>,
}

#[derive(Template)]
#[template(path = "not_found.html")]
pub struct NotFoundPage {
    pub toasts: Vec<Notification>,
}

pub struct LessonLink {
    pub id: Uuid,
    pub title: String,
    pub active: bool,
    pub has_video: bool,
}

pub struct ModuleView {
    pub title: String,
    pub expanded: bool,
    pub lessons: Vec<LessonLink>,
}

pub struct LessonView {
    pub module_title: String,
    pub title: String,
    pub blocks: Vec<Block>,
    pub has_video: bool,
}

#[derive(Template)]
#[template(path = "education.html")]
pub struct EducationPage {
    pub toasts: Vec<Notification>,
    pub modules: Vec<ModuleView>,
    pub lesson: Option<LessonView>,
    pub progress: ProgressView,
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginPage {
    pub toasts: Vec<Notification>,
    pub register_tab: bool,
    pub error: Option<&'static str>,
    pub success: Option<&'static str>,
    pub email: String,
    pub company_name: String,
}

impl LoginPage {
    #[must_use]
    pub fn new(toasts: Vec<Notification>) -> Self {
        Self {
            toasts,
            register_tab: false,
            error: None,
            success: None,
            email: String::new(),
            company_name: String::new(),
        }
    }
}

#[derive(Template)]
#[template(path = "forgot_password.html")]
pub struct ForgotPasswordPage {
    pub toasts: Vec<Notification>,
    pub sent: bool,
    pub error: Option<&'static str>,
    pub email: String,
}

#[derive(Template)]
#[template(path = "update_password.html")]
pub struct UpdatePasswordPage {
    pub toasts: Vec<Notification>,
    pub error: Option<&'static str>,
}

#[derive(Template)]
#[template(path = "dashboard.html")]
pub struct DashboardPage {
    pub toasts: Vec<Notification>,
    pub chrome: Chrome,
    pub welcome_name: String,
    pub status: Option<OnboardingStatus>,
    pub progress: ProgressView,
}

impl DashboardPage {
    fn is(&self, status: OnboardingStatus) -> bool {
        self.status == Some(status)
    }

    #[must_use]
    pub fn is_new(&self) -> bool {
        self.is(OnboardingStatus::New)
    }

    #[must_use]
    pub fn in_progress(&self) -> bool {
        self.is(OnboardingStatus::InProgress)
    }

    #[must_use]
    pub fn completed(&self) -> bool {
        self.is(OnboardingStatus::Completed)
    }
}

#[derive(Template)]
#[template(path = "onboarding.html")]
pub struct OnboardingPage {
    pub toasts: Vec<Notification>,
    pub chrome: Chrome,
    pub completed: bool,
    pub progress: ProgressView,
}

#[derive(Template)]
#[template(path = "groups.html")]
pub struct GroupsPage {
    pub toasts: Vec<Notification>,
    pub chrome: Chrome,
}

#[derive(Template)]
#[template(path = "poc_guide.html")]
pub struct PocGuidePage {
    pub toasts: Vec<Notification>,
    pub chrome: Chrome,
}

#[derive(Template)]
#[template(path = "profile.html")]
pub struct ProfilePage {
    pub toasts: Vec<Notification>,
    pub chrome: Chrome,
    pub company_name: String,
    pub email: String,
    pub member_since: String,
    pub status_label: &'static str,
    pub saved: bool,
}
