use super::DASHBOARD_PATH;
use crate::backend::OnboardingStatus;
use crate::web::{
    Visitor,
    guards::{Member, require_member},
    views::{
        self, COMPANY_FALLBACK, Chrome, DashboardPage, GroupsPage, OnboardingPage, PocGuidePage,
        ProfilePage, ProgressView,
    },
};
use axum::{
    Extension, Form,
    extract::Query,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;

const ONBOARDING_PATH: &str = "/medlem/onboarding";
const GROUPS_PATH: &str = "/medlem/grupper";
const POC_GUIDE_PATH: &str = "/medlem/poc-guide";
const PROFILE_PATH: &str = "/medlem/profil";
const PROFILE_SAVED_PATH: &str = "/medlem/profil?sparat=1";

fn chrome(path: &'static str, member: &Member) -> Chrome {
    Chrome {
        path,
        company: member.company().to_string(),
    }
}

fn status_of(member: &Member) -> Option<OnboardingStatus> {
    member.profile.as_ref().map(|profile| profile.onboarding_status)
}

pub async fn dashboard(Extension(visitor): Extension<Visitor>) -> Response {
    let member = match require_member(visitor.snapshot()) {
        Ok(member) => member,
        Err(response) => return response,
    };

    let status = status_of(&member);
    let welcome_name = match member.company() {
        "" => COMPANY_FALLBACK.to_string(),
        company => company.to_string(),
    };

    views::render(&DashboardPage {
        toasts: visitor.take_notifications(),
        chrome: chrome(DASHBOARD_PATH, &member),
        welcome_name,
        status,
        progress: ProgressView::onboarding(status),
    })
}

/// Visiting the guide for the first time starts onboarding.
pub async fn onboarding(Extension(visitor): Extension<Visitor>) -> Response {
    let member = match require_member(visitor.snapshot()) {
        Ok(member) => member,
        Err(response) => return response,
    };

    let mut status = status_of(&member);
    if status == Some(OnboardingStatus::New)
        && visitor
            .update_onboarding_status(OnboardingStatus::InProgress)
            .await
            .is_ok()
    {
        status = visitor
            .snapshot()
            .profile
            .map(|profile| profile.onboarding_status)
            .or(status);
    }

    views::render(&OnboardingPage {
        toasts: visitor.take_notifications(),
        chrome: chrome(ONBOARDING_PATH, &member),
        completed: status == Some(OnboardingStatus::Completed),
        progress: ProgressView::onboarding(status),
    })
}

pub async fn complete_onboarding(Extension(visitor): Extension<Visitor>) -> Response {
    if let Err(response) = require_member(visitor.snapshot()) {
        return response;
    }

    // a failure is queued as a notification for the next page
    let _ = visitor
        .update_onboarding_status(OnboardingStatus::Completed)
        .await;

    Redirect::to(ONBOARDING_PATH).into_response()
}

pub async fn groups(Extension(visitor): Extension<Visitor>) -> Response {
    let member = match require_member(visitor.snapshot()) {
        Ok(member) => member,
        Err(response) => return response,
    };

    views::render(&GroupsPage {
        toasts: visitor.take_notifications(),
        chrome: chrome(GROUPS_PATH, &member),
    })
}

pub async fn poc_guide(Extension(visitor): Extension<Visitor>) -> Response {
    let member = match require_member(visitor.snapshot()) {
        Ok(member) => member,
        Err(response) => return response,
    };

    views::render(&PocGuidePage {
        toasts: visitor.take_notifications(),
        chrome: chrome(POC_GUIDE_PATH, &member),
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct ProfileQuery {
    sparat: Option<String>,
}

#[derive(Deserialize)]
pub struct ProfileForm {
    #[serde(default)]
    company_name: String,
}

pub async fn profile(
    Extension(visitor): Extension<Visitor>,
    Query(query): Query<ProfileQuery>,
) -> Response {
    let member = match require_member(visitor.snapshot()) {
        Ok(member) => member,
        Err(response) => return response,
    };

    let profile = member.profile.as_ref();
    views::render(&ProfilePage {
        toasts: visitor.take_notifications(),
        chrome: chrome(PROFILE_PATH, &member),
        company_name: profile
            .and_then(|profile| profile.company_name.clone())
            .unwrap_or_default(),
        email: member.identity.email.clone().unwrap_or_default(),
        member_since: views::swedish_date(profile.map(|profile| &profile.created_at)),
        status_label: views::status_label(profile),
        saved: query.sparat.is_some(),
    })
}

pub async fn save_profile(
    Extension(visitor): Extension<Visitor>,
    Form(form): Form<ProfileForm>,
) -> Response {
    if let Err(response) = require_member(visitor.snapshot()) {
        return response;
    }

    match visitor.update_company_name(&form.company_name).await {
        Ok(()) => Redirect::to(PROFILE_SAVED_PATH).into_response(),
        // the failure toast is shown on the profile page
        Err(_) => Redirect::to(PROFILE_PATH).into_response(),
    }
}
