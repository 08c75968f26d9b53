use axum::{
    Router,
    body::Body,
    http::{
        HeaderValue, Request, StatusCode,
        header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE},
    },
    response::Response,
};
use http_body_util::BodyExt;
use portal::backend::{
    Backend, EXTERNAL_MARKET, Lesson, Module, OnboardingStatus, memory::MemoryBackend,
};
use portal::web::{self, AppState, PortalConfig};
use std::{sync::Arc, time::Duration};
use tower::ServiceExt;
use uuid::Uuid;

const EMAIL: &str = "anna@exportbolaget.se";
const PASSWORD: &str = "hemligt1";
const COMPANY: &str = "Exportbolaget AB";
const WAITING_MARKER: &str = "http-equiv=\"refresh\"";

struct Portal {
    app: Router,
    state: AppState,
    backend: Arc<MemoryBackend>,
}

impl Portal {
    fn new() -> Self {
        let backend = Arc::new(MemoryBackend::new());
        let shared: Arc<dyn Backend> = backend.clone();
        let state = AppState::new(
            shared,
            PortalConfig::new("http://localhost:8080".to_string()),
        );
        Self {
            app: web::router(state.clone()),
            state,
            backend,
        }
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.app
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    async fn get(&self, path: &str, cookie: Option<&str>) -> Response {
        let mut builder = Request::builder().uri(path);
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).expect("request"))
            .await
    }

    async fn post(&self, path: &str, form: &str, cookie: Option<&str>) -> Response {
        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        self.send(builder.body(Body::from(form.to_string())).expect("request"))
            .await
    }

    /// GET a private page, re-polling while the waiting page is shown.
    async fn get_resolved(&self, path: &str, cookie: &str) -> (StatusCode, String) {
        for _ in 0..200 {
            let response = self.get(path, Some(cookie)).await;
            let status = response.status();
            let body = body_text(response).await;
            if !body.contains(WAITING_MARKER) {
                return (status, body);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{path} never left the waiting page");
    }

    /// Sign in through the login form and return the session cookie pair.
    async fn sign_in(&self) -> String {
        let response = self.post("/login", &login_form(EMAIL, PASSWORD), None).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), Some("/medlem"));
        session_cookie(&response).expect("session cookie")
    }
}

fn login_form(email: &str, password: &str) -> String {
    format!(
        "email={}&password={}",
        email.replace('@', "%40"),
        password
    )
}

fn location(response: &Response) -> Option<&str> {
    response
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
}

/// `portal_session=<handle>` from the response's `Set-Cookie`.
fn session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value: &HeaderValue| value.to_str().ok())
        .find(|value| value.starts_with("portal_session="))
        .and_then(|value| value.split(';').next())
        .map(str::to_string)
}

async fn body_text(response: Response) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

async fn member(portal: &Portal) -> Uuid {
    portal.backend.add_member(EMAIL, PASSWORD, COMPANY).await
}

#[tokio::test]
async fn health_reports_build_without_session() {
    let portal = Portal::new();
    let response = portal.get("/health", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("X-App").is_some());
    assert!(session_cookie(&response).is_none());

    let json: serde_json::Value =
        serde_json::from_str(&body_text(response).await).expect("json body");
    assert_eq!(json["name"], "portal");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn anonymous_pages_get_request_id_without_session() {
    let portal = Portal::new();
    let response = portal.get("/", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-request-id").is_some());
    assert!(session_cookie(&response).is_none());
}

#[tokio::test]
async fn anonymous_traffic_keeps_no_sessions() {
    let portal = Portal::new();
    for path in ["/", "/om-oss", "/utbildning", "/login", "/finns-inte", "/medlem"] {
        for _ in 0..20 {
            portal.get(path, None).await;
        }
    }
    portal
        .post("/login", &login_form(EMAIL, "fel-lösen"), None)
        .await;
    assert!(portal.state.registry().is_empty().await);
}

#[tokio::test]
async fn sign_in_sets_session_cookie() {
    let portal = Portal::new();
    member(&portal).await;
    let response = portal.post("/login", &login_form(EMAIL, PASSWORD), None).await;

    let cookie = response
        .headers()
        .get(SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .expect("set-cookie");
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
    assert!(!cookie.contains("Secure"));
    assert_eq!(portal.state.registry().len().await, 1);
}

#[tokio::test]
async fn unknown_path_renders_not_found() {
    let portal = Portal::new();
    let response = portal.get("/finns-inte", None).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_text(response).await.contains("Sidan du letar efter finns inte."));
}

#[tokio::test]
async fn forged_cookie_is_replaced_on_sign_in() {
    let portal = Portal::new();
    member(&portal).await;

    let response = portal.get("/", Some("portal_session=forged")).await;
    assert!(session_cookie(&response).is_none());

    let response = portal
        .post(
            "/login",
            &login_form(EMAIL, PASSWORD),
            Some("portal_session=forged"),
        )
        .await;
    let cookie = session_cookie(&response).expect("session cookie");
    assert_ne!(cookie, "portal_session=forged");
}

#[tokio::test]
async fn member_area_redirects_anonymous_visitors() {
    let portal = Portal::new();
    for path in ["/medlem", "/medlem/onboarding", "/medlem/profil", "/update-password"] {
        let response = portal.get(path, None).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{path}");
        assert_eq!(location(&response), Some("/login"), "{path}");
    }
}

#[tokio::test]
async fn sign_in_leads_to_dashboard() {
    let portal = Portal::new();
    member(&portal).await;
    let cookie = portal.sign_in().await;

    let (status, body) = portal.get_resolved("/medlem", &cookie).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(&format!("Välkommen till SOFF, {COMPANY}")));
    assert!(body.contains("Logga ut"));

    // signed-in visitors skip the login page
    let response = portal.get("/login", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/medlem"));
}

#[tokio::test]
async fn wrong_password_shows_fixed_message() {
    let portal = Portal::new();
    member(&portal).await;

    let response = portal
        .post("/login", &login_form(EMAIL, "fel-lösen"), None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_text(response).await;
    assert!(body.contains("Felaktig e-postadress eller lösenord. Försök igen."));
    assert!(!body.contains("Invalid login credentials"));
}

#[tokio::test]
async fn private_page_waits_for_profile() {
    let portal = Portal::new();
    member(&portal).await;
    portal.backend.hold_profiles();

    let cookie = portal.sign_in().await;
    let response = portal.get("/medlem", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains(WAITING_MARKER));

    portal.backend.release_profiles();
    let (status, body) = portal.get_resolved("/medlem", &cookie).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(COMPANY));
}

#[tokio::test]
async fn onboarding_visit_and_completion() {
    let portal = Portal::new();
    let user_id = member(&portal).await;
    let cookie = portal.sign_in().await;

    let (status, body) = portal.get_resolved("/medlem/onboarding", &cookie).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body.contains("Grattis!"));
    let profile = portal.backend.profile(user_id).await.expect("profile");
    assert_eq!(profile.onboarding_status, OnboardingStatus::InProgress);

    let response = portal.post("/medlem/onboarding", "", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/medlem/onboarding"));
    let profile = portal.backend.profile(user_id).await.expect("profile");
    assert_eq!(profile.onboarding_status, OnboardingStatus::Completed);

    let (_, body) = portal.get_resolved("/medlem/onboarding", &cookie).await;
    assert!(body.contains("Grattis!"));
    assert!(body.contains("100%"));
}

#[tokio::test]
async fn failed_profile_save_shows_notification() {
    let portal = Portal::new();
    let user_id = member(&portal).await;
    let cookie = portal.sign_in().await;
    portal.get_resolved("/medlem", &cookie).await;

    portal.backend.set_fail_profile_updates(true);
    let response = portal
        .post("/medlem/profil", "company_name=Nytt+Namn", Some(&cookie))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/medlem/profil"));

    let (_, body) = portal.get_resolved("/medlem/profil", &cookie).await;
    assert!(body.contains("Kunde inte spara ändringar"));
    assert!(body.contains(COMPANY));

    let profile = portal.backend.profile(user_id).await.expect("profile");
    assert_eq!(profile.company_name.as_deref(), Some(COMPANY));

    // shown once
    let (_, body) = portal.get_resolved("/medlem/profil", &cookie).await;
    assert!(!body.contains("Kunde inte spara ändringar"));
}

#[tokio::test]
async fn profile_save_confirms() {
    let portal = Portal::new();
    let user_id = member(&portal).await;
    let cookie = portal.sign_in().await;
    portal.get_resolved("/medlem", &cookie).await;

    let response = portal
        .post("/medlem/profil", "company_name=++Nytt+Namn++", Some(&cookie))
        .await;
    assert_eq!(location(&response), Some("/medlem/profil?sparat=1"));

    let (_, body) = portal
        .get_resolved("/medlem/profil?sparat=1", &cookie)
        .await;
    assert!(body.contains("Sparat!"));
    assert!(body.contains("Nytt Namn"));
    assert!(body.contains(EMAIL));

    let profile = portal.backend.profile(user_id).await.expect("profile");
    assert_eq!(profile.company_name.as_deref(), Some("Nytt Namn"));
}

#[tokio::test]
async fn logout_ends_the_session() {
    let portal = Portal::new();
    member(&portal).await;
    let cookie = portal.sign_in().await;
    portal.get_resolved("/medlem", &cookie).await;

    let response = portal.post("/logga-ut", "", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/login"));
    assert_eq!(portal.backend.sign_outs().await, 1);

    let response = portal.get("/medlem", Some(&cookie)).await;
    assert_eq!(location(&response), Some("/login"));
}

#[tokio::test]
async fn registration_rules() {
    let portal = Portal::new();

    let response = portal
        .post(
            "/registrera",
            "company_name=Ny+Firma&email=ny%40firma.se&password=kort",
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_text(response).await;
    assert!(body.contains("Lösenordet måste vara minst 6 tecken."));
    assert!(body.contains("Ny Firma"));

    let response = portal
        .post(
            "/registrera",
            "company_name=Ny+Firma&email=ny%40firma.se&password=langtlosen",
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response)
        .await
        .contains("Konto skapat! Kontrollera din e-post för att verifiera ditt konto."));

    let response = portal
        .post(
            "/registrera",
            "company_name=Ny+Firma&email=ny%40firma.se&password=langtlosen",
            None,
        )
        .await;
    assert!(body_text(response)
        .await
        .contains("Kunde inte skapa konto. E-postadressen kanske redan används."));
}

#[tokio::test]
async fn confirmed_registration_signs_in() {
    let portal = Portal::new();
    portal.backend.set_auto_confirm(true);

    let response = portal
        .post(
            "/registrera",
            "company_name=Ny+Firma&email=ny%40firma.se&password=langtlosen",
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/medlem"));
}

#[tokio::test]
async fn password_reset_round_trip() {
    let portal = Portal::new();
    member(&portal).await;

    let response = portal
        .post("/forgot-password", &format!("email={}", EMAIL.replace('@', "%40")), None)
        .await;
    assert!(body_text(response).await.contains("E-post skickat!"));
    assert_eq!(
        portal.backend.reset_requests().await,
        vec![(
            EMAIL.to_string(),
            "http://localhost:8080/update-password".to_string()
        )]
    );

    let token = portal
        .backend
        .recovery_token(EMAIL)
        .await
        .expect("recovery token");
    let response = portal
        .get(
            &format!("/update-password?token_hash={token}&type=recovery"),
            None,
        )
        .await;
    assert_eq!(location(&response), Some("/update-password"));
    let cookie = session_cookie(&response).expect("session cookie");

    let (status, body) = portal.get_resolved("/update-password", &cookie).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Välj nytt lösenord"));

    let response = portal
        .post("/update-password", "password=kort", Some(&cookie))
        .await;
    assert!(body_text(response)
        .await
        .contains("Lösenordet måste vara minst 6 tecken."));

    let response = portal
        .post("/update-password", "password=nyttlosen", Some(&cookie))
        .await;
    assert_eq!(location(&response), Some("/medlem"));

    let response = portal
        .post("/login", &login_form(EMAIL, "nyttlosen"), None)
        .await;
    assert_eq!(location(&response), Some("/medlem"));
}

#[tokio::test]
async fn education_lists_catalog_and_progress() {
    let portal = Portal::new();
    let module = Module {
        id: Uuid::new_v4(),
        title: "Exportkontroll".to_string(),
        description: None,
        order_index: 1,
        category: EXTERNAL_MARKET.to_string(),
    };
    let first = Lesson {
        id: Uuid::new_v4(),
        module_id: module.id,
        title: "Grunderna".to_string(),
        content_text: Some("## Vision\n- **ett** steg".to_string()),
        video_url: None,
        order_index: 1,
    };
    let second = Lesson {
        id: Uuid::new_v4(),
        module_id: module.id,
        title: "Licenser".to_string(),
        content_text: Some("Text om licenser".to_string()),
        video_url: Some("https://video.soff.se/licenser".to_string()),
        order_index: 2,
    };
    let second_id = second.id;
    let first_id = first.id;
    portal.backend.add_module(module).await;
    portal.backend.add_lesson(first).await;
    portal.backend.add_lesson(second).await;

    let response = portal.get("/utbildning", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("Exportkontroll"));
    assert!(body.contains("<h2>Vision</h2>"));
    assert!(body.contains("<li><strong>ett</strong> steg</li>"));
    assert!(body.contains("0%"));

    let response = portal
        .get(&format!("/utbildning?lektion={second_id}"), None)
        .await;
    let body = body_text(response).await;
    assert!(body.contains("Text om licenser"));
    assert!(body.contains("Video kommer snart"));

    let user_id = member(&portal).await;
    portal.backend.complete_lesson(user_id, first_id).await;
    let cookie = portal.sign_in().await;
    portal.get_resolved("/medlem", &cookie).await;
    let body = body_text(portal.get("/utbildning", Some(&cookie)).await).await;
    assert!(body.contains("50%"));
}
