//! HTTP surface: routing, the visitor session layer and server startup.

use crate::session::SessionManager;
use anyhow::Result;
use axum::{
    Router,
    body::Body,
    extract::{Request, State},
    http::{HeaderName, HeaderValue, header::SET_COOKIE},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use std::{ops::Deref, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{Span, debug_span, error, info};
use ulid::Ulid;

pub mod cookies;
pub mod guards;
mod handlers;
pub mod state;
pub mod views;

pub use state::{AppState, PortalConfig};

/// Session manager of the visitor behind the current request.
#[derive(Clone)]
pub struct Visitor(Arc<SessionManager>);

impl Deref for Visitor {
    type Target = SessionManager;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

pub fn router(state: AppState) -> Router {
    let pages = Router::new()
        .route("/", get(handlers::public::landing))
        .route("/utbildning", get(handlers::public::education))
        .route("/om-oss", get(handlers::public::about))
        .route(
            "/login",
            get(handlers::auth::login_page).post(handlers::auth::login),
        )
        .route("/registrera", post(handlers::auth::register))
        .route(
            "/forgot-password",
            get(handlers::auth::forgot_password_page).post(handlers::auth::forgot_password),
        )
        .route(
            "/update-password",
            get(handlers::auth::update_password_page).post(handlers::auth::update_password),
        )
        .route("/logga-ut", post(handlers::auth::logout))
        .route("/medlem", get(handlers::member::dashboard))
        .route(
            "/medlem/onboarding",
            get(handlers::member::onboarding).post(handlers::member::complete_onboarding),
        )
        .route("/medlem/grupper", get(handlers::member::groups))
        .route("/medlem/poc-guide", get(handlers::member::poc_guide))
        .route(
            "/medlem/profil",
            get(handlers::member::profile).post(handlers::member::save_profile),
        )
        .fallback(handlers::public::not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            attach_visitor,
        ));

    pages
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span)),
        )
        .route(
            "/health",
            get(handlers::health::health).options(handlers::health::health),
        )
        .with_state(state)
}

/// Resolve the visitor's session from the cookie and refresh the cookie on the way out.
/// Visitors without a known session get a guest manager that is only
/// registered if the request leaves it holding state.
async fn attach_visitor(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let registry = state.registry();
    let handle = cookies::session_handle(request.headers());
    let (manager, handle) = match registry.find(handle.as_deref()).await {
        Some(resolved) => (resolved.manager, Some(resolved.handle)),
        None => (registry.guest().await, None),
    };

    request
        .extensions_mut()
        .insert(Visitor(Arc::clone(&manager)));

    let mut response = next.run(request).await;

    let handle = match handle {
        Some(handle) => handle,
        None if manager.holds_state() => registry.admit(manager).await,
        None => {
            manager.stop().await;
            return response;
        }
    };

    let config = state.config();
    match cookies::session_cookie(
        &handle,
        config.session_ttl_seconds(),
        config.cookie_secure(),
    ) {
        Ok(cookie) => {
            response.headers_mut().append(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build session cookie: {err}"),
    }

    response
}

/// Bind and serve until ctrl-c.
///
/// # Errors
/// Returns an error if the listener cannot be bound or the server fails
pub async fn serve(port: u16, state: AppState) -> Result<()> {
    let app = router(state);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {err}");
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let headers = request.headers();
    let path = request.uri().path();
    let request_id = headers
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    // headers stay out of the span: they carry the session cookie
    debug_span!("http-request", method = %request.method(), path, request_id)
}
