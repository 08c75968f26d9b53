//! Access gates for pages.

use super::views;
use crate::backend::{Identity, Profile};
use crate::session::SessionState;
use axum::response::{IntoResponse, Redirect, Response};

pub const LOGIN_PATH: &str = "/login";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    /// Session not resolved yet; show the waiting indicator.
    Waiting,
    Redirect(&'static str),
    Granted,
}

/// Members only.
#[must_use]
pub fn private(state: &SessionState) -> Access {
    if state.loading {
        Access::Waiting
    } else if state.identity.is_none() {
        Access::Redirect(LOGIN_PATH)
    } else {
        Access::Granted
    }
}

/// Public pages never consult the session.
#[must_use]
pub fn public(_state: &SessionState) -> Access {
    Access::Granted
}

/// Signed-in member as seen by a private page.
pub struct Member {
    pub identity: Identity,
    pub profile: Option<Profile>,
}

impl Member {
    /// Company name for the chrome, empty when unknown.
    #[must_use]
    pub fn company(&self) -> &str {
        self.profile
            .as_ref()
            .and_then(Profile::company)
            .unwrap_or_default()
    }
}

/// Apply the private guard, producing the member or the response to send instead.
///
/// # Errors
/// Returns the waiting page or a redirect to the login page.
pub fn require_member(state: SessionState) -> Result<Member, Response> {
    match private(&state) {
        Access::Waiting => Err(views::waiting()),
        Access::Redirect(to) => Err(Redirect::to(to).into_response()),
        Access::Granted => match state.identity {
            Some(identity) => Ok(Member {
                identity,
                profile: state.profile,
            }),
            None => Err(Redirect::to(LOGIN_PATH).into_response()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn identity() -> Identity {
        Identity {
            id: Uuid::new_v4(),
            email: Some("anna@firma.se".to_string()),
        }
    }

    #[test]
    fn loading_waits() {
        let state = SessionState::default();
        assert_eq!(private(&state), Access::Waiting);

        // an identity with a pending profile still waits
        let state = SessionState {
            identity: Some(identity()),
            profile: None,
            loading: true,
        };
        assert_eq!(private(&state), Access::Waiting);
    }

    #[test]
    fn resolved_without_identity_redirects() {
        let state = SessionState {
            identity: None,
            profile: None,
            loading: false,
        };
        assert_eq!(private(&state), Access::Redirect("/login"));
    }

    #[test]
    fn resolved_identity_is_granted_without_profile() {
        let state = SessionState {
            identity: Some(identity()),
            profile: None,
            loading: false,
        };
        assert_eq!(private(&state), Access::Granted);
        let member = require_member(state).ok().expect("member");
        assert_eq!(member.company(), "");
    }

    #[test]
    fn public_always_granted() {
        assert_eq!(public(&SessionState::default()), Access::Granted);
    }
}
