use thiserror::Error;

/// Outcome of a failed call to the hosted backend.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("invalid login credentials")]
    InvalidCredentials,
    #[error("user already registered")]
    AlreadyRegistered,
    #[error("not signed in")]
    NotSignedIn,
    #[error("no matching row")]
    NotFound,
    #[error("request failed ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("response error: {0}")]
    Parse(String),
    #[error("config error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<url::ParseError> for BackendError {
    fn from(err: url::ParseError) -> Self {
        Self::Config(err.to_string())
    }
}
