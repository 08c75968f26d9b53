pub mod auth;
pub mod health;
pub mod member;
pub mod public;

/// Where signed-in visitors are sent.
pub const DASHBOARD_PATH: &str = "/medlem";
