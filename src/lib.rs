//! # Portal (SOFF member portal)
//!
//! `portal` serves the public pages and the member area of the SOFF member
//! portal. Authentication, profile rows and course content live in a hosted
//! backend service; this crate renders pages and keeps a per-visitor view of
//! who is signed in.
//!
//! ## Sessions
//!
//! A browser that signs in gets an opaque `portal_session` cookie. The cookie
//! maps to a [`session::SessionManager`], which holds the visitor's identity,
//! profile and `loading` flag and re-synchronizes them from the backend's
//! session-change notifications. Anonymous requests run against a throwaway
//! manager; registered managers are stopped once idle.
//!
//! ## Lesson content
//!
//! Lesson bodies use a small line-based markup (headings, lists, bold/italic)
//! rendered by [`content::render`].

pub mod backend;
pub mod cli;
pub mod content;
pub mod progress;
pub mod session;
pub mod web;

pub const GIT_COMMIT_HASH: &str = env!("PORTAL_GIT_SHA");

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
