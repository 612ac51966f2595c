//! Authentication module
//!
//! Email/password and OAuth login, JWT-backed sessions and the
//! [`AuthenticatedUser`] request extractor.

pub mod extractor;
pub mod handlers;
pub mod password;
mod service;

pub use extractor::AuthenticatedUser;
pub use service::{AuthService, Claims, OAuthIdentity, OAuthProvider};
