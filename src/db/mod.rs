//! Database module for the PMBlueprints server
//!
//! Row models, the store traits the services depend on, and the
//! PostgreSQL implementation of those traits.

pub mod models;
pub mod operations;
pub mod store;

pub use models::{
    IntegrationCredential, Payment, RatingSummary, RatingView, SubscriptionChange,
    SubscriptionStatus, Template, TemplateRating, TemplateView, User, UserProfile, UserSession,
};
pub use operations::{DbOperations, DbPoolStatus};
pub use store::{
    CredentialStore, FavoriteStore, HealthCheck, PaymentStore, SessionStore, TemplateStore, UserStore,
};
