//! Persistence seams. [`DbOperations`](super::DbOperations) implements every
//! trait against PostgreSQL; tests substitute in-memory or mocked stores.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::access::{UsageCounter, UsageCounters};
use crate::catalog::TemplateQuery;
use crate::db::models::{
    IntegrationCredential, Payment, RatingSummary, RatingView, SubscriptionChange, Template,
    TemplateRating, User, UserSession,
};
use crate::Result;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, user: &User) -> Result<User>;

    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>>;

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn get_user_by_oauth(&self, provider: &str, oauth_id: &str) -> Result<Option<User>>;

    async fn get_user_by_stripe_customer(&self, customer_id: &str) -> Result<Option<User>>;

    async fn link_oauth_identity(&self, id: Uuid, provider: &str, oauth_id: &str) -> Result<()>;

    async fn record_login(&self, id: Uuid) -> Result<()>;

    async fn update_subscription(&self, id: Uuid, change: &SubscriptionChange) -> Result<()>;

    /// Adds one to `counter` only if the stored counters still equal
    /// `observed`. Returns whether the row was updated.
    async fn increment_usage(
        &self,
        id: Uuid,
        counter: UsageCounter,
        observed: &UsageCounters,
    ) -> Result<bool>;

    /// Users whose last reset precedes `period_start`.
    async fn users_due_for_reset(&self, period_start: DateTime<Utc>) -> Result<Vec<User>>;

    /// Zeroes the counters if the user's last reset still precedes
    /// `period_start`. Returns whether the row was updated.
    async fn reset_usage(
        &self,
        id: Uuid,
        period_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: &UserSession) -> Result<UserSession>;

    async fn get_session_by_token(&self, token: &str) -> Result<Option<UserSession>>;

    async fn update_session_activity(&self, token: &str) -> Result<()>;

    async fn delete_session(&self, token: &str) -> Result<()>;

    async fn cleanup_expired_sessions(&self) -> Result<u64>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn count_templates(&self, query: &TemplateQuery) -> Result<i64>;

    /// Ordered by downloads descending, then name, then id.
    async fn find_templates(&self, query: &TemplateQuery, limit: i64, offset: i64) -> Result<Vec<Template>>;

    async fn get_template(&self, id: i64) -> Result<Option<Template>>;

    async fn related_templates(&self, template: &Template, limit: i64) -> Result<Vec<Template>>;

    async fn distinct_industries(&self) -> Result<Vec<String>>;

    async fn distinct_categories(&self) -> Result<Vec<String>>;

    /// Bumps the template's download count and appends a history row.
    async fn record_download(&self, user_id: Uuid, template_id: i64) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Records `payment` and applies `change` to its user in one
    /// transaction. Returns false, changing nothing, when a payment with the
    /// same provider id already exists.
    async fn apply_payment(&self, payment: &Payment, change: &SubscriptionChange) -> Result<bool>;

    async fn payments_for_user(&self, user_id: Uuid) -> Result<Vec<Payment>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FavoriteStore: Send + Sync {
    /// Returns false if the template was already a favorite.
    async fn add_favorite(&self, user_id: Uuid, template_id: i64) -> Result<bool>;

    async fn remove_favorite(&self, user_id: Uuid, template_id: i64) -> Result<bool>;

    /// Template ids, most recently added first.
    async fn favorite_template_ids(&self, user_id: Uuid) -> Result<Vec<i64>>;

    /// Inserts or replaces the user's rating of the template. Returns true
    /// when no earlier rating existed.
    async fn upsert_rating(&self, rating: &TemplateRating) -> Result<bool>;

    async fn rating_summary(&self, template_id: i64) -> Result<RatingSummary>;

    /// Newest first.
    async fn ratings_for_template(&self, template_id: i64) -> Result<Vec<RatingView>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn upsert_credential(&self, credential: &IntegrationCredential) -> Result<()>;

    async fn get_credential(&self, user_id: Uuid, platform: &str) -> Result<Option<IntegrationCredential>>;

    async fn delete_credential(&self, user_id: Uuid, platform: &str) -> Result<bool>;

    async fn connected_platforms(&self, user_id: Uuid) -> Result<Vec<String>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn ping(&self) -> Result<()>;
}
