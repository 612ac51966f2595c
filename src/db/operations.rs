use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::access::{UsageCounter, UsageCounters};
use crate::catalog::{MatchMode, TemplateQuery};
use crate::db::models::{
    IntegrationCredential, Payment, RatingSummary, RatingView, SubscriptionChange, Template,
    TemplateRating, User, UserSession,
};
use crate::db::store::{
    CredentialStore, FavoriteStore, HealthCheck, PaymentStore, SessionStore, TemplateStore,
    UserStore,
};
use crate::Result;

const USER_COLUMNS: &str = "id, email, password_hash, display_name, oauth_provider, oauth_id, \
    subscription_tier, subscription_status, stripe_customer_id, stripe_subscription_id, \
    downloads_this_month, ai_suggestions_this_month, ai_generations_this_month, \
    last_usage_reset, created_at, updated_at, last_login";

const TEMPLATE_COLUMNS: &str = "id, name, description, industry, category, file_format, \
    file_path, thumbnail_path, cdn_url, downloads_count, created_at, updated_at";

pub struct DbOperations {
    pool: Arc<PgPool>,
}

impl DbOperations {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn new_with_options(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await?;

        Ok(Self { pool: Arc::new(pool) })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(self.pool.as_ref()).await?;
        Ok(())
    }

    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    pub fn get_pool_status(&self) -> DbPoolStatus {
        let size = self.pool.size();
        let idle = self.pool.num_idle() as u32;

        DbPoolStatus {
            total_connections: size,
            active_connections: size.saturating_sub(idle),
            idle_connections: idle,
        }
    }

    pub async fn begin_transaction(&self) -> Result<Transaction<'_, Postgres>> {
        Ok(self.pool.as_ref().begin().await?)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Builds the UPDATE applying `change` to user `id`.
fn subscription_update(id: Uuid, change: &SubscriptionChange) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::<Postgres>::new("UPDATE users SET subscription_tier = ");
    builder
        .push_bind(change.tier.as_str())
        .push(", subscription_status = ")
        .push_bind(change.status.as_str())
        .push(", updated_at = NOW()");

    if let Some(customer) = &change.stripe_customer_id {
        builder.push(", stripe_customer_id = ").push_bind(customer.clone());
    }
    if let Some(subscription) = &change.stripe_subscription_id {
        builder.push(", stripe_subscription_id = ").push_bind(subscription.clone());
    }
    if change.reset_usage {
        builder.push(
            ", downloads_this_month = 0, ai_suggestions_this_month = 0, \
             ai_generations_this_month = 0, last_usage_reset = NOW()",
        );
    }
    builder.push(" WHERE id = ").push_bind(id);
    builder
}

/// Appends the WHERE clause for `query` to `builder`.
fn push_template_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &TemplateQuery) {
    let filters = query.structured_filters();
    let mut has_where = false;

    if !filters.is_empty() {
        let joiner = match query.mode {
            MatchMode::All => " AND ",
            MatchMode::Any => " OR ",
        };
        builder.push(" WHERE (");
        for (i, (field, value)) in filters.into_iter().enumerate() {
            if i > 0 {
                builder.push(joiner);
            }
            builder.push(field.column()).push(" = ").push_bind(value.to_string());
        }
        builder.push(")");
        has_where = true;
    }

    if let Some(search) = query.search_term() {
        let pattern = format!("%{}%", escape_like(search));
        builder.push(if has_where { " AND " } else { " WHERE " });
        builder
            .push("(name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR COALESCE(description, '') ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

fn escape_like(value: &str) -> String {
    value.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[async_trait]
impl UserStore for DbOperations {
    async fn create_user(&self, user: &User) -> Result<User> {
        let sql = format!(
            "INSERT INTO users (id, email, password_hash, display_name, oauth_provider, oauth_id, \
             subscription_tier, subscription_status, last_usage_reset, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING {USER_COLUMNS}"
        );
        let created = sqlx::query_as::<_, User>(&sql)
            .bind(user.id)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.display_name)
            .bind(&user.oauth_provider)
            .bind(&user.oauth_id)
            .bind(&user.subscription_tier)
            .bind(&user.subscription_status)
            .bind(user.last_usage_reset)
            .bind(user.created_at)
            .bind(user.updated_at)
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(created)
    }

    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(user)
    }

    async fn get_user_by_oauth(&self, provider: &str, oauth_id: &str) -> Result<Option<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE oauth_provider = $1 AND oauth_id = $2"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(provider)
            .bind(oauth_id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(user)
    }

    async fn get_user_by_stripe_customer(&self, customer_id: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE stripe_customer_id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(customer_id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(user)
    }

    async fn link_oauth_identity(&self, id: Uuid, provider: &str, oauth_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE users SET oauth_provider = $2, oauth_id = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(provider)
        .bind(oauth_id)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn record_login(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE users SET last_login = $2 WHERE id = $1")
            .bind(id)
            .bind(Utc::now())
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn update_subscription(&self, id: Uuid, change: &SubscriptionChange) -> Result<()> {
        let result = subscription_update(id, change).build().execute(self.pool.as_ref()).await?;
        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound.into());
        }

        Ok(())
    }

    async fn increment_usage(
        &self,
        id: Uuid,
        counter: UsageCounter,
        observed: &UsageCounters,
    ) -> Result<bool> {
        let column = counter.column();
        let sql = format!(
            "UPDATE users SET {column} = {column} + 1, updated_at = NOW() \
             WHERE id = $1 AND downloads_this_month = $2 \
             AND ai_suggestions_this_month = $3 AND ai_generations_this_month = $4"
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(observed.downloads)
            .bind(observed.ai_suggestions)
            .bind(observed.ai_generations)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn users_due_for_reset(&self, period_start: DateTime<Utc>) -> Result<Vec<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE last_usage_reset < $1 ORDER BY created_at"
        );
        let users = sqlx::query_as::<_, User>(&sql)
            .bind(period_start)
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(users)
    }

    async fn reset_usage(
        &self,
        id: Uuid,
        period_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE users SET downloads_this_month = 0, ai_suggestions_this_month = 0, \
             ai_generations_this_month = 0, last_usage_reset = $3, updated_at = $3 \
             WHERE id = $1 AND last_usage_reset < $2",
        )
        .bind(id)
        .bind(period_start)
        .bind(now)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl SessionStore for DbOperations {
    async fn create_session(&self, session: &UserSession) -> Result<UserSession> {
        let session = sqlx::query_as::<_, UserSession>(
            "INSERT INTO user_sessions (id, user_id, token, expires_at, created_at, last_activity) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, user_id, token, expires_at, created_at, last_activity",
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.token)
        .bind(session.expires_at)
        .bind(session.created_at)
        .bind(session.last_activity)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(session)
    }

    async fn get_session_by_token(&self, token: &str) -> Result<Option<UserSession>> {
        let session = sqlx::query_as::<_, UserSession>(
            "SELECT id, user_id, token, expires_at, created_at, last_activity \
             FROM user_sessions WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(session)
    }

    async fn update_session_activity(&self, token: &str) -> Result<()> {
        sqlx::query("UPDATE user_sessions SET last_activity = $1 WHERE token = $2")
            .bind(Utc::now())
            .bind(token)
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn delete_session(&self, token: &str) -> Result<()> {
        sqlx::query("DELETE FROM user_sessions WHERE token = $1")
            .bind(token)
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn cleanup_expired_sessions(&self) -> Result<u64> {
        let mut transaction = self.begin_transaction().await?;

        let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at < $1")
            .bind(Utc::now())
            .execute(&mut *transaction)
            .await;

        match result {
            Ok(result) => {
                transaction.commit().await?;
                Ok(result.rows_affected())
            }
            Err(e) => {
                transaction.rollback().await?;
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl TemplateStore for DbOperations {
    async fn count_templates(&self, query: &TemplateQuery) -> Result<i64> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM templates");
        push_template_filters(&mut builder, query);

        let count: i64 = builder
            .build_query_scalar()
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(count)
    }

    async fn find_templates(&self, query: &TemplateQuery, limit: i64, offset: i64) -> Result<Vec<Template>> {
        let mut builder =
            QueryBuilder::<Postgres>::new(format!("SELECT {TEMPLATE_COLUMNS} FROM templates"));
        push_template_filters(&mut builder, query);
        builder
            .push(" ORDER BY downloads_count DESC, name ASC, id ASC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let templates = builder
            .build_query_as::<Template>()
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(templates)
    }

    async fn get_template(&self, id: i64) -> Result<Option<Template>> {
        let sql = format!("SELECT {TEMPLATE_COLUMNS} FROM templates WHERE id = $1");
        let template = sqlx::query_as::<_, Template>(&sql)
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(template)
    }

    async fn related_templates(&self, template: &Template, limit: i64) -> Result<Vec<Template>> {
        let sql = format!(
            "SELECT {TEMPLATE_COLUMNS} FROM templates WHERE industry = $1 AND id <> $2 \
             ORDER BY downloads_count DESC, name ASC LIMIT $3"
        );
        let related = sqlx::query_as::<_, Template>(&sql)
            .bind(&template.industry)
            .bind(template.id)
            .bind(limit)
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(related)
    }

    async fn distinct_industries(&self) -> Result<Vec<String>> {
        let industries = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT industry FROM templates ORDER BY industry",
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(industries)
    }

    async fn distinct_categories(&self) -> Result<Vec<String>> {
        let categories = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT category FROM templates ORDER BY category",
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(categories)
    }

    async fn record_download(&self, user_id: Uuid, template_id: i64) -> Result<()> {
        let mut transaction = self.begin_transaction().await?;

        sqlx::query(
            "UPDATE templates SET downloads_count = downloads_count + 1, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(template_id)
        .execute(&mut *transaction)
        .await?;

        sqlx::query("INSERT INTO download_history (user_id, template_id) VALUES ($1, $2)")
            .bind(user_id)
            .bind(template_id)
            .execute(&mut *transaction)
            .await?;

        transaction.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for DbOperations {
    async fn apply_payment(&self, payment: &Payment, change: &SubscriptionChange) -> Result<bool> {
        let mut transaction = self.begin_transaction().await?;

        let inserted = sqlx::query(
            "INSERT INTO payments (id, user_id, amount_cents, currency, status, stripe_payment_id, \
             stripe_invoice_id, subscription_tier, description, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT DO NOTHING",
        )
        .bind(payment.id)
        .bind(payment.user_id)
        .bind(payment.amount_cents)
        .bind(&payment.currency)
        .bind(&payment.status)
        .bind(&payment.stripe_payment_id)
        .bind(&payment.stripe_invoice_id)
        .bind(&payment.subscription_tier)
        .bind(&payment.description)
        .bind(payment.created_at)
        .execute(&mut *transaction)
        .await?;

        if inserted.rows_affected() == 0 {
            transaction.rollback().await?;
            return Ok(false);
        }

        let updated = subscription_update(payment.user_id, change)
            .build()
            .execute(&mut *transaction)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound.into());
        }

        transaction.commit().await?;
        Ok(true)
    }

    async fn payments_for_user(&self, user_id: Uuid) -> Result<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(
            "SELECT id, user_id, amount_cents, currency, status, stripe_payment_id, \
             stripe_invoice_id, subscription_tier, description, created_at \
             FROM payments WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(payments)
    }
}

#[async_trait]
impl FavoriteStore for DbOperations {
    async fn add_favorite(&self, user_id: Uuid, template_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO favorites (user_id, template_id, created_at) VALUES ($1, $2, NOW()) \
             ON CONFLICT (user_id, template_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(template_id)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn remove_favorite(&self, user_id: Uuid, template_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM favorites WHERE user_id = $1 AND template_id = $2")
            .bind(user_id)
            .bind(template_id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn favorite_template_ids(&self, user_id: Uuid) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT template_id FROM favorites WHERE user_id = $1 ORDER BY created_at DESC, template_id",
        )
        .bind(user_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(ids)
    }

    async fn upsert_rating(&self, rating: &TemplateRating) -> Result<bool> {
        // xmax is zero only for a freshly inserted row.
        let inserted = sqlx::query_scalar::<_, bool>(
            "INSERT INTO template_ratings (user_id, template_id, rating, review, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (user_id, template_id) DO UPDATE SET \
             rating = EXCLUDED.rating, review = EXCLUDED.review, updated_at = EXCLUDED.updated_at \
             RETURNING (xmax = 0)",
        )
        .bind(rating.user_id)
        .bind(rating.template_id)
        .bind(rating.rating)
        .bind(&rating.review)
        .bind(rating.created_at)
        .bind(rating.updated_at)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(inserted)
    }

    async fn rating_summary(&self, template_id: i64) -> Result<RatingSummary> {
        let summary = sqlx::query_as::<_, RatingSummary>(
            "SELECT AVG(rating)::FLOAT8 AS average, COUNT(*) AS total \
             FROM template_ratings WHERE template_id = $1",
        )
        .bind(template_id)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(summary)
    }

    async fn ratings_for_template(&self, template_id: i64) -> Result<Vec<RatingView>> {
        let ratings = sqlx::query_as::<_, RatingView>(
            "SELECT r.rating, r.review, COALESCE(NULLIF(u.display_name, ''), 'Anonymous') AS user_name, \
             r.created_at \
             FROM template_ratings r JOIN users u ON u.id = r.user_id \
             WHERE r.template_id = $1 ORDER BY r.created_at DESC",
        )
        .bind(template_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(ratings)
    }
}

#[async_trait]
impl CredentialStore for DbOperations {
    async fn upsert_credential(&self, credential: &IntegrationCredential) -> Result<()> {
        sqlx::query(
            "INSERT INTO integration_credentials \
             (user_id, platform, encrypted_token, nonce, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (user_id, platform) DO UPDATE SET \
             encrypted_token = EXCLUDED.encrypted_token, nonce = EXCLUDED.nonce, \
             updated_at = EXCLUDED.updated_at",
        )
        .bind(credential.user_id)
        .bind(&credential.platform)
        .bind(&credential.encrypted_token)
        .bind(&credential.nonce)
        .bind(credential.created_at)
        .bind(credential.updated_at)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn get_credential(&self, user_id: Uuid, platform: &str) -> Result<Option<IntegrationCredential>> {
        let credential = sqlx::query_as::<_, IntegrationCredential>(
            "SELECT user_id, platform, encrypted_token, nonce, created_at, updated_at \
             FROM integration_credentials WHERE user_id = $1 AND platform = $2",
        )
        .bind(user_id)
        .bind(platform)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(credential)
    }

    async fn delete_credential(&self, user_id: Uuid, platform: &str) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM integration_credentials WHERE user_id = $1 AND platform = $2",
        )
        .bind(user_id)
        .bind(platform)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn connected_platforms(&self, user_id: Uuid) -> Result<Vec<String>> {
        let platforms = sqlx::query_scalar::<_, String>(
            "SELECT platform FROM integration_credentials WHERE user_id = $1 ORDER BY platform",
        )
        .bind(user_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(platforms)
    }
}

#[async_trait]
impl HealthCheck for DbOperations {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(self.pool.as_ref()).await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct DbPoolStatus {
    pub total_connections: u32,
    pub active_connections: u32,
    pub idle_connections: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TemplateFilter;

    fn sql_for(query: &TemplateQuery) -> String {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM templates");
        push_template_filters(&mut builder, query);
        builder.sql().to_string()
    }

    #[test]
    fn conjunctive_filter_sql() {
        let filter = TemplateFilter {
            industry: Some("AI_ML".into()),
            category: Some("Action_Item_Log".into()),
            search: None,
        };
        let sql = sql_for(&filter.to_query(MatchMode::All));
        assert_eq!(
            sql,
            "SELECT COUNT(*) FROM templates WHERE (industry = $1 AND category = $2)"
        );
    }

    #[test]
    fn disjunctive_filter_sql_keeps_search_conjunctive() {
        let filter = TemplateFilter {
            industry: Some("AI_ML".into()),
            category: Some("Action_Item_Log".into()),
            search: Some("risk".into()),
        };
        let sql = sql_for(&filter.to_query(MatchMode::Any));
        assert_eq!(
            sql,
            "SELECT COUNT(*) FROM templates WHERE (industry = $1 OR category = $2) \
             AND (name ILIKE $3 OR COALESCE(description, '') ILIKE $4)"
        );
    }

    #[test]
    fn unfiltered_sql_has_no_where() {
        let sql = sql_for(&TemplateFilter::default().to_query(MatchMode::All));
        assert_eq!(sql, "SELECT COUNT(*) FROM templates");
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("100%_done\\"), "100\\%\\_done\\\\");
    }
}
