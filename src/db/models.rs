use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::access::{Tier, UsageCounters};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub display_name: Option<String>,
    pub oauth_provider: Option<String>,
    pub oauth_id: Option<String>,
    pub subscription_tier: String,
    pub subscription_status: String,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub downloads_this_month: i32,
    pub ai_suggestions_this_month: i32,
    pub ai_generations_this_month: i32,
    pub last_usage_reset: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(email: String, display_name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email,
            password_hash: None,
            display_name,
            oauth_provider: None,
            oauth_id: None,
            subscription_tier: Tier::Free.as_str().to_string(),
            subscription_status: SubscriptionStatus::Active.as_str().to_string(),
            stripe_customer_id: None,
            stripe_subscription_id: None,
            downloads_this_month: 0,
            ai_suggestions_this_month: 0,
            ai_generations_this_month: 0,
            last_usage_reset: now,
            created_at: now,
            updated_at: now,
            last_login: None,
        }
    }

    pub fn tier(&self) -> Tier {
        Tier::from_stored(Some(&self.subscription_tier))
    }

    pub fn usage(&self) -> UsageCounters {
        UsageCounters {
            downloads: self.downloads_this_month,
            ai_suggestions: self.ai_suggestions_this_month,
            ai_generations: self.ai_generations_this_month,
        }
    }
}

/// Public view of a user returned by the API.
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub subscription_tier: Tier,
    pub subscription_status: String,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            subscription_tier: user.tier(),
            subscription_status: user.subscription_status.clone(),
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
    PastDue,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::PastDue => "past_due",
        }
    }
}

/// A tier change applied by billing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionChange {
    pub tier: Tier,
    pub status: SubscriptionStatus,
    /// `None` keeps the stored value.
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    /// Zero the counters and start a fresh usage period.
    pub reset_usage: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Template {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub industry: String,
    pub category: String,
    pub file_format: String,
    pub file_path: String,
    pub thumbnail_path: Option<String>,
    pub cdn_url: Option<String>,
    pub downloads_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Template {
    /// CDN image first, then the stored thumbnail, then a name derived from
    /// industry and template name.
    pub fn thumbnail_url(&self) -> String {
        if let Some(url) = self.cdn_url.as_deref().filter(|u| !u.is_empty()) {
            return url.to_string();
        }
        if let Some(path) = self.thumbnail_path.as_deref().filter(|p| !p.is_empty()) {
            return format!("/static/thumbnails/{}", path);
        }

        let raw = format!("{}_{}", self.industry, self.name).replace([' ', '/', '\\'], "_");
        let safe: String = raw
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        format!("/static/thumbnails/{}.png", safe)
    }

    pub fn content_type(&self) -> &'static str {
        match self.file_format.as_str() {
            "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            _ => "application/octet-stream",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateView {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub industry: String,
    pub category: String,
    pub file_format: String,
    pub thumbnail: String,
    pub downloads: i64,
}

impl From<&Template> for TemplateView {
    fn from(template: &Template) -> Self {
        Self {
            id: template.id,
            name: template.name.clone(),
            description: template.description.clone(),
            industry: template.industry.clone(),
            category: template.category.clone(),
            file_format: template.file_format.clone(),
            thumbnail: template.thumbnail_url(),
            downloads: template.downloads_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl UserSession {
    pub fn new(user_id: Uuid, token: String, expires_in_hours: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            token,
            expires_at: now + chrono::Duration::hours(expires_in_hours),
            created_at: now,
            last_activity: now,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub stripe_payment_id: Option<String>,
    pub stripe_invoice_id: Option<String>,
    pub subscription_tier: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct IntegrationCredential {
    pub user_id: Uuid,
    pub platform: String,
    pub encrypted_token: String,
    pub nonce: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TemplateRating {
    pub user_id: Uuid,
    pub template_id: i64,
    pub rating: i32,
    pub review: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public view of one rating. Reviewers appear by display name only.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct RatingView {
    pub rating: i32,
    pub review: Option<String>,
    pub user_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, FromRow, PartialEq)]
pub struct RatingSummary {
    pub average: Option<f64>,
    pub total: i64,
}
