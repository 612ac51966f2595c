#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use actix_web::web;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use pmblueprints_server::access::{Tier, UsageCounter, UsageCounters};
use pmblueprints_server::ai::{CompletionRequest, GeneratedDocument};
use pmblueprints_server::auth::password::hash_password;
use pmblueprints_server::catalog::TemplateQuery;
use pmblueprints_server::db::{
    IntegrationCredential, Payment, RatingSummary, RatingView, SubscriptionChange, Template, TemplateRating,
};
use pmblueprints_server::error::{DatabaseError, UpstreamError};
use pmblueprints_server::integrations::{ExportResult, Platform};
use pmblueprints_server::{
    AppError, AppState, CredentialStore, FavoriteStore, HealthCheck, LanguageModel, PaymentStore,
    PlatformExporter, SessionStore, Settings, TemplateStore, User, UserSession, UserStore,
};

pub const PASSWORD: &str = "correct-horse-battery";
pub const ADMIN_TOKEN: &str = "admin-secret";
pub const WEBHOOK_SECRET: &str = "whsec_test";

/// In-process store with the same semantics as the PostgreSQL one.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    sessions: RwLock<HashMap<String, UserSession>>,
    templates: RwLock<Vec<Template>>,
    downloads: RwLock<Vec<(Uuid, i64)>>,
    payments: RwLock<Vec<Payment>>,
    credentials: RwLock<HashMap<(Uuid, String), IntegrationCredential>>,
    favorites: RwLock<Vec<(Uuid, i64, DateTime<Utc>)>>,
    ratings: RwLock<Vec<TemplateRating>>,
    failing_subscription_updates: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn insert_user(&self, user: User) {
        self.users.write().await.insert(user.id, user);
    }

    pub async fn insert_template(&self, template: Template) {
        self.templates.write().await.push(template);
    }

    pub async fn user(&self, id: Uuid) -> User {
        self.users.read().await.get(&id).cloned().expect("user exists")
    }

    pub async fn set_last_reset(&self, id: Uuid, at: DateTime<Utc>) {
        if let Some(user) = self.users.write().await.get_mut(&id) {
            user.last_usage_reset = at;
        }
    }

    pub async fn set_usage(&self, id: Uuid, usage: UsageCounters) {
        if let Some(user) = self.users.write().await.get_mut(&id) {
            user.downloads_this_month = usage.downloads;
            user.ai_suggestions_this_month = usage.ai_suggestions;
            user.ai_generations_this_month = usage.ai_generations;
        }
    }

    pub async fn download_history(&self) -> Vec<(Uuid, i64)> {
        self.downloads.read().await.clone()
    }

    /// Makes the next `count` subscription changes fail like a lost
    /// database connection.
    pub fn fail_subscription_updates(&self, count: usize) {
        self.failing_subscription_updates.store(count, Ordering::SeqCst);
    }

    fn injected_failure(&self) -> pmblueprints_server::Result<()> {
        let remaining = self.failing_subscription_updates.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_subscription_updates.store(remaining - 1, Ordering::SeqCst);
            return Err(AppError::DatabaseError(DatabaseError::ConnectionError(
                "connection reset".into(),
            )));
        }
        Ok(())
    }

    pub async fn all_payments(&self) -> Vec<Payment> {
        self.payments.read().await.clone()
    }

    pub async fn credential(&self, user_id: Uuid, platform: &str) -> Option<IntegrationCredential> {
        self.credentials
            .read()
            .await
            .get(&(user_id, platform.to_string()))
            .cloned()
    }
}

fn apply_change(user: &mut User, change: &SubscriptionChange) {
    user.subscription_tier = change.tier.as_str().to_string();
    user.subscription_status = change.status.as_str().to_string();
    if let Some(customer) = &change.stripe_customer_id {
        user.stripe_customer_id = Some(customer.clone());
    }
    if let Some(subscription) = &change.stripe_subscription_id {
        user.stripe_subscription_id = Some(subscription.clone());
    }
    if change.reset_usage {
        user.downloads_this_month = 0;
        user.ai_suggestions_this_month = 0;
        user.ai_generations_this_month = 0;
        user.last_usage_reset = Utc::now();
    }
    user.updated_at = Utc::now();
}

fn sorted(mut templates: Vec<Template>) -> Vec<Template> {
    templates.sort_by(|a, b| {
        b.downloads_count
            .cmp(&a.downloads_count)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.id.cmp(&b.id))
    });
    templates
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, user: &User) -> pmblueprints_server::Result<User> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == user.email) {
            return Err(DatabaseError::Duplicate.into());
        }
        users.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn get_user_by_id(&self, id: Uuid) -> pmblueprints_server::Result<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> pmblueprints_server::Result<Option<User>> {
        Ok(self.users.read().await.values().find(|u| u.email == email).cloned())
    }

    async fn get_user_by_oauth(&self, provider: &str, oauth_id: &str) -> pmblueprints_server::Result<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.oauth_provider.as_deref() == Some(provider) && u.oauth_id.as_deref() == Some(oauth_id))
            .cloned())
    }

    async fn get_user_by_stripe_customer(&self, customer_id: &str) -> pmblueprints_server::Result<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.stripe_customer_id.as_deref() == Some(customer_id))
            .cloned())
    }

    async fn link_oauth_identity(&self, id: Uuid, provider: &str, oauth_id: &str) -> pmblueprints_server::Result<()> {
        let mut users = self.users.write().await;
        let user = users.get_mut(&id).ok_or(DatabaseError::NotFound)?;
        user.oauth_provider = Some(provider.to_string());
        user.oauth_id = Some(oauth_id.to_string());
        Ok(())
    }

    async fn record_login(&self, id: Uuid) -> pmblueprints_server::Result<()> {
        if let Some(user) = self.users.write().await.get_mut(&id) {
            user.last_login = Some(Utc::now());
        }
        Ok(())
    }

    async fn update_subscription(&self, id: Uuid, change: &SubscriptionChange) -> pmblueprints_server::Result<()> {
        self.injected_failure()?;
        let mut users = self.users.write().await;
        let user = users.get_mut(&id).ok_or(DatabaseError::NotFound)?;
        apply_change(user, change);
        Ok(())
    }

    async fn increment_usage(
        &self,
        id: Uuid,
        counter: UsageCounter,
        observed: &UsageCounters,
    ) -> pmblueprints_server::Result<bool> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(&id) else {
            return Ok(false);
        };
        if user.usage() != *observed {
            return Ok(false);
        }
        match counter {
            UsageCounter::Downloads => user.downloads_this_month += 1,
            UsageCounter::AiSuggestions => user.ai_suggestions_this_month += 1,
            UsageCounter::AiGenerations => user.ai_generations_this_month += 1,
        }
        Ok(true)
    }

    async fn users_due_for_reset(&self, period_start: DateTime<Utc>) -> pmblueprints_server::Result<Vec<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .filter(|u| u.last_usage_reset < period_start)
            .cloned()
            .collect())
    }

    async fn reset_usage(
        &self,
        id: Uuid,
        period_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> pmblueprints_server::Result<bool> {
        let mut users = self.users.write().await;
        match users.get_mut(&id) {
            Some(user) if user.last_usage_reset < period_start => {
                user.downloads_this_month = 0;
                user.ai_suggestions_this_month = 0;
                user.ai_generations_this_month = 0;
                user.last_usage_reset = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, session: &UserSession) -> pmblueprints_server::Result<UserSession> {
        self.sessions
            .write()
            .await
            .insert(session.token.clone(), session.clone());
        Ok(session.clone())
    }

    async fn get_session_by_token(&self, token: &str) -> pmblueprints_server::Result<Option<UserSession>> {
        Ok(self.sessions.read().await.get(token).cloned())
    }

    async fn update_session_activity(&self, token: &str) -> pmblueprints_server::Result<()> {
        if let Some(session) = self.sessions.write().await.get_mut(token) {
            session.last_activity = Utc::now();
        }
        Ok(())
    }

    async fn delete_session(&self, token: &str) -> pmblueprints_server::Result<()> {
        self.sessions.write().await.remove(token);
        Ok(())
    }

    async fn cleanup_expired_sessions(&self) -> pmblueprints_server::Result<u64> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired());
        Ok((before - sessions.len()) as u64)
    }
}

#[async_trait]
impl TemplateStore for MemoryStore {
    async fn count_templates(&self, query: &TemplateQuery) -> pmblueprints_server::Result<i64> {
        Ok(self.templates.read().await.iter().filter(|t| query.matches(t)).count() as i64)
    }

    async fn find_templates(
        &self,
        query: &TemplateQuery,
        limit: i64,
        offset: i64,
    ) -> pmblueprints_server::Result<Vec<Template>> {
        let matching = self
            .templates
            .read()
            .await
            .iter()
            .filter(|t| query.matches(t))
            .cloned()
            .collect();
        Ok(sorted(matching)
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn get_template(&self, id: i64) -> pmblueprints_server::Result<Option<Template>> {
        Ok(self.templates.read().await.iter().find(|t| t.id == id).cloned())
    }

    async fn related_templates(&self, template: &Template, limit: i64) -> pmblueprints_server::Result<Vec<Template>> {
        let related = self
            .templates
            .read()
            .await
            .iter()
            .filter(|t| t.industry == template.industry && t.id != template.id)
            .cloned()
            .collect();
        Ok(sorted(related).into_iter().take(limit.max(0) as usize).collect())
    }

    async fn distinct_industries(&self) -> pmblueprints_server::Result<Vec<String>> {
        let mut industries: Vec<String> = self.templates.read().await.iter().map(|t| t.industry.clone()).collect();
        industries.sort();
        industries.dedup();
        Ok(industries)
    }

    async fn distinct_categories(&self) -> pmblueprints_server::Result<Vec<String>> {
        let mut categories: Vec<String> = self.templates.read().await.iter().map(|t| t.category.clone()).collect();
        categories.sort();
        categories.dedup();
        Ok(categories)
    }

    async fn record_download(&self, user_id: Uuid, template_id: i64) -> pmblueprints_server::Result<()> {
        let mut templates = self.templates.write().await;
        let template = templates
            .iter_mut()
            .find(|t| t.id == template_id)
            .ok_or(DatabaseError::NotFound)?;
        template.downloads_count += 1;
        self.downloads.write().await.push((user_id, template_id));
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn apply_payment(&self, payment: &Payment, change: &SubscriptionChange) -> pmblueprints_server::Result<bool> {
        let mut payments = self.payments.write().await;
        let replay = payment.stripe_payment_id.is_some()
            && payments.iter().any(|p| p.stripe_payment_id == payment.stripe_payment_id);
        if replay {
            return Ok(false);
        }

        self.injected_failure()?;
        let mut users = self.users.write().await;
        let user = users.get_mut(&payment.user_id).ok_or(DatabaseError::NotFound)?;
        apply_change(user, change);
        payments.push(payment.clone());
        Ok(true)
    }

    async fn payments_for_user(&self, user_id: Uuid) -> pmblueprints_server::Result<Vec<Payment>> {
        let mut payments: Vec<Payment> = self
            .payments
            .read()
            .await
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payments)
    }
}

#[async_trait]
impl FavoriteStore for MemoryStore {
    async fn add_favorite(&self, user_id: Uuid, template_id: i64) -> pmblueprints_server::Result<bool> {
        let mut favorites = self.favorites.write().await;
        if favorites.iter().any(|(u, t, _)| *u == user_id && *t == template_id) {
            return Ok(false);
        }
        favorites.push((user_id, template_id, Utc::now()));
        Ok(true)
    }

    async fn remove_favorite(&self, user_id: Uuid, template_id: i64) -> pmblueprints_server::Result<bool> {
        let mut favorites = self.favorites.write().await;
        let before = favorites.len();
        favorites.retain(|(u, t, _)| !(*u == user_id && *t == template_id));
        Ok(favorites.len() < before)
    }

    async fn favorite_template_ids(&self, user_id: Uuid) -> pmblueprints_server::Result<Vec<i64>> {
        let mut mine: Vec<(i64, DateTime<Utc>)> = self
            .favorites
            .read()
            .await
            .iter()
            .filter(|(u, _, _)| *u == user_id)
            .map(|(_, t, at)| (*t, *at))
            .collect();
        mine.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(mine.into_iter().map(|(t, _)| t).collect())
    }

    async fn upsert_rating(&self, rating: &TemplateRating) -> pmblueprints_server::Result<bool> {
        let mut ratings = self.ratings.write().await;
        match ratings
            .iter_mut()
            .find(|r| r.user_id == rating.user_id && r.template_id == rating.template_id)
        {
            Some(existing) => {
                existing.rating = rating.rating;
                existing.review = rating.review.clone();
                existing.updated_at = rating.updated_at;
                Ok(false)
            }
            None => {
                ratings.push(rating.clone());
                Ok(true)
            }
        }
    }

    async fn rating_summary(&self, template_id: i64) -> pmblueprints_server::Result<RatingSummary> {
        let ratings = self.ratings.read().await;
        let values: Vec<i32> = ratings
            .iter()
            .filter(|r| r.template_id == template_id)
            .map(|r| r.rating)
            .collect();
        let total = values.len() as i64;
        let average = (total > 0).then(|| values.iter().map(|v| *v as f64).sum::<f64>() / total as f64);
        Ok(RatingSummary { average, total })
    }

    async fn ratings_for_template(&self, template_id: i64) -> pmblueprints_server::Result<Vec<RatingView>> {
        let users = self.users.read().await;
        let mut views: Vec<RatingView> = self
            .ratings
            .read()
            .await
            .iter()
            .filter(|r| r.template_id == template_id)
            .map(|r| RatingView {
                rating: r.rating,
                review: r.review.clone(),
                user_name: users
                    .get(&r.user_id)
                    .and_then(|u| u.display_name.clone())
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| "Anonymous".to_string()),
                created_at: r.created_at,
            })
            .collect();
        views.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(views)
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn upsert_credential(&self, credential: &IntegrationCredential) -> pmblueprints_server::Result<()> {
        self.credentials.write().await.insert(
            (credential.user_id, credential.platform.clone()),
            credential.clone(),
        );
        Ok(())
    }

    async fn get_credential(
        &self,
        user_id: Uuid,
        platform: &str,
    ) -> pmblueprints_server::Result<Option<IntegrationCredential>> {
        Ok(self.credential(user_id, platform).await)
    }

    async fn delete_credential(&self, user_id: Uuid, platform: &str) -> pmblueprints_server::Result<bool> {
        Ok(self
            .credentials
            .write()
            .await
            .remove(&(user_id, platform.to_string()))
            .is_some())
    }

    async fn connected_platforms(&self, user_id: Uuid) -> pmblueprints_server::Result<Vec<String>> {
        let mut platforms: Vec<String> = self
            .credentials
            .read()
            .await
            .keys()
            .filter(|(id, _)| *id == user_id)
            .map(|(_, platform)| platform.clone())
            .collect();
        platforms.sort();
        Ok(platforms)
    }
}

#[async_trait]
impl HealthCheck for MemoryStore {
    async fn ping(&self) -> pmblueprints_server::Result<()> {
        Ok(())
    }
}

/// Replays canned completions in order and records every prompt.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<pmblueprints_server::Result<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new<I, S>(replies: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(error: UpstreamError) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::from([Err(error.into())])),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().expect("prompts lock").len()
    }

    pub fn prompt(&self, index: usize) -> String {
        self.prompts.lock().expect("prompts lock")[index].clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: CompletionRequest) -> pmblueprints_server::Result<String> {
        self.prompts
            .lock()
            .expect("prompts lock")
            .push(request.prompt().to_string());
        self.replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or_else(|| Err(AppError::InternalError("no scripted reply left".into())))
    }
}

/// Records exports instead of calling the platforms.
#[derive(Default)]
pub struct RecordingExporter {
    pub exports: Mutex<Vec<(Platform, String, String)>>,
}

#[async_trait]
impl PlatformExporter for RecordingExporter {
    async fn export(
        &self,
        platform: Platform,
        token: &str,
        document: &GeneratedDocument,
    ) -> pmblueprints_server::Result<ExportResult> {
        self.exports.lock().expect("exports lock").push((
            platform,
            token.to_string(),
            document.document_name.clone(),
        ));
        Ok(ExportResult {
            platform,
            external_id: "board-1".into(),
            url: Some(format!("https://{}.example.com/board-1", platform.as_str())),
            rows_exported: 1,
        })
    }
}

pub fn files_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("pmblueprints-test-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create files dir");
    dir
}

pub fn settings(files_dir: &std::path::Path) -> Settings {
    let mut settings = Settings::new_for_test().expect("test settings");
    settings.catalog.files_dir = files_dir.to_string_lossy().into_owned();
    settings.auth.admin_token = ADMIN_TOKEN.into();
    settings.billing.webhook_secret = WEBHOOK_SECRET.into();
    settings
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub model: Arc<ScriptedModel>,
    pub exporter: Arc<RecordingExporter>,
    pub files_dir: PathBuf,
    pub state: AppState,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_model(ScriptedModel::new(Vec::<String>::new()))
    }

    pub fn with_model(model: Arc<ScriptedModel>) -> Self {
        Self::build(model, |_| {})
    }

    /// Harness whose settings are adjusted by `tweak` before wiring.
    pub fn build(model: Arc<ScriptedModel>, tweak: impl FnOnce(&mut Settings)) -> Self {
        let store = MemoryStore::new();
        let exporter = Arc::new(RecordingExporter::default());
        let files_dir = files_dir();
        let mut settings = settings(&files_dir);
        tweak(&mut settings);
        let state = AppState::from_parts(
            settings,
            store.clone(),
            model.clone(),
            exporter.clone(),
        )
        .expect("app state");

        Self { store, model, exporter, files_dir, state }
    }

    pub fn data(&self) -> web::Data<AppState> {
        web::Data::new(self.state.clone())
    }

    /// Inserts a user on `tier` with [`PASSWORD`] and returns it with a
    /// fresh session token.
    pub async fn user(&self, email: &str, tier: Tier) -> (User, String) {
        let mut user = User::new(email.to_string(), Some("Test User".into()));
        user.password_hash = Some(hash_password(PASSWORD).expect("hash"));
        user.subscription_tier = tier.as_str().to_string();
        self.store.insert_user(user.clone()).await;

        let (token, user) = self
            .state
            .auth_service
            .authenticate(email, PASSWORD)
            .await
            .expect("login");
        (user, token)
    }

    /// Adds a template and writes its file under the catalog directory.
    pub async fn template(&self, id: i64, name: &str, industry: &str, category: &str, downloads: i64) -> Template {
        let template = template(id, name, industry, category, downloads);
        std::fs::write(self.files_dir.join(&template.file_path), format!("file {}", id)).expect("write template");
        self.store.insert_template(template.clone()).await;
        template
    }
}

pub fn template(id: i64, name: &str, industry: &str, category: &str, downloads: i64) -> Template {
    let now = Utc::now();
    Template {
        id,
        name: name.to_string(),
        description: Some(format!("{} for {} projects", name, industry)),
        industry: industry.to_string(),
        category: category.to_string(),
        file_format: "xlsx".to_string(),
        file_path: format!("template-{}.xlsx", id),
        thumbnail_path: None,
        cdn_url: None,
        downloads_count: downloads,
        created_at: now,
        updated_at: now,
    }
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token))
}
