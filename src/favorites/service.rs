use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::db::{FavoriteStore, RatingView, TemplateRating, TemplateStore};
use crate::error::AppError;
use crate::Result;

pub const MAX_REVIEW_LEN: usize = 2000;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FavoriteAction {
    Added,
    Updated,
    Removed,
    /// The request changed nothing.
    None,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RatingOutcome {
    pub action: FavoriteAction,
    pub new_average: f64,
    pub total_ratings: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TemplateRatings {
    pub template_id: i64,
    pub average_rating: Option<f64>,
    pub total_ratings: i64,
    pub ratings: Vec<RatingView>,
}

fn one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub struct FavoritesService {
    favorites: Arc<dyn FavoriteStore>,
    templates: Arc<dyn TemplateStore>,
}

impl FavoritesService {
    pub fn new(favorites: Arc<dyn FavoriteStore>, templates: Arc<dyn TemplateStore>) -> Self {
        Self { favorites, templates }
    }

    async fn ensure_template(&self, template_id: i64) -> Result<()> {
        self.templates
            .get_template(template_id)
            .await?
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound("Template".into()))
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<i64>> {
        self.favorites.favorite_template_ids(user_id).await
    }

    pub async fn add(&self, user_id: Uuid, template_id: i64) -> Result<FavoriteAction> {
        self.ensure_template(template_id).await?;

        if self.favorites.add_favorite(user_id, template_id).await? {
            info!(%user_id, template_id, "Template favorited");
            Ok(FavoriteAction::Added)
        } else {
            Ok(FavoriteAction::None)
        }
    }

    pub async fn remove(&self, user_id: Uuid, template_id: i64) -> Result<FavoriteAction> {
        if !self.favorites.remove_favorite(user_id, template_id).await? {
            return Err(AppError::NotFound("Favorite".into()));
        }
        info!(%user_id, template_id, "Template unfavorited");
        Ok(FavoriteAction::Removed)
    }

    /// Records or replaces the user's rating and returns the new average,
    /// rounded to one decimal.
    pub async fn rate(
        &self,
        user_id: Uuid,
        template_id: i64,
        rating: i64,
        review: Option<&str>,
    ) -> Result<RatingOutcome> {
        if !(1..=5).contains(&rating) {
            return Err(AppError::ValidationError("Rating must be between 1 and 5".into()));
        }
        let review = review.map(str::trim).filter(|r| !r.is_empty());
        if review.is_some_and(|r| r.chars().count() > MAX_REVIEW_LEN) {
            return Err(AppError::ValidationError(format!(
                "Review must be at most {} characters",
                MAX_REVIEW_LEN
            )));
        }
        self.ensure_template(template_id).await?;

        let now = Utc::now();
        let created = self
            .favorites
            .upsert_rating(&TemplateRating {
                user_id,
                template_id,
                rating: rating as i32,
                review: review.map(str::to_string),
                created_at: now,
                updated_at: now,
            })
            .await?;

        let summary = self.favorites.rating_summary(template_id).await?;
        info!(%user_id, template_id, rating, "Template rated");

        Ok(RatingOutcome {
            action: if created { FavoriteAction::Added } else { FavoriteAction::Updated },
            new_average: one_decimal(summary.average.unwrap_or(rating as f64)),
            total_ratings: summary.total,
        })
    }

    pub async fn ratings(&self, template_id: i64) -> Result<TemplateRatings> {
        self.ensure_template(template_id).await?;

        let summary = self.favorites.rating_summary(template_id).await?;
        let ratings = self.favorites.ratings_for_template(template_id).await?;

        Ok(TemplateRatings {
            template_id,
            average_rating: summary.average.map(one_decimal),
            total_ratings: summary.total,
            ratings,
        })
    }
}
