//! Per-user favorite templates and 1 to 5 star ratings with reviews.

pub mod handlers;
mod service;

pub use service::{FavoriteAction, FavoritesService, RatingOutcome, TemplateRatings, MAX_REVIEW_LEN};
