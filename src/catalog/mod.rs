//! Template catalog: filtering with AND-then-OR fallback, detail, quick
//! search and file downloads.

pub mod handlers;
mod query;
mod service;

pub use query::{MatchMode, Page, TemplateField, TemplateFilter, TemplateQuery, DEFAULT_PER_PAGE, MAX_PER_PAGE};
pub use service::{BrowseResult, CatalogService, TemplateDetail, QUICK_SEARCH_LIMIT, RELATED_LIMIT};
