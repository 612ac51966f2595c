use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::catalog::query::{MatchMode, Page, TemplateFilter, TemplateQuery};
use crate::db::{Template, TemplateStore, TemplateView};
use crate::error::AppError;
use crate::Result;

pub const RELATED_LIMIT: i64 = 4;
pub const QUICK_SEARCH_LIMIT: i64 = 20;

#[derive(Debug, Clone, Serialize)]
pub struct BrowseResult {
    pub templates: Vec<TemplateView>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
    /// The structured filters matched nothing together and were widened
    /// to match either one.
    pub fallback_applied: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateDetail {
    pub template: TemplateView,
    pub related: Vec<TemplateView>,
}

pub struct CatalogService {
    templates: Arc<dyn TemplateStore>,
    files_dir: PathBuf,
}

impl CatalogService {
    pub fn new(templates: Arc<dyn TemplateStore>, files_dir: impl Into<PathBuf>) -> Self {
        Self {
            templates,
            files_dir: files_dir.into(),
        }
    }

    /// Filters, searches and paginates the catalog. When the structured
    /// filters match nothing together they are retried with OR before the
    /// text search is applied.
    pub async fn browse(&self, filter: &TemplateFilter, page: Page) -> Result<BrowseResult> {
        let mut query = filter.to_query(MatchMode::All);
        let mut fallback_applied = false;

        if query.has_structured_filter() {
            let conjunctive = self.templates.count_templates(&query.without_search()).await?;
            if conjunctive == 0 {
                info!(
                    industry = ?query.industry,
                    category = ?query.category,
                    "No template matches every filter, falling back to any"
                );
                query = query.with_mode(MatchMode::Any);
                fallback_applied = true;
            }
        }

        let total = self.templates.count_templates(&query).await?;
        let rows = self
            .templates
            .find_templates(&query, page.per_page, page.offset())
            .await?;
        let pages = page.pages(total);

        debug!(total, page = page.number, fallback_applied, "Catalog browsed");

        Ok(BrowseResult {
            templates: rows.iter().map(TemplateView::from).collect(),
            total,
            page: page.number,
            per_page: page.per_page,
            pages,
            has_next: page.number < pages,
            has_prev: page.number > 1,
            fallback_applied,
        })
    }

    pub async fn template(&self, id: i64) -> Result<Template> {
        self.templates
            .get_template(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Template".into()))
    }

    pub async fn detail(&self, id: i64) -> Result<TemplateDetail> {
        let template = self.template(id).await?;
        let related = self.templates.related_templates(&template, RELATED_LIMIT).await?;

        Ok(TemplateDetail {
            template: TemplateView::from(&template),
            related: related.iter().map(TemplateView::from).collect(),
        })
    }

    pub async fn quick_search(&self, term: &str) -> Result<Vec<TemplateView>> {
        let query = TemplateQuery::search_only(term);
        if query.search_term().is_none() {
            return Err(AppError::ValidationError("Search query is required".into()));
        }

        let rows = self.templates.find_templates(&query, QUICK_SEARCH_LIMIT, 0).await?;
        Ok(rows.iter().map(TemplateView::from).collect())
    }

    pub async fn industries(&self) -> Result<Vec<String>> {
        self.templates.distinct_industries().await
    }

    pub async fn categories(&self) -> Result<Vec<String>> {
        self.templates.distinct_categories().await
    }

    pub async fn record_download(&self, user_id: Uuid, template_id: i64) -> Result<()> {
        self.templates.record_download(user_id, template_id).await
    }

    /// Location of the template file under the catalog directory. Stored
    /// paths may not climb out of it.
    pub fn resolve_file(&self, template: &Template) -> Result<PathBuf> {
        let relative = Path::new(&template.file_path);
        let safe = !template.file_path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));

        if !safe {
            return Err(AppError::ValidationError("Invalid template file path".into()));
        }

        Ok(self.files_dir.join(relative))
    }

    pub async fn read_file(&self, template: &Template) -> Result<Vec<u8>> {
        let path = self.resolve_file(template)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::NotFound("Template file".into()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::MockTemplateStore;
    use chrono::Utc;

    fn template(id: i64, path: &str) -> Template {
        let now = Utc::now();
        Template {
            id,
            name: format!("Template {id}"),
            description: None,
            industry: "Construction".into(),
            category: "Risk_Register".into(),
            file_format: "xlsx".into(),
            file_path: path.into(),
            thumbnail_path: None,
            cdn_url: None,
            downloads_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn falls_back_to_any_when_all_is_empty() {
        let mut store = MockTemplateStore::new();
        store
            .expect_count_templates()
            .returning(|q| Ok(if q.mode == MatchMode::All { 0 } else { 48 }));
        store
            .expect_find_templates()
            .withf(|q, limit, offset| q.mode == MatchMode::Any && *limit == 20 && *offset == 0)
            .returning(|_, _, _| Ok(vec![template(1, "a.xlsx")]));

        let catalog = CatalogService::new(Arc::new(store), "public/templates");
        let filter = TemplateFilter {
            industry: Some("AI_ML".into()),
            category: Some("Action_Item_Log".into()),
            search: None,
        };
        let result = catalog.browse(&filter, Page::default()).await.unwrap();

        assert!(result.fallback_applied);
        assert_eq!(result.total, 48);
        assert_eq!(result.pages, 3);
        assert!(result.has_next);
        assert!(!result.has_prev);
    }

    #[tokio::test]
    async fn no_filters_skips_the_conjunctive_count() {
        let mut store = MockTemplateStore::new();
        store
            .expect_count_templates()
            .times(1)
            .returning(|q| {
                assert!(!q.has_structured_filter());
                Ok(2)
            });
        store
            .expect_find_templates()
            .returning(|_, _, _| Ok(vec![template(1, "a.xlsx"), template(2, "b.xlsx")]));

        let catalog = CatalogService::new(Arc::new(store), "public/templates");
        let result = catalog.browse(&TemplateFilter::default(), Page::default()).await.unwrap();
        assert!(!result.fallback_applied);
        assert_eq!(result.templates.len(), 2);
    }

    #[tokio::test]
    async fn quick_search_requires_a_term() {
        let catalog = CatalogService::new(Arc::new(MockTemplateStore::new()), "public/templates");
        let err = catalog.quick_search("   ").await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[test]
    fn file_paths_cannot_escape_the_catalog() {
        let catalog = CatalogService::new(Arc::new(MockTemplateStore::new()), "public/templates");
        assert!(catalog.resolve_file(&template(1, "../secrets.env")).is_err());
        assert!(catalog.resolve_file(&template(1, "/etc/passwd")).is_err());
        assert_eq!(
            catalog.resolve_file(&template(1, "Construction/risk.xlsx")).unwrap(),
            PathBuf::from("public/templates/Construction/risk.xlsx")
        );
    }
}
