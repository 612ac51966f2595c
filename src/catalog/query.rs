use serde::Deserialize;

use crate::db::Template;

pub const DEFAULT_PER_PAGE: i64 = 20;
pub const MAX_PER_PAGE: i64 = 100;

/// How the structured filters combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    #[default]
    All,
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateField {
    Industry,
    Category,
}

impl TemplateField {
    pub fn column(&self) -> &'static str {
        match self {
            TemplateField::Industry => "industry",
            TemplateField::Category => "category",
        }
    }

    pub fn value_of<'a>(&self, template: &'a Template) -> &'a str {
        match self {
            TemplateField::Industry => &template.industry,
            TemplateField::Category => &template.category,
        }
    }
}

/// Raw catalog filters as supplied by a client. Blank values count as absent.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct TemplateFilter {
    pub industry: Option<String>,
    pub category: Option<String>,
    pub search: Option<String>,
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl TemplateFilter {
    pub fn to_query(&self, mode: MatchMode) -> TemplateQuery {
        TemplateQuery {
            industry: present(&self.industry),
            category: present(&self.category),
            search: present(&self.search),
            mode,
        }
    }
}

/// A normalised catalog query handed to the template store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateQuery {
    pub industry: Option<String>,
    pub category: Option<String>,
    pub search: Option<String>,
    pub mode: MatchMode,
}

impl TemplateQuery {
    pub fn search_only(term: &str) -> Self {
        Self {
            search: Some(term.trim().to_string()).filter(|t| !t.is_empty()),
            ..Self::default()
        }
    }

    pub fn structured_filters(&self) -> Vec<(TemplateField, &str)> {
        let mut filters = Vec::with_capacity(2);
        if let Some(industry) = self.industry.as_deref() {
            filters.push((TemplateField::Industry, industry));
        }
        if let Some(category) = self.category.as_deref() {
            filters.push((TemplateField::Category, category));
        }
        filters
    }

    pub fn has_structured_filter(&self) -> bool {
        self.industry.is_some() || self.category.is_some()
    }

    pub fn search_term(&self) -> Option<&str> {
        self.search.as_deref()
    }

    pub fn without_search(&self) -> Self {
        Self { search: None, ..self.clone() }
    }

    pub fn with_mode(&self, mode: MatchMode) -> Self {
        Self { mode, ..self.clone() }
    }

    /// Reference semantics of the query. The PostgreSQL store compiles the
    /// same predicate to SQL; stores that keep templates in memory filter
    /// with this directly.
    pub fn matches(&self, template: &Template) -> bool {
        let filters = self.structured_filters();
        let structured = filters.is_empty()
            || match self.mode {
                MatchMode::All => filters.iter().all(|(f, v)| f.value_of(template) == *v),
                MatchMode::Any => filters.iter().any(|(f, v)| f.value_of(template) == *v),
            };

        let text = match self.search_term() {
            None => true,
            Some(term) => {
                let needle = term.to_lowercase();
                template.name.to_lowercase().contains(&needle)
                    || template
                        .description
                        .as_deref()
                        .map(|d| d.to_lowercase().contains(&needle))
                        .unwrap_or(false)
            }
        };

        structured && text
    }
}

/// A clamped page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: i64,
    pub per_page: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self { number: 1, per_page: DEFAULT_PER_PAGE }
    }
}

impl Page {
    pub fn new(number: Option<i64>, per_page: Option<i64>) -> Self {
        Self {
            number: number.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.number - 1).saturating_mul(self.per_page)
    }

    pub fn pages(&self, total: i64) -> i64 {
        if total <= 0 {
            0
        } else {
            (total + self.per_page - 1) / self.per_page
        }
    }
}
