//! Query shapes shared by the storage trait and the services.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{DiplomaFields, DiplomaRecord};

/// Default page size for admin listings.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Largest page size an admin listing may request.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Student code plus at least one of name / birth date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComboQuery {
    pub student_code: String,
    pub full_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
}

impl ComboQuery {
    /// Whether the record satisfies the combo (name compared case-insensitively).
    pub fn matches(&self, fields: &DiplomaFields) -> bool {
        if fields.student_code != self.student_code {
            return false;
        }
        if let Some(name) = &self.full_name {
            if fields.full_name.to_lowercase() != name.to_lowercase() {
                return false;
            }
        }
        if let Some(birth_date) = self.birth_date {
            if fields.birth_date != birth_date {
                return false;
            }
        }
        true
    }
}

/// A validated public lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum DiplomaLookup {
    ByNumber { document_number: String },
    ByCombo(ComboQuery),
}

impl DiplomaLookup {
    pub fn mode(&self) -> &'static str {
        match self {
            DiplomaLookup::ByNumber { .. } => "by-number",
            DiplomaLookup::ByCombo(_) => "by-combo",
        }
    }

    /// Cache key from the normalized parameters.
    ///
    /// Names are lower-cased and dates rendered ISO so equivalent lookups
    /// share an entry.
    pub fn cache_key(&self) -> String {
        match self {
            DiplomaLookup::ByNumber { document_number } => {
                format!("number:{}", document_number.trim())
            }
            DiplomaLookup::ByCombo(combo) => format!(
                "combo:{}|{}|{}",
                combo.student_code.trim(),
                combo
                    .full_name
                    .as_deref()
                    .map(|n| n.trim().to_lowercase())
                    .unwrap_or_default(),
                combo
                    .birth_date
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
            ),
        }
    }
}

/// Admin listing parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiplomaListFilter {
    pub page: u32,
    pub limit: u32,
    pub search: Option<String>,
}

impl Default for DiplomaListFilter {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
            search: None,
        }
    }
}

impl DiplomaListFilter {
    /// Clamp raw query parameters into a usable filter.
    pub fn new(page: Option<u32>, limit: Option<u32>, search: Option<String>) -> Self {
        Self {
            page: page.filter(|p| *p >= 1).unwrap_or(1),
            limit: limit
                .filter(|l| *l >= 1)
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .min(MAX_PAGE_SIZE),
            search: search
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }

    /// Substring match over document number, full name, student code,
    /// program and identifier (any one suffices).
    pub fn matches(&self, record: &DiplomaRecord) -> bool {
        let Some(needle) = self.search.as_deref().map(str::to_lowercase) else {
            return true;
        };
        let f = &record.fields;
        [
            f.document_number.as_str(),
            f.full_name.as_str(),
            f.student_code.as_str(),
            f.program.as_str(),
            record.identifier.as_str(),
        ]
        .iter()
        .any(|hay| hay.to_lowercase().contains(&needle))
    }
}

/// One page of active records plus the filtered total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DiplomaPage {
    pub items: Vec<DiplomaRecord>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
}

impl DiplomaPage {
    pub fn new(items: Vec<DiplomaRecord>, total: u64, filter: &DiplomaListFilter) -> Self {
        let limit = u64::from(filter.limit.max(1));
        Self {
            items,
            total,
            page: filter.page,
            limit: filter.limit,
            total_pages: total.div_ceil(limit),
        }
    }
}

/// Search aggregates over a time window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SearchSummary {
    pub total: u64,
    pub found: u64,
    pub not_found: u64,
    pub unique_clients: u64,
    pub avg_latency_ms: f64,
}

/// A frequently searched document number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TopSearched {
    pub document_number: String,
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_filter_clamps() {
        let f = DiplomaListFilter::new(Some(0), Some(500), Some("   ".to_string()));
        assert_eq!(f.page, 1);
        assert_eq!(f.limit, MAX_PAGE_SIZE);
        assert!(f.search.is_none());

        let f = DiplomaListFilter::new(Some(3), None, Some(" nguyen ".to_string()));
        assert_eq!(f.limit, DEFAULT_PAGE_SIZE);
        assert_eq!(f.offset(), 40);
        assert_eq!(f.search.as_deref(), Some("nguyen"));
    }

    #[test]
    fn test_cache_key_normalizes_combo() {
        let a = DiplomaLookup::ByCombo(ComboQuery {
            student_code: "20IT001".to_string(),
            full_name: Some("Nguyễn Văn An".to_string()),
            birth_date: None,
        });
        let b = DiplomaLookup::ByCombo(ComboQuery {
            student_code: "20IT001".to_string(),
            full_name: Some("nguyễn văn an".to_string()),
            birth_date: None,
        });
        assert_eq!(a.cache_key(), b.cache_key());
        assert_ne!(
            a.cache_key(),
            DiplomaLookup::ByNumber {
                document_number: "20IT001".to_string()
            }
            .cache_key()
        );
    }

    #[test]
    fn test_page_total_pages() {
        let filter = DiplomaListFilter::new(Some(1), Some(20), None);
        assert_eq!(DiplomaPage::new(Vec::new(), 0, &filter).total_pages, 0);
        assert_eq!(DiplomaPage::new(Vec::new(), 41, &filter).total_pages, 3);
    }
}
