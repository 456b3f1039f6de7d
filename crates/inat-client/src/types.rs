//! Result types returned to callers

use std::fmt;

use serde::Serialize;

use crate::normalize::Record;

/// Non-fatal conditions reported alongside a successful result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// A recognized field could not be converted and was left as received
    Normalization {
        field: String,
        value: String,
        reason: String,
    },
    /// A legacy parameter name was used and renamed
    DeprecatedParam { name: String, replacement: String },
    /// The query is larger than recommended for API usage
    LargeRequest { total_results: u64 },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normalization {
                field,
                value,
                reason,
            } => write!(f, "Could not convert {} = {:?}: {}", field, value, reason),
            Self::DeprecatedParam { name, replacement } => write!(
                f,
                "Parameter \"{}\" is deprecated; use \"{}\" instead",
                name, replacement
            ),
            Self::LargeRequest { total_results } => write!(
                f,
                "Request for {} results is larger than recommended; consider the export tool instead",
                total_results
            ),
        }
    }
}

/// One normalized page of results
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<Record>,
    /// Total reported by the API, if the endpoint reports one
    pub total_results: Option<u64>,
    /// Token for the next page, for cursor-paginated endpoints
    pub next_cursor: Option<String>,
    pub warnings: Vec<Warning>,
}

/// Complete result of one logical API call
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub records: Vec<Record>,
    /// For a single page, the API-reported total; for an auto-paginated call,
    /// the number of records collected
    pub total_results: Option<u64>,
    /// Token for the following page of a single cursor-paginated request
    pub next_cursor: Option<String>,
    pub warnings: Vec<Warning>,
}

impl Response {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl From<Page> for Response {
    fn from(page: Page) -> Self {
        Self {
            records: page.records,
            total_results: page.total_results,
            next_cursor: page.next_cursor,
            warnings: page.warnings,
        }
    }
}
