//! Pagination
//!
//! [`Paginator`] decides which request to send next and when to stop. It does
//! no I/O itself: the client feeds it each normalized [`Page`] and asks for the
//! next request until it reports completion.
//!
//! Exhaustion is positional (a short page, the reported total, or a cap). If
//! the server's ordering shifts between page fetches, records can be skipped
//! or repeated; only [`AllStrategy::Autocomplete`] de-duplicates by ID.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::constants::{
    AUTOCOMPLETE_PER_PAGE, EXPORT_URL, LARGE_REQUEST_WARNING, REQUESTS_PER_MINUTE,
};
use crate::params::ParamValue;
use crate::request::RequestDescriptor;
use crate::types::{Page, Warning};

/// How a request is paginated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaginationMode {
    /// Exactly one request
    #[default]
    None,
    /// The caller passes `page` / `per_page` and gets one page back
    OffsetPage,
    /// The caller passes a cursor token and gets one page back
    Cursor,
    /// Fetch every page and return one combined result
    All,
}

/// How `PaginationMode::All` moves from one page to the next
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AllStrategy {
    /// Increment a 1-based `page` parameter
    #[default]
    Page,
    /// Sort by ascending ID and pass the last seen ID as `id_above`.
    /// Required for large observation result sets, which reject deep `page` values.
    IdAbove,
    /// Send the token found in `response_field` of each page as `param`
    Cursor {
        param: String,
        response_field: String,
    },
    /// Autocomplete endpoints cap results at one page of 20. Fetch it in the
    /// default order, then once more ordered by `area` if the total is larger,
    /// keeping the first copy of each ID.
    Autocomplete,
}

/// Where the next request starts
#[derive(Debug, Clone, PartialEq)]
enum Position {
    Page(u32),
    IdAbove(Option<i64>),
    Cursor(Option<String>),
    Autocomplete { by_area: bool },
}

/// Mutable state of one paginated call; discarded when the call returns
#[derive(Debug, Clone)]
pub struct PaginationState {
    position: Position,
    per_page: u32,
    total_count: Option<u64>,
    collected: u64,
    requests: u32,
}

impl PaginationState {
    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    pub fn total_count(&self) -> Option<u64> {
        self.total_count
    }

    pub fn collected(&self) -> u64 {
        self.collected
    }

    pub fn requests(&self) -> u32 {
        self.requests
    }
}

/// Mode in effect for a descriptor: `page=all` in params selects `All`
pub fn resolve_mode(descriptor: &RequestDescriptor) -> PaginationMode {
    match descriptor.params().get("page").and_then(ParamValue::as_str) {
        Some("all") => PaginationMode::All,
        _ => descriptor.pagination(),
    }
}

/// Response field holding the next cursor token, for cursor-paginated descriptors
pub fn cursor_response_field(descriptor: &RequestDescriptor) -> Option<&str> {
    match (resolve_mode(descriptor), descriptor.all_strategy()) {
        (
            PaginationMode::Cursor | PaginationMode::All,
            AllStrategy::Cursor { response_field, .. },
        ) => Some(response_field),
        _ => None,
    }
}

fn is_count_only(descriptor: &RequestDescriptor) -> bool {
    let params = descriptor.params();
    matches!(params.get("count_only"), Some(ParamValue::Bool(true)))
        || params.get("per_page").and_then(ParamValue::as_i64) == Some(0)
}

/// Drives the request sequence for one logical call
#[derive(Debug, Clone)]
pub struct Paginator {
    base: RequestDescriptor,
    strategy: AllStrategy,
    cursor_field: Option<String>,
    auto: bool,
    max_records: Option<u64>,
    requests_per_minute: u32,
    seen_ids: HashSet<i64>,
    state: PaginationState,
    done: bool,
}

impl Paginator {
    /// `default_per_page` applies to `All` when the caller gave no page size
    pub fn new(descriptor: &RequestDescriptor, default_per_page: u32) -> Self {
        let auto = resolve_mode(descriptor) == PaginationMode::All && !is_count_only(descriptor);
        let strategy = descriptor.all_strategy().clone();
        let cursor_field = cursor_response_field(descriptor).map(str::to_string);

        let per_page = match &strategy {
            AllStrategy::Autocomplete if auto => AUTOCOMPLETE_PER_PAGE,
            _ => descriptor
                .params()
                .get("per_page")
                .and_then(ParamValue::as_i64)
                .filter(|n| *n > 0)
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(default_per_page),
        };

        // A single request keeps the caller's own page parameter
        let mut base = descriptor.clone();
        let position = if auto {
            base = base.without_param("page").with_param("per_page", per_page);
            match &strategy {
                AllStrategy::Page => Position::Page(1),
                AllStrategy::IdAbove => {
                    let start = base.params().get("id_above").and_then(ParamValue::as_i64);
                    base = base
                        .without_param("id_above")
                        .with_param("order_by", "id")
                        .with_param("order", "asc");
                    Position::IdAbove(start)
                }
                AllStrategy::Cursor { param, .. } => {
                    let start = base
                        .params()
                        .get(param)
                        .and_then(ParamValue::as_str)
                        .map(str::to_string);
                    base = base.without_param(param);
                    Position::Cursor(start)
                }
                AllStrategy::Autocomplete => {
                    base = base.without_param("order_by");
                    Position::Autocomplete { by_area: false }
                }
            }
        } else {
            Position::Page(1)
        };

        Self {
            base,
            strategy,
            cursor_field,
            auto,
            max_records: None,
            requests_per_minute: REQUESTS_PER_MINUTE,
            seen_ids: HashSet::new(),
            state: PaginationState {
                position,
                per_page,
                total_count: None,
                collected: 0,
                requests: 0,
            },
            done: false,
        }
    }

    /// Stop once this many records have been collected
    pub fn with_max_records(mut self, max_records: Option<u64>) -> Self {
        self.max_records = max_records;
        self
    }

    /// Rate used to estimate how long a large call will take
    pub fn with_requests_per_minute(mut self, requests_per_minute: u32) -> Self {
        self.requests_per_minute = requests_per_minute.max(1);
        self
    }

    pub fn is_auto(&self) -> bool {
        self.auto
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn state(&self) -> &PaginationState {
        &self.state
    }

    /// Response field holding the next cursor token, if this call follows one
    pub fn cursor_field(&self) -> Option<&str> {
        self.cursor_field.as_deref()
    }

    /// The next request to send, or `None` once pagination is complete
    pub fn next_request(&self) -> Option<RequestDescriptor> {
        if self.done {
            return None;
        }
        if !self.auto {
            return Some(self.base.clone());
        }

        let request = match (&self.state.position, &self.strategy) {
            (Position::Page(page), _) => self.base.clone().with_param("page", *page),
            (Position::IdAbove(Some(id)), _) => self.base.clone().with_param("id_above", *id),
            (Position::IdAbove(None), _) => self.base.clone(),
            (Position::Cursor(Some(token)), AllStrategy::Cursor { param, .. }) => {
                self.base.clone().with_param(param.clone(), token.clone())
            }
            (Position::Cursor(_), _) => self.base.clone(),
            (Position::Autocomplete { by_area: false }, _) => self.base.clone(),
            (Position::Autocomplete { by_area: true }, _) => {
                self.base.clone().with_param("order_by", "area")
            }
        };
        Some(request)
    }

    /// Record a fetched page, trimming it to the cap, and decide whether to continue
    pub fn advance(&mut self, page: &mut Page) {
        self.state.requests += 1;
        if !self.auto {
            self.state.collected += page.records.len() as u64;
            self.state.total_count = page.total_results;
            self.done = true;
            return;
        }

        let received = page.records.len();
        if let Position::Autocomplete { .. } = self.state.position {
            let seen = &mut self.seen_ids;
            page.records
                .retain(|record| record.get_i64("id").map_or(true, |id| seen.insert(id)));
        }
        if self.state.requests == 1 {
            self.state.total_count = page.total_results;
            if let Some(warning) = self.estimate_request_size() {
                page.warnings.push(warning);
            }
        }

        if let Some(max) = self.max_records {
            let remaining = max.saturating_sub(self.state.collected);
            if (received as u64) > remaining {
                page.records.truncate(remaining as usize);
            }
        }
        self.state.collected += page.records.len() as u64;

        let capped = self
            .max_records
            .is_some_and(|max| self.state.collected >= max);
        let exhausted = received < self.state.per_page as usize;
        let total_reached = self
            .state
            .total_count
            .is_some_and(|total| self.state.collected >= total);

        let next = match &self.state.position {
            Position::Page(n) => Some(Position::Page(n + 1)),
            Position::IdAbove(_) => page
                .records
                .last()
                .and_then(|record| record.get_i64("id"))
                .map(|id| Position::IdAbove(Some(id))),
            Position::Cursor(_) => page
                .next_cursor
                .clone()
                .map(|token| Position::Cursor(Some(token))),
            Position::Autocomplete { by_area: false } => self
                .state
                .total_count
                .filter(|total| *total > u64::from(self.state.per_page))
                .map(|_| Position::Autocomplete { by_area: true }),
            Position::Autocomplete { by_area: true } => None,
        };

        debug!(
            request = self.state.requests,
            received,
            collected = self.state.collected,
            total = ?self.state.total_count,
            "Fetched page"
        );

        match next {
            Some(position) if !(capped || exhausted || total_reached) => {
                self.state.position = position;
            }
            _ => self.done = true,
        }
    }

    /// Requests needed for the reported total, and the estimated seconds
    /// they take at the configured rate
    pub fn estimate(&self) -> Option<(u64, u64)> {
        let total = self.state.total_count.filter(|t| *t > 0)?;
        let target = self.max_records.map_or(total, |max| max.min(total));
        let per_page = u64::from(self.state.per_page.max(1));
        let total_requests = target.div_ceil(per_page);
        let est_delay_secs = (total_requests * 60).div_ceil(u64::from(self.requests_per_minute));
        Some((total_requests, est_delay_secs))
    }

    /// Log how many requests this will take, and flag oversized queries
    fn estimate_request_size(&self) -> Option<Warning> {
        let total = self.state.total_count.filter(|t| *t > 0)?;
        let (total_requests, est_delay_secs) = self.estimate()?;
        info!(
            total_results = total,
            total_requests, est_delay_secs, "Estimated size of paginated request"
        );

        if total > LARGE_REQUEST_WARNING {
            warn!(
                total_results = total,
                export_url = EXPORT_URL,
                "Request is larger than recommended for API usage; consider the export tool"
            );
            return Some(Warning::LargeRequest {
                total_results: total,
            });
        }
        None
    }
}
