//! iNaturalist URLs, rate limits and pagination defaults

/// Base URL for the legacy REST (Rails) API
pub const API_V0_BASE_URL: &str = "https://www.inaturalist.org";
/// Base URL for the Node API
pub const API_V1_BASE_URL: &str = "https://api.inaturalist.org/v1";

/// Bulk export tool suggested for oversized queries
pub const EXPORT_URL: &str = "https://www.inaturalist.org/observations/export";

pub const DEFAULT_USER_AGENT: &str = concat!("inat-client-rs/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default number of records per page for auto-paginated queries
pub const PER_PAGE_RESULTS: u32 = 200;
/// Fixed page size of the autocomplete endpoints
pub const AUTOCOMPLETE_PER_PAGE: u32 = 20;
/// Queries returning more than this many results get a `LargeRequest` warning
pub const LARGE_REQUEST_WARNING: u64 = 5000;

// Published API guidance
pub const REQUESTS_PER_SECOND: u32 = 1;
pub const REQUESTS_PER_MINUTE: u32 = 60;
pub const REQUESTS_PER_DAY: u32 = 10_000;

/// Longest we are willing to wait on the local rate limiter, in seconds
pub const MAX_DELAY_SECS: u64 = 60;

/// 429 handling
pub const MAX_RETRIES: u32 = 5;
pub const INITIAL_RETRY_DELAY_SECS: u64 = 1;
pub const MAX_RETRY_DELAY_SECS: u64 = 60;

/// Methods that are diverted to the dry-run transport in write-only mode
pub const WRITE_HTTP_METHODS: [&str; 4] = ["PATCH", "POST", "PUT", "DELETE"];
