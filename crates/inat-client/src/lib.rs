//! Request orchestration core for the iNaturalist API
//!
//! Covers both API dialects: the legacy REST API at `www.inaturalist.org` and
//! the Node API at `api.inaturalist.org/v1`. Every call goes through the same
//! pipeline:
//!
//! - [`RequestBuilder`] validates and encodes parameters into a [`WireRequest`]
//! - [`RateLimiter`] admits it against per-second, per-minute and per-day windows
//! - a [`Transport`] sends it, or [`DryRunTransport`] records it instead
//! - [`normalize_page`] turns the JSON response into typed [`Record`]s
//! - [`Paginator`] decides whether another page is needed
//!
//! # Example
//!
//! ```no_run
//! use inat_client::{endpoints, InatClient, RequestParams};
//!
//! # async fn example() -> Result<(), inat_client::InatError> {
//! let client = InatClient::from_env()?;
//!
//! let params = RequestParams::new()
//!     .with("taxon_id", 47219)
//!     .with("quality_grade", "research")
//!     .with("page", "all");
//! let response = client.execute(&endpoints::get_observations(params)?).await?;
//!
//! for record in &response.records {
//!     println!("{:?} {:?}", record.get_i64("id"), record.get_datetime("observed_on"));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! [`ClientConfig::from_env`] reads `INAT_USER_AGENT`, `INAT_TIMEOUT_SECS`,
//! `INAT_REQUESTS_PER_SECOND`, `INAT_REQUESTS_PER_MINUTE`,
//! `INAT_REQUESTS_PER_DAY`, `INAT_MAX_DELAY_SECS`, `INAT_MAX_RETRIES`,
//! `DRY_RUN_ENABLED` and `DRY_RUN_WRITE_ONLY`. The access token comes from
//! `INAT_ACCESS_TOKEN`.

mod client;
mod config;
pub mod constants;
pub mod endpoints;
mod error;
mod normalize;
mod paginate;
mod params;
mod rate_limit;
mod request;
mod transport;
mod types;
mod validation;

pub use client::InatClient;
pub use config::ClientConfig;
pub use error::{InatError, Result, TransportFailure};
pub use normalize::{normalize_page, parse_offset, parse_timestamp, FieldValue, Record};
pub use paginate::{
    cursor_response_field, resolve_mode, AllStrategy, PaginationMode, PaginationState, Paginator,
};
pub use params::{ListStyle, ParamValue, RequestParams, DATETIME_PARAMS};
pub use rate_limit::{RateLimit, RateLimiter, WindowOccupancy};
pub use request::{
    AuthContext, BuiltRequest, Dialect, Method, RequestBuilder, RequestDescriptor, WireRequest,
};
pub use transport::{
    default_dry_run_body, DryRunMode, DryRunTransport, HttpTransport, RawResponse, Transport,
};
pub use types::{Page, Response, Warning};
pub use validation::{
    validate_ids, validate_multiple_choice_param, validate_multiple_choice_params, ICONIC_TAXA,
    RANKS,
};
