//! iNaturalist API client
//!
//! Every request follows the same path: build, admit through the shared rate
//! limiter, send (live or dry-run), map the status, normalize, paginate.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, Stream, TryStreamExt};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::constants::{INITIAL_RETRY_DELAY_SECS, MAX_RETRY_DELAY_SECS};
use crate::error::{InatError, Result, TransportFailure};
use crate::normalize::{normalize_page, Record};
use crate::paginate::{cursor_response_field, Paginator};
use crate::rate_limit::RateLimiter;
use crate::request::{AuthContext, RequestBuilder, RequestDescriptor};
use crate::transport::{DryRunMode, DryRunTransport, HttpTransport, RawResponse, Transport};
use crate::types::{Page, Response};

const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(INITIAL_RETRY_DELAY_SECS);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(MAX_RETRY_DELAY_SECS);

/// Delay before retry number `retry` (1-based) after a 429; never more than `MAX_RETRY_DELAY`
fn retry_delay(retry: u32, retry_after: Option<Duration>) -> Duration {
    let backoff = 2u32
        .checked_pow(retry.saturating_sub(1))
        .and_then(|factor| INITIAL_RETRY_DELAY.checked_mul(factor))
        .map_or(MAX_RETRY_DELAY, |delay| delay.min(MAX_RETRY_DELAY));
    retry_after.map_or(backoff, |after| after.max(backoff).min(MAX_RETRY_DELAY))
}

/// Longest body excerpt kept in an unexpected-status error
const ERROR_BODY_EXCERPT: usize = 200;

fn body_excerpt(body: &str) -> String {
    body.chars().take(ERROR_BODY_EXCERPT).collect()
}

/// Client for the iNaturalist REST and Node APIs
///
/// Cheap to clone; clones share the rate limiter and transports.
#[derive(Clone)]
pub struct InatClient {
    builder: RequestBuilder,
    auth: AuthContext,
    limiter: Arc<RateLimiter>,
    live: Arc<dyn Transport>,
    dry_run: Arc<DryRunTransport>,
    dry_run_mode: DryRunMode,
    max_retries: u32,
    per_page: u32,
}

impl InatClient {
    /// Create a client with default settings and no credentials
    pub fn new() -> Result<Self> {
        Self::from_config(&ClientConfig::default())
    }

    /// Create a client from environment configuration, including `INAT_ACCESS_TOKEN`
    pub fn from_env() -> Result<Self> {
        Ok(Self::from_config(&ClientConfig::from_env())?.with_auth(AuthContext::from_env()))
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let live = HttpTransport::new(config.timeout, &config.user_agent)?;
        Ok(Self {
            builder: RequestBuilder::new(
                &config.rest_base_url,
                &config.node_base_url,
                &config.user_agent,
            ),
            auth: AuthContext::anonymous(),
            limiter: Arc::new(config.rate_limiter()?),
            live: Arc::new(live),
            dry_run: Arc::new(DryRunTransport::new()),
            dry_run_mode: config.dry_run,
            max_retries: config.max_retries,
            per_page: config.per_page,
        })
    }

    pub fn with_auth(mut self, auth: AuthContext) -> Self {
        self.auth = auth;
        self
    }

    /// Share a limiter with other clients so they draw on the same quota
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    /// Replace the live transport
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.live = transport;
        self
    }

    pub fn with_dry_run(mut self, mode: DryRunMode) -> Self {
        self.dry_run_mode = mode;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Requests diverted by dry-run mode are recorded here
    pub fn dry_run_transport(&self) -> &Arc<DryRunTransport> {
        &self.dry_run
    }

    /// Send one request and normalize its response, ignoring `page=all`.
    ///
    /// For cursor-paginated descriptors the page carries the next cursor token.
    pub async fn fetch_page(&self, descriptor: &RequestDescriptor) -> Result<Page> {
        self.send_once(descriptor, cursor_response_field(descriptor)).await
    }

    /// First record of a single-page request; `NotFound` if there is none
    pub async fn fetch_one(&self, descriptor: &RequestDescriptor) -> Result<Record> {
        let page = self.fetch_page(descriptor).await?;
        match page.records.into_iter().next() {
            Some(record) => Ok(record),
            None => {
                let endpoint = self.builder.build(descriptor, &self.auth)?.wire.full_url();
                Err(InatError::NotFound {
                    endpoint,
                    status: None,
                })
            }
        }
    }

    async fn send_once(
        &self,
        descriptor: &RequestDescriptor,
        cursor_field: Option<&str>,
    ) -> Result<Page> {
        let built = self.builder.build(descriptor, &self.auth)?;
        let wire = &built.wire;
        let endpoint = wire.full_url();

        let transport: &dyn Transport = if self.dry_run_mode.diverts(wire.method) {
            self.dry_run.as_ref()
        } else {
            self.live.as_ref()
        };

        let mut attempts = 0u32;
        let raw = loop {
            self.limiter.admit().await?;
            attempts += 1;
            debug!(method = %wire.method, url = %endpoint, attempts, "Requesting");

            let raw = transport.send(wire).await?;
            match raw.status {
                200..=299 => break raw,
                401 | 403 => {
                    return Err(InatError::Authentication {
                        endpoint,
                        status: Some(raw.status),
                    })
                }
                404 => {
                    return Err(InatError::NotFound {
                        endpoint,
                        status: Some(404),
                    })
                }
                429 => {
                    if attempts > self.max_retries {
                        return Err(InatError::RateLimitExceeded { endpoint, attempts });
                    }
                    let delay = retry_delay(attempts, raw.retry_after);
                    warn!(
                        url = %endpoint,
                        attempts,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Rate limited by server, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                status => {
                    return Err(InatError::transport(
                        endpoint,
                        TransportFailure::UnexpectedStatus(status),
                        body_excerpt(&raw.body),
                    ))
                }
            }
        };

        let value = parse_body(&endpoint, &raw)?;
        let mut page = normalize_page(&value);
        if let Some(field) = cursor_field {
            page.next_cursor = value.get(field).and_then(|token| match token {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });
        }

        if !built.warnings.is_empty() {
            let mut warnings = built.warnings;
            warnings.append(&mut page.warnings);
            page.warnings = warnings;
        }
        Ok(page)
    }

    /// Lazily fetch pages; drop the stream to stop early.
    ///
    /// Without `page=all` this yields exactly one page.
    pub fn pages<'a>(
        &'a self,
        descriptor: &RequestDescriptor,
        max_records: Option<u64>,
    ) -> impl Stream<Item = Result<Page>> + 'a {
        let mut paginator = Paginator::new(descriptor, self.per_page).with_max_records(max_records);
        if let Some(rate) = self.limiter.requests_per_minute() {
            paginator = paginator.with_requests_per_minute(rate);
        }
        stream::try_unfold(paginator, move |mut paginator| async move {
            let Some(request) = paginator.next_request() else {
                return Ok(None);
            };
            let cursor_field = paginator.cursor_field().map(str::to_string);
            let mut page = self.send_once(&request, cursor_field.as_deref()).await?;
            paginator.advance(&mut page);
            Ok(Some((page, paginator)))
        })
    }

    /// Execute a request, following every page when `page=all` is set
    pub async fn execute(&self, descriptor: &RequestDescriptor) -> Result<Response> {
        self.fetch_all(descriptor, None).await
    }

    /// Like [`execute`](Self::execute), stopping once `max_records` are collected.
    ///
    /// If any page fails, records already collected are discarded and the error is returned.
    pub async fn fetch_all(
        &self,
        descriptor: &RequestDescriptor,
        max_records: Option<u64>,
    ) -> Result<Response> {
        let auto = Paginator::new(descriptor, self.per_page).is_auto();

        let response = self
            .pages(descriptor, max_records)
            .try_fold(Response::default(), |mut response, page| async move {
                response.records.extend(page.records);
                response.warnings.extend(page.warnings);
                if !auto {
                    response.total_results = page.total_results;
                    response.next_cursor = page.next_cursor;
                }
                Ok(response)
            })
            .await?;

        if auto {
            return Ok(Response {
                total_results: Some(response.records.len() as u64),
                ..response
            });
        }
        Ok(response)
    }
}

fn parse_body(endpoint: &str, raw: &RawResponse) -> Result<Value> {
    if raw.body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&raw.body).map_err(|e| InatError::malformed_body(endpoint, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paginate::{AllStrategy, PaginationMode};
    use crate::rate_limit::RateLimit;
    use crate::request::{Dialect, Method};
    use chrono::DateTime;
    use futures::StreamExt;
    use serde_json::json;
    use tokio::time::Instant;

    fn test_client(live: Arc<DryRunTransport>) -> InatClient {
        let limiter = RateLimiter::new(vec![RateLimit::per_second(100)]).unwrap();
        InatClient::new()
            .unwrap()
            .with_rate_limiter(Arc::new(limiter))
            .with_transport(live)
    }

    fn page_json(ids: std::ops::Range<i64>, total: u64) -> Value {
        let results: Vec<Value> = ids.map(|id| json!({ "id": id })).collect();
        json!({ "results": results, "total_results": total })
    }

    fn ids(response: &Response) -> Vec<i64> {
        response
            .records
            .iter()
            .filter_map(|record| record.get_i64("id"))
            .collect()
    }

    #[test]
    fn test_retry_delay() {
        assert_eq!(retry_delay(1, None), Duration::from_secs(1));
        assert_eq!(retry_delay(2, None), Duration::from_secs(2));
        assert_eq!(retry_delay(4, None), Duration::from_secs(8));
        assert_eq!(retry_delay(10, None), Duration::from_secs(60));
        assert_eq!(retry_delay(40, None), Duration::from_secs(60));
        assert_eq!(
            retry_delay(1, Some(Duration::from_secs(7))),
            Duration::from_secs(7)
        );
        assert_eq!(
            retry_delay(3, Some(Duration::from_secs(1))),
            Duration::from_secs(4)
        );
        assert_eq!(
            retry_delay(1, Some(Duration::from_secs(3600))),
            Duration::from_secs(60)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_retry_after_is_capped() {
        let live = Arc::new(DryRunTransport::new());
        live.push_response(RawResponse::new(429, "").with_retry_after(Duration::from_secs(86_400)));
        live.push_json(page_json(0..1, 1));
        let client = test_client(live.clone());

        let start = Instant::now();
        client
            .execute(&RequestDescriptor::get(Dialect::Node, "taxa"))
            .await
            .unwrap();

        assert_eq!(live.request_count(), 2);
        assert!(start.elapsed() < Duration::from_secs(61));
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_pages_concatenated() {
        let live = Arc::new(DryRunTransport::new());
        live.push_json(page_json(0..2, 5));
        live.push_json(page_json(2..4, 5));
        live.push_json(page_json(4..5, 5));
        let client = test_client(live.clone());

        let descriptor = RequestDescriptor::get(Dialect::Node, "taxa")
            .with_param("page", "all")
            .with_param("per_page", 2);
        let response = client.execute(&descriptor).await.unwrap();

        assert_eq!(ids(&response), vec![0, 1, 2, 3, 4]);
        assert_eq!(response.total_results, Some(5));

        let pages: Vec<_> = live
            .requests()
            .iter()
            .map(|r| r.query_value("page").map(str::to_string))
            .collect();
        assert_eq!(
            pages,
            vec![
                Some("1".to_string()),
                Some("2".to_string()),
                Some("3".to_string())
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exact_multiple_stops_at_total() {
        // K = (p - 1) * n + r with p = 3, n = 2, r = 2
        let live = Arc::new(DryRunTransport::new());
        for start in [0, 2, 4] {
            live.push_json(page_json(start..start + 2, 6));
        }
        let client = test_client(live.clone());

        let descriptor = RequestDescriptor::get(Dialect::Node, "taxa")
            .with_param("page", "all")
            .with_param("per_page", 2);
        let response = client.execute(&descriptor).await.unwrap();

        assert_eq!(response.len(), 6);
        assert_eq!(live.request_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_mid_pagination_discards_records() {
        let live = Arc::new(DryRunTransport::new());
        live.push_json(page_json(0..2, 10));
        live.push_json(page_json(2..4, 10));
        live.push_failure(TransportFailure::Connection, "connection reset");
        live.push_json(page_json(4..6, 10));
        live.push_json(page_json(6..8, 10));
        let client = test_client(live.clone());

        let descriptor = RequestDescriptor::get(Dialect::Node, "observations")
            .with_param("page", "all")
            .with_param("per_page", 2);
        let err = client.execute(&descriptor).await.unwrap_err();

        assert!(matches!(
            err,
            InatError::Transport {
                failure: TransportFailure::Connection,
                ..
            }
        ));
        assert_eq!(live.request_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dry_run_never_reaches_live_transport() {
        let live = Arc::new(DryRunTransport::new());
        let client = test_client(live.clone()).with_dry_run(DryRunMode::All);

        let single = RequestDescriptor::get(Dialect::Node, "taxa").with_param("q", "vespa");
        let all = RequestDescriptor::get(Dialect::Node, "taxa").with_param("page", "all");
        let create = RequestDescriptor::new(Method::Post, Dialect::Rest, "observations.json")
            .with_json_body(json!({ "observation": { "species_guess": "Vespa" } }));

        let response = client.execute(&single).await.unwrap();
        assert!(response.is_empty());
        assert_eq!(response.total_results, Some(0));
        assert!(client.execute(&all).await.unwrap().is_empty());
        client.execute(&create).await.unwrap();

        client
            .dry_run_transport()
            .push_failure(TransportFailure::Timeout, "simulated");
        assert!(client.execute(&single).await.is_err());

        assert_eq!(live.request_count(), 0);
        assert_eq!(client.dry_run_transport().request_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_only_dry_run() {
        let live = Arc::new(DryRunTransport::new());
        let client = test_client(live.clone()).with_dry_run(DryRunMode::WriteOnly);

        let read = RequestDescriptor::get(Dialect::Node, "taxa");
        let delete = RequestDescriptor::new(Method::Delete, Dialect::Rest, "observations/{id}.json")
            .with_param("id", 42);

        client.execute(&read).await.unwrap();
        client.execute(&delete).await.unwrap();

        assert_eq!(live.request_count(), 1);
        let diverted = client.dry_run_transport().requests();
        assert_eq!(diverted.len(), 1);
        assert_eq!(diverted[0].url, "https://www.inaturalist.org/observations/42.json");
    }

    #[tokio::test(start_paused = true)]
    async fn test_dry_run_still_rate_limited() {
        let limiter = RateLimiter::new(vec![RateLimit::per_second(2)]).unwrap();
        let client = InatClient::new()
            .unwrap()
            .with_rate_limiter(Arc::new(limiter))
            .with_dry_run(DryRunMode::All);

        let descriptor = RequestDescriptor::get(Dialect::Node, "taxa");
        let start = Instant::now();
        for _ in 0..3 {
            client.execute(&descriptor).await.unwrap();
        }
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_after_429() {
        let live = Arc::new(DryRunTransport::new());
        live.push_response(RawResponse::new(429, ""));
        live.push_response(RawResponse::new(429, "").with_retry_after(Duration::from_secs(5)));
        live.push_json(page_json(0..1, 1));
        let client = test_client(live.clone());

        let start = Instant::now();
        let response = client
            .execute(&RequestDescriptor::get(Dialect::Node, "taxa"))
            .await
            .unwrap();

        assert_eq!(response.len(), 1);
        assert_eq!(live.request_count(), 3);
        // 1s backoff, then Retry-After of 5s beats the 2s backoff
        assert!(start.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_429_exhausts_retries() {
        let live = Arc::new(DryRunTransport::new());
        for _ in 0..4 {
            live.push_response(RawResponse::new(429, ""));
        }
        let client = test_client(live.clone()).with_max_retries(2);

        let err = client
            .execute(&RequestDescriptor::get(Dialect::Node, "taxa"))
            .await
            .unwrap_err();

        assert!(matches!(err, InatError::RateLimitExceeded { attempts: 3, .. }));
        assert_eq!(live.request_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_mapping() {
        let live = Arc::new(DryRunTransport::new());
        live.push_response(RawResponse::new(401, "{}"));
        live.push_response(RawResponse::new(404, "{}"));
        live.push_response(RawResponse::new(502, "Bad Gateway"));
        live.push_response(RawResponse::new(200, "<html>not json</html>"));
        let client = test_client(live);
        let descriptor = RequestDescriptor::get(Dialect::Node, "observations/{id}")
            .with_param("id", 1)
            .with_param("taxon_id", 47219);

        assert!(matches!(
            client.execute(&descriptor).await,
            Err(InatError::Authentication {
                status: Some(401),
                ..
            })
        ));
        match client.execute(&descriptor).await {
            Err(err @ InatError::NotFound { .. }) => {
                assert_eq!(
                    err.to_string(),
                    "Not found: https://api.inaturalist.org/v1/observations/1?taxon_id=47219 (status 404)"
                );
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
        match client.execute(&descriptor).await {
            Err(InatError::Transport {
                endpoint,
                failure: TransportFailure::UnexpectedStatus(502),
                message,
                ..
            }) => {
                assert!(endpoint.ends_with("observations/1?taxon_id=47219"));
                assert_eq!(message, "Bad Gateway");
            }
            other => panic!("expected UnexpectedStatus, got {other:?}"),
        }
        let malformed = client.execute(&descriptor).await.unwrap_err();
        assert!(matches!(
            malformed,
            InatError::Transport {
                failure: TransportFailure::MalformedBody,
                ..
            }
        ));
        let source = std::error::Error::source(&malformed).unwrap();
        assert!(source.is::<serde_json::Error>());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_error_names_query() {
        let live = Arc::new(DryRunTransport::new());
        live.push_response(RawResponse::new(429, ""));
        let client = test_client(live).with_max_retries(0);

        let descriptor = RequestDescriptor::get(Dialect::Node, "taxa").with_param("q", "vespa");
        let err = client.execute(&descriptor).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Rate limit exceeded for https://api.inaturalist.org/v1/taxa?q=vespa (status 429) after 1 attempts"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_token_sends_nothing() {
        let live = Arc::new(DryRunTransport::new());
        let client = test_client(live.clone());
        let descriptor =
            RequestDescriptor::new(Method::Post, Dialect::Rest, "observations.json").requires_auth();

        let err = client.execute(&descriptor).await.unwrap_err();
        assert!(err.is_local());
        assert_eq!(live.request_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_normalized_datetime_round_trips() {
        let live = Arc::new(DryRunTransport::new());
        live.push_json(json!({
            "results": [{ "id": 1, "updated_at": "2021-06-01T14:30:15.250+02:00" }],
            "total_results": 1
        }));
        let client = test_client(live.clone());

        let first = client
            .execute(&RequestDescriptor::get(Dialect::Node, "observations"))
            .await
            .unwrap();
        let updated_at = *first.records[0].get_datetime("updated_at").unwrap();

        let next = RequestDescriptor::get(Dialect::Node, "observations")
            .with_param("updated_since", updated_at);
        client.execute(&next).await.unwrap();

        let requests = live.requests();
        let sent = requests[1].query_value("updated_since").unwrap();
        assert_eq!(DateTime::parse_from_rfc3339(sent).unwrap(), updated_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_records_truncates() {
        let live = Arc::new(DryRunTransport::new());
        live.push_json(page_json(0..3, 9));
        live.push_json(page_json(3..6, 9));
        let client = test_client(live.clone());

        let descriptor = RequestDescriptor::get(Dialect::Node, "taxa")
            .with_param("page", "all")
            .with_param("per_page", 3);
        let response = client.fetch_all(&descriptor, Some(4)).await.unwrap();

        assert_eq!(ids(&response), vec![0, 1, 2, 3]);
        assert_eq!(live.request_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pages_stream_stops_when_dropped() {
        let live = Arc::new(DryRunTransport::new());
        for start in [0, 2, 4] {
            live.push_json(page_json(start..start + 2, 100));
        }
        let client = test_client(live.clone());
        let descriptor = RequestDescriptor::get(Dialect::Node, "taxa")
            .with_param("page", "all")
            .with_param("per_page", 2);

        let first = {
            let pages = client.pages(&descriptor, None);
            futures::pin_mut!(pages);
            pages.next().await.unwrap().unwrap()
        };
        assert_eq!(first.records.len(), 2);
        assert_eq!(live.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cursor_pagination() {
        let live = Arc::new(DryRunTransport::new());
        live.push_json(json!({ "results": [{ "id": 1 }, { "id": 2 }], "next": "abc" }));
        live.push_json(json!({ "results": [{ "id": 3 }] }));
        let client = test_client(live.clone());

        let descriptor = RequestDescriptor::get(Dialect::Node, "observations/updates")
            .with_all_strategy(AllStrategy::Cursor {
                param: "cursor".to_string(),
                response_field: "next".to_string(),
            })
            .with_param("page", "all")
            .with_param("per_page", 2);
        let response = client.execute(&descriptor).await.unwrap();

        assert_eq!(ids(&response), vec![1, 2, 3]);
        let requests = live.requests();
        assert_eq!(requests[0].query_value("cursor"), None);
        assert_eq!(requests[1].query_value("cursor"), Some("abc"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_cursor_page_exposes_next_cursor() {
        let live = Arc::new(DryRunTransport::new());
        live.push_json(json!({ "results": [{ "id": 1 }], "next": "abc" }));
        live.push_json(json!({ "results": [{ "id": 2 }], "next": 42 }));
        live.push_json(json!({ "results": [{ "id": 3 }] }));
        let client = test_client(live.clone());

        let descriptor = RequestDescriptor::get(Dialect::Node, "observations/updates")
            .with_pagination(PaginationMode::Cursor)
            .with_all_strategy(AllStrategy::Cursor {
                param: "cursor".to_string(),
                response_field: "next".to_string(),
            });

        let page = client.fetch_page(&descriptor).await.unwrap();
        assert_eq!(page.next_cursor.as_deref(), Some("abc"));

        let next = descriptor.clone().with_param("cursor", "abc");
        let response = client.execute(&next).await.unwrap();
        assert_eq!(ids(&response), vec![2]);
        assert_eq!(response.next_cursor.as_deref(), Some("42"));
        assert_eq!(live.requests()[1].query_value("cursor"), Some("abc"));

        let last = client.execute(&next).await.unwrap();
        assert_eq!(last.next_cursor, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_places_autocomplete_merges_by_area() {
        let live = Arc::new(DryRunTransport::new());
        live.push_json(page_json(0..20, 30));
        live.push_json(page_json(10..30, 30));
        let client = test_client(live.clone());

        let descriptor = crate::endpoints::get_places_autocomplete(
            "Springfield",
            crate::params::RequestParams::new().with("page", "all"),
        );
        let response = client.execute(&descriptor).await.unwrap();

        assert_eq!(ids(&response), (0..30).collect::<Vec<_>>());
        let requests = live.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].query_value("order_by"), None);
        assert_eq!(requests[1].query_value("order_by"), Some("area"));
        assert_eq!(requests[1].query_value("per_page"), Some("20"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_one_empty_is_not_found() {
        let live = Arc::new(DryRunTransport::new());
        live.push_json(json!({ "results": [{ "id": 7, "species_guess": "Vespa" }] }));
        let client = test_client(live);

        let descriptor = crate::endpoints::get_observation(7);
        let record = client.fetch_one(&descriptor).await.unwrap();
        assert_eq!(record.get_str("species_guess"), Some("Vespa"));

        let err = client.fetch_one(&descriptor).await.unwrap_err();
        assert!(matches!(err, InatError::NotFound { status: None, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_count_only_single_request() {
        let live = Arc::new(DryRunTransport::new());
        live.push_json(json!({ "results": [], "total_results": 4321 }));
        let client = test_client(live.clone());

        let descriptor = RequestDescriptor::get(Dialect::Node, "observations")
            .with_param("page", "all")
            .with_param("count_only", true);
        let response = client.execute(&descriptor).await.unwrap();

        assert_eq!(response.total_results, Some(4321));
        assert_eq!(live.request_count(), 1);
        assert_eq!(live.requests()[0].query_value("per_page"), Some("0"));
    }
}
