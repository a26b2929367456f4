//! Supabase implementation of [`VectorStore`].
//!
//! `SupabaseClient` wraps a `reqwest::Client` and translates every trait
//! method into a PostgREST call (`/rest/v1/<table>` reads and
//! `/rest/v1/rpc/<function>` for the similarity search), with automatic
//! retry + exponential back-off on transient (5xx / timeout) failures.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use ka_domain::config::SupabaseConfig;
use ka_domain::error::{Error, Result};
use ka_domain::trace::TraceEvent;
use ka_providers::util::from_reqwest;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::Instrument;

use crate::store::VectorStore;
use crate::types::{MatchRequest, PageChunk, PageMatch, SampleRow};

/// First retry delay; doubles per attempt up to [`MAX_BACKOFF_MS`].
const BASE_BACKOFF_MS: u64 = 100;
const MAX_BACKOFF_MS: u64 = 10_000;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A PostgREST client for the Supabase project holding the crawled pages.
///
/// Created once per session and reused across turns. The underlying
/// `reqwest::Client` maintains a connection pool.
#[derive(Debug, Clone)]
pub struct SupabaseClient {
    http: Client,
    base_url: String,
    service_key: String,
    match_function: String,
    table: String,
    max_retries: u32,
}

impl SupabaseClient {
    /// Build a new client from the shared `SupabaseConfig`.
    ///
    /// Fails with [`Error::Config`] when the project URL or service key is
    /// missing.
    pub fn new(cfg: &SupabaseConfig) -> Result<Self> {
        let url = cfg
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| Error::Config("supabase url is not set (SUPABASE_URL)".into()))?;
        let service_key = cfg
            .service_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                Error::Config("supabase service key is not set (SUPABASE_SERVICE_KEY)".into())
            })?;

        let http = Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            http,
            base_url: url.trim_end_matches('/').to_owned(),
            service_key: service_key.to_owned(),
            match_function: cfg.match_function.clone(),
            table: cfg.table.clone(),
            max_retries: cfg.max_retries,
        })
    }

    /// The page-chunk table this client reads from.
    pub fn table(&self) -> &str {
        &self.table
    }

    // ── request helpers ──────────────────────────────────────────────

    /// Decorate a `RequestBuilder` with the PostgREST auth headers.
    fn decorate(&self, rb: RequestBuilder) -> RequestBuilder {
        rb.header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header("X-Client-Info", "kbagent")
            .header("X-Request-Id", uuid::Uuid::new_v4().to_string())
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn rpc_url(&self) -> String {
        format!("{}/rest/v1/rpc/{}", self.base_url, self.match_function)
    }

    // ── retry engine ─────────────────────────────────────────────────

    /// Execute a request with retry + exponential back-off on transient errors.
    ///
    /// * Retries on 5xx status codes, timeouts and connection errors.
    /// * Does **not** retry on 4xx (client errors are permanent).
    /// * Emits a `TraceEvent::VectorStoreCall` after every attempt.
    async fn execute_with_retry(
        &self,
        endpoint: &str,
        build_request: impl Fn() -> RequestBuilder,
    ) -> Result<Response> {
        let span = tracing::debug_span!("vectorstore.call", endpoint = %endpoint);
        self.attempt_all(endpoint, build_request).instrument(span).await
    }

    async fn attempt_all(
        &self,
        endpoint: &str,
        build_request: impl Fn() -> RequestBuilder,
    ) -> Result<Response> {
        let mut last_err: Option<Error> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_delay(attempt);
                tracing::debug!(attempt, backoff_ms = backoff.as_millis() as u64, "retrying");
                tokio::time::sleep(backoff).await;
            }

            let start = Instant::now();
            let result = self.decorate(build_request()).send().await;
            let duration_ms = start.elapsed().as_millis() as u64;

            match result {
                Ok(resp) => {
                    let status = resp.status().as_u16();

                    TraceEvent::VectorStoreCall {
                        endpoint: endpoint.to_owned(),
                        status,
                        duration_ms,
                    }
                    .emit();

                    if resp.status().is_server_error() {
                        let body = resp.text().await.unwrap_or_default();
                        last_err = Some(Error::VectorStore(format!(
                            "{endpoint} returned {status}: {body}"
                        )));
                        continue;
                    }

                    if resp.status().is_client_error() {
                        let resp_status = resp.status();
                        let body = resp.text().await.unwrap_or_default();
                        if resp_status == StatusCode::UNAUTHORIZED
                            || resp_status == StatusCode::FORBIDDEN
                        {
                            return Err(Error::Auth(format!(
                                "{endpoint} auth failed ({status}): {body}"
                            )));
                        }
                        return Err(Error::VectorStore(format!(
                            "{endpoint} returned {status}: {body}"
                        )));
                    }

                    return Ok(resp);
                }
                Err(e) => {
                    let status = e.status().map(|s| s.as_u16()).unwrap_or(0);

                    TraceEvent::VectorStoreCall {
                        endpoint: endpoint.to_owned(),
                        status,
                        duration_ms,
                    }
                    .emit();

                    last_err = Some(from_reqwest(e));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| Error::VectorStore(format!("{endpoint}: all retries exhausted"))))
    }

    async fn read_json<T: DeserializeOwned>(&self, endpoint: &str, resp: Response) -> Result<T> {
        let body = resp.text().await.map_err(from_reqwest)?;
        serde_json::from_str(&body).map_err(|e| {
            Error::VectorStore(format!("failed to parse {endpoint} response: {e}: {body}"))
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
impl VectorStore for SupabaseClient {
    async fn count_rows(&self, table: &str) -> Result<u64> {
        let url = self.table_url(table);
        let endpoint = format!("GET /rest/v1/{table} (count)");
        let resp = self
            .execute_with_retry(&endpoint, || {
                self.http
                    .get(&url)
                    .query(&[("select", "id"), ("limit", "1")])
                    .header("Prefer", "count=exact")
            })
            .await?;

        let range = resp
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned();
        content_range_total(&range).ok_or_else(|| {
            Error::VectorStore(format!("{endpoint}: unexpected Content-Range {range:?}"))
        })
    }

    async fn sample_row(&self, table: &str) -> Result<Option<SampleRow>> {
        let url = self.table_url(table);
        let endpoint = format!("GET /rest/v1/{table} (sample)");
        let resp = self
            .execute_with_retry(&endpoint, || {
                self.http
                    .get(&url)
                    .query(&[("select", "id,url,title"), ("limit", "1")])
            })
            .await?;

        let rows: Vec<SampleRow> = self.read_json(&endpoint, resp).await?;
        Ok(rows.into_iter().next())
    }

    async fn match_pages(&self, req: MatchRequest) -> Result<Vec<PageMatch>> {
        let url = self.rpc_url();
        let endpoint = format!("POST /rest/v1/rpc/{}", self.match_function);
        let resp = self
            .execute_with_retry(&endpoint, || self.http.post(&url).json(&req))
            .await?;

        self.read_json(&endpoint, resp).await
    }

    async fn list_page_urls(&self, source: Option<&str>) -> Result<Vec<String>> {
        #[derive(serde::Deserialize)]
        struct UrlRow {
            url: String,
        }

        let url = self.table_url(&self.table);
        let endpoint = format!("GET /rest/v1/{} (urls)", self.table);
        let params = with_source(vec![("select".into(), "url".into())], source);
        let resp = self
            .execute_with_retry(&endpoint, || self.http.get(&url).query(&params))
            .await?;

        let rows: Vec<UrlRow> = self.read_json(&endpoint, resp).await?;
        Ok(rows.into_iter().map(|r| r.url).collect())
    }

    async fn page_chunks(&self, page_url: &str, source: Option<&str>) -> Result<Vec<PageChunk>> {
        let url = self.table_url(&self.table);
        let endpoint = format!("GET /rest/v1/{} (chunks)", self.table);
        let params = with_source(
            vec![
                ("select".into(), "title,content,chunk_number".into()),
                ("url".into(), format!("eq.{page_url}")),
                ("order".into(), "chunk_number.asc".into()),
            ],
            source,
        );
        let resp = self
            .execute_with_retry(&endpoint, || self.http.get(&url).query(&params))
            .await?;

        self.read_json(&endpoint, resp).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Append the PostgREST JSON-path filter for `metadata.source`.
fn with_source(mut params: Vec<(String, String)>, source: Option<&str>) -> Vec<(String, String)> {
    if let Some(s) = source {
        params.push(("metadata->>source".into(), format!("eq.{s}")));
    }
    params
}

/// Total from a PostgREST `Content-Range` header (`0-0/42`, `*/0`).
fn content_range_total(header: &str) -> Option<u64> {
    header.rsplit_once('/')?.1.trim().parse().ok()
}

/// Delay before retry `attempt` (1-based), capped at [`MAX_BACKOFF_MS`].
fn backoff_delay(attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    Duration::from_millis(BASE_BACKOFF_MS.saturating_mul(factor).min(MAX_BACKOFF_MS))
}
