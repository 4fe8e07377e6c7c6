//! Remote knowledge-base clients.
//!
//! `KbClient` owns the HTTP client, the endpoint configuration, the
//! per-lookup-kind caches and the query counters. The submodules add the
//! actual lookups: full-text search, transitive type closures, lexical
//! descriptions and the external encyclopedic source.

pub mod closure;
pub mod describe;
pub mod external;
pub mod search;
pub mod sparql;

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};
use url::Url;

use crate::cache::BoundedCache;
use crate::environment::get_env_var_or;
use crate::types::{Category, LexicalEntry, TypePair};
use crate::TARGET_KB_REQUEST;

// Required by the public query services.
const USER_AGENT: &str = concat!("tether/", env!("CARGO_PKG_VERSION"), " (entity linker)");

const DEFAULT_API_ENDPOINT: &str = "https://www.wikidata.org/w/api.php";
const DEFAULT_SPARQL_ENDPOINT: &str = "https://query.wikidata.org/sparql";
const DEFAULT_EXTERNAL_SPARQL_ENDPOINT: &str = "https://dbpedia.org/sparql";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: usize = 3;

/// Entries retained per lookup kind before LRU eviction.
const CACHE_CAPACITY: usize = 4096;

/// Which remote service a query goes to, for endpoint and counter selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Source {
    Kb,
    External,
}

/// Snapshot of how many remote queries this client has issued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryCounts {
    pub kb: u64,
    pub external: u64,
}

pub struct KbClient {
    http: Client,
    api_endpoint: String,
    sparql_endpoint: String,
    external_sparql_endpoint: String,
    kb_queries: AtomicU64,
    external_queries: AtomicU64,
    pub(crate) closure_cache: BoundedCache<(String, Category), Vec<TypePair>>,
    pub(crate) flags_cache: BoundedCache<String, (bool, bool)>,
    pub(crate) describe_cache: BoundedCache<(String, String), LexicalEntry>,
    pub(crate) immediate_types_cache: BoundedCache<String, Vec<TypePair>>,
    pub(crate) supertypes_cache: BoundedCache<String, Vec<TypePair>>,
    pub(crate) sitelinks_cache: BoundedCache<String, u64>,
    pub(crate) article_cache: BoundedCache<String, Option<String>>,
    pub(crate) external_types_cache: BoundedCache<String, Vec<String>>,
    pub(crate) abstract_cache: BoundedCache<(String, String), Option<String>>,
}

/// Returns the environment override for `var` when it parses as a URL,
/// otherwise the default endpoint.
fn endpoint_from_env(var: &str, default: &str) -> String {
    let value = get_env_var_or(var, default);
    match Url::parse(&value) {
        Ok(_) => value,
        Err(e) => {
            warn!(
                target: TARGET_KB_REQUEST,
                "Ignoring invalid {} endpoint '{}': {}", var, value, e
            );
            default.to_string()
        }
    }
}

impl KbClient {
    /// Builds a client against the default public endpoints, honoring the
    /// `TETHER_KB_API`, `TETHER_KB_SPARQL` and `TETHER_EXTERNAL_SPARQL`
    /// environment overrides.
    pub fn from_env() -> Self {
        Self::with_endpoints(
            &endpoint_from_env("TETHER_KB_API", DEFAULT_API_ENDPOINT),
            &endpoint_from_env("TETHER_KB_SPARQL", DEFAULT_SPARQL_ENDPOINT),
            &endpoint_from_env("TETHER_EXTERNAL_SPARQL", DEFAULT_EXTERNAL_SPARQL_ENDPOINT),
        )
    }

    pub fn with_endpoints(api: &str, sparql: &str, external_sparql: &str) -> Self {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!(
                    target: TARGET_KB_REQUEST,
                    "Failed to build tuned HTTP client, falling back to defaults: {}", e
                );
                Client::new()
            });

        KbClient {
            http,
            api_endpoint: api.to_string(),
            sparql_endpoint: sparql.to_string(),
            external_sparql_endpoint: external_sparql.to_string(),
            kb_queries: AtomicU64::new(0),
            external_queries: AtomicU64::new(0),
            closure_cache: BoundedCache::new("closure", CACHE_CAPACITY),
            flags_cache: BoundedCache::new("flags", CACHE_CAPACITY),
            describe_cache: BoundedCache::new("describe", CACHE_CAPACITY),
            immediate_types_cache: BoundedCache::new("immediate_types", CACHE_CAPACITY),
            supertypes_cache: BoundedCache::new("supertypes", CACHE_CAPACITY),
            sitelinks_cache: BoundedCache::new("sitelinks", CACHE_CAPACITY),
            article_cache: BoundedCache::new("article", CACHE_CAPACITY),
            external_types_cache: BoundedCache::new("external_types", CACHE_CAPACITY),
            abstract_cache: BoundedCache::new("abstract", CACHE_CAPACITY),
        }
    }

    /// Query counts issued so far, for run reporting.
    pub fn query_counts(&self) -> QueryCounts {
        QueryCounts {
            kb: self.kb_queries.load(Ordering::Relaxed),
            external: self.external_queries.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn count_query(&self, source: Source) {
        match source {
            Source::Kb => self.kb_queries.fetch_add(1, Ordering::Relaxed),
            Source::External => self.external_queries.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub(crate) fn sparql_endpoint_for(&self, source: Source) -> &str {
        match source {
            Source::Kb => &self.sparql_endpoint,
            Source::External => &self.external_sparql_endpoint,
        }
    }

    pub(crate) fn api_endpoint(&self) -> &str {
        &self.api_endpoint
    }

    /// Issues a GET returning JSON, with bounded retries and exponential
    /// backoff. A timeout counts as a failed attempt; after the last attempt
    /// the error propagates to the caller, which degrades to an empty result.
    pub(crate) async fn http_get_json(&self, url: &str, params: &[(&str, &str)]) -> Result<Value> {
        let mut backoff = 2u64;

        for retry_count in 0..MAX_RETRIES {
            let request = self.http.get(url).query(params);
            match timeout(REQUEST_TIMEOUT, request.send()).await {
                Ok(Ok(response)) => {
                    let status = response.status();
                    if status.is_success() {
                        match response.json::<Value>().await {
                            Ok(body) => return Ok(body),
                            Err(e) => {
                                warn!(target: TARGET_KB_REQUEST, "Malformed JSON from {}: {}", url, e);
                            }
                        }
                    } else {
                        warn!(target: TARGET_KB_REQUEST, "Request to {} returned status {}", url, status);
                    }
                }
                Ok(Err(e)) => {
                    warn!(target: TARGET_KB_REQUEST, "Request to {} failed: {}", url, e);
                }
                Err(_) => {
                    warn!(target: TARGET_KB_REQUEST, "Request to {} timed out", url);
                }
            }

            if retry_count < MAX_RETRIES - 1 {
                debug!(target: TARGET_KB_REQUEST, "Backing off for {} seconds before retry", backoff);
                sleep(Duration::from_secs(backoff)).await;
                backoff *= 2;
            }
        }

        Err(anyhow!("request to {} failed after {} attempts", url, MAX_RETRIES))
    }
}

impl Default for KbClient {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_from_env_unset_uses_default() {
        assert_eq!(
            endpoint_from_env("TETHER_TEST_UNSET_ENDPOINT", DEFAULT_SPARQL_ENDPOINT),
            DEFAULT_SPARQL_ENDPOINT
        );
    }

    #[test]
    fn test_endpoint_from_env_rejects_invalid_override() {
        std::env::set_var("TETHER_TEST_BAD_ENDPOINT", "not a url");
        assert_eq!(
            endpoint_from_env("TETHER_TEST_BAD_ENDPOINT", DEFAULT_API_ENDPOINT),
            DEFAULT_API_ENDPOINT
        );
    }

    #[test]
    fn test_endpoint_from_env_accepts_valid_override() {
        std::env::set_var("TETHER_TEST_GOOD_ENDPOINT", "http://localhost:9999/sparql");
        assert_eq!(
            endpoint_from_env("TETHER_TEST_GOOD_ENDPOINT", DEFAULT_SPARQL_ENDPOINT),
            "http://localhost:9999/sparql"
        );
    }

    #[test]
    fn test_query_counting_by_source() {
        let kb = KbClient::with_endpoints("http://localhost/a", "http://localhost/b", "http://localhost/c");
        kb.count_query(Source::Kb);
        kb.count_query(Source::Kb);
        kb.count_query(Source::External);
        assert_eq!(kb.query_counts(), QueryCounts { kb: 2, external: 1 });
    }
}
