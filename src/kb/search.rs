//! Full-text/alias search against the knowledge base.

use anyhow::Result;
use serde::Deserialize;
use tracing::debug;

use super::{KbClient, Source};
use crate::types::{Candidate, MAX_LIMIT};
use crate::TARGET_KB_REQUEST;

// Language the search service matches labels and aliases in.
const SEARCH_LANGUAGE: &str = "en";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: String,
    #[serde(default)]
    label: String,
    description: Option<String>,
}

/// Converts a search response into candidates, preserving the service's
/// result order as the 1-based `search_rank`.
fn parse_search(body: serde_json::Value) -> Result<Vec<Candidate>> {
    let response: SearchResponse = serde_json::from_value(body)?;
    Ok(response
        .search
        .into_iter()
        .enumerate()
        .map(|(index, hit)| Candidate {
            id: hit.id,
            label: hit.label,
            description: hit.description,
            search_rank: index + 1,
        })
        .collect())
}

impl KbClient {
    /// Searches the knowledge base for entities whose label or alias matches
    /// `text`, returning up to `limit` candidates in service order.
    pub async fn search(&self, text: &str, limit: usize) -> Result<Vec<Candidate>> {
        let limit = limit.min(MAX_LIMIT).to_string();
        self.count_query(Source::Kb);

        let body = self
            .http_get_json(
                self.api_endpoint(),
                &[
                    ("action", "wbsearchentities"),
                    ("search", text),
                    ("language", SEARCH_LANGUAGE),
                    ("uselang", SEARCH_LANGUAGE),
                    ("type", "item"),
                    ("limit", limit.as_str()),
                    ("format", "json"),
                ],
            )
            .await?;

        let candidates = parse_search(body)?;
        debug!(
            target: TARGET_KB_REQUEST,
            "Search for '{}' returned {} candidates", text, candidates.len()
        );
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_search_preserves_order() {
        let body = json!({
            "search": [
                {"id": "Q29957041", "label": "WannaCry ransomware attack",
                 "description": "ransomware cyberattack"},
                {"id": "Q29908721", "label": "WannaCry", "description": "Ransomware"}
            ]
        });
        let candidates = parse_search(body).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].id, "Q29957041");
        assert_eq!(candidates[0].search_rank, 1);
        assert_eq!(candidates[1].id, "Q29908721");
        assert_eq!(candidates[1].search_rank, 2);
    }

    #[test]
    fn test_parse_search_tolerates_missing_fields() {
        let body = json!({"search": [{"id": "Q1"}]});
        let candidates = parse_search(body).unwrap();
        assert_eq!(candidates[0].label, "");
        assert!(candidates[0].description.is_none());
    }

    #[test]
    fn test_parse_search_empty_response() {
        assert!(parse_search(json!({})).unwrap().is_empty());
    }
}
