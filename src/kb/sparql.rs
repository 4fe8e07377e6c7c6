//! SPARQL endpoint plumbing: request shaping and result-binding parsing.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

use super::{KbClient, Source};
use crate::TARGET_KB_REQUEST;

const ENTITY_PREFIX: &str = "http://www.wikidata.org/entity/";

/// One result row: variable name to bound value.
pub type Binding = HashMap<String, String>;

#[derive(Debug, Deserialize)]
struct SelectResponse {
    results: SelectResults,
}

#[derive(Debug, Deserialize)]
struct SelectResults {
    #[serde(default)]
    bindings: Vec<HashMap<String, BoundValue>>,
}

#[derive(Debug, Deserialize)]
struct BoundValue {
    value: String,
}

#[derive(Debug, Deserialize)]
struct AskResponse {
    boolean: bool,
}

/// Flattens a SPARQL JSON results document into one map per row.
fn parse_select(body: serde_json::Value) -> Result<Vec<Binding>> {
    let response: SelectResponse = serde_json::from_value(body)?;
    Ok(response
        .results
        .bindings
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|(var, bound)| (var, bound.value))
                .collect()
        })
        .collect())
}

/// Strips the entity-URI prefix, returning the bare identifier. Values that
/// are not entity URIs pass through unchanged.
pub fn entity_id(value: &str) -> &str {
    value.strip_prefix(ENTITY_PREFIX).unwrap_or(value)
}

impl KbClient {
    /// Runs a SELECT query and returns its rows. Counts one query against
    /// `source` regardless of retries.
    pub(crate) async fn select(&self, source: Source, query: &str) -> Result<Vec<Binding>> {
        self.count_query(source);
        debug!(target: TARGET_KB_REQUEST, "SELECT against {:?}: {}", source, query);
        let body = self
            .http_get_json(
                self.sparql_endpoint_for(source),
                &[("query", query), ("format", "json")],
            )
            .await?;
        parse_select(body)
    }

    /// Runs an ASK query and returns its boolean.
    pub(crate) async fn ask(&self, source: Source, query: &str) -> Result<bool> {
        self.count_query(source);
        debug!(target: TARGET_KB_REQUEST, "ASK against {:?}: {}", source, query);
        let body = self
            .http_get_json(
                self.sparql_endpoint_for(source),
                &[("query", query), ("format", "json")],
            )
            .await?;
        let response: AskResponse = serde_json::from_value(body)
            .map_err(|e| anyhow!("malformed ASK response: {}", e))?;
        Ok(response.boolean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_select_rows() {
        let body = json!({
            "head": {"vars": ["type", "typeLabel"]},
            "results": {"bindings": [
                {
                    "type": {"type": "uri", "value": "http://www.wikidata.org/entity/Q14001"},
                    "typeLabel": {"type": "literal", "value": "malware"}
                },
                {
                    "type": {"type": "uri", "value": "http://www.wikidata.org/entity/Q7397"},
                    "typeLabel": {"type": "literal", "value": "software"}
                }
            ]}
        });
        let rows = parse_select(body).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            entity_id(&rows[0]["type"]),
            "Q14001",
        );
        assert_eq!(rows[1]["typeLabel"], "software");
    }

    #[test]
    fn test_parse_select_empty() {
        let body = json!({"results": {"bindings": []}});
        assert!(parse_select(body).unwrap().is_empty());
    }

    #[test]
    fn test_parse_select_rejects_malformed() {
        assert!(parse_select(json!({"unexpected": true})).is_err());
    }

    #[test]
    fn test_entity_id_passthrough() {
        assert_eq!(entity_id("http://www.wikidata.org/entity/Q5"), "Q5");
        assert_eq!(entity_id("Q5"), "Q5");
        assert_eq!(entity_id("http://example.org/other"), "http://example.org/other");
    }
}
