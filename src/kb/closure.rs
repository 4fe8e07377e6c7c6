//! Transitive type-closure lookups.
//!
//! Given an entity identifier and a category mode, fetches the set of types
//! reachable over instance-of and/or subclass-of, as (id, label) pairs. The
//! strict modes first probe whether the entity has a competing relation and
//! return an empty closure when it does.

use anyhow::Result;
use tracing::debug;

use super::sparql::entity_id;
use super::{KbClient, Source};
use crate::types::{Category, TypePair};
use crate::TARGET_KB_REQUEST;

/// The property path traversed for a category mode.
fn closure_path(category: Category) -> &'static str {
    match category {
        Category::All => "wdt:P31/wdt:P279*|wdt:P279*",
        Category::Instance | Category::StrictInstance => "wdt:P31/wdt:P279*",
        Category::Concept | Category::StrictConcept => "wdt:P279*",
    }
}

fn closure_query(id: &str, category: Category) -> String {
    format!(
        "select distinct ?type ?typeLabel where {{\n\
         wd:{id} {path} ?type .\n\
         SERVICE wikibase:label {{ bd:serviceParam wikibase:language \"en\". }}}}",
        id = id,
        path = closure_path(category)
    )
}

impl KbClient {
    /// Fetches the type closure of `id` under `category`, cached.
    pub async fn type_closure(&self, id: &str, category: Category) -> Result<Vec<TypePair>> {
        let key = (id.to_string(), category);
        self.closure_cache
            .get_or_try_fetch(key, || self.fetch_closure(id, category))
            .await
    }

    async fn fetch_closure(&self, id: &str, category: Category) -> Result<Vec<TypePair>> {
        // Strict modes disqualify entities with a competing relation.
        match category {
            Category::StrictInstance => {
                let (_, is_type) = self.entity_flags(id).await?;
                if is_type {
                    debug!(target: TARGET_KB_REQUEST, "{} is also a type, empty strict-instance closure", id);
                    return Ok(Vec::new());
                }
            }
            Category::StrictConcept => {
                let (is_instance, _) = self.entity_flags(id).await?;
                if is_instance {
                    debug!(target: TARGET_KB_REQUEST, "{} is also an instance, empty strict-concept closure", id);
                    return Ok(Vec::new());
                }
            }
            _ => {}
        }

        let rows = self
            .select(Source::Kb, &closure_query(id, category))
            .await?;
        let mut closure = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(type_uri) = row.get("type") {
                let label = row.get("typeLabel").map(String::as_str).unwrap_or("");
                closure.push(TypePair::new(entity_id(type_uri), label));
            }
        }
        debug!(
            target: TARGET_KB_REQUEST,
            "Type closure of {} under {} has {} entries", id, category, closure.len()
        );
        Ok(closure)
    }

    /// Returns `(is_instance, is_type)` for an identifier: whether it has an
    /// instance-of statement of its own, and whether anything relates to it
    /// as a type (instances, subtypes or supertypes). Cached.
    pub async fn entity_flags(&self, id: &str) -> Result<(bool, bool)> {
        self.flags_cache
            .get_or_try_fetch(id.to_string(), || async {
                let is_instance = self
                    .ask(Source::Kb, &format!("ASK {{wd:{} wdt:P31 ?x}}", id))
                    .await?;
                let is_type = self
                    .ask(
                        Source::Kb,
                        &format!("ASK {{?x wdt:P31|wdt:P279|^wdt:P279 wd:{} }}", id),
                    )
                    .await?;
                Ok((is_instance, is_type))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_paths() {
        assert_eq!(closure_path(Category::All), "wdt:P31/wdt:P279*|wdt:P279*");
        assert_eq!(closure_path(Category::Instance), "wdt:P31/wdt:P279*");
        assert_eq!(closure_path(Category::StrictInstance), "wdt:P31/wdt:P279*");
        assert_eq!(closure_path(Category::Concept), "wdt:P279*");
        assert_eq!(closure_path(Category::StrictConcept), "wdt:P279*");
    }

    #[test]
    fn test_closure_query_mentions_entity() {
        let query = closure_query("Q29908721", Category::All);
        assert!(query.contains("wd:Q29908721"));
        assert!(query.contains("wdt:P31/wdt:P279*|wdt:P279*"));
        assert!(query.contains("?typeLabel"));
    }
}
