//! Lexical and structural descriptions of a single entity: label, aliases,
//! description and article name per language, immediate types and
//! supertypes, and the sitelink count.

use anyhow::Result;

use super::sparql::{entity_id, Binding};
use super::{KbClient, Source};
use crate::types::{LexicalEntry, TypePair};

fn lexical_query(id: &str, lang: &str) -> String {
    format!(
        "SELECT DISTINCT ?label ?desc (group_concat(distinct ?alias; separator='|') as ?aliases) ?wname\n\
         WHERE {{\n\
         OPTIONAL {{wd:{id} rdfs:label ?label. FILTER(lang(?label) = \"{lang}\") }}\n\
         OPTIONAL {{wd:{id} skos:altLabel ?alias. FILTER(lang(?alias) = \"{lang}\") }}\n\
         OPTIONAL {{wd:{id} schema:description ?desc. FILTER(lang(?desc) = \"{lang}\") }}\n\
         OPTIONAL {{?article schema:about wd:{id}; schema:inLanguage \"{lang}\"; schema:name ?wname ;\n\
           schema:isPartOf <https://{lang}.wikipedia.org/> .\n\
         FILTER (!CONTAINS(?wname, ':')) }}\n\
         }}\n\
         GROUP BY ?label ?desc ?wname",
        id = id,
        lang = lang
    )
}

/// Builds a lexical entry from the first result row, treating missing
/// variables as absent rather than empty strings.
fn lexical_entry(row: &Binding) -> LexicalEntry {
    let aliases = row
        .get("aliases")
        .map(|joined| {
            joined
                .split('|')
                .filter(|alias| !alias.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    LexicalEntry {
        label: row.get("label").cloned().filter(|s| !s.is_empty()),
        aliases,
        description: row.get("desc").cloned().filter(|s| !s.is_empty()),
        article_name: row.get("wname").cloned().filter(|s| !s.is_empty()),
    }
}

fn type_pairs(rows: Vec<Binding>, id_var: &str, label_var: &str) -> Vec<TypePair> {
    let mut pairs = Vec::with_capacity(rows.len());
    for row in rows {
        if let Some(uri) = row.get(id_var) {
            let label = row.get(label_var).map(String::as_str).unwrap_or("");
            pairs.push(TypePair::new(entity_id(uri), label));
        }
    }
    pairs
}

impl KbClient {
    /// Label, aliases, description and article name of `id` in `lang`.
    /// Entities with no data in the language yield an empty entry. Cached.
    pub async fn describe(&self, id: &str, lang: &str) -> Result<LexicalEntry> {
        let key = (id.to_string(), lang.to_string());
        self.describe_cache
            .get_or_try_fetch(key, || async {
                let rows = self.select(Source::Kb, &lexical_query(id, lang)).await?;
                Ok(rows.first().map(lexical_entry).unwrap_or_default())
            })
            .await
    }

    /// Immediate (one-step instance-of) types of `id`, with labels. Cached.
    pub async fn immediate_types(&self, id: &str) -> Result<Vec<TypePair>> {
        self.immediate_types_cache
            .get_or_try_fetch(id.to_string(), || async {
                let query = format!(
                    "select ?class ?classLabel where {{wd:{} wdt:P31 ?class. \
                     SERVICE wikibase:label {{ bd:serviceParam wikibase:language \"en\".}}}}",
                    id
                );
                let rows = self.select(Source::Kb, &query).await?;
                Ok(type_pairs(rows, "class", "classLabel"))
            })
            .await
    }

    /// Immediate (one-step subclass-of) supertypes of `id`, with labels. Cached.
    pub async fn immediate_supertypes(&self, id: &str) -> Result<Vec<TypePair>> {
        self.supertypes_cache
            .get_or_try_fetch(id.to_string(), || async {
                let query = format!(
                    "select ?class ?classLabel where {{wd:{} wdt:P279 ?class. \
                     SERVICE wikibase:label {{ bd:serviceParam wikibase:language \"en\".}}}}",
                    id
                );
                let rows = self.select(Source::Kb, &query).await?;
                Ok(type_pairs(rows, "class", "classLabel"))
            })
            .await
    }

    /// How many site pages link to `id`; 0 when the count is absent. Cached.
    pub async fn sitelinks(&self, id: &str) -> Result<u64> {
        self.sitelinks_cache
            .get_or_try_fetch(id.to_string(), || async {
                let query = format!("SELECT ?count WHERE {{wd:{} wikibase:sitelinks ?count}}", id);
                let rows = self.select(Source::Kb, &query).await?;
                let count = rows
                    .first()
                    .and_then(|row| row.get("count"))
                    .and_then(|value| value.parse().ok())
                    .unwrap_or(0);
                Ok(count)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn row(pairs: &[(&str, &str)]) -> Binding {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_lexical_entry_full_row() {
        let entry = lexical_entry(&row(&[
            ("label", "WannaCry"),
            ("aliases", "WanaCrypt0r 2.0|WCry|WannaCrypt"),
            ("desc", "Ransomware"),
            ("wname", "WannaCry_ransomware_attack"),
        ]));
        assert_eq!(entry.label.as_deref(), Some("WannaCry"));
        assert_eq!(entry.aliases.len(), 3);
        assert_eq!(entry.description.as_deref(), Some("Ransomware"));
        assert_eq!(entry.article_name.as_deref(), Some("WannaCry_ransomware_attack"));
    }

    #[test]
    fn test_lexical_entry_absent_fields() {
        // The group_concat of zero aliases binds an empty string; it must
        // not materialize as a single empty alias.
        let entry = lexical_entry(&row(&[("aliases", "")]));
        assert!(entry.label.is_none());
        assert!(entry.aliases.is_empty());
        assert!(entry.description.is_none());
        assert!(entry.article_name.is_none());
        assert!(entry.is_empty());
    }

    #[test]
    fn test_type_pairs_strip_entity_prefix() {
        let rows = vec![row(&[
            ("class", "http://www.wikidata.org/entity/Q14001"),
            ("classLabel", "malware"),
        ])];
        let pairs = type_pairs(rows, "class", "classLabel");
        assert_eq!(pairs, vec![TypePair::new("Q14001", "malware")]);
    }

    #[test]
    fn test_lexical_query_shape() {
        let query = lexical_query("Q42", "en");
        assert!(query.contains("wd:Q42 rdfs:label"));
        assert!(query.contains("lang(?label) = \"en\""));
        assert!(query.contains("https://en.wikipedia.org/"));
    }
}
