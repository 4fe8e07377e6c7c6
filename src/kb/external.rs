//! External encyclopedic source: canonical article name, categorical types
//! and abstract paragraphs cross-referenced from the knowledge base.

use anyhow::Result;
use tracing::debug;

use super::{KbClient, Source};
use crate::TARGET_KB_REQUEST;

const ONTOLOGY_PREFIX: &str = "http://dbpedia.org/ontology/";

/// Backslash-escapes characters the external SPARQL service cannot accept
/// in a resource name, plus a trailing dot.
fn encode_article_name(name: &str) -> String {
    let mut encoded = String::with_capacity(name.len());
    for ch in name.chars() {
        if "(),'/@".contains(ch) {
            encoded.push('\\');
        }
        encoded.push(ch);
    }
    if let Some(stripped) = encoded.strip_suffix('.') {
        let mut fixed = stripped.to_string();
        fixed.push_str("\\.");
        return fixed;
    }
    encoded
}

impl KbClient {
    /// The entity's canonical English encyclopedia article name, with spaces
    /// replaced by underscores; `None` when the entity has no article. Cached.
    pub async fn article_name(&self, id: &str) -> Result<Option<String>> {
        self.article_cache
            .get_or_try_fetch(id.to_string(), || async {
                let query = format!(
                    "SELECT ?name WHERE {{?art schema:about wd:{}; schema:inLanguage \"en\"; \
                     schema:name ?name; schema:isPartOf <https://en.wikipedia.org/>.}} LIMIT 1",
                    id
                );
                let rows = self.select(Source::Kb, &query).await?;
                Ok(rows
                    .first()
                    .and_then(|row| row.get("name"))
                    .map(|name| name.replace(' ', "_")))
            })
            .await
    }

    /// Categorical types the external source assigns to the article. Cached
    /// per entity identifier.
    pub async fn external_types(&self, id: &str, article: &str) -> Result<Vec<String>> {
        self.external_types_cache
            .get_or_try_fetch(id.to_string(), || async {
                let query = format!(
                    "select distinct ?t where {{dbr:{} rdf:type/rdfs:subClassOf* ?t \
                     FILTER strstarts(str(?t), str(dbo:))}}",
                    encode_article_name(article)
                );
                let rows = self.select(Source::External, &query).await?;
                let types = rows
                    .into_iter()
                    .filter_map(|row| row.get("t").cloned())
                    .map(|uri| uri.strip_prefix(ONTOLOGY_PREFIX).unwrap_or(&uri).to_string())
                    .collect::<Vec<_>>();
                debug!(target: TARGET_KB_REQUEST, "{} has {} external types", id, types.len());
                Ok(types)
            })
            .await
    }

    /// The article's abstract paragraph in `lang`; `None` when the external
    /// source has no abstract in that language. Cached.
    pub async fn external_abstract(&self, id: &str, lang: &str, article: &str) -> Result<Option<String>> {
        let key = (id.to_string(), lang.to_string());
        self.abstract_cache
            .get_or_try_fetch(key, || async {
                let query = format!(
                    "select distinct ?text where {{dbr:{} dbo:abstract ?text. \
                     FILTER(lang(?text) = \"{}\")}}",
                    encode_article_name(article),
                    lang
                );
                let rows = self.select(Source::External, &query).await?;
                Ok(rows.first().and_then(|row| row.get("text")).cloned())
            })
            .await
    }
}
