//! The caller-facing resolution engine.
//!
//! `Linker` wires the registry, the knowledge-base client and the context
//! scorer together and exposes the three operations callers use: candidate
//! search (classification without context ranking), classify-and-rank (the
//! "link" operation) and enrichment of a resolved identifier.

use futures::future::join_all;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::classifier;
use crate::environment::get_env_var_as_vec;
use crate::kb::{KbClient, QueryCounts};
use crate::ranker::{self, ContextScorer, LexicalScorer, Ranking};
use crate::registry::TypeRegistry;
use crate::types::{
    ClassifiedCandidate, ExternalData, LexicalEntry, RankPolicy, ResolvedEntity, ScoredCandidate,
    TypeProfile,
};
use crate::TARGET_CLASSIFY;

const ENTITY_PAGE_BASE: &str = "https://www.wikidata.org/wiki/";

pub struct Linker {
    kb: KbClient,
    registry: &'static TypeRegistry,
    scorer: Option<Box<dyn ContextScorer>>,
}

impl Linker {
    pub fn new() -> Self {
        Self::with_kb(KbClient::from_env())
    }

    pub fn with_kb(kb: KbClient) -> Self {
        Linker {
            kb,
            registry: TypeRegistry::shared(),
            scorer: Some(Box::new(LexicalScorer)),
        }
    }

    /// Replaces the built-in lexical scorer with an injected one.
    pub fn with_scorer(mut self, scorer: Box<dyn ContextScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    /// Disables context scoring entirely; every candidate scores 0.0.
    pub fn without_context_scoring(mut self) -> Self {
        self.scorer = None;
        self
    }

    pub fn kb(&self) -> &KbClient {
        &self.kb
    }

    /// Remote query counts issued so far by this engine.
    pub fn query_counts(&self) -> QueryCounts {
        self.kb.query_counts()
    }

    /// Classifies search candidates for `mention` without context ranking.
    pub async fn search(&self, mention: &str, profile: &TypeProfile) -> Vec<ClassifiedCandidate> {
        classifier::classify(&self.kb, self.registry, mention, profile).await
    }

    /// Scores already-classified candidates and selects a winner.
    pub fn rank(
        &self,
        candidates: Vec<ClassifiedCandidate>,
        context: Option<&str>,
        policy: RankPolicy,
    ) -> Ranking {
        ranker::rank(candidates, context, self.scorer.as_deref(), policy)
    }

    /// The primary link operation: classify, rank against the optional
    /// context, and return the best candidate, or `None` when nothing
    /// acceptable was found.
    pub async fn classify_and_rank(
        &self,
        mention: &str,
        profile: &TypeProfile,
        context: Option<&str>,
        policy: RankPolicy,
    ) -> Option<ScoredCandidate> {
        let candidates = self.search(mention, profile).await;
        if candidates.is_empty() {
            info!(target: TARGET_CLASSIFY, "No acceptable candidates for '{}'", mention);
            return None;
        }
        let ranking = self.rank(candidates, context, policy);
        ranking.best_candidate().cloned()
    }

    /// Completes a resolved identifier with lexical data per language,
    /// immediate types and supertypes, sitelink count and, optionally,
    /// external encyclopedic data. Sub-fetches run concurrently; a failed
    /// sub-fetch degrades to its empty value.
    pub async fn enrich(
        &self,
        id: &str,
        languages: &[String],
        include_external: bool,
    ) -> ResolvedEntity {
        let languages: Vec<String> = if languages.is_empty() {
            // Callers that pass no languages get the TETHER_LANGS list, or
            // English.
            let fallback = get_env_var_as_vec("TETHER_LANGS", ',');
            if fallback.is_empty() {
                vec!["en".to_string()]
            } else {
                fallback
            }
        } else {
            languages.to_vec()
        };

        let (flags, immediate_types, immediate_supertypes, sitelinks, entries) = tokio::join!(
            self.kb.entity_flags(id),
            self.kb.immediate_types(id),
            self.kb.immediate_supertypes(id),
            self.kb.sitelinks(id),
            join_all(languages.iter().map(|lang| self.kb.describe(id, lang))),
        );

        let (is_instance, is_type) = flags.unwrap_or_else(|e| {
            warn!("Instance/type probe for {} failed: {}", id, e);
            (false, false)
        });
        let immediate_types = immediate_types.unwrap_or_else(|e| {
            warn!("Immediate types for {} failed: {}", id, e);
            Vec::new()
        });
        let immediate_supertypes = immediate_supertypes.unwrap_or_else(|e| {
            warn!("Immediate supertypes for {} failed: {}", id, e);
            Vec::new()
        });
        let sitelinks = sitelinks.unwrap_or_else(|e| {
            warn!("Sitelink count for {} failed: {}", id, e);
            0
        });

        let mut language_entries: BTreeMap<String, LexicalEntry> = BTreeMap::new();
        for (lang, entry) in languages.iter().zip(entries) {
            let entry = entry.unwrap_or_else(|e| {
                warn!("Description of {} in '{}' failed: {}", id, lang, e);
                LexicalEntry::default()
            });
            language_entries.insert(lang.clone(), entry);
        }

        let external = if include_external {
            Some(self.fetch_external(id, &languages).await)
        } else {
            None
        };

        ResolvedEntity {
            id: id.to_string(),
            uri: format!("{}{}", ENTITY_PAGE_BASE, id),
            is_instance,
            is_type,
            languages: language_entries,
            immediate_types,
            immediate_supertypes,
            sitelinks,
            external,
        }
    }

    async fn fetch_external(&self, id: &str, languages: &[String]) -> ExternalData {
        let article = match self.kb.article_name(id).await {
            Ok(article) => article,
            Err(e) => {
                warn!("Article name for {} failed: {}", id, e);
                None
            }
        };

        // No article means nothing to ask the external source about.
        let Some(article) = article else {
            return ExternalData::default();
        };

        let (types, abstracts) = tokio::join!(
            self.kb.external_types(id, &article),
            join_all(
                languages
                    .iter()
                    .map(|lang| self.kb.external_abstract(id, lang, &article)),
            ),
        );

        let types = types.unwrap_or_else(|e| {
            warn!("External types for {} failed: {}", id, e);
            Vec::new()
        });

        let mut abstract_map = BTreeMap::new();
        for (lang, text) in languages.iter().zip(abstracts) {
            match text {
                Ok(Some(text)) => {
                    abstract_map.insert(lang.clone(), text);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("External abstract of {} in '{}' failed: {}", id, lang, e);
                }
            }
        }

        ExternalData {
            article: Some(article),
            types,
            abstracts: abstract_map,
        }
    }
}

impl Default for Linker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Bucket, Candidate};

    fn linker() -> Linker {
        Linker::with_kb(KbClient::with_endpoints(
            "http://localhost/api",
            "http://localhost/sparql",
            "http://localhost/external",
        ))
    }

    fn classified(id: &str, label: &str, description: &str, search_rank: usize) -> ClassifiedCandidate {
        ClassifiedCandidate {
            candidate: Candidate {
                id: id.to_string(),
                label: label.to_string(),
                description: if description.is_empty() {
                    None
                } else {
                    Some(description.to_string())
                },
                search_rank,
            },
            bucket: Bucket::Target,
            matched_types: Vec::new(),
        }
    }

    #[test]
    fn test_rank_without_context_returns_first_hit() {
        let linker = linker();
        for policy in [
            RankPolicy::None,
            RankPolicy::Search,
            RankPolicy::Score,
            RankPolicy::Sum,
        ] {
            let candidates = vec![
                classified("Q29957041", "WannaCry ransomware attack", "ransomware cyberattack", 2),
                classified("Q29908721", "WannaCry", "Ransomware", 1),
            ];
            let ranking = linker.rank(candidates, None, policy);
            assert_eq!(ranking.best_candidate().unwrap().id(), "Q29957041");
        }
    }

    #[test]
    fn test_rank_with_context_prefers_matching_description() {
        // The built-in lexical scorer should prefer the candidate whose
        // description matches the context over one only tagged "software".
        let linker = linker();
        let candidates = vec![
            classified("Q1", "WannaCry", "software", 1),
            classified("Q2", "WannaCry", "2017 ransomware cyberattack", 2),
        ];
        let ranking = linker.rank(
            candidates,
            Some("a 2017 ransomware cyberattack"),
            RankPolicy::Score,
        );
        assert_eq!(ranking.best_candidate().unwrap().id(), "Q2");
    }

    #[test]
    fn test_scoring_disabled_returns_first_hit() {
        let linker = linker().without_context_scoring();
        let candidates = vec![
            classified("Q1", "a", "", 3),
            classified("Q2", "b", "", 1),
        ];
        let ranking = linker.rank(candidates, Some("some context"), RankPolicy::Sum);
        assert_eq!(ranking.best_candidate().unwrap().id(), "Q1");
        assert!(ranking.candidates.iter().all(|c| c.score == 0.0));
    }

    #[test]
    fn test_query_counts_start_at_zero() {
        let linker = linker();
        assert_eq!(linker.query_counts(), QueryCounts::default());
    }
}
