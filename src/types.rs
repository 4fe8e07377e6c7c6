use anyhow::{anyhow, Error};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Default number of raw candidates examined per query.
pub const DEFAULT_LIMIT: usize = 25;

/// The search service will not return more than this many hits.
pub const MAX_LIMIT: usize = 50;

/// Default number of ranked hits returned per query.
pub const DEFAULT_TOP: usize = 2;

/// Root type accepted when a query supplies no target types (Q35120, "entity").
pub const DEFAULT_TARGET_TYPE: &str = "Q35120";

/// Which transitive type relations are traversed when classifying a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Instance-of through subclass-of, plus bare subclass-of.
    All,
    /// Instance-of through subclass-of.
    Instance,
    /// Like `Instance`, but only for entities that are not themselves types.
    StrictInstance,
    /// Subclass-of only.
    Concept,
    /// Like `Concept`, but only for entities that are not also instances.
    StrictConcept,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::All => write!(f, "all"),
            Category::Instance => write!(f, "instance"),
            Category::StrictInstance => write!(f, "strictinstance"),
            Category::Concept => write!(f, "concept"),
            Category::StrictConcept => write!(f, "strictconcept"),
        }
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" => Ok(Category::All),
            "instance" => Ok(Category::Instance),
            "strictinstance" => Ok(Category::StrictInstance),
            "concept" => Ok(Category::Concept),
            "strictconcept" => Ok(Category::StrictConcept),
            other => Err(anyhow!(
                "unrecognized category '{}' (expected all, instance, strictinstance, concept or strictconcept)",
                other
            )),
        }
    }
}

/// How the best candidate is selected from the scored list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RankPolicy {
    /// First candidate in classification order.
    None,
    /// Smallest search-backend rank.
    Search,
    /// Highest context-similarity score.
    Score,
    /// Smallest combined rank, with a score-margin tie-break.
    Sum,
}

impl fmt::Display for RankPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RankPolicy::None => write!(f, "none"),
            RankPolicy::Search => write!(f, "search"),
            RankPolicy::Score => write!(f, "score"),
            RankPolicy::Sum => write!(f, "sum"),
        }
    }
}

impl FromStr for RankPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(RankPolicy::None),
            "search" => Ok(RankPolicy::Search),
            "score" => Ok(RankPolicy::Score),
            "sum" => Ok(RankPolicy::Sum),
            other => Err(anyhow!(
                "unrecognized rank policy '{}' (expected none, search, score or sum)",
                other
            )),
        }
    }
}

/// Per-query configuration: which types are wanted, tolerated or rejected,
/// which relations to traverse, and how much of the candidate list to examine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeProfile {
    pub target_types: Vec<String>,
    pub near_miss_types: Vec<String>,
    pub ok_types: Vec<String>,
    pub bad_types: Vec<String>,
    pub category: Category,
    pub limit: usize,
    pub top: usize,
}

impl Default for TypeProfile {
    fn default() -> Self {
        TypeProfile {
            target_types: vec![DEFAULT_TARGET_TYPE.to_string()],
            near_miss_types: Vec::new(),
            ok_types: Vec::new(),
            bad_types: Vec::new(),
            category: Category::All,
            limit: DEFAULT_LIMIT,
            top: DEFAULT_TOP,
        }
    }
}

impl TypeProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_near_miss_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.near_miss_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_ok_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ok_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_bad_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bad_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.min(MAX_LIMIT);
        self
    }

    pub fn with_top(mut self, top: usize) -> Self {
        self.top = top;
        self
    }
}

/// A type identifier together with its human-readable label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypePair {
    pub id: String,
    pub label: String,
}

impl TypePair {
    pub fn new(id: &str, label: &str) -> Self {
        TypePair {
            id: id.to_string(),
            label: label.to_string(),
        }
    }
}

impl fmt::Display for TypePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, self.label)
    }
}

/// A raw search hit, in the order the search backend returned it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// 1-based position in the search backend's result order.
    pub search_rank: usize,
}

/// Which acceptance bucket a classified candidate landed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bucket {
    Target,
    NearMiss,
    Ok,
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bucket::Target => write!(f, "target"),
            Bucket::NearMiss => write!(f, "near_miss"),
            Bucket::Ok => write!(f, "ok"),
        }
    }
}

/// A candidate that survived type classification. Candidates matching a bad
/// type never materialize into this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedCandidate {
    #[serde(flatten)]
    pub candidate: Candidate,
    pub bucket: Bucket,
    pub matched_types: Vec<TypePair>,
}

/// A classified candidate plus its context-similarity scoring fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    #[serde(flatten)]
    pub classified: ClassifiedCandidate,
    /// Similarity between the query context and this candidate's canonical
    /// text; 0.0 when no context was supplied.
    pub score: f32,
    /// 1-based rank when candidates are sorted by score descending.
    pub score_rank: usize,
    /// Average of `score_rank` and `search_rank`.
    pub combined_rank: f32,
}

impl ScoredCandidate {
    pub fn id(&self) -> &str {
        &self.classified.candidate.id
    }

    pub fn search_rank(&self) -> usize {
        self.classified.candidate.search_rank
    }
}

/// Label, aliases, description and encyclopedia article name in one language.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LexicalEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub aliases: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub article_name: Option<String>,
}

impl LexicalEntry {
    pub fn is_empty(&self) -> bool {
        self.label.is_none()
            && self.aliases.is_empty()
            && self.description.is_none()
            && self.article_name.is_none()
    }
}

/// Data fetched from the external encyclopedic source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExternalData {
    /// Canonical article name, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub article: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub types: Vec<String>,
    /// Per-language abstract paragraphs.
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub abstracts: BTreeMap<String, String>,
}

/// The terminal, enriched result handed back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedEntity {
    pub id: String,
    pub uri: String,
    pub is_instance: bool,
    pub is_type: bool,
    /// Per-language lexical data, keyed by language code.
    pub languages: BTreeMap<String, LexicalEntry>,
    pub immediate_types: Vec<TypePair>,
    pub immediate_supertypes: Vec<TypePair>,
    pub sitelinks: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external: Option<ExternalData>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_round_trip() {
        for name in ["all", "instance", "strictinstance", "concept", "strictconcept"] {
            let category: Category = name.parse().unwrap();
            assert_eq!(category.to_string(), name);
        }
        assert!("everything".parse::<Category>().is_err());
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("sum".parse::<RankPolicy>().unwrap(), RankPolicy::Sum);
        assert_eq!("SCORE".parse::<RankPolicy>().unwrap(), RankPolicy::Score);
        assert!("best".parse::<RankPolicy>().is_err());
    }

    #[test]
    fn test_profile_limit_is_capped() {
        let profile = TypeProfile::new().with_limit(500);
        assert_eq!(profile.limit, MAX_LIMIT);
    }

    #[test]
    fn test_profile_defaults() {
        let profile = TypeProfile::default();
        assert_eq!(profile.target_types, vec![DEFAULT_TARGET_TYPE.to_string()]);
        assert_eq!(profile.limit, DEFAULT_LIMIT);
        assert_eq!(profile.top, DEFAULT_TOP);
        assert_eq!(profile.category, Category::All);
    }
}
