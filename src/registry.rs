//! Type-name registry
//!
//! Maps human-readable type names (and their aliases across naming schemes,
//! e.g. OntoNotes NER labels) to canonical knowledge-base type identifiers.
//! The registry is built once, at first use, from a static master table; all
//! queries afterwards are immutable lookups.

use lazy_static::lazy_static;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use tracing::warn;
use unicode_normalization::UnicodeNormalization;

use crate::types::TypeProfile;
use crate::TARGET_CLASSIFY;

// Master table: canonical type identifier -> names it is known by, across
// naming schemes (knowledge-base English labels, OntoNotes NER labels, and
// a few informal synonyms).
const TYPE_NAMES: &[(&str, &[&str])] = &[
    ("Q2221906", &["geographic location", "LOC"]),
    ("Q2424752", &["product", "PRODUCT"]),
    ("Q56061", &["GPE"]),
    ("Q5", &["human", "PER", "PERSON"]),
    ("Q13226383", &["facility", "FAC"]),
    ("Q1656682", &["event", "EVENT"]),
    ("Q1190554", &["occurrence", "EVENT"]),
    ("Q33742", &["natural language", "LANGUAGE"]),
    ("Q17537576", &["creative work", "WORK_OF_ART"]),
    ("Q43229", &["organization", "ORG"]),
    ("Q16334295", &["group of humans", "NORP"]),
    ("Q7210356", &["political organisation", "NORP"]),
    ("Q191780", &["ordinal number", "ORDINAL"]),
    ("Q21199", &["natural number", "CARDINAL"]),
    ("Q1368", &["MONEY"]),
    ("Q205892", &["calendar date", "DATE"]),
    ("Q573", &["day", "DATE"]),
    ("Q47018901", &["month", "DATE"]),
    ("Q3186692", &["calendar year", "year", "DATE"]),
    ("Q1248784", &["airport"]),
    ("Q4438121", &["sports organization", "sports team", "athletic team"]),
    ("Q515", &["city"]),
    ("Q7930989", &["city"]),
    ("Q15284", &["municipality", "city", "town", "village"]),
    ("Q486972", &["populated place", "settlement", "community"]),
    ("Q6256", &["country"]),
];

// Cybersecurity-relevant types, usable by name and bundled into the
// built-in cyber profile.
const CYBER_TARGET: &[(&str, &str)] = &[
    ("Q7397", "software"),
    ("Q205663", "process"),
    ("Q68", "computer"),
    ("Q1301371", "network"),
    ("Q14001", "malware"),
    ("Q783794", "company"),
    ("Q161157", "password"),
    ("Q1541645", "process identifier"),
    ("Q4418000", "network address"),
    ("Q5830907", "computer memory"),
    ("Q82753", "computer file"),
    ("Q2904148", "information leak"),
    ("Q4071928", "cyberattack"),
    ("Q477202", "cryptographic hash function"),
    ("Q141090", "encryption"),
    ("Q5227362", "data theft"),
    ("Q631425", "computer vulnerability"),
    ("Q627226", "Common Vulnerabilities and Exposures"),
    ("Q2801262", "hacker group"),
    ("Q2798820", "security hacker"),
    ("Q8142", "currency"),
    ("Q2587068", "sensitive information"),
    ("Q3966", "computer hardware"),
    ("Q17517", "mobile phone"),
    ("Q986008", "payment system"),
    ("Q13479982", "cryptocurrency"),
    ("Q20826013", "software version"),
    ("Q20631656", "software release"),
    ("Q44601380", "property that may violate privacy"),
    ("Q1058914", "software company"),
    ("Q278610", "dropper"),
    ("Q1332289", "black hat"),
    ("Q22685", "hacktivism"),
    ("Q47913", "intelligence agency"),
    ("Q28344495", "computer security consultant"),
    ("Q26102", "whistleblower"),
    ("Q317671", "botnet"),
    ("Q9135", "operating system"),
    ("Q4825885", "authentication protocol"),
    ("Q2659904", "government organization"),
    ("Q1668024", "service on internet"),
    ("Q202833", "social media"),
    ("Q870898", "computer security software"),
];

const CYBER_OK: &[(&str, &str)] = &[
    ("Q5", "human"),
    ("Q43229", "organization"),
    ("Q82794", "geographic region"),
    ("Q1048835", "political territorial entity"),
];

const CYBER_BAD: &[(&str, &str)] = &[
    ("Q2188189", "musical work"),
    ("Q4438121", "sports organization"),
    ("Q11410", "game"),
    ("Q14897293", "fictional entity"),
    ("Q32178211", "music organisation"),
    ("Q16010345", "performer"),
    ("Q483501", "artist"),
    ("Q56678558", "unknown composer author"),
    ("Q28555911", "ordinary matter"),
];

lazy_static! {
    static ref REGISTRY: TypeRegistry = TypeRegistry::build();
}

/// Case-fold a type name for lookup: NFKD, lowercase, collapsed whitespace.
fn fold(name: &str) -> String {
    name.nfkd()
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

static CANONICAL_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Q\d+$").expect("canonical identifier pattern"));

/// Returns true when the string is already a canonical type identifier
/// (the `Q` sigil followed by digits).
pub fn is_canonical_id(name: &str) -> bool {
    CANONICAL_ID.is_match(name)
}

/// Precomputed name-to-identifier table, queried by immutable lookup.
pub struct TypeRegistry {
    name_to_ids: HashMap<String, Vec<String>>,
}

impl TypeRegistry {
    /// The process-wide registry, built on first use.
    pub fn shared() -> &'static TypeRegistry {
        &REGISTRY
    }

    fn build() -> Self {
        let mut name_to_ids: HashMap<String, Vec<String>> = HashMap::new();

        let mut insert = |name: &str, id: &str| {
            let ids = name_to_ids.entry(name.to_string()).or_default();
            if !ids.iter().any(|existing| existing == id) {
                ids.push(id.to_string());
            }
        };

        for (id, names) in TYPE_NAMES {
            // Identity mapping: every canonical identifier is its own alias.
            insert(id, id);
            for name in *names {
                insert(name, id);
                insert(&fold(name), id);
            }
        }

        let cyber_tables = [CYBER_TARGET, CYBER_OK, CYBER_BAD];
        for table in cyber_tables {
            for (id, name) in table {
                insert(id, id);
                insert(name, id);
                insert(&fold(name), id);
            }
        }

        TypeRegistry { name_to_ids }
    }

    /// Expands type names and/or canonical identifiers into the set of
    /// canonical identifiers they denote.
    ///
    /// Identifiers pass through unchanged. Unrecognized names log a
    /// diagnostic and contribute nothing; this never fails.
    pub fn expand<I, S>(&self, names: I) -> HashSet<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ids = HashSet::new();
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() {
                continue;
            }
            if is_canonical_id(name) {
                ids.insert(name.to_string());
                continue;
            }
            match self
                .name_to_ids
                .get(name)
                .or_else(|| self.name_to_ids.get(&fold(name)))
            {
                Some(mapped) => ids.extend(mapped.iter().cloned()),
                None => {
                    warn!(target: TARGET_CLASSIFY, "Unrecognized type name '{}', ignoring", name);
                }
            }
        }
        ids
    }
}

/// Built-in profile for cybersecurity entity linking.
pub fn cyber_profile() -> TypeProfile {
    TypeProfile::new()
        .with_target_types(CYBER_TARGET.iter().map(|(id, _)| *id))
        .with_ok_types(CYBER_OK.iter().map(|(id, _)| *id))
        .with_bad_types(CYBER_BAD.iter().map(|(id, _)| *id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_ids_pass_through() {
        let registry = TypeRegistry::shared();
        let ids = registry.expand(["Q42"]);
        assert!(ids.contains("Q42"));
        assert_eq!(ids.len(), 1);
    }

    #[test]
    fn test_name_lookup() {
        let registry = TypeRegistry::shared();
        assert!(registry.expand(["malware"]).contains("Q14001"));
        assert!(registry.expand(["ORG"]).contains("Q43229"));
    }

    #[test]
    fn test_case_folded_lookup() {
        let registry = TypeRegistry::shared();
        assert!(registry.expand(["loc"]).contains("Q2221906"));
        assert!(registry.expand(["Malware"]).contains("Q14001"));
    }

    #[test]
    fn test_multi_valued_names() {
        let registry = TypeRegistry::shared();
        let ids = registry.expand(["city"]);
        assert!(ids.contains("Q515"));
        assert!(ids.contains("Q7930989"));
        assert!(ids.contains("Q15284"));
    }

    #[test]
    fn test_unknown_names_degrade_to_empty() {
        let registry = TypeRegistry::shared();
        assert!(registry.expand(["no such type"]).is_empty());
    }

    #[test]
    fn test_identity_alias() {
        // The sigil check already passes identifiers through, but the
        // identity mapping also covers them if the check ever tightens.
        let registry = TypeRegistry::shared();
        assert!(registry.expand(["Q14001"]).contains("Q14001"));
    }

    #[test]
    fn test_is_canonical_id() {
        assert!(is_canonical_id("Q5"));
        assert!(is_canonical_id("Q35120"));
        assert!(!is_canonical_id("Q"));
        assert!(!is_canonical_id("QUANTITY"));
        assert!(!is_canonical_id("malware"));
    }

    #[test]
    fn test_cyber_profile_sets() {
        let profile = cyber_profile();
        assert!(profile.target_types.iter().any(|t| t == "Q14001"));
        assert!(profile.bad_types.iter().any(|t| t == "Q11410"));
        assert!(profile.ok_types.iter().any(|t| t == "Q5"));
    }
}
