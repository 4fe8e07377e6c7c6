//! Candidate classification.
//!
//! Retrieves raw search candidates and partitions them into target,
//! near-miss and ok buckets by intersecting each candidate's transitive
//! type closure with the profile's expanded type sets. Candidates with a
//! bad type are rejected outright; candidates matching nothing are dropped
//! silently.

use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::kb::KbClient;
use crate::registry::TypeRegistry;
use crate::types::{Bucket, Candidate, ClassifiedCandidate, TypePair, TypeProfile};
use crate::TARGET_CLASSIFY;

/// The profile's four type sets, expanded to canonical identifiers.
#[derive(Debug, Clone, Default)]
pub struct ExpandedSets {
    pub target: HashSet<String>,
    pub near_miss: HashSet<String>,
    pub ok: HashSet<String>,
    pub bad: HashSet<String>,
}

impl ExpandedSets {
    pub fn from_profile(registry: &TypeRegistry, profile: &TypeProfile) -> Self {
        ExpandedSets {
            target: registry.expand(&profile.target_types),
            near_miss: registry.expand(&profile.near_miss_types),
            ok: registry.expand(&profile.ok_types),
            bad: registry.expand(&profile.bad_types),
        }
    }
}

/// What `Scan::offer` decided about one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Accepted(Bucket),
    Rejected,
    Dropped,
}

/// Incremental candidate scan with the early-exit policy: scanning stops as
/// soon as the target bucket holds `top` hits, even if unexamined candidates
/// would also have qualified. Downstream consumers depend on the exact
/// resulting order, so the policy is preserved as-is.
struct Scan {
    top: usize,
    target_hits: Vec<ClassifiedCandidate>,
    near_miss_hits: Vec<ClassifiedCandidate>,
    ok_hits: Vec<ClassifiedCandidate>,
}

impl Scan {
    fn new(top: usize) -> Self {
        Scan {
            top,
            target_hits: Vec::new(),
            near_miss_hits: Vec::new(),
            ok_hits: Vec::new(),
        }
    }

    /// Buckets one candidate given its type closure. Bad-type membership
    /// takes absolute precedence; otherwise the first matching set in
    /// priority order target > near_miss > ok wins.
    fn offer(&mut self, candidate: Candidate, closure: &[TypePair], sets: &ExpandedSets) -> Verdict {
        let mut matched = Vec::new();
        let (mut has_target, mut has_near_miss, mut has_ok) = (false, false, false);

        for pair in closure {
            if sets.bad.contains(&pair.id) {
                debug!(
                    target: TARGET_CLASSIFY,
                    "Rejecting {} ({}): bad type {}", candidate.id, candidate.label, pair
                );
                return Verdict::Rejected;
            }
            if sets.target.contains(&pair.id) {
                has_target = true;
            } else if sets.near_miss.contains(&pair.id) {
                has_near_miss = true;
            } else if sets.ok.contains(&pair.id) {
                has_ok = true;
            } else {
                continue;
            }
            matched.push(pair.clone());
        }

        let bucket = if has_target {
            Bucket::Target
        } else if has_near_miss {
            Bucket::NearMiss
        } else if has_ok {
            Bucket::Ok
        } else {
            debug!(
                target: TARGET_CLASSIFY,
                "Dropping {} ({}): no acceptable type", candidate.id, candidate.label
            );
            return Verdict::Dropped;
        };

        let classified = ClassifiedCandidate {
            candidate,
            bucket,
            matched_types: matched,
        };
        match bucket {
            Bucket::Target => self.target_hits.push(classified),
            Bucket::NearMiss => self.near_miss_hits.push(classified),
            Bucket::Ok => self.ok_hits.push(classified),
        }
        Verdict::Accepted(bucket)
    }

    /// True once the target bucket is full and scanning should stop.
    fn is_full(&self) -> bool {
        self.top > 0 && self.target_hits.len() >= self.top
    }

    /// Final candidate list: target hits, then near-miss hits, then ok hits,
    /// each in scan order, truncated to `top`.
    fn finish(self) -> Vec<ClassifiedCandidate> {
        let mut hits = self.target_hits;
        hits.extend(self.near_miss_hits);
        hits.extend(self.ok_hits);
        if hits.len() > self.top {
            hits.truncate(self.top);
        }
        hits
    }
}

/// Classifies up to `profile.limit` search candidates for `mention`.
///
/// Remote failures degrade rather than abort: a failed search yields no
/// candidates, and a failed closure fetch drops that candidate.
pub async fn classify(
    kb: &KbClient,
    registry: &TypeRegistry,
    mention: &str,
    profile: &TypeProfile,
) -> Vec<ClassifiedCandidate> {
    let sets = ExpandedSets::from_profile(registry, profile);

    let candidates = match kb.search(mention, profile.limit).await {
        Ok(candidates) => candidates,
        Err(e) => {
            warn!(target: TARGET_CLASSIFY, "Search for '{}' failed: {}", mention, e);
            return Vec::new();
        }
    };
    let examined = candidates.len();

    let mut scan = Scan::new(profile.top);
    for candidate in candidates {
        let closure = match kb.type_closure(&candidate.id, profile.category).await {
            Ok(closure) => closure,
            Err(e) => {
                warn!(
                    target: TARGET_CLASSIFY,
                    "Type closure for {} failed, dropping candidate: {}", candidate.id, e
                );
                continue;
            }
        };
        scan.offer(candidate, &closure, &sets);
        if scan.is_full() {
            break;
        }
    }

    let hits = scan.finish();
    info!(
        target: TARGET_CLASSIFY,
        "Classified '{}': {} hits from {} candidates examined", mention, hits.len(), examined
    );
    hits
}
