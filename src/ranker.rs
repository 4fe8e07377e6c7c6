//! Context scoring and best-candidate selection.
//!
//! The ranker consumes a similarity judgment through the `ContextScorer`
//! trait; it never computes language understanding itself. Scoring adds
//! fields to classified candidates and chooses one winner, without ever
//! changing a candidate's bucket.

use std::collections::HashSet;
use strsim::jaro_winkler;
use tracing::debug;
use unicode_segmentation::UnicodeSegmentation;

use crate::types::{Candidate, ClassifiedCandidate, RankPolicy, ScoredCandidate};
use crate::TARGET_RANK;

// A tied top score must beat the runner-up by this margin to win outright.
const SCORE_MARGIN: f32 = 1.1;

/// Similarity between a context string and a candidate's canonical text,
/// in [0, 1]. Injected; implementations may be statistical or lexical.
pub trait ContextScorer: Send + Sync {
    fn similarity(&self, context: &str, text: &str) -> f32;
}

/// Built-in lexical scorer: token overlap blended with string similarity.
pub struct LexicalScorer;

impl LexicalScorer {
    fn tokens(text: &str) -> HashSet<String> {
        text.unicode_words().map(|w| w.to_lowercase()).collect()
    }
}

impl ContextScorer for LexicalScorer {
    fn similarity(&self, context: &str, text: &str) -> f32 {
        let context_tokens = Self::tokens(context);
        let text_tokens = Self::tokens(text);
        if context_tokens.is_empty() || text_tokens.is_empty() {
            return 0.0;
        }
        let intersection = context_tokens.intersection(&text_tokens).count() as f32;
        let union = context_tokens.union(&text_tokens).count() as f32;
        let overlap = intersection / union;

        let edit = jaro_winkler(&context.to_lowercase(), &text.to_lowercase()) as f32;

        (0.7 * overlap + 0.3 * edit).clamp(0.0, 1.0)
    }
}

/// The text a candidate is scored against: its description when that
/// already contains the label, otherwise label and description together.
pub fn canonical_text(candidate: &Candidate) -> String {
    let description = candidate.description.as_deref().unwrap_or("");
    if description
        .to_lowercase()
        .contains(&candidate.label.to_lowercase())
    {
        description.to_string()
    } else if description.is_empty() {
        candidate.label.clone()
    } else {
        format!("{} {}", candidate.label, description)
    }
}

/// A scored candidate list and the index of the selected winner.
#[derive(Debug, Clone)]
pub struct Ranking {
    pub candidates: Vec<ScoredCandidate>,
    pub best: Option<usize>,
}

impl Ranking {
    pub fn best_candidate(&self) -> Option<&ScoredCandidate> {
        self.best.and_then(|index| self.candidates.get(index))
    }
}

/// Scores candidates against `context` and selects a winner per `policy`.
///
/// Without a context (or without a scorer) every candidate scores 0.0 and
/// the first candidate in classification order wins under any policy.
pub fn rank(
    candidates: Vec<ClassifiedCandidate>,
    context: Option<&str>,
    scorer: Option<&dyn ContextScorer>,
    policy: RankPolicy,
) -> Ranking {
    if candidates.is_empty() {
        return Ranking {
            candidates: Vec::new(),
            best: None,
        };
    }

    let scores: Vec<f32> = match (context, scorer) {
        (Some(context), Some(scorer)) => candidates
            .iter()
            .map(|classified| scorer.similarity(context, &canonical_text(&classified.candidate)))
            .collect(),
        _ => vec![0.0; candidates.len()],
    };

    // 1-based rank by score descending; a stable sort keeps relative
    // classification order among ties.
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(std::cmp::Ordering::Equal));
    let mut score_ranks = vec![0usize; candidates.len()];
    for (position, &index) in order.iter().enumerate() {
        score_ranks[index] = position + 1;
    }

    let scored: Vec<ScoredCandidate> = candidates
        .into_iter()
        .enumerate()
        .map(|(index, classified)| {
            let search_rank = classified.candidate.search_rank;
            ScoredCandidate {
                classified,
                score: scores[index],
                score_rank: score_ranks[index],
                combined_rank: (score_ranks[index] + search_rank) as f32 / 2.0,
            }
        })
        .collect();

    let best = if context.is_none() || scorer.is_none() {
        // No context to disambiguate with: the first hit in classification
        // order is the answer, whatever the policy says.
        Some(0)
    } else {
        select_best(&scored, policy)
    };

    if let Some(index) = best {
        debug!(
            target: TARGET_RANK,
            "Selected {} under policy {} (score {:.3}, combined rank {:.1})",
            scored[index].id(),
            policy,
            scored[index].score,
            scored[index].combined_rank
        );
    }

    Ranking {
        candidates: scored,
        best,
    }
}

fn select_best(scored: &[ScoredCandidate], policy: RankPolicy) -> Option<usize> {
    if scored.is_empty() {
        return None;
    }
    match policy {
        RankPolicy::None => Some(0),
        RankPolicy::Search => (0..scored.len()).min_by_key(|&i| scored[i].search_rank()),
        RankPolicy::Score => (0..scored.len()).min_by_key(|&i| scored[i].score_rank),
        RankPolicy::Sum => {
            let minimum = scored
                .iter()
                .map(|candidate| candidate.combined_rank)
                .fold(f32::INFINITY, f32::min);
            let mut tied: Vec<usize> = (0..scored.len())
                .filter(|&i| scored[i].combined_rank == minimum)
                .collect();
            if tied.len() == 1 {
                return tied.pop();
            }
            // Among the tied set, a clearly higher score wins; otherwise the
            // better search rank does.
            tied.sort_by(|&a, &b| {
                scored[b]
                    .score
                    .partial_cmp(&scored[a].score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            let top = tied[0];
            let runner_up = tied[1];
            if scored[top].score > SCORE_MARGIN * scored[runner_up].score {
                Some(top)
            } else {
                tied.into_iter().min_by_key(|&i| scored[i].search_rank())
            }
        }
    }
}
