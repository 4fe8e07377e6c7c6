use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use std::str::FromStr;
use tracing::error;

use tether::logging::configure_logging;
use tether::registry;
use tether::types::{ResolvedEntity, ScoredCandidate, DEFAULT_LIMIT, DEFAULT_TOP};
use tether::{Category, Linker, RankPolicy, TypeProfile};

/// Resolve a free-text mention to a ranked list of knowledge-base entities.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// String to search for in entity labels, aliases and text
    mention: String,

    /// Required types, as names or Q-identifiers
    #[arg(short = 't', long = "types", num_args = 1..)]
    types: Vec<String>,

    /// Plausible types, ranked below exact target-type matches
    #[arg(long = "near-types", num_args = 1..)]
    near_types: Vec<String>,

    /// Acceptable fallback types
    #[arg(long = "ok-types", num_args = 1..)]
    ok_types: Vec<String>,

    /// Types that disqualify a candidate outright
    #[arg(short = 'b', long = "bad-types", num_args = 1..)]
    bad_types: Vec<String>,

    /// Language codes for returned string data
    #[arg(short = 'l', long = "lang", num_args = 1.., default_value = "en")]
    lang: Vec<String>,

    /// Number of initial candidates to examine (capped at 50)
    #[arg(long, default_value_t = DEFAULT_LIMIT)]
    limit: usize,

    /// Number of ranked hits to return
    #[arg(long, default_value_t = DEFAULT_TOP)]
    top: usize,

    /// Type-relation traversal mode: all, instance, strictinstance,
    /// concept or strictconcept
    #[arg(long, default_value = "all")]
    category: String,

    /// Context text used to disambiguate between candidates
    #[arg(long)]
    context: Option<String>,

    /// Winner selection policy: none, search, score or sum
    #[arg(long, default_value = "sum")]
    policy: String,

    /// Also fetch external encyclopedic types and abstracts
    #[arg(long)]
    external: bool,

    /// Start from the built-in cybersecurity type profile
    #[arg(long)]
    cyber: bool,

    /// Print only the best hit instead of the full ranked list
    #[arg(long)]
    best: bool,
}

#[derive(Serialize)]
struct Hit {
    #[serde(flatten)]
    link: ScoredCandidate,
    entity: ResolvedEntity,
}

#[tokio::main]
async fn main() -> Result<()> {
    configure_logging();
    let cli = Cli::parse();

    // A bad mode or policy is a per-query configuration error: report it
    // and produce an empty result instead of aborting.
    let category = match Category::from_str(&cli.category) {
        Ok(category) => category,
        Err(e) => {
            error!("{}", e);
            println!("[]");
            return Ok(());
        }
    };
    let policy = match RankPolicy::from_str(&cli.policy) {
        Ok(policy) => policy,
        Err(e) => {
            error!("{}", e);
            println!("[]");
            return Ok(());
        }
    };

    let mut profile = if cli.cyber {
        registry::cyber_profile()
    } else {
        TypeProfile::new()
    };
    if cli.cyber {
        // The cyber profile is a base; explicit sets extend it.
        profile.target_types.extend(cli.types.clone());
        profile.near_miss_types.extend(cli.near_types.clone());
        profile.ok_types.extend(cli.ok_types.clone());
        profile.bad_types.extend(cli.bad_types.clone());
    } else {
        if !cli.types.is_empty() {
            profile.target_types = cli.types.clone();
        }
        profile.near_miss_types = cli.near_types.clone();
        profile.ok_types = cli.ok_types.clone();
        profile.bad_types = cli.bad_types.clone();
    }
    let profile = profile
        .with_category(category)
        .with_limit(cli.limit)
        .with_top(cli.top);

    let linker = Linker::new();
    let candidates = linker.search(&cli.mention, &profile).await;
    let ranking = linker.rank(candidates, cli.context.as_deref(), policy);

    let selected: Vec<ScoredCandidate> = if cli.best {
        ranking.best_candidate().cloned().into_iter().collect()
    } else {
        ranking.candidates
    };

    let mut hits = Vec::with_capacity(selected.len());
    for link in selected {
        let entity = linker.enrich(link.id(), &cli.lang, cli.external).await;
        hits.push(Hit { link, entity });
    }

    println!("{}", serde_json::to_string_pretty(&hits)?);

    let counts = linker.query_counts();
    eprintln!(
        "Queries to knowledge base: {}, external source: {}",
        counts.kb, counts.external
    );
    Ok(())
}
