//! `echogarden search` — Hybrid search over a JSONL archive.
//!
//! No embedder ships with the CLI, so the vector source is skipped and
//! results rank on the lexical signal alone.

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Args;
use echogarden_config::EngineConfig;
use echogarden_core::message::Role;
use echogarden_core::search::{DateRange, FilterSet, SearchRequest, default_k};
use echogarden_memory::load_jsonl;
use echogarden_search::HybridRanker;
use std::collections::BTreeSet;
use std::path::PathBuf;

#[derive(Args)]
pub struct SearchArgs {
    /// JSONL archive to search
    #[arg(long)]
    pub archive: PathBuf,

    /// Free-text query
    pub query: String,

    /// Maximum number of hits
    #[arg(short, long, default_value_t = default_k())]
    pub k: usize,

    /// Restrict to one conversation
    #[arg(long = "conv")]
    pub conv_id: Option<String>,

    /// Restrict to these roles (repeatable)
    #[arg(long = "role")]
    pub roles: Vec<Role>,

    /// Earliest timestamp (RFC 3339), inclusive
    #[arg(long)]
    pub from: Option<DateTime<Utc>>,

    /// Latest timestamp (RFC 3339), inclusive
    #[arg(long)]
    pub to: Option<DateTime<Utc>>,

    /// Match messages carrying any of these tags (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Restrict to messages produced by this model
    #[arg(long)]
    pub model: Option<String>,

    /// Re-rank with MMR to reduce near-duplicate hits
    #[arg(long)]
    pub diversity: bool,
}

impl SearchArgs {
    pub fn to_request(&self) -> SearchRequest {
        let date_range = (self.from.is_some() || self.to.is_some()).then_some(DateRange {
            from: self.from,
            to: self.to,
        });
        let filters = FilterSet {
            conv_id: self.conv_id.clone(),
            date_range,
            roles: (!self.roles.is_empty()).then(|| self.roles.iter().copied().collect()),
            tags: (!self.tags.is_empty())
                .then(|| self.tags.iter().cloned().collect::<BTreeSet<_>>()),
            model: self.model.clone(),
        };
        SearchRequest::new(self.query.clone(), self.k)
            .with_filters(filters)
            .with_diversity(self.diversity)
    }
}

pub async fn run(args: SearchArgs, config: &EngineConfig) -> anyhow::Result<()> {
    let store = load_jsonl(&args.archive)
        .with_context(|| format!("Failed to load archive {}", args.archive.display()))?;

    let ranker = HybridRanker::new(config.search.clone())
        .with_source(store.lexical_source())
        .with_source(store.vector_source());

    let response = ranker.search(&args.to_request()).await?;
    for warning in &response.warnings {
        tracing::warn!(warning = %warning, "Search degraded");
    }

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
