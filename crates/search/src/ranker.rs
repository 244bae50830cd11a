//! The hybrid ranker: fans out to every candidate source, fuses, optionally
//! diversifies, and renders hits.
//!
//! Each source runs as its own future under a per-source timeout; all are
//! joined before fusion. A failed or timed-out source degrades the search
//! to the surviving signals and leaves a warning on the response. Only
//! when no source contributes does the search fail.

use echogarden_config::SearchConfig;
use echogarden_core::error::{Error, Result, SignalFailure, SourceError};
use echogarden_core::search::{Hit, ScoredCandidate, SearchRequest, SearchResponse, Signal};
use echogarden_core::similarity::parse_terms;
use echogarden_core::source::{CandidateQuery, CandidateSource, Embedder};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared, join_all};
use std::sync::Arc;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};

use crate::diversity::mmr_rerank;
use crate::fusion::{FusedCandidate, FusionWeights, fuse};
use crate::highlight::{build_snippets, highlight_spans};

type SharedEmbedding = Shared<BoxFuture<'static, std::result::Result<Arc<[f32]>, SourceError>>>;

/// What one source contributed to a search.
enum SourceOutcome {
    Candidates(Signal, Vec<ScoredCandidate>),
    Failed(SignalFailure),
    Skipped,
}

/// Merges lexical and vector candidates into one ranked list of hits.
pub struct HybridRanker {
    sources: Vec<Arc<dyn CandidateSource>>,
    embedder: Option<Arc<dyn Embedder>>,
    weights: FusionWeights,
    config: SearchConfig,
}

impl HybridRanker {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            sources: Vec::new(),
            embedder: None,
            weights: FusionWeights::from_config(&config),
            config,
        }
    }

    /// Add a candidate source.
    pub fn with_source(mut self, source: Arc<dyn CandidateSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Set the query embedder used by sources that need an embedding.
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn weights(&self) -> FusionWeights {
        self.weights
    }

    /// Run a search.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let started = Instant::now();

        let query = request.query.trim();
        if query.is_empty() {
            return Err(Error::invalid("query must not be empty"));
        }
        let terms = parse_terms(query);
        if terms.is_empty() {
            return Err(Error::invalid("query contains no searchable terms"));
        }
        if request.k == 0 {
            return Err(Error::invalid("k must be at least 1"));
        }
        request.filters.validate()?;

        let k = request.k.min(self.config.max_k);
        if k < request.k {
            debug!(requested = request.k, capped = k, "Capping k");
        }
        let limit = self
            .config
            .min_candidates
            .max(self.config.fetch_multiplier.saturating_mul(k));

        let embedding = self.query_embedding(query);
        let candidate_query = CandidateQuery {
            text: query.to_string(),
            embedding: None,
            limit,
            filters: request.filters.clone(),
        };

        let outcomes = join_all(
            self.sources
                .iter()
                .map(|source| self.fetch(source.as_ref(), &candidate_query, embedding.clone())),
        )
        .await;

        let mut lists = Vec::new();
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                SourceOutcome::Candidates(signal, candidates) => lists.push((signal, candidates)),
                SourceOutcome::Failed(failure) => failures.push(failure),
                SourceOutcome::Skipped => {}
            }
        }

        if lists.is_empty() {
            warn!(failures = failures.len(), "No candidate source succeeded");
            return Err(Error::UpstreamUnavailable { failures });
        }

        let mut fused = fuse(lists, &self.weights);
        fused.retain(|c| request.filters.admits(&c.message));
        let total_candidates = fused.len();

        let ranked = if request.diversity {
            let pool = self.config.mmr_pool_multiplier.saturating_mul(k);
            mmr_rerank(fused, k, self.config.mmr_lambda, pool)
        } else {
            fused.truncate(k);
            fused
        };

        let hits: Vec<Hit> = ranked.into_iter().map(|c| self.render(c, &terms)).collect();
        let warnings: Vec<String> = failures.iter().map(ToString::to_string).collect();

        info!(
            hits = hits.len(),
            candidates = total_candidates,
            degraded = !warnings.is_empty(),
            diversity = request.diversity,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Search complete"
        );

        Ok(SearchResponse { hits, warnings })
    }

    /// One embedding future shared by every source that needs it.
    fn query_embedding(&self, query: &str) -> Option<SharedEmbedding> {
        if !self.sources.iter().any(|s| s.needs_embedding()) {
            return None;
        }
        let embedder = self.embedder.clone()?;
        let fut: BoxFuture<'static, _> = embed_query(embedder, query.to_string()).boxed();
        Some(fut.shared())
    }

    async fn fetch(
        &self,
        source: &dyn CandidateSource,
        query: &CandidateQuery,
        embedding: Option<SharedEmbedding>,
    ) -> SourceOutcome {
        let signal = source.signal();
        let needs_embedding = source.needs_embedding();
        if needs_embedding && embedding.is_none() {
            debug!(signal = %signal, "No embedder configured, skipping source");
            return SourceOutcome::Skipped;
        }

        let started = Instant::now();
        let budget = self.config.source_timeout();
        let work = async {
            let mut query = query.clone();
            if needs_embedding && let Some(embedding) = embedding {
                match embedding.await {
                    Ok(vector) => query.embedding = Some(vector),
                    Err(e) => return Err(e),
                }
            }
            source.search(&query).await
        };

        let result = match timeout(budget, work).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout {
                signal,
                after_ms: self.config.source_timeout_ms,
            }),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(mut candidates) => {
                if candidates.len() > query.limit {
                    debug!(
                        signal = %signal,
                        returned = candidates.len(),
                        limit = query.limit,
                        "Source exceeded fetch limit, truncating"
                    );
                    candidates.truncate(query.limit);
                }
                debug!(
                    signal = %signal,
                    candidates = candidates.len(),
                    elapsed_ms,
                    "Candidate source returned"
                );
                SourceOutcome::Candidates(signal, candidates)
            }
            Err(error) => {
                warn!(signal = %signal, error = %error, elapsed_ms, "Candidate source failed");
                SourceOutcome::Failed(SignalFailure { signal, error })
            }
        }
    }

    fn render(&self, candidate: FusedCandidate, terms: &[String]) -> Hit {
        let highlights = highlight_spans(&candidate.message.text, terms);
        let snippets = build_snippets(
            &candidate.message.text,
            &highlights,
            self.config.snippet_window,
            self.config.snippet_limit,
        );
        Hit {
            message: candidate.message,
            score: candidate.score,
            highlights,
            snippets,
            signals: candidate.signals,
        }
    }
}

async fn embed_query(
    embedder: Arc<dyn Embedder>,
    text: String,
) -> std::result::Result<Arc<[f32]>, SourceError> {
    let vector = embedder.embed(&text).await?;
    if vector.is_empty() {
        return Err(SourceError::EmbeddingFailed(format!(
            "embedder '{}' returned an empty vector",
            embedder.name()
        )));
    }
    Ok(Arc::from(vector))
}
