//! Context pack assembly.
//!
//! Renders requested messages in caller order as role-annotated segments,
//! packs as many as fit the token budget, and appends a provenance footer.
//!
//! # Truncation
//!
//! Front-load and tail-keep: leading segments are included whole while
//! they fit. The first segment that does not fit is cut at a sentence or
//! word boundary if at least `min_fragment_tokens` remain, otherwise it is
//! dropped, and packing stops there. Every message left out is listed in
//! `omitted` with the reason.
//!
//! # Determinism
//!
//! Output depends only on the request, the fetched messages and the token
//! counter. Identical inputs produce byte-identical `text_block`s.

use chrono::{DateTime, SecondsFormat, Utc};
use echogarden_config::PackConfig;
use echogarden_core::error::{Error, Result};
use echogarden_core::message::{MessageKey, MessageRef, Role};
use echogarden_core::pack::{Omission, OmissionReason, PackRequest, PackResponse, SegmentMeta};
use echogarden_core::source::MessageStore;
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::token::{TokenCounter, TokenScheme};
use crate::truncate::fit_prefix;

const SEPARATOR: &str = "\n\n";

// ── Types ─────────────────────────────────────────────────────────────────

/// One rendered message in a pack.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub key: MessageKey,
    pub role: Role,
    pub timestamp: DateTime<Utc>,
    /// `[role • timestamp] text`, possibly cut
    pub text: String,
    /// Tokens for the segment and its trailing separator
    pub token_count: usize,
    pub truncated: bool,
}

impl Segment {
    pub fn meta(&self) -> SegmentMeta {
        SegmentMeta {
            conv_id: self.key.conv_id.clone(),
            msg_id: self.key.msg_id.clone(),
            role: self.role,
            timestamp: self.timestamp,
            token_count: self.token_count,
            truncated: self.truncated,
        }
    }
}

/// A token-budgeted block of messages plus provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextPack {
    pub text_block: String,
    /// Segment tokens plus footer tokens; never above `max_tokens`
    pub token_count: usize,
    pub max_tokens: usize,
    pub model: String,
    /// Some requested content was cut or left out to fit the budget
    pub truncated: bool,
    pub segments: Vec<Segment>,
    pub omitted: Vec<Omission>,
}

impl ContextPack {
    pub fn to_response(&self) -> PackResponse {
        PackResponse {
            text_block: self.text_block.clone(),
            token_count: self.token_count,
            truncated: self.truncated,
            segments: self.segments.iter().map(Segment::meta).collect(),
            omitted: self.omitted.clone(),
        }
    }
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// Builds context packs from a message store.
pub struct ContextPackAssembler {
    store: Arc<dyn MessageStore>,
    counter: Arc<TokenCounter>,
    config: PackConfig,
}

impl ContextPackAssembler {
    pub fn new(store: Arc<dyn MessageStore>, counter: Arc<TokenCounter>, config: PackConfig) -> Self {
        Self {
            store,
            counter,
            config,
        }
    }

    pub fn config(&self) -> &PackConfig {
        &self.config
    }

    /// Assemble a pack for `request`.
    pub async fn pack(&self, request: &PackRequest) -> Result<ContextPack> {
        let keys = parse_ids(&request.message_ids)?;
        let max_tokens = request.max_tokens.unwrap_or(self.config.default_max_tokens);
        if max_tokens == 0 {
            return Err(Error::invalid("max_tokens must be positive"));
        }
        if max_tokens > self.config.max_tokens_cap {
            return Err(Error::invalid(format!(
                "max_tokens {max_tokens} exceeds the cap of {}",
                self.config.max_tokens_cap
            )));
        }
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.config.default_model.clone());

        let (found, failed) = self.fetch(&keys).await;
        if !keys.iter().any(|k| found.contains_key(k)) {
            warn!(requested = keys.len(), "No requested message could be resolved");
            return Err(Error::NoContentAvailable {
                requested: keys.len(),
                omitted: keys,
            });
        }

        let scheme = self.counter.scheme(&model);
        let layout = Layout {
            scheme,
            max_tokens,
            footer_reserve: self.config.footer_reserve,
            min_fragment_tokens: self.config.min_fragment_tokens,
        };

        let mut segments: Vec<Segment> = Vec::new();
        let mut omitted: Vec<Omission> = Vec::new();
        let mut used = 0usize;
        let mut truncated = false;
        let mut exhausted = false;

        for key in &keys {
            let Some(message) = found.get(key) else {
                let reason = if failed.contains(key) {
                    OmissionReason::FetchFailed
                } else {
                    OmissionReason::NotFound
                };
                debug!(id = %key, ?reason, "Omitting message");
                omitted.push(Omission::new(key, reason));
                continue;
            };

            if exhausted {
                debug!(id = %key, "Omitting message, budget exhausted");
                omitted.push(Omission::new(key, OmissionReason::BudgetExhausted));
                continue;
            }

            match layout.place(message, &segments, used) {
                Placement::Whole(segment) => {
                    used += segment.token_count;
                    segments.push(segment);
                }
                Placement::Cut(segment) => {
                    debug!(id = %key, tokens = segment.token_count, "Truncating message to fit");
                    used += segment.token_count;
                    segments.push(segment);
                    truncated = true;
                    exhausted = true;
                }
                Placement::DoesNotFit => {
                    debug!(id = %key, "Omitting message, budget exhausted");
                    omitted.push(Omission::new(key, OmissionReason::BudgetExhausted));
                    truncated = true;
                    exhausted = true;
                }
            }
        }

        if segments.is_empty() {
            warn!(
                max_tokens,
                footer_reserve = self.config.footer_reserve,
                omitted = omitted.len(),
                "Budget too small for any segment"
            );
            return Ok(ContextPack {
                text_block: String::new(),
                token_count: 0,
                max_tokens,
                model,
                truncated,
                segments,
                omitted,
            });
        }

        let footer_tokens = layout.footer_tokens(&segments, truncated);
        let token_count = used + footer_tokens;
        let footer = render_footer(&segments, token_count, max_tokens, truncated);

        let mut text_block = String::new();
        for segment in &segments {
            text_block.push_str(&segment.text);
            text_block.push_str(SEPARATOR);
        }
        text_block.push_str(&footer);

        info!(
            segments = segments.len(),
            omitted = omitted.len(),
            token_count,
            max_tokens,
            truncated,
            model = %model,
            "Context pack assembled"
        );

        Ok(ContextPack {
            text_block,
            token_count,
            max_tokens,
            model,
            truncated,
            segments,
            omitted,
        })
    }

    /// Fetch messages one conversation at a time, concurrently.
    ///
    /// Returns the resolved messages and the keys whose lookup failed.
    async fn fetch(&self, keys: &[MessageKey]) -> (HashMap<MessageKey, MessageRef>, HashSet<MessageKey>) {
        let mut groups: Vec<(String, Vec<MessageKey>)> = Vec::new();
        for key in keys {
            match groups.iter_mut().find(|(conv, _)| conv == &key.conv_id) {
                Some((_, group)) => group.push(key.clone()),
                None => groups.push((key.conv_id.clone(), vec![key.clone()])),
            }
        }

        let budget = self.config.fetch_timeout();
        let results = join_all(groups.iter().map(|(conv_id, group)| async move {
            let outcome = timeout(budget, self.store.fetch_messages(group)).await;
            (conv_id, group, outcome)
        }))
        .await;

        let mut found = HashMap::new();
        let mut failed = HashSet::new();
        for (conv_id, group, outcome) in results {
            match outcome {
                Ok(Ok(messages)) => {
                    // Ignore anything the store returned that was not asked for.
                    for key in group {
                        if let Some(message) = messages.get(key) {
                            found.insert(key.clone(), message.clone());
                        }
                    }
                }
                Ok(Err(e)) => {
                    warn!(conv_id = %conv_id, error = %e, "Message fetch failed");
                    failed.extend(group.iter().cloned());
                }
                Err(_) => {
                    warn!(
                        conv_id = %conv_id,
                        timeout_ms = self.config.fetch_timeout_ms,
                        "Message fetch timed out"
                    );
                    failed.extend(group.iter().cloned());
                }
            }
        }
        (found, failed)
    }
}

/// Parse and de-duplicate identifiers, keeping first occurrences in order.
fn parse_ids(ids: &[String]) -> Result<Vec<MessageKey>> {
    if ids.is_empty() {
        return Err(Error::invalid("message_ids must not be empty"));
    }
    let mut seen = HashSet::new();
    let mut keys = Vec::with_capacity(ids.len());
    for raw in ids {
        let key = MessageKey::parse(raw)?;
        if seen.insert(key.clone()) {
            keys.push(key);
        }
    }
    Ok(keys)
}

// ── Layout ────────────────────────────────────────────────────────────────

enum Placement {
    Whole(Segment),
    Cut(Segment),
    DoesNotFit,
}

struct Layout<'a> {
    scheme: &'a TokenScheme,
    max_tokens: usize,
    footer_reserve: usize,
    min_fragment_tokens: usize,
}

impl Layout<'_> {
    /// Decide how `message` fits after `placed` segments costing `used`.
    fn place(&self, message: &MessageRef, placed: &[Segment], used: usize) -> Placement {
        let header = render_header(message);
        let key = message.key();

        // Footer cost if this message is listed, bounded below by the reserve.
        let ids: Vec<&MessageKey> = placed.iter().map(|s| &s.key).chain([&key]).collect();
        let reserve = self.footer_reserve.max(self.footer_cost(&ids, true));

        let full = format!("{header}{}", message.text);
        let cost = self.segment_cost(&full);
        if used + cost + reserve <= self.max_tokens {
            return Placement::Whole(self.segment(message, full, cost, false));
        }

        let remaining = self.max_tokens.saturating_sub(used + reserve);
        if remaining < self.min_fragment_tokens {
            return Placement::DoesNotFit;
        }
        let fits = |candidate: &str| self.segment_cost(&format!("{header}{candidate}")) <= remaining;
        match fit_prefix(&message.text, fits) {
            Some(cut) => {
                let text = format!("{header}{cut}");
                let cost = self.segment_cost(&text);
                Placement::Cut(self.segment(message, text, cost, true))
            }
            None => Placement::DoesNotFit,
        }
    }

    fn segment(&self, message: &MessageRef, text: String, token_count: usize, truncated: bool) -> Segment {
        Segment {
            key: message.key(),
            role: message.role,
            timestamp: message.timestamp,
            text,
            token_count,
            truncated,
        }
    }

    fn segment_cost(&self, text: &str) -> usize {
        self.scheme.count(&format!("{text}{SEPARATOR}"))
    }

    /// Footer tokens, measured with the widest possible usage figure.
    fn footer_cost(&self, ids: &[&MessageKey], truncated: bool) -> usize {
        let footer = footer_text(ids.iter().copied(), self.max_tokens, self.max_tokens, truncated);
        self.scheme.count(&footer)
    }

    fn footer_tokens(&self, segments: &[Segment], truncated: bool) -> usize {
        let ids: Vec<&MessageKey> = segments.iter().map(|s| &s.key).collect();
        self.footer_cost(&ids, truncated)
    }
}

fn render_header(message: &MessageRef) -> String {
    format!(
        "[{} • {}] ",
        message.role,
        message.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

fn render_footer(segments: &[Segment], used: usize, max_tokens: usize, truncated: bool) -> String {
    footer_text(segments.iter().map(|s| &s.key), used, max_tokens, truncated)
}

fn footer_text<'a>(
    ids: impl Iterator<Item = &'a MessageKey>,
    used: usize,
    max_tokens: usize,
    truncated: bool,
) -> String {
    let ids: Vec<String> = ids.map(ToString::to_string).collect();
    let mut footer = format!(
        "---\nSources: {}\nTokens: {used}/{max_tokens}",
        ids.join(", ")
    );
    if truncated {
        footer.push_str(&format!("\n-- Truncated at {max_tokens} tokens --"));
    }
    footer
}
