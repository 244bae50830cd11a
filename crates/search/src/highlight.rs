//! Highlight spans and display snippets for hits.

use echogarden_core::search::HighlightSpan;
use echogarden_core::similarity::word_spans;
use std::collections::HashSet;

const ELLIPSIS: char = '…';

/// Whole-word, case-insensitive matches of `terms` in `text`.
///
/// `terms` are expected lower-cased (see `parse_terms`). Spans are in
/// character offsets, sorted by start and non-overlapping.
pub fn highlight_spans(text: &str, terms: &[String]) -> Vec<HighlightSpan> {
    if terms.is_empty() {
        return Vec::new();
    }
    let wanted: HashSet<&str> = terms.iter().map(String::as_str).collect();

    word_spans(text)
        .into_iter()
        .filter(|(_, _, word)| wanted.contains(word.to_lowercase().as_str()))
        .map(|(start, end, _)| HighlightSpan { start, end })
        .collect()
}

/// Build up to `limit` snippets around `spans`.
///
/// Each snippet takes `window` characters either side of its match, wraps
/// the match in `**`, and marks cut ends with `…`. A window overlapping an
/// earlier snippet's window is skipped.
pub fn build_snippets(text: &str, spans: &[HighlightSpan], window: usize, limit: usize) -> Vec<String> {
    if spans.is_empty() || limit == 0 {
        return Vec::new();
    }
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    let mut taken: Vec<(usize, usize)> = Vec::new();
    let mut snippets = Vec::new();

    for span in spans {
        let start = span.start.saturating_sub(window);
        let end = (span.end + window).min(total);
        if taken.iter().any(|&(s, e)| start.max(s) < end.min(e)) {
            continue;
        }

        let mut snippet = String::new();
        if start > 0 {
            snippet.push(ELLIPSIS);
        }
        snippet.extend(&chars[start..span.start]);
        snippet.push_str("**");
        snippet.extend(&chars[span.start..span.end]);
        snippet.push_str("**");
        snippet.extend(&chars[span.end..end]);
        if end < total {
            snippet.push(ELLIPSIS);
        }

        snippets.push(snippet);
        taken.push((start, end));
        if snippets.len() >= limit {
            break;
        }
    }

    snippets
}
