//! Similarity and term helpers shared by sources and the ranker.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns `None` for empty, mismatched, or zero-norm vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return None;
    }

    Some(((dot / denom) as f32).clamp(-1.0, 1.0))
}

/// Maximal `\w` runs: letters, marks, digits, connector punctuation and join controls.
static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+").expect("word pattern is valid"));

/// Word runs of `text` as `(start_char, end_char, word)`.
///
/// Offsets count characters, not bytes.
pub fn word_spans(text: &str) -> Vec<(usize, usize, &str)> {
    let mut spans = Vec::new();
    let mut byte_pos = 0;
    let mut char_pos = 0;

    for m in WORD.find_iter(text) {
        let start = char_pos + text[byte_pos..m.start()].chars().count();
        let end = start + m.as_str().chars().count();
        spans.push((start, end, m.as_str()));
        byte_pos = m.end();
        char_pos = end;
    }
    spans
}

/// Lower-cased query terms, de-duplicated in first-occurrence order.
pub fn parse_terms(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    word_spans(query)
        .into_iter()
        .map(|(_, _, w)| w.to_lowercase())
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

/// The lower-cased set of words in `text`.
pub fn word_set(text: &str) -> HashSet<String> {
    word_spans(text)
        .into_iter()
        .map(|(_, _, w)| w.to_lowercase())
        .collect()
}

/// Jaccard overlap of two word sets. Two empty sets score 0.
pub fn set_jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f32 / union as f32
}

/// Jaccard overlap of the lower-cased word sets of two texts.
pub fn jaccard_similarity(a: &str, b: &str) -> f32 {
    set_jaccard(&word_set(a), &word_set(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_identical_vectors() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v).unwrap();
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_opposite_vectors() {
        let sim = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]).unwrap();
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), None);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), None);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), None);
    }

    #[test]
    fn cosine_known_value() {
        // [1,1] · [1,0] = 1, |[1,1]| = sqrt(2), |[1,0]| = 1
        let sim = cosine_similarity(&[1.0, 1.0], &[1.0, 0.0]).unwrap();
        assert!((sim - 0.7071).abs() < 0.001);
    }

    #[test]
    fn word_spans_use_char_offsets() {
        let spans = word_spans("héllo, wörld_2!");
        assert_eq!(spans, vec![(0, 5, "héllo"), (7, 14, "wörld_2")]);
    }

    #[test]
    fn combining_marks_stay_inside_words() {
        let text = "I love cafe\u{301} au lait";
        let spans = word_spans(text);
        assert_eq!(spans[2], (7, 12, "cafe\u{301}"));
        assert_eq!(parse_terms("cafe\u{301}"), vec!["cafe\u{301}"]);
        assert!(!word_set("a plain cafe").contains("cafe\u{301}"));
    }

    #[test]
    fn connector_punctuation_joins_words() {
        assert_eq!(word_spans("snake_case and a\u{203F}b"), vec![
            (0, 10, "snake_case"),
            (11, 14, "and"),
            (15, 18, "a\u{203F}b"),
        ]);
    }

    #[test]
    fn parse_terms_normalises_words() {
        assert_eq!(parse_terms("Hello, World! hello"), vec!["hello", "world"]);
        assert!(parse_terms("  ?! ").is_empty());
    }

    #[test]
    fn jaccard_counts_shared_words() {
        let sim = jaccard_similarity("docker volumes", "Docker compose");
        assert!((sim - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(jaccard_similarity("", ""), 0.0);
        assert_eq!(jaccard_similarity("a b", "a b"), 1.0);
    }
}
