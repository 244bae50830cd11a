//! Boundary-aware text truncation.

use unicode_segmentation::UnicodeSegmentation;

/// Appended to text that was cut.
pub const ELLIPSIS: char = '…';

/// Cut `text` to the longest prefix whose rendering fits, at a sentence or
/// word boundary when one is close enough.
///
/// `fits` is called with candidate texts (already ending in `…`) and must
/// be monotonic: if a text fits, every shorter prefix fits too. Returns
/// `None` when not even one character fits. Cuts only ever fall on char
/// boundaries.
pub fn fit_prefix(text: &str, fits: impl Fn(&str) -> bool) -> Option<String> {
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total = bounds.len() - 1;
    if total == 0 {
        return None;
    }

    let render = |n: usize| with_ellipsis(&text[..bounds[n]]);

    // Largest n in [1, total] with fits(render(n)).
    let (mut lo, mut hi) = (0usize, total);
    while lo < hi {
        let mid = lo + (hi - lo).div_ceil(2);
        if fits(&render(mid)) {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    if lo == 0 {
        return None;
    }

    let cut = boundary_cut(text, bounds[lo]);
    let kept = text[..cut].trim_end();
    if kept.is_empty() {
        return None;
    }
    Some(with_ellipsis(kept))
}

/// Back `end` (a char boundary) off to the best nearby boundary.
///
/// Prefers the end of the last complete sentence if that keeps at least
/// half the prefix, then the last word break, then `end` itself. Sentences
/// and words follow the Unicode segmentation rules (UAX #29).
pub fn boundary_cut(text: &str, end: usize) -> usize {
    let next = text[end..].chars().next();
    if next.is_none_or(char::is_whitespace) {
        return end;
    }

    let prefix_chars = text[..end].chars().count();
    let sentence_end = text
        .split_sentence_bound_indices()
        .take_while(|(i, sentence)| i + sentence.len() <= end)
        .last()
        .map(|(i, sentence)| i + sentence.trim_end().len());
    if let Some(cut) = sentence_end
        && cut > 0
        && text[..cut].chars().count() * 2 >= prefix_chars
    {
        return cut;
    }

    let word_break = text
        .split_word_bound_indices()
        .take_while(|(i, _)| *i < end)
        .filter(|(i, word)| *i > 0 && word.chars().all(char::is_whitespace))
        .last()
        .map(|(i, _)| i);
    word_break.unwrap_or(end)
}

fn with_ellipsis(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + ELLIPSIS.len_utf8());
    out.push_str(text.trim_end());
    out.push(ELLIPSIS);
    out
}
