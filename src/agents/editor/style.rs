//! Readability heuristics

use crate::config::EditingConfig;
use crate::types::{StyleReport, word_count};

/// Split text into trimmed, non-empty sentences
///
/// A sentence ends at `.`, `!` or `?` followed by whitespace or the end of the
/// text, so decimals such as "1.5" stay intact.
pub fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = chars.peek().is_none_or(|(_, next)| next.is_whitespace());
            if at_boundary {
                let end = idx + c.len_utf8();
                let sentence = text[start..end].trim();
                if !sentence.is_empty() {
                    out.push(sentence);
                }
                start = end;
            }
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

/// Measure sentence lengths and look for banned phrases
pub fn style_check(body: &str, config: &EditingConfig) -> StyleReport {
    let sentences = sentences(body);
    let lengths: Vec<usize> = sentences.iter().map(|s| word_count(s)).collect();

    let sentence_count = sentences.len();
    let mean_sentence_words = if sentence_count == 0 {
        0.0
    } else {
        lengths.iter().sum::<usize>() as f64 / sentence_count as f64
    };

    let long_sentences = sentences
        .iter()
        .zip(&lengths)
        .filter(|(_, words)| **words > config.max_sentence_words)
        .map(|(s, _)| s.to_string())
        .collect();

    let lowered = body.to_lowercase();
    let banned_phrases = config
        .banned_phrases
        .iter()
        .filter(|phrase| {
            !phrase.trim().is_empty() && lowered.contains(&phrase.to_lowercase())
        })
        .cloned()
        .collect();

    StyleReport {
        sentence_count,
        mean_sentence_words,
        max_sentence_words: lengths.iter().copied().max().unwrap_or(0),
        long_sentences,
        banned_phrases,
    }
}
