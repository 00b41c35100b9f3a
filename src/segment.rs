//! Splitting long prompt text into generation-sized segments.
//!
//! The general-purpose splitter packs sentences toward a goal length without
//! ever exceeding a hard maximum, falling back to word- and character-level
//! splits for unsplittable runs. A legacy mode groups text by fixed counts
//! of sentences, words, or lines instead. Neither mode loses content: the
//! concatenated non-whitespace output always matches the input.

use anyhow::Result;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Words per minute assumed when estimating spoken time.
const SPOKEN_WPM: f32 = 150.0;

/// Unit used by the legacy grouping splitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitUnit {
    /// Group whole sentences.
    Sentence,
    /// Group whitespace-separated words.
    Word,
    /// Group input lines.
    Line,
}

/// Split text into ordered segments close to `goal` characters, never past
/// `max`.
///
/// Sentence boundaries are preferred; a single sentence longer than `max`
/// is split at word boundaries, and a single word longer than `max` is cut
/// at character boundaries. Degenerate input still yields one segment.
pub fn split_into_segments(text: &str, goal: usize, max: usize) -> Vec<String> {
    let goal = goal.max(1);
    let max = max.max(goal);

    let mut segments = Vec::new();
    let mut current = String::new();
    for sentence in split_sentences(text) {
        for piece in clamp_to_max(&sentence, max) {
            let current_len = current.chars().count();
            let piece_len = piece.chars().count();
            // Flush once the goal is met or the piece would overflow.
            if !current.is_empty() && (current_len >= goal || current_len + 1 + piece_len > max) {
                segments.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&piece);
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }

    if segments.is_empty() {
        segments.push(text.trim().to_string());
    }
    segments
}

/// Apply a uniform random offset within `±jitter` to the goal and max
/// lengths before splitting. The max never drops below the goal.
pub fn jittered_lengths(
    goal: usize,
    max: usize,
    jitter: usize,
    rng: &mut impl Rng,
) -> (usize, usize) {
    if jitter == 0 {
        return (goal, max);
    }
    let jitter = jitter as i64;
    let goal = (goal as i64 + rng.gen_range(-jitter..=jitter)).max(1) as usize;
    let max = (max as i64 + rng.gen_range(-jitter..=jitter)).max(1) as usize;
    (goal, max.max(goal))
}

/// Legacy splitter: group text by fixed counts of `unit`, ignoring length
/// goals entirely.
pub fn split_by_groups(text: &str, unit: SplitUnit, group_size: usize) -> Result<Vec<String>> {
    if group_size == 0 {
        anyhow::bail!("legacy split group size must be at least 1");
    }
    let (units, joiner): (Vec<String>, &str) = match unit {
        SplitUnit::Sentence => (split_sentences(text), " "),
        SplitUnit::Word => (
            text.split_whitespace().map(str::to_string).collect(),
            " ",
        ),
        SplitUnit::Line => (
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            "\n",
        ),
    };

    let mut segments: Vec<String> = units
        .chunks(group_size)
        .map(|group| group.join(joiner))
        .collect();
    if segments.is_empty() {
        segments.push(text.trim().to_string());
    }
    Ok(segments)
}

/// Rough spoken duration in seconds, ignoring `[bracketed]` stage
/// directions.
pub fn estimate_spoken_time(text: &str) -> f32 {
    let words = strip_stage_directions(text).split_whitespace().count();
    words as f32 / SPOKEN_WPM * 60.0
}

/// Drop non-nested `[...]` spans; an unclosed bracket is kept as text.
fn strip_stage_directions(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('[') {
        match rest[open..].find(']') {
            Some(close) => {
                out.push_str(&rest[..open]);
                rest = &rest[open + close + 1..];
            }
            None => break,
        }
    }
    out.push_str(rest);
    out
}

/// Split into trimmed sentence-ish units, keeping terminal punctuation.
///
/// A sentence ends after `.`, `!`, `?`, or `…` (plus any closing quotes)
/// followed by whitespace, or at a newline.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\n' {
            flush(&mut sentences, &mut current);
            continue;
        }
        current.push(c);
        if matches!(c, '.' | '!' | '?' | '…') {
            // Pull trailing quotes/brackets into the same sentence.
            while let Some(&next) = chars.peek() {
                if !matches!(next, '"' | '\'' | ')' | ']' | '.' | '!' | '?') {
                    break;
                }
                current.push(next);
                chars.next();
            }
            if matches!(chars.peek(), Some(c) if c.is_whitespace()) || chars.peek().is_none() {
                flush(&mut sentences, &mut current);
            }
        }
    }
    flush(&mut sentences, &mut current);
    sentences
}

fn flush(sentences: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    current.clear();
}

/// Cut one sentence into pieces of at most `max` characters, preferring
/// word boundaries and falling back to raw character runs.
fn clamp_to_max(sentence: &str, max: usize) -> Vec<String> {
    if sentence.chars().count() <= max {
        return vec![sentence.to_string()];
    }
    let mut pieces = Vec::new();
    let mut current = String::new();
    for word in sentence.split_whitespace() {
        let word_len = word.chars().count();
        let current_len = current.chars().count();
        if !current.is_empty() && current_len + 1 + word_len > max {
            pieces.push(std::mem::take(&mut current));
        }
        if word_len > max {
            // A single run longer than max: cut at character boundaries.
            let chars: Vec<char> = word.chars().collect();
            for chunk in chars.chunks(max) {
                pieces.push(chunk.iter().collect());
            }
            continue;
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}
