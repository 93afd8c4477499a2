//! Format detection and splitting of submitted messages into queue items.
//!
//! Pure text functions with no I/O. `plan_batch` is the entry point the
//! submission handler uses; the rest are exposed for tests and `/help`.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::queue::model::{FormatTag, NewItem};

static BULLET_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*[-•*][ \t]+\S").expect("valid regex"));

static AND_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\band\b").expect("valid regex"));

static SENTENCE_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.\s+[A-Z]").expect("valid regex"));

static WILL_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bwill\b").expect("valid regex"));

static SEQUENCING_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(then|after that|next|finally|lastly|first|second|third)\b")
        .expect("valid regex")
});

const BULLET_MARKERS: [char; 3] = ['-', '•', '*'];

/// Classify a message's structure.
pub fn detect(text: &str) -> FormatTag {
    if BULLET_LINE.is_match(text) {
        return FormatTag::Bullet;
    }
    if SENTENCE_BOUNDARY.is_match(text) && WILL_WORD.is_match(text) {
        return FormatTag::NarrativeMulti;
    }
    if AND_WORD.is_match(text) {
        return FormatTag::NarrativeMulti;
    }
    FormatTag::Single
}

/// Break `text` into item strings according to `tag`.
///
/// Never returns an empty vec for text with non-whitespace content: when the
/// format-specific split finds nothing, the trimmed text is the only item.
pub fn split(text: &str, tag: FormatTag) -> Vec<String> {
    let items = match tag {
        FormatTag::Bullet => split_bullets(text),
        FormatTag::NarrativeMulti if AND_WORD.is_match(text) => split_on_and(text),
        FormatTag::NarrativeMulti => split_sentences(text),
        FormatTag::Single => Vec::new(),
    };

    if items.is_empty() {
        let whole = text.trim();
        if whole.is_empty() {
            return Vec::new();
        }
        return vec![whole.to_string()];
    }
    items
}

/// Heuristic: does this message probably describe several tasks?
///
/// Same structural checks as [`detect`], plus two or more distinct
/// sequencing words ("first", "then", "finally", ...). Advisory only.
pub fn looks_like_batch(text: &str) -> bool {
    if detect(text) != FormatTag::Single {
        return true;
    }

    let distinct: HashSet<String> = SEQUENCING_WORD
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect();
    distinct.len() >= 2
}

/// Detect, split and fall back to a single item, ready for enqueueing.
///
/// A multi-item format that splits into one piece becomes a `Single` item.
/// Repeated item texts are collapsed to their first occurrence since item
/// text is unique within a batch.
pub fn plan_batch(text: &str) -> Vec<NewItem> {
    let tag = detect(text);
    let items = split(text, tag);

    let tag = if items.len() <= 1 { FormatTag::Single } else { tag };

    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .map(|item| NewItem::new(item, tag))
        .collect()
}

fn split_bullets(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            let rest = line.trim_start_matches([' ', '\t']);
            let mut chars = rest.chars();
            let marker = chars.next()?;
            if !BULLET_MARKERS.contains(&marker) {
                return None;
            }
            let body = chars.as_str();
            if !body.starts_with([' ', '\t']) {
                return None;
            }
            let body = body.trim();
            (!body.is_empty()).then(|| body.to_string())
        })
        .collect()
}

fn split_on_and(text: &str) -> Vec<String> {
    AND_WORD
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for m in SENTENCE_BOUNDARY.find_iter(text) {
        // Keep the period; the next sentence starts at the capital letter.
        let end = m.start() + 1;
        push_trimmed(&mut sentences, &text[start..end]);
        start = m.end() - 1;
    }
    push_trimmed(&mut sentences, &text[start..]);

    sentences
}

fn push_trimmed(out: &mut Vec<String>, segment: &str) {
    let segment = segment.trim();
    if !segment.is_empty() {
        out.push(segment.to_string());
    }
}
