//! Topic name validation and wake-word stripping.

/// Fallback topic for uploads without a topic and for invalid names.
pub const DEFAULT_TOPIC: &str = "general";

/// Topic names are `[A-Za-z0-9_]+` on the forward path.
pub fn is_valid_topic(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Coerce an invalid topic name to [`DEFAULT_TOPIC`].
pub fn sanitize_topic(name: &str) -> &str {
    if is_valid_topic(name) {
        name
    } else {
        tracing::warn!(topic = name, "invalid topic name, using '{DEFAULT_TOPIC}'");
        DEFAULT_TOPIC
    }
}

/// Strip configured wake-word phrases from the head of a transcription.
///
/// `wake_words` is a comma-separated list; matching is case-insensitive and
/// must end at a word boundary, so `jarvis` never eats the head of
/// `jarvisville`. The phrase and any separator run after it (whitespace and
/// `,.!?;:-`) are removed, repeating until no phrase matches — which makes
/// the operation idempotent. An empty result means the utterance was nothing
/// but wake words; callers suppress the forward in that case.
pub fn strip_wake_words(text: &str, wake_words: &str) -> String {
    let phrases: Vec<&str> = wake_words
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if phrases.is_empty() {
        return text.trim().to_string();
    }

    let mut current = text.trim();
    loop {
        let mut stripped = false;
        for phrase in &phrases {
            if let Some(rest) = strip_leading_phrase(current, phrase) {
                current = rest;
                stripped = true;
                break;
            }
        }
        if !stripped {
            break;
        }
    }
    current.to_string()
}

/// Remove one leading occurrence of `phrase` plus trailing separators,
/// returning the remainder, or `None` when the text does not start with the
/// phrase at a word boundary.
fn strip_leading_phrase<'a>(text: &'a str, phrase: &str) -> Option<&'a str> {
    let head = text.get(..phrase.len())?;
    if !head.eq_ignore_ascii_case(phrase) {
        return None;
    }

    let rest = &text[phrase.len()..];
    // Word boundary: the phrase must not continue into an alphanumeric run.
    if rest.chars().next().is_some_and(|c| c.is_alphanumeric()) {
        return None;
    }

    Some(rest.trim_start_matches(|c: char| c.is_whitespace() || ",.!?;:-".contains(c)))
}
