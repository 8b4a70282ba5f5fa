//! Word-based truncation for error text

/// Appended when words were dropped
pub const ELLIPSIS: &str = "...";

/// Keep the first `max_words` whitespace-separated words of `text`
///
/// Words are re-joined with single spaces. [`ELLIPSIS`] is appended, after a
/// space, only when something was cut.
pub fn truncate_words(text: &str, max_words: usize) -> String {
    let mut words = text.split_whitespace();
    let kept: Vec<&str> = words.by_ref().take(max_words).collect();
    let mut out = kept.join(" ");

    if words.next().is_some() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(ELLIPSIS);
    }

    out
}
