/// Characters per token for the budget heuristic.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token count of `text` as `ceil(chars / 4)`.
///
/// This is a budgeting heuristic, not a tokenizer. Length is counted in
/// `char`s so multi-byte text is not over-charged.
pub fn estimate_tokens(text: &str) -> u32 {
    text.chars().count().div_ceil(CHARS_PER_TOKEN) as u32
}

/// The longest prefix of `text` holding at most `max_chars` characters.
pub fn prefix_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((boundary, _)) => &text[..boundary],
        None => text,
    }
}
