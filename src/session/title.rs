/// Maximum number of characters taken from the body for a derived title.
pub const TITLE_MAX_CHARS: usize = 30;

/// Derives a note title from its body.
///
/// Bodies of at most [`TITLE_MAX_CHARS`] characters are returned verbatim.
/// Longer bodies are cut to that many characters and then back to the last
/// space inside the prefix, so the title does not end mid-word. A prefix
/// whose only space is its first character, or that has none, is kept as is.
pub fn derive_title(body: &str) -> String {
    let cut = match body.char_indices().nth(TITLE_MAX_CHARS) {
        Some((byte_idx, _)) => byte_idx,
        None => return body.to_owned(),
    };
    let prefix = &body[..cut];
    match prefix.rfind(' ') {
        Some(space) if space > 0 => prefix[..space].to_owned(),
        _ => prefix.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_bodies_are_used_verbatim() {
        assert_eq!(derive_title(""), "");
        assert_eq!(derive_title("Buy milk and eggs"), "Buy milk and eggs");
        let exact = "a".repeat(TITLE_MAX_CHARS);
        assert_eq!(derive_title(&exact), exact);
        let spaced = "twenty nine chars and a space";
        assert_eq!(derive_title(spaced), spaced);
    }

    #[test]
    fn long_bodies_break_at_last_space_in_prefix() {
        // 35 chars, single space at index 20.
        let body = format!("{} {}", "a".repeat(20), "b".repeat(14));
        assert_eq!(body.chars().count(), 35);
        assert_eq!(derive_title(&body), "a".repeat(20));
    }

    #[test]
    fn long_bodies_without_space_keep_full_prefix() {
        let body = "x".repeat(45);
        assert_eq!(derive_title(&body), "x".repeat(TITLE_MAX_CHARS));
    }

    #[test]
    fn space_beyond_prefix_is_ignored() {
        let body = format!("{} tail", "y".repeat(32));
        assert_eq!(derive_title(&body), "y".repeat(TITLE_MAX_CHARS));
    }

    #[test]
    fn leading_space_is_not_a_break_point() {
        let body = format!(" {}", "z".repeat(40));
        let title = derive_title(&body);
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS);
        assert!(title.starts_with(' '));
    }

    #[test]
    fn counts_characters_not_bytes() {
        let body = "é".repeat(31);
        assert_eq!(derive_title(&body), "é".repeat(TITLE_MAX_CHARS));
        let short = "日本語のメモ";
        assert_eq!(derive_title(short), short);
    }

    #[test]
    fn break_uses_last_of_several_spaces() {
        let body = "The quick brown fox jumps over the lazy dog";
        assert_eq!(derive_title(body), "The quick brown fox jumps");
    }
}
