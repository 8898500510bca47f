//! Minimum input sanitization applied before persistence: escape `<`
//! in user text, strip `"` from URLs.

/// Escape `<` to `&lt;` in message bodies and chat names.
pub fn html_escape(input: &str) -> String {
    input.replace('<', "&lt;")
}

/// Strip `"` from avatar URLs.
pub fn strip_quotes(input: &str) -> String {
    input.replace('"', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_angle_brackets() {
        assert_eq!(html_escape("<script>"), "&lt;script>");
    }

    #[test]
    fn strips_double_quotes_from_urls() {
        assert_eq!(strip_quotes("http://x/\"evil\".png"), "http://x/evil.png");
    }
}
