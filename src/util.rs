pub(crate) fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// True when every char is a letter, digit or underscore.
pub(crate) fn is_word_chars(s: &str) -> bool {
    s.chars().all(|c| c.is_alphanumeric() || c == '_')
}

/// Flattens a value for use in a mail header line.
pub(crate) fn header_safe(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

pub(crate) fn plural(word: &str, count: usize) -> String {
    if count == 1 {
        return word.to_string();
    }
    if word.ends_with('s') || word.ends_with('x') {
        format!("{word}es")
    } else {
        format!("{word}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            html_escape(r#"<a href="x">&'"#),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#39;"
        );
    }

    #[test]
    fn word_chars() {
        assert!(is_word_chars("abc_123"));
        assert!(!is_word_chars("abc-123"));
        assert!(!is_word_chars("a b"));
    }

    #[test]
    fn header_values_lose_line_breaks() {
        assert_eq!(header_safe("Bob\r\nBcc: x@y"), "Bob  Bcc: x@y");
    }

    #[test]
    fn plurals() {
        assert_eq!(plural("file", 1), "file");
        assert_eq!(plural("file", 2), "files");
        assert_eq!(plural("box", 0), "boxes");
    }
}
