use scraper::Html;
use std::borrow::Cow;

/// Removes control characters (except newline and tab) and trims the result.
///
/// Feed titles occasionally carry stray `\r`, NUL, or escape bytes from
/// upstream CMS exports; these would otherwise leak into the JSON payload.
pub fn clean_text(s: &str) -> String {
    let cleaned: Cow<'_, str> = if s.chars().any(|c| c.is_control() && c != '\n' && c != '\t') {
        Cow::Owned(
            s.chars()
                .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
                .collect(),
        )
    } else {
        Cow::Borrowed(s)
    };
    cleaned.trim().to_string()
}

/// Reduces an HTML fragment to its text, collapsing runs of whitespace to
/// single spaces.
///
/// Entities are decoded by the HTML parser, so an escaped `&lt;` in body
/// text survives as a literal `<`.
pub fn strip_markup(s: &str) -> String {
    let fragment = Html::parse_fragment(s);
    let mut text = String::with_capacity(s.len());

    for node in fragment.root_element().descendants() {
        if let Some(t) = node.value().as_text() {
            text.push_str(t);
        } else if let Some(element) = node.value().as_element() {
            // Block boundaries would otherwise glue adjacent words together
            if matches!(element.name(), "p" | "br" | "div" | "li" | "tr") {
                text.push(' ');
            }
        }
    }

    clean_text(&text.split_whitespace().collect::<Vec<_>>().join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_strips_control_chars() {
        assert_eq!(clean_text("  Hello\u{0}\r World\u{1b} "), "Hello World");
    }

    #[test]
    fn test_clean_text_keeps_newlines_and_tabs() {
        assert_eq!(clean_text("a\n\tb"), "a\n\tb");
    }

    #[test]
    fn test_strip_markup_removes_tags() {
        assert_eq!(
            strip_markup("<p>Workshop <b>today</b></p><br/>Join us"),
            "Workshop today Join us"
        );
    }

    #[test]
    fn test_strip_markup_decodes_entities() {
        assert_eq!(strip_markup("R&amp;D &lt;3 &quot;data&quot;"), "R&D <3 \"data\"");
    }

    #[test]
    fn test_strip_markup_keeps_escaped_angle_brackets_in_text() {
        assert_eq!(
            strip_markup("Queue wait &lt; 5 minutes for jobs, down from &gt; 1 hour"),
            "Queue wait < 5 minutes for jobs, down from > 1 hour"
        );
    }

    #[test]
    fn test_strip_markup_separates_block_elements() {
        assert_eq!(strip_markup("<ul><li>one</li><li>two</li></ul>"), "one two");
    }

    #[test]
    fn test_strip_markup_plain_text_unchanged() {
        assert_eq!(strip_markup("Just text"), "Just text");
        assert_eq!(strip_markup(""), "");
    }
}
