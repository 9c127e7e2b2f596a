//! Report text normalization applied before embedding.

/// Render width for the HTML pass. Wide enough that wrapping never splits
/// tokens that the whitespace collapse would then rejoin incorrectly.
const RENDER_WIDTH: usize = 4096;

/// Normalize raw report text: decode HTML entities, strip any markup,
/// and collapse whitespace runs to single spaces.
pub fn normalize_text(raw: &str) -> String {
    if raw.trim().is_empty() {
        return String::new();
    }

    let decoded =
        html2text::from_read(raw.as_bytes(), RENDER_WIDTH).unwrap_or_else(|_| raw.to_string());

    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_whitespace_only() {
        assert_eq!(normalize_text(""), "");
        assert_eq!(normalize_text("   "), "");
        assert_eq!(normalize_text("\t\n"), "");
    }

    #[test]
    fn simple_text_unchanged() {
        assert_eq!(normalize_text("Hello world"), "Hello world");
    }

    #[test]
    fn strips_leading_and_trailing_whitespace() {
        assert_eq!(normalize_text("  Hello world  "), "Hello world");
        assert_eq!(normalize_text("\tHello world\n"), "Hello world");
    }

    #[test]
    fn collapses_whitespace_runs() {
        assert_eq!(normalize_text("Hello    world"), "Hello world");
        assert_eq!(normalize_text("Hello\nworld"), "Hello world");
        assert_eq!(normalize_text("Hello\n\n\nworld"), "Hello world");
        assert_eq!(
            normalize_text("Text\t\n  with   \nmixed\r\nspaces"),
            "Text with mixed spaces"
        );
    }

    #[test]
    fn decodes_html_entities() {
        assert_eq!(normalize_text("&lt;div&gt;"), "<div>");
        assert_eq!(normalize_text("&amp;"), "&");
        assert_eq!(normalize_text("&quot;Hello&quot;"), "\"Hello\"");
        assert_eq!(normalize_text("&#39;apostrophe&#39;"), "'apostrophe'");
    }

    #[test]
    fn entities_and_whitespace_together() {
        assert_eq!(normalize_text("  &lt;div&gt;  "), "<div>");
        assert_eq!(normalize_text("&amp;\n&amp;"), "& &");
    }

    #[test]
    fn realistic_report_comment() {
        let input = "
        The page doesn't load properly.

        Steps to reproduce:
        1. Go to the site
        2. Click the button

        Expected: Page loads
        Actual:   &lt;error&gt; shown
        ";
        assert_eq!(
            normalize_text(input),
            "The page doesn't load properly. Steps to reproduce: 1. Go to the site \
             2. Click the button Expected: Page loads Actual: <error> shown"
        );
    }
}
