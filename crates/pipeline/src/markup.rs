//! Markup for placeholders and inline error markers.
//!
//! Identity lives in attributes on the placeholder element itself, so it
//! survives the surrounding tree being cloned or regenerated by something
//! that knows nothing about render tasks.

/// Attribute carrying the task id.
pub const RENDER_ID_ATTR: &str = "data-render-id";
/// Attribute carrying the content digest the placeholder stands for.
pub const SOURCE_HASH_ATTR: &str = "data-source-hash";
/// Attribute carrying the renderer kind (`mermaid`, `math`, ...).
pub const RENDER_KIND_ATTR: &str = "data-render-kind";

/// Element inserted into the document while a task is pending.
pub fn placeholder_markup(id: &str, source_hash: &str, kind: &str) -> String {
    format!(
        concat!(
            r#"<div class="folio-render-placeholder" "#,
            r#"data-render-id="{}" data-source-hash="{}" data-render-kind="{}"></div>"#,
        ),
        escape_attribute(id),
        escape_attribute(source_hash),
        escape_attribute(kind),
    )
}

/// Inline marker shown in place of an artifact that failed to render.
pub fn error_markup(label: &str, message: &str, kind: &str) -> String {
    format!(
        r#"<div class="folio-render-error" {RENDER_KIND_ATTR}="{}" role="alert"><strong>{}</strong> {}</div>"#,
        escape_attribute(kind),
        escape_text(label),
        escape_text(message),
    )
}

/// https://html.spec.whatwg.org/multipage/parsing.html#escapingString
pub fn escape_text(value: impl AsRef<str>) -> String {
    value.as_ref().replace('&', "&amp;").replace('\u{a0}', "&nbsp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// https://html.spec.whatwg.org/multipage/parsing.html#escapingString (attribute mode)
pub fn escape_attribute(value: impl AsRef<str>) -> String {
    value.as_ref().replace('&', "&amp;").replace('\u{a0}', "&nbsp;").replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_placeholder_carries_identity() {
        let markup = placeholder_markup("render-1-0", "abc123", "mermaid");
        assert!(markup.contains(r#"data-render-id="render-1-0""#));
        assert!(markup.contains(r#"data-source-hash="abc123""#));
        assert!(markup.contains(r#"data-render-kind="mermaid""#));
    }

    #[rstest]
    #[case("plain", "plain")]
    #[case("a < b && c > d", "a &lt; b &amp;&amp; c &gt; d")]
    #[case(r#"say "hi""#, r#"say "hi""#)]
    fn test_escape_text(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(escape_text(input), expected);
    }

    #[rstest]
    #[case(r#"x" onclick="evil"#, "x&quot; onclick=&quot;evil")]
    #[case("<b>&", "<b>&amp;")]
    fn test_escape_attribute(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(escape_attribute(input), expected);
    }

    #[test]
    fn test_error_markup_escapes_message() {
        let markup = error_markup("Render failed:", "unexpected <EOF>", "mermaid");
        assert!(markup.contains("<strong>Render failed:</strong> unexpected &lt;EOF&gt;"));
        assert!(markup.contains(r#"data-render-kind="mermaid""#));
    }
}
