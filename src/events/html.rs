//! HTML fragment → plain text for stored and relayed bodies.

use scraper::Html;

/// Keep only the text nodes of an HTML fragment.
///
/// Tags, attributes and comments are dropped; text on either side of a removed
/// tag is concatenated as-is, so whitespace is neither added nor trimmed.
/// The parser decodes every HTML5 character reference, and `&nbsp;` becomes a
/// plain space. Escaped markup such as `&lt;b&gt;` stays literal text.
pub fn strip_html(html: &str) -> String {
    if !html.contains('<') && !html.contains('&') {
        return html.to_string();
    }
    Html::parse_fragment(html)
        .root_element()
        .text()
        .collect::<String>()
        .replace('\u{a0}', " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_nested_tags() {
        assert_eq!(strip_html("<p>Hi <b>there</b></p>"), "Hi there");
    }

    #[test]
    fn drops_attributes_and_self_closing_tags() {
        assert_eq!(
            strip_html(r#"<div class="x">Hola<br/> <a href="https://x.io?a=1&b=2">@profesorf</a></div>"#),
            "Hola @profesorf"
        );
    }

    #[test]
    fn keeps_plain_text_untouched() {
        assert_eq!(strip_html("Hello @profesorf, please check"), "Hello @profesorf, please check");
        assert_eq!(strip_html("a < b and c > d"), "a < b and c > d");
    }

    #[test]
    fn removes_comments() {
        assert_eq!(strip_html("uno<!-- <b>oculto</b> -->dos"), "unodos");
    }

    #[test]
    fn decodes_entities_after_removing_markup() {
        assert_eq!(strip_html("<p>&lt;b&gt; &amp; &#64;profesorf&#x21;</p>"), "<b> & @profesorf!");
        assert_eq!(strip_html("caf&eacute;"), "café");
        assert_eq!(strip_html("a&nbsp;b"), "a b");
    }

    #[test]
    fn decodes_spanish_named_entities() {
        assert_eq!(
            strip_html("<p>Revisi&oacute;n para el se&ntilde;or @profesorf &mdash; caf&eacute;</p>"),
            "Revisión para el señor @profesorf \u{2014} café"
        );
    }

    #[test]
    fn empty_input_is_empty() {
        assert_eq!(strip_html(""), "");
        assert_eq!(strip_html("<p></p>"), "");
    }
}
