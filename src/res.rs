use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use pulldown_cmark::{CowStr, Event, Parser, Tag};

use crate::AppResult;

#[macro_export]
macro_rules! include_res {
    (bytes, $p:expr) => {
        include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/res", $p))
    };
    (str, $p:expr) => {
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/res", $p))
    };
}

pub fn sorry(what: &str) -> AppResult<Response> {
    Ok((
        StatusCode::NOT_FOUND,
        Html(include_res!(str, "/pages/sorry.html").replace("{what}", &escape(what))),
    )
        .into_response())
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Fills `{key}` placeholders in a single pass. Substituted values are never
/// scanned again, so a value containing `{other}` stays literal. Unknown
/// placeholders are left as they are.
pub fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let found = after.find('}').and_then(|end| {
            let key = &after[..end];
            values.iter().find(|(k, _)| *k == key).map(|(_, value)| (*value, end))
        });
        match found {
            Some((value, end)) => {
                out.push_str(value);
                rest = &after[end + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Relative references plus http(s) and mailto.
fn is_safe_url(dest: &str) -> bool {
    // browsers ignore whitespace and control characters inside a scheme
    let dest: String =
        dest.chars().filter(|c| !c.is_ascii_whitespace() && !c.is_control()).collect();
    match dest.find([':', '/', '?', '#']) {
        Some(end) if dest[end..].starts_with(':') => {
            matches!(dest[..end].to_ascii_lowercase().as_str(), "http" | "https" | "mailto")
        }
        _ => true,
    }
}

/// Markdown to HTML with embedded raw HTML dropped and link or image
/// targets outside [`is_safe_url`] replaced by `#`.
pub fn markdown(content: &str) -> String {
    let parser = Parser::new(content).filter_map(|event| match event {
        Event::Html(_) | Event::InlineHtml(_) => None,
        Event::Start(Tag::Link { link_type, dest_url, title, id }) if !is_safe_url(&dest_url) => {
            Some(Event::Start(Tag::Link { link_type, dest_url: CowStr::Borrowed("#"), title, id }))
        }
        Event::Start(Tag::Image { link_type, dest_url, title, id }) if !is_safe_url(&dest_url) => {
            Some(Event::Start(Tag::Image { link_type, dest_url: CowStr::Borrowed("#"), title, id }))
        }
        event => Some(event),
    });
    let mut html = String::new();
    pulldown_cmark::html::push_html(&mut html, parser);
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(escape(r#"<a href="x">&'"#), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }

    #[test]
    fn markdown_drops_raw_html() {
        let html = markdown("**hi** <script>alert(1)</script>");
        assert!(html.contains("<strong>hi</strong>"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn markdown_neutralizes_script_links() {
        let html = markdown("[click](javascript:alert(document.domain))");
        assert_eq!(html, "<p><a href=\"#\">click</a></p>\n");

        for hostile in [
            "[x](JavaScript:alert(1))",
            "<javascript:alert(1)>",
            "![x](data:image/svg+xml,boom)",
            "[x](vbscript:msgbox)",
        ] {
            let html = markdown(hostile).to_lowercase();
            assert!(html.contains(r##"="#""##), "{hostile} -> {html}");
            for scheme in ["javascript:", "data:", "vbscript:"] {
                assert!(!html.contains(&format!("=\"{scheme}")), "{hostile} -> {html}");
            }
        }
    }

    #[test]
    fn markdown_keeps_ordinary_links() {
        assert!(markdown("[a](https://example.org/x)").contains(r#"href="https://example.org/x""#));
        assert!(markdown("[a](mailto:ann@example.org)").contains(r#"href="mailto:ann"#));
        assert!(markdown("[a](/r/1?x=y:z)").contains(r#"href="/r/1?x=y:z""#));
        assert!(markdown("![cat](cat.png)").contains(r#"src="cat.png""#));
    }

    #[test]
    fn fill_does_not_rescan_values() {
        let template = "<a href='{file}'>{content}</a> {unknown} {";
        let html = fill(template, &[("file", "{content}"), ("content", "<p>x</p>")]);
        assert_eq!(html, "<a href='{content}'><p>x</p></a> {unknown} {");
    }
}
