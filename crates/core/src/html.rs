//! Minimal HTML helpers shared by the report renderers.

/// Escape text for safe inclusion in HTML element content or attributes.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render a `<table>` with a header row and pre-rendered body cells.
///
/// Each row is a list of `(class, text)` cells; `text` is escaped here and
/// an empty class omits the attribute.
pub fn table(headers: &[&str], rows: &[Vec<(&str, String)>]) -> String {
    let mut html = String::from("<table>\n<thead>\n<tr>\n");
    for h in headers {
        html.push_str(&format!("<th>{}</th>\n", escape(h)));
    }
    html.push_str("</tr>\n</thead>\n<tbody>\n");
    for row in rows {
        html.push_str("<tr>\n");
        for (class, text) in row {
            if class.is_empty() {
                html.push_str(&format!("<td>{}</td>\n", escape(text)));
            } else {
                html.push_str(&format!(
                    "<td class=\"{}\">{}</td>\n",
                    escape(class),
                    escape(text)
                ));
            }
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</tbody>\n</table>\n");
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_special_characters() {
        assert_eq!(escape("<a href=\"x\">&'"), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }

    #[test]
    fn escape_plain_text_unchanged() {
        assert_eq!(escape("rocBLAS 1.2"), "rocBLAS 1.2");
    }

    #[test]
    fn table_renders_classes_and_escapes() {
        let html = table(
            &["Name", "Total"],
            &[vec![("", "a<b".to_string()), ("total-col", "1.00".to_string())]],
        );
        assert!(html.contains("<th>Name</th>"));
        assert!(html.contains("<td>a&lt;b</td>"));
        assert!(html.contains("<td class=\"total-col\">1.00</td>"));
    }
}
