//! HTML serialization for the text tree.

use super::{Element, Node};

/// Escape text content.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

fn escape_attr(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

pub(super) fn write_element(element: &Element, out: &mut String) {
    out.push('<');
    out.push_str(&element.tag);
    for (name, value) in &element.attrs {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&escape_attr(value));
        out.push('"');
    }
    out.push('>');
    for child in &element.children {
        match child {
            Node::Text(t) if matches!(element.tag.as_str(), "style" | "script") => {
                out.push_str(t);
            }
            Node::Text(t) => out.push_str(&escape_text(t)),
            Node::Element(e) => write_element(e, out),
        }
    }
    out.push_str("</");
    out.push_str(&element.tag);
    out.push('>');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escapes_text_and_attributes() {
        let el = Element::new("span")
            .with_attr("data-text", "say \"hi\" & <bye>")
            .with_text("1 < 2");
        assert_eq!(
            el.to_html(),
            "<span data-text=\"say &quot;hi&quot; &amp; &lt;bye&gt;\">1 &lt; 2</span>"
        );
    }

    #[test]
    fn test_style_body_is_raw() {
        let el = Element::new("style").with_text("a>b{color:red}");
        assert_eq!(el.to_html(), "<style>a>b{color:red}</style>");
    }

    #[test]
    fn test_nested_children() {
        let el = Element::new("div")
            .with_child(Element::new("b").with_text("x"))
            .with_text("y");
        assert_eq!(el.to_html(), "<div><b>x</b>y</div>");
    }
}
