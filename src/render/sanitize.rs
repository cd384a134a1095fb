//! Reduces arbitrary HTML to the inline subset Telegram accepts.
use once_cell::sync::Lazy;
use regex::Regex;

const ALLOWED: &[&str] = &[
    "b", "strong", "i", "em", "u", "ins", "s", "strike", "del", "a", "pre", "code",
];

/// Elements whose content is never text.
const DROPPED: &[&str] = &["script", "style", "noscript", "template", "head", "title"];

const VOID: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?s)<!--.*?(?:-->|\z)",
        r"|<![^>]*>",
        r"|<\?[^>]*>",
        r#"|<(/?)([A-Za-z][A-Za-z0-9-]*)((?:\s+[^\s"'>/=]+(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'=<>`]+))?)*)\s*(/?)>"#,
    ))
    .expect("valid token regex")
});

static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([^\s"'>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .expect("valid attribute regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Text(String),
    Element {
        name: String,
        attrs: Vec<(String, String)>,
        children: Vec<Node>,
    },
}

fn parse_attrs(raw: &str) -> Vec<(String, String)> {
    ATTR_RE
        .captures_iter(raw)
        .map(|c| {
            let value = c
                .get(2)
                .or_else(|| c.get(3))
                .or_else(|| c.get(4))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            (c[1].to_ascii_lowercase(), value)
        })
        .collect()
}

struct Open {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Node>,
}

fn close_top(stack: &mut Vec<Open>) {
    if stack.len() < 2 {
        return;
    }
    if let Some(open) = stack.pop() {
        let element = Node::Element {
            name: open.name,
            attrs: open.attrs,
            children: open.children,
        };
        if let Some(parent) = stack.last_mut() {
            parent.children.push(element);
        }
    }
}

/// Tolerant parse: stray closing tags are ignored, unclosed elements are
/// closed at the end of input.
fn parse(html: &str) -> Vec<Node> {
    let mut stack = vec![Open {
        name: String::new(),
        attrs: Vec::new(),
        children: Vec::new(),
    }];
    let mut last = 0;
    for caps in TOKEN_RE.captures_iter(html) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() > last {
            push_text(&mut stack, &html[last..whole.start()]);
        }
        last = whole.end();
        let Some(name) = caps.get(2) else {
            // comment, doctype or processing instruction
            continue;
        };
        let name = name.as_str().to_ascii_lowercase();
        let closing = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
        if closing {
            if let Some(pos) = stack.iter().skip(1).rposition(|o| o.name == name) {
                while stack.len() > pos + 1 {
                    close_top(&mut stack);
                }
            }
            continue;
        }
        let self_closing = caps.get(4).is_some_and(|m| !m.as_str().is_empty());
        let attrs = caps.get(3).map(|m| parse_attrs(m.as_str())).unwrap_or_default();
        stack.push(Open {
            name: name.clone(),
            attrs,
            children: Vec::new(),
        });
        if self_closing || VOID.contains(&name.as_str()) {
            close_top(&mut stack);
        }
    }
    if last < html.len() {
        push_text(&mut stack, &html[last..]);
    }
    while stack.len() > 1 {
        close_top(&mut stack);
    }
    stack.pop().map(|root| root.children).unwrap_or_default()
}

fn push_text(stack: &mut [Open], text: &str) {
    if let Some(top) = stack.last_mut() {
        match top.children.last_mut() {
            Some(Node::Text(prev)) => prev.push_str(text),
            _ => top.children.push(Node::Text(text.to_string())),
        }
    }
}

fn attr<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

fn escape_text(s: &str) -> String {
    s.replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;")
}

fn render_nodes(nodes: &[Node], out: &mut String) {
    for node in nodes {
        render_node(node, out);
    }
}

fn render_node(node: &Node, out: &mut String) {
    let (name, attrs, children) = match node {
        Node::Text(text) => {
            out.push_str(&escape_text(text));
            return;
        }
        Node::Element {
            name,
            attrs,
            children,
        } => (name.as_str(), attrs, children),
    };
    if ALLOWED.contains(&name) {
        out.push('<');
        out.push_str(name);
        if name == "a" {
            if let Some(href) = attr(attrs, "href") {
                out.push_str(" href=\"");
                out.push_str(&escape_attr(href));
                out.push('"');
            }
        }
        out.push('>');
        render_nodes(children, out);
        out.push_str("</");
        out.push_str(name);
        out.push('>');
        return;
    }
    match name {
        "img" | "video" => {
            let fallback = if name == "img" { "[图片]" } else { "[视频]" };
            let caption = attr(attrs, "alt")
                .map(str::trim)
                .filter(|alt| !alt.is_empty())
                .map(escape_text)
                .unwrap_or_else(|| fallback.to_string());
            out.push_str(&caption);
        }
        "br" => out.push('\n'),
        _ if DROPPED.contains(&name) => {}
        _ => {
            render_nodes(children, out);
            out.push('\n');
        }
    }
}

/// Filters `html` against the inline allow-list. Never fails; input that
/// yields nothing renders as an empty string.
pub fn sanitize(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }
    let mut out = String::with_capacity(html.len());
    render_nodes(&parse(html), &mut out);
    out
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Element { name, children, .. } if !DROPPED.contains(&name.as_str()) => {
                if name == "br" {
                    out.push('\n');
                }
                collect_text(children, out);
            }
            Node::Element { .. } => {}
        }
    }
}

fn unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Visible text of already sanitized markup, with entities decoded.
pub fn plain_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    collect_text(&parse(html), &mut out);
    unescape(out.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_allowed_tags_and_drops_script() {
        let out = sanitize("<script>x</script><b>ok</b>");
        assert_eq!(out, "<b>ok</b>");
    }

    #[test]
    fn media_become_captions() {
        assert_eq!(sanitize(r#"a<img src="x.jpg">b"#), "a[图片]b");
        assert_eq!(sanitize(r#"<img src="x.jpg" alt="猫"/>"#), "猫");
        assert_eq!(sanitize(r#"<video src="v.mp4"><source src="v.mp4"></video>"#), "[视频]");
    }

    #[test]
    fn unwraps_blocks_with_newline() {
        assert_eq!(sanitize("<p>one</p><p>two<br>three</p>"), "one\ntwo\nthree\n");
        assert_eq!(sanitize(r#"<div class="x"><span>hi</span></div>"#), "hi\n\n");
    }

    #[test]
    fn anchor_keeps_only_href() {
        assert_eq!(
            sanitize(r#"<a href="https://x.y/?a=1&amp;b=2" target="_blank" onclick="evil()">l</a>"#),
            r#"<a href="https://x.y/?a=1&amp;b=2">l</a>"#
        );
        assert_eq!(sanitize(r#"<B CLASS="z">up</B>"#), "<b>up</b>");
    }

    #[test]
    fn tolerates_broken_markup() {
        assert_eq!(sanitize("<b>open"), "<b>open</b>");
        assert_eq!(sanitize("stray</i> text"), "stray text");
        assert_eq!(sanitize("<b><i>x</b>y"), "<b><i>x</i></b>y");
        assert_eq!(sanitize("a < b and c > d"), "a &lt; b and c &gt; d");
        assert_eq!(sanitize("<!-- hidden -->shown"), "shown");
        assert_eq!(sanitize(""), "");
        assert_eq!(sanitize("<script>"), "");
    }

    #[test]
    fn removed_tokens_do_not_splice_tags() {
        assert_eq!(sanitize("<<!-- c -->b>x"), "&lt;b&gt;x");
        assert_eq!(sanitize("1 <<!-- -->/b> 2"), "1 &lt;/b&gt; 2");
        assert_eq!(sanitize("&lt;b&gt;x"), "&lt;b&gt;x");
    }

    #[test]
    fn plain_text_strips_tags_and_entities() {
        assert_eq!(plain_text("<b>a &lt; b</b>\n<a href=\"x\">link</a> "), "a < b\nlink");
        assert_eq!(plain_text(&sanitize("<p>x &amp; y</p>")), "x & y");
        assert_eq!(plain_text(""), "");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let inputs = [
            "<script>x</script><b>ok</b>",
            r#"<p>Hello <strong>world</strong><img alt="<b>pic</b>"></p><br/>"#,
            r#"<a href='say "hi"'>q</a><pre><code class="rust">fn</code></pre>"#,
            "<ul><li>1</li><li>2</li></ul> tail <u>open",
            "plain &amp; text < with > symbols",
            "<b><i>x</b>y</i>",
            "<<!-- c -->b>x",
            "<<!DOCTYPE html>i>y</i>",
            "<<?php ?>a href=x>z",
            "a &lt;b&gt; already escaped",
        ];
        for input in inputs {
            let once = sanitize(input);
            assert_eq!(sanitize(&once), once, "input: {}", input);
        }
    }
}
