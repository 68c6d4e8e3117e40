//! Markup serialization of selected nodes
//!
//! Two renderers: the library serializer (`scraper`/html5ever) and a raw
//! writer that emits the tree as parsed. Both escape text and attribute
//! values, except inside raw-text elements like `script` and `style`.

use std::fmt::Write;

use ego_tree::NodeRef;
use scraper::{ElementRef, Html, Node};

use crate::xpath::DomNode;

/// Elements that never carry an end tag
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Serializer {
    /// Tags, attributes and text written back as parsed
    Raw,
    /// html5ever serializer with entity escaping
    Library,
}

impl Serializer {
    pub fn for_preserve_attr(preserve_attr: bool) -> Self {
        if preserve_attr {
            Serializer::Library
        } else {
            Serializer::Raw
        }
    }
}

/// Render `node` of `html` as markup. Attribute items render to their value.
pub fn render(html: &Html, node: DomNode, serializer: Serializer) -> String {
    let id = match node {
        DomNode::Node(id) => id,
        DomNode::Attr(id, index) => {
            return html
                .tree
                .get(id)
                .and_then(|n| n.value().as_element()?.attrs().nth(index))
                .map(|(_, value)| value.to_string())
                .unwrap_or_default();
        }
    };
    let Some(node_ref) = html.tree.get(id) else {
        return String::new();
    };

    match serializer {
        Serializer::Library => match ElementRef::wrap(node_ref) {
            Some(element) => element.html(),
            None => {
                let mut out = String::new();
                write_library_fallback(node_ref, &mut out);
                out
            }
        },
        Serializer::Raw => {
            let mut out = String::new();
            write_raw(node_ref, &mut out);
            out
        }
    }
}

/// Non-element nodes: children go through the library serializer one by one
fn write_library_fallback(node: NodeRef<Node>, out: &mut String) {
    match node.value() {
        Node::Text(text) => out.push_str(&escape_text(text)),
        Node::Comment(comment) => {
            let _ = write!(out, "<!--{}-->", &**comment);
        }
        Node::Document | Node::Fragment => {
            for child in node.children() {
                match ElementRef::wrap(child) {
                    Some(element) => out.push_str(&element.html()),
                    None => write_library_fallback(child, out),
                }
            }
        }
        _ => {}
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

/// Elements whose text content is written without escaping
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "xmp", "iframe", "noembed", "noframes", "plaintext",
];

fn write_raw(node: NodeRef<Node>, out: &mut String) {
    match node.value() {
        Node::Element(element) => {
            let name = element.name();
            out.push('<');
            out.push_str(name);
            for (attr, value) in element.attrs() {
                let _ = write!(out, " {}=\"{}\"", attr, escape_attr(value));
            }
            out.push('>');
            if VOID_ELEMENTS.contains(&name) {
                return;
            }
            for child in node.children() {
                write_raw(child, out);
            }
            let _ = write!(out, "</{}>", name);
        }
        Node::Text(text) => {
            let raw_text = node
                .parent()
                .and_then(|parent| parent.value().as_element())
                .is_some_and(|parent| RAW_TEXT_ELEMENTS.contains(&parent.name()));
            if raw_text {
                out.push_str(text);
            } else {
                out.push_str(&escape_text(text));
            }
        }
        Node::Comment(comment) => {
            let _ = write!(out, "<!--{}-->", &**comment);
        }
        Node::Document | Node::Fragment => {
            for child in node.children() {
                write_raw(child, out);
            }
        }
        _ => {}
    }
}
