//! XPath queries over parsed HTML
//!
//! A compiled XPath 1.0 subset evaluated against `scraper`'s DOM. Expressions
//! are parsed once into an immutable AST and can be shared freely between
//! threads; every evaluation borrows a [`Document`] for its duration.

mod eval;
mod lexer;
mod parser;

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use ego_tree::{NodeId, NodeRef};
use scraper::{Html, Node};

use crate::error::XPathError;
use eval::{Context, Object};
use parser::Expr;

/// A node reachable by a query: a tree node or one attribute of an element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomNode {
    Node(NodeId),
    /// Owning element and attribute index
    Attr(NodeId, usize),
}

/// Read-only view of a parsed HTML document used while evaluating queries
pub struct Document<'a> {
    html: &'a Html,
    order: OnceLock<HashMap<NodeId, usize>>,
}

impl<'a> Document<'a> {
    pub fn new(html: &'a Html) -> Self {
        Self {
            html,
            order: OnceLock::new(),
        }
    }

    pub fn html(&self) -> &'a Html {
        self.html
    }

    /// The document node
    pub fn root(&self) -> DomNode {
        DomNode::Node(self.html.tree.root().id())
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<NodeRef<'a, Node>> {
        self.html.tree.get(id)
    }

    /// Name and value of the `index`-th attribute of element `id`
    pub(crate) fn attribute(&self, id: NodeId, index: usize) -> Option<(&'a str, &'a str)> {
        self.get(id)?.value().as_element()?.attrs().nth(index)
    }

    /// Position of `id` in document order; detached nodes sort last
    fn position(&self, id: NodeId) -> usize {
        let order = self.order.get_or_init(|| {
            self.html
                .tree
                .root()
                .descendants()
                .enumerate()
                .map(|(i, node)| (node.id(), i))
                .collect()
        });
        order.get(&id).copied().unwrap_or(usize::MAX)
    }

    /// Attributes sort directly after their owning element
    pub(crate) fn order_key(&self, node: DomNode) -> (usize, usize) {
        match node {
            DomNode::Node(id) => (self.position(id), 0),
            DomNode::Attr(id, index) => (self.position(id), index + 1),
        }
    }

    /// Sort into document order and drop duplicates
    pub(crate) fn sort_nodes(&self, nodes: &mut Vec<DomNode>) {
        if nodes.len() > 1 {
            nodes.sort_by_key(|n| self.order_key(*n));
            nodes.dedup();
        }
    }

    /// XPath string-value: concatenated descendant text for elements and documents
    pub fn string_value(&self, node: DomNode) -> String {
        match node {
            DomNode::Attr(id, index) => self
                .attribute(id, index)
                .map(|(_, value)| value.to_string())
                .unwrap_or_default(),
            DomNode::Node(id) => {
                let Some(node_ref) = self.get(id) else {
                    return String::new();
                };
                match node_ref.value() {
                    Node::Text(text) => {
                        let text: &str = text;
                        text.to_string()
                    }
                    Node::Comment(comment) => {
                        let comment: &str = comment;
                        comment.to_string()
                    }
                    Node::Element(_) | Node::Document | Node::Fragment => {
                        let mut out = String::new();
                        for descendant in node_ref.descendants() {
                            if let Node::Text(text) = descendant.value() {
                                out.push_str(text);
                            }
                        }
                        out
                    }
                    _ => String::new(),
                }
            }
        }
    }

    /// Element or attribute name; empty for other nodes
    pub fn name(&self, node: DomNode) -> String {
        match node {
            DomNode::Attr(id, index) => self
                .attribute(id, index)
                .map(|(name, _)| name.to_string())
                .unwrap_or_default(),
            DomNode::Node(id) => self
                .get(id)
                .and_then(|n| n.value().as_element().map(|e| e.name().to_string()))
                .unwrap_or_default(),
        }
    }
}

/// What a query produced: nodes in document order, or a computed scalar
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Nodes(Vec<DomNode>),
    Scalar(String),
}

/// Compiled XPath expression
#[derive(Debug, Clone)]
pub struct XPath {
    source: String,
    expr: Expr,
}

impl XPath {
    pub fn compile(source: &str) -> Result<Self, XPathError> {
        let expr = parser::parse(source)?;
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    fn run(&self, doc: &Document, node: DomNode) -> Object {
        eval::evaluate(doc, &self.expr, &Context::single(node))
    }

    pub fn evaluate(&self, doc: &Document, node: DomNode) -> Selection {
        match self.run(doc, node) {
            Object::Nodes(nodes) => Selection::Nodes(nodes),
            other => Selection::Scalar(other.into_string(doc)),
        }
    }

    /// Selected nodes in document order; scalar results select nothing
    pub fn select(&self, doc: &Document, node: DomNode) -> Vec<DomNode> {
        match self.run(doc, node) {
            Object::Nodes(nodes) => nodes,
            _ => Vec::new(),
        }
    }

    pub fn select_one(&self, doc: &Document, node: DomNode) -> Option<DomNode> {
        self.select(doc, node).into_iter().next()
    }

    /// True when the query selects at least one node (or a scalar result is truthy)
    pub fn matches(&self, doc: &Document, node: DomNode) -> bool {
        self.run(doc, node).into_boolean()
    }
}

impl fmt::Display for XPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
