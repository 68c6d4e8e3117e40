use std::borrow::Cow;

use ego_tree::NodeId;
use scraper::Html;

use crate::error::CompileError;
use crate::source::{Lines, XpathRules};
use crate::xpath::{Document, DomNode, XPath};

/// XPath rules over a matched node
#[derive(Debug, Clone, Default)]
pub struct NodeRules {
    include: Vec<XPath>,
    exclude: Vec<XPath>,
    remove: Vec<XPath>,
}

fn compile_lines(category: &'static str, lines: &Lines) -> Result<Vec<XPath>, CompileError> {
    lines
        .iter()
        .map(|expr| {
            XPath::compile(expr).map_err(|source| CompileError::XPath {
                category,
                expr: expr.to_string(),
                source,
            })
        })
        .collect()
}

impl NodeRules {
    pub fn compile(rules: Option<&XpathRules>) -> Result<Self, CompileError> {
        let Some(rules) = rules else {
            return Ok(Self::default());
        };
        Ok(Self {
            include: compile_lines("Include", &rules.include)?,
            exclude: compile_lines("Exclude", &rules.exclude)?,
            remove: compile_lines("Remove", &rules.remove)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty() && self.remove.is_empty()
    }

    /// Accept when no Include query exists or any selects something from `node`,
    /// and no Exclude query does
    pub fn test(&self, doc: &Document, node: DomNode) -> bool {
        let included =
            self.include.is_empty() || self.include.iter().any(|q| q.matches(doc, node));
        included && !self.exclude.iter().any(|q| q.matches(doc, node))
    }

    /// Tree nodes selected by the Remove queries, evaluated from `node`
    pub fn removals(&self, doc: &Document, node: DomNode) -> Vec<NodeId> {
        let root = doc.html().tree.root().id();
        let mut ids = Vec::new();
        for query in &self.remove {
            for found in query.select(doc, node) {
                // Attributes are not detachable and the document node must stay
                if let DomNode::Node(id) = found {
                    if id != root && !ids.contains(&id) {
                        ids.push(id);
                    }
                }
            }
        }
        ids
    }

    /// Working copy of the document with every removal detached.
    ///
    /// All matches are collected before anything is detached, so one removal
    /// never changes what a later query selects. Node ids stay valid in the
    /// copy. The source document is borrowed untouched when nothing matches.
    pub fn clean<'h>(&self, doc: &Document<'h>, node: DomNode) -> Cow<'h, Html> {
        Self::detach(doc, &self.removals(doc, node))
    }

    /// Working copy of the document with `targets` detached, one clone for
    /// the whole set
    pub fn detach<'h>(doc: &Document<'h>, targets: &[NodeId]) -> Cow<'h, Html> {
        if targets.is_empty() {
            return Cow::Borrowed(doc.html());
        }

        let mut html = doc.html().clone();
        for &id in targets {
            if let Some(mut target) = html.tree.get_mut(id) {
                target.detach();
            }
        }
        Cow::Owned(html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIVS: &str = r#"<html><body>
        <div><h3>First</h3><p>one</p></div>
        <div><h3>Second</h3><p>two</p><span>x</span></div>
        <div><h3>Third</h3></div>
    </body></html>"#;

    fn node_rules(include: &str, exclude: &str, remove: &str) -> NodeRules {
        NodeRules::compile(Some(&XpathRules {
            include: Lines::new(include),
            exclude: Lines::new(exclude),
            remove: Lines::new(remove),
        }))
        .unwrap()
    }

    fn divs(doc: &Document) -> Vec<DomNode> {
        XPath::compile("//div").unwrap().select(doc, doc.root())
    }

    #[test]
    fn test_include_exclude() {
        let html = Html::parse_document(DIVS);
        let doc = Document::new(&html);
        let rules = node_rules("p", "span", "");

        let accepted: Vec<bool> = divs(&doc).into_iter().map(|d| rules.test(&doc, d)).collect();
        assert_eq!(accepted, vec![true, false, false]);
        assert!(NodeRules::default().test(&doc, doc.root()));
    }

    #[test]
    fn test_clean_detaches_in_working_copy() {
        let html = Html::parse_document(DIVS);
        let doc = Document::new(&html);
        let rules = node_rules("", "", ".//p\n.//h3");
        let body = XPath::compile("//body").unwrap().select_one(&doc, doc.root()).unwrap();

        let cleaned = rules.clean(&doc, body);
        assert!(matches!(cleaned, Cow::Owned(_)));
        let cleaned_doc = Document::new(&cleaned);
        let text = cleaned_doc.string_value(body);
        assert!(!text.contains("one"));
        assert!(!text.contains("First"));
        assert!(text.contains('x'));

        // The source document is untouched
        assert!(doc.string_value(body).contains("First"));
    }

    #[test]
    fn test_clean_without_matches_borrows() {
        let html = Html::parse_document(DIVS);
        let doc = Document::new(&html);
        let rules = node_rules("", "", "//table\n//@class");
        assert!(matches!(rules.clean(&doc, doc.root()), Cow::Borrowed(_)));
    }

    #[test]
    fn test_detach_shared_removal_set() {
        let html = Html::parse_document(DIVS);
        let doc = Document::new(&html);
        let rules = node_rules("", "", "//span\n//p");
        let all = divs(&doc);

        let first = rules.removals(&doc, all[0]);
        assert_eq!(first, rules.removals(&doc, all[2]));
        assert_eq!(first.len(), 3);

        let cleaned = NodeRules::detach(&doc, &first);
        let cleaned_doc = Document::new(&cleaned);
        let texts: Vec<String> = all.iter().map(|d| cleaned_doc.string_value(*d)).collect();
        assert_eq!(texts, vec!["First", "Second", "Third"]);
        assert!(matches!(NodeRules::detach(&doc, &[]), Cow::Borrowed(_)));
    }

    #[test]
    fn test_compile_error_names_expression() {
        let err = NodeRules::compile(Some(&XpathRules {
            include: Lines::new("//div[@a"),
            ..Default::default()
        }))
        .unwrap_err();
        assert!(matches!(err, CompileError::XPath { category: "Include", .. }));
    }
}
