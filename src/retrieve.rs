//! Retrieval interpreter
//!
//! Walks a compiled field tree against a parsed document. Nothing in here
//! fails: missing nodes, rejected rules and failed coercions all resolve to
//! `None`, and a required child resolving to `None` collapses its struct.
//! A `multiple` field always yields a list, possibly empty, so its first
//! candidate is final.

use std::borrow::Cow;
use std::collections::BTreeMap;

use ego_tree::NodeId;
use scraper::Html;
use tracing::trace;

use crate::field::{CompiledField, Field};
use crate::markup::{self, Serializer};
use crate::rules::NodeRules;
use crate::types::Kind;
use crate::value::Value;
use crate::xpath::{Document, DomNode, Selection, XPath};

impl CompiledField {
    /// Evaluate the whole tree with `node` as the root field's context
    pub fn retrieve(&self, doc: &Document, node: DomNode) -> Option<Value> {
        self.root().retrieve(doc, node)
    }
}

impl Field<'_> {
    pub fn retrieve(&self, doc: &Document, node: DomNode) -> Option<Value> {
        let value = match self.kind() {
            Kind::Struct => self.retrieve_struct(doc, node),
            _ => self.retrieve_leaf(doc, node),
        };
        if value.is_none() {
            trace!(field = %self.relative_path(), "no value");
        }
        value
    }

    fn retrieve_leaf(&self, doc: &Document, node: DomNode) -> Option<Value> {
        self.candidates().iter().find_map(|query| {
            match (self.is_multiple(), self.kind() == Kind::Html) {
                (false, false) => self.text_one(doc, node, query),
                (true, false) => self.text_many(doc, node, query),
                (false, true) => self.markup_one(doc, node, query),
                (true, true) => self.markup_many(doc, node, query),
            }
        })
    }

    fn text_one(&self, doc: &Document, node: DomNode, query: &XPath) -> Option<Value> {
        let text = match query.evaluate(doc, node) {
            Selection::Nodes(nodes) => doc.string_value(*nodes.first()?),
            Selection::Scalar(text) => text,
        };
        let rules = &self.node().text_rules;
        if !rules.test(text.as_bytes()) {
            return None;
        }
        let cleaned = rules.clean(text.as_bytes());
        self.type_spec().coerce(rules.find_one(&cleaned))
    }

    fn text_many(&self, doc: &Document, node: DomNode, query: &XPath) -> Option<Value> {
        let texts: Vec<String> = match query.evaluate(doc, node) {
            Selection::Nodes(nodes) => nodes.into_iter().map(|n| doc.string_value(n)).collect(),
            Selection::Scalar(text) => vec![text],
        };
        let rules = &self.node().text_rules;
        let ty = self.type_spec();

        let mut out = Vec::new();
        for text in texts {
            if !rules.test(text.as_bytes()) {
                continue;
            }
            let cleaned = rules.clean(text.as_bytes());
            for piece in rules.find_all(&cleaned) {
                if let Some(value) = ty.coerce(piece) {
                    self.push(&mut out, value);
                }
            }
        }
        Some(Value::List(out))
    }

    fn markup_one(&self, doc: &Document, node: DomNode, query: &XPath) -> Option<Value> {
        let target = query.select_one(doc, node)?;
        if !self.node().node_rules.test(doc, target) {
            return None;
        }
        Some(Value::String(self.render(doc, target)))
    }

    fn markup_many(&self, doc: &Document, node: DomNode, query: &XPath) -> Option<Value> {
        let rules = &self.node().node_rules;
        let serializer = Serializer::for_preserve_attr(self.preserve_attr());
        // Consecutive targets with the same removal set share one working copy
        let mut copy: Option<(Vec<NodeId>, Cow<'_, Html>)> = None;
        let mut out = Vec::new();
        for target in query.select(doc, node) {
            if !rules.test(doc, target) {
                continue;
            }
            let removals = rules.removals(doc, target);
            if copy.as_ref().map_or(true, |(ids, _)| *ids != removals) {
                let cleaned = NodeRules::detach(doc, &removals);
                copy = Some((removals, cleaned));
            }
            let Some((_, cleaned)) = &copy else {
                continue;
            };
            let markup = markup::render(cleaned, target, serializer);
            self.push(&mut out, Value::String(markup));
        }
        Some(Value::List(out))
    }

    /// Serialize `target` from a working copy with the Remove rules applied
    fn render(&self, doc: &Document, target: DomNode) -> String {
        let cleaned = self.node().node_rules.clean(doc, target);
        markup::render(&cleaned, target, Serializer::for_preserve_attr(self.preserve_attr()))
    }

    fn push(&self, out: &mut Vec<Value>, value: Value) {
        if self.is_unique() && out.contains(&value) {
            return;
        }
        out.push(value);
    }

    fn retrieve_struct(&self, doc: &Document, node: DomNode) -> Option<Value> {
        // Structs only ever use their first candidate; without one the
        // context node itself is the sub-root
        let query = self.candidates().first();
        if self.is_multiple() {
            let roots = match query {
                Some(query) => query.select(doc, node),
                None => vec![node],
            };
            let items = roots
                .into_iter()
                .filter_map(|root| self.build_struct(doc, root))
                .collect();
            Some(Value::List(items))
        } else {
            let root = match query {
                Some(query) => query.select_one(doc, node)?,
                None => node,
            };
            self.build_struct(doc, root)
        }
    }

    fn build_struct(&self, doc: &Document, root: DomNode) -> Option<Value> {
        let mut map = BTreeMap::new();
        for child in self.children() {
            match child.retrieve(doc, root) {
                Some(value) => {
                    map.insert(child.title().to_string(), value);
                }
                None if child.is_optional() => {}
                None => return None,
            }
        }
        Some(Value::Map(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{FieldDef, Lines, RegexRules, XpathRules};
    use scraper::Html;

    fn retrieve(def: &FieldDef, page: &str) -> Option<Value> {
        let field = CompiledField::compile(def).unwrap();
        let html = Html::parse_document(page);
        let doc = Document::new(&html);
        field.retrieve(&doc, doc.root())
    }

    fn strings(items: &[&str]) -> Value {
        Value::List(items.iter().map(|s| Value::from(*s)).collect())
    }

    const TRIM: &str = "^[\\x20\\x09\\x0D\\x0A]+\n[\\x20\\x09\\x0D\\x0A]+$";

    #[test]
    fn test_candidates_are_tried_in_order() {
        let page = "<html><body><h2>Second</h2></body></html>";
        let def = FieldDef::new("Title", "string", "//h1\n//h2");
        assert_eq!(retrieve(&def, page), Some(Value::from("Second")));

        let page = "<html><body><h1>First</h1><h2>Second</h2></body></html>";
        assert_eq!(retrieve(&def, page), Some(Value::from("First")));
    }

    #[test]
    fn test_rejected_candidate_falls_through() {
        let page = "<html><body><h1>Draft</h1><h2>Final</h2></body></html>";
        let mut def = FieldDef::new("Title", "string", "//h1\n//h2");
        def.data = Some(RegexRules {
            exclude: Lines::new("Draft"),
            ..Default::default()
        });
        assert_eq!(retrieve(&def, page), Some(Value::from("Final")));
    }

    #[test]
    fn test_struct_all_or_nothing() {
        let page = "<html><body><div class='card'><h3>Widget</h3></div></body></html>";
        let mut card = FieldDef::new("Card", "struct", "//div[@class='card']");
        card.fields.push(FieldDef::new("Name", "string", "h3"));
        card.fields.push(FieldDef::new("Price", "int", "span"));
        assert_eq!(retrieve(&card, page), None);

        card.fields[1].optional = true;
        let value = retrieve(&card, page).unwrap();
        assert_eq!(value.get("Name"), Some(&Value::from("Widget")));
        assert!(value.get("Price").is_none());
        assert_eq!(value.as_map().unwrap().len(), 1);
    }

    #[test]
    fn test_multiple_and_unique() {
        let page = "<html><body><ul><li>A</li><li>B</li><li>A</li></ul></body></html>";
        let mut def = FieldDef::new("Items", "string", "//li");
        def.multiple = true;
        assert_eq!(retrieve(&def, page), Some(strings(&["A", "B", "A"])));

        def.unique = true;
        assert_eq!(retrieve(&def, page), Some(strings(&["A", "B"])));
    }

    #[test]
    fn test_submatch_coercion() {
        let mut def = FieldDef::new("Price", "int", "//p");
        def.data = Some(RegexRules {
            submatch: r"Price: (\d+)".to_string(),
            ..Default::default()
        });
        assert_eq!(
            retrieve(&def, "<html><body><p>Price: 42</p></body></html>"),
            Some(Value::Int(42))
        );
        assert_eq!(retrieve(&def, "<html><body><p>No price</p></body></html>"), None);
    }

    #[test]
    fn test_submatch_fans_out() {
        let page = "<html><body><p>sizes: 38, 40</p><p>sizes: 40, 42</p></body></html>";
        let mut def = FieldDef::new("Sizes", "[]int", "//p");
        def.data = Some(RegexRules {
            submatch: r"(\d+)".to_string(),
            ..Default::default()
        });
        def.unique = true;
        assert_eq!(
            retrieve(&def, page),
            Some(Value::List(vec![Value::Int(38), Value::Int(40), Value::Int(42)]))
        );
    }

    #[test]
    fn test_single_string_with_trim() {
        let page = "<html><head>\n\t<title>testField1</title>\n</head></html>";
        let mut def = FieldDef::new("testField1", "string", "//head");
        def.data = Some(RegexRules {
            remove: Lines::new(TRIM),
            ..Default::default()
        });
        assert_eq!(retrieve(&def, page), Some(Value::from("testField1")));
    }

    #[test]
    fn test_multiple_strings() {
        let page = "<html><body><ul><li>one</li><li>two</li><li>three</li></ul></body></html>";
        let mut def = FieldDef::new("List", "string", "//body/ul/li");
        def.multiple = true;
        assert_eq!(retrieve(&def, page), Some(strings(&["one", "two", "three"])));
    }

    #[test]
    fn test_html_single_raw() {
        let page = "<html><head>\n\t<title>testField1</title>\n</head></html>";
        let def = FieldDef::new("Head", "html", "//head");
        assert_eq!(
            retrieve(&def, page),
            Some(Value::from("<head>\n\t<title>testField1</title>\n</head>"))
        );
    }

    #[test]
    fn test_html_multiple_with_removal() {
        let page = "<html><body>\
            <div><h1>a</h1></div><div><h1>b</h1></div><div><p>c</p></div>\
            <div><h2>d</h2></div><div><p>e</p></div><div><h3>f</h3></div>\
            </body></html>";
        let mut def = FieldDef::new("Blocks", "html", "//div");
        def.multiple = true;
        def.xdata = Some(XpathRules {
            remove: Lines::new("//p\n//h3"),
            ..Default::default()
        });
        assert_eq!(
            retrieve(&def, page),
            Some(strings(&[
                "<div><h1>a</h1></div>",
                "<div><h1>b</h1></div>",
                "<div></div>",
                "<div><h2>d</h2></div>",
                "<div></div>",
                "<div></div>",
            ]))
        );

        // Reversing the removal order gives the same result
        def.xdata = Some(XpathRules {
            remove: Lines::new("//h3\n//p"),
            ..Default::default()
        });
        def.unique = true;
        assert_eq!(
            retrieve(&def, page),
            Some(strings(&[
                "<div><h1>a</h1></div>",
                "<div><h1>b</h1></div>",
                "<div></div>",
                "<div><h2>d</h2></div>",
            ]))
        );
    }

    #[test]
    fn test_html_node_rules_filter() {
        let page = "<html><body><div><p>keep</p></div><div><span>skip</span></div></body></html>";
        let mut def = FieldDef::new("Block", "html", "//div");
        def.multiple = true;
        def.preserve_attr = true;
        def.xdata = Some(XpathRules {
            include: Lines::new("p"),
            ..Default::default()
        });
        assert_eq!(retrieve(&def, page), Some(strings(&["<div><p>keep</p></div>"])));
    }

    #[test]
    fn test_struct_multiple_drops_incomplete_instances() {
        let page = r#"<html><body><table>
            <tr><td class="title"><a href="item?id=1">First job</a></td></tr>
            <tr><td class="title"><span>no link</span></td></tr>
            <tr><td class="title"><a href="item?id=3">Third job</a></td></tr>
        </table></body></html>"#;
        let mut item = FieldDef::new("Item", "struct", "//tr/td[@class='title']");
        item.multiple = true;
        item.fields.push(FieldDef::new("Link", "string", "a[contains(@href, 'item?id=')]/@href"));
        item.fields.push(FieldDef::new("Title", "string", "a[contains(@href, 'item?id=')]"));

        let value = retrieve(&item, page).unwrap();
        let items = value.as_list().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].get("Link"), Some(&Value::from("item?id=1")));
        assert_eq!(items[1].get("Title"), Some(&Value::from("Third job")));
    }

    #[test]
    fn test_struct_uses_first_candidate_only() {
        let page = "<html><body><section><b>x</b></section></body></html>";
        let mut def = FieldDef::new("Box", "struct", "//article\n//section");
        def.fields.push(FieldDef::new("Bold", "string", "b"));
        assert_eq!(retrieve(&def, page), None);
    }

    #[test]
    fn test_scalar_candidate() {
        let page = "<html><body><h1>  Spaced   out  </h1></body></html>";
        let def = FieldDef::new("Title", "string", "normalize-space(//h1)");
        assert_eq!(retrieve(&def, page), Some(Value::from("Spaced out")));

        let def = FieldDef::new("Count", "int", "count(//h1)");
        assert_eq!(retrieve(&def, page), Some(Value::Int(1)));
    }

    #[test]
    fn test_empty_sequence_is_a_value() {
        let page = "<html><body><ul></ul><ol><li>x</li></ol></body></html>";
        let mut def = FieldDef::new("Items", "string", "//ul/li\n//ol/li");
        def.multiple = true;
        assert_eq!(retrieve(&def, page), Some(Value::List(vec![])));

        let mut wrapper = FieldDef::new("Page", "struct", "//body");
        let mut none = FieldDef::new("None", "[]string", "//table/tr");
        none.multiple = true;
        wrapper.fields.push(none);
        let value = retrieve(&wrapper, page).unwrap();
        assert_eq!(value.get("None"), Some(&Value::List(vec![])));
    }

    #[test]
    fn test_required_list_child_without_matches_keeps_struct() {
        let page = "<html><body><div class='card'><h3>Widget</h3></div></body></html>";
        let mut card = FieldDef::new("Card", "struct", "//div[@class='card']");
        card.fields.push(FieldDef::new("Name", "string", "h3"));
        let mut tags = FieldDef::new("Tags", "string", "span");
        tags.multiple = true;
        card.fields.push(tags);

        let value = retrieve(&card, page).unwrap();
        assert_eq!(value.get("Name"), Some(&Value::from("Widget")));
        assert_eq!(value.get("Tags"), Some(&Value::List(vec![])));
        assert_eq!(
            serde_json::to_string(&value).unwrap(),
            r#"{"Name":"Widget","Tags":[]}"#
        );

        let mut html_tags = FieldDef::new("Tags", "html", "span");
        html_tags.multiple = true;
        card.fields[1] = html_tags;
        assert_eq!(
            retrieve(&card, page).and_then(|v| v.get("Tags").cloned()),
            Some(Value::List(vec![]))
        );

        let mut cards = FieldDef::new("Cards", "struct", "//article");
        cards.multiple = true;
        cards.fields.push(FieldDef::new("Name", "string", "h3"));
        assert_eq!(retrieve(&cards, page), Some(Value::List(vec![])));
    }

    #[test]
    fn test_html_multiple_with_document_wide_removal() {
        let page = "<html><body>\
            <div>a<script>x()</script></div><div>b</div><div>c &lt; d</div>\
            <script>y()</script></body></html>";
        let mut def = FieldDef::new("Blocks", "html", "//div");
        def.multiple = true;
        def.xdata = Some(XpathRules {
            remove: Lines::new("//script"),
            ..Default::default()
        });
        assert_eq!(
            retrieve(&def, page),
            Some(strings(&["<div>a</div>", "<div>b</div>", "<div>c &lt; d</div>"]))
        );
    }

    #[test]
    fn test_retrieve_never_mutates_document() {
        let page = "<html><body><div><p>gone</p><b>kept</b></div></body></html>";
        let mut def = FieldDef::new("Div", "html", "//div");
        def.xdata = Some(XpathRules {
            remove: Lines::new(".//p"),
            ..Default::default()
        });
        let field = CompiledField::compile(&def).unwrap();
        let html = Html::parse_document(page);
        let doc = Document::new(&html);
        assert_eq!(
            field.retrieve(&doc, doc.root()),
            Some(Value::from("<div><b>kept</b></div>"))
        );
        assert_eq!(
            field.retrieve(&doc, doc.root()),
            Some(Value::from("<div><b>kept</b></div>"))
        );
        assert!(doc.string_value(doc.root()).contains("gone"));
    }
}
