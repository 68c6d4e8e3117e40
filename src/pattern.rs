//! Compiled patterns: a URL gate in front of a root field

use std::collections::BTreeMap;

use scraper::Html;

use crate::error::CompileError;
use crate::field::CompiledField;
use crate::rules::TextRules;
use crate::source::PatternDef;
use crate::value::Value;
use crate::xpath::{Document, DomNode};

#[derive(Debug, Clone)]
pub struct CompiledPattern {
    url_rules: TextRules,
    root: CompiledField,
    storage: Option<String>,
}

impl CompiledPattern {
    /// Compile a pattern definition; a missing root type defaults to `struct`
    pub fn compile(def: &PatternDef) -> Result<Self, CompileError> {
        let mime = def.mime.trim();
        if !(mime.is_empty()
            || mime.eq_ignore_ascii_case("html")
            || mime.eq_ignore_ascii_case("text/html"))
        {
            return Err(CompileError::UnsupportedMime(def.mime.clone()));
        }

        let url_rules = TextRules::compile(def.url.as_ref())?;
        let root = if def.field.type_name.trim().is_empty() {
            CompiledField::compile(&def.clone().with_default_root_type().field)?
        } else {
            CompiledField::compile(&def.field)?
        };

        Ok(Self {
            url_rules,
            root,
            storage: def.storage.clone(),
        })
    }

    pub fn root(&self) -> &CompiledField {
        &self.root
    }

    /// Storage collection the results are meant for, if the pattern names one
    pub fn storage(&self) -> Option<&str> {
        self.storage.as_deref()
    }

    /// An empty URL always passes the gate
    pub fn matches_url(&self, url: &str) -> bool {
        url.is_empty() || self.url_rules.test(url.as_bytes())
    }

    /// Gate on `url`, then retrieve the root field from `node`. The result is a
    /// one-entry mapping keyed by the root field's title.
    pub fn apply_html(&self, url: &str, doc: &Document, node: DomNode) -> Option<Value> {
        if !self.matches_url(url) {
            return None;
        }
        let value = self.root.retrieve(doc, node)?;
        let title = self.root.root().title().to_string();
        Some(Value::Map(BTreeMap::from([(title, value)])))
    }

    /// Parse `html` as a document and apply from its root
    pub fn apply_str(&self, url: &str, html: &str) -> Option<Value> {
        if !self.matches_url(url) {
            return None;
        }
        let html = Html::parse_document(html);
        let doc = Document::new(&html);
        self.apply_html(url, &doc, doc.root())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{FieldDef, Lines, RegexRules};

    const JOBS: &str = r#"<html><body><table class="itemlist">
        <tr><td class="title"><a href="item?id=1">Backend engineer</a></td></tr>
        <tr><td class="title"><a href="item?id=2">Designer</a></td></tr>
        <tr><td class="title"><a href="news">More</a></td></tr>
    </table></body></html>"#;

    fn jobs_pattern() -> PatternDef {
        let mut item = FieldDef::new(
            "Item",
            "struct",
            "//table[@class='itemlist']/tbody/tr/td[@class='title']",
        );
        item.multiple = true;
        item.fields.push(FieldDef::new("Link", "string", "a[contains(@href, 'item?id=')]/@href"));
        item.fields.push(FieldDef::new("Title", "string", "a[contains(@href, 'item?id=')]"));
        PatternDef {
            url: Some(RegexRules {
                include: Lines::new("^https://news.ycombinator.com/jobs"),
                ..Default::default()
            }),
            field: item,
            mime: "html".to_string(),
            storage: None,
        }
    }

    #[test]
    fn test_jobs_listing() {
        let pattern = CompiledPattern::compile(&jobs_pattern()).unwrap();
        let value = pattern
            .apply_str("https://news.ycombinator.com/jobs", JOBS)
            .unwrap();
        let items = value.get("Item").and_then(Value::as_list).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].get("Link"), Some(&Value::from("item?id=1")));
        assert_eq!(items[1].get("Title"), Some(&Value::from("Designer")));
    }

    #[test]
    fn test_url_gate() {
        let pattern = CompiledPattern::compile(&jobs_pattern()).unwrap();
        assert!(pattern.apply_str("https://example.com/jobs", JOBS).is_none());
        // No URL means no gate
        assert!(pattern.apply_str("", JOBS).is_some());
    }

    #[test]
    fn test_url_gate_short_circuits_field_evaluation() {
        let pattern = CompiledPattern::compile(&jobs_pattern()).unwrap();
        let html = Html::parse_document(JOBS);
        let doc = Document::new(&html);
        // The fields match this document; only the gate rejects it
        assert!(pattern.apply_html("", &doc, doc.root()).is_some());
        assert!(pattern.apply_html("https://example.com/", &doc, doc.root()).is_none());
        assert!(pattern.matches_url("https://news.ycombinator.com/jobs?next=2"));
    }

    #[test]
    fn test_root_type_defaults_to_struct() {
        let mut def = jobs_pattern();
        def.field = FieldDef {
            title: "Page".to_string(),
            fields: vec![FieldDef::new("Heading", "string", "//a")],
            ..Default::default()
        };
        let pattern = CompiledPattern::compile(&def).unwrap();
        assert!(pattern.root().root().type_spec().is_struct());
        let value = pattern.apply_str("", JOBS).unwrap();
        assert_eq!(
            value.get("Page").and_then(|p| p.get("Heading")),
            Some(&Value::from("Backend engineer"))
        );
    }

    #[test]
    fn test_rejects_unknown_mime() {
        let mut def = jobs_pattern();
        def.mime = "json".to_string();
        assert_eq!(
            CompiledPattern::compile(&def).unwrap_err(),
            CompileError::UnsupportedMime("json".to_string())
        );
    }
}
