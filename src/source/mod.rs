//! Pattern source definitions
//!
//! The uncompiled shape of a pattern as stored on disk or sent by the
//! management layer. JSON and YAML go through serde; XML has its own reader.

mod xml;

use std::fmt;
use std::path::Path;

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::error::SourceError;

/// Newline-delimited rule lines, written either as one block of text or as a list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lines(Vec<String>);

impl Lines {
    pub fn new(text: &str) -> Self {
        Lines(vec![text.to_string()])
    }

    pub fn push(&mut self, text: &str) {
        self.0.push(text.to_string());
    }

    /// Trimmed, non-blank lines in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0
            .iter()
            .flat_map(|block| block.split('\n'))
            .map(str::trim)
            .filter(|line| !line.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

impl From<&str> for Lines {
    fn from(text: &str) -> Self {
        Lines::new(text)
    }
}

impl<const N: usize> From<[&str; N]> for Lines {
    fn from(lines: [&str; N]) -> Self {
        Lines(lines.iter().map(|l| l.to_string()).collect())
    }
}

impl Serialize for Lines {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for Lines {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LinesVisitor;

        impl<'de> Visitor<'de> for LinesVisitor {
            type Value = Lines;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a string or a list of strings")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Lines, E> {
                Ok(Lines::new(v))
            }

            fn visit_unit<E: de::Error>(self) -> Result<Lines, E> {
                Ok(Lines::default())
            }

            fn visit_none<E: de::Error>(self) -> Result<Lines, E> {
                Ok(Lines::default())
            }

            fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Lines, D::Error> {
                d.deserialize_any(self)
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Lines, A::Error> {
                let mut lines = Lines::default();
                while let Some(line) = seq.next_element::<Option<String>>()? {
                    if let Some(line) = line {
                        lines.push(&line);
                    }
                }
                Ok(lines)
            }
        }

        deserializer.deserialize_any(LinesVisitor)
    }
}

/// Regex rules applied to extracted text (or to the request URL)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegexRules {
    #[serde(alias = "Submatch")]
    pub submatch: String,
    #[serde(alias = "Include")]
    pub include: Lines,
    #[serde(alias = "Exclude")]
    pub exclude: Lines,
    #[serde(alias = "Remove")]
    pub remove: Lines,
}

/// XPath rules applied to matched nodes of `html` fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XpathRules {
    #[serde(alias = "Include")]
    pub include: Lines,
    #[serde(alias = "Exclude")]
    pub exclude: Lines,
    #[serde(alias = "Remove")]
    pub remove: Lines,
}

/// One field of an extraction schema
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldDef {
    pub title: String,
    /// int, float64, string, html, struct; `[]` prefix or `array` for arrays
    #[serde(rename = "type")]
    pub type_name: String,
    /// XPath candidates, tried in order
    pub path: Lines,
    pub data: Option<RegexRules>,
    pub xdata: Option<XpathRules>,
    pub optional: bool,
    #[serde(rename = "dontstore", alias = "dontStore", alias = "dont_store")]
    pub dont_store: bool,
    pub multiple: bool,
    pub unique: bool,
    /// Render `html` fields with the library serializer
    #[serde(rename = "attr", alias = "preserveAttr")]
    pub preserve_attr: bool,
    #[serde(rename = "field", alias = "fields")]
    pub fields: Vec<FieldDef>,
}

impl FieldDef {
    pub fn new(title: &str, type_name: &str, path: &str) -> Self {
        Self {
            title: title.to_string(),
            type_name: type_name.to_string(),
            path: Lines::new(path),
            ..Default::default()
        }
    }

    /// This definition followed by all of its descendants, pre-order
    pub fn flatten(&self) -> Vec<&FieldDef> {
        let mut out = vec![self];
        for field in &self.fields {
            out.extend(field.flatten());
        }
        out
    }

    pub fn find_child(&self, title: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.title == title)
    }

    /// Walk a dotted path of child titles, e.g. `Item.Link`
    pub fn find_field(&self, path: &str) -> Option<&FieldDef> {
        path.split('.')
            .try_fold(self, |field, title| field.find_child(title))
    }
}

/// A complete pattern: URL gate plus root field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternDef {
    #[serde(alias = "URL", alias = "urlRules")]
    pub url: Option<RegexRules>,
    pub field: FieldDef,
    pub mime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<String>,
}

impl PatternDef {
    pub fn from_json(text: &str) -> Result<Self, SourceError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_yaml(text: &str) -> Result<Self, SourceError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_xml(text: &str) -> Result<Self, SourceError> {
        xml::parse_pattern(text)
    }

    /// Decode by file extension: `.xml`, `.yaml`/`.yml` or `.json`
    pub fn decode(path: &Path, text: &str) -> Result<Self, SourceError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "xml" => Self::from_xml(text),
            "yaml" | "yml" => Self::from_yaml(text),
            "json" => Self::from_json(text),
            _ => Err(SourceError::UnknownFormat(path.display().to_string())),
        }
    }

    /// True for file names a pattern tree loader should pick up
    pub fn is_source_file(path: &Path) -> bool {
        matches!(
            path.extension()
                .and_then(|e| e.to_str())
                .map(str::to_ascii_lowercase)
                .as_deref(),
            Some("xml" | "yaml" | "yml" | "json")
        )
    }

    /// The root field describes the whole document, so it defaults to `struct`
    pub fn with_default_root_type(mut self) -> Self {
        if self.field.type_name.trim().is_empty() {
            self.field.type_name = "struct".to_string();
        }
        self
    }
}
