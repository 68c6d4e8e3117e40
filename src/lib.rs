//! Declarative extraction of structured data from HTML
//!
//! A pattern is a URL gate plus a nestable field schema:
//! - XPath candidates select nodes, tried in order
//! - regex rules filter, clean and cut extracted text
//! - XPath rules filter and clean markup of `html` fields
//! - struct fields build mappings all-or-nothing
//!
//! Patterns are compiled once into immutable trees, collected in a
//! [`Registry`] and published through a [`PatternStore`] that swaps whole
//! snapshots on reload.

pub mod config;
pub mod error;
pub mod field;
pub mod markup;
pub mod pattern;
pub mod registry;
mod retrieve;
pub mod rules;
pub mod samples;
pub mod source;
pub mod types;
pub mod value;
pub mod xpath;

pub use config::Config;
pub use error::{CompileError, ErrorReport, LoadError, SampleError, SourceError, XPathError};
pub use field::{CompiledField, Field, FieldId};
pub use pattern::CompiledPattern;
pub use registry::{Entry, PatternStore, Registry, SourceNode, SourceTree};
pub use samples::{check_pattern, Sample, SampleOutcome, SampleStore};
pub use source::{FieldDef, Lines, PatternDef, RegexRules, XpathRules};
pub use types::{Kind, TypeSpec};
pub use value::Value;
pub use xpath::{Document, DomNode, Selection, XPath};
