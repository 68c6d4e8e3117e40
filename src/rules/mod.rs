//! Compiled Include/Exclude/Remove rule sets
//!
//! [`TextRules`] work on extracted bytes with regular expressions and also
//! serve as the URL gate of a pattern. [`NodeRules`] work on matched DOM
//! nodes with XPath queries and only apply to `html` fields.

mod node;
mod text;

pub use node::NodeRules;
pub use text::TextRules;
