use std::borrow::Cow;

use regex::bytes::{Captures, NoExpand, Regex};

use crate::error::CompileError;
use crate::source::{Lines, RegexRules};

/// Regex rules over raw bytes
#[derive(Debug, Clone, Default)]
pub struct TextRules {
    submatch: Option<Regex>,
    include: Vec<Regex>,
    exclude: Vec<Regex>,
    remove: Vec<Regex>,
}

fn compile_lines(category: &'static str, lines: &Lines) -> Result<Vec<Regex>, CompileError> {
    lines
        .iter()
        .map(|line| {
            Regex::new(line).map_err(|source| CompileError::Regex {
                category,
                line: line.to_string(),
                source,
            })
        })
        .collect()
}

impl TextRules {
    /// Absent rules compile to an empty set that accepts and keeps everything
    pub fn compile(rules: Option<&RegexRules>) -> Result<Self, CompileError> {
        let Some(rules) = rules else {
            return Ok(Self::default());
        };

        let submatch = match rules.submatch.trim() {
            "" => None,
            expr => Some(Regex::new(expr).map_err(|source| CompileError::Regex {
                category: "Submatch",
                line: expr.to_string(),
                source,
            })?),
        };

        Ok(Self {
            submatch,
            include: compile_lines("Include", &rules.include)?,
            exclude: compile_lines("Exclude", &rules.exclude)?,
            remove: compile_lines("Remove", &rules.remove)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.submatch.is_none()
            && self.include.is_empty()
            && self.exclude.is_empty()
            && self.remove.is_empty()
    }

    /// Accept when no Include rule exists or any matches, and no Exclude rule matches
    pub fn test(&self, input: &[u8]) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|r| r.is_match(input));
        included && !self.exclude.iter().any(|r| r.is_match(input))
    }

    /// Remove every match of each Remove rule, rules applied in order
    pub fn clean<'s>(&self, input: &'s [u8]) -> Cow<'s, [u8]> {
        let mut out = Cow::Borrowed(input);
        for rule in &self.remove {
            let next = match rule.replace_all(&out, NoExpand(b"")) {
                Cow::Borrowed(_) => continue,
                Cow::Owned(bytes) => bytes,
            };
            out = Cow::Owned(next);
        }
        out
    }

    /// First submatch; the whole input without a Submatch rule, empty when it does not match
    pub fn find_one<'s>(&self, input: &'s [u8]) -> &'s [u8] {
        let Some(submatch) = &self.submatch else {
            return input;
        };
        match submatch.captures(input) {
            Some(caps) => group(submatch, &caps),
            None => &input[..0],
        }
    }

    /// All submatches; the whole input as a single piece without a Submatch rule
    pub fn find_all<'s>(&self, input: &'s [u8]) -> Vec<&'s [u8]> {
        match &self.submatch {
            Some(submatch) => submatch
                .captures_iter(input)
                .map(|caps| group(submatch, &caps))
                .collect(),
            None => vec![input],
        }
    }
}

/// Capture group 1, or the whole match for expressions without groups
fn group<'s>(regex: &Regex, caps: &Captures<'s>) -> &'s [u8] {
    let index = if regex.captures_len() > 1 { 1 } else { 0 };
    caps.get(index).map(|m| m.as_bytes()).unwrap_or_default()
}
