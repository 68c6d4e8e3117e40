//! XML pattern reader
//!
//! ```xml
//! <Pattern mime="html">
//!   <URL><Include>^https://news.ycombinator.com/jobs</Include></URL>
//!   <Field title="Item" type="struct" multiple="true">
//!     <Path>//td[@class='title']</Path>
//!     <Field title="Title" type="string"><Path>a</Path></Field>
//!   </Field>
//! </Pattern>
//! ```

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{FieldDef, PatternDef, RegexRules};
use crate::error::SourceError;

#[derive(Clone, Copy, PartialEq)]
enum Section {
    None,
    Url,
    Data,
    XData,
}

pub(super) fn parse_pattern(xml: &str) -> Result<PatternDef, SourceError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut pattern = PatternDef::default();
    let mut root: Option<FieldDef> = None;
    // Fields opened but not yet closed, innermost last
    let mut open: Vec<FieldDef> = Vec::new();
    let mut section = Section::None;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match tag.as_str() {
                    "Pattern" => read_pattern_attrs(&e, &mut pattern)?,
                    "Field" => open.push(read_field_attrs(&e)?),
                    "URL" => section = Section::Url,
                    "Data" => section = Section::Data,
                    "XData" => section = Section::XData,
                    _ => {}
                }
                text.clear();
            }
            Event::Empty(e) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match tag.as_str() {
                    "Pattern" => read_pattern_attrs(&e, &mut pattern)?,
                    "Field" => {
                        let field = read_field_attrs(&e)?;
                        close_field(field, &mut open, &mut root);
                    }
                    _ => {}
                }
                text.clear();
            }
            Event::Text(e) => {
                text.push_str(&e.unescape()?);
            }
            Event::CData(e) => {
                text.push_str(&String::from_utf8_lossy(&e));
            }
            Event::End(e) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match tag.as_str() {
                    "Field" => {
                        if let Some(field) = open.pop() {
                            close_field(field, &mut open, &mut root);
                        }
                    }
                    "URL" | "Data" | "XData" => section = Section::None,
                    "Path" => {
                        if let Some(field) = open.last_mut() {
                            field.path.push(&text);
                        }
                    }
                    "Submatch" | "Include" | "Exclude" | "Remove" => {
                        assign_rule(&tag, &text, section, &mut pattern, &mut open);
                    }
                    "Mime" => pattern.mime = text.trim().to_string(),
                    "Storage" => pattern.storage = Some(text.trim().to_string()),
                    _ => {}
                }
                text.clear();
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    pattern.field = root.ok_or(SourceError::MissingField)?;
    Ok(pattern)
}

fn close_field(field: FieldDef, open: &mut Vec<FieldDef>, root: &mut Option<FieldDef>) {
    match open.last_mut() {
        Some(parent) => parent.fields.push(field),
        // Only the first top-level field is the pattern's root
        None if root.is_none() => *root = Some(field),
        None => {}
    }
}

fn assign_rule(
    tag: &str,
    text: &str,
    section: Section,
    pattern: &mut PatternDef,
    open: &mut [FieldDef],
) {
    let rules: &mut RegexRules = match section {
        Section::Url => pattern.url.get_or_insert_with(RegexRules::default),
        Section::Data => match open.last_mut() {
            Some(field) => field.data.get_or_insert_with(RegexRules::default),
            None => return,
        },
        Section::XData => {
            let Some(field) = open.last_mut() else {
                return;
            };
            let xdata = field.xdata.get_or_insert_with(Default::default);
            match tag {
                "Include" => xdata.include.push(text),
                "Exclude" => xdata.exclude.push(text),
                "Remove" => xdata.remove.push(text),
                _ => {}
            }
            return;
        }
        Section::None => return,
    };
    match tag {
        "Submatch" => rules.submatch = text.trim().to_string(),
        "Include" => rules.include.push(text),
        "Exclude" => rules.exclude.push(text),
        "Remove" => rules.remove.push(text),
        _ => {}
    }
}

fn attributes(e: &BytesStart) -> Result<Vec<(String, String)>, SourceError> {
    let mut out = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr.unescape_value()?.to_string();
        out.push((key, value));
    }
    Ok(out)
}

fn flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}

fn read_pattern_attrs(e: &BytesStart, pattern: &mut PatternDef) -> Result<(), SourceError> {
    for (key, value) in attributes(e)? {
        match key.as_str() {
            "mime" => pattern.mime = value,
            "storage" => pattern.storage = Some(value),
            _ => {}
        }
    }
    Ok(())
}

fn read_field_attrs(e: &BytesStart) -> Result<FieldDef, SourceError> {
    let mut field = FieldDef::default();
    for (key, value) in attributes(e)? {
        match key.as_str() {
            "title" => field.title = value,
            "type" => field.type_name = value,
            "optional" => field.optional = flag(&value),
            "dontstore" | "dontStore" => field.dont_store = flag(&value),
            "multiple" => field.multiple = flag(&value),
            "unique" => field.unique = flag(&value),
            "attr" | "preserveAttr" => field.preserve_attr = flag(&value),
            // Single-path shorthand
            "path" => field.path.push(&value),
            _ => {}
        }
    }
    Ok(field)
}
