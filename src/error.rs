//! Error types
//!
//! Only compilation and loading can fail. Retrieval resolves every data
//! problem to an absent value instead of an error.

use std::path::PathBuf;

use serde::Serialize;

/// Structural problem found while compiling a pattern or field definition
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error("unrecognized type '{0}'")]
    UnknownType(String),

    #[error("failed to compile '{title}': field missing type")]
    MissingType { title: String },

    #[error("regex '{category}' error in line '{line}'")]
    Regex {
        category: &'static str,
        line: String,
        #[source]
        source: regex::Error,
    },

    #[error("XPath '{category}' error in expression '{expr}'")]
    XPath {
        category: &'static str,
        expr: String,
        #[source]
        source: XPathError,
    },

    #[error("field '{title}': {source}")]
    Field {
        title: String,
        #[source]
        source: Box<CompileError>,
    },

    #[error("unsupported pattern mime '{0}'")]
    UnsupportedMime(String),
}

impl CompileError {
    /// Wrap an error raised while compiling the field called `title`.
    pub(crate) fn in_field(self, title: &str) -> Self {
        match self {
            // Already attributed to the innermost field; keep that one.
            err @ CompileError::Field { .. } | err @ CompileError::MissingType { .. } => err,
            other => CompileError::Field {
                title: title.to_string(),
                source: Box::new(other),
            },
        }
    }
}

/// XPath expression that could not be parsed
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} at position {position}")]
pub struct XPathError {
    pub message: String,
    pub position: usize,
}

impl XPathError {
    pub(crate) fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

/// Pattern source that could not be decoded
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("XML pattern error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML pattern error: {0}")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),

    #[error("XML pattern is missing its root <Field>")]
    MissingField,

    #[error("YAML pattern error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON pattern error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported pattern file extension: {0}")]
    UnknownFormat(String),
}

/// A registry entry that failed to load
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("unable to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("pattern {path} could not be decoded: {source}")]
    Source {
        path: PathBuf,
        #[source]
        source: SourceError,
    },

    #[error("pattern {path} compilation error: {source}")]
    Compile {
        path: PathBuf,
        #[source]
        source: CompileError,
    },
}

/// Sample store failure
#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("sample store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: ureq::Error,
    },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },
}

/// Structured error handed to the management layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub message: String,
    pub cause: String,
}

impl ErrorReport {
    pub fn new(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut next = err.source();
        while let Some(source) = next {
            causes.push(source.to_string());
            next = source.source();
        }
        Self {
            message: err.to_string(),
            cause: causes.join(": "),
        }
    }
}

impl From<&CompileError> for ErrorReport {
    fn from(err: &CompileError) -> Self {
        ErrorReport::new(err)
    }
}
