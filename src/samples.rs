//! Captured sample pages and pattern checks against them
//!
//! Samples are stored one file per URL, the file name being the
//! form-urlencoded URL, so the directory can be inspected and edited by hand.
//! URLs whose encoded form is too long for a file name are stored under
//! `~<sha256>` with the URL kept in a `~<sha256>.url` file next to it.

use std::borrow::Cow;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use scraper::Html;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;
use url::form_urlencoded;

use crate::error::{CompileError, SampleError};
use crate::pattern::CompiledPattern;
use crate::source::PatternDef;
use crate::value::Value;
use crate::xpath::Document;

/// A captured response body and the URL it was requested from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub url: String,
    pub body: Vec<u8>,
}

impl Sample {
    pub fn new(url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            body: body.into(),
        }
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Longest encoded URL used verbatim as a file name
const MAX_NAME_LEN: usize = 200;

/// `~` is always percent-encoded, so hashed names never collide with plain ones
const HASHED_PREFIX: char = '~';
const URL_SUFFIX: &str = ".url";

fn file_name(url: &str) -> String {
    let name: String = form_urlencoded::byte_serialize(url.as_bytes()).collect();
    if name.len() <= MAX_NAME_LEN {
        return name;
    }
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    format!("{HASHED_PREFIX}{:x}", hasher.finalize())
}

fn is_hashed(name: &str) -> bool {
    name.starts_with(HASHED_PREFIX)
}

fn url_from_file_name(name: &str) -> Option<String> {
    form_urlencoded::parse(name.as_bytes())
        .next()
        .map(|(url, _)| url.into_owned())
}

/// Directory-backed sample store
#[derive(Debug, Clone)]
pub struct SampleStore {
    dir: PathBuf,
}

impl SampleStore {
    /// Open `dir`, creating it if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, SampleError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, url: &str) -> PathBuf {
        self.dir.join(file_name(url))
    }

    fn url_path(body: &Path) -> PathBuf {
        let mut name = body.as_os_str().to_owned();
        name.push(URL_SUFFIX);
        PathBuf::from(name)
    }

    /// Store `body` under `url`, replacing an earlier capture
    pub fn save(&self, url: &str, body: &[u8]) -> Result<(), SampleError> {
        let path = self.path_for(url);
        fs::write(&path, body)?;
        if path.file_name().is_some_and(|n| is_hashed(&n.to_string_lossy())) {
            fs::write(Self::url_path(&path), url)?;
        }
        debug!(url, bytes = body.len(), "sample saved");
        Ok(())
    }

    pub fn load(&self, url: &str) -> Result<Option<Sample>, SampleError> {
        match fs::read(self.path_for(url)) {
            Ok(body) => Ok(Some(Sample::new(url, body))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// URLs of every stored sample, sorted
    pub fn list(&self) -> Result<Vec<String>, SampleError> {
        let mut urls = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if !is_hashed(&name) {
                urls.extend(url_from_file_name(&name));
                continue;
            }
            if name.ends_with(URL_SUFFIX) {
                continue;
            }
            match fs::read_to_string(Self::url_path(&entry.path())) {
                Ok(url) => urls.push(url),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!(file = %name, "sample without a URL file skipped");
                }
                Err(e) => return Err(e.into()),
            }
        }
        urls.sort();
        Ok(urls)
    }

    pub fn load_all(&self) -> Result<Vec<Sample>, SampleError> {
        let mut samples = Vec::new();
        for url in self.list()? {
            if let Some(sample) = self.load(&url)? {
                samples.push(sample);
            }
        }
        Ok(samples)
    }

    /// Returns whether a sample was stored for `url`
    pub fn remove(&self, url: &str) -> Result<bool, SampleError> {
        let path = self.path_for(url);
        let removed = remove_if_present(&path)?;
        remove_if_present(&Self::url_path(&path))?;
        Ok(removed)
    }

    /// Delete every stored sample
    pub fn flush(&self) -> Result<usize, SampleError> {
        let urls = self.list()?;
        for url in &urls {
            self.remove(url)?;
        }
        debug!(removed = urls.len(), "sample store flushed");
        Ok(urls.len())
    }

    /// Download `url` and store the body as a sample
    pub fn fetch(&self, agent: &ureq::Agent, url: &str) -> Result<Sample, SampleError> {
        let body = match agent.get(url).call() {
            Ok(resp) if resp.status().is_success() => resp
                .into_body()
                .read_to_vec()
                .map_err(|source| SampleError::Fetch {
                    url: url.to_string(),
                    source,
                })?,
            Ok(resp) => {
                return Err(SampleError::Status {
                    url: url.to_string(),
                    status: resp.status().as_u16(),
                })
            }
            Err(ureq::Error::StatusCode(status)) => {
                return Err(SampleError::Status {
                    url: url.to_string(),
                    status,
                })
            }
            Err(source) => {
                return Err(SampleError::Fetch {
                    url: url.to_string(),
                    source,
                })
            }
        };
        self.save(url, &body)?;
        Ok(Sample::new(url, body))
    }
}

fn remove_if_present(path: &Path) -> Result<bool, SampleError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Result of applying a pattern to one sample
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleOutcome {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

/// Compile an uncommitted pattern definition and apply it to every sample.
/// Outcomes line up with `samples`; each sample URL goes through the gate.
pub fn check_pattern(
    def: &PatternDef,
    samples: &[Sample],
) -> Result<Vec<SampleOutcome>, CompileError> {
    let pattern = CompiledPattern::compile(def)?;
    Ok(samples
        .iter()
        .map(|sample| {
            let html = Html::parse_document(&sample.text());
            let doc = Document::new(&html);
            SampleOutcome {
                url: sample.url.clone(),
                result: pattern.apply_html(&sample.url, &doc, doc.root()),
            }
        })
        .collect())
}
