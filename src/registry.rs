//! Pattern registry
//!
//! A namespace tree of compiled patterns built from a [`SourceTree`] (usually
//! a directory of pattern files). [`PatternStore`] publishes the current tree
//! as an immutable snapshot and swaps in a freshly built one on reload.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use scraper::Html;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::LoadError;
use crate::pattern::CompiledPattern;
use crate::source::PatternDef;
use crate::value::Value;
use crate::xpath::{Document, DomNode};

#[derive(Debug, Clone)]
pub enum SourceNode {
    Pattern(PatternDef),
    Dir(SourceTree),
}

/// Uncompiled pattern definitions arranged by name
#[derive(Debug, Clone, Default)]
pub struct SourceTree {
    entries: BTreeMap<String, SourceNode>,
}

impl SourceTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_pattern(&mut self, name: impl Into<String>, def: PatternDef) {
        self.entries.insert(name.into(), SourceNode::Pattern(def));
    }

    pub fn insert_dir(&mut self, name: impl Into<String>, tree: SourceTree) {
        self.entries.insert(name.into(), SourceNode::Dir(tree));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SourceNode)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read a directory recursively. Sub-directories become nested trees and
    /// `.xml`, `.yaml`/`.yml` and `.json` files become patterns keyed by file
    /// name; other files are ignored. Only an unreadable `dir` itself fails,
    /// everything below it is reported and skipped.
    pub fn read_dir(dir: &Path) -> Result<(Self, Vec<LoadError>), LoadError> {
        let mut errors = Vec::new();
        let tree = Self::read_dir_into(dir, &mut errors)?;
        Ok((tree, errors))
    }

    fn read_dir_into(dir: &Path, errors: &mut Vec<LoadError>) -> Result<Self, LoadError> {
        let entries = fs::read_dir(dir).map_err(|source| LoadError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut tree = Self::default();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(source) => {
                    reject(errors, LoadError::Io {
                        path: dir.to_path_buf(),
                        source,
                    });
                    continue;
                }
            };
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();

            if path.is_dir() {
                match Self::read_dir_into(&path, errors) {
                    Ok(sub) => tree.insert_dir(name, sub),
                    Err(e) => reject(errors, e),
                }
                continue;
            }
            if !PatternDef::is_source_file(&path) {
                continue;
            }

            let text = match fs::read_to_string(&path) {
                Ok(text) => text,
                Err(source) => {
                    reject(errors, LoadError::Io { path, source });
                    continue;
                }
            };
            match PatternDef::decode(&path, &text) {
                Ok(def) => tree.insert_pattern(name, def.with_default_root_type()),
                Err(source) => reject(errors, LoadError::Source { path, source }),
            }
        }
        Ok(tree)
    }
}

fn reject(errors: &mut Vec<LoadError>, err: LoadError) {
    warn!(error = %err, "pattern rejected");
    errors.push(err);
}

#[derive(Debug, Clone)]
pub enum Entry {
    Pattern(Arc<CompiledPattern>),
    Registry(Registry),
}

/// Namespace tree of compiled patterns
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: HashMap<String, Entry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile every definition in `tree`. Patterns that fail to compile are
    /// left out and reported; they never block the rest of the tree.
    pub fn build(tree: &SourceTree) -> (Self, Vec<LoadError>) {
        let mut errors = Vec::new();
        let registry = Self::build_into(tree, Path::new(""), &mut errors);
        (registry, errors)
    }

    fn build_into(tree: &SourceTree, prefix: &Path, errors: &mut Vec<LoadError>) -> Self {
        let mut registry = Self::default();
        for (name, node) in tree.iter() {
            let path = prefix.join(name);
            match node {
                SourceNode::Dir(sub) => {
                    registry.insert_registry(name, Self::build_into(sub, &path, errors));
                }
                SourceNode::Pattern(def) => match CompiledPattern::compile(def) {
                    Ok(pattern) => registry.insert(name, pattern),
                    Err(source) => reject(errors, LoadError::Compile { path, source }),
                },
            }
        }
        registry
    }

    /// Read and compile a pattern directory
    pub fn load_dir(dir: &Path) -> Result<(Self, Vec<LoadError>), LoadError> {
        let (tree, mut errors) = SourceTree::read_dir(dir)?;
        let (registry, compile_errors) = Self::build(&tree);
        errors.extend(compile_errors);
        debug!(
            dir = %dir.display(),
            patterns = registry.list().len(),
            rejected = errors.len(),
            "pattern directory loaded"
        );
        Ok((registry, errors))
    }

    pub fn insert(&mut self, name: impl Into<String>, pattern: CompiledPattern) {
        self.entries.insert(name.into(), Entry::Pattern(Arc::new(pattern)));
    }

    pub fn insert_registry(&mut self, name: impl Into<String>, registry: Registry) {
        self.entries.insert(name.into(), Entry::Registry(registry));
    }

    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.entries.get(name)
    }

    /// Look up a pattern by its slash-separated name, e.g. `shop/product.xml`
    pub fn pattern(&self, name: &str) -> Option<&Arc<CompiledPattern>> {
        let (dir, rest) = match name.split_once('/') {
            Some((dir, rest)) => (dir, Some(rest)),
            None => (name, None),
        };
        match (self.entries.get(dir)?, rest) {
            (Entry::Pattern(pattern), None) => Some(pattern),
            (Entry::Registry(sub), Some(rest)) => sub.pattern(rest),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Slash-separated names of every pattern, sorted
    pub fn list(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_names("", &mut names);
        names.sort();
        names
    }

    fn collect_names(&self, prefix: &str, names: &mut Vec<String>) {
        for (name, entry) in &self.entries {
            let full = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}/{name}")
            };
            match entry {
                Entry::Pattern(_) => names.push(full),
                Entry::Registry(sub) => sub.collect_names(&full, names),
            }
        }
    }

    /// Apply every pattern; results are keyed by entry name and nested
    /// registries contribute their own merged mapping
    pub fn apply_all(&self, url: &str, doc: &Document, node: DomNode) -> Option<Value> {
        let mut merged = BTreeMap::new();
        for (name, entry) in &self.entries {
            let result = match entry {
                Entry::Pattern(pattern) => pattern.apply_html(url, doc, node),
                Entry::Registry(sub) => sub.apply_all(url, doc, node),
            };
            if let Some(value) = result {
                merged.insert(name.clone(), value);
            }
        }
        (!merged.is_empty()).then_some(Value::Map(merged))
    }

    /// Parse `html` and apply every pattern from the document root
    pub fn apply_html(&self, url: &str, html: &str) -> Option<Value> {
        let html = Html::parse_document(html);
        let doc = Document::new(&html);
        self.apply_all(url, &doc, doc.root())
    }
}

/// The currently published registry of a pattern directory
pub struct PatternStore {
    dir: PathBuf,
    current: ArcSwap<Registry>,
}

impl PatternStore {
    /// Empty store for `dir`; call [`PatternStore::reload`] to load it
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            current: ArcSwap::from_pointee(Registry::default()),
        }
    }

    pub fn open(dir: impl Into<PathBuf>) -> Result<(Self, Vec<LoadError>), LoadError> {
        let store = Self::new(dir);
        let errors = store.reload()?;
        Ok((store, errors))
    }

    pub fn from_config(config: &Config) -> Result<(Self, Vec<LoadError>), LoadError> {
        Self::open(config.patterns_dir.clone())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Registry as of now; stays valid and unchanged across later reloads
    pub fn snapshot(&self) -> Arc<Registry> {
        self.current.load_full()
    }

    pub fn publish(&self, registry: Registry) {
        self.current.store(Arc::new(registry));
    }

    /// Rebuild from the directory and publish the result. If the directory
    /// cannot be read the current snapshot stays in place.
    pub fn reload(&self) -> Result<Vec<LoadError>, LoadError> {
        let (registry, errors) = Registry::load_dir(&self.dir)?;
        self.publish(registry);
        debug!(dir = %self.dir.display(), "registry published");
        Ok(errors)
    }

    pub fn apply(&self, url: &str, html: &str) -> Option<Value> {
        self.snapshot().apply_html(url, html)
    }
}
