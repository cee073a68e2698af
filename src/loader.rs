//! Template loading for `include`.
//!
//! Loading is split in two steps so the context can consult its parsed-tree
//! cache in between: [`TemplateLoader::resolve`] turns the path written in a
//! template into a canonical identifier, and [`TemplateLoader::load`] reads and
//! parses the template behind that identifier.

use std::io;

use thiserror::Error;

use crate::ast::Template;
use crate::error::ParseError;

#[cfg(feature = "parser")]
use rustc_hash::FxHashMap;
#[cfg(feature = "parser")]
use std::path::{Path, PathBuf};

/// Options applied when parsing template source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParserOptions {
    /// Drop the first newline following a statement tag.
    pub trim_blocks: bool,
}

impl ParserOptions {
    /// Options with `trim_blocks` enabled.
    pub fn trim_blocks() -> Self {
        Self { trim_blocks: true }
    }
}

/// Why a template could not be loaded.
#[derive(Error, Debug)]
pub enum LoadError {
    /// The context has no loader configured.
    #[error("no template loader configured")]
    NoLoader,

    /// Nothing exists at the resolved path.
    #[error("template not found: {0}")]
    NotFound(String),

    /// The path resolves outside the loader's root.
    #[error("path escapes the template root: {0}")]
    OutsideRoot(String),

    /// Reading the template failed.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Resolved path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The template source did not parse.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Source of templates for `include`.
pub trait TemplateLoader {
    /// Canonical identifier for `path` as written in the template executing
    /// as `includer`. The identifier keys the parsed-tree cache.
    fn resolve(&self, path: &str, includer: Option<&str>) -> Result<String, LoadError>;

    /// Read and parse the template identified by `resolved`.
    fn load(&self, resolved: &str, options: &ParserOptions) -> Result<Template, LoadError>;
}

/// Join `path` onto the directory of `includer` and normalize `.`/`..`
/// segments. A leading `/` makes `path` relative to the root instead.
/// Returns `None` when the result would climb above the root.
pub(crate) fn join_relative(includer: Option<&str>, path: &str) -> Option<String> {
    let base = match includer {
        Some(includer) if !path.starts_with('/') => includer.rsplit_once('/').map_or("", |(dir, _)| dir),
        _ => "",
    };
    let mut segments: Vec<&str> = Vec::new();
    for segment in base.split('/').chain(path.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }
    Some(segments.join("/"))
}

/// Loader over an in-memory map of template names to source.
///
/// # Examples
///
/// ```
/// use templet::{MemoryLoader, ParserOptions, TemplateLoader};
///
/// let loader = MemoryLoader::new()
///     .with("layout.html", "<main>{{ body }}</main>")
///     .with("partials/nav.html", "nav");
///
/// let resolved = loader.resolve("nav.html", Some("partials/index.html")).unwrap();
/// assert_eq!(resolved, "partials/nav.html");
/// assert!(loader.load(&resolved, &ParserOptions::default()).is_ok());
/// ```
#[cfg(feature = "parser")]
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    sources: FxHashMap<String, String>,
}

#[cfg(feature = "parser")]
impl MemoryLoader {
    /// Create an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a template, builder style.
    pub fn with(mut self, name: &str, source: &str) -> Self {
        self.insert(name, source);
        self
    }

    /// Add or replace a template.
    pub fn insert(&mut self, name: &str, source: &str) {
        let name = join_relative(None, name).unwrap_or_else(|| name.to_owned());
        self.sources.insert(name, source.to_owned());
    }
}

#[cfg(feature = "parser")]
impl TemplateLoader for MemoryLoader {
    fn resolve(&self, path: &str, includer: Option<&str>) -> Result<String, LoadError> {
        let relative =
            join_relative(includer, path).ok_or_else(|| LoadError::OutsideRoot(path.to_owned()))?;
        if self.sources.contains_key(&relative) {
            return Ok(relative);
        }
        match join_relative(None, path) {
            Some(absolute) if self.sources.contains_key(&absolute) => Ok(absolute),
            _ => Err(LoadError::NotFound(relative)),
        }
    }

    fn load(&self, resolved: &str, options: &ParserOptions) -> Result<Template, LoadError> {
        let source = self
            .sources
            .get(resolved)
            .ok_or_else(|| LoadError::NotFound(resolved.to_owned()))?;
        Ok(crate::parser::parse_with(resolved, source, options)?)
    }
}

/// Loader reading templates from a directory tree.
///
/// Relative include paths resolve against the including template's directory;
/// paths starting with `/` resolve against the root. Paths may not leave the
/// root.
#[cfg(feature = "parser")]
#[derive(Debug, Clone)]
pub struct FileLoader {
    root: PathBuf,
}

#[cfg(feature = "parser")]
impl FileLoader {
    /// Create a loader rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(feature = "parser")]
impl TemplateLoader for FileLoader {
    fn resolve(&self, path: &str, includer: Option<&str>) -> Result<String, LoadError> {
        join_relative(includer, path).ok_or_else(|| LoadError::OutsideRoot(path.to_owned()))
    }

    fn load(&self, resolved: &str, options: &ParserOptions) -> Result<Template, LoadError> {
        let full = self.root.join(resolved);
        let source = std::fs::read_to_string(&full).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => LoadError::NotFound(resolved.to_owned()),
            _ => LoadError::Io {
                path: resolved.to_owned(),
                source: err,
            },
        })?;
        Ok(crate::parser::parse_with(resolved, &source, options)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_relative() {
        assert_eq!(join_relative(None, "a.html").as_deref(), Some("a.html"));
        assert_eq!(
            join_relative(Some("pages/index.html"), "nav.html").as_deref(),
            Some("pages/nav.html")
        );
        assert_eq!(
            join_relative(Some("pages/index.html"), "../base.html").as_deref(),
            Some("base.html")
        );
        assert_eq!(
            join_relative(Some("pages/index.html"), "/base.html").as_deref(),
            Some("base.html")
        );
        assert_eq!(
            join_relative(Some("pages/./x/index.html"), "./y.html").as_deref(),
            Some("pages/x/y.html")
        );
        assert_eq!(join_relative(Some("index.html"), "../secret"), None);
    }

    #[cfg(feature = "parser")]
    #[test]
    fn test_memory_loader_falls_back_to_root() {
        let loader = MemoryLoader::new().with("base.html", "base");
        assert_eq!(
            loader.resolve("base.html", Some("pages/index.html")).unwrap(),
            "base.html"
        );
        assert!(matches!(
            loader.resolve("missing.html", Some("pages/index.html")),
            Err(LoadError::NotFound(path)) if path == "pages/missing.html"
        ));
    }

    #[cfg(feature = "parser")]
    #[test]
    fn test_memory_loader_reports_parse_errors() {
        let loader = MemoryLoader::new().with("bad.html", "{% if %}");
        assert!(matches!(
            loader.load("bad.html", &ParserOptions::default()),
            Err(LoadError::Parse(_))
        ));
    }

    #[cfg(feature = "parser")]
    #[test]
    fn test_file_loader_rejects_escape() {
        let loader = FileLoader::new("/srv/templates");
        assert!(matches!(
            loader.resolve("../../etc/passwd", Some("index.html")),
            Err(LoadError::OutsideRoot(_))
        ));
        assert_eq!(loader.root(), Path::new("/srv/templates"));
    }

    #[cfg(feature = "parser")]
    #[test]
    fn test_file_loader_missing_file() {
        let dir = std::env::temp_dir().join("templet-loader-missing");
        let loader = FileLoader::new(dir.clone());
        assert!(matches!(
            loader.load("nope.html", &ParserOptions::default()),
            Err(LoadError::NotFound(_))
        ));
    }
}
