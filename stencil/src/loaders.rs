//! Template loaders.
//!
//! A [`Loader`] turns the path named by `extends`, `include` or `import`
//! into template source. [`FileSystem`] reads files relative to a base
//! directory or to the referencing template; [`Memory`] serves templates
//! from an in-memory table, which keeps tests and embedded usage free of
//! filesystem access.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::Error;

pub trait Loader: Send + Sync {
    /// Resolves a template reference against the file it was referenced
    /// from, producing the canonical path used for loading and caching.
    fn resolve(&self, to: &str, from: Option<&str>) -> String;

    /// Loads the source of a resolved template path.
    fn load(&self, path: &str) -> Result<String, Error>;
}

/// Loads templates from disk.
#[derive(Debug, Default)]
pub struct FileSystem {
    base: Option<PathBuf>,
}

impl FileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// All template references resolve relative to `base` instead of the
    /// referencing file.
    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        Self {
            base: Some(base.into()),
        }
    }
}

impl Loader for FileSystem {
    fn resolve(&self, to: &str, from: Option<&str>) -> String {
        let joined = match (&self.base, from) {
            (Some(base), _) => base.join(to),
            (None, Some(from)) => Path::new(from)
                .parent()
                .unwrap_or_else(|| Path::new(""))
                .join(to),
            (None, None) => PathBuf::from(to),
        };
        normalize(&joined.to_string_lossy())
    }

    fn load(&self, path: &str) -> Result<String, Error> {
        debug!("loading template from {path}");
        std::fs::read_to_string(path).map_err(|err| Error::Load {
            path: path.to_owned(),
            source: Some(err),
        })
    }
}

/// Serves templates from an in-memory map keyed by path.
#[derive(Debug, Default)]
pub struct Memory {
    templates: HashMap<String, String>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, source: impl Into<String>) {
        self.templates.insert(path.into(), source.into());
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Memory {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            templates: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl Loader for Memory {
    fn resolve(&self, to: &str, from: Option<&str>) -> String {
        if to.starts_with('/') {
            return normalize(to);
        }
        match from {
            Some(from) => {
                let dir = match from.rfind('/') {
                    Some(at) => &from[..at],
                    None => "",
                };
                normalize(&format!("{dir}/{to}"))
            }
            None => normalize(to),
        }
    }

    fn load(&self, path: &str) -> Result<String, Error> {
        debug!("loading template {path} from memory");
        self.templates
            .get(path)
            .or_else(|| self.templates.get(path.trim_start_matches('/')))
            .cloned()
            .ok_or_else(|| Error::Load {
                path: path.to_owned(),
                source: None,
            })
    }
}

/// Lexically folds `.` and `..` segments out of a slash-separated path.
fn normalize(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for seg in path.split(['/', '\\']) {
        match seg {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            seg => parts.push(seg),
        }
    }
    let joined = parts.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("a/b/../c"), "a/c");
        assert_eq!(normalize("./a//b"), "a/b");
        assert_eq!(normalize("/a/./b"), "/a/b");
        assert_eq!(normalize("../a"), "../a");
    }

    #[test]
    fn test_memory_resolve_relative_to_referencing_file() {
        let loader = Memory::new();
        assert_eq!(
            loader.resolve("partial.html", Some("/pages/index.html")),
            "/pages/partial.html"
        );
        assert_eq!(loader.resolve("/base.html", Some("/pages/index.html")), "/base.html");
    }

    #[test]
    fn test_memory_load() {
        let loader: Memory = [("a.html", "A")].into_iter().collect();
        assert_eq!(loader.load("a.html").unwrap(), "A");
        assert_eq!(loader.load("/a.html").unwrap(), "A");
        assert!(loader.load("b.html").is_err());
    }

    #[test]
    fn test_filesystem_resolve() {
        let loader = FileSystem::new();
        assert_eq!(
            loader.resolve("b.html", Some("dir/a.html")),
            "dir/b.html"
        );
        let based = FileSystem::with_base("views");
        assert_eq!(based.resolve("b.html", Some("dir/a.html")), "views/b.html");
    }
}
