//! Normalized remote paths
//!
//! Remote paths are slash-delimited and relative to the storage root.
//! A `RemotePath` keeps them as a list of segments so joins and prefix
//! walks never have to re-split strings.

use crate::error::{Result, UploadError};
use std::fmt;
use std::path::{Component, Path};

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RemotePath {
    segments: Vec<String>,
}

impl RemotePath {
    /// The storage root
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse and normalize a slash-delimited remote path
    ///
    /// Empty segments and `.` are dropped, so `"/docs//a.txt"`, `"docs/a.txt"`
    /// and `"./docs/a.txt/"` are all the same path. `..` is rejected.
    pub fn parse(path: &str) -> Result<Self> {
        let mut segments = Vec::new();
        for segment in path.split('/') {
            match segment {
                "" | "." => continue,
                ".." => {
                    return Err(UploadError::invalid_path(
                        path,
                        "parent segments are not allowed",
                    ))
                }
                s => segments.push(s.to_string()),
            }
        }
        Ok(Self { segments })
    }

    /// Build a remote path from a relative local path
    ///
    /// Only normal components are accepted; the result always uses `/`
    /// regardless of the host separator.
    pub fn from_relative(path: &Path) -> Result<Self> {
        let mut segments = Vec::new();
        for component in path.components() {
            match component {
                Component::Normal(name) => segments.push(name.to_string_lossy().into_owned()),
                Component::CurDir => continue,
                _ => {
                    return Err(UploadError::invalid_path(
                        path.display().to_string(),
                        "local path must be relative and must not leave its base",
                    ))
                }
            }
        }
        Ok(Self { segments })
    }

    /// Path components from the root down, never empty strings or `.`/`..`
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Last segment, `None` for the root
    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Append every segment of `other` beneath this path
    ///
    /// # Arguments
    ///
    /// * `other` - A path relative to `self`
    ///
    /// # Returns
    ///
    /// A new path; `self` is left unchanged
    pub fn join(&self, other: &RemotePath) -> RemotePath {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        RemotePath { segments }
    }

    /// Path of the entry `name` directly beneath this one
    ///
    /// `name` is taken as a single segment and is not parsed.
    pub fn child(&self, name: impl Into<String>) -> RemotePath {
        let mut segments = self.segments.clone();
        segments.push(name.into());
        RemotePath { segments }
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_normalizes() {
        let a = RemotePath::parse("/docs//a.txt").unwrap();
        let b = RemotePath::parse("./docs/a.txt/").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "docs/a.txt");
        assert_eq!(a.file_name(), Some("a.txt"));
    }

    #[test]
    fn test_parse_root() {
        assert!(RemotePath::parse("").unwrap().is_root());
        assert!(RemotePath::parse("/").unwrap().is_root());
        assert_eq!(RemotePath::root().file_name(), None);
    }

    #[test]
    fn test_parse_rejects_parent() {
        let err = RemotePath::parse("docs/../etc").unwrap_err();
        assert!(matches!(err, UploadError::InvalidPath { .. }));
    }

    #[test]
    fn test_join_and_child() {
        let up = RemotePath::parse("up/").unwrap();
        let rel = RemotePath::from_relative(&PathBuf::from("sub").join("y.txt")).unwrap();
        assert_eq!(up.join(&rel).to_string(), "up/sub/y.txt");
        assert_eq!(up.child("x.txt").to_string(), "up/x.txt");
    }

    #[test]
    fn test_from_relative_rejects_parent() {
        assert!(RemotePath::from_relative(Path::new("../x")).is_err());
    }
}
