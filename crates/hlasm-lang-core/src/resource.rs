//! Resource locations — opaque, normalized URIs.
//!
//! The analyzer never touches the filesystem; it identifies documents and
//! library members by [`ResourceLocation`] values handed in by the host.
//! Equality is byte equality of the normalized form.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A normalized URI identifying a document or library member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceLocation(String);

impl ResourceLocation {
    /// Create a location, lexically normalizing the path part
    /// (collapses `.` and `..` segments and duplicate slashes).
    pub fn new(uri: impl Into<String>) -> Self {
        Self(normalize(&uri.into()))
    }

    /// The normalized URI text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this location is the empty location.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Resolve `relative` against this location (RFC 3986 relative
    /// resolution, lexical only). Absolute references replace the whole
    /// location.
    pub fn join(&self, relative: &str) -> ResourceLocation {
        if relative.contains("://") || relative.is_empty() {
            return ResourceLocation::new(relative);
        }
        if let Some(rest) = relative.strip_prefix('/') {
            // Absolute path: keep scheme+authority, replace the path.
            let (prefix, _) = split_path(&self.0);
            return ResourceLocation::new(format!("{prefix}/{rest}"));
        }
        let base = match self.0.rfind('/') {
            Some(idx) => &self.0[..idx],
            None => &self.0,
        };
        ResourceLocation::new(format!("{base}/{relative}"))
    }

    /// The parent location (everything up to the last `/`).
    pub fn parent(&self) -> ResourceLocation {
        match self.0.rfind('/') {
            Some(idx) => ResourceLocation(self.0[..idx].to_string()),
            None => ResourceLocation::default(),
        }
    }

    /// The last path segment, if any.
    pub fn filename(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        }
    }

    /// Whether `self` is a prefix of `other` on segment boundaries.
    pub fn is_prefix_of(&self, other: &ResourceLocation) -> bool {
        other.0.starts_with(&self.0)
            && (other.0.len() == self.0.len() || other.0.as_bytes().get(self.0.len()) == Some(&b'/'))
    }
}

/// Split a URI into `(scheme://authority, path)`.
fn split_path(uri: &str) -> (&str, &str) {
    if let Some(scheme_end) = uri.find("://") {
        let after = &uri[scheme_end + 3..];
        match after.find('/') {
            Some(idx) => (&uri[..scheme_end + 3 + idx], &after[idx..]),
            None => (uri, ""),
        }
    } else {
        ("", uri)
    }
}

/// Lexically normalize the path portion of a URI.
fn normalize(uri: &str) -> String {
    let (prefix, path) = split_path(uri);
    if path.is_empty() {
        return uri.to_string();
    }

    let absolute = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|s| *s != "..") {
                    segments.pop();
                } else if !absolute {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }

    let mut out = String::with_capacity(uri.len());
    out.push_str(prefix);
    if absolute {
        out.push('/');
    }
    out.push_str(&segments.join("/"));
    out
}

impl fmt::Display for ResourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization() {
        assert_eq!(
            ResourceLocation::new("file:///a/./b//c/../d").as_str(),
            "file:///a/b/d"
        );
        assert_eq!(ResourceLocation::new("file:///a/b/").as_str(), "file:///a/b");
    }

    #[test]
    fn test_equality_is_normalized() {
        assert_eq!(
            ResourceLocation::new("file:///x/../y"),
            ResourceLocation::new("file:///y")
        );
    }

    #[test]
    fn test_join_relative() {
        let base = ResourceLocation::new("file:///lib/main.hlasm");
        assert_eq!(base.join("copy.mac").as_str(), "file:///lib/copy.mac");
        assert_eq!(base.join("../other/m.mac").as_str(), "file:///other/m.mac");
    }

    #[test]
    fn test_join_absolute() {
        let base = ResourceLocation::new("file:///lib/main.hlasm");
        assert_eq!(base.join("/root.mac").as_str(), "file:///root.mac");
        assert_eq!(
            base.join("scheme://h/p").as_str(),
            "scheme://h/p"
        );
    }

    #[test]
    fn test_parent_and_filename() {
        let loc = ResourceLocation::new("file:///lib/main.hlasm");
        assert_eq!(loc.parent().as_str(), "file:///lib");
        assert_eq!(loc.filename(), "main.hlasm");
    }

    #[test]
    fn test_prefix() {
        let a = ResourceLocation::new("file:///lib");
        assert!(a.is_prefix_of(&ResourceLocation::new("file:///lib/x")));
        assert!(!a.is_prefix_of(&ResourceLocation::new("file:///libx/y")));
    }
}
