use crate::error::InvalidPath;
use std::{fmt, str::FromStr};

const SEPARATOR: char = '/';

/// A validated, absolute path to a node in the namespace.
///
/// Paths are `/`-separated sequences of non-empty segments. The root path is `/` and has no
/// segments. Construction rejects anything the service would reject instead of silently fixing
/// it up, so a `Path` always renders back to exactly the string it was parsed from.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Path(String);

impl Path {
    /// The root of the namespace.
    pub fn root() -> Self {
        Path(SEPARATOR.to_string())
    }

    /// Parse and validate an absolute path string.
    pub fn parse(path: &str) -> Result<Self, InvalidPath> {
        if !path.starts_with(SEPARATOR) {
            return Err(InvalidPath::new(path, "path must be absolute"));
        }
        if path.len() == 1 {
            return Ok(Path::root());
        }
        if path.ends_with(SEPARATOR) {
            return Err(InvalidPath::new(path, "path must not end with a separator"));
        }
        for segment in path[1..].split(SEPARATOR) {
            check_segment(path, segment)?;
        }
        Ok(Path(path.to_string()))
    }

    /// Whether this is the root path.
    pub fn is_root(&self) -> bool {
        self.0.len() == 1
    }

    /// The path rendered as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The last segment of the path, or the empty string for the root.
    pub fn name(&self) -> &str {
        match self.0.rfind(SEPARATOR) {
            Some(i) => &self.0[i + 1..],
            None => "",
        }
    }

    /// The segments of the path, from the root downwards.
    pub fn parts(&self) -> impl Iterator<Item = &str> {
        self.0[1..].split(SEPARATOR).filter(|s| !s.is_empty())
    }

    /// The parent of this path, or `None` for the root.
    pub fn parent(&self) -> Option<Path> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind(SEPARATOR) {
            Some(0) => Some(Path::root()),
            Some(i) => Some(Path(self.0[..i].to_string())),
            None => None,
        }
    }

    /// Append a single segment to this path.
    pub fn child(&self, segment: &str) -> Result<Path, InvalidPath> {
        let mut joined = self.0.clone();
        if !self.is_root() {
            joined.push(SEPARATOR);
        }
        joined.push_str(segment);
        if segment.contains(SEPARATOR) {
            return Err(InvalidPath::new(&joined, "segment must not contain a separator"));
        }
        check_segment(&joined, segment)?;
        Ok(Path(joined))
    }

    /// Resolve `relative` below this path, treating `relative` as if this path were its root.
    pub fn resolve(&self, relative: &Path) -> Path {
        if self.is_root() {
            relative.clone()
        } else if relative.is_root() {
            self.clone()
        } else {
            Path(format!("{}{}", self.0, relative.0))
        }
    }

    /// The inverse of [`Path::resolve`]: strip this path off the front of `full`.
    ///
    /// Returns `None` if `full` does not lie at or below this path.
    pub fn strip(&self, full: &str) -> Option<Path> {
        if self.is_root() {
            return Path::parse(full).ok();
        }
        let rest = full.strip_prefix(self.0.as_str())?;
        if rest.is_empty() {
            Some(Path::root())
        } else if rest.starts_with(SEPARATOR) {
            Path::parse(rest).ok()
        } else {
            None
        }
    }

    /// All proper ancestors of this path, from the root downwards, excluding the root itself.
    pub(crate) fn ancestors(&self) -> Vec<Path> {
        let mut ancestors = Vec::new();
        let mut current = self.parent();
        while let Some(p) = current {
            if p.is_root() {
                break;
            }
            current = p.parent();
            ancestors.push(p);
        }
        ancestors.reverse();
        ancestors
    }
}

fn check_segment(path: &str, segment: &str) -> Result<(), InvalidPath> {
    if segment.is_empty() {
        return Err(InvalidPath::new(path, "empty segment"));
    }
    if segment == "." || segment == ".." {
        return Err(InvalidPath::new(path, "relative segment"));
    }
    // same character ranges the service refuses in node names
    if segment.chars().any(|c| {
        c == '\u{0}'
            || ('\u{1}'..='\u{1f}').contains(&c)
            || ('\u{7f}'..='\u{9f}').contains(&c)
            || ('\u{e000}'..='\u{f8ff}').contains(&c)
            || ('\u{fff0}'..='\u{ffff}').contains(&c)
    }) {
        return Err(InvalidPath::new(path, "invalid character"));
    }
    Ok(())
}

impl FromStr for Path {
    type Err = InvalidPath;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Path::parse(s)
    }
}

impl AsRef<str> for Path {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({:?})", self.0)
    }
}
