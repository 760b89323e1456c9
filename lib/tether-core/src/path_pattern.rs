//! Path patterns used to scope middleware.
//!
//! Five matching strategies share one contract: [`PathPattern::matches`] and
//! [`PathPattern::pattern`]. Every strategy except [`PathPattern::Regex`]
//! normalizes the path first: leading and trailing `/` are stripped and empty
//! segments dropped, so `/users//42/` and `users/42` are the same path.
//!
//! | Strategy   | `"/users/*"` style pattern semantics                              |
//! |------------|-------------------------------------------------------------------|
//! | `Contains` | pattern equals one path segment (`"/"` matches everything)        |
//! | `Exact`    | normalized pattern equals normalized path                         |
//! | `Wildcard` | same segment count, `*` matches one segment                       |
//! | `Glob`     | like `Wildcard`, plus `**` matching zero or more segments         |
//! | `Regex`    | full-string match against the raw path                            |

use std::fmt;

use derive_more::{Display, Error};

const SEPARATOR: char = '/';
const ANY_SEGMENT: &str = "*";
const ANY_SEGMENTS: &str = "**";

/// Error returned when a pattern cannot be built.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum PatternError {
    /// Regex patterns must not be empty.
    #[display("empty regex pattern")]
    Empty,
    /// The regex did not compile.
    #[display("invalid regex pattern {pattern:?}: {message}")]
    Invalid {
        /// Source pattern.
        #[error(not(source))]
        pattern: String,
        /// Compiler message.
        message: String,
    },
}

/// Split a path into its non-empty segments.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(SEPARATOR).filter(|segment| !segment.is_empty())
}

/// Normalize a path: strip surrounding separators and collapse empty segments.
///
/// Idempotent: `normalize(&normalize(p)) == normalize(p)`.
#[must_use]
pub fn normalize(path: &str) -> String {
    segments(path).collect::<Vec<_>>().join("/")
}

/// A pattern plus its matching strategy.
#[derive(Clone)]
pub enum PathPattern {
    /// Pattern equals one of the path segments; `"/"` is the global marker.
    Contains(String),
    /// Normalized equality.
    Exact(String),
    /// Segment-wise match where `*` stands for any single segment.
    Wildcard(String),
    /// Like [`PathPattern::Wildcard`] with `**` spanning zero or more segments.
    Glob(String),
    /// Precompiled regular expression, matched against the whole raw path.
    Regex(RegexPattern),
}

/// A compiled, anchored regular expression together with its source text.
#[derive(Clone)]
pub struct RegexPattern {
    source: String,
    compiled: regex::Regex,
}

impl RegexPattern {
    /// Compile the pattern once.
    ///
    /// The expression is anchored on both ends so only full matches count.
    pub fn new(pattern: impl Into<String>) -> Result<Self, PatternError> {
        let source = pattern.into();
        if source.is_empty() {
            return Err(PatternError::Empty);
        }
        let compiled = regex::Regex::new(&format!("^(?:{source})$")).map_err(|e| {
            PatternError::Invalid {
                pattern: source.clone(),
                message: e.to_string(),
            }
        })?;
        Ok(Self { source, compiled })
    }

    /// Full-string match against the raw path.
    #[must_use]
    pub fn is_match(&self, path: &str) -> bool {
        self.compiled.is_match(path)
    }

    /// Source text, without the anchors.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl PathPattern {
    /// Global pattern: matches every path.
    #[must_use]
    pub fn global() -> Self {
        Self::Contains("/".to_string())
    }

    /// Segment membership pattern.
    pub fn contains(pattern: impl Into<String>) -> Self {
        Self::Contains(pattern.into())
    }

    /// Normalized equality pattern.
    pub fn exact(pattern: impl Into<String>) -> Self {
        Self::Exact(pattern.into())
    }

    /// Single-segment wildcard pattern.
    pub fn wildcard(pattern: impl Into<String>) -> Self {
        Self::Wildcard(pattern.into())
    }

    /// Glob pattern with `*` and `**`.
    pub fn glob(pattern: impl Into<String>) -> Self {
        Self::Glob(pattern.into())
    }

    /// Regular expression pattern.
    ///
    /// Fails for an empty or invalid expression.
    pub fn regex(pattern: impl Into<String>) -> Result<Self, PatternError> {
        RegexPattern::new(pattern).map(Self::Regex)
    }

    /// Source text of the pattern.
    #[must_use]
    pub fn pattern(&self) -> &str {
        match self {
            Self::Contains(p) | Self::Exact(p) | Self::Wildcard(p) | Self::Glob(p) => p,
            Self::Regex(regex) => regex.as_str(),
        }
    }

    /// Name of the strategy.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Contains(_) => "contains",
            Self::Exact(_) => "exact",
            Self::Wildcard(_) => "wildcard",
            Self::Glob(_) => "glob",
            Self::Regex(_) => "regex",
        }
    }

    /// Returns `true` when the pattern denotes "match everything".
    ///
    /// That is `Contains("/")` and any glob made only of `**` segments.
    #[must_use]
    pub fn is_global(&self) -> bool {
        match self {
            Self::Contains(p) => normalize(p).is_empty(),
            Self::Glob(p) => {
                let mut parts = segments(p).peekable();
                parts.peek().is_some() && parts.all(|segment| segment == ANY_SEGMENTS)
            }
            Self::Exact(_) | Self::Wildcard(_) | Self::Regex(_) => false,
        }
    }

    /// Returns `true` if `path` satisfies this pattern.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Contains(p) => {
                let needle = normalize(p);
                needle.is_empty() || segments(path).any(|segment| segment == needle)
            }
            Self::Exact(p) => normalize(p) == normalize(path),
            Self::Wildcard(p) => wildcard_match(p, path),
            Self::Glob(p) => {
                let pattern: Vec<&str> = segments(p).collect();
                let path: Vec<&str> = segments(path).collect();
                glob_match(&pattern, &path)
            }
            Self::Regex(regex) => regex.is_match(path),
        }
    }
}

fn segment_matches(pattern: &str, segment: &str) -> bool {
    pattern == ANY_SEGMENT || pattern == segment
}

fn wildcard_match(pattern: &str, path: &str) -> bool {
    let mut pattern = segments(pattern);
    let mut path = segments(path);
    loop {
        match (pattern.next(), path.next()) {
            (None, None) => return true,
            (Some(p), Some(s)) if segment_matches(p, s) => {}
            _ => return false,
        }
    }
}

/// Two-pointer glob match with backtracking on the last `**` seen.
///
/// Worst case is `O(pattern.len() * path.len())`.
fn glob_match(pattern: &[&str], path: &[&str]) -> bool {
    let (mut p, mut s) = (0, 0);
    // (pattern index just after the `**`, path index the `**` currently ends at)
    let mut anchor: Option<(usize, usize)> = None;

    while s < path.len() {
        match (pattern.get(p), path.get(s)) {
            (Some(&ANY_SEGMENTS), _) => {
                p += 1;
                anchor = Some((p, s));
            }
            (Some(expected), Some(segment)) if segment_matches(expected, segment) => {
                p += 1;
                s += 1;
            }
            _ => match anchor {
                Some((after_star, consumed)) => {
                    p = after_star;
                    s = consumed + 1;
                    anchor = Some((after_star, s));
                }
                None => return false,
            },
        }
    }

    pattern
        .get(p..)
        .is_some_and(|rest| rest.iter().all(|segment| *segment == ANY_SEGMENTS))
}

impl fmt::Debug for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", self.kind(), self.pattern())
    }
}

impl fmt::Debug for RegexPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RegexPattern").field(&self.source).finish()
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.pattern())
    }
}

impl PartialEq for PathPattern {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind() && self.pattern() == other.pattern()
    }
}

impl Eq for PathPattern {}
