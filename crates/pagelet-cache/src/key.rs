use std::fmt::{self, Write};
use std::sync::Arc;

/// Stable identifier for one logical asynchronous operation.
///
/// All readers using the same key share a single in-flight operation, so the
/// key must fully describe the resource it denotes. Keys are cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey(Arc<str>);

impl ResourceKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Creates a [`ResourceKeyBuilder`] for assembling a structured key.
    pub fn builder() -> ResourceKeyBuilder {
        ResourceKeyBuilder::default()
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceKey {
    fn from(key: &str) -> Self {
        Self(key.into())
    }
}

impl From<String> for ResourceKey {
    fn from(key: String) -> Self {
        Self(key.into())
    }
}

/// A builder for [`ResourceKey`]s.
///
/// Keys are assembled segment by segment, with separator characters inside a
/// segment replaced so they cannot collide with the segment structure. The
/// builder also implements [`std::fmt::Write`] for appending formatted
/// metadata verbatim. Input must be **stable**, it decides cache identity.
#[derive(Debug, Default)]
pub struct ResourceKeyBuilder {
    raw: String,
}

impl ResourceKeyBuilder {
    /// Appends one `/`-separated segment.
    pub fn segment(mut self, segment: &str) -> Self {
        if !self.raw.is_empty() {
            self.raw.push('/');
        }
        self.raw.push_str(&safe_segment(segment));
        self
    }

    /// Finalize the [`ResourceKey`].
    pub fn build(self) -> ResourceKey {
        ResourceKey(self.raw.into())
    }
}

impl fmt::Write for ResourceKeyBuilder {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.raw.write_str(s)
    }
}

fn safe_segment(s: &str) -> String {
    s.replace(['/', '\\', ':'], "_")
}
