//! Common type definitions.

use std::fmt;

/// Identifier of one backend bucket that the virtual bucket fans out to.
///
/// Opaque to the routing core: it is hashed for ring placement and handed to
/// the storage backend untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Partition(String);

impl Partition {
    /// Create a partition identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Partition {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Partition {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for Partition {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Build a partition list from string-like identifiers.
#[must_use]
pub fn partitions<I, S>(ids: I) -> Vec<Partition>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ids.into_iter().map(Partition::new).collect()
}
