//! Project-wide, type-safe names and data structures that identify
//! model-gateway concepts and are referenced from multiple crates.

mod catalog;
mod error;
mod group;
mod model;
mod request;
pub mod supervisor;

pub use catalog::{Catalog, CatalogDiff};
pub use error::{ErrorEnvelope, Kind};
pub use group::GroupEntry;
pub use model::ModelEntry;
pub use request::RequestContext;
pub use supervisor::{State, Transition};

/// The unique, internal identifier of a catalog entry. Aliases resolve to
/// this through the catalog's alias map; it is never itself an alias.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct CanonicalName(String);

impl CanonicalName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::ops::Deref for CanonicalName {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CanonicalName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CanonicalName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CanonicalName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The identifier of a declared group. `"(default)"` is reserved: it names
/// the group auto-created to hold every catalog entry not named by any
/// other group (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct GroupId(String);

impl GroupId {
    pub const DEFAULT: &'static str = "(default)";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn default_group() -> Self {
        Self(Self::DEFAULT.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        self.0 == Self::DEFAULT
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A monotonically increasing catalog generation, bumped on each successful
/// config reload (spec §3 "Catalog version").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CatalogVersion(pub u64);

impl CatalogVersion {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for CatalogVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
