//! Configuration loader and macro-expansion pipeline (spec §4.2, §6): reads
//! the declarative configuration, validates it, substitutes macros, and
//! produces the immutable [`modelgate_types::Catalog`] the scheduler
//! consumes.

pub mod build;
pub mod load;
pub mod raw;
pub mod value;
pub mod watch;

pub use build::{BuildError, DiscoveredEntry};
pub use load::{CliOverrides, LoadError};
pub use raw::RawConfig;
pub use watch::ConfigWatcher;

/// Converts a [`modelgate_catalog::CatalogBuild`] (filesystem walk result)
/// into the `{canonical -> DiscoveredEntry}` map `build::build` expects,
/// skipping entries whose walk reported an error (e.g. duplicate names).
pub fn discovered_from_walk(
    walk: &modelgate_catalog::CatalogBuild,
) -> std::collections::BTreeMap<String, DiscoveredEntry> {
    walk.models
        .iter()
        .filter(|(_, info)| info.error.is_none())
        .map(|(name, info)| {
            (
                name.clone(),
                DiscoveredEntry {
                    artifact_path: info.path.display().to_string(),
                    flags: info.flags.clone(),
                },
            )
        })
        .collect()
}
