//! `params.yml` companion files: per-directory overrides keyed by model
//! name, merged into the walk result post-hoc.

use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ParamsOverride {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub flags: Option<String>,
    #[serde(default)]
    pub context_size: Option<u32>,
    #[serde(default)]
    pub error: Option<String>,
}

pub type ParamsFile = BTreeMap<String, ParamsOverride>;

/// Parses a `params.yml` file. A parse failure is reported to the caller
/// rather than propagated, per the catalog's "no filesystem error aborts
/// the walk" failure semantics.
pub fn load(path: &Path) -> Result<ParamsFile, String> {
    let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_yaml::from_str(&text).map_err(|e| format!("{path:?}: {e}"))
}
