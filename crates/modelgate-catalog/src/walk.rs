//! Recursive filesystem walk that discovers worker artifacts and builds
//! the `{canonical name → ModelInfo}` map (spec §4.1).

use crate::name::{derive_canonical, split_ampersand_flags};
use crate::params::ParamsOverride;
use crate::script::{self, SHELL_EXTENSIONS};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// A discovered artifact, keyed by its derived canonical name in
/// `CatalogBuild::models`. Serializes to the `GET /models` response shape
/// of spec §6: `{path, cmd, size, origin, error?, params?}`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ModelInfo {
    pub path: PathBuf,
    pub size: u64,
    /// Command-line flags recovered from a sibling script or an
    /// ampersand-encoded stem, with `$DIR` already substituted.
    #[serde(rename = "cmd")]
    pub flags: Option<String>,
    /// The sibling script's path, when rule 1 applied.
    pub origin: Option<PathBuf>,
    pub params: Option<ParamsOverride>,
    pub error: Option<String>,
}

#[derive(Debug, Default)]
pub struct CatalogBuild {
    pub models: BTreeMap<String, ModelInfo>,
    pub warnings: Vec<String>,
}

fn multipart_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?P<base>.*)-(?P<part>\d{5})-of-(?P<total>\d{5})$").unwrap())
}

/// Walks every root in `roots` (colon-separated) for files whose extension
/// matches `artifact_suffix` (e.g. `"gguf"`), deriving a canonical name and
/// `ModelInfo` for each. Unreadable directories and sibling scripts are
/// logged and skipped rather than aborting the walk.
pub fn build(roots: &str, artifact_suffix: &str, min_bytes: u64) -> CatalogBuild {
    let mut out = CatalogBuild::default();
    let mut params_by_dir: BTreeMap<PathBuf, BTreeMap<String, ParamsOverride>> = BTreeMap::new();

    for root in roots.split(':').filter(|s| !s.is_empty()) {
        let walker = walkdir::WalkDir::new(root).into_iter().filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(err) => {
                out.warnings.push(format!("unreadable path under {root}: {err}"));
                None
            }
        });

        for entry in walker {
            if entry.file_name() == "params.yml" {
                match crate::params::load(entry.path()) {
                    Ok(parsed) => {
                        let dir = entry.path().parent().unwrap_or(Path::new("")).to_path_buf();
                        params_by_dir.insert(dir, parsed);
                    }
                    Err(e) => out.warnings.push(format!("params.yml parse error: {e}")),
                }
                continue;
            }

            if !entry.file_type().is_file() {
                continue;
            }
            let Some(ext) = entry.path().extension().and_then(|e| e.to_str()) else {
                continue;
            };
            if !ext.eq_ignore_ascii_case(artifact_suffix) {
                continue;
            }

            let Ok(meta) = entry.metadata() else {
                out.warnings.push(format!("{}: unreadable metadata", entry.path().display()));
                continue;
            };
            if meta.len() < min_bytes {
                out.warnings.push(format!("{}: below minimum size, skipped", entry.path().display()));
                continue;
            }

            let Some(raw_stem) = entry.path().file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let stem = match multipart_re().captures(raw_stem) {
                Some(caps) if &caps["part"] != "00001" => {
                    out.warnings.push(format!(
                        "{}: non-first multi-part artifact, skipped",
                        entry.path().display()
                    ));
                    continue;
                }
                Some(caps) => caps["base"].to_string(),
                None => raw_stem.to_string(),
            };

            let dir = entry.path().parent().unwrap_or(Path::new(""));
            let parent_dir_name = dir.file_name().and_then(|s| s.to_str());

            let (name_stem, flags, origin) = resolve_entry(dir, &stem, artifact_suffix, &mut out.warnings);
            let canonical = derive_canonical(&name_stem, parent_dir_name);

            let flags = flags.map(|f| f.replace("$DIR", &dir.display().to_string()));

            let mut info = ModelInfo {
                path: entry.path().to_path_buf(),
                size: meta.len(),
                flags,
                origin,
                params: None,
                error: None,
            };

            if let Some(existing) = out.models.get(&canonical) {
                if existing.path != info.path {
                    info.error = Some("duplicate".to_string());
                }
            }
            out.models.insert(canonical, info);
        }
    }

    for (dir, overrides) in params_by_dir {
        for (model_name, over_ride) in overrides {
            if let Some(info) = out.models.get_mut(&model_name) {
                info.params = Some(over_ride);
            } else {
                out.warnings.push(format!(
                    "{}: params.yml entry {model_name:?} matches no discovered artifact",
                    dir.display()
                ));
            }
        }
    }

    out
}

/// Applies catalog rules 1-3 in order: sibling script, then ampersand
/// flags, then the bare stem.
fn resolve_entry(
    dir: &Path,
    stem: &str,
    artifact_suffix: &str,
    warnings: &mut Vec<String>,
) -> (String, Option<String>, Option<PathBuf>) {
    for ext in SHELL_EXTENSIONS {
        let candidate = dir.join(format!("{stem}.{ext}"));
        if candidate.is_file() {
            match std::fs::read_to_string(&candidate) {
                Ok(text) => match script::parse(&text) {
                    Some(invocation) => {
                        let path = Path::new(&invocation.artifact_path);
                        let artifact_stem = path
                            .file_stem()
                            .and_then(|s| s.to_str())
                            .unwrap_or(stem)
                            .to_string();
                        return (artifact_stem, Some(invocation.flags), Some(candidate));
                    }
                    None => {
                        warnings.push(format!("{}: no model flag found", candidate.display()));
                    }
                },
                Err(e) => warnings.push(format!("{}: unreadable script: {e}", candidate.display())),
            }
        }
    }
    let _ = artifact_suffix;

    let (name, flags) = split_ampersand_flags(stem);
    (name, flags, None)
}
