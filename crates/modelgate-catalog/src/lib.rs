//! Filesystem catalog builder (spec §4.1): walks one or more roots,
//! derives a canonical name per discovered artifact, and folds in
//! `params.yml` overrides and sibling launch scripts.

mod name;
mod params;
mod script;
mod walk;

pub use name::{derive_canonical, split_ampersand_flags};
pub use params::ParamsOverride;
pub use walk::{build, CatalogBuild, ModelInfo};

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// A fixture directory named with a digit, so it never accidentally
    /// satisfies the pure-lowercase parent-prefixing rule in `derive_canonical`.
    fn fixture_root(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let root = dir.path().join("root0");
        fs::create_dir(&root).unwrap();
        root
    }

    #[test]
    fn walks_a_root_and_derives_canonical_names() {
        let dir = tempfile::tempdir().unwrap();
        let root = fixture_root(&dir);
        let a = root.join("ggml-org_gpt-oss-120b-GGUF_gpt-oss-120b-mxfp4.gguf");
        fs::write(&a, vec![0u8; 2048]).unwrap();

        let build = build(root.to_str().unwrap(), "gguf", 1024);
        assert!(build.models.contains_key("ggml-org/gpt-oss-120b"));
        assert_eq!(build.models["ggml-org/gpt-oss-120b"].size, 2048);
    }

    #[test]
    fn skips_files_below_minimum_size() {
        let dir = tempfile::tempdir().unwrap();
        let root = fixture_root(&dir);
        fs::write(root.join("tiny_model.gguf"), vec![0u8; 10]).unwrap();

        let build = build(root.to_str().unwrap(), "gguf", 1024);
        assert!(build.models.is_empty());
        assert!(!build.warnings.is_empty());
    }

    #[test]
    fn keeps_only_the_first_part_of_a_multipart_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let root = fixture_root(&dir);
        fs::write(root.join("big-model-00001-of-00002.gguf"), vec![0u8; 2048]).unwrap();
        fs::write(root.join("big-model-00002-of-00002.gguf"), vec![0u8; 2048]).unwrap();

        let build = build(root.to_str().unwrap(), "gguf", 1024);
        assert_eq!(build.models.len(), 1);
        assert!(build.models.contains_key("big-model"));
    }

    #[test]
    fn sibling_script_overrides_flag_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let root = fixture_root(&dir);
        fs::write(root.join("modelx.gguf"), vec![0u8; 2048]).unwrap();
        fs::write(
            root.join("modelx.sh"),
            format!(
                "#!/bin/sh\nllama-server -m {}/modelx.gguf -c 8192\n",
                root.display()
            ),
        )
        .unwrap();

        let build = build(root.to_str().unwrap(), "gguf", 1024);
        let entry = build.models.values().next().unwrap();
        assert_eq!(entry.flags.as_deref(), Some("llama-server -c 8192"));
        assert!(entry.origin.is_some());
    }

    #[test]
    fn params_yml_overrides_are_merged_by_model_name() {
        let dir = tempfile::tempdir().unwrap();
        let root = fixture_root(&dir);
        fs::write(root.join("modely.gguf"), vec![0u8; 2048]).unwrap();
        fs::write(
            root.join("params.yml"),
            "modely:\n  display_name: Model Y\n  context_size: 4096\n",
        )
        .unwrap();

        let build = build(root.to_str().unwrap(), "gguf", 1024);
        let entry = build.models.get("modely").unwrap();
        let params = entry.params.as_ref().unwrap();
        assert_eq!(params.display_name.as_deref(), Some("Model Y"));
        assert_eq!(params.context_size, Some(4096));
    }
}
