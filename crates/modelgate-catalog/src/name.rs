//! Canonical name derivation for catalog artifacts (see `derive_canonical`)
//! and flag-string extraction from stems that embed `key=value` pairs.

use regex::Regex;
use std::sync::OnceLock;

/// Marks repository-format tags embedded in flattened download filenames,
/// e.g. `ggml-org_gpt-oss-120b-GGUF_gpt-oss-120b-mxfp4`.
const ARTIFACT_FAMILY_TAG: &str = "GGUF";

fn beautify_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([a-z]+)(-[a-z]{3,4})?_").unwrap())
}

fn dir_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([a-z]+)(-[a-z]{3,4})?$").unwrap())
}

/// True if `s` contains at least one alphabetic character and every
/// alphabetic character in it is uppercase. Used to distinguish a
/// quantisation marker (`Q4_K_M`, `UD-Q4_K_XL`) from an ordinary lowercase
/// model-name fragment (`mxfp4`) that happens to follow the same position.
fn looks_like_quantisation(s: &str) -> bool {
    let mut saw_alpha = false;
    for c in s.chars() {
        if c.is_ascii_alphabetic() {
            saw_alpha = true;
            if !c.is_ascii_uppercase() {
                return false;
            }
        }
    }
    saw_alpha
}

/// Derives a canonical model name from an artifact's file stem (the
/// filename with its extension already removed), following the rules of
/// the catalog builder. `parent_dir_name` is the name of the immediate
/// parent directory, used only by the third (prefixing) rule.
pub fn derive_canonical(stem: &str, parent_dir_name: Option<&str>) -> String {
    let canonical = if let Some(name) = family_tag_split(stem) {
        name
    } else if let Some(name) = beautify_first_underscore(stem) {
        name
    } else if let Some(parent) = parent_dir_name {
        if dir_prefix_re().is_match(parent) && pure_run_len(parent) < 10 {
            format!("{parent}/{stem}")
        } else {
            stem.to_string()
        }
    } else {
        stem.to_string()
    };

    cleanup_family_tag_residue(&canonical)
}

fn pure_run_len(segment: &str) -> usize {
    segment.chars().take_while(|c| c.is_ascii_lowercase()).count()
}

/// Rule 1: `<group>_<model>-GGUF_<filename>` style flattened downloads.
fn family_tag_split(stem: &str) -> Option<String> {
    let marker = format!("{ARTIFACT_FAMILY_TAG}_");
    let idx = stem.find(&marker)?;

    let left = stem[..idx].trim_end_matches(['-', '_']);
    let right = &stem[idx + marker.len()..];

    let us = left.find('_')?;
    let group = &left[..us];
    let model = &left[us + 1..];
    if group.is_empty() || model.is_empty() {
        return None;
    }

    let pos = right.find(model)?;
    let after = right[pos + model.len()..].trim_start_matches(['-', '_']);

    if !after.is_empty() && looks_like_quantisation(after) {
        Some(format!("{group}/{model}:{after}"))
    } else {
        Some(format!("{group}/{model}"))
    }
}

/// Rule 2: replace the first underscore with a slash when the segment that
/// precedes it is a short lowercase token (optionally hyphenated).
fn beautify_first_underscore(stem: &str) -> Option<String> {
    let caps = beautify_prefix_re().captures(stem)?;
    let pure_run = caps.get(1).unwrap().as_str();
    if pure_run.len() >= 10 {
        return None;
    }
    let us = caps.get(0).unwrap().as_str().len() - 1;
    let mut out = String::with_capacity(stem.len());
    out.push_str(&stem[..us]);
    out.push('/');
    out.push_str(&stem[us + 1..]);
    Some(out)
}

/// Rule 4: trailing cleanup applied regardless of which branch produced the
/// name, so a family tag that survived untouched still gets collapsed.
fn cleanup_family_tag_residue(name: &str) -> String {
    let trailing = format!("-{ARTIFACT_FAMILY_TAG}");
    let mut out = name.strip_suffix(trailing.as_str()).unwrap_or(name).to_string();

    let underscore_marker = format!("-{ARTIFACT_FAMILY_TAG}_");
    let colon_marker = format!("-{ARTIFACT_FAMILY_TAG}:");
    out = out.replace(&underscore_marker, ":");
    out = out.replace(&colon_marker, ":");

    while out.ends_with(':') {
        out.pop();
    }
    out
}

/// Rule 2 of flag derivation (§4.1): an ampersand-delimited stem splits
/// into a truncated name and `key=value` pairs, each becoming a `-key
/// value` token in the flag string.
pub fn split_ampersand_flags(stem: &str) -> (String, Option<String>) {
    let Some(idx) = stem.find('&') else {
        return (stem.to_string(), None);
    };
    let name = stem[..idx].to_string();
    let mut tokens = Vec::new();
    for pair in stem[idx + 1..].split('&') {
        if pair.is_empty() {
            continue;
        }
        match pair.split_once('=') {
            Some((k, v)) => {
                tokens.push(format!("-{k}"));
                tokens.push(v.to_string());
            }
            None => tokens.push(format!("-{pair}")),
        }
    }
    if tokens.is_empty() {
        (name, None)
    } else {
        (name, Some(tokens.join(" ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_tag_drops_non_quant_suffix() {
        assert_eq!(
            derive_canonical("ggml-org_gpt-oss-120b-GGUF_gpt-oss-120b-mxfp4", None),
            "ggml-org/gpt-oss-120b"
        );
    }

    #[test]
    fn family_tag_keeps_quant_suffix() {
        assert_eq!(
            derive_canonical(
                "unsloth_Devstral-2-123B-Instruct-2512-GGUF_UD-Q4_K_XL_Devstral-2-123B-Instruct-2512-UD-Q4_K_XL",
                None
            ),
            "unsloth/Devstral-2-123B-Instruct-2512:UD-Q4_K_XL"
        );
    }

    #[test]
    fn short_lowercase_prefix_becomes_namespace() {
        assert_eq!(derive_canonical("team-org_model_name", None), "team-org/model_name");
    }

    #[test]
    fn long_lowercase_prefix_is_left_alone() {
        assert_eq!(derive_canonical("abcdefghij_fr_10", None), "abcdefghij_fr_10");
    }

    #[test]
    fn beautification_applies_to_basename_under_any_parent() {
        assert_eq!(
            derive_canonical("example-com_granite3.3_8b_Q4_K_M", Some("folder")),
            "example-com/granite3.3_8b_Q4_K_M"
        );
    }

    #[test]
    fn ampersand_pairs_become_flag_tokens() {
        let (name, flags) = split_ampersand_flags("model2&foo=1&bar=2");
        assert_eq!(name, "model2");
        assert_eq!(flags.as_deref(), Some("-foo 1 -bar 2"));
    }

    #[test]
    fn stem_without_ampersand_has_no_flags() {
        let (name, flags) = split_ampersand_flags("plain-model");
        assert_eq!(name, "plain-model");
        assert_eq!(flags, None);
    }

    #[test]
    fn parent_dir_prefixing_requires_a_short_lowercase_name() {
        assert_eq!(
            derive_canonical("Some_Weird_STEM", Some("models")),
            "models/Some_Weird_STEM"
        );
        assert_eq!(
            derive_canonical("Some_Weird_STEM", Some("ReallyLongParentNameHere")),
            "Some_Weird_STEM"
        );
    }
}
