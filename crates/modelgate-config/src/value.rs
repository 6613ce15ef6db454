//! Macro values and the substitution engine (spec §4.2).

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// `${PORT}` is substituted by the port-allocation pass; `${MODEL_ID}` by
/// the canonical name of the entry being built. Neither may be declared as
/// a user macro name.
pub const RESERVED_NAMES: &[&str] = &["PORT", "MODEL_ID"];

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap())
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^}]*)\}").unwrap())
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum MacroValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl MacroValue {
    pub fn as_display(&self) -> String {
        match self {
            MacroValue::String(s) => s.clone(),
            MacroValue::Integer(i) => i.to_string(),
            MacroValue::Float(f) => f.to_string(),
            MacroValue::Bool(b) => b.to_string(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MacroError {
    #[error("macro name {0:?} must match [A-Za-z0-9_-]+ and be under 64 characters")]
    InvalidName(String),
    #[error("macro name {0:?} is reserved")]
    ReservedName(String),
    #[error("macro {0:?} value exceeds the 1024-character string limit")]
    ValueTooLong(String),
    #[error("macro {0:?} references itself")]
    SelfReference(String),
    #[error("unresolved macro reference(s) in {field:?}: {unresolved:?}")]
    Unresolved {
        field: String,
        unresolved: Vec<String>,
    },
}

/// One (name, value) pair in declaration order. Per-entry macros shadow
/// global macros of the same name: `merge` keeps the global ordering but
/// overrides the value, appending entry-only names at the end so they are
/// the "most recent" for the reverse-order substitution pass below.
#[derive(Debug, Clone, Default)]
pub struct MacroTable(Vec<(String, MacroValue)>);

impl MacroTable {
    pub fn from_ordered(pairs: Vec<(String, MacroValue)>) -> Result<Self, MacroError> {
        for (name, value) in &pairs {
            validate_declaration(name, value)?;
        }
        Ok(Self(pairs))
    }

    pub fn merge_entry_overrides(&self, entry: &MacroTable) -> MacroTable {
        let mut merged: Vec<(String, MacroValue)> = Vec::new();
        let mut seen = std::collections::BTreeSet::new();
        for (name, value) in &self.0 {
            let effective = entry
                .0
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone())
                .unwrap_or_else(|| value.clone());
            seen.insert(name.clone());
            merged.push((name.clone(), effective));
        }
        for (name, value) in &entry.0 {
            if !seen.contains(name) {
                merged.push((name.clone(), value.clone()));
            }
        }
        MacroTable(merged)
    }

    pub fn names(&self) -> std::collections::BTreeSet<String> {
        self.0.iter().map(|(n, _)| n.clone()).collect()
    }

    /// Substitutes every declared macro into `field`, processing macros in
    /// reverse declaration order so that a later macro's raw reference to
    /// an earlier one is still textually present to be replaced on the
    /// next pass (spec §8 scenario 4).
    pub fn substitute(&self, field: &str) -> String {
        let mut out = field.to_string();
        for (name, value) in self.0.iter().rev() {
            out = out.replace(&format!("${{{name}}}"), &value.as_display());
        }
        out
    }
}

fn validate_declaration(name: &str, value: &MacroValue) -> Result<(), MacroError> {
    if name.len() >= 64 || !name_re().is_match(name) {
        return Err(MacroError::InvalidName(name.to_string()));
    }
    if RESERVED_NAMES.contains(&name) {
        return Err(MacroError::ReservedName(name.to_string()));
    }
    if let MacroValue::String(s) = value {
        if s.len() >= 1024 {
            return Err(MacroError::ValueTooLong(name.to_string()));
        }
        if s.contains(&format!("${{{name}}}")) {
            return Err(MacroError::SelfReference(name.to_string()));
        }
    }
    Ok(())
}

/// Substitutes `${MODEL_ID}` with `canonical` everywhere it appears. This
/// runs before the ordered user-macro pass and is not itself subject to the
/// "unresolved macro" validation rule (it always resolves).
pub fn substitute_model_id(field: &str, canonical: &str) -> String {
    field.replace("${MODEL_ID}", canonical)
}

/// Returns every `${name}` placeholder remaining in `field`, in order of
/// first appearance. Used by post-substitution validation.
pub fn unresolved_placeholders(field: &str) -> Vec<String> {
    placeholder_re()
        .captures_iter(field)
        .map(|c| c[1].to_string())
        .collect()
}

/// Validates that `field` carries no unresolved placeholder, except that
/// `${PID}` is permitted when `allow_pid` is set (the stop-command
/// template, substituted by the supervisor at kill time).
pub fn validate_resolved(field_name: &str, field: &str, allow_pid: bool) -> Result<(), MacroError> {
    let unresolved: Vec<String> = unresolved_placeholders(field)
        .into_iter()
        .filter(|name| !(allow_pid && name == "PID"))
        .collect();
    if unresolved.is_empty() {
        Ok(())
    } else {
        Err(MacroError::Unresolved {
            field: field_name.to_string(),
            unresolved,
        })
    }
}

/// Recursively checks a JSON metadata tree for any placeholder that isn't
/// `${MODEL_ID}` (already substituted) or a declared macro name.
pub fn validate_metadata(
    value: &serde_json::Value,
    known: &std::collections::BTreeSet<String>,
) -> Result<(), MacroError> {
    match value {
        serde_json::Value::String(s) => {
            for name in unresolved_placeholders(s) {
                if name != "MODEL_ID" && name != "PORT" && !known.contains(&name) {
                    return Err(MacroError::Unresolved {
                        field: "metadata".to_string(),
                        unresolved: vec![name],
                    });
                }
            }
            Ok(())
        }
        serde_json::Value::Array(items) => {
            items.iter().try_for_each(|v| validate_metadata(v, known))
        }
        serde_json::Value::Object(map) => {
            map.values().try_for_each(|v| validate_metadata(v, known))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_macro_embedding_earlier_one_expands_fully() {
        let table = MacroTable::from_ordered(vec![
            ("cmd-common".into(), MacroValue::String("llama --a".into())),
            (
                "cmd-goinfer".into(),
                MacroValue::String("${cmd-common} --b".into()),
            ),
        ])
        .unwrap();

        let expanded = table.substitute("${cmd-goinfer} -m file");
        assert_eq!(expanded, "llama --a --b -m file");
    }

    #[test]
    fn substitution_is_idempotent_on_an_already_expanded_string() {
        let table = MacroTable::from_ordered(vec![(
            "a".into(),
            MacroValue::String("x".into()),
        )])
        .unwrap();
        let once = table.substitute("${a}-${a}");
        let twice = table.substitute(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn reserved_names_are_rejected() {
        let err = MacroTable::from_ordered(vec![(
            "PORT".into(),
            MacroValue::String("8080".into()),
        )])
        .unwrap_err();
        assert_eq!(err, MacroError::ReservedName("PORT".into()));
    }

    #[test]
    fn self_referencing_macro_is_rejected() {
        let err = MacroTable::from_ordered(vec![(
            "a".into(),
            MacroValue::String("prefix-${a}".into()),
        )])
        .unwrap_err();
        assert_eq!(err, MacroError::SelfReference("a".into()));
    }

    #[test]
    fn entry_macro_shadows_global_of_same_name() {
        let globals = MacroTable::from_ordered(vec![(
            "a".into(),
            MacroValue::String("global".into()),
        )])
        .unwrap();
        let per_entry = MacroTable::from_ordered(vec![(
            "a".into(),
            MacroValue::String("entry".into()),
        )])
        .unwrap();

        let merged = globals.merge_entry_overrides(&per_entry);
        assert_eq!(merged.substitute("${a}"), "entry");
    }

    #[test]
    fn pid_placeholder_is_allowed_only_when_flagged() {
        assert!(validate_resolved("stop_command", "kill ${PID}", true).is_ok());
        assert!(validate_resolved("command", "run ${PID}", false).is_err());
    }
}
