//! Turns a validated [`crate::raw::RawConfig`] plus an optional discovered
//! catalog (spec §4.1) into an immutable [`modelgate_types::Catalog`]
//! (spec §4.2, §6, §8).

use crate::raw::RawConfig;
use crate::value::{self, MacroError, MacroTable, MacroValue};
use modelgate_types::{CanonicalName, Catalog, CatalogVersion, GroupEntry, GroupId, ModelEntry};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use thiserror::Error;

/// Spec §4.2/§5: "health-check timeout floor 15 s" / "health-check timeout
/// from configuration (minimum 15 s...)".
pub const MIN_HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("configuration error: {0}")]
    ConfigError(String),
    #[error("model {canonical:?}: {source}")]
    Macro {
        canonical: String,
        #[source]
        source: MacroError,
    },
    #[error("model {canonical:?}: invalid proxy URL: {0}", canonical = .canonical)]
    InvalidProxyUrl { canonical: String, source: url::ParseError },
    #[error(
        "model {canonical:?}: proxy URL references ${{PORT}} but the launch command does not"
    )]
    ProxyPortWithoutCommandPort { canonical: String },
    #[error("group {group:?} claims member {member:?} which is also a member of {other:?}")]
    DuplicateGroupMember {
        group: String,
        member: String,
        other: String,
    },
    #[error("alias {alias:?} is declared by both {a:?} and {b:?}")]
    DuplicateAlias { alias: String, a: String, b: String },
}

fn flatten_macro_list(list: &[BTreeMap<String, MacroValue>]) -> Vec<(String, MacroValue)> {
    list.iter()
        .flat_map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())))
        .collect()
}

fn check_start_port(start_port: u16) -> Result<(), BuildError> {
    if start_port == 0 {
        return Err(BuildError::ConfigError(
            "start_port must be >= 1 (spec §4.2 global scalars)".to_string(),
        ));
    }
    Ok(())
}

/// Validates and normalizes the `RawConfig` globals spec §4.2/§5 constrain
/// directly: rejects `start_port == 0` and floors `health_check_timeout`
/// at [`MIN_HEALTH_CHECK_TIMEOUT`]. Called once per load — initial boot and
/// every reload — so every consumer of `RawConfig`, not just [`build`],
/// observes the normalized values.
pub fn validate_raw(raw: &mut RawConfig) -> Result<(), BuildError> {
    check_start_port(raw.start_port)?;
    if raw.health_check_timeout < MIN_HEALTH_CHECK_TIMEOUT {
        raw.health_check_timeout = MIN_HEALTH_CHECK_TIMEOUT;
    }
    Ok(())
}

/// Builds the immutable catalog for one config generation. `discovered`
/// supplies canonical-name -> launch-flag-string pairs recovered by the
/// filesystem walk (spec §4.1); they are folded in as additional,
/// unlisted, default-group entries unless already named under
/// `raw.models`.
pub fn build(
    raw: &RawConfig,
    version: CatalogVersion,
    discovered: &BTreeMap<String, DiscoveredEntry>,
) -> Result<Catalog, BuildError> {
    check_start_port(raw.start_port)?;

    let globals = flatten_macro_list(&raw.macros);
    let globals = MacroTable::from_ordered(globals).map_err(|source| BuildError::Macro {
        canonical: "<global>".to_string(),
        source,
    })?;

    let mut canonical_ids: BTreeSet<String> = raw.models.keys().cloned().collect();
    for name in discovered.keys() {
        canonical_ids.insert(name.clone());
    }
    let canonical_ids: Vec<String> = canonical_ids.into_iter().collect();

    let mut next_port = raw.start_port;
    let mut models = BTreeMap::new();
    for canonical in &canonical_ids {
        let (cmd_template, from_discovery) = match raw.models.get(canonical) {
            Some(model) => (model.clone(), None),
            None => {
                let flags = discovered.get(canonical).cloned().unwrap_or_default();
                (synthesize_raw_model(&flags), Some(flags))
            }
        };

        let entry_macros = flatten_macro_list(&cmd_template.macros);
        let entry_macros =
            MacroTable::from_ordered(entry_macros).map_err(|source| BuildError::Macro {
                canonical: canonical.clone(),
                source,
            })?;
        let macros = globals.merge_entry_overrides(&entry_macros);

        let expand = |field: &str| -> String {
            macros.substitute(&value::substitute_model_id(field, canonical))
        };

        let mut command_str = expand(&cmd_template.cmd);
        let stop_command_str = cmd_template.cmd_stop.as_deref().map(expand);
        let mut proxy_str = expand(cmd_template.proxy.as_deref().unwrap_or("http://127.0.0.1:${PORT}"));
        let health_path = expand(cmd_template.check_endpoint.as_deref().unwrap_or("/health"));

        let command_wants_port = command_str.contains("${PORT}");
        let proxy_wants_port = proxy_str.contains("${PORT}");
        if proxy_wants_port && !command_wants_port {
            return Err(BuildError::ProxyPortWithoutCommandPort {
                canonical: canonical.clone(),
            });
        }

        let port = if command_wants_port {
            let assigned = next_port;
            next_port = next_port
                .checked_add(1)
                .expect("port space exhausted: reduce the number of `${PORT}`-using models");
            command_str = command_str.replace("${PORT}", &assigned.to_string());
            proxy_str = proxy_str.replace("${PORT}", &assigned.to_string());
            assigned
        } else {
            0
        };

        value::validate_resolved("command", &command_str, false).map_err(|source| {
            BuildError::Macro {
                canonical: canonical.clone(),
                source,
            }
        })?;
        if let Some(stop) = &stop_command_str {
            value::validate_resolved("stop_command", stop, true).map_err(|source| {
                BuildError::Macro {
                    canonical: canonical.clone(),
                    source,
                }
            })?;
        }
        value::validate_resolved("proxy", &proxy_str, false).map_err(|source| BuildError::Macro {
            canonical: canonical.clone(),
            source,
        })?;
        value::validate_resolved("health_path", &health_path, false).map_err(|source| {
            BuildError::Macro {
                canonical: canonical.clone(),
                source,
            }
        })?;

        let strip_params: Vec<String> = cmd_template
            .filters
            .strip_params
            .iter()
            .map(|s| expand(s))
            .collect();
        for s in &strip_params {
            value::validate_resolved("strip_params", s, false).map_err(|source| {
                BuildError::Macro {
                    canonical: canonical.clone(),
                    source,
                }
            })?;
        }

        let known_macro_names = macros.names();
        let expand_json = |v: &serde_json::Value| -> serde_json::Value {
            expand_metadata_value(v, &expand, port)
        };
        let mut metadata = BTreeMap::new();
        for (k, v) in &cmd_template.metadata {
            let expanded = expand_json(v);
            value::validate_metadata(&expanded, &known_macro_names).map_err(|source| {
                BuildError::Macro {
                    canonical: canonical.clone(),
                    source,
                }
            })?;
            metadata.insert(k.clone(), expanded);
        }

        let proxy_url = url::Url::parse(&proxy_str).map_err(|source| BuildError::InvalidProxyUrl {
            canonical: canonical.clone(),
            source,
        })?;

        let env: BTreeMap<String, String> = cmd_template
            .env
            .iter()
            .map(|(k, v)| (k.clone(), expand(v)))
            .collect();

        models.insert(
            CanonicalName::new(canonical.clone()),
            ModelEntry {
                canonical: CanonicalName::new(canonical.clone()),
                aliases: cmd_template.aliases.clone(),
                group: GroupId::new(group_of(raw, canonical)),
                command: tokenize(&command_str),
                stop_command: stop_command_str.as_deref().map(tokenize),
                proxy_url,
                health_path,
                port,
                env,
                idle_ttl: cmd_template.ttl.unwrap_or(std::time::Duration::from_secs(0)),
                unlisted: cmd_template.unlisted || from_discovery.is_some(),
                concurrency_limit: cmd_template.concurrency_limit.unwrap_or(0),
                use_upstream_name: cmd_template.use_model_name.clone(),
                send_loading_state: cmd_template.send_loading_state.or(Some(raw.send_loading_state)),
                strip_params,
                name: cmd_template.name.clone(),
                description: cmd_template.description.clone(),
                metadata,
            },
        );
    }

    let groups = build_groups(raw, &models)?;
    check_alias_uniqueness(&models)?;

    Ok(Catalog::new(version, models, groups))
}

/// A launch-flag string recovered from the filesystem walk for a name not
/// explicitly declared under `models:`.
#[derive(Debug, Clone, Default)]
pub struct DiscoveredEntry {
    pub artifact_path: String,
    pub flags: Option<String>,
}

fn synthesize_raw_model(discovered: &DiscoveredEntry) -> crate::raw::RawModel {
    let mut cmd = discovered.flags.clone().unwrap_or_default();
    if !cmd.is_empty() {
        cmd.push(' ');
    }
    cmd.push_str("-m ${MODEL_PATH_PLACEHOLDER}");
    let cmd = cmd.replace("${MODEL_PATH_PLACEHOLDER}", &discovered.artifact_path);
    crate::raw::RawModel {
        cmd,
        proxy: Some("http://127.0.0.1:${PORT}".to_string()),
        unlisted: true,
        ..Default::default()
    }
}

fn expand_metadata_value(
    value: &serde_json::Value,
    expand: &impl Fn(&str) -> String,
    port: u16,
) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) => {
            serde_json::Value::String(expand(s).replace("${PORT}", &port.to_string()))
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(|v| expand_metadata_value(v, expand, port)).collect())
        }
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), expand_metadata_value(v, expand, port)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn tokenize(s: &str) -> Vec<String> {
    s.split_whitespace().map(str::to_string).collect()
}

fn group_of(raw: &RawConfig, canonical: &str) -> String {
    raw.groups
        .iter()
        .find(|(_, g)| g.members.iter().any(|m| m == canonical))
        .map(|(id, _)| id.clone())
        .unwrap_or_else(|| GroupId::DEFAULT.to_string())
}

fn build_groups(
    raw: &RawConfig,
    models: &BTreeMap<CanonicalName, ModelEntry>,
) -> Result<BTreeMap<GroupId, GroupEntry>, BuildError> {
    let mut member_of: BTreeMap<String, String> = BTreeMap::new();
    let mut groups = BTreeMap::new();

    for (id, raw_group) in &raw.groups {
        for member in &raw_group.members {
            if let Some(other) = member_of.get(member) {
                return Err(BuildError::DuplicateGroupMember {
                    group: id.clone(),
                    member: member.clone(),
                    other: other.clone(),
                });
            }
            member_of.insert(member.clone(), id.clone());
        }
        groups.insert(
            GroupId::new(id.clone()),
            GroupEntry {
                id: GroupId::new(id.clone()),
                members: raw_group.members.iter().cloned().map(CanonicalName::new).collect(),
                swap: raw_group.swap,
                exclusive: raw_group.exclusive,
                persistent: raw_group.persistent,
            },
        );
    }

    let default_members: Vec<CanonicalName> = models
        .keys()
        .filter(|c| !member_of.contains_key(c.as_str()))
        .cloned()
        .collect();
    groups
        .entry(GroupId::default_group())
        .or_insert_with(|| GroupEntry {
            id: GroupId::default_group(),
            members: Vec::new(),
            swap: false,
            exclusive: false,
            persistent: false,
        })
        .members
        .extend(default_members);

    Ok(groups)
}

fn check_alias_uniqueness(models: &BTreeMap<CanonicalName, ModelEntry>) -> Result<(), BuildError> {
    let mut owner: BTreeMap<String, String> = BTreeMap::new();
    for entry in models.values() {
        for alias in &entry.aliases {
            if let Some(other) = owner.get(alias) {
                if other != entry.canonical.as_str() {
                    return Err(BuildError::DuplicateAlias {
                        alias: alias.clone(),
                        a: other.clone(),
                        b: entry.canonical.to_string(),
                    });
                }
            }
            owner.insert(alias.clone(), entry.canonical.to_string());
        }
    }
    Ok(())
}

/// Resolves the preload list (spec §4.2 "Preload list") against a built
/// catalog, dropping and warning about names that fail alias resolution.
pub fn resolve_preload(raw: &RawConfig, catalog: &Catalog) -> (Vec<CanonicalName>, Vec<String>) {
    let mut resolved = Vec::new();
    let mut dropped = Vec::new();
    for name in &raw.hooks.on_startup.preload {
        match catalog.resolve(name) {
            Some(canonical) => resolved.push(canonical),
            None => dropped.push(name.clone()),
        }
    }
    (resolved, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::{RawGroup, RawModel};

    fn minimal_raw() -> RawConfig {
        RawConfig {
            start_port: 9000,
            ..Default::default()
        }
    }

    #[test]
    fn macro_expansion_scenario_from_spec() {
        let mut raw = minimal_raw();
        raw.macros = vec![
            BTreeMap::from([("cmd-common".to_string(), MacroValue::String("llama --a".into()))]),
            BTreeMap::from([(
                "cmd-goinfer".to_string(),
                MacroValue::String("${cmd-common} --b".to_string()),
            )]),
        ];
        raw.models.insert(
            "M".to_string(),
            RawModel {
                cmd: "${cmd-goinfer} -m file".to_string(),
                ..Default::default()
            },
        );

        let catalog = build(&raw, CatalogVersion::default(), &BTreeMap::new()).unwrap();
        let entry = catalog.get(&CanonicalName::new("M")).unwrap();
        assert_eq!(entry.command, vec!["llama", "--a", "--b", "-m", "file"]);
    }

    #[test]
    fn port_allocation_is_deterministic_by_sorted_canonical_id() {
        let mut raw = minimal_raw();
        for name in ["z-model", "a-model"] {
            raw.models.insert(
                name.to_string(),
                RawModel {
                    cmd: "worker --port ${PORT}".to_string(),
                    ..Default::default()
                },
            );
        }

        let catalog = build(&raw, CatalogVersion::default(), &BTreeMap::new()).unwrap();
        let a_port = catalog.get(&CanonicalName::new("a-model")).unwrap().port;
        let z_port = catalog.get(&CanonicalName::new("z-model")).unwrap().port;
        assert_eq!(a_port, 9000);
        assert_eq!(z_port, 9001);
    }

    #[test]
    fn proxy_using_port_without_command_using_it_is_rejected() {
        let mut raw = minimal_raw();
        raw.models.insert(
            "M".to_string(),
            RawModel {
                cmd: "worker --fixed-port 1234".to_string(),
                proxy: Some("http://127.0.0.1:${PORT}".to_string()),
                ..Default::default()
            },
        );

        let err = build(&raw, CatalogVersion::default(), &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, BuildError::ProxyPortWithoutCommandPort { .. }));
    }

    #[test]
    fn unresolved_macro_in_command_is_an_error() {
        let mut raw = minimal_raw();
        raw.models.insert(
            "M".to_string(),
            RawModel {
                cmd: "worker --flag ${never_declared}".to_string(),
                ..Default::default()
            },
        );

        assert!(build(&raw, CatalogVersion::default(), &BTreeMap::new()).is_err());
    }

    #[test]
    fn entries_not_named_in_any_group_join_the_default_group() {
        let mut raw = minimal_raw();
        raw.models.insert(
            "solo".to_string(),
            RawModel {
                cmd: "worker".to_string(),
                ..Default::default()
            },
        );

        let catalog = build(&raw, CatalogVersion::default(), &BTreeMap::new()).unwrap();
        let group = catalog.group_of(&CanonicalName::new("solo")).unwrap();
        assert!(group.id.is_default());
    }

    #[test]
    fn duplicate_group_membership_is_rejected() {
        let mut raw = minimal_raw();
        raw.groups.insert(
            "g1".to_string(),
            RawGroup {
                members: vec!["x".to_string()],
                ..Default::default()
            },
        );
        raw.groups.insert(
            "g2".to_string(),
            RawGroup {
                members: vec!["x".to_string()],
                ..Default::default()
            },
        );

        let err = build(&raw, CatalogVersion::default(), &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, BuildError::DuplicateGroupMember { .. }));
    }

    #[test]
    fn start_port_zero_is_rejected() {
        let mut raw = minimal_raw();
        raw.start_port = 0;
        let err = build(&raw, CatalogVersion::default(), &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, BuildError::ConfigError(_)));
    }

    #[test]
    fn validate_raw_floors_health_check_timeout_at_fifteen_seconds() {
        let mut raw = minimal_raw();
        raw.health_check_timeout = std::time::Duration::from_secs(10);
        validate_raw(&mut raw).unwrap();
        assert_eq!(raw.health_check_timeout, MIN_HEALTH_CHECK_TIMEOUT);
    }

    #[test]
    fn validate_raw_leaves_a_generous_timeout_untouched() {
        let mut raw = minimal_raw();
        raw.health_check_timeout = std::time::Duration::from_secs(120);
        validate_raw(&mut raw).unwrap();
        assert_eq!(raw.health_check_timeout, std::time::Duration::from_secs(120));
    }

    #[test]
    fn validate_raw_rejects_start_port_zero() {
        let mut raw = minimal_raw();
        raw.start_port = 0;
        assert!(matches!(validate_raw(&mut raw).unwrap_err(), BuildError::ConfigError(_)));
    }

    #[test]
    fn discovered_entries_fold_in_as_unlisted_default_group_members() {
        let raw = minimal_raw();
        let mut discovered = BTreeMap::new();
        discovered.insert(
            "ggml-org/gpt-oss-120b".to_string(),
            DiscoveredEntry {
                artifact_path: "/models/a.gguf".to_string(),
                flags: Some("-c 4096".to_string()),
            },
        );

        let catalog = build(&raw, CatalogVersion::default(), &discovered).unwrap();
        let entry = catalog.get(&CanonicalName::new("ggml-org/gpt-oss-120b")).unwrap();
        assert!(entry.unlisted);
        assert!(entry.command.contains(&"-m".to_string()));
    }
}
