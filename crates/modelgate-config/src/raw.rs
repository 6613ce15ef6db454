//! The declarative configuration tree of spec §6, deserialized directly
//! from YAML. Field names mirror the spec's illustrative layout; nothing
//! here is validated yet (that happens in `build`).

use crate::value::MacroValue;
use std::collections::BTreeMap;

fn default_true() -> bool {
    true
}

fn default_start_port() -> u16 {
    8700
}

fn default_health_check_timeout() -> u64 {
    120
}

fn default_metrics_max_in_memory() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub api_key: Option<String>,
    pub host: Option<String>,
    pub origins: Vec<String>,
    /// Colon-separated filesystem roots passed to the catalog walker.
    pub models_dir: Option<String>,
    pub default_model: Option<String>,
    /// name -> flag string, folded into the catalog as unlisted extras.
    pub extra_models: BTreeMap<String, String>,

    pub llama: Option<LlamaSettings>,
    /// listen address -> comma-separated service tags.
    pub listen: BTreeMap<String, String>,
    /// model name -> prompt-template path.
    pub templates: BTreeMap<String, String>,

    /// Ordered list of single-entry maps, preserving declaration order
    /// (spec §4.2: "ordered structures (macros) as an ordered sequence,
    /// not a mapping").
    pub macros: Vec<BTreeMap<String, MacroValue>>,

    pub groups: BTreeMap<String, RawGroup>,
    pub hooks: Hooks,

    #[serde(default = "default_start_port")]
    pub start_port: u16,
    #[serde(with = "humantime_serde", default = "default_health_check_timeout_duration")]
    pub health_check_timeout: std::time::Duration,
    #[serde(default = "default_metrics_max_in_memory")]
    pub metrics_max_in_memory: usize,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub log_time_format: Option<String>,
    #[serde(default)]
    pub send_loading_state: bool,
    #[serde(default = "default_true")]
    pub include_aliases_in_list: bool,

    pub models: BTreeMap<String, RawModel>,
}

fn default_health_check_timeout_duration() -> std::time::Duration {
    std::time::Duration::from_secs(default_health_check_timeout())
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(default)]
pub struct LlamaSettings {
    pub exe: Option<String>,
    pub common: Option<String>,
    pub goinfer: Option<String>,
    pub verbose: bool,
    pub debug: bool,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(default)]
pub struct Hooks {
    pub on_startup: OnStartup,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(default)]
pub struct OnStartup {
    pub preload: Vec<String>,
    /// When true, a preload failure is a fatal boot error (spec §6 exit
    /// codes: "preload failure when configured as required").
    pub required: bool,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(default)]
pub struct RawGroup {
    pub members: Vec<String>,
    pub swap: bool,
    pub exclusive: bool,
    pub persistent: bool,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(default)]
pub struct RawFilters {
    pub strip_params: Vec<String>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(default)]
pub struct RawModel {
    pub cmd: String,
    pub cmd_stop: Option<String>,
    pub aliases: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub check_endpoint: Option<String>,
    pub proxy: Option<String>,
    pub use_model_name: Option<String>,
    pub unlisted: bool,
    #[serde(with = "humantime_serde::option", default)]
    pub ttl: Option<std::time::Duration>,
    pub concurrency_limit: Option<u32>,
    pub filters: RawFilters,
    /// Per-entry macros, same ordered-map-of-single-entries shape as the
    /// global list; shadow global macros of the same name.
    pub macros: Vec<BTreeMap<String, MacroValue>>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub send_loading_state: Option<bool>,
    pub name: Option<String>,
    pub description: Option<String>,
}
