use crate::{CanonicalName, GroupId};
use std::collections::BTreeMap;
use std::time::Duration;

/// An immutable catalog entry, produced by the config/macro pipeline from a
/// discovered artifact plus its declared overrides (spec §3 "Model entry").
/// All macros have already been expanded by the time one of these exists.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModelEntry {
    pub canonical: CanonicalName,
    pub aliases: Vec<String>,
    pub group: GroupId,

    /// Tokenised argv, ready to exec. `${PORT}` has already been substituted.
    pub command: Vec<String>,
    /// `${PID}` in this template is substituted by the supervisor at kill time.
    pub stop_command: Option<Vec<String>>,

    pub proxy_url: url::Url,
    pub health_path: String,
    pub port: u16,

    pub env: BTreeMap<String, String>,

    #[serde(with = "humantime_serde")]
    pub idle_ttl: Duration,
    pub unlisted: bool,
    /// 0 means unlimited (spec §9 open question, resolved in DESIGN.md).
    pub concurrency_limit: u32,

    /// The name substituted into the forwarded JSON body's `model` field,
    /// if the entry overrides it.
    pub use_upstream_name: Option<String>,
    pub send_loading_state: Option<bool>,
    pub strip_params: Vec<String>,

    pub name: Option<String>,
    pub description: Option<String>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ModelEntry {
    pub fn concurrency_limited(&self) -> Option<u32> {
        (self.concurrency_limit != 0).then_some(self.concurrency_limit)
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.canonical.as_str())
    }
}
