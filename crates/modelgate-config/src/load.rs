//! Loads [`RawConfig`] with precedence file -> environment -> CLI flags
//! (spec §6), the same layering `control::config::load_settings` applies
//! with the `config` crate, generalized to three sources instead of two.

use crate::build::BuildError;
use crate::raw::RawConfig;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("reading configuration: {0}")]
    Config(#[from] config::ConfigError),
    #[error("validating configuration: {0}")]
    Invalid(#[from] BuildError),
}

/// CLI-supplied overrides, applied last (highest precedence). Each field
/// mirrors a handful of the most frequently overridden globals; anything
/// else is controlled purely through the file/environment layers.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub api_key: Option<String>,
    pub models_dir: Option<String>,
    pub start_port: Option<u16>,
    pub log_level: Option<String>,
}

/// Loads the configuration file at `path` (YAML), overlays environment
/// variables prefixed `MODELGATE_` (double-underscore nested separator,
/// e.g. `MODELGATE_START_PORT`), then applies `cli` overrides.
pub fn load(path: &Path, cli: &CliOverrides) -> Result<RawConfig, LoadError> {
    let mut builder = config::Config::builder()
        .add_source(config::File::from(path).required(true))
        .add_source(
            config::Environment::with_prefix("MODELGATE")
                .separator("__")
                .try_parsing(true),
        );

    if let Some(host) = &cli.host {
        builder = builder.set_override("host", host.as_str())?;
    }
    if let Some(api_key) = &cli.api_key {
        builder = builder.set_override("api_key", api_key.as_str())?;
    }
    if let Some(models_dir) = &cli.models_dir {
        builder = builder.set_override("models_dir", models_dir.as_str())?;
    }
    if let Some(start_port) = cli.start_port {
        builder = builder.set_override("start_port", start_port as i64)?;
    }
    if let Some(log_level) = &cli.log_level {
        builder = builder.set_override("log_level", log_level.as_str())?;
    }

    let mut raw: RawConfig = builder.build()?.try_deserialize()?;
    crate::build::validate_raw(&mut raw)?;
    Ok(raw)
}
