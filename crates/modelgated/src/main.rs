//! The modelgate daemon: loads configuration, walks the model directory,
//! builds the catalog, and serves the HTTP control plane until a shutdown
//! signal arrives (spec §6, §7).

use anyhow::Context;
use clap::Parser;
use modelgate_coordinator::Coordinator;
use modelgate_events::Bus;
use modelgate_process::SupervisorConfig;
use modelgate_proxy::{DefaultModelPolicy, Forwarder};
use modelgate_server::{ports, shutdown, AppState, DiscoveryReport};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// modelgate is a local control plane that fronts single-tenant inference
/// worker executables with an OpenAI-compatible HTTP surface.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(long = "config", env = "MODELGATE_CONFIG", default_value = "modelgate.yaml")]
    config: PathBuf,
    /// Host/interface to bind the HTTP listener to.
    #[arg(long = "host", env = "MODELGATE_HOST", default_value = "127.0.0.1")]
    host: String,
    /// Port the HTTP listener binds to.
    #[arg(long = "port", env = "MODELGATE_PORT", default_value_t = 8080)]
    port: u16,
    /// Overrides `api_key` from the configuration file.
    #[arg(long = "api-key", env = "MODELGATE_API_KEY")]
    api_key: Option<String>,
    /// Overrides `models_dir` from the configuration file.
    #[arg(long = "models-dir", env = "MODELGATE_MODELS_DIR")]
    models_dir: Option<String>,
    /// Overrides `start_port` from the configuration file.
    #[arg(long = "start-port", env = "MODELGATE_START_PORT")]
    start_port: Option<u16>,
    /// File extension the catalog walk treats as a model artifact.
    #[arg(long = "artifact-suffix", env = "MODELGATE_ARTIFACT_SUFFIX", default_value = "gguf")]
    artifact_suffix: String,
    /// Files smaller than this are ignored by the catalog walk.
    #[arg(long = "min-artifact-bytes", env = "MODELGATE_MIN_ARTIFACT_BYTES", default_value_t = 1 << 20)]
    min_artifact_bytes: u64,

    #[command(flatten)]
    log: modelgate_cli::LogArgs,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    modelgate_cli::init_logging(&args.log);
    tracing::info!(?args, "started!");

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let result = runtime.block_on(async_main(args));

    tracing::info!(?result, "main function completed, shutting down runtime");
    runtime.shutdown_timeout(Duration::from_secs(5));
    result
}

async fn async_main(args: Args) -> anyhow::Result<()> {
    let addr: std::net::SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .context("parsing --host/--port as a socket address")?;
    ports::check(addr)?;

    // Bind before doing anything else fallible, so a port conflict is
    // reported immediately rather than after a slow catalog walk.
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding HTTP listener on {addr}"))?;

    let cli_overrides = modelgate_config::CliOverrides {
        host: Some(args.host.clone()),
        api_key: args.api_key.clone(),
        models_dir: args.models_dir.clone(),
        start_port: args.start_port,
        log_level: None,
    };
    let raw = modelgate_config::load::load(&args.config, &cli_overrides)
        .with_context(|| format!("loading configuration from {}", args.config.display()))?;

    let (catalog, bus) = build_catalog_and_bus(&raw, &args, modelgate_types::CatalogVersion::default())
        .context("building the initial catalog")?;

    let supervisor_config = SupervisorConfig {
        health_check_timeout: raw.health_check_timeout,
        ..SupervisorConfig::default()
    };
    let coordinator = Arc::new(Coordinator::new(catalog, bus.clone(), supervisor_config));

    let default_model_policy = match &raw.default_model {
        Some(name) => DefaultModelPolicy::Named(name.clone()),
        None => DefaultModelPolicy::FirstReady,
    };
    let forwarder = Arc::new(Forwarder::new(coordinator.clone(), default_model_policy));

    let (preload_names, dropped) = modelgate_config::build::resolve_preload(&raw, &coordinator.catalog().await);
    for name in &dropped {
        tracing::warn!(model = %name, "preload entry does not resolve to any catalog entry, skipping");
    }
    let preload_names: Vec<String> = preload_names.iter().map(|c| c.to_string()).collect();
    let outcomes = coordinator
        .preload(&preload_names, raw.hooks.on_startup.required)
        .await;
    let any_preload_failed = outcomes.iter().any(|(_, ok)| !ok);
    if raw.hooks.on_startup.required && (any_preload_failed || !dropped.is_empty()) {
        anyhow::bail!("required preload entries failed or could not be resolved");
    }

    let discovery = discover_models(&args);
    let state = AppState::new(
        coordinator.clone(),
        forwarder,
        bus,
        discovery,
        raw.api_key.clone(),
        raw.include_aliases_in_list,
        raw.health_check_timeout,
    );

    let idle_ttl_task = tokio::spawn(coordinator.clone().run_idle_ttl_loop(Duration::from_secs(30)));
    let watch_task = spawn_config_watch(ReloadArgs::from(&args), coordinator.clone());

    let app = modelgate_server::router(state.clone(), &raw.origins);
    tracing::info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown::signal())
        .await
        .context("serving HTTP")?;

    idle_ttl_task.abort();
    watch_task.abort();
    shutdown::drain(&state, Duration::from_secs(10)).await;

    Ok(())
}

fn discover_models(args: &Args) -> DiscoveryReport {
    match &args.models_dir {
        Some(roots) => {
            let build = modelgate_catalog::build(roots, &args.artifact_suffix, args.min_artifact_bytes);
            for warning in &build.warnings {
                tracing::warn!(%warning, "catalog walk warning");
            }
            DiscoveryReport {
                models: Arc::new(build.models),
            }
        }
        None => DiscoveryReport {
            models: Arc::new(Default::default()),
        },
    }
}

fn build_catalog_and_bus(
    raw: &modelgate_config::RawConfig,
    args: &Args,
    version: modelgate_types::CatalogVersion,
) -> anyhow::Result<(modelgate_types::Catalog, Bus)> {
    let models_dir = raw.models_dir.as_deref().or(args.models_dir.as_deref());
    let walk = models_dir.map(|roots| modelgate_catalog::build(roots, &args.artifact_suffix, args.min_artifact_bytes));
    let discovered = walk
        .as_ref()
        .map(modelgate_config::discovered_from_walk)
        .unwrap_or_default();
    if let Some(walk) = &walk {
        for warning in &walk.warnings {
            tracing::warn!(%warning, "catalog walk warning");
        }
    }

    let catalog = modelgate_config::build::build(raw, version, &discovered)?;
    let bus = Bus::new(raw.metrics_max_in_memory.max(16));
    Ok((catalog, bus))
}

/// The subset of [`Args`] a background config-reload task needs; kept
/// separate so the reload loop doesn't have to carry (or clone) the
/// logging flags along with it.
#[derive(Clone)]
struct ReloadArgs {
    config: PathBuf,
    host: String,
    api_key: Option<String>,
    models_dir: Option<String>,
    start_port: Option<u16>,
    artifact_suffix: String,
    min_artifact_bytes: u64,
}

impl From<&Args> for ReloadArgs {
    fn from(args: &Args) -> Self {
        Self {
            config: args.config.clone(),
            host: args.host.clone(),
            api_key: args.api_key.clone(),
            models_dir: args.models_dir.clone(),
            start_port: args.start_port,
            artifact_suffix: args.artifact_suffix.clone(),
            min_artifact_bytes: args.min_artifact_bytes,
        }
    }
}

/// Watches the config file and swaps in a freshly built catalog on every
/// change (spec §4.2, §8); a rejected rebuild logs and keeps serving the
/// previous catalog rather than tearing anything down.
fn spawn_config_watch(args: ReloadArgs, coordinator: Arc<Coordinator>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut watcher = match modelgate_config::ConfigWatcher::spawn(&args.config) {
            Ok(watcher) => watcher,
            Err(err) => {
                tracing::error!(error = %err, "failed to start config file watcher; hot reload disabled");
                return;
            }
        };

        while watcher.changed().await {
            let cli_overrides = modelgate_config::CliOverrides {
                host: Some(args.host.clone()),
                api_key: args.api_key.clone(),
                models_dir: args.models_dir.clone(),
                start_port: args.start_port,
                log_level: None,
            };
            let raw = match modelgate_config::load::load(&args.config, &cli_overrides) {
                Ok(raw) => raw,
                Err(err) => {
                    tracing::error!(error = %err, "config reload failed, keeping previous catalog");
                    continue;
                }
            };

            let next_version = coordinator.catalog().await.version.next();
            let models_dir = raw.models_dir.as_deref().or(args.models_dir.as_deref());
            let walk = models_dir.map(|roots| modelgate_catalog::build(roots, &args.artifact_suffix, args.min_artifact_bytes));
            let discovered = walk
                .as_ref()
                .map(modelgate_config::discovered_from_walk)
                .unwrap_or_default();

            match modelgate_config::build::build(&raw, next_version, &discovered) {
                Ok(catalog) => {
                    coordinator.reload(catalog).await;
                    tracing::info!(version = next_version.0, "config reloaded");
                }
                Err(err) => tracing::error!(error = %err, "config reload failed, keeping previous catalog"),
            }
        }
    })
}
