//! The group coordinator (spec §4.4): owns every supervisor, enforces
//! group exclusivity/swap, runs the idle-TTL loop, and drives preload and
//! config-reload drains.

use crate::error::Error;
use modelgate_events::{Bus, Event, ModelPreloaded, ReloadingState};
use modelgate_process::{ReadyHandle, Supervisor, SupervisorConfig};
use modelgate_types::{Catalog, CanonicalName, RequestContext};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

pub struct Coordinator {
    catalog: RwLock<Arc<Catalog>>,
    supervisors: RwLock<BTreeMap<CanonicalName, Arc<Supervisor>>>,
    bus: Bus,
    supervisor_config: SupervisorConfig,
}

impl Coordinator {
    pub fn new(catalog: Catalog, bus: Bus, supervisor_config: SupervisorConfig) -> Self {
        let supervisors = build_supervisors(&catalog, &bus, &supervisor_config);
        Self {
            catalog: RwLock::new(Arc::new(catalog)),
            supervisors: RwLock::new(supervisors),
            bus,
            supervisor_config,
        }
    }

    pub async fn catalog(&self) -> Arc<Catalog> {
        self.catalog.read().await.clone()
    }

    async fn supervisor_for(&self, canonical: &CanonicalName) -> Option<Arc<Supervisor>> {
        self.supervisors.read().await.get(canonical).cloned()
    }

    /// Resolves `name`, enforces the target's group policy against its
    /// currently running peers, then brings the target to `Ready`.
    pub async fn acquire(&self, name: &str, ctx: &RequestContext) -> Result<ReadyHandle, Error> {
        let catalog = self.catalog().await;
        let canonical = catalog
            .resolve(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        let target = self
            .supervisor_for(&canonical)
            .await
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        if let Some(group) = catalog.group_of(&canonical) {
            if group.exclusive {
                let peers: Vec<CanonicalName> = catalog
                    .peers_of(&canonical)
                    .into_iter()
                    .cloned()
                    .collect();
                let mut running_peers = Vec::new();
                for peer in &peers {
                    if let Some(sup) = self.supervisor_for(peer).await {
                        if sup.state().is_running() {
                            running_peers.push(sup);
                        }
                    }
                }

                if !running_peers.is_empty() {
                    if !group.swap {
                        return Err(Error::Conflict);
                    }
                    // Stops run in parallel; the start below waits on all
                    // of them completing (spec §4.4 "eviction fairness").
                    let stops = running_peers
                        .iter()
                        .map(|sup| sup.stop("evicted by group swap"));
                    futures::future::join_all(stops).await;
                }
            }
        }

        target.touch_activity();
        target.reset_abort();
        Ok(target.ensure_ready(ctx).await?)
    }

    /// Speculatively acquires and immediately releases each preload name,
    /// publishing a `ModelPreloaded` event per outcome. `required` names
    /// whose preload fails are reported back to the caller so the binary
    /// can decide whether to treat the failure as fatal.
    pub async fn preload(&self, names: &[String], required: bool) -> Vec<(String, bool)> {
        let mut results = Vec::with_capacity(names.len());
        for name in names {
            let ctx = RequestContext::new(format!("preload-{name}"), None);
            let (ok, detail) = match self.acquire(name, &ctx).await {
                Ok(handle) => {
                    drop(handle);
                    (true, None)
                }
                Err(err) => (false, Some(err.to_string())),
            };

            let canonical = self
                .catalog()
                .await
                .resolve(name)
                .unwrap_or_else(|| CanonicalName::new(name.clone()));
            self.bus.publish(Event::ModelPreloaded(ModelPreloaded {
                canonical,
                ok,
                detail: detail.clone(),
            }));

            if required && !ok {
                tracing::error!(model = %name, detail = ?detail, "required preload failed");
            }
            results.push((name.clone(), ok));
        }
        results
    }

    /// Periodically stops Ready supervisors that have been idle past their
    /// entry's TTL, skipping members of a `persistent` group and entries
    /// with `idle_ttl == 0` (no expiry).
    pub async fn run_idle_ttl_loop(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let catalog = self.catalog().await;
            let supervisors: Vec<Arc<Supervisor>> =
                self.supervisors.read().await.values().cloned().collect();

            for sup in supervisors {
                if sup.state() != modelgate_types::State::Ready {
                    continue;
                }
                if sup.entry().idle_ttl.is_zero() {
                    continue;
                }
                if let Some(group) = catalog.group_of(sup.canonical()) {
                    if group.persistent {
                        continue;
                    }
                }
                if sup.in_flight() == 0 && sup.idle_for() > sup.entry().idle_ttl {
                    sup.stop("idle timeout").await;
                }
            }
        }
    }

    /// Swaps in a freshly-built catalog: drains every supervisor whose
    /// entry was removed or launch-modified, then publishes the reload
    /// start/end markers around the drain (spec §3 "Catalog version", §8).
    pub async fn reload(&self, new_catalog: Catalog) {
        let previous = self.catalog().await;
        let diff = new_catalog.diff(&previous);

        self.bus
            .publish(Event::ConfigFileChanged(ReloadingState::Start));

        {
            let supervisors = self.supervisors.read().await;
            let drains = diff
                .must_drain()
                .filter_map(|canonical| supervisors.get(canonical))
                .map(|sup| sup.stop("config reload"));
            futures::future::join_all(drains).await;
        }

        let mut supervisors = self.supervisors.write().await;
        for canonical in diff.removed.iter().chain(diff.modified.iter()) {
            supervisors.remove(canonical);
        }
        for canonical in diff.added.iter().chain(diff.modified.iter()) {
            if let Some(entry) = new_catalog.get(canonical) {
                supervisors.insert(
                    canonical.clone(),
                    Arc::new(Supervisor::new(
                        canonical.clone(),
                        entry.clone(),
                        self.supervisor_config.clone(),
                        self.bus.clone(),
                    )),
                );
            }
        }
        drop(supervisors);

        *self.catalog.write().await = Arc::new(new_catalog);

        self.bus
            .publish(Event::ConfigFileChanged(ReloadingState::End));
    }

    /// The first listed, currently-`Ready` canonical id, in sorted order;
    /// used by the forwarder's "first ready" default-model policy.
    pub async fn first_ready(&self) -> Option<CanonicalName> {
        let catalog = self.catalog().await;
        let supervisors = self.supervisors.read().await;
        catalog
            .listed_canonical_names(false)
            .into_iter()
            .find(|name| {
                supervisors
                    .get(*name)
                    .is_some_and(|sup| sup.state() == modelgate_types::State::Ready)
            })
            .cloned()
    }

    /// The abort latch for `canonical`'s supervisor, for a forwarder to
    /// poll at stream chunk boundaries.
    pub async fn continue_rx(&self, canonical: &CanonicalName) -> Option<tokio::sync::watch::Receiver<bool>> {
        self.supervisor_for(canonical).await.map(|sup| sup.continue_rx())
    }

    /// Trips the abort latch for `canonical`'s supervisor, if it exists
    /// (spec §4.5 "Abort endpoint").
    pub async fn abort(&self, canonical: &CanonicalName) -> bool {
        match self.supervisor_for(canonical).await {
            Some(sup) => {
                sup.abort();
                true
            }
            None => false,
        }
    }

    /// Canonical id, current state, and in-flight count for every
    /// supervisor, sorted by canonical id; backs `GET /running`.
    pub async fn list_states(&self) -> Vec<(CanonicalName, modelgate_types::State, u32)> {
        let supervisors = self.supervisors.read().await;
        let mut rows: Vec<_> = supervisors
            .values()
            .map(|sup| (sup.canonical().clone(), sup.state(), sup.in_flight()))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }

    /// The retained stdout/stderr ring for `canonical`'s supervisor, if it
    /// exists; backs `GET /logs`.
    pub async fn logs_for(&self, canonical: &CanonicalName) -> Option<Arc<modelgate_process::LogRing>> {
        self.supervisor_for(canonical).await.map(|sup| sup.logs_channel())
    }

    /// Stops every supervisor; used for graceful process shutdown.
    pub async fn stop_all(&self, reason: &str) {
        let supervisors: Vec<Arc<Supervisor>> =
            self.supervisors.read().await.values().cloned().collect();
        let stops = supervisors.iter().map(|sup| sup.stop(reason));
        futures::future::join_all(stops).await;
    }
}

fn build_supervisors(
    catalog: &Catalog,
    bus: &Bus,
    config: &SupervisorConfig,
) -> BTreeMap<CanonicalName, Arc<Supervisor>> {
    catalog
        .models()
        .map(|entry| {
            (
                entry.canonical.clone(),
                Arc::new(Supervisor::new(
                    entry.canonical.clone(),
                    entry.clone(),
                    config.clone(),
                    bus.clone(),
                )),
            )
        })
        .collect()
}
