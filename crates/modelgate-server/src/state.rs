//! Shared application state threaded through every route handler
//! (spec §9 "replace [global mutable state] with a coordinator value owned
//! by the server; pass it through request handlers").

use modelgate_coordinator::Coordinator;
use modelgate_events::Bus;
use modelgate_proxy::Forwarder;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// The result of the catalog's filesystem walk (spec §4.1), kept around
/// unmodified so `GET /models` can report `{path, cmd, size, origin,
/// error, params}` without re-walking the filesystem per request.
#[derive(Clone)]
pub struct DiscoveryReport {
    pub models: Arc<BTreeMap<String, modelgate_catalog::ModelInfo>>,
}

#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    coordinator: Arc<Coordinator>,
    forwarder: Arc<Forwarder>,
    bus: Bus,
    discovery: DiscoveryReport,
    api_key: Option<String>,
    include_aliases_in_list: bool,
    default_request_timeout: Duration,
}

impl AppState {
    pub fn new(
        coordinator: Arc<Coordinator>,
        forwarder: Arc<Forwarder>,
        bus: Bus,
        discovery: DiscoveryReport,
        api_key: Option<String>,
        include_aliases_in_list: bool,
        default_request_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                coordinator,
                forwarder,
                bus,
                discovery,
                api_key,
                include_aliases_in_list,
                default_request_timeout,
            }),
        }
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.inner.coordinator
    }

    pub fn forwarder(&self) -> &Arc<Forwarder> {
        &self.inner.forwarder
    }

    pub fn bus(&self) -> &Bus {
        &self.inner.bus
    }

    pub fn discovery(&self) -> &DiscoveryReport {
        &self.inner.discovery
    }

    pub fn api_key(&self) -> Option<&str> {
        self.inner.api_key.as_deref()
    }

    pub fn include_aliases_in_list(&self) -> bool {
        self.inner.include_aliases_in_list
    }

    pub fn default_request_timeout(&self) -> Duration {
        self.inner.default_request_timeout
    }
}
