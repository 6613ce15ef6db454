//! The process supervisor (spec §4.3): owns exactly one canonical model's
//! worker process across its whole lifecycle, from `Stopped` through
//! `Starting`/`Ready` and back down through `Stopping`. Every other crate
//! talks to a worker only through a `Supervisor`.

use crate::error::Error;
use crate::handle::ReadyHandle;
use crate::logring::LogRing;
use exponential_backoff::Backoff;
use modelgate_events::{Bus, Event, LogLine, LogStream};
use modelgate_types::{supervisor::Transition, CanonicalName, ModelEntry, RequestContext, State};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{watch, Mutex as AsyncMutex, Semaphore};

/// Tunables that don't live on the catalog entry itself: global policy the
/// binary applies uniformly across every supervisor it owns.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub health_check_timeout: Duration,
    pub stop_timeout: Duration,
    pub log_ring_capacity: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            health_check_timeout: Duration::from_secs(120),
            stop_timeout: Duration::from_secs(10),
            log_ring_capacity: 500,
        }
    }
}

pub struct Supervisor {
    canonical: CanonicalName,
    entry: ModelEntry,
    config: SupervisorConfig,

    state_tx: watch::Sender<State>,
    state_rx: watch::Receiver<State>,
    // Serializes only the decision of who becomes the starter; holding it
    // does not span the whole startup, so concurrent ensure_ready callers
    // never wait on each other once a starter has been chosen.
    start_gate: AsyncMutex<()>,

    child: Arc<AsyncMutex<Option<async_process::Child>>>,
    in_flight: Arc<AtomicU32>,
    concurrency: Option<Arc<Semaphore>>,
    last_activity: std::sync::Mutex<Instant>,

    logs: Arc<LogRing>,
    bus: Bus,
    http: reqwest::Client,

    // The abort latch (spec §4.5 "Abort endpoint"): the forwarder checks
    // this at each streamed chunk boundary and stops reading from upstream
    // when it flips to `false`. Reset to `true` whenever a fresh forward
    // to this supervisor begins.
    continue_tx: watch::Sender<bool>,
}

impl Supervisor {
    pub fn new(canonical: CanonicalName, entry: ModelEntry, config: SupervisorConfig, bus: Bus) -> Self {
        let (state_tx, state_rx) = watch::channel(State::Stopped);
        let (continue_tx, _continue_rx) = watch::channel(true);
        let concurrency = entry
            .concurrency_limited()
            .map(|n| Arc::new(Semaphore::new(n as usize)));

        Self {
            canonical,
            entry,
            config: config.clone(),
            state_tx,
            state_rx,
            start_gate: AsyncMutex::new(()),
            child: Arc::new(AsyncMutex::new(None)),
            in_flight: Arc::new(AtomicU32::new(0)),
            concurrency,
            last_activity: std::sync::Mutex::new(Instant::now()),
            logs: Arc::new(LogRing::new(config.log_ring_capacity)),
            bus,
            http: reqwest::Client::new(),
            continue_tx,
        }
    }

    /// Flips the abort latch; the next chunk-boundary check in an
    /// in-flight forward to this supervisor observes `false` and closes
    /// the upstream connection.
    pub fn abort(&self) {
        let _ = self.continue_tx.send(false);
    }

    /// Resets the abort latch ahead of a fresh forward.
    pub fn reset_abort(&self) {
        let _ = self.continue_tx.send(true);
    }

    pub fn continue_rx(&self) -> watch::Receiver<bool> {
        self.continue_tx.subscribe()
    }

    pub fn canonical(&self) -> &CanonicalName {
        &self.canonical
    }

    pub fn entry(&self) -> &ModelEntry {
        &self.entry
    }

    pub fn state(&self) -> State {
        *self.state_rx.borrow()
    }

    pub fn in_flight(&self) -> u32 {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn touch_activity(&self) {
        *self.last_activity.lock().unwrap() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().unwrap().elapsed()
    }

    pub fn logs_channel(&self) -> Arc<LogRing> {
        self.logs.clone()
    }

    /// Brings the worker to `Ready`, spawning it if necessary, and returns a
    /// guard that keeps it from being reaped for idleness while held.
    ///
    /// Concurrent callers observing `Starting` never spawn a second process:
    /// exactly one caller performs the `Stopped` -> `Starting` transition and
    /// becomes "the starter"; everyone else awaits the same outcome on the
    /// state channel (spec §4.4/§8, eviction fairness).
    pub async fn ensure_ready(&self, ctx: &RequestContext) -> Result<ReadyHandle, Error> {
        loop {
            let current = self.state();
            match current {
                State::Ready => return self.acquire(ctx).await,
                State::Failed => {
                    return Err(Error::StartupFailed(
                        "worker previously failed to start; an operator must unload it before it is retried"
                            .to_string(),
                    ))
                }
                State::Stopped => {
                    let gate = self.start_gate.lock().await;
                    // Re-check: another caller may have started (and even
                    // finished) spawning while we waited for the gate.
                    if self.state() != State::Stopped {
                        drop(gate);
                        continue;
                    }
                    self.transition(State::Stopped, State::Starting, "starting on demand");
                    drop(gate);
                    self.spawn_and_watch(ctx).await?;
                    continue;
                }
                State::Starting | State::Stopping => {
                    self.await_terminal(ctx).await?;
                    continue;
                }
            }
        }
    }

    /// Waits for an in-flight slot, honouring `ctx`'s cancellation while
    /// queued behind a full `concurrency_limit` (spec §4.3 "transparently
    /// enqueues additional concurrent callers ... with cancellation
    /// support", §5 "every public operation takes an explicit cancellation
    /// signal").
    async fn acquire(&self, ctx: &RequestContext) -> Result<ReadyHandle, Error> {
        let permit = match &self.concurrency {
            Some(sem) => {
                let sem = sem.clone();
                tokio::select! {
                    permit = sem.acquire_owned() => {
                        Some(permit.map_err(|_| Error::Internal("concurrency semaphore closed".to_string()))?)
                    }
                    _ = ctx.cancel.cancelled() => return Err(Error::Cancelled),
                }
            }
            None => None,
        };
        self.touch_activity();
        Ok(ReadyHandle::new(self.in_flight.clone(), permit))
    }

    /// Waits for `Starting`/`Stopping` to resolve to a terminal state
    /// without itself becoming the starter.
    async fn await_terminal(&self, ctx: &RequestContext) -> Result<(), Error> {
        let mut rx = self.state_rx.clone();
        loop {
            let state = *rx.borrow();
            match state {
                State::Ready | State::Stopped | State::Failed => return Ok(()),
                _ => {}
            }
            tokio::select! {
                changed = rx.changed() => {
                    changed.map_err(|_| Error::Internal("supervisor state channel closed".to_string()))?;
                }
                _ = ctx.cancel.cancelled() => return Err(Error::Cancelled),
            }
        }
    }

    async fn spawn_and_watch(&self, ctx: &RequestContext) -> Result<(), Error> {
        let mut cmd = async_process::Command::new(&self.entry.command[0]);
        cmd.args(&self.entry.command[1..]);
        for (k, v) in &self.entry.env {
            cmd.env(k, v);
        }
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());

        let mut child = match async_process::spawn(cmd).await {
            Ok(child) => child,
            Err(err) => {
                self.transition(State::Starting, State::Failed, &format!("spawn failed: {err}"));
                return Err(Error::Spawn(err));
            }
        };

        if let Some(stdout) = child.stdout.take() {
            self.spawn_log_fanout(stdout, LogStream::Stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            self.spawn_log_fanout(stderr, LogStream::Stderr);
        }

        *self.child.lock().await = Some(child);

        let health_url = format!(
            "{}{}",
            self.entry.proxy_url.as_str().trim_end_matches('/'),
            self.entry.health_path
        );

        let deadline = Instant::now() + self.config.health_check_timeout;
        let mut backoff = Backoff::new(u32::MAX, Duration::from_millis(100), Some(Duration::from_secs(5)));
        let mut attempt: u32 = 0;

        loop {
            if ctx.cancel.is_cancelled() {
                self.transition(State::Starting, State::Stopping, "cancelled while starting");
                self.do_stop().await;
                return Err(Error::Cancelled);
            }

            if self.child_has_exited().await {
                self.transition(
                    State::Starting,
                    State::Failed,
                    "worker process exited before becoming healthy",
                );
                return Err(Error::StartupFailed(
                    "worker exited before its health check ever succeeded".to_string(),
                ));
            }

            if let Ok(resp) = self.http.get(&health_url).send().await {
                if resp.status().is_success() {
                    self.transition(State::Starting, State::Ready, "health check succeeded");
                    return Ok(());
                }
            }

            if Instant::now() >= deadline {
                self.transition(State::Starting, State::Failed, "health check timed out");
                self.do_stop().await;
                return Err(Error::Timeout(self.config.health_check_timeout));
            }

            attempt += 1;
            let wait = backoff.next(attempt).unwrap_or(Duration::from_secs(5));
            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(wait.min(remaining)).await;
        }
    }

    async fn child_has_exited(&self) -> bool {
        let mut guard = self.child.lock().await;
        match guard.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(Some(_))),
            None => true,
        }
    }

    fn spawn_log_fanout(&self, io: async_process::ChildStdio, stream: LogStream) {
        let logs = self.logs.clone();
        let bus = self.bus.clone();
        let canonical = self.canonical.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(io).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                logs.push(stream, line.clone());
                bus.publish(Event::LogData(LogLine {
                    canonical: canonical.clone(),
                    stream,
                    line,
                    at: chrono::Utc::now(),
                }));
            }
        });
    }

    /// Stops a running or starting worker. Prefers the entry's declared
    /// stop command (with `${PID}` substituted) over a bare signal; falls
    /// back to SIGTERM, then escalates to SIGKILL if the process outlives
    /// `stop_timeout`.
    pub async fn stop(&self, reason: &str) {
        let from = self.state();
        if !matches!(from, State::Ready | State::Starting) {
            return;
        }
        self.transition(from, State::Stopping, reason);
        self.do_stop().await;
        self.transition(State::Stopping, State::Stopped, reason);
    }

    async fn do_stop(&self) {
        if let Some(stop_command) = &self.entry.stop_command {
            let pid = self.child.lock().await.as_ref().map(|c| c.id());
            if let Some(pid) = pid {
                let argv: Vec<String> = stop_command
                    .iter()
                    .map(|arg| arg.replace("${PID}", &pid.to_string()))
                    .collect();
                if !argv.is_empty() {
                    let mut cmd = async_process::Command::new(&argv[0]);
                    cmd.args(&argv[1..]);
                    if let Ok(stopper) = async_process::spawn(cmd).await {
                        let _ = stopper.wait().await;
                    }
                }
            }
        } else if let Some(child) = self.child.lock().await.as_ref() {
            let _ = child.terminate();
        }

        let deadline = Instant::now() + self.config.stop_timeout;
        loop {
            if self.child_has_exited().await {
                return;
            }
            if Instant::now() >= deadline {
                if let Some(child) = self.child.lock().await.as_mut() {
                    let _ = child.kill();
                }
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    fn transition(&self, from: State, to: State, reason: &str) {
        if !Transition::is_legal(from, to) {
            tracing::error!(canonical = %self.canonical, ?from, ?to, "refusing illegal supervisor transition");
            return;
        }
        let _ = self.state_tx.send(to);
        self.bus.publish(Event::ProcessStateChange(Transition {
            canonical: self.canonical.clone(),
            from,
            to,
            reason: reason.to_string(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelgate_types::GroupId;
    use std::collections::BTreeMap;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn entry(proxy_url: &str, command: Vec<&str>) -> ModelEntry {
        ModelEntry {
            canonical: CanonicalName::from("test-model"),
            aliases: vec![],
            group: GroupId::default_group(),
            command: command.into_iter().map(String::from).collect(),
            stop_command: None,
            proxy_url: proxy_url.parse().unwrap(),
            health_path: "/health".to_string(),
            port: 0,
            env: BTreeMap::new(),
            idle_ttl: Duration::from_secs(600),
            unlisted: false,
            concurrency_limit: 0,
            use_upstream_name: None,
            send_loading_state: None,
            strip_params: vec![],
            name: None,
            description: None,
            metadata: BTreeMap::new(),
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::new("test-correlation".to_string(), None)
    }

    fn entry_with_limit(proxy_url: &str, command: Vec<&str>, concurrency_limit: u32) -> ModelEntry {
        ModelEntry {
            concurrency_limit,
            ..entry(proxy_url, command)
        }
    }

    #[tokio::test]
    async fn ensure_ready_spawns_and_waits_for_a_passing_health_check() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let sup = Supervisor::new(
            CanonicalName::from("test-model"),
            entry(&mock_server.uri(), vec!["sh", "-c", "sleep 5"]),
            SupervisorConfig {
                health_check_timeout: Duration::from_secs(5),
                stop_timeout: Duration::from_secs(2),
                log_ring_capacity: 16,
            },
            Bus::new(16),
        );

        let handle = sup.ensure_ready(&ctx()).await.expect("worker becomes ready");
        assert_eq!(sup.state(), State::Ready);
        assert_eq!(sup.in_flight(), 1);
        drop(handle);
        assert_eq!(sup.in_flight(), 0);

        sup.stop("test teardown").await;
        assert_eq!(sup.state(), State::Stopped);
    }

    #[tokio::test]
    async fn ensure_ready_fails_when_the_health_check_never_succeeds() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let sup = Supervisor::new(
            CanonicalName::from("test-model"),
            entry(&mock_server.uri(), vec!["sh", "-c", "sleep 5"]),
            SupervisorConfig {
                health_check_timeout: Duration::from_millis(300),
                stop_timeout: Duration::from_secs(2),
                log_ring_capacity: 16,
            },
            Bus::new(16),
        );

        let err = sup.ensure_ready(&ctx()).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert_eq!(sup.state(), State::Failed);
    }

    #[tokio::test]
    async fn concurrent_callers_during_startup_share_the_same_spawn() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let sup = Arc::new(Supervisor::new(
            CanonicalName::from("test-model"),
            entry(&mock_server.uri(), vec!["sh", "-c", "sleep 5"]),
            SupervisorConfig {
                health_check_timeout: Duration::from_secs(5),
                stop_timeout: Duration::from_secs(2),
                log_ring_capacity: 16,
            },
            Bus::new(16),
        ));

        let a = {
            let sup = sup.clone();
            tokio::spawn(async move { sup.ensure_ready(&ctx()).await.is_ok() })
        };
        let b = {
            let sup = sup.clone();
            tokio::spawn(async move { sup.ensure_ready(&ctx()).await.is_ok() })
        };

        assert!(a.await.unwrap());
        assert!(b.await.unwrap());
        assert_eq!(sup.state(), State::Ready);

        sup.stop("test teardown").await;
    }

    /// Spec §4.3/§5: a caller queued behind a full `concurrency_limit` must
    /// be cancellable rather than stuck waiting on the semaphore forever.
    #[tokio::test]
    async fn a_caller_queued_behind_the_concurrency_limit_can_be_cancelled() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let sup = Arc::new(Supervisor::new(
            CanonicalName::from("test-model"),
            entry_with_limit(&mock_server.uri(), vec!["sh", "-c", "sleep 5"], 1),
            SupervisorConfig {
                health_check_timeout: Duration::from_secs(5),
                stop_timeout: Duration::from_secs(2),
                log_ring_capacity: 16,
            },
            Bus::new(16),
        ));

        let holder = sup.ensure_ready(&ctx()).await.expect("first caller gets the only slot");
        assert_eq!(sup.in_flight(), 1);

        let queued_ctx = ctx();
        let cancel = queued_ctx.cancel.clone();
        let sup_clone = sup.clone();
        let queued = tokio::spawn(async move { sup_clone.ensure_ready(&queued_ctx).await });

        // Give the second caller a chance to actually block on the semaphore
        // before cancelling it.
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let err = queued.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Cancelled));

        drop(holder);
        sup.stop("test teardown").await;
    }
}
