//! Typed publish/subscribe event bus (spec §4.6).
//!
//! Built on [`tokio::sync::broadcast`]: publishing never blocks, and a
//! subscriber that falls behind silently drops its oldest unread events
//! rather than back-pressuring the publisher (`RecvError::Lagged`).
//! Ordering is guaranteed per publisher (a single `Bus` handle), not
//! across independently cloned handles.

use modelgate_types::{supervisor::Transition, CanonicalName};
use tokio::sync::broadcast;

/// One event payload flowing through the bus.
#[derive(Clone)]
pub enum Event {
    ProcessStateChange(Transition),
    ChatCompletionStats(ChatCompletionStats),
    ConfigFileChanged(ReloadingState),
    LogData(LogLine),
    TokenMetrics(TokenMetrics),
    ModelPreloaded(ModelPreloaded),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::ProcessStateChange(_) => EventKind::PROCESS_STATE_CHANGE,
            Event::ChatCompletionStats(_) => EventKind::CHAT_COMPLETION_STATS,
            Event::ConfigFileChanged(_) => EventKind::CONFIG_FILE_CHANGED,
            Event::LogData(_) => EventKind::LOG_DATA,
            Event::TokenMetrics(_) => EventKind::TOKEN_METRICS,
            Event::ModelPreloaded(_) => EventKind::MODEL_PRELOADED,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadingState {
    Start,
    End,
}

#[derive(Debug, Clone)]
pub struct ChatCompletionStats {
    pub canonical: CanonicalName,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub duration: std::time::Duration,
}

#[derive(Debug, Clone)]
pub struct LogLine {
    pub canonical: CanonicalName,
    pub stream: LogStream,
    pub line: String,
    pub at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone)]
pub struct TokenMetrics {
    pub canonical: CanonicalName,
    pub tokens_per_second: f64,
}

#[derive(Debug, Clone)]
pub struct ModelPreloaded {
    pub canonical: CanonicalName,
    pub ok: bool,
    pub detail: Option<String>,
}

/// A bitmask over event kinds, used by subscribers to filter the events
/// they want delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventKind(u8);

impl EventKind {
    pub const PROCESS_STATE_CHANGE: EventKind = EventKind(1 << 0);
    pub const CHAT_COMPLETION_STATS: EventKind = EventKind(1 << 1);
    pub const CONFIG_FILE_CHANGED: EventKind = EventKind(1 << 2);
    pub const LOG_DATA: EventKind = EventKind(1 << 3);
    pub const TOKEN_METRICS: EventKind = EventKind(1 << 4);
    pub const MODEL_PRELOADED: EventKind = EventKind(1 << 5);
    pub const ALL: EventKind = EventKind(0b11_1111);

    pub fn contains(self, other: EventKind) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for EventKind {
    type Output = EventKind;
    fn bitor(self, rhs: EventKind) -> EventKind {
        EventKind(self.0 | rhs.0)
    }
}

/// A cheaply-cloneable handle onto the bus. Every clone publishes into and
/// subscribes from the same underlying channel.
#[derive(Clone)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

/// A subscription with a kind mask applied client-side: `recv` silently
/// skips events the caller did not ask for.
pub struct Subscription {
    rx: broadcast::Receiver<Event>,
    mask: EventKind,
}

impl Bus {
    /// `capacity` bounds each subscriber's backlog; once exceeded, the
    /// subscriber's oldest unread events are dropped.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: Event) {
        // No receivers is not an error: nothing is listening yet.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self, mask: EventKind) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            mask,
        }
    }
}

impl Subscription {
    /// Awaits the next event matching this subscription's mask, logging
    /// and continuing past lag so a slow consumer never wedges the loop.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.mask.contains(event.kind()) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event subscriber fell behind, dropped oldest events");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.kind_name())
    }
}

impl Event {
    fn kind_name(&self) -> &'static str {
        match self {
            Event::ProcessStateChange(_) => "ProcessStateChange",
            Event::ChatCompletionStats(_) => "ChatCompletionStats",
            Event::ConfigFileChanged(_) => "ConfigFileChanged",
            Event::LogData(_) => "LogData",
            Event::TokenMetrics(_) => "TokenMetrics",
            Event::ModelPreloaded(_) => "ModelPreloaded",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = Bus::new(8);
        let mut sub = bus.subscribe(EventKind::ALL);

        bus.publish(Event::ConfigFileChanged(ReloadingState::Start));

        match sub.recv().await {
            Some(Event::ConfigFileChanged(ReloadingState::Start)) => {}
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn mask_filters_out_unwanted_kinds() {
        let bus = Bus::new(8);
        let mut sub = bus.subscribe(EventKind::LOG_DATA);

        bus.publish(Event::ConfigFileChanged(ReloadingState::Start));
        bus.publish(Event::LogData(LogLine {
            canonical: CanonicalName::from("model-a"),
            stream: LogStream::Stdout,
            line: "hello".into(),
            at: chrono::Utc::now(),
        }));

        match sub.recv().await {
            Some(Event::LogData(line)) => assert_eq!(line.line, "hello"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn a_lagging_subscriber_drops_oldest_rather_than_blocking_the_publisher() {
        let bus = Bus::new(2);
        let mut sub = bus.subscribe(EventKind::ALL);

        for _ in 0..10 {
            bus.publish(Event::ConfigFileChanged(ReloadingState::Start));
        }

        // The publisher never blocked; the subscriber can still make
        // progress afterwards instead of seeing every dropped event.
        assert!(sub.recv().await.is_some());
    }
}
