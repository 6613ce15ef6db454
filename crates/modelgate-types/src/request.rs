use crate::CanonicalName;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Correlates one inbound request across the forwarder, the coordinator,
/// and the supervisor it is eventually routed to (spec §3 "Request context").
#[derive(Clone)]
pub struct RequestContext {
    pub correlation_id: String,
    pub cancel: CancellationToken,
    pub timeout: Option<Duration>,
    target: std::sync::Arc<std::sync::Mutex<Option<CanonicalName>>>,
}

impl RequestContext {
    pub fn new(correlation_id: String, timeout: Option<Duration>) -> Self {
        Self {
            correlation_id,
            cancel: CancellationToken::new(),
            timeout,
            target: Default::default(),
        }
    }

    /// A child token: cancelling the parent cancels the child, but
    /// cancelling the child does not affect the parent or siblings.
    pub fn child_cancel(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    pub fn set_target(&self, canonical: CanonicalName) {
        *self.target.lock().unwrap() = Some(canonical);
    }

    pub fn target(&self) -> Option<CanonicalName> {
        self.target.lock().unwrap().clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
