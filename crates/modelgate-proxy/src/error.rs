use modelgate_types::Kind;

/// Forwarder-specific error kinds (spec §4.5 step 7).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid request body: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Coordinator(#[from] modelgate_coordinator::Error),
    #[error("upstream request timed out")]
    Timeout,
    #[error("upstream returned a server error: {0}")]
    Upstream5xx(u16),
    #[error("upstream connection closed unexpectedly")]
    UpstreamClosed,
    #[error("client disconnected before the forward completed")]
    ClientCancelled,
}

impl Error {
    pub fn kind(&self) -> Kind {
        match self {
            Error::InvalidInput(_) => Kind::InvalidInput,
            Error::Coordinator(inner) => inner.kind(),
            Error::Timeout => Kind::Timeout,
            Error::Upstream5xx(_) => Kind::UpstreamFailure,
            Error::UpstreamClosed => Kind::UpstreamFailure,
            Error::ClientCancelled => Kind::Cancelled,
        }
    }
}
