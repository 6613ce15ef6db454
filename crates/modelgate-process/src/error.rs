use modelgate_types::Kind;

/// Process-supervisor-specific error kinds (spec §4.3, §7). Each maps onto
/// one of the error kinds every fallible operation in the scheduler
/// classifies itself into.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("health check did not succeed within {0:?}")]
    Timeout(std::time::Duration),
    #[error("worker exited before becoming ready: {0}")]
    StartupFailed(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("spawning worker process: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl Error {
    pub fn kind(&self) -> Kind {
        match self {
            Error::Timeout(_) => Kind::Timeout,
            Error::StartupFailed(_) => Kind::UpstreamFailure,
            Error::Cancelled => Kind::Cancelled,
            Error::Spawn(_) => Kind::Internal,
            Error::Internal(_) => Kind::Internal,
        }
    }
}
