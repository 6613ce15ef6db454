use modelgate_types::Kind;

/// Coordinator-specific error kinds (spec §4.4).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown model: {0}")]
    NotFound(String),
    #[error("group member is already running and the group does not allow swapping")]
    Conflict,
    #[error("operation cancelled")]
    Cancelled,
    #[error(transparent)]
    Supervisor(#[from] modelgate_process::Error),
}

impl Error {
    pub fn kind(&self) -> Kind {
        match self {
            Error::NotFound(_) => Kind::NotFound,
            Error::Conflict => Kind::Conflict,
            Error::Cancelled => Kind::Cancelled,
            Error::Supervisor(inner) => inner.kind(),
        }
    }
}
