/// The error kinds of spec §7. These are not Rust type names but a
/// classification every fallible operation in the scheduler maps its
/// failures onto, so that the HTTP boundary can translate uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    InvalidInput,
    ConfigError,
    NotFound,
    Conflict,
    Timeout,
    UpstreamFailure,
    Cancelled,
    Internal,
    /// Not one of the kinds §7 enumerates under "Error kinds", but its
    /// HTTP status table lists `Unauthorised→401` separately from
    /// `InvalidInput→400`; kept distinct so the auth middleware doesn't
    /// have to misreport a missing/bad bearer token as a malformed body.
    Unauthorized,
}

impl Kind {
    /// Numeric code surfaced in the JSON-RPC-style error envelope.
    pub fn code(self) -> i32 {
        match self {
            Kind::InvalidInput => -32001,
            Kind::ConfigError => -32002,
            Kind::NotFound => -32003,
            Kind::Conflict => -32004,
            Kind::Timeout => -32005,
            Kind::UpstreamFailure => -32006,
            Kind::Cancelled => -32007,
            Kind::Internal => -32000,
            Kind::Unauthorized => -32008,
        }
    }

    /// HTTP status this kind maps to when the client is still connected.
    /// `Cancelled` is special-cased by callers: 499 if the client hung up,
    /// 204 if the server cancelled it while the client is still waiting.
    pub fn http_status(self) -> u16 {
        match self {
            Kind::InvalidInput => 400,
            Kind::ConfigError => 500,
            Kind::NotFound => 404,
            Kind::Conflict => 409,
            Kind::Timeout => 408,
            Kind::UpstreamFailure => 502,
            Kind::Cancelled => 499,
            Kind::Internal => 500,
            Kind::Unauthorized => 401,
        }
    }
}

/// The JSON-RPC-style envelope every error surfaced over HTTP is translated
/// into (spec §7).
#[derive(Debug, Clone, serde::Serialize)]
pub struct ErrorEnvelope {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ErrorEnvelope {
    pub fn new(kind: Kind, message: impl Into<String>) -> Self {
        Self {
            code: kind.code(),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_statuses_match_spec_table() {
        assert_eq!(Kind::InvalidInput.http_status(), 400);
        assert_eq!(Kind::NotFound.http_status(), 404);
        assert_eq!(Kind::Timeout.http_status(), 408);
        assert_eq!(Kind::Conflict.http_status(), 409);
        assert_eq!(Kind::UpstreamFailure.http_status(), 502);
    }
}
