use thiserror::Error;

/// Top-level error type for the `netatmo-api` crate.
///
/// Covers every failure mode of the client: OAuth2 authentication,
/// transport, vendor-side rejection, and unexpected payload shapes.
/// `netatmo-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Token request rejected (wrong credentials, revoked grant, etc.)
    /// or session expired and could not be refreshed.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Vendor API ──────────────────────────────────────────────────
    /// The vendor refused a state change (invalid argument, forbidden
    /// operation, unknown device) or the command failed local validation.
    #[error("Command rejected: {message}")]
    RejectedCommand { code: Option<i64>, message: String },

    /// Any other non-success answer from the vendor API.
    #[error("Netatmo API error (HTTP {status}): {message}")]
    Api {
        status: u16,
        code: Option<i64>,
        message: String,
    },

    // ── Data ────────────────────────────────────────────────────────
    /// Response body did not have the expected JSON shape,
    /// with the raw body for debugging.
    #[error("Malformed response: {message}")]
    MalformedResponse { message: String, body: String },
}

impl Error {
    /// Returns `true` if this error indicates the session is gone
    /// and re-authentication might resolve it.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns `true` if this is a transient error worth retrying by the caller.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Extract the vendor error code, if available.
    pub fn api_error_code(&self) -> Option<i64> {
        match self {
            Self::RejectedCommand { code, .. } | Self::Api { code, .. } => *code,
            _ => None,
        }
    }

    pub(crate) fn not_authenticated() -> Self {
        Self::Authentication {
            message: "not authenticated -- call authenticate() first".into(),
        }
    }

    pub(crate) fn malformed(message: impl Into<String>, body: &str) -> Self {
        Self::MalformedResponse {
            message: message.into(),
            body: body.to_owned(),
        }
    }
}
