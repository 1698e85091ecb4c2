// ── Core error types ──
//
// User-facing errors from netatmo-core. Consumers never see raw HTTP
// status handling or JSON parse failures; the `From<netatmo_api::Error>`
// impl folds transport-layer errors into domain variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to Netatmo API at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Request timed out")]
    Timeout,

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Home not found: {id}")]
    HomeNotFound { id: String },

    #[error("Schedule not found: {id}")]
    ScheduleNotFound { id: String },

    #[error("Unknown timezone '{name}'")]
    UnknownTimezone { name: String },

    #[error("Schedule {schedule} has an invalid timetable: {message}")]
    InvalidTimetable { schedule: String, message: String },

    #[error("Unexpected response from Netatmo: {message}")]
    Malformed { message: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Command rejected: {message}")]
    Rejected { code: Option<i64>, message: String },

    #[error("API error: {message}")]
    Api {
        message: String,
        /// Vendor error code, when the body carried one.
        code: Option<i64>,
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// True when signing in again could resolve the error.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthenticationFailed { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<netatmo_api::Error> for CoreError {
    fn from(err: netatmo_api::Error) -> Self {
        match err {
            netatmo_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            netatmo_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        code: None,
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            netatmo_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            netatmo_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            netatmo_api::Error::RejectedCommand { code, message } => {
                CoreError::Rejected { code, message }
            }
            netatmo_api::Error::Api {
                status,
                code,
                message,
            } => CoreError::Api {
                message,
                code,
                status: Some(status),
            },
            netatmo_api::Error::MalformedResponse { message, body: _ } => {
                CoreError::Malformed { message }
            }
        }
    }
}
