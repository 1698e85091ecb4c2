// Netatmo API HTTP client
//
// Wraps `reqwest::Client` with bearer-token injection, envelope
// unwrapping, and vendor error classification. Endpoint groups (homes,
// devices, commands) and the OAuth2 flow are implemented as inherent
// methods in separate files to keep this module focused on transport
// mechanics.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::models::{ApiErrorEnvelope, ApiResponse};
use crate::session::{AuthState, Session};
use crate::transport::TransportConfig;

/// Production API root.
pub const DEFAULT_API_URL: &str = "https://api.netatmo.com/";

/// Vendor error codes meaning the access token is invalid or expired.
/// Code 1 (token missing) is not among them: a refresh cannot fix it.
const TOKEN_ERROR_CODES: [i64; 2] = [2, 3];

/// Vendor error codes that reject a state change rather than the session.
const REJECTION_CODES: [i64; 7] = [7, 9, 10, 13, 21, 40, 41];

/// How a non-success response should be classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Endpoint {
    /// Read-only resource endpoint.
    Read,
    /// State-changing endpoint: client errors become `RejectedCommand`.
    Command,
}

/// Result of a single authenticated attempt.
enum Attempt<T> {
    Done(ApiResponse<T>),
    TokenExpired,
}

/// Async client for the Netatmo / Legrand API.
///
/// Owns exactly one OAuth2 session. Cloning is cheap and clones share the
/// session, so a refresh performed through one clone is seen by all.
#[derive(Clone)]
pub struct NetatmoClient {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub(crate) http: reqwest::Client,
    pub(crate) base_url: Url,
    pub(crate) session: RwLock<Option<Arc<Session>>>,
    /// Serializes token exchanges: at most one refresh in flight.
    pub(crate) refresh_lock: tokio::sync::Mutex<()>,
    generation: AtomicU64,
}

impl NetatmoClient {
    /// Create a client from a `TransportConfig`.
    ///
    /// `base_url` is the API root, normally [`DEFAULT_API_URL`].
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, base_url))
    }

    /// Create a client against the production API with default transport.
    pub fn production() -> Result<Self, Error> {
        let url = Url::parse(DEFAULT_API_URL)?;
        Self::new(url, &TransportConfig::default())
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, mut base_url: Url) -> Self {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            inner: Arc::new(Inner {
                http,
                base_url,
                session: RwLock::new(None),
                refresh_lock: tokio::sync::Mutex::new(()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// The API root URL.
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// The underlying HTTP client.
    pub fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    /// Current authentication state.
    pub fn auth_state(&self) -> AuthState {
        match self.current_session() {
            Some(session) => AuthState::Authenticated {
                expires_at: session.expires_at(),
            },
            None => AuthState::Unauthenticated,
        }
    }

    // ── Session slot ─────────────────────────────────────────────────

    pub(crate) fn inner(&self) -> &Inner {
        &self.inner
    }

    /// Next session generation; never reused for the client's lifetime.
    pub(crate) fn next_generation(&self) -> u64 {
        self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn current_session(&self) -> Option<Arc<Session>> {
        self.inner
            .session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn store_session(&self, session: Option<Arc<Session>>) {
        *self
            .inner
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner) = session;
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Resolve an endpoint path (e.g. `api/homesdata`) against the API root.
    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, Error> {
        Ok(self.inner.base_url.join(path)?)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// POST a JSON body to a protected endpoint and unwrap the envelope.
    ///
    /// A stale token is refreshed before sending. If the vendor still
    /// reports the token as expired, one refresh + retry is attempted;
    /// a second expiry surfaces as `Error::Authentication`.
    pub(crate) async fn post_api<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &(impl Serialize + Sync),
        kind: Endpoint,
    ) -> Result<ApiResponse<T>, Error> {
        let url = self.endpoint(path)?;
        let session = self.valid_session().await?;

        match self.attempt(&url, body, &session, kind).await? {
            Attempt::Done(resp) => Ok(resp),
            Attempt::TokenExpired => {
                debug!("access token rejected, refreshing once");
                let fresh = self.refresh_from(&session).await?;
                match self.attempt(&url, body, &fresh, kind).await? {
                    Attempt::Done(resp) => Ok(resp),
                    Attempt::TokenExpired => Err(Error::Authentication {
                        message: "access token rejected after refresh".into(),
                    }),
                }
            }
        }
    }

    async fn attempt<T: DeserializeOwned>(
        &self,
        url: &Url,
        body: &(impl Serialize + Sync),
        session: &Session,
        kind: Endpoint,
    ) -> Result<Attempt<T>, Error> {
        debug!("POST {}", url);

        let resp = self
            .inner
            .http
            .post(url.clone())
            .bearer_auth(session.bearer())
            .json(body)
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = resp.status();
        let text = resp.text().await.map_err(Error::Transport)?;
        trace!(%status, len = text.len(), "response received");

        if let Some(failure) = classify_failure(status, &text, kind) {
            return match failure {
                Failure::TokenExpired => Ok(Attempt::TokenExpired),
                Failure::Error(e) => Err(e),
            };
        }

        parse_envelope(&text).map(Attempt::Done)
    }
}

impl fmt::Debug for NetatmoClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetatmoClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("auth_state", &self.auth_state())
            .finish_non_exhaustive()
    }
}

// ── Response classification ──────────────────────────────────────────

enum Failure {
    TokenExpired,
    Error(Error),
}

/// Decide whether a response is a failure, and of which kind.
///
/// The vendor sometimes reports errors with HTTP 200, so the body is
/// checked for an `error` object regardless of status.
fn classify_failure(status: reqwest::StatusCode, body: &str, kind: Endpoint) -> Option<Failure> {
    let detail = serde_json::from_str::<ApiErrorEnvelope>(body)
        .ok()
        .map(|e| e.error);

    if status.is_success() && detail.is_none() {
        return None;
    }

    let code = detail.as_ref().and_then(|d| d.code);
    let message = detail
        .and_then(|d| d.message)
        .unwrap_or_else(|| format!("HTTP {status}: {}", preview(body)));

    if status == reqwest::StatusCode::UNAUTHORIZED
        || code.is_some_and(|c| TOKEN_ERROR_CODES.contains(&c))
    {
        return Some(Failure::TokenExpired);
    }

    let rejected = kind == Endpoint::Command
        && (status.is_client_error() || code.is_some_and(|c| REJECTION_CODES.contains(&c)));
    if rejected {
        return Some(Failure::Error(Error::RejectedCommand { code, message }));
    }

    Some(Failure::Error(Error::Api {
        status: status.as_u16(),
        code,
        message,
    }))
}

fn parse_envelope<T: DeserializeOwned>(body: &str) -> Result<ApiResponse<T>, Error> {
    let envelope: ApiResponse<T> = serde_json::from_str(body)
        .map_err(|e| Error::malformed(format!("{e} (body preview: {:?})", preview(body)), body))?;

    match envelope.status.as_deref() {
        None | Some("ok") => Ok(envelope),
        Some(other) => Err(Error::malformed(
            format!("unexpected status '{other}'"),
            body,
        )),
    }
}

pub(crate) fn preview(body: &str) -> &str {
    let end = body
        .char_indices()
        .nth(200)
        .map_or(body.len(), |(idx, _)| idx);
    &body[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    fn classify(status: StatusCode, body: &str, kind: Endpoint) -> Option<Failure> {
        classify_failure(status, body, kind)
    }

    #[test]
    fn success_without_error_object() {
        assert!(classify(StatusCode::OK, r#"{"status":"ok"}"#, Endpoint::Read).is_none());
    }

    #[test]
    fn expired_token_code_on_403() {
        let body = r#"{"error":{"code":3,"message":"Access token expired"}}"#;
        assert!(matches!(
            classify(StatusCode::FORBIDDEN, body, Endpoint::Read),
            Some(Failure::TokenExpired)
        ));
    }

    #[test]
    fn missing_token_code_is_not_refreshed() {
        let body = r#"{"error":{"code":1,"message":"Access token missing"}}"#;
        assert!(matches!(
            classify(StatusCode::FORBIDDEN, body, Endpoint::Read),
            Some(Failure::Error(Error::Api { status: 403, code: Some(1), .. }))
        ));
    }

    #[test]
    fn bare_401_is_token_expired() {
        assert!(matches!(
            classify(StatusCode::UNAUTHORIZED, "", Endpoint::Command),
            Some(Failure::TokenExpired)
        ));
    }

    #[test]
    fn invalid_argument_on_command_is_rejection() {
        let body = r#"{"error":{"code":21,"message":"Invalid argument"}}"#;
        match classify(StatusCode::BAD_REQUEST, body, Endpoint::Command) {
            Some(Failure::Error(Error::RejectedCommand { code, message })) => {
                assert_eq!(code, Some(21));
                assert_eq!(message, "Invalid argument");
            }
            _ => panic!("expected RejectedCommand"),
        }
    }

    #[test]
    fn invalid_argument_on_read_is_api_error() {
        let body = r#"{"error":{"code":21,"message":"Invalid argument"}}"#;
        assert!(matches!(
            classify(StatusCode::BAD_REQUEST, body, Endpoint::Read),
            Some(Failure::Error(Error::Api { status: 400, code: Some(21), .. }))
        ));
    }

    #[test]
    fn error_object_with_http_200() {
        let body = r#"{"error":{"code":13,"message":"Operation forbidden"}}"#;
        assert!(matches!(
            classify(StatusCode::OK, body, Endpoint::Command),
            Some(Failure::Error(Error::RejectedCommand { code: Some(13), .. }))
        ));
    }

    #[test]
    fn server_error_on_command_is_api_error() {
        assert!(matches!(
            classify(StatusCode::BAD_GATEWAY, "upstream down", Endpoint::Command),
            Some(Failure::Error(Error::Api { status: 502, code: None, .. }))
        ));
    }

    #[test]
    fn envelope_with_failed_status_is_malformed() {
        let err = parse_envelope::<serde_json::Value>(r#"{"status":"failed"}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }));
    }

    #[test]
    fn preview_respects_char_boundaries() {
        let long = "é".repeat(300);
        assert_eq!(preview(&long).chars().count(), 200);
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn base_url_gets_trailing_slash() {
        let client = NetatmoClient::with_client(
            reqwest::Client::new(),
            Url::parse("http://localhost:9000/prefix").unwrap(),
        );
        assert_eq!(
            client.endpoint("api/homesdata").unwrap().as_str(),
            "http://localhost:9000/prefix/api/homesdata"
        );
        assert_eq!(client.auth_state(), AuthState::Unauthenticated);
    }

    #[test]
    fn debug_shows_url_and_state_only() {
        let client = NetatmoClient::with_client(
            reqwest::Client::new(),
            Url::parse("http://localhost:9000/").unwrap(),
        );
        let rendered = format!("{client:?}");
        assert!(rendered.contains("http://localhost:9000/"));
        assert!(rendered.contains("Unauthenticated"));
    }
}
