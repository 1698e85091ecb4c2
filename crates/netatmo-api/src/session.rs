// OAuth2 session state
//
// A `Session` is an immutable snapshot of one successful token exchange.
// The client swaps whole sessions behind a lock; the generation counter
// lets concurrent callers tell whether someone else already refreshed.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::time::Instant;

use crate::error::Error;
use crate::grant::Grant;

/// Refresh this long before the vendor-declared expiry.
pub(crate) const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Successful body of `POST oauth2/token`.
#[derive(Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
}

/// Error body of `POST oauth2/token`: `{"error": "invalid_grant"}`.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenError {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Observable authentication state of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticated { expires_at: DateTime<Utc> },
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }
}

/// Tokens from one exchange plus the grant that renews them.
pub(crate) struct Session {
    access_token: SecretString,
    refresh_grant: Grant,
    expires_at: DateTime<Utc>,
    deadline: Instant,
    generation: u64,
}

impl Session {
    /// Fails when `expires_in` does not fit a point in time.
    pub(crate) fn from_token(
        token: TokenResponse,
        grant: &Grant,
        generation: u64,
    ) -> Result<Self, Error> {
        let expires_in = token.expires_in;
        let lifetime = Duration::from_secs(expires_in);
        let out_of_range =
            || Error::malformed(format!("token expires_in out of range: {expires_in}"), "");

        let expires_at = chrono::Duration::from_std(lifetime)
            .ok()
            .and_then(|d| Utc::now().checked_add_signed(d))
            .ok_or_else(out_of_range)?;
        let deadline = Instant::now().checked_add(lifetime).ok_or_else(out_of_range)?;

        Ok(Self {
            access_token: SecretString::from(token.access_token),
            refresh_grant: grant.to_refresh_grant(SecretString::from(token.refresh_token)),
            expires_at,
            deadline,
            generation,
        })
    }

    pub(crate) fn bearer(&self) -> &str {
        self.access_token.expose_secret()
    }

    pub(crate) fn refresh_grant(&self) -> &Grant {
        &self.refresh_grant
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// True once the token is within [`EXPIRY_MARGIN`] of its deadline.
    pub(crate) fn is_stale(&self) -> bool {
        Instant::now() + EXPIRY_MARGIN >= self.deadline
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("expires_at", &self.expires_at)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}
