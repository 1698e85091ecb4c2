// OAuth2 authentication
//
// Token exchange against `oauth2/token` plus the single-flight refresh
// used by every protected request. The session slot only ever holds a
// complete session; a failed refresh with a rejected grant empties it.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::client::{NetatmoClient, preview};
use crate::error::Error;
use crate::grant::Grant;
use crate::session::{Session, TokenError, TokenResponse};

const TOKEN_PATH: &str = "oauth2/token";

impl NetatmoClient {
    /// Exchange a grant for a session.
    ///
    /// Replaces any existing session. Fails with `Error::Authentication`
    /// when the vendor rejects the grant (wrong password, revoked or
    /// expired code, unknown client).
    pub async fn authenticate(&self, grant: &Grant) -> Result<(), Error> {
        let _guard = self.inner().refresh_lock.lock().await;

        let session = self.exchange(grant, self.next_generation()).await?;

        info!(?grant, "authenticated");
        self.store_session(Some(Arc::new(session)));
        Ok(())
    }

    /// Force a token refresh using the stored refresh token.
    ///
    /// Concurrent callers share the result of a single exchange.
    pub async fn refresh(&self) -> Result<(), Error> {
        let session = self.current_session().ok_or_else(Error::not_authenticated)?;
        self.refresh_from(&session).await.map(|_| ())
    }

    /// Drop the session locally. Subsequent calls fail until
    /// [`authenticate`](Self::authenticate) is called again.
    pub fn sign_out(&self) {
        debug!("signing out");
        self.store_session(None);
    }

    /// The current session, refreshed first if it is about to expire.
    pub(crate) async fn valid_session(&self) -> Result<Arc<Session>, Error> {
        let session = self.current_session().ok_or_else(Error::not_authenticated)?;
        if session.is_stale() {
            debug!("access token about to expire, refreshing");
            return self.refresh_from(&session).await;
        }
        Ok(session)
    }

    /// Replace `stale` with a fresh session.
    ///
    /// Callers holding the same stale generation queue on the refresh
    /// lock; only the first performs the exchange, the rest pick up the
    /// session it stored.
    pub(crate) async fn refresh_from(&self, stale: &Session) -> Result<Arc<Session>, Error> {
        let _guard = self.inner().refresh_lock.lock().await;

        let current = self.current_session().ok_or_else(|| Error::Authentication {
            message: "session was invalidated".into(),
        })?;
        if current.generation() != stale.generation() {
            debug!(generation = current.generation(), "session already refreshed");
            return Ok(current);
        }

        let grant = current.refresh_grant().clone();
        match self.exchange(&grant, self.next_generation()).await {
            Ok(session) => {
                info!(generation = session.generation(), "access token refreshed");
                let session = Arc::new(session);
                self.store_session(Some(Arc::clone(&session)));
                Ok(session)
            }
            Err(e @ Error::Authentication { .. }) => {
                warn!(error = %e, "refresh grant rejected, session cleared");
                self.store_session(None);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// `POST oauth2/token` with the grant's form parameters.
    async fn exchange(&self, grant: &Grant, generation: u64) -> Result<Session, Error> {
        let url = self.endpoint(TOKEN_PATH)?;
        debug!(grant_type = grant.grant_type(), "requesting token at {}", url);

        let resp = self
            .http()
            .post(url)
            .form(&grant.form_params())
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = resp.status();
        let body = resp.text().await.map_err(Error::Transport)?;

        if status.is_success() {
            // The body may carry tokens, so it is not kept in the error.
            let token: TokenResponse = serde_json::from_str(&body)
                .map_err(|e| Error::malformed(format!("token response: {e}"), ""))?;
            return Session::from_token(token, grant, generation);
        }

        if status.is_client_error() {
            let message = match serde_json::from_str::<TokenError>(&body) {
                Ok(TokenError {
                    error,
                    error_description: Some(desc),
                }) => format!("{error}: {desc}"),
                Ok(TokenError { error, .. }) => error,
                Err(_) => format!("HTTP {status}: {}", preview(&body)),
            };
            return Err(Error::Authentication { message });
        }

        Err(Error::Api {
            status: status.as_u16(),
            code: None,
            message: format!("token endpoint failed: {}", preview(&body)),
        })
    }
}
