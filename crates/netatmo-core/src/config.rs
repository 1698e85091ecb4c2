// ── Runtime connection configuration ──
//
// These types describe *how* to reach the Netatmo API and which grant to
// sign in with. They carry credential data and connection tuning, but
// never touch disk: netatmo-config (or the application) builds a
// `NetatmoConfig` and hands it in.

use std::time::Duration;

use netatmo_api::{ClientCredentials, Grant, NetatmoClient, TlsMode, TransportConfig};
use secrecy::SecretString;
use tracing::{debug, info};
use url::Url;

use crate::error::CoreError;
use crate::monitor::DEFAULT_POLL_INTERVAL;

/// Which OAuth2 grant to sign in with.
#[derive(Debug, Clone)]
pub enum AuthCredentials {
    /// Account username + password.
    Password {
        username: String,
        password: SecretString,
    },
    /// A refresh token obtained earlier (e.g. from the developer portal).
    RefreshToken(SecretString),
    /// An authorization code returned to the app's redirect URI.
    AuthorizationCode {
        code: SecretString,
        redirect_uri: Option<String>,
    },
}

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file, for proxies in front of the API.
    CustomCa(std::path::PathBuf),
    /// Skip verification. Only meaningful against local test doubles.
    DangerAcceptInvalid,
}

/// Configuration for one Netatmo account.
#[derive(Debug, Clone)]
pub struct NetatmoConfig {
    /// API root (e.g., `https://api.netatmo.com/`).
    pub url: Url,
    pub client_id: String,
    pub client_secret: SecretString,
    pub auth: AuthCredentials,
    /// Space-separated OAuth2 scopes; vendor default when `None`.
    pub scope: Option<String>,
    pub tls: TlsVerification,
    /// Request timeout.
    pub timeout: Duration,
    /// Monitor polling cycle.
    pub poll_interval: Duration,
}

impl NetatmoConfig {
    /// Config against the production API with default tuning.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: SecretString,
        auth: AuthCredentials,
    ) -> Result<Self, CoreError> {
        let url = Url::parse(netatmo_api::DEFAULT_API_URL).map_err(|e| CoreError::Config {
            message: format!("invalid default API URL: {e}"),
        })?;
        Ok(Self {
            url,
            client_id: client_id.into(),
            client_secret,
            auth,
            scope: None,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// The OAuth2 grant described by this config.
    pub fn grant(&self) -> Grant {
        let credentials = ClientCredentials::new(self.client_id.clone(), self.client_secret.clone());
        let grant = match &self.auth {
            AuthCredentials::Password { username, password } => {
                Grant::password(credentials, username.clone(), password.clone())
            }
            AuthCredentials::RefreshToken(token) => Grant::refresh_token(credentials, token.clone()),
            AuthCredentials::AuthorizationCode { code, redirect_uri } => {
                Grant::authorization_code(credentials, code.clone(), redirect_uri.clone())
            }
        };
        match &self.scope {
            Some(scope) => grant.with_scope(scope.clone()),
            None => grant,
        }
    }

    pub fn transport(&self) -> TransportConfig {
        let tls = match &self.tls {
            TlsVerification::SystemDefaults => TlsMode::System,
            TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        };
        TransportConfig::default()
            .with_tls(tls)
            .with_timeout(self.timeout)
    }
}

/// Build a client from `config` and sign in.
pub async fn connect(config: &NetatmoConfig) -> Result<NetatmoClient, CoreError> {
    if config.client_id.trim().is_empty() {
        return Err(CoreError::Config {
            message: "client_id must not be empty".into(),
        });
    }

    let client = NetatmoClient::new(config.url.clone(), &config.transport())?;
    debug!(url = %config.url, "authenticating");
    client.authenticate(&config.grant()).await?;
    info!(client_id = %config.client_id, "connected to Netatmo API");
    Ok(client)
}
