// OAuth2 grants
//
// The token endpoint accepts three grant types. Each grant carries the
// application's client credentials; after a successful exchange the
// client keeps going with a refresh-token grant derived from it.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};

/// The application's OAuth2 client credentials.
#[derive(Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: SecretString,
}

impl ClientCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<SecretString>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// Secret material for a single grant type.
#[derive(Clone)]
pub enum GrantKind {
    /// Resource owner password credentials (`grant_type=password`).
    Password {
        username: String,
        password: SecretString,
    },
    /// Authorization code returned to the redirect URI.
    AuthorizationCode {
        code: SecretString,
        redirect_uri: Option<String>,
    },
    /// A refresh token from a previous exchange.
    RefreshToken { refresh_token: SecretString },
}

/// An OAuth2 grant: client credentials + grant material + optional scope.
#[derive(Clone)]
pub struct Grant {
    credentials: ClientCredentials,
    kind: GrantKind,
    scope: Option<String>,
}

impl Grant {
    pub fn password(
        credentials: ClientCredentials,
        username: impl Into<String>,
        password: impl Into<SecretString>,
    ) -> Self {
        Self {
            credentials,
            kind: GrantKind::Password {
                username: username.into(),
                password: password.into(),
            },
            scope: None,
        }
    }

    pub fn authorization_code(
        credentials: ClientCredentials,
        code: impl Into<SecretString>,
        redirect_uri: Option<String>,
    ) -> Self {
        Self {
            credentials,
            kind: GrantKind::AuthorizationCode {
                code: code.into(),
                redirect_uri,
            },
            scope: None,
        }
    }

    pub fn refresh_token(
        credentials: ClientCredentials,
        refresh_token: impl Into<SecretString>,
    ) -> Self {
        Self {
            credentials,
            kind: GrantKind::RefreshToken {
                refresh_token: refresh_token.into(),
            },
            scope: None,
        }
    }

    /// Space-separated scopes to request. Ignored for refresh grants.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn client_id(&self) -> &str {
        &self.credentials.client_id
    }

    pub fn credentials(&self) -> &ClientCredentials {
        &self.credentials
    }

    pub fn kind(&self) -> &GrantKind {
        &self.kind
    }

    /// The `grant_type` form value.
    pub fn grant_type(&self) -> &'static str {
        match self.kind {
            GrantKind::Password { .. } => "password",
            GrantKind::AuthorizationCode { .. } => "authorization_code",
            GrantKind::RefreshToken { .. } => "refresh_token",
        }
    }

    /// A refresh-token grant that reuses this grant's client credentials.
    pub fn to_refresh_grant(&self, refresh_token: SecretString) -> Self {
        Self::refresh_token(self.credentials.clone(), refresh_token)
    }

    /// Form parameters for `POST oauth2/token`. Exposes secrets; never log.
    pub(crate) fn form_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("grant_type", self.grant_type().to_owned()),
            ("client_id", self.credentials.client_id.clone()),
            (
                "client_secret",
                self.credentials.client_secret.expose_secret().to_owned(),
            ),
        ];

        match &self.kind {
            GrantKind::Password { username, password } => {
                params.push(("username", username.clone()));
                params.push(("password", password.expose_secret().to_owned()));
            }
            GrantKind::AuthorizationCode { code, redirect_uri } => {
                params.push(("code", code.expose_secret().to_owned()));
                if let Some(uri) = redirect_uri {
                    params.push(("redirect_uri", uri.clone()));
                }
            }
            GrantKind::RefreshToken { refresh_token } => {
                params.push(("refresh_token", refresh_token.expose_secret().to_owned()));
            }
        }

        if !matches!(self.kind, GrantKind::RefreshToken { .. }) {
            if let Some(scope) = &self.scope {
                params.push(("scope", scope.clone()));
            }
        }

        params
    }
}

impl fmt::Debug for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grant")
            .field("grant_type", &self.grant_type())
            .field("client_id", &self.credentials.client_id)
            .finish_non_exhaustive()
    }
}
