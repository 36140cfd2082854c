//! Federated (authorization-code) sign-in.
//!
//! The server redirects to the provider's authorize URL with a one-time
//! `state`; the provider redirects back with a `code`, which a
//! [`CodeExchange`] trades for the signed-in identity.

use crate::error::AuthError;
use async_trait::async_trait;
use serde::Deserialize;

/// Identity asserted by the federated provider.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct FederatedIdentity {
    /// Provider-scoped subject identifier
    #[serde(rename = "sub")]
    pub subject: String,
    pub email: String,
    /// Absent in the token response counts as unverified
    #[serde(default)]
    pub email_verified: bool,
}

/// Endpoints and client credentials of the federated provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FederatedConfig {
    pub authorize_url: String,
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Where the provider sends the browser back to (our callback route)
    pub redirect_url: String,
}

#[cfg(feature = "web")]
impl FederatedConfig {
    pub fn authorize_redirect(&self, state: &str) -> String {
        let separator = if self.authorize_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}response_type=code&scope={}&client_id={}&redirect_uri={}&state={}",
            self.authorize_url,
            separator,
            urlencoding::encode("openid email"),
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_url),
            urlencoding::encode(state),
        )
    }
}

/// Trades an authorization code for an identity.
#[async_trait]
pub trait CodeExchange: Send + Sync {
    async fn exchange(&self, code: &str) -> Result<FederatedIdentity, AuthError>;
}

/// Exchanges codes by POSTing to the provider's token endpoint.
///
/// The endpoint is expected to answer with a JSON body carrying at least
/// `sub` and `email`, and `email_verified` when the provider checked it.
#[cfg(feature = "web")]
pub struct HttpCodeExchange {
    client: reqwest::Client,
    config: FederatedConfig,
}

#[cfg(feature = "web")]
impl HttpCodeExchange {
    pub fn new(config: FederatedConfig) -> Self {
        HttpCodeExchange {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[cfg(feature = "web")]
#[async_trait]
impl CodeExchange for HttpCodeExchange {
    async fn exchange(&self, code: &str) -> Result<FederatedIdentity, AuthError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_url.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::Exchange(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::Exchange(format!(
                "token endpoint answered {}",
                response.status()
            )));
        }

        response
            .json::<FederatedIdentity>()
            .await
            .map_err(|e| AuthError::Exchange(e.to_string()))
    }
}
