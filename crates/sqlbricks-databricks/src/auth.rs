//! OAuth machine-to-machine (service principal) credentials
//!
//! Service principal logins exchange a client id and secret for a bearer
//! token at the workspace's OIDC endpoint. The exchange needs an HTTP
//! client, so it is only compiled with the `oauth-m2m` feature.

use crate::vendor::CredentialsProvider;
use sqlbricks_core::Result;
use std::fmt;
use std::sync::Arc;

/// Client id and secret of a Databricks service principal
#[derive(Clone, PartialEq, Eq)]
pub struct ServicePrincipal {
    host: String,
    client_id: String,
    client_secret: String,
}

impl ServicePrincipal {
    pub fn new(server_hostname: &str, client_id: &str, client_secret: &str) -> Self {
        let hostname = server_hostname
            .trim()
            .trim_start_matches("https://")
            .trim_end_matches('/');

        Self {
            host: format!("https://{}", hostname),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        }
    }

    /// Workspace URL, `https://<server_hostname>`
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn token_endpoint(&self) -> String {
        format!("{}/oidc/v1/token", self.host)
    }
}

impl fmt::Debug for ServicePrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServicePrincipal")
            .field("host", &self.host)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Build the credentials provider handed to the driver
#[cfg(feature = "oauth-m2m")]
pub fn m2m_credentials_provider(
    principal: ServicePrincipal,
) -> Result<Arc<dyn CredentialsProvider>> {
    Ok(Arc::new(oauth::ServicePrincipalProvider::new(principal)))
}

/// Build the credentials provider handed to the driver (feature disabled)
#[cfg(not(feature = "oauth-m2m"))]
pub fn m2m_credentials_provider(
    principal: ServicePrincipal,
) -> Result<Arc<dyn CredentialsProvider>> {
    tracing::debug!("OAuth M2M requested for {:?} without oauth-m2m support", principal);
    Err(sqlbricks_core::AdapterError::connection(
        sqlbricks_core::error::CONNECTION_TITLE,
        "OAuth M2M support not compiled. Rebuild with: cargo build --features oauth-m2m",
    ))
}

#[cfg(feature = "oauth-m2m")]
mod oauth {
    use super::ServicePrincipal;
    use crate::vendor::{CredentialsProvider, VendorError};
    use serde::Deserialize;
    use std::time::{Duration, Instant};
    use tokio::sync::Mutex;

    /// Refresh this long before the server-side expiry
    const EXPIRY_MARGIN: Duration = Duration::from_secs(60);
    const TOKEN_TIMEOUT: Duration = Duration::from_secs(30);

    #[derive(Debug, Deserialize)]
    struct TokenResponse {
        access_token: String,
        #[serde(default = "default_token_type")]
        token_type: String,
        #[serde(default)]
        expires_in: Option<u64>,
    }

    fn default_token_type() -> String {
        "Bearer".to_string()
    }

    #[derive(Debug)]
    struct CachedToken {
        header: String,
        expires_at: Option<Instant>,
    }

    impl CachedToken {
        fn is_fresh(&self) -> bool {
            self.expires_at
                .map_or(true, |at| Instant::now() + EXPIRY_MARGIN < at)
        }
    }

    /// Exchanges service principal credentials for bearer tokens, caching
    /// each token until shortly before it expires
    #[derive(Debug)]
    pub(super) struct ServicePrincipalProvider {
        principal: ServicePrincipal,
        client: reqwest::Client,
        token: Mutex<Option<CachedToken>>,
    }

    impl ServicePrincipalProvider {
        pub fn new(principal: ServicePrincipal) -> Self {
            Self {
                principal,
                client: reqwest::Client::new(),
                token: Mutex::new(None),
            }
        }

        async fn request_token(&self) -> Result<CachedToken, VendorError> {
            let response = self
                .client
                .post(self.principal.token_endpoint())
                .basic_auth(&self.principal.client_id, Some(&self.principal.client_secret))
                .form(&[("grant_type", "client_credentials"), ("scope", "all-apis")])
                .timeout(TOKEN_TIMEOUT)
                .send()
                .await
                .map_err(|e| VendorError::other(format!("OAuth token request failed: {}", e)))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(VendorError::other(format!(
                    "OAuth token request failed (status={}): {}",
                    status, body
                )));
            }

            let token: TokenResponse = response
                .json()
                .await
                .map_err(|e| VendorError::other(format!("Invalid OAuth token response: {}", e)))?;

            Ok(CachedToken {
                header: format!("{} {}", token.token_type, token.access_token),
                expires_at: token
                    .expires_in
                    .map(|secs| Instant::now() + Duration::from_secs(secs)),
            })
        }
    }

    #[async_trait::async_trait]
    impl CredentialsProvider for ServicePrincipalProvider {
        fn auth_type(&self) -> &'static str {
            "oauth-m2m"
        }

        async fn headers(&self) -> Result<Vec<(String, String)>, VendorError> {
            let mut cached = self.token.lock().await;

            if !cached.as_ref().is_some_and(CachedToken::is_fresh) {
                tracing::debug!("requesting OAuth token from {}", self.principal.token_endpoint());
                *cached = Some(self.request_token().await?);
            }

            let header = cached
                .as_ref()
                .map(|t| t.header.clone())
                .unwrap_or_default();
            Ok(vec![("Authorization".to_string(), header)])
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_is_derived_from_server_hostname() {
        let principal = ServicePrincipal::new("dbc-1234.cloud.databricks.com", "id", "secret");
        assert_eq!(principal.host(), "https://dbc-1234.cloud.databricks.com");
        assert_eq!(
            principal.token_endpoint(),
            "https://dbc-1234.cloud.databricks.com/oidc/v1/token"
        );

        let principal =
            ServicePrincipal::new("https://dbc-1234.cloud.databricks.com/", "id", "secret");
        assert_eq!(principal.host(), "https://dbc-1234.cloud.databricks.com");
    }

    #[test]
    fn debug_hides_the_secret() {
        let principal = ServicePrincipal::new("host", "id", "very-secret");
        assert!(!format!("{:?}", principal).contains("very-secret"));
        assert_eq!(principal.client_id(), "id");
    }

    #[cfg(not(feature = "oauth-m2m"))]
    #[test]
    fn missing_feature_is_a_connection_error() {
        let principal = ServicePrincipal::new("host", "id", "secret");
        let err = m2m_credentials_provider(principal).unwrap_err();
        assert!(err.is_connection());
        assert!(err.message().contains("--features oauth-m2m"));
    }

    #[cfg(feature = "oauth-m2m")]
    #[test]
    fn provider_reports_its_auth_type() {
        let principal = ServicePrincipal::new("host", "id", "secret");
        let provider = m2m_credentials_provider(principal).unwrap();
        assert_eq!(provider.auth_type(), "oauth-m2m");
    }
}
