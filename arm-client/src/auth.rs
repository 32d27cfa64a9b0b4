//! Bearer-token acquisition for the resource-manager API.
//!
//! Two providers mirror the two deployment modes: a service principal using
//! the client-credentials flow, and a managed-identity endpoint exposed to
//! the process by the platform. Both cache the token and refresh it shortly
//! before expiry.

use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use tagsync_core::AccessTokenProvider;
use tagsync_core::Result;
use tagsync_core::TagSyncErr;
use tokio::sync::RwLock;
use tracing::debug;

/// Audience requested for resource-manager tokens.
pub const ARM_RESOURCE: &str = "https://management.azure.com/";

const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";
const MSI_API_VERSION: &str = "2017-09-01";

/// Buffer before expiry at which a cached token is refreshed (5 minutes).
const TOKEN_REFRESH_BUFFER_SECS: u64 = 300;

struct CachedToken {
    token: String,
    expires_at: Instant,
}

struct TokenCache(RwLock<Option<CachedToken>>);

impl TokenCache {
    fn new() -> Self {
        Self(RwLock::new(None))
    }

    async fn get(&self) -> Option<String> {
        let cache = self.0.read().await;
        let cached = cache.as_ref()?;
        let buffer = Duration::from_secs(TOKEN_REFRESH_BUFFER_SECS);
        (Instant::now() + buffer < cached.expires_at).then(|| cached.token.clone())
    }

    async fn put(&self, token: String, expires_in_secs: u64) {
        let expires_at = Instant::now() + Duration::from_secs(expires_in_secs);
        *self.0.write().await = Some(CachedToken { token, expires_at });
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Seconds-until-expiry; the identity endpoints return it as a string.
    expires_in: Option<serde_json::Value>,
}

impl TokenResponse {
    fn expires_in_secs(&self) -> u64 {
        match &self.expires_in {
            Some(serde_json::Value::String(raw)) => raw.parse().unwrap_or(3600),
            Some(serde_json::Value::Number(n)) => n.as_u64().unwrap_or(3600),
            _ => 3600,
        }
    }
}

fn auth_err(message: impl Into<String>) -> TagSyncErr {
    TagSyncErr::Auth(message.into())
}

/// Client-credentials flow against the tenant's OAuth endpoint.
pub struct ServicePrincipalProvider {
    http: reqwest::Client,
    authority: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    cache: TokenCache,
}

impl ServicePrincipalProvider {
    pub fn new(tenant_id: String, client_id: String, client_secret: String) -> Self {
        Self {
            http: default_http_client(),
            authority: DEFAULT_AUTHORITY.to_string(),
            tenant_id,
            client_id,
            client_secret,
            cache: TokenCache::new(),
        }
    }

    /// Point at a different OAuth authority (used by tests).
    pub fn with_authority(mut self, authority: String) -> Self {
        self.authority = authority.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl AccessTokenProvider for ServicePrincipalProvider {
    async fn access_token(&self) -> Result<String> {
        if let Some(token) = self.cache.get().await {
            return Ok(token);
        }

        let url = format!("{}/{}/oauth2/token", self.authority, self.tenant_id);
        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("resource", ARM_RESOURCE),
            ])
            .send()
            .await
            .map_err(|err| auth_err(format!("token request failed: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(auth_err(format!("token endpoint returned {status}: {body}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|err| auth_err(format!("malformed token response: {err}")))?;
        debug!("acquired service principal token");
        self.cache
            .put(token.access_token.clone(), token.expires_in_secs())
            .await;
        Ok(token.access_token)
    }
}

/// Token acquisition through the platform's managed-identity endpoint.
pub struct ManagedIdentityProvider {
    http: reqwest::Client,
    endpoint: String,
    secret: String,
    cache: TokenCache,
}

impl ManagedIdentityProvider {
    pub fn new(endpoint: String, secret: String) -> Self {
        Self {
            http: default_http_client(),
            endpoint,
            secret,
            cache: TokenCache::new(),
        }
    }
}

#[async_trait]
impl AccessTokenProvider for ManagedIdentityProvider {
    async fn access_token(&self) -> Result<String> {
        if let Some(token) = self.cache.get().await {
            return Ok(token);
        }

        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("api-version", MSI_API_VERSION), ("resource", ARM_RESOURCE)])
            .header("Secret", &self.secret)
            .send()
            .await
            .map_err(|err| auth_err(format!("managed identity request failed: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(auth_err(format!("managed identity endpoint returned {status}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|err| auth_err(format!("malformed token response: {err}")))?;
        debug!("acquired managed identity token");
        self.cache
            .put(token.access_token.clone(), token.expires_in_secs())
            .await;
        Ok(token.access_token)
    }
}

/// Picks a provider from the environment: the managed-identity endpoint when
/// the platform exposes one, the service principal otherwise.
///
/// Fails with an `Auth` error when the service-principal variables are
/// missing or empty.
pub fn token_provider_from_env() -> Result<Box<dyn AccessTokenProvider>> {
    select_token_provider(
        std::env::var("MSI_ENDPOINT").ok(),
        std::env::var("MSI_SECRET").ok(),
        std::env::var("AZURE_TENANT_ID").ok(),
        std::env::var("AZURE_CLIENT_ID").ok(),
        std::env::var("AZURE_CLIENT_SECRET").ok(),
    )
}

fn select_token_provider(
    msi_endpoint: Option<String>,
    msi_secret: Option<String>,
    tenant_id: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
) -> Result<Box<dyn AccessTokenProvider>> {
    if let Some(endpoint) = msi_endpoint {
        return Ok(Box::new(ManagedIdentityProvider::new(
            endpoint,
            msi_secret.unwrap_or_default(),
        )));
    }

    match (tenant_id, client_id, client_secret) {
        (Some(tenant_id), Some(client_id), Some(client_secret))
            if !tenant_id.is_empty() && !client_id.is_empty() && !client_secret.is_empty() =>
        {
            Ok(Box::new(ServicePrincipalProvider::new(
                tenant_id,
                client_id,
                client_secret,
            )))
        }
        _ => Err(auth_err(
            "missing service principal credentials; set AZURE_TENANT_ID, AZURE_CLIENT_ID and AZURE_CLIENT_SECRET or expose a managed identity endpoint",
        )),
    }
}

pub(crate) fn default_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(60))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::Mock;
    use wiremock::MockServer;
    use wiremock::ResponseTemplate;
    use wiremock::matchers::method;
    use wiremock::matchers::path;

    #[tokio::test]
    async fn service_principal_token_is_cached_until_expiry_buffer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok-1",
                "expires_in": "3600"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = ServicePrincipalProvider::new(
            "tenant-1".to_string(),
            "client-1".to_string(),
            "secret".to_string(),
        )
        .with_authority(server.uri());

        assert_eq!(provider.access_token().await.unwrap(), "tok-1");
        // Second call is served from the cache; the mock's expect(1) verifies
        // the endpoint was only hit once.
        assert_eq!(provider.access_token().await.unwrap(), "tok-1");
    }

    #[tokio::test]
    async fn rejected_credentials_surface_as_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let provider = ServicePrincipalProvider::new(
            "tenant-1".to_string(),
            "client-1".to_string(),
            "bad-secret".to_string(),
        )
        .with_authority(server.uri());

        let err = provider.access_token().await.unwrap_err();
        assert!(matches!(err, TagSyncErr::Auth(_)));
    }

    #[test]
    fn missing_service_principal_variables_is_an_auth_error() {
        let err = select_token_provider(None, None, None, None, None).unwrap_err();
        match err {
            TagSyncErr::Auth(message) => {
                assert!(message.contains("AZURE_TENANT_ID"), "{message}");
            }
            other => panic!("expected Auth error, got {other:?}"),
        }
    }

    #[test]
    fn empty_service_principal_variables_are_treated_as_missing() {
        let err = select_token_provider(
            None,
            None,
            Some("tenant-1".to_string()),
            Some(String::new()),
            Some("secret".to_string()),
        )
        .unwrap_err();
        assert!(matches!(err, TagSyncErr::Auth(_)));
    }

    #[test]
    fn managed_identity_endpoint_wins_over_service_principal_variables() {
        let provider = select_token_provider(
            Some("http://localhost/msi/token".to_string()),
            Some("msi-secret".to_string()),
            Some("tenant-1".to_string()),
            Some("client-1".to_string()),
            Some("secret".to_string()),
        );
        assert!(provider.is_ok());
    }

    #[tokio::test]
    async fn managed_identity_sends_secret_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/msi/token"))
            .and(wiremock::matchers::header("Secret", "msi-secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "msi-tok",
                "expires_in": "28800"
            })))
            .mount(&server)
            .await;

        let provider = ManagedIdentityProvider::new(
            format!("{}/msi/token", server.uri()),
            "msi-secret".to_string(),
        );
        assert_eq!(provider.access_token().await.unwrap(), "msi-tok");
    }
}
