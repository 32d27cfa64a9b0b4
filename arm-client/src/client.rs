//! The resource-manager REST client.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tagsync_core::AccessTokenProvider;
use tagsync_core::GenericResource;
use tagsync_core::ResourceGroup;
use tagsync_core::ResourceItem;
use tagsync_core::ResourceManager;
use tagsync_core::Result;
use tagsync_core::TagSyncErr;
use tracing::debug;

use crate::auth::default_http_client;

const DEFAULT_BASE_URL: &str = "https://management.azure.com";

/// API version of the management-plane endpoints themselves (group/resource
/// listing and provider metadata). Individual resource reads and writes use
/// the per-type version resolved by the pipeline.
const MANAGEMENT_API_VERSION: &str = "2021-04-01";

/// HTTP implementation of [`ResourceManager`] against the Azure Resource
/// Manager REST API. Paginated listings follow `nextLink` to exhaustion.
pub struct ArmClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn AccessTokenProvider>,
}

#[derive(Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(rename = "nextLink")]
    next_link: Option<String>,
}

#[derive(Deserialize)]
struct ProviderResponse {
    #[serde(rename = "resourceTypes", default)]
    resource_types: Vec<ProviderResourceType>,
}

#[derive(Deserialize)]
struct ProviderResourceType {
    #[serde(rename = "resourceType")]
    resource_type: String,
    #[serde(rename = "apiVersions", default)]
    api_versions: Vec<String>,
}

impl ArmClient {
    pub fn new(tokens: Arc<dyn AccessTokenProvider>) -> Self {
        Self {
            http: default_http_client(),
            base_url: DEFAULT_BASE_URL.to_string(),
            tokens,
        }
    }

    /// Point at a different management endpoint (used by tests).
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let token = self.tokens.access_token().await?;
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| TagSyncErr::List(format!("GET {url} failed: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TagSyncErr::List(format!("GET {url} returned {status}: {body}")));
        }
        response
            .json()
            .await
            .map_err(|err| TagSyncErr::List(format!("GET {url} malformed body: {err}")))
    }

    /// Collects every page of a `value`/`nextLink` listing.
    async fn get_all_pages<T: DeserializeOwned>(&self, first_url: String) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut url = Some(first_url);
        while let Some(current) = url {
            let page: Page<T> = self.get_json(&current).await?;
            items.extend(page.value);
            url = page.next_link;
        }
        Ok(items)
    }
}

#[async_trait]
impl ResourceManager for ArmClient {
    async fn list_resource_groups(&self, subscription: &str) -> Result<Vec<ResourceGroup>> {
        let url = format!(
            "{}/subscriptions/{subscription}/resourcegroups?api-version={MANAGEMENT_API_VERSION}",
            self.base_url
        );
        let groups = self.get_all_pages(url).await?;
        debug!(subscription, count = groups.len(), "listed resource groups");
        Ok(groups)
    }

    async fn list_resources(&self, group: &str, subscription: &str) -> Result<Vec<ResourceItem>> {
        let url = format!(
            "{}/subscriptions/{subscription}/resourceGroups/{group}/resources?api-version={MANAGEMENT_API_VERSION}",
            self.base_url
        );
        let resources = self.get_all_pages(url).await?;
        debug!(group, count = resources.len(), "listed resources");
        Ok(resources)
    }

    async fn get_resource(&self, id: &str, api_version: &str) -> Result<GenericResource> {
        let url = format!("{}{id}?api-version={api_version}", self.base_url);
        let token = self.tokens.access_token().await?;
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| patch_err(id, err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(patch_err(id, format!("GET returned {status}: {body}")));
        }
        response
            .json()
            .await
            .map_err(|err| patch_err(id, format!("malformed resource body: {err}")))
    }

    async fn update_resource(
        &self,
        id: &str,
        api_version: &str,
        resource: &GenericResource,
    ) -> Result<()> {
        let url = format!("{}{id}?api-version={api_version}", self.base_url);
        let token = self.tokens.access_token().await?;
        let response = self
            .http
            .patch(&url)
            .bearer_auth(token)
            .json(resource)
            .send()
            .await
            .map_err(|err| patch_err(id, err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(patch_err(id, format!("PATCH returned {status}: {body}")));
        }
        Ok(())
    }

    async fn get_api_versions(
        &self,
        provider_namespace: &str,
    ) -> Result<Vec<(String, Vec<String>)>> {
        let url = format!(
            "{}/providers/{provider_namespace}?api-version={MANAGEMENT_API_VERSION}",
            self.base_url
        );
        let provider: ProviderResponse = self.get_json(&url).await?;
        Ok(provider
            .resource_types
            .into_iter()
            .map(|entry| (entry.resource_type, entry.api_versions))
            .collect())
    }
}

fn patch_err(id: &str, message: String) -> TagSyncErr {
    TagSyncErr::Patch {
        resource_id: id.to_string(),
        message,
    }
}
