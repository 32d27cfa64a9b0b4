//! Collaborator seams.
//!
//! The engine talks to the outside world only through these traits: the cloud
//! resource-manager API, credential acquisition, the task queue, and the
//! persisted row stores. Production implementations live in the
//! `tagsync-arm-client` and `tagsync-state` crates; tests substitute
//! in-memory fakes.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::GenericResource;
use crate::model::RequiredTagConfig;
use crate::model::ResourceGroup;
use crate::model::ResourceItem;
use crate::model::RunStats;
use crate::model::TypeRegistryEntry;
use crate::model::UpdateTask;

/// Acquires a bearer token for the resource-manager API.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    /// Fails with [`crate::TagSyncErr::Auth`] when credentials are missing or
    /// rejected; fatal to the current run, not to the process.
    async fn access_token(&self) -> Result<String>;
}

impl std::fmt::Debug for dyn AccessTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessTokenProvider")
    }
}

/// The cloud resource-manager API surface the pipeline needs.
#[async_trait]
pub trait ResourceManager: Send + Sync {
    async fn list_resource_groups(&self, subscription: &str) -> Result<Vec<ResourceGroup>>;

    async fn list_resources(&self, group: &str, subscription: &str) -> Result<Vec<ResourceItem>>;

    async fn get_resource(&self, id: &str, api_version: &str) -> Result<GenericResource>;

    async fn update_resource(
        &self,
        id: &str,
        api_version: &str,
        resource: &GenericResource,
    ) -> Result<()>;

    /// Returns the API versions published for each resource type under the
    /// provider namespace, as `(resource_type, versions)` pairs in provider
    /// order.
    async fn get_api_versions(
        &self,
        provider_namespace: &str,
    ) -> Result<Vec<(String, Vec<String>)>>;
}

/// Delivery of update tasks to the worker stage. At-least-once; consumers
/// must tolerate duplicates.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, task: &UpdateTask) -> Result<()>;
}

/// Configuration rows, one per audited subscription.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn load_configs(&self) -> Result<Vec<RequiredTagConfig>>;

    /// Writes the bootstrap placeholder row for a fresh deployment.
    async fn insert_config(&self, config: &RequiredTagConfig) -> Result<()>;
}

/// Per-run audit counters, written once at run end.
#[async_trait]
pub trait StatsStore: Send + Sync {
    async fn record_run(&self, stats: &RunStats) -> Result<()>;
}

/// The persisted side of the type registry. Single-row atomic upsert is the
/// only consistency guarantee required; concurrent writers are
/// last-writer-wins.
#[async_trait]
pub trait TypeRegistryStore: Send + Sync {
    async fn load_all(&self) -> Result<Vec<TypeRegistryEntry>>;

    async fn upsert(&self, entry: &TypeRegistryEntry) -> Result<()>;
}
