//! Shared resource-type registry: API version cache plus quarantine flags.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::error::Result;
use crate::model::TypeRegistryEntry;
use crate::traits::TypeRegistryStore;

/// Process-wide cache over the persisted `resource_types` rows.
///
/// Read-through: seeded from the store at construction, consulted on every
/// version lookup. Write-through: discoveries and quarantines update the
/// cache and the store together. Concurrent writers for the same type are
/// last-writer-wins; the registry only needs to record that a type is
/// broken, not the full history.
#[derive(Clone)]
pub struct TypeRegistry {
    store: Arc<dyn TypeRegistryStore>,
    entries: Arc<RwLock<BTreeMap<String, TypeRegistryEntry>>>,
}

impl TypeRegistry {
    /// Seeds the cache from the persisted rows.
    pub async fn load(store: Arc<dyn TypeRegistryStore>) -> Result<Self> {
        let entries = store
            .load_all()
            .await?
            .into_iter()
            .map(|entry| (entry.resource_type.clone(), entry))
            .collect();
        Ok(Self {
            store,
            entries: Arc::new(RwLock::new(entries)),
        })
    }

    /// Types currently excluded from scanning.
    pub async fn quarantined_types(&self) -> Vec<String> {
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| entry.is_quarantined())
            .map(|entry| entry.resource_type.clone())
            .collect()
    }

    /// Cached API version for `resource_type`, if one has been discovered.
    pub async fn api_version_for(&self, resource_type: &str) -> Option<String> {
        self.entries
            .read()
            .await
            .get(resource_type)
            .map(|entry| entry.api_version.clone())
    }

    /// Records a freshly discovered entry, cache and store together.
    pub async fn record(&self, entry: TypeRegistryEntry) -> Result<()> {
        self.store.upsert(&entry).await?;
        self.entries
            .write()
            .await
            .insert(entry.resource_type.clone(), entry);
        Ok(())
    }

    /// Marks `resource_type` as quarantined with the given error message.
    /// Creates the entry if no version was ever resolved for the type.
    pub async fn quarantine(
        &self,
        resource_type: &str,
        location: &str,
        error_message: &str,
    ) -> Result<()> {
        let entry = {
            let entries = self.entries.read().await;
            match entries.get(resource_type) {
                Some(existing) => TypeRegistryEntry {
                    error_message: Some(error_message.to_string()),
                    ..existing.clone()
                },
                None => TypeRegistryEntry {
                    resource_type: resource_type.to_string(),
                    api_version: String::new(),
                    location: location.to_string(),
                    error_message: Some(error_message.to_string()),
                },
            }
        };
        debug!(resource_type, "quarantining resource type");
        self.record(entry).await
    }
}
