//! API version resolution for heterogeneous resource types.

use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::error::TagSyncErr;
use crate::model::ResourceItem;
use crate::model::TypeRegistryEntry;
use crate::registry::TypeRegistry;
use crate::traits::ResourceManager;

/// Resolves the API version needed to read or write a resource, learning new
/// types on first sight.
///
/// Cache hits come from the shared [`TypeRegistry`]. On a miss the provider's
/// published version list is fetched and the first version for the matching
/// type is taken; the provider's own ordering is treated as "most preferred"
/// and is not re-sorted here. The discovery is persisted so every later run
/// starts warm.
pub struct ApiVersionResolver {
    resource_manager: Arc<dyn ResourceManager>,
    registry: TypeRegistry,
}

impl ApiVersionResolver {
    pub fn new(resource_manager: Arc<dyn ResourceManager>, registry: TypeRegistry) -> Self {
        Self {
            resource_manager,
            registry,
        }
    }

    /// Fails with [`TagSyncErr::Resolution`] when the provider has no entry
    /// for the type or the lookup call errors; fatal to that single resource
    /// only.
    pub async fn resolve(&self, resource: &ResourceItem) -> Result<String> {
        if let Some(version) = self.registry.api_version_for(&resource.resource_type).await {
            debug!(resource_type = %resource.resource_type, "api version cache hit");
            return Ok(version);
        }

        let (namespace, type_name) = split_resource_type(&resource.resource_type)?;
        let published = self
            .resource_manager
            .get_api_versions(namespace)
            .await
            .map_err(|err| TagSyncErr::Resolution {
                resource_type: resource.resource_type.clone(),
                message: err.to_string(),
            })?;

        let version = published
            .iter()
            .find(|(candidate, _)| candidate == type_name)
            .and_then(|(_, versions)| versions.first())
            .cloned()
            .ok_or_else(|| TagSyncErr::Resolution {
                resource_type: resource.resource_type.clone(),
                message: format!("provider {namespace} does not publish type {type_name}"),
            })?;

        debug!(
            resource_type = %resource.resource_type,
            version,
            "discovered api version from provider"
        );
        self.registry
            .record(TypeRegistryEntry {
                resource_type: resource.resource_type.clone(),
                api_version: version.clone(),
                location: resource.location.clone(),
                error_message: None,
            })
            .await?;
        Ok(version)
    }
}

/// Splits `{provider}/{resourceType}` into its namespace and type parts.
fn split_resource_type(resource_type: &str) -> Result<(&str, &str)> {
    resource_type
        .split_once('/')
        .ok_or_else(|| TagSyncErr::Resolution {
            resource_type: resource_type.to_string(),
            message: "resource type is not in provider/type form".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GenericResource;
    use crate::model::ResourceGroup;
    use crate::traits::TypeRegistryStore;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<Vec<TypeRegistryEntry>>,
    }

    #[async_trait]
    impl TypeRegistryStore for MemoryStore {
        async fn load_all(&self) -> Result<Vec<TypeRegistryEntry>> {
            Ok(self.rows.lock().expect("lock").clone())
        }

        async fn upsert(&self, entry: &TypeRegistryEntry) -> Result<()> {
            let mut rows = self.rows.lock().expect("lock");
            rows.retain(|row| row.resource_type != entry.resource_type);
            rows.push(entry.clone());
            Ok(())
        }
    }

    struct FakeArm {
        versions: Result<Vec<(String, Vec<String>)>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ResourceManager for FakeArm {
        async fn list_resource_groups(&self, _: &str) -> Result<Vec<ResourceGroup>> {
            unimplemented!("not used by resolver tests")
        }

        async fn list_resources(&self, _: &str, _: &str) -> Result<Vec<ResourceItem>> {
            unimplemented!("not used by resolver tests")
        }

        async fn get_resource(&self, _: &str, _: &str) -> Result<GenericResource> {
            unimplemented!("not used by resolver tests")
        }

        async fn update_resource(&self, _: &str, _: &str, _: &GenericResource) -> Result<()> {
            unimplemented!("not used by resolver tests")
        }

        async fn get_api_versions(&self, _: &str) -> Result<Vec<(String, Vec<String>)>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.versions {
                Ok(list) => Ok(list.clone()),
                Err(_) => Err(TagSyncErr::List("provider lookup failed".to_string())),
            }
        }
    }

    fn resource(resource_type: &str) -> ResourceItem {
        ResourceItem {
            id: format!("/subscriptions/s/providers/{resource_type}/x"),
            resource_type: resource_type.to_string(),
            location: "westus".to_string(),
            tags: None,
        }
    }

    #[tokio::test]
    async fn miss_discovers_first_published_version_and_persists() {
        let store = Arc::new(MemoryStore::default());
        let registry = TypeRegistry::load(store.clone()).await.unwrap();
        let arm = Arc::new(FakeArm {
            versions: Ok(vec![
                ("others".to_string(), vec!["2019-01-01".to_string()]),
                (
                    "bars".to_string(),
                    vec!["2021-06-01".to_string(), "2020-01-01".to_string()],
                ),
            ]),
            calls: AtomicUsize::new(0),
        });
        let resolver = ApiVersionResolver::new(arm.clone(), registry);

        let version = resolver.resolve(&resource("Microsoft.Foo/bars")).await.unwrap();
        assert_eq!(version, "2021-06-01");
        assert_eq!(store.load_all().await.unwrap().len(), 1);

        // Second resolve hits the cache; the provider is not queried again.
        let again = resolver.resolve(&resource("Microsoft.Foo/bars")).await.unwrap();
        assert_eq!(again, "2021-06-01");
        assert_eq!(arm.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unpublished_type_is_a_resolution_error() {
        let registry = TypeRegistry::load(Arc::new(MemoryStore::default())).await.unwrap();
        let arm = Arc::new(FakeArm {
            versions: Ok(vec![("bazzes".to_string(), vec!["2020-01-01".to_string()])]),
            calls: AtomicUsize::new(0),
        });
        let resolver = ApiVersionResolver::new(arm, registry);

        let err = resolver.resolve(&resource("Microsoft.Foo/bars")).await.unwrap_err();
        assert!(matches!(err, TagSyncErr::Resolution { .. }));
    }

    #[tokio::test]
    async fn provider_failure_is_a_resolution_error() {
        let registry = TypeRegistry::load(Arc::new(MemoryStore::default())).await.unwrap();
        let arm = Arc::new(FakeArm {
            versions: Err(TagSyncErr::List("x".to_string())),
            calls: AtomicUsize::new(0),
        });
        let resolver = ApiVersionResolver::new(arm, registry);

        let err = resolver.resolve(&resource("Microsoft.Foo/bars")).await.unwrap_err();
        assert!(matches!(err, TagSyncErr::Resolution { .. }));
    }
}
