//! The update worker: applies one queued tag patch.

use std::sync::Arc;

use tracing::error;
use tracing::info;

use crate::error::Result;
use crate::error::TagSyncErr;
use crate::model::UpdateTask;
use crate::registry::TypeRegistry;
use crate::traits::ResourceManager;

/// Consumes exactly one [`UpdateTask`] per call.
///
/// Re-delivery of the same task is harmless: the target tag set was computed
/// as a full merge, so re-applying it converges to the same state.
pub struct UpdateWorker {
    resource_manager: Arc<dyn ResourceManager>,
    registry: TypeRegistry,
}

impl UpdateWorker {
    pub fn new(resource_manager: Arc<dyn ResourceManager>, registry: TypeRegistry) -> Self {
        Self {
            resource_manager,
            registry,
        }
    }

    /// Fetches the live resource, replaces its tag collection with the task's
    /// target set, and submits the update with any other mutable state
    /// stripped. Some resource types reject a write that carries unrelated
    /// property state.
    ///
    /// On failure the resource's type is quarantined so future audits skip
    /// it; the task itself is not retried.
    pub async fn process(&self, task: &UpdateTask) -> Result<()> {
        info!(resource = %task.id, "applying tag update");
        match self.apply(task).await {
            Ok(()) => Ok(()),
            // Credential trouble says nothing about the resource type; let it
            // abort the invocation without poisoning the registry.
            Err(err @ TagSyncErr::Auth(_)) => Err(err),
            Err(err) => {
                error!(resource = %task.id, "update failed: {err}");
                self.registry
                    .quarantine(&task.resource_type, &task.location, &err.to_string())
                    .await?;
                Err(TagSyncErr::Patch {
                    resource_id: task.id.clone(),
                    message: err.to_string(),
                })
            }
        }
    }

    async fn apply(&self, task: &UpdateTask) -> Result<()> {
        let mut resource = self
            .resource_manager
            .get_resource(&task.id, &task.api_version)
            .await?;
        resource.tags = Some(task.tags.clone());
        // Tag-only patch: never echo property state back to the provider.
        resource.properties = None;
        self.resource_manager
            .update_resource(&task.id, &task.api_version, &resource)
            .await
    }
}
