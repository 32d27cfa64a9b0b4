//! The audit coordinator: one pass over every configured subscription.

use std::sync::Arc;

use tracing::error;
use tracing::info;
use tracing::warn;

use crate::error::Result;
use crate::error::TagSyncErr;
use crate::model::RunStats;
use crate::model::UpdateTask;
use crate::model::placeholder_config;
use crate::registry::TypeRegistry;
use crate::resolver::ApiVersionResolver;
use crate::tags::compute_tag_update;
use crate::tags::required_tags_present;
use crate::traits::ConfigStore;
use crate::traits::ResourceManager;
use crate::traits::StatsStore;
use crate::traits::TaskQueue;

/// Drives one audit pass: per configured subscription, list the resource
/// groups, work out which required tags each group actually carries, diff
/// every resource in qualifying groups against that set, and enqueue one
/// update task per resource that needs to change.
///
/// Subscriptions are processed sequentially and isolated from each other: a
/// failure inside one subscription's run is logged and the remaining
/// subscriptions still get audited.
pub struct AuditCoordinator {
    resource_manager: Arc<dyn ResourceManager>,
    queue: Arc<dyn TaskQueue>,
    config_store: Arc<dyn ConfigStore>,
    stats_store: Arc<dyn StatsStore>,
    registry: TypeRegistry,
    resolver: ApiVersionResolver,
}

impl AuditCoordinator {
    pub fn new(
        resource_manager: Arc<dyn ResourceManager>,
        queue: Arc<dyn TaskQueue>,
        config_store: Arc<dyn ConfigStore>,
        stats_store: Arc<dyn StatsStore>,
        registry: TypeRegistry,
    ) -> Self {
        let resolver = ApiVersionResolver::new(resource_manager.clone(), registry.clone());
        Self {
            resource_manager,
            queue,
            config_store,
            stats_store,
            registry,
            resolver,
        }
    }

    /// Runs the full audit. Returns the per-subscription stats that were
    /// persisted.
    ///
    /// On a fresh deployment with no configuration rows this writes a
    /// placeholder row and fails with [`TagSyncErr::ConfigMissing`] without
    /// auditing anything.
    pub async fn run(&self) -> Result<Vec<RunStats>> {
        let configs = self.config_store.load_configs().await?;
        if configs.is_empty() {
            self.config_store.insert_config(&placeholder_config()).await?;
            info!("first run for a new deployment; populate the audit configuration");
            return Err(TagSyncErr::ConfigMissing);
        }

        let mut completed = Vec::new();
        for config in configs {
            match self
                .audit_subscription(&config.subscription_id, &config.required_keys())
                .await
            {
                Ok(stats) => completed.push(stats),
                Err(err) => {
                    error!(
                        subscription = %config.subscription_id,
                        "subscription audit failed: {err}"
                    );
                }
            }
        }
        Ok(completed)
    }

    async fn audit_subscription(
        &self,
        subscription: &str,
        required_keys: &[String],
    ) -> Result<RunStats> {
        info!(subscription, "starting subscription audit");
        let mut stats = RunStats::start(subscription);
        let quarantined = self.registry.quarantined_types().await;

        let groups = self.resource_manager.list_resource_groups(subscription).await?;
        stats.groups_total = groups.len() as u64;

        for group in groups {
            let Some(group_tags) = &group.tags else {
                warn!(group = %group.name, "resource group has no tags");
                stats.groups_skipped += 1;
                continue;
            };

            let tags_to_sync = required_tags_present(group_tags, required_keys);
            if tags_to_sync.is_empty() {
                warn!(group = %group.name, "resource group has none of the required tags");
                stats.groups_skipped += 1;
                continue;
            }

            let resources = self
                .resource_manager
                .list_resources(&group.name, subscription)
                .await?;
            let resources: Vec<_> = resources
                .into_iter()
                .filter(|resource| !quarantined.contains(&resource.resource_type))
                .collect();
            stats.resources_total += resources.len() as u64;

            for resource in resources {
                let update = compute_tag_update(resource.tags.as_ref(), &tags_to_sync);
                if update.is_empty() {
                    stats.resources_skipped += 1;
                    continue;
                }

                let api_version = match self.resolver.resolve(&resource).await {
                    Ok(version) => version,
                    Err(err) => {
                        error!(resource = %resource.id, "skipping resource: {err}");
                        continue;
                    }
                };

                let task = UpdateTask {
                    id: resource.id.clone(),
                    resource_type: resource.resource_type.clone(),
                    location: resource.location.clone(),
                    subscription: subscription.to_string(),
                    tags: update,
                    api_version,
                };
                info!(resource = %resource.id, "requesting tag update");
                self.queue.enqueue(&task).await?;
                stats.resources_updated += 1;
            }
        }

        stats.finished_at = Some(chrono::Utc::now());
        self.stats_store.record_run(&stats).await?;
        info!(subscription, "completed subscription audit");
        Ok(stats)
    }
}
