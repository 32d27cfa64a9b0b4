//! Data model shared by the coordinator, the worker, and the stores.

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use crate::tags::TagSet;

/// One configuration row: a subscription and the tag keys its groups must
/// propagate. `required_tags` is stored as a comma-separated string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredTagConfig {
    pub subscription_id: String,
    pub required_tags: String,
}

impl RequiredTagConfig {
    /// Splits the comma-separated tag list into trimmed, non-empty keys.
    pub fn required_keys(&self) -> Vec<String> {
        self.required_tags
            .split(',')
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(ToString::to_string)
            .collect()
    }
}

/// Placeholder row written on first run so operators know where to configure.
pub fn placeholder_config() -> RequiredTagConfig {
    RequiredTagConfig {
        subscription_id: "enter_valid_subscription_id".to_string(),
        required_tags: "comma,separated,tag,list,here".to_string(),
    }
}

/// A resource group as returned by the listing call. `tags: None` means the
/// group has no tag collection at all, which the audit treats differently
/// than an empty one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGroup {
    pub name: String,
    pub tags: Option<TagSet>,
}

/// A resource inside a group, as listed by the resource manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceItem {
    pub id: String,
    /// `{provider}/{resourceType}` form, e.g. `Microsoft.Compute/virtualMachines`.
    #[serde(rename = "type")]
    pub resource_type: String,
    pub location: String,
    pub tags: Option<TagSet>,
}

/// The unit of work placed on the update queue. Immutable once enqueued; the
/// target tag set has already been merged by the diff engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateTask {
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub location: String,
    pub subscription: String,
    pub tags: TagSet,
    #[serde(rename = "apiVersion")]
    pub api_version: String,
}

/// A live resource fetched by id for the tag patch. Fields other than `tags`
/// and `properties` are carried through untouched so the write echoes back
/// whatever shape the provider returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericResource {
    pub id: String,
    pub tags: Option<TagSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<serde_json::Value>,
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

/// Per resource-type record: the resolved API version plus, once an update
/// has failed, the error that quarantines the type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRegistryEntry {
    pub resource_type: String,
    pub api_version: String,
    pub location: String,
    pub error_message: Option<String>,
}

impl TypeRegistryEntry {
    /// A type is quarantined once its entry carries a non-empty error.
    pub fn is_quarantined(&self) -> bool {
        self.error_message
            .as_deref()
            .is_some_and(|message| !message.is_empty())
    }
}

/// Counters for one subscription audit run. Created at run start, mutated
/// throughout, persisted exactly once at run end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub id: Uuid,
    pub subscription_id: String,
    pub groups_total: u64,
    pub groups_skipped: u64,
    pub resources_total: u64,
    pub resources_skipped: u64,
    pub resources_updated: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunStats {
    pub fn start(subscription_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            subscription_id: subscription_id.to_string(),
            groups_total: 0,
            groups_skipped: 0,
            resources_total: 0,
            resources_skipped: 0,
            resources_updated: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}
