//! Tag-governance audit engine.
//!
//! Resource groups declare required tags; every resource inside them must
//! carry the same key/value pairs. This crate holds the whole
//! audit-and-reconcile pipeline behind trait seams: the pure diff engine,
//! the self-learning API-version resolver, the audit coordinator that emits
//! update tasks, and the worker that applies them and quarantines
//! repeatedly-failing resource types.
//!
//! Transport concerns (the resource-manager REST client and the persisted
//! row stores) live in `tagsync-arm-client` and `tagsync-state`.

mod audit;
mod error;
mod model;
mod registry;
mod resolver;
pub mod tags;
mod traits;
mod worker;

pub use audit::AuditCoordinator;
pub use error::Result;
pub use error::TagSyncErr;
pub use model::GenericResource;
pub use model::RequiredTagConfig;
pub use model::ResourceGroup;
pub use model::ResourceItem;
pub use model::RunStats;
pub use model::TypeRegistryEntry;
pub use model::UpdateTask;
pub use model::placeholder_config;
pub use registry::TypeRegistry;
pub use resolver::ApiVersionResolver;
pub use tags::TagSet;
pub use traits::AccessTokenProvider;
pub use traits::ConfigStore;
pub use traits::ResourceManager;
pub use traits::StatsStore;
pub use traits::TaskQueue;
pub use traits::TypeRegistryStore;
pub use worker::UpdateWorker;
