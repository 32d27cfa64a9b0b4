//! Azure Resource Manager transport for the tag audit pipeline.
//!
//! Implements the `tagsync-core` collaborator traits over the ARM REST API:
//! [`ArmClient`] for resource-group/resource listing, per-resource reads and
//! tag patches, and provider metadata; plus the two token providers the
//! deployment modes need.

mod auth;
mod client;

pub use auth::ARM_RESOURCE;
pub use auth::ManagedIdentityProvider;
pub use auth::ServicePrincipalProvider;
pub use auth::token_provider_from_env;
pub use client::ArmClient;
