use thiserror::Error;

pub type Result<T> = std::result::Result<T, TagSyncErr>;

/// Failure taxonomy for the audit pipeline.
///
/// Each variant carries an abandonment scope: callers match on the kind to
/// decide how much work to give up on, and nothing narrower than the scope
/// listed here is ever aborted.
#[derive(Debug, Error)]
pub enum TagSyncErr {
    /// Credential acquisition failed. Aborts the current run, not the process.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Listing resource groups or resources failed. Aborts the current
    /// subscription's run; remaining subscriptions continue.
    #[error("listing failed: {0}")]
    List(String),

    /// No API version could be resolved for a resource type. Skips the single
    /// resource; the group and the run continue.
    #[error("api version resolution failed for {resource_type}: {message}")]
    Resolution {
        resource_type: String,
        message: String,
    },

    /// The tag patch call failed. The resource type is quarantined and the
    /// task is not retried.
    #[error("update failed for {resource_id}: {message}")]
    Patch {
        resource_id: String,
        message: String,
    },

    /// No configuration rows exist. A placeholder is bootstrapped and the
    /// audit exits without scanning anything.
    #[error("no audit configuration found")]
    ConfigMissing,

    /// A persisted-state read or write failed. Same scope as `List`.
    #[error("state store error: {0}")]
    Store(String),
}
