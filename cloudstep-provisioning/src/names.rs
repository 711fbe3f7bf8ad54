//! Name constants for cloudstep resource families and operations
//!
//! Family tags are written into every continuation context and are how the
//! registry routes a JSON invocation to the matching controller.

/// Resource family tags
pub mod families {
    /// Database cluster
    ///
    /// **Operations:** create, update, delete, read, list
    pub const CLUSTER: &str = "cluster";

    /// Stream processor inside a stream workspace
    ///
    /// **Operations:** create, update, delete, read, list
    /// **Time-bounded:** create (default 20m, cleanup on timeout by default)
    pub const STREAM_PROCESSOR: &str = "stream-processor";

    /// Private endpoint across the database and network control planes
    ///
    /// **Operations:** create, delete, read, list
    pub const PRIVATE_ENDPOINT: &str = "private-endpoint";

    /// Cloud backup snapshot export job
    ///
    /// **Operations:** create, delete, read, list
    pub const EXPORT_JOB: &str = "export-job";

    pub const ALL: [&str; 4] = [CLUSTER, STREAM_PROCESSOR, PRIVATE_ENDPOINT, EXPORT_JOB];
}

/// Operation tags
pub mod operations {
    pub const CREATE: &str = "create";
    pub const UPDATE: &str = "update";
    pub const DELETE: &str = "delete";
    pub const READ: &str = "read";
    pub const LIST: &str = "list";
}
