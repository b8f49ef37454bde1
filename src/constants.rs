//! Application-wide constants
//!
//! This module contains all constant values used throughout the application.
//! Constants are grouped by their purpose for better organization.

// =============================================================================
// SERVER DEFAULTS
// =============================================================================

/// Default server host address
pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";

/// Default server port
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Default cap on an `/execute/` multipart body (the uploaded overlay tar
/// plus the `config` field), in bytes. Generous enough for a student
/// exercise's file tree without letting one request exhaust disk/memory.
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

// =============================================================================
// SANDBOX ERROR CODES (negative, reserved)
// =============================================================================

pub mod error_codes {
    /// An unclassified exception occurred while executing or harvesting a command.
    pub const UNKNOWN: i32 = -1;
    /// A command's clamped timeout elapsed before it finished.
    pub const TIMEOUT: i32 = -2;
    /// `result_path` was set but the file does not exist after the run.
    pub const RESULT_NOT_FOUND: i32 = -3;
    /// `result_path` exists but its content is not valid UTF-8.
    pub const RESULT_NOT_UTF8: i32 = -4;
}

// =============================================================================
// POOL / CONTAINER DEFAULTS
// =============================================================================

/// Default number of pre-created containers in the pool.
pub const DEFAULT_DOCKER_COUNT: usize = 5;

/// Default image run inside every sandbox container.
pub const DEFAULT_CONTAINER_IMAGE: &str = "sandboxd/sandbox:latest";

/// Default number of CPUs made available to each container.
pub const DEFAULT_CPU_COUNT: f64 = 1.0;

/// Default memory limit in megabytes per container.
pub const DEFAULT_MEMORY_LIMIT_MB: u64 = 256;

/// Default pid cap per container.
pub const DEFAULT_PIDS_LIMIT: i64 = 128;

/// Path, inside every container, at which the external libraries volume is mounted.
pub const EXTERNAL_LIBRARIES_MOUNT: &str = "/utils/libs";

/// The container's private writable working directory.
pub const CONTAINER_WORKDIR: &str = "/home/docker";

// =============================================================================
// TIMING DEFAULTS
// =============================================================================

/// Default per-request execution time budget, in seconds.
pub const DEFAULT_EXECUTE_TIMEOUT_SECONDS: f64 = 10.0;

/// Default bounded wait for a pool slot, in seconds.
pub const DEFAULT_WAIT_FOR_CONTAINER_DURATION_SECONDS: f64 = 5.0;

/// Default environment TTL, in seconds (24h).
pub const DEFAULT_ENVIRONMENT_EXPIRATION_SECONDS: u64 = 24 * 60 * 60;

/// Default cron expression for the environment-expiration sweep: hourly.
pub const DEFAULT_EXPIRE_ENVIRONMENTS_CRON: &str = "0 0 * * * *";

/// Default cron expression for the external-library refresh: every 2 hours.
pub const DEFAULT_REFRESH_LIBRARIES_CRON: &str = "0 0 0/2 * * *";

// =============================================================================
// STORAGE DEFAULTS
// =============================================================================

/// Default on-disk root for stored environment tarballs.
pub const DEFAULT_ENVIRONMENT_ROOT: &str = "./data/environments";

/// Default on-disk root for per-slot scratch directories.
pub const DEFAULT_CONTAINERS_ENV_ROOT: &str = "./data/containers_env";

/// Default on-disk root for external library checkouts.
pub const DEFAULT_EXTERNAL_LIBRARIES_ROOT: &str = "./data/libs";

// =============================================================================
// MISC
// =============================================================================

/// Sandbox service version reported by `/specifications/`.
pub const SANDBOX_VERSION: &str = env!("CARGO_PKG_VERSION");
