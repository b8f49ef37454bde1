//! Application configuration management
//!
//! This module handles loading and validating configuration from environment
//! variables. Configuration is loaded once at startup, owned by `main`, and
//! threaded into the rest of the application through dependency injection
//! (see `state::AppState`) rather than a process-wide global.

use std::env;
use std::path::PathBuf;

use crate::constants::{
    DEFAULT_CONTAINERS_ENV_ROOT, DEFAULT_CONTAINER_IMAGE, DEFAULT_CPU_COUNT, DEFAULT_DOCKER_COUNT,
    DEFAULT_ENVIRONMENT_EXPIRATION_SECONDS, DEFAULT_ENVIRONMENT_ROOT,
    DEFAULT_EXECUTE_TIMEOUT_SECONDS, DEFAULT_EXPIRE_ENVIRONMENTS_CRON,
    DEFAULT_EXTERNAL_LIBRARIES_ROOT, DEFAULT_MAX_BODY_BYTES, DEFAULT_MEMORY_LIMIT_MB,
    DEFAULT_PIDS_LIMIT, DEFAULT_REFRESH_LIBRARIES_CRON, DEFAULT_SERVER_HOST, DEFAULT_SERVER_PORT,
    DEFAULT_WAIT_FOR_CONTAINER_DURATION_SECONDS,
};

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub container: ContainerConfig,
    pub storage: StorageConfig,
    pub execution: ExecutionConfig,
    pub scheduler: SchedulerConfig,
    pub external_libraries: ExternalLibrariesConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub rust_log: String,
    pub max_body_bytes: usize,
}

/// Per-container resource limits and runtime parameters (component A/I).
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    pub docker_socket: String,
    pub image: String,
    pub docker_count: usize,
    pub cpu_count: f64,
    pub memory_limit_mb: u64,
    pub pids_limit: i64,
}

/// On-disk layout for environments, per-slot scratch, and external libs.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub environment_root: PathBuf,
    pub containers_env_root: PathBuf,
}

/// Timing budgets governing a single `/execute/` request.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    pub execute_timeout_seconds: f64,
    pub wait_for_container_duration_seconds: f64,
    pub environment_expiration_seconds: u64,
}

/// Cron expressions driving the background scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub expire_environments_cron: String,
    pub refresh_libraries_cron: String,
}

/// External, read-only libraries mounted into every container.
#[derive(Debug, Clone)]
pub struct ExternalLibrariesConfig {
    pub root: PathBuf,
    /// `(git_url, alias)` pairs kept in sync by the scheduler.
    pub repositories: Vec<(String, String)>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            server: ServerConfig::from_env()?,
            container: ContainerConfig::from_env()?,
            storage: StorageConfig::from_env()?,
            execution: ExecutionConfig::from_env()?,
            scheduler: SchedulerConfig::from_env()?,
            external_libraries: ExternalLibrariesConfig::from_env()?,
        })
    }
}

impl ServerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| DEFAULT_SERVER_PORT.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".to_string()))?,
            rust_log: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            max_body_bytes: env::var("MAX_BODY_BYTES")
                .unwrap_or_else(|_| DEFAULT_MAX_BODY_BYTES.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("MAX_BODY_BYTES".to_string()))?,
        })
    }
}

impl ContainerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            docker_socket: env::var("DOCKER_SOCKET")
                .unwrap_or_else(|_| "/var/run/docker.sock".to_string()),
            image: env::var("SANDBOX_IMAGE").unwrap_or_else(|_| DEFAULT_CONTAINER_IMAGE.to_string()),
            docker_count: env::var("DOCKER_COUNT")
                .unwrap_or_else(|_| DEFAULT_DOCKER_COUNT.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DOCKER_COUNT".to_string()))?,
            cpu_count: env::var("CONTAINER_CPU_COUNT")
                .unwrap_or_else(|_| DEFAULT_CPU_COUNT.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("CONTAINER_CPU_COUNT".to_string()))?,
            memory_limit_mb: env::var("CONTAINER_MEMORY_LIMIT_MB")
                .unwrap_or_else(|_| DEFAULT_MEMORY_LIMIT_MB.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("CONTAINER_MEMORY_LIMIT_MB".to_string()))?,
            pids_limit: env::var("CONTAINER_PIDS_LIMIT")
                .unwrap_or_else(|_| DEFAULT_PIDS_LIMIT.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("CONTAINER_PIDS_LIMIT".to_string()))?,
        })
    }
}

impl StorageConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            environment_root: PathBuf::from(
                env::var("ENVIRONMENT_ROOT").unwrap_or_else(|_| DEFAULT_ENVIRONMENT_ROOT.to_string()),
            ),
            containers_env_root: PathBuf::from(
                env::var("CONTAINERS_ENV_ROOT")
                    .unwrap_or_else(|_| DEFAULT_CONTAINERS_ENV_ROOT.to_string()),
            ),
        })
    }
}

impl ExecutionConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            execute_timeout_seconds: env::var("EXECUTE_TIMEOUT")
                .unwrap_or_else(|_| DEFAULT_EXECUTE_TIMEOUT_SECONDS.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("EXECUTE_TIMEOUT".to_string()))?,
            wait_for_container_duration_seconds: env::var("WAIT_FOR_CONTAINER_DURATION")
                .unwrap_or_else(|_| DEFAULT_WAIT_FOR_CONTAINER_DURATION_SECONDS.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("WAIT_FOR_CONTAINER_DURATION".to_string()))?,
            environment_expiration_seconds: env::var("ENVIRONMENT_EXPIRATION")
                .unwrap_or_else(|_| DEFAULT_ENVIRONMENT_EXPIRATION_SECONDS.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("ENVIRONMENT_EXPIRATION".to_string()))?,
        })
    }
}

impl SchedulerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            expire_environments_cron: env::var("EXPIRE_ENVIRONMENTS_CRON")
                .unwrap_or_else(|_| DEFAULT_EXPIRE_ENVIRONMENTS_CRON.to_string()),
            refresh_libraries_cron: env::var("REFRESH_LIBRARIES_CRON")
                .unwrap_or_else(|_| DEFAULT_REFRESH_LIBRARIES_CRON.to_string()),
        })
    }
}

impl ExternalLibrariesConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let root = PathBuf::from(
            env::var("EXTERNAL_LIBRARIES_ROOT")
                .unwrap_or_else(|_| DEFAULT_EXTERNAL_LIBRARIES_ROOT.to_string()),
        );

        // EXTERNAL_LIBRARIES="https://example.com/a.git=alias_a,https://example.com/b.git=alias_b"
        let repositories = env::var("EXTERNAL_LIBRARIES")
            .ok()
            .map(|raw| {
                raw.split(',')
                    .filter(|pair| !pair.trim().is_empty())
                    .map(|pair| {
                        let (url, alias) = pair
                            .split_once('=')
                            .ok_or_else(|| ConfigError::InvalidValue("EXTERNAL_LIBRARIES".to_string()))?;
                        Ok((url.trim().to_string(), alias.trim().to_string()))
                    })
                    .collect::<Result<Vec<_>, ConfigError>>()
            })
            .transpose()?
            .unwrap_or_default();

        Ok(Self { root, repositories })
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let server = ServerConfig {
            host: DEFAULT_SERVER_HOST.to_string(),
            port: DEFAULT_SERVER_PORT,
            rust_log: "info".to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        };
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.port, 8080);
    }

    #[test]
    fn parses_external_libraries_pairs() {
        // SAFETY: tests run single-threaded per-process under cargo test's default harness;
        // no other test in this module touches EXTERNAL_LIBRARIES.
        unsafe {
            std::env::set_var(
                "EXTERNAL_LIBRARIES",
                "https://example.com/a.git=alias_a,https://example.com/b.git=alias_b",
            );
        }
        let cfg = ExternalLibrariesConfig::from_env().unwrap();
        assert_eq!(
            cfg.repositories,
            vec![
                ("https://example.com/a.git".to_string(), "alias_a".to_string()),
                ("https://example.com/b.git".to_string(), "alias_b".to_string()),
            ]
        );
        unsafe {
            std::env::remove_var("EXTERNAL_LIBRARIES");
        }
    }
}
