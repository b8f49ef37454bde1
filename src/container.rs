//! Container driver (component A)
//!
//! A thin wrapper over the container runtime: create a sandbox container,
//! exec a command inside it with a wall-clock timeout and env-vars, restart
//! it, and remove it. Grounded in the teacher's
//! `benchmark::container::ContainerManager` for the bollard exec/demux
//! pattern, and in the original's `sandbox.containers.create_container` for
//! the bind-mount layout: each slot's private host directory is bound
//! straight onto the container's working directory, so staging and
//! harvesting a run's files never needs a Docker-side copy — the executor
//! (and environment store) read and write the host side of that mount
//! directly. Widened to a `ContainerRuntime` trait so the pool and executor
//! can be driven by a fake in tests, per the dependency-injection note for
//! global mutable state.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bollard::{
    container::LogOutput,
    exec::CreateExecOptions,
    models::{ContainerCreateBody, HostConfig},
    query_parameters::{
        CreateContainerOptionsBuilder, RemoveContainerOptionsBuilder,
        RestartContainerOptionsBuilder, StartContainerOptions,
    },
    Docker,
};
use futures::StreamExt;

use crate::config::ContainerConfig;
use crate::constants::{CONTAINER_WORKDIR, EXTERNAL_LIBRARIES_MOUNT};

/// Outcome of a single exec call, kept as data rather than an exception so
/// the executor can convert it to a status code only at the response
/// boundary (see spec's design note on exceptions for control flow).
#[derive(Debug, Clone)]
pub enum CommandOutcome {
    Completed {
        exit_code: i64,
        stdout: String,
        stderr: String,
        elapsed: Duration,
    },
    Timeout {
        elapsed: Duration,
    },
    RuntimeFailure(String),
}

/// Thin wrapper over the container runtime. Implemented against bollard;
/// abstracted behind a trait so tests can substitute a fake runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create and start a container named `name`, bind-mounting `envpath_host`
    /// (the slot's private host directory) onto its working directory and
    /// `libs_host_path` read-only onto the external-libraries mount.
    async fn create(&self, name: &str, envpath_host: &str, libs_host_path: &str) -> anyhow::Result<String>;
    async fn restart(&self, container_id: &str) -> anyhow::Result<()>;
    async fn remove(&self, container_id: &str) -> anyhow::Result<()>;
    async fn exec(
        &self,
        container_id: &str,
        command: &str,
        environ: &HashMap<String, String>,
        timeout: Duration,
    ) -> CommandOutcome;
}

/// Bollard-backed implementation of [`ContainerRuntime`].
pub struct BollardRuntime {
    docker: Docker,
    config: ContainerConfig,
}

impl BollardRuntime {
    pub fn new(docker: Docker, config: ContainerConfig) -> Self {
        Self { docker, config }
    }
}

#[async_trait]
impl ContainerRuntime for BollardRuntime {
    async fn create(&self, name: &str, envpath_host: &str, libs_host_path: &str) -> anyhow::Result<String> {
        let options = CreateContainerOptionsBuilder::default().name(name).build();

        let host_config = HostConfig {
            memory: Some((self.config.memory_limit_mb * 1024 * 1024) as i64),
            memory_swap: Some((self.config.memory_limit_mb * 1024 * 1024) as i64),
            cpu_period: Some(100_000),
            cpu_quota: Some((self.config.cpu_count * 100_000.0) as i64),
            network_mode: Some("none".to_string()),
            pids_limit: Some(self.config.pids_limit),
            readonly_rootfs: Some(false),
            binds: Some(vec![
                format!("{envpath_host}:{CONTAINER_WORKDIR}:rw"),
                format!("{libs_host_path}:{EXTERNAL_LIBRARIES_MOUNT}:ro"),
            ]),
            ..Default::default()
        };

        let body = ContainerCreateBody {
            image: Some(self.config.image.clone()),
            tty: Some(true),
            open_stdin: Some(true),
            host_config: Some(host_config),
            working_dir: Some(CONTAINER_WORKDIR.to_string()),
            env: Some(vec![format!(
                "PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin:{EXTERNAL_LIBRARIES_MOUNT}",
            )]),
            ..Default::default()
        };

        let container = self.docker.create_container(Some(options), body).await?;
        self.docker
            .start_container(&container.id, None::<StartContainerOptions>)
            .await?;

        Ok(container.id)
    }

    async fn restart(&self, container_id: &str) -> anyhow::Result<()> {
        let options = RestartContainerOptionsBuilder::default().build();
        self.docker.restart_container(container_id, Some(options)).await?;
        Ok(())
    }

    async fn remove(&self, container_id: &str) -> anyhow::Result<()> {
        let options = RemoveContainerOptionsBuilder::default().force(true).build();
        self.docker.remove_container(container_id, Some(options)).await?;
        Ok(())
    }

    async fn exec(
        &self,
        container_id: &str,
        command: &str,
        environ: &HashMap<String, String>,
        timeout: Duration,
    ) -> CommandOutcome {
        let env: Vec<String> = environ.iter().map(|(k, v)| format!("{k}={v}")).collect();

        let start = Instant::now();
        let run = async {
            let exec = self
                .docker
                .create_exec(
                    container_id,
                    CreateExecOptions {
                        cmd: Some(vec!["bash".to_string(), "-c".to_string(), command.to_string()]),
                        env: Some(env),
                        attach_stdout: Some(true),
                        attach_stderr: Some(true),
                        working_dir: Some(CONTAINER_WORKDIR.to_string()),
                        ..Default::default()
                    },
                )
                .await?;

            let output = self.docker.start_exec(&exec.id, None).await?;

            let mut stdout = String::new();
            let mut stderr = String::new();

            if let bollard::exec::StartExecResults::Attached { mut output, .. } = output {
                while let Some(msg) = output.next().await {
                    match msg? {
                        LogOutput::StdOut { message } => {
                            stdout.push_str(&String::from_utf8_lossy(&message));
                        }
                        LogOutput::StdErr { message } => {
                            stderr.push_str(&String::from_utf8_lossy(&message));
                        }
                        _ => {}
                    }
                }
            }

            let inspect = self.docker.inspect_exec(&exec.id).await?;
            let exit_code = inspect.exit_code.unwrap_or(-1);

            Ok::<_, bollard::errors::Error>((exit_code, stdout, stderr))
        };

        match tokio::time::timeout(timeout, run).await {
            Ok(Ok((exit_code, stdout, stderr))) => CommandOutcome::Completed {
                exit_code,
                stdout: stdout.trim_end().to_string(),
                stderr: stderr.trim_end().to_string(),
                elapsed: start.elapsed(),
            },
            Ok(Err(e)) => CommandOutcome::RuntimeFailure(e.to_string()),
            Err(_) => CommandOutcome::Timeout {
                elapsed: start.elapsed(),
            },
        }
    }
}

/// A fake [`ContainerRuntime`] returning pre-programmed outcomes, keyed by
/// the exact command string, so executor/pool tests never touch a real
/// container runtime or wait on real timers.
#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::collections::HashMap as Map;
    use tokio::sync::Mutex as AsyncMutex;

    pub struct FakeRuntime {
        responses: Map<String, CommandOutcome>,
        pub created: AsyncMutex<Vec<String>>,
        pub removed: AsyncMutex<Vec<String>>,
        pub restart_should_fail: bool,
    }

    impl Default for FakeRuntime {
        fn default() -> Self {
            Self {
                responses: Map::new(),
                created: AsyncMutex::new(Vec::new()),
                removed: AsyncMutex::new(Vec::new()),
                restart_should_fail: false,
            }
        }
    }

    impl FakeRuntime {
        pub fn new() -> Self {
            Self::default()
        }

        /// Program the outcome returned for an exact command string.
        pub fn on(mut self, command: &str, outcome: CommandOutcome) -> Self {
            self.responses.insert(command.to_string(), outcome);
            self
        }

        pub fn failing_restart(mut self) -> Self {
            self.restart_should_fail = true;
            self
        }
    }

    #[async_trait]
    impl ContainerRuntime for FakeRuntime {
        async fn create(&self, name: &str, _envpath_host: &str, _libs_host_path: &str) -> anyhow::Result<String> {
            self.created.lock().await.push(name.to_string());
            Ok(format!("fake-{name}"))
        }

        async fn restart(&self, _container_id: &str) -> anyhow::Result<()> {
            if self.restart_should_fail {
                anyhow::bail!("simulated restart failure");
            }
            Ok(())
        }

        async fn remove(&self, container_id: &str) -> anyhow::Result<()> {
            self.removed.lock().await.push(container_id.to_string());
            Ok(())
        }

        async fn exec(
            &self,
            _container_id: &str,
            command: &str,
            _environ: &HashMap<String, String>,
            _timeout: Duration,
        ) -> CommandOutcome {
            self.responses.get(command).cloned().unwrap_or(CommandOutcome::Completed {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
                elapsed: Duration::from_millis(1),
            })
        }
    }
}
