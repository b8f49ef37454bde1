//! Executor (component F)
//!
//! Given a pool slot, a staged input environment, and a parsed command
//! list, drives the end-to-end run and builds the response. Grounded in
//! the original's `sandbox.assetor.Assetor.execute`: stage, run loop with a
//! shrinking time budget, harvest the result file, optionally snapshot.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::command::Command;
use crate::constants::error_codes;
use crate::container::{CommandOutcome, ContainerRuntime};
use crate::error::AppResult;
use crate::pool::Slot;
use crate::store::EnvironmentStore;

/// One command's result, as reported to the client.
#[derive(Debug, Clone, Serialize)]
pub struct PerCommand {
    pub command: String,
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
    pub time: f64,
}

/// The full `/execute/` response body.
#[derive(Debug, Clone, Serialize)]
pub struct ExecuteResponse {
    pub status: i64,
    pub execution: Vec<PerCommand>,
    pub total_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire: Option<DateTime<Utc>>,
}

/// Run `commands` inside `slot`, optionally preloaded from `input_env` and
/// optionally snapshotted under a fresh id when `save` is set.
pub async fn execute(
    runtime: &dyn ContainerRuntime,
    store: &EnvironmentStore,
    slot: &Slot,
    input_env: Option<&[u8]>,
    commands: &[Command],
    result_path: Option<&str>,
    save: bool,
    execute_timeout: Duration,
    environment_ttl: Duration,
) -> AppResult<ExecuteResponse> {
    let start = Instant::now();

    if let Some(bytes) = input_env {
        EnvironmentStore::extract_into(bytes, &slot.envpath)?;
    }

    let mut execution = Vec::with_capacity(commands.len());
    let mut remaining = execute_timeout;
    let mut status: i64 = 0;

    for command in commands {
        let clamped = Duration::from_secs_f64(command.timeout).min(remaining);

        let outcome = runtime
            .exec(&slot.container_id, &command.command, &command.environ, clamped)
            .await;

        let (exit_code, stdout, stderr, elapsed, stop) = match outcome {
            CommandOutcome::Completed {
                exit_code,
                stdout,
                stderr,
                elapsed,
            } => {
                let stop = if command.ignore_failure {
                    false
                } else if exit_code == 0 {
                    false
                } else {
                    status = exit_code;
                    true
                };
                (exit_code, stdout, stderr, elapsed, stop)
            }
            CommandOutcome::Timeout { elapsed } => {
                status = error_codes::TIMEOUT as i64;
                (
                    error_codes::TIMEOUT as i64,
                    String::new(),
                    format!("Command timed out after {} seconds\n", command.timeout),
                    elapsed,
                    true,
                )
            }
            CommandOutcome::RuntimeFailure(reason) => {
                tracing::warn!(command = %command.command, "command exec failed: {reason}");
                status = error_codes::UNKNOWN as i64;
                (
                    error_codes::UNKNOWN as i64,
                    String::new(),
                    "An unknown error occurred on the sandbox\n".to_string(),
                    Duration::ZERO,
                    true,
                )
            }
        };

        execution.push(PerCommand {
            command: command.command.clone(),
            exit_code,
            stdout,
            stderr,
            time: elapsed.as_secs_f64(),
        });

        remaining = remaining.saturating_sub(elapsed);

        if stop {
            break;
        }
    }

    let mut result = None;
    if let Some(result_path) = result_path {
        let full_path = slot.envpath.join(result_path);
        match std::fs::read(&full_path) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(content) => result = Some(content),
                Err(_) => status = error_codes::RESULT_NOT_UTF8 as i64,
            },
            Err(_) => status = error_codes::RESULT_NOT_FOUND as i64,
        }
    }

    let mut environment = None;
    let mut expire = None;
    if save {
        let fresh_id = store.fresh_id();
        store.snapshot(&slot.envpath, &fresh_id)?;
        expire = Some(Utc::now() + chrono::Duration::from_std(environment_ttl).unwrap_or_default());
        environment = Some(fresh_id);
    }

    Ok(ExecuteResponse {
        status,
        execution,
        total_time: start.elapsed().as_secs_f64(),
        result,
        environment,
        expire,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::test_support::FakeRuntime;
    use std::collections::HashMap;

    fn cmd(command: &str, timeout: f64, ignore_failure: bool) -> Command {
        Command {
            command: command.to_string(),
            timeout,
            ignore_failure,
            environ: HashMap::new(),
        }
    }

    fn slot(envpath: std::path::PathBuf) -> Slot {
        Slot {
            index: 0,
            name: "c0".to_string(),
            container_id: "fake-c0".to_string(),
            envpath,
        }
    }

    #[tokio::test]
    async fn stops_on_first_non_ignored_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = EnvironmentStore::new(dir.path().join("envs"), Duration::from_secs(3600)).unwrap();
        let runtime = FakeRuntime::new()
            .on(
                "true",
                CommandOutcome::Completed {
                    exit_code: 0,
                    stdout: String::new(),
                    stderr: String::new(),
                    elapsed: Duration::from_millis(5),
                },
            )
            .on(
                "false",
                CommandOutcome::Completed {
                    exit_code: 1,
                    stdout: String::new(),
                    stderr: String::new(),
                    elapsed: Duration::from_millis(5),
                },
            )
            .on(
                "echo should not run",
                CommandOutcome::Completed {
                    exit_code: 0,
                    stdout: "unreachable".to_string(),
                    stderr: String::new(),
                    elapsed: Duration::from_millis(5),
                },
            );

        let commands = vec![
            cmd("true", 5.0, false),
            cmd("false", 5.0, false),
            cmd("echo should not run", 5.0, false),
        ];

        let slot = slot(dir.path().join("slot0"));
        std::fs::create_dir_all(&slot.envpath).unwrap();

        let response = execute(
            &runtime,
            &store,
            &slot,
            None,
            &commands,
            None,
            false,
            Duration::from_secs(10),
            Duration::from_secs(3600),
        )
        .await
        .unwrap();

        assert_eq!(response.status, 1);
        assert_eq!(response.execution.len(), 2);
    }

    #[tokio::test]
    async fn ignore_failure_continues_the_chain() {
        let dir = tempfile::tempdir().unwrap();
        let store = EnvironmentStore::new(dir.path().join("envs"), Duration::from_secs(3600)).unwrap();
        let runtime = FakeRuntime::new().on(
            "false",
            CommandOutcome::Completed {
                exit_code: 1,
                stdout: String::new(),
                stderr: String::new(),
                elapsed: Duration::from_millis(5),
            },
        );

        let commands = vec![cmd("false", 5.0, true)];
        let slot = slot(dir.path().join("slot0"));
        std::fs::create_dir_all(&slot.envpath).unwrap();

        let response = execute(
            &runtime,
            &store,
            &slot,
            None,
            &commands,
            None,
            false,
            Duration::from_secs(10),
            Duration::from_secs(3600),
        )
        .await
        .unwrap();

        assert_eq!(response.status, 0);
        assert_eq!(response.execution[0].exit_code, 1);
    }

    #[tokio::test]
    async fn command_timeout_sets_negative_status_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let store = EnvironmentStore::new(dir.path().join("envs"), Duration::from_secs(3600)).unwrap();
        let runtime = FakeRuntime::new().on(
            "sleep 1",
            CommandOutcome::Timeout {
                elapsed: Duration::from_millis(200),
            },
        );

        let commands = vec![cmd("sleep 1", 0.2, false)];
        let slot = slot(dir.path().join("slot0"));
        std::fs::create_dir_all(&slot.envpath).unwrap();

        let response = execute(
            &runtime,
            &store,
            &slot,
            None,
            &commands,
            None,
            false,
            Duration::from_secs(10),
            Duration::from_secs(3600),
        )
        .await
        .unwrap();

        assert_eq!(response.status, crate::constants::error_codes::TIMEOUT as i64);
        assert_eq!(response.execution[0].exit_code, crate::constants::error_codes::TIMEOUT as i64);
        assert!(response.execution[0].stderr.contains("timed out after 0.2 seconds"));
    }

    #[tokio::test]
    async fn result_path_missing_sets_result_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = EnvironmentStore::new(dir.path().join("envs"), Duration::from_secs(3600)).unwrap();
        let runtime = FakeRuntime::new().on(
            "true",
            CommandOutcome::Completed {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
                elapsed: Duration::from_millis(5),
            },
        );

        let commands = vec![cmd("true", 5.0, false)];
        let slot = slot(dir.path().join("slot0"));
        std::fs::create_dir_all(&slot.envpath).unwrap();

        let response = execute(
            &runtime,
            &store,
            &slot,
            None,
            &commands,
            Some("result.txt"),
            false,
            Duration::from_secs(10),
            Duration::from_secs(3600),
        )
        .await
        .unwrap();

        assert_eq!(response.status, crate::constants::error_codes::RESULT_NOT_FOUND as i64);
        assert!(response.result.is_none());
    }

    #[tokio::test]
    async fn result_path_present_is_harvested_and_save_uses_a_fresh_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = EnvironmentStore::new(dir.path().join("envs"), Duration::from_secs(3600)).unwrap();
        let runtime = FakeRuntime::new().on(
            "true",
            CommandOutcome::Completed {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
                elapsed: Duration::from_millis(5),
            },
        );

        let commands = vec![cmd("true", 5.0, false)];
        let slot = slot(dir.path().join("slot0"));
        std::fs::create_dir_all(&slot.envpath).unwrap();

        // Preload the slot from a stored input environment, the way the
        // executor's own staging step would after a tar-merge.
        let input_id = store.fresh_id();
        let input_tar = make_tar_gz(&[("dir/file1.txt", "env1")]);
        store.put(&input_id, &input_tar).unwrap();
        let staged = store.read(&input_id).unwrap();

        std::fs::write(slot.envpath.join("result.txt"), "Hello\n").unwrap();

        let response = execute(
            &runtime,
            &store,
            &slot,
            Some(&staged),
            &commands,
            Some("result.txt"),
            true,
            Duration::from_secs(10),
            Duration::from_secs(3600),
        )
        .await
        .unwrap();

        assert_eq!(response.status, 0);
        assert_eq!(response.result.as_deref(), Some("Hello\n"));
        assert_eq!(std::fs::read_to_string(slot.envpath.join("dir/file1.txt")).unwrap(), "env1");

        let saved_id = response.environment.expect("save=true must produce an id");
        assert_ne!(saved_id, input_id, "snapshot must use a fresh id distinct from the input env");

        let extracted = store.extract_file(&saved_id, "result.txt").unwrap();
        assert_eq!(extracted, b"Hello\n");
    }

    fn make_tar_gz(entries: &[(&str, &str)]) -> Vec<u8> {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, content) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, content.as_bytes()).unwrap();
        }
        let encoder = builder.into_inner().unwrap();
        encoder.finish().unwrap()
    }
}
