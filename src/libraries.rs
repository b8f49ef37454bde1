//! External libraries staging (component J)
//!
//! Keeps `EXTERNAL_LIBRARIES_ROOT` in sync with the declared `(url, alias)`
//! list by shelling out to the `git` binary, exactly as the original's
//! `sandbox.git.clone`/`pull` do. `GIT_TERMINAL_PROMPT=0` suppresses any
//! interactive credential prompt so a misconfigured private repo fails fast
//! instead of hanging the scheduler.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use tokio::process::Command as ProcessCommand;

use crate::config::ExternalLibrariesConfig;
use crate::container::{CommandOutcome, ContainerRuntime};

/// Clone or pull every configured repository, logging (but not failing on)
/// individual git errors so one bad repo doesn't block the rest.
pub async fn refresh_all(config: &ExternalLibrariesConfig) -> std::io::Result<()> {
    std::fs::create_dir_all(&config.root)?;

    for (url, alias) in &config.repositories {
        let repo_path = config.root.join(alias);
        let result = if repo_path.is_dir() {
            pull(&repo_path, url).await
        } else {
            clone(&config.root, url, alias).await
        };

        match result {
            Ok(status) if status.success() => {
                tracing::info!(alias = %alias, url = %url, "external library refreshed");
            }
            Ok(status) => {
                tracing::error!(alias = %alias, url = %url, code = ?status.code(), "external library refresh failed");
            }
            Err(e) => {
                tracing::error!(alias = %alias, url = %url, "failed to run git: {e}");
            }
        }
    }

    Ok(())
}

async fn clone(root: &Path, url: &str, alias: &str) -> std::io::Result<std::process::ExitStatus> {
    ProcessCommand::new("git")
        .arg("clone")
        .arg(url)
        .arg(alias)
        .current_dir(root)
        .env("GIT_TERMINAL_PROMPT", "0")
        .status()
        .await
}

async fn pull(repo_path: &Path, url: &str) -> std::io::Result<std::process::ExitStatus> {
    ProcessCommand::new("git")
        .arg("pull")
        .arg(url)
        .arg("master")
        .current_dir(repo_path)
        .env("GIT_TERMINAL_PROMPT", "0")
        .status()
        .await
}

/// List of installed libraries and binaries, for the `/libraries/` endpoint.
/// Walks `EXTERNAL_LIBRARIES_ROOT` for the configured aliases and `$PATH` for
/// executables, mirroring the original's `docker.libraries` introspection.
/// `container` is the already-probed sandbox-image inventory (see
/// [`probe_container`]); the handler supplies it since gathering it needs a
/// live container exec, which this function does not have access to.
pub fn installed(config: &ExternalLibrariesConfig, container: ContainerLibraries) -> InstalledLibraries {
    let external = config
        .repositories
        .iter()
        .map(|(_, alias)| alias.clone())
        .filter(|alias| config.root.join(alias).is_dir())
        .collect();

    let path_binaries = std::env::var_os("PATH")
        .map(|path| {
            std::env::split_paths(&path)
                .filter_map(|dir| std::fs::read_dir(&dir).ok())
                .flat_map(|entries| entries.filter_map(Result::ok))
                .filter_map(|entry| entry.file_name().into_string().ok())
                .collect()
        })
        .unwrap_or_default();

    InstalledLibraries {
        external,
        path_binaries,
        container,
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct InstalledLibraries {
    pub external: Vec<String>,
    pub path_binaries: Vec<String>,
    pub container: ContainerLibraries,
}

/// System/interpreter/library inventory of the sandbox image itself,
/// mirroring the original's `docker.libraries` probe (`dpkg`, `pip freeze`,
/// `cpan -l`, `ldconfig`). Generalized from the original's php-only
/// `dpkg --get-selections` filter to every installed package, since nothing
/// in this service is php-specific.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ContainerLibraries {
    pub python3_version: Option<String>,
    pub gcc_version: Option<String>,
    pub perl_version: Option<String>,
    pub system: BTreeMap<String, String>,
    pub python: BTreeMap<String, String>,
    pub perl: BTreeMap<String, String>,
    pub c: BTreeMap<String, String>,
}

const PROBE_SCRIPT: &str = r#"
echo '--PYTHON3--'; python3 --version 2>&1
echo '--GCC--'; gcc --version 2>&1 | head -n1
echo '--PERL--'; perl --version 2>&1 | sed -n '2p'
echo '--SYSTEM--'; dpkg-query -W -f='${Package}\t${Version}\n' 2>/dev/null
echo '--PYTHONLIBS--'; pip freeze 2>/dev/null
echo '--PERLLIBS--'; cpan -l 2>/dev/null
echo '--CLIBS--'; /sbin/ldconfig -p 2>/dev/null | tail -n +2
"#;

/// Probe a live sandbox container for its installed system/python/perl/c
/// libraries. Runs one combined shell script through [`ContainerRuntime::exec`]
/// and splits its output back into sections by marker line; on timeout or a
/// runtime failure this returns an empty inventory rather than failing the
/// whole `/libraries/` response, since this is best-effort introspection.
pub async fn probe_container(
    runtime: &dyn ContainerRuntime,
    container_id: &str,
    timeout: Duration,
) -> ContainerLibraries {
    let environ = HashMap::new();
    match runtime.exec(container_id, PROBE_SCRIPT, &environ, timeout).await {
        CommandOutcome::Completed { stdout, .. } => parse_probe_output(&stdout),
        CommandOutcome::Timeout { .. } => {
            tracing::warn!("library probe timed out");
            ContainerLibraries::default()
        }
        CommandOutcome::RuntimeFailure(e) => {
            tracing::warn!("library probe failed: {e}");
            ContainerLibraries::default()
        }
    }
}

fn parse_probe_output(stdout: &str) -> ContainerLibraries {
    let mut sections: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut current = "";

    for line in stdout.lines() {
        if let Some(marker) = line.strip_prefix("--").and_then(|l| l.strip_suffix("--")) {
            current = marker;
            sections.entry(current).or_default();
            continue;
        }
        if !current.is_empty() {
            sections.entry(current).or_default().push(line);
        }
    }

    let first_line = |key: &str| -> Option<String> {
        sections
            .get(key)
            .and_then(|lines| lines.iter().find(|l| !l.trim().is_empty()))
            .map(|l| l.trim().to_string())
    };

    ContainerLibraries {
        python3_version: first_line("PYTHON3"),
        gcc_version: first_line("GCC"),
        perl_version: first_line("PERL"),
        system: parse_tab_separated(sections.get("SYSTEM")),
        python: parse_pip_freeze(sections.get("PYTHONLIBS")),
        perl: parse_tab_separated(sections.get("PERLLIBS")),
        c: parse_ldconfig(sections.get("CLIBS")),
    }
}

fn parse_tab_separated(lines: Option<&Vec<&str>>) -> BTreeMap<String, String> {
    lines
        .into_iter()
        .flatten()
        .filter_map(|line| {
            let mut parts = line.splitn(2, '\t');
            let name = parts.next()?.trim();
            let version = parts.next().unwrap_or("undef").trim();
            if name.is_empty() {
                return None;
            }
            let version = if version.is_empty() || version == "undef" { "?" } else { version };
            Some((name.to_string(), version.to_string()))
        })
        .collect()
}

fn parse_pip_freeze(lines: Option<&Vec<&str>>) -> BTreeMap<String, String> {
    lines
        .into_iter()
        .flatten()
        .filter_map(|line| line.split_once("=="))
        .map(|(name, version)| (name.trim().to_string(), version.trim().to_string()))
        .collect()
}

fn parse_ldconfig(lines: Option<&Vec<&str>>) -> BTreeMap<String, String> {
    lines
        .into_iter()
        .flatten()
        .filter_map(|line| {
            // "	libfoo.so.6 (libc6,x86-64) => /lib/x86_64-linux-gnu/libfoo.so.6.0.0"
            let name_field = line.trim().split_whitespace().next()?;
            let (name, rest) = name_field.split_once(".so")?;
            if name.is_empty() {
                return None;
            }
            let version = rest.trim_start_matches('.');
            let version = if version.is_empty() { "?" } else { version };
            Some((name.to_string(), version.to_string()))
        })
        .collect()
}
