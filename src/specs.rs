//! Specifications / usage (component I)
//!
//! `specifications` is a near-static snapshot of host and declared
//! per-container resources; `usage` samples instantaneous utilisation over
//! a short window. Grounded in the `sysinfo`-based hardware introspection of
//! `hypermesh-online-hypermesh`'s `hardware.rs`, narrowed to what the
//! original's `docker.specifications`/`docker.usages` expose.

use std::time::Duration;

use serde::Serialize;
use sysinfo::{Disks, Networks, System};

use crate::config::ContainerConfig;
use crate::constants::SANDBOX_VERSION;

#[derive(Debug, Clone, Serialize)]
pub struct DiskFacts {
    pub mount_point: String,
    pub total_bytes: u64,
    pub available_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HostFacts {
    pub logical_cpus: usize,
    pub physical_cpus: usize,
    pub cpu_min_freq_mhz: u64,
    pub cpu_max_freq_mhz: u64,
    pub total_memory_bytes: u64,
    pub total_swap_bytes: u64,
    pub disks: Vec<DiskFacts>,
    pub container_runtime_version: String,
    pub sandbox_version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContainerLimits {
    pub cpu_count: f64,
    pub cpu_period: i64,
    pub cpu_quota: i64,
    pub memory_limit_bytes: u64,
    pub memory_swap_limit_bytes: u64,
    pub pids_limit: i64,
    pub working_dir: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Specifications {
    pub host: HostFacts,
    pub container: ContainerLimits,
    pub pool_size: usize,
}

/// Build the one-shot specifications snapshot. `docker_version` is the
/// engine version string obtained once at startup via `docker.version()`.
pub fn specifications(
    sys: &mut System,
    container: &ContainerConfig,
    docker_version: &str,
    pool_size: usize,
) -> Specifications {
    sys.refresh_cpu();
    sys.refresh_memory();
    let disks = Disks::new_with_refreshed_list();

    let frequencies: Vec<u64> = sys.cpus().iter().map(|cpu| cpu.frequency()).collect();
    let cpu_min_freq_mhz = frequencies.iter().copied().min().unwrap_or(0);
    let cpu_max_freq_mhz = frequencies.iter().copied().max().unwrap_or(0);

    let disks = disks
        .iter()
        .map(|disk| DiskFacts {
            mount_point: disk.mount_point().to_string_lossy().into_owned(),
            total_bytes: disk.total_space(),
            available_bytes: disk.available_space(),
        })
        .collect();

    Specifications {
        host: HostFacts {
            logical_cpus: sys.cpus().len(),
            physical_cpus: sys.physical_core_count().unwrap_or(sys.cpus().len()),
            cpu_min_freq_mhz,
            cpu_max_freq_mhz,
            total_memory_bytes: sys.total_memory(),
            total_swap_bytes: sys.total_swap(),
            disks,
            container_runtime_version: docker_version.to_string(),
            sandbox_version: SANDBOX_VERSION.to_string(),
        },
        container: ContainerLimits {
            cpu_count: container.cpu_count,
            cpu_period: 100_000,
            cpu_quota: (container.cpu_count * 100_000.0) as i64,
            memory_limit_bytes: container.memory_limit_mb * 1024 * 1024,
            memory_swap_limit_bytes: container.memory_limit_mb * 1024 * 1024,
            pids_limit: container.pids_limit,
            working_dir: crate::constants::CONTAINER_WORKDIR.to_string(),
        },
        pool_size,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiskUsage {
    pub mount_point: String,
    pub used_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Usage {
    pub cpu_percent: f32,
    pub load_average_one: f64,
    pub load_average_five: f64,
    pub load_average_fifteen: f64,
    pub used_memory_bytes: u64,
    pub used_swap_bytes: u64,
    pub disks: Vec<DiskUsage>,
    pub network_bytes_in_per_sec: u64,
    pub network_bytes_out_per_sec: u64,
    pub network_packets_in_per_sec: u64,
    pub network_packets_out_per_sec: u64,
    pub process_count: usize,
    pub container_count: usize,
}

const SAMPLE_WINDOW: Duration = Duration::from_secs(2);

/// Sample live utilisation over [`SAMPLE_WINDOW`]. `container_count` is
/// `N - pool.available()`, computed by the caller to avoid this module
/// depending on the pool.
pub async fn usage(sys: &mut System, container_count: usize) -> Usage {
    sys.refresh_cpu();
    sys.refresh_memory();
    sys.refresh_processes();

    let mut networks = Networks::new_with_refreshed_list();
    let (bytes_in_start, bytes_out_start, packets_in_start, packets_out_start) =
        network_totals(&networks);

    tokio::time::sleep(SAMPLE_WINDOW).await;

    sys.refresh_cpu();
    sys.refresh_memory();
    networks.refresh();

    let (bytes_in_end, bytes_out_end, packets_in_end, packets_out_end) = network_totals(&networks);
    let window_secs = SAMPLE_WINDOW.as_secs_f64();

    let load = System::load_average();

    let disks = Disks::new_with_refreshed_list()
        .iter()
        .map(|disk| DiskUsage {
            mount_point: disk.mount_point().to_string_lossy().into_owned(),
            used_bytes: disk.total_space().saturating_sub(disk.available_space()),
        })
        .collect();

    Usage {
        cpu_percent: sys.global_cpu_info().cpu_usage(),
        load_average_one: load.one,
        load_average_five: load.five,
        load_average_fifteen: load.fifteen,
        used_memory_bytes: sys.used_memory(),
        used_swap_bytes: sys.used_swap(),
        disks,
        network_bytes_in_per_sec: rate(bytes_in_start, bytes_in_end, window_secs),
        network_bytes_out_per_sec: rate(bytes_out_start, bytes_out_end, window_secs),
        network_packets_in_per_sec: rate(packets_in_start, packets_in_end, window_secs),
        network_packets_out_per_sec: rate(packets_out_start, packets_out_end, window_secs),
        process_count: sys.processes().len(),
        container_count,
    }
}

fn network_totals(networks: &Networks) -> (u64, u64, u64, u64) {
    networks.iter().fold((0, 0, 0, 0), |acc, (_, data)| {
        (
            acc.0 + data.total_received(),
            acc.1 + data.total_transmitted(),
            acc.2 + data.total_packets_received(),
            acc.3 + data.total_packets_transmitted(),
        )
    })
}

fn rate(start: u64, end: u64, window_secs: f64) -> u64 {
    (end.saturating_sub(start) as f64 / window_secs) as u64
}
