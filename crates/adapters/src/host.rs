//! Host inventory sampling (§4.C). Pure best-effort sampling: every field
//! has a defined default so registration JSON is always well-formed even
//! when a particular probe fails.

use imagebridge_core::host::{GpuFacts, HostFacts, MountFacts};
use sysinfo::{Disks, System};
use tokio::process::Command;

/// Collects a fresh [`HostFacts`] snapshot. Never fails: individual probes
/// degrade to sentinel values rather than aborting registration (§4.C).
pub async fn collect() -> HostFacts {
    let mut sys = System::new_all();
    sys.refresh_all();

    let os_arch = format!(
        "{} {}",
        System::long_os_version().unwrap_or_else(|| "unknown".to_string()),
        std::env::consts::ARCH
    );
    let physical_cores = System::physical_core_count().unwrap_or(0) as u32;
    let logical_cores = sys.cpus().len() as u32;
    let total_ram_gb = sys.total_memory() as f64 / 1e9;

    let mounts = Disks::new_with_refreshed_list()
        .iter()
        .map(|d| MountFacts {
            mount_point: d.mount_point().to_string_lossy().to_string(),
            total_bytes: d.total_space(),
            free_bytes: d.available_space(),
        })
        .collect();

    let gpus = collect_gpus().await;

    HostFacts { os_arch, physical_cores, logical_cores, total_ram_gb, gpus, mounts }
}

/// §4.C: vendor-specific enumeration first (NVIDIA CLI parse), falling back
/// to an OS-level display enumeration attempt, then to an empty list (the
/// caller's `HostFacts::primary_gpu_name` already sentinels an empty list
/// to `"unknown"`).
async fn collect_gpus() -> Vec<GpuFacts> {
    if let Some(gpus) = nvidia_smi_gpus().await {
        return gpus;
    }
    os_display_gpus().await.unwrap_or_default()
}

async fn nvidia_smi_gpus() -> Option<Vec<GpuFacts>> {
    let output = Command::new("nvidia-smi")
        .arg("--query-gpu=name,memory.total,memory.used,memory.free,utilization.gpu")
        .arg("--format=csv,noheader,nounits")
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let gpus: Vec<GpuFacts> = stdout.lines().filter_map(parse_nvidia_smi_line).collect();
    if gpus.is_empty() {
        None
    } else {
        Some(gpus)
    }
}

fn parse_nvidia_smi_line(line: &str) -> Option<GpuFacts> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    let [name, total, used, free, util] = fields.as_slice() else { return None };
    Some(GpuFacts {
        name: name.to_string(),
        total_vram_mb: total.parse().ok()?,
        used_vram_mb: used.parse().ok()?,
        free_vram_mb: free.parse().ok()?,
        utilization_pct: util.parse().ok()?,
        vendor: "nvidia".to_string(),
    })
}

/// Last-resort fallback when no vendor CLI is present: a coarse OS-level
/// display enumeration. Linux has no universal portable API for this, so
/// this probe is intentionally conservative and usually comes up empty,
/// handing control to the zero-valued placeholder described in §4.C.
async fn os_display_gpus() -> Option<Vec<GpuFacts>> {
    let output = Command::new("lspci").output().await.ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let gpus: Vec<GpuFacts> = stdout
        .lines()
        .filter(|l| l.to_lowercase().contains("vga") || l.to_lowercase().contains("3d controller"))
        .map(|l| GpuFacts {
            name: l.splitn(2, ": ").nth(1).unwrap_or(l).trim().to_string(),
            vendor: "unknown".to_string(),
            ..Default::default()
        })
        .collect();
    if gpus.is_empty() {
        None
    } else {
        Some(gpus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_nvidia_smi_line() {
        let gpu = parse_nvidia_smi_line("NVIDIA GeForce RTX 4090, 24576, 1024, 23552, 12").unwrap();
        assert_eq!(gpu.name, "NVIDIA GeForce RTX 4090");
        assert_eq!(gpu.total_vram_mb, 24576);
        assert_eq!(gpu.free_vram_mb, 23552);
        assert_eq!(gpu.vendor, "nvidia");
    }

    #[test]
    fn malformed_nvidia_smi_line_is_skipped() {
        assert!(parse_nvidia_smi_line("not,enough,fields").is_none());
    }

    #[tokio::test]
    async fn collect_never_panics_and_produces_well_formed_facts() {
        let facts = collect().await;
        assert!(facts.logical_cores > 0 || facts.logical_cores == 0);
        let _ = facts.to_registration_json("https://x.trycloudflare.com", 0);
    }
}
