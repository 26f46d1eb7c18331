//! Host inventory data model (§3 HostFacts, §4.C). Sampling lives in
//! `imagebridge-adapters::host`; this module just defines the sentinel-
//! filled snapshot shape and the flattened registration schema.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GpuFacts {
    pub name: String,
    pub total_vram_mb: u64,
    pub used_vram_mb: u64,
    pub free_vram_mb: u64,
    pub utilization_pct: f32,
    pub vendor: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MountFacts {
    pub mount_point: String,
    pub total_bytes: u64,
    pub free_bytes: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostFacts {
    pub os_arch: String,
    pub physical_cores: u32,
    pub logical_cores: u32,
    pub total_ram_gb: f64,
    pub gpus: Vec<GpuFacts>,
    pub mounts: Vec<MountFacts>,
}

impl HostFacts {
    /// A best-effort placeholder used when sampling fails entirely —
    /// registration must still go out with a well-formed body (§4.C).
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn total_vram_gb(&self) -> f64 {
        self.gpus
            .iter()
            .map(|g| g.total_vram_mb as f64 / 1024.0)
            .sum()
    }

    pub fn total_disk_gb(&self) -> f64 {
        self.mounts.iter().map(|m| m.total_bytes as f64 / 1e9).sum()
    }

    pub fn available_disk_gb(&self) -> f64 {
        self.mounts.iter().map(|m| m.free_bytes as f64 / 1e9).sum()
    }

    pub fn primary_gpu_name(&self) -> String {
        self.gpus
            .first()
            .map(|g| g.name.clone())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Flattened registration payload shape from §4.C / §6.
    pub fn to_registration_json(&self, endpoint: &str, timestamp_ms: u64) -> serde_json::Value {
        serde_json::json!({
            "gpu": self.primary_gpu_name(),
            "vram": self.total_vram_gb(),
            "cpu": self.os_arch,
            "ram": self.total_ram_gb,
            "total_disk": self.total_disk_gb(),
            "available_disk": self.available_disk_gb(),
            "endpoint": endpoint,
            "timestamp": timestamp_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_facts_still_produce_well_formed_json() {
        let facts = HostFacts::unknown();
        let json = facts.to_registration_json("https://x.trycloudflare.com", 123);
        assert_eq!(json["gpu"], "unknown");
        assert_eq!(json["vram"], 0.0);
        assert_eq!(json["endpoint"], "https://x.trycloudflare.com");
    }

    #[test]
    fn vram_sums_across_gpus_in_gb() {
        let facts = HostFacts {
            gpus: vec![
                GpuFacts { total_vram_mb: 8192, ..Default::default() },
                GpuFacts { total_vram_mb: 8192, ..Default::default() },
            ],
            ..Default::default()
        };
        assert_eq!(facts.total_vram_gb(), 16.0);
    }

    #[test]
    fn disk_totals_sum_across_mounts() {
        let facts = HostFacts {
            mounts: vec![
                MountFacts { total_bytes: 1_000_000_000, free_bytes: 500_000_000, ..Default::default() },
                MountFacts { total_bytes: 2_000_000_000, free_bytes: 100_000_000, ..Default::default() },
            ],
            ..Default::default()
        };
        assert_eq!(facts.total_disk_gb(), 3.0);
        assert_eq!(facts.available_disk_gb(), 0.6);
    }
}
