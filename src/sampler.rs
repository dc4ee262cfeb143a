use serde::{Deserialize, Serialize};
use std::time::Duration;
use sysinfo::System;
use tracing::{debug, warn};

/// Point-in-time utilization snapshot. Every field degrades to `None` when
/// the platform does not expose it; sampling never fails the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    pub cpu: Option<f64>,
    pub ram: Option<f64>,
    pub gpu: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuInfo {
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub physical_cores: Option<usize>,
    pub logical_cores: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuInfo {
    pub model: String,
    pub vram_mb: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OsInfo {
    pub platform: Option<String>,
    pub release: Option<String>,
    pub arch: Option<String>,
}

/// Static descriptor of the host, captured once per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareInfo {
    pub cpu: CpuInfo,
    pub ram_total_bytes: u64,
    pub gpu: Option<GpuInfo>,
    pub os: OsInfo,
}

pub struct Sampler {
    system: System,
    /// Set to false after the first failed nvidia-smi probe so absent GPUs
    /// don't cost a process launch per sample.
    gpu_probe_enabled: bool,
}

impl Default for Sampler {
    fn default() -> Self {
        Sampler::new()
    }
}

impl Sampler {
    pub fn new() -> Self {
        Sampler {
            system: System::new_all(),
            gpu_probe_enabled: true,
        }
    }

    /// Snapshot current cpu/ram/gpu utilization as percentages in [0, 100].
    pub async fn sample(&mut self) -> ResourceSample {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();

        let cpu = Some(self.system.global_cpu_usage() as f64);

        let total = self.system.total_memory();
        let ram = if total > 0 {
            Some(self.system.used_memory() as f64 / total as f64 * 100.0)
        } else {
            warn!("total memory reported as 0, skipping ram sample");
            None
        };

        let gpu = if self.gpu_probe_enabled {
            match gpu_utilization().await {
                Some(pct) => Some(pct),
                None => {
                    self.gpu_probe_enabled = false;
                    None
                }
            }
        } else {
            None
        };

        ResourceSample { cpu, ram, gpu }
    }
}

/// First GPU controller's utilization via nvidia-smi. None when no GPU is
/// present or the tool is missing.
async fn gpu_utilization() -> Option<f64> {
    let output = tokio::time::timeout(
        Duration::from_millis(1_500),
        tokio::process::Command::new("nvidia-smi")
            .args(["--query-gpu=utilization.gpu", "--format=csv,noheader,nounits"])
            .output(),
    )
    .await;

    match output {
        Ok(Ok(output)) if output.status.success() => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            match stdout.lines().next().map(str::trim).map(str::parse::<f64>) {
                Some(Ok(pct)) => Some(pct),
                _ => {
                    warn!("could not parse nvidia-smi utilization output");
                    None
                }
            }
        }
        _ => {
            debug!("nvidia-smi unavailable, gpu samples disabled");
            None
        }
    }
}

async fn gpu_info() -> Option<GpuInfo> {
    let output = tokio::time::timeout(
        Duration::from_millis(1_500),
        tokio::process::Command::new("nvidia-smi")
            .args(["--query-gpu=name,memory.total", "--format=csv,noheader,nounits"])
            .output(),
    )
    .await;

    match output {
        Ok(Ok(output)) if output.status.success() => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let line = stdout.lines().next()?;
            let mut parts = line.splitn(2, ',');
            let model = parts.next()?.trim().to_string();
            let vram_mb = parts.next().and_then(|v| v.trim().parse::<u64>().ok());
            Some(GpuInfo { model, vram_mb })
        }
        _ => None,
    }
}

/// Best-effort descriptor of the host hardware. Missing information degrades
/// to None rather than failing the run.
pub async fn hardware_info() -> HardwareInfo {
    let system = System::new_all();

    let cpu = CpuInfo {
        vendor: system.cpus().first().map(|c| c.vendor_id().to_string()),
        model: system.cpus().first().map(|c| c.brand().trim().to_string()),
        physical_cores: system.physical_core_count(),
        logical_cores: num_cpus::get(),
    };

    let os = OsInfo {
        platform: System::name(),
        release: System::os_version(),
        arch: System::cpu_arch(),
    };

    HardwareInfo {
        cpu,
        ram_total_bytes: system.total_memory(),
        gpu: gpu_info().await,
        os,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sample_never_fails() {
        let mut sampler = Sampler::new();
        let sample = sampler.sample().await;

        if let Some(cpu) = sample.cpu {
            assert!((0.0..=100.0).contains(&cpu));
        }
        if let Some(ram) = sample.ram {
            assert!((0.0..=100.0).contains(&ram));
        }
    }

    #[tokio::test]
    async fn hardware_info_reports_cores() {
        let info = hardware_info().await;
        assert!(info.cpu.logical_cores > 0);
        assert!(info.ram_total_bytes > 0);
    }
}
