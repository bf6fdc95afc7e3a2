use crate::config::ConcurrencyConfig;
use serde::{Deserialize, Serialize};

const FALLBACK_AVAILABLE_MEMORY_MB: u64 = 1024;
const MEMINFO_PATH: &str = "/proc/meminfo";

/// Capacity of the machine the runner sizes its worker pool against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostResources {
    pub processor_count: usize,
    pub available_memory_mb: u64,
}

impl HostResources {
    pub fn new(processor_count: usize, available_memory_mb: u64) -> Self {
        Self {
            processor_count: processor_count.max(1),
            available_memory_mb,
        }
    }

    pub fn available_memory_bytes(&self) -> f64 {
        self.available_memory_mb as f64 * 1024.0 * 1024.0
    }
}

/// Probe the host once. Overrides from configuration win over probed values.
pub fn collect_host_resources(config: &ConcurrencyConfig) -> HostResources {
    let processor_count = config.processor_count_override.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|value| value.get())
            .unwrap_or(1)
    });
    let available_memory_mb = config
        .available_memory_mb_override
        .or_else(read_available_memory_mb)
        .unwrap_or(FALLBACK_AVAILABLE_MEMORY_MB);

    HostResources::new(processor_count, available_memory_mb)
}

fn read_available_memory_mb() -> Option<u64> {
    let meminfo = std::fs::read_to_string(MEMINFO_PATH).ok()?;
    parse_available_memory_mb(&meminfo)
}

fn parse_available_memory_mb(meminfo: &str) -> Option<u64> {
    meminfo.lines().find_map(|line| {
        let value = line.strip_prefix("MemAvailable:")?;
        let kib: u64 = value.trim().trim_end_matches("kB").trim().parse().ok()?;
        Some(kib / 1024)
    })
}
