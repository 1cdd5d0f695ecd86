//! Resource limits for sandbox containers.
//!
//! Tasks may carry a difficulty label; harder tasks get more memory, CPU and
//! process headroom.

use serde::{Deserialize, Serialize};

/// CPU scheduling period in microseconds.
const CPU_PERIOD_US: i64 = 100_000;

/// Resource limits applied to one sandbox container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLimits {
    pub memory_mb: u64,
    /// Fractional cores, e.g. 0.5 or 2.0.
    pub cpu_cores: f64,
    pub max_processes: u64,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            memory_mb: 1024,
            cpu_cores: 1.0,
            max_processes: 100,
        }
    }
}

impl ExecutionLimits {
    pub fn new(memory_mb: u64, cpu_cores: f64, max_processes: u64) -> Self {
        Self {
            memory_mb,
            cpu_cores,
            max_processes,
        }
    }

    pub fn memory_bytes(&self) -> i64 {
        (self.memory_mb * 1024 * 1024) as i64
    }

    pub fn cpu_period(&self) -> i64 {
        CPU_PERIOD_US
    }

    /// quota = period * cores
    pub fn cpu_quota(&self) -> i64 {
        (CPU_PERIOD_US as f64 * self.cpu_cores) as i64
    }
}

/// Limits for a task difficulty label (case-insensitive).
///
/// Missing or unknown labels get the default (medium) limits.
pub fn limits_for_difficulty(difficulty: Option<&str>) -> ExecutionLimits {
    match difficulty.map(str::to_lowercase).as_deref() {
        Some("easy") => ExecutionLimits::new(512, 0.5, 50),
        Some("hard") => ExecutionLimits::new(2048, 2.0, 200),
        Some("expert") => ExecutionLimits::new(4096, 4.0, 400),
        _ => ExecutionLimits::default(),
    }
}
