pub mod clock;
pub mod config;
pub mod engine;
pub mod gateway;
pub mod notify;
pub mod orchestrator;
pub mod state;
pub mod util;

use serde::{Deserialize, Serialize};

/// Observed lifecycle state of a cloud instance.
///
/// `Transitioning` covers every intermediate provider state (starting,
/// stopping, rebooting, ...) that must not be interfered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceStatus {
    Running,
    Stopped,
    Transitioning,
    Unknown,
}

impl InstanceStatus {
    /// Maps the provider's status string onto the variants the engine
    /// acts on. Unrecognized strings become `Unknown`, which is treated
    /// like an in-flight transition.
    pub fn from_api(status: &str) -> InstanceStatus {
        match status {
            "Running" => InstanceStatus::Running,
            "Stopped" => InstanceStatus::Stopped,
            "Starting" | "Stopping" | "Pending" => InstanceStatus::Transitioning,
            _ => InstanceStatus::Unknown,
        }
    }
}

/// Total outbound traffic measured for an account, valid for one
/// decision cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficReading {
    pub total_bytes: u64,
}

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

impl TrafficReading {
    pub fn from_bytes(total_bytes: u64) -> TrafficReading {
        Self { total_bytes }
    }

    /// Traffic in the unit quotas are expressed in (GiB).
    pub fn gibibytes(&self) -> f64 {
        self.total_bytes as f64 / BYTES_PER_GIB
    }
}

/// Event keys under which per-target notification timestamps are stored.
pub mod events {
    /// Instance was started and confirmed running again.
    pub const RESUMED: &str = "resumed";
    /// A start attempt timed out before the instance reached `Running`.
    pub const START_FAILED: &str = "start_failed";
    /// Repeated start failures; the region is assumed out of capacity.
    pub const NO_RESOURCE: &str = "no_resource";
    /// Traffic reached the quota; instance stopped or kept stopped.
    pub const OVERLIMIT: &str = "overlimit";
}
