//! Health status mapping
//!
//! The appliance reports object state as free-form strings. Consumers of the
//! exported records depend on the literal integer codes below, including the gap
//! at 4, so the numbering must not change.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum HealthStatus {
    Healthy,
    Disabled,
    Unhealthy,
    Down,
    Unknown,
}

impl HealthStatus {
    /// Map a raw status string; anything unrecognised (or absent) is `Unknown`.
    pub fn from_status(status: Option<&str>) -> Self {
        match status {
            Some("HEALTHY") => HealthStatus::Healthy,
            Some("DISABLED") => HealthStatus::Disabled,
            Some("UNHEALTHY") => HealthStatus::Unhealthy,
            Some("DOWN") => HealthStatus::Down,
            _ => HealthStatus::Unknown,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Disabled => 1,
            HealthStatus::Unhealthy => 2,
            HealthStatus::Down => 3,
            HealthStatus::Unknown => 5,
        }
    }
}

impl From<&str> for HealthStatus {
    fn from(status: &str) -> Self {
        HealthStatus::from_status(Some(status))
    }
}
