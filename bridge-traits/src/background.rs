//! Background Work Constraints
//!
//! Describes the conditions a unit of background work needs before it may run.

use crate::network::{NetworkInfo, NetworkStatus, NetworkType};

/// Task execution constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskConstraints {
    /// Require any network connection
    pub requires_network: bool,
    /// Require an unmetered WiFi/Ethernet connection
    pub requires_unmetered: bool,
}

impl Default for TaskConstraints {
    fn default() -> Self {
        Self {
            requires_network: true,
            requires_unmetered: false,
        }
    }
}

impl TaskConstraints {
    /// Constraints for purely local work
    pub fn none() -> Self {
        Self {
            requires_network: false,
            requires_unmetered: false,
        }
    }

    /// Check the constraints against the current network state
    pub fn satisfied_by(&self, info: &NetworkInfo) -> bool {
        if !self.requires_network && !self.requires_unmetered {
            return true;
        }

        if info.status != NetworkStatus::Connected {
            return false;
        }

        if self.requires_unmetered {
            return !info.is_metered
                && matches!(
                    info.network_type,
                    Some(NetworkType::WiFi | NetworkType::Ethernet)
                );
        }

        true
    }
}
