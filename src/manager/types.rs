use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Lifecycle state of a package as one backend sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageStatus {
    Installed,
    Available,
    Upgradable,
    /// Reported by remove/autoremove results.
    Removed,
    /// Dry-run "would do" marker; nothing was executed.
    Planned,
    Unknown,
}

impl fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Installed => write!(f, "installed"),
            Self::Available => write!(f, "available"),
            Self::Upgradable => write!(f, "upgradable"),
            Self::Removed => write!(f, "removed"),
            Self::Planned => write!(f, "planned"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// One package as known to exactly one backend at one point in time.
///
/// Constructed fresh by a parser from one command invocation's output and
/// never mutated afterwards. `version` is the installed version (empty when
/// not installed); `new_version` is the upgrade target (empty otherwise).
/// A well-formed record never has both empty, and `Upgradable` implies both
/// are present and differ.
#[derive(Debug, Clone, Serialize)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
    pub new_version: String,
    pub status: PackageStatus,
    pub description: String,
    /// Backend-local grouping, e.g. a distro suite or flatpak remote.
    pub category: String,
    /// Which backend produced this record.
    pub manager: String,
    /// Backend-specific attributes (architecture, branch, ...).
    pub metadata: HashMap<String, serde_json::Value>,
}

impl PackageInfo {
    /// Minimal record; callers fill the rest with struct update syntax.
    pub fn new(manager: &str, name: &str, status: PackageStatus) -> Self {
        Self {
            name: name.to_string(),
            version: String::new(),
            new_version: String::new(),
            status,
            description: String::new(),
            category: String::new(),
            manager: manager.to_string(),
            metadata: HashMap::new(),
        }
    }
}

/// Health snapshot of one backend, built on demand by a `status` call.
/// The core never caches these.
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStatus {
    pub name: String,
    pub available: bool,
    pub healthy: bool,
    pub tool_version: String,
    pub last_refresh: Option<DateTime<Utc>>,
    pub cache_size_bytes: Option<u64>,
    pub total_packages: Option<usize>,
    pub installed_packages: Option<usize>,
    pub issues: Vec<String>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ManagerStatus {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            available: false,
            healthy: false,
            tool_version: String::new(),
            last_refresh: None,
            cache_size_bytes: None,
            total_packages: None,
            installed_packages: None,
            issues: Vec::new(),
            metadata: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_status_serializes_lowercase() {
        let json = serde_json::to_string(&PackageStatus::Upgradable).unwrap();
        assert_eq!(json, "\"upgradable\"");
    }

    #[test]
    fn new_package_info_carries_manager_name() {
        let info = PackageInfo::new("apt", "curl", PackageStatus::Installed);
        assert_eq!(info.manager, "apt");
        assert_eq!(info.name, "curl");
        assert!(info.metadata.is_empty());
    }
}
