//! The package manager capability contract
//!
//! The contract is intentionally large; no backend implements all of it.
//! Every operation has a default body returning the `Unsupported` sentinel,
//! so a concrete adapter overrides only what its native tool actually
//! supports and heterogeneous backends (a full distro package manager next
//! to a narrow sandbox manager) still present the same trait object.

mod options;
mod types;

pub use options::Options;
pub use types::{ManagerStatus, PackageInfo, PackageStatus};

use crate::error::{PkgmuxError, Result};
use crate::exec::ExecContext;
use crate::utils::sanitize;
use std::fmt;

/// Coarse grouping used by the registry's "best backend for category"
/// resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Distro-level package manager (apt, dnf, pacman, ...).
    System,
    /// Per-language/per-runtime manager (npm, pip, cargo, ...).
    Language,
    /// Sandboxed application manager (flatpak, snap, ...).
    Sandbox,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::Language => write!(f, "language"),
            Self::Sandbox => write!(f, "sandbox"),
        }
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "system" => Ok(Self::System),
            "language" => Ok(Self::Language),
            "sandbox" => Ok(Self::Sandbox),
            other => Err(format!("unknown backend category: {other}")),
        }
    }
}

fn unsupported<T>(backend: &str, operation: &'static str) -> Result<T> {
    Err(PkgmuxError::Unsupported {
        backend: backend.to_string(),
        operation,
    })
}

/// The uniform operation surface every backend adapter exposes.
///
/// Adapters must be stateless or internally synchronized: one instance is
/// shared across concurrent fan-out threads.
pub trait PackageManager: Send + Sync {
    fn name(&self) -> &str;

    fn category(&self) -> Category;

    /// Whether the native tool is present and usable on this host.
    /// Unavailable backends are never included in fan-out sets.
    fn is_available(&self) -> bool;

    /// Version of the native tool itself (not of any package).
    fn tool_version(&self, _ctx: &ExecContext) -> Result<String> {
        unsupported(self.name(), "tool_version")
    }

    fn search(&self, _ctx: &ExecContext, _query: &str, _opts: &Options) -> Result<Vec<PackageInfo>> {
        unsupported(self.name(), "search")
    }

    fn list_installed(&self, _ctx: &ExecContext, _opts: &Options) -> Result<Vec<PackageInfo>> {
        unsupported(self.name(), "list_installed")
    }

    fn install(
        &self,
        _ctx: &ExecContext,
        _names: &[String],
        _opts: &Options,
    ) -> Result<Vec<PackageInfo>> {
        unsupported(self.name(), "install")
    }

    fn remove(
        &self,
        _ctx: &ExecContext,
        _names: &[String],
        _opts: &Options,
    ) -> Result<Vec<PackageInfo>> {
        unsupported(self.name(), "remove")
    }

    fn get_info(&self, _ctx: &ExecContext, _name: &str, _opts: &Options) -> Result<PackageInfo> {
        unsupported(self.name(), "get_info")
    }

    /// Refresh the backend's package index (apt-get update, dnf makecache).
    fn refresh(&self, _ctx: &ExecContext, _opts: &Options) -> Result<()> {
        unsupported(self.name(), "refresh")
    }

    /// Upgrade the named packages, or everything when `names` is empty.
    fn upgrade(
        &self,
        _ctx: &ExecContext,
        _names: &[String],
        _opts: &Options,
    ) -> Result<Vec<PackageInfo>> {
        unsupported(self.name(), "upgrade")
    }

    fn clean(&self, _ctx: &ExecContext, _opts: &Options) -> Result<()> {
        unsupported(self.name(), "clean")
    }

    fn autoremove(&self, _ctx: &ExecContext, _opts: &Options) -> Result<Vec<PackageInfo>> {
        unsupported(self.name(), "autoremove")
    }

    /// Check that the named packages are correctly installed.
    fn verify(
        &self,
        _ctx: &ExecContext,
        _names: &[String],
        _opts: &Options,
    ) -> Result<Vec<PackageInfo>> {
        unsupported(self.name(), "verify")
    }

    fn status(&self, _ctx: &ExecContext, _opts: &Options) -> Result<ManagerStatus> {
        unsupported(self.name(), "status")
    }
}

/// Validate package names at the contract boundary.
///
/// Security boundary, not cosmetics: every operation that accepts package
/// names calls this before the names go anywhere near a command line.
pub fn validate_names(names: &[String]) -> Result<()> {
    for name in names {
        sanitize::validate_package_name(name)?;
    }
    Ok(())
}

/// Synthesize the dry-run result set for a mutating operation: one
/// `Planned` record per input name, no subprocess executed.
pub fn dry_run_preview(manager: &str, names: &[String]) -> Vec<PackageInfo> {
    names
        .iter()
        .map(|name| PackageInfo::new(manager, name, PackageStatus::Planned))
        .collect()
}
