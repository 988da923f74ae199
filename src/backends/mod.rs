//! Built-in backend adapters
//!
//! Each adapter lives in its own module and is wired into the registry
//! through [`default_plugins`]. Registration is explicit and happens once at
//! startup; there is no discovery magic.

pub mod apt;
pub mod dnf;
pub mod flatpak;

use crate::error::Result;
use crate::exec::CommandRunner;
use crate::manager::Category;
use crate::registry::{Plugin, Registry};
use std::sync::Arc;

/// The built-in plugin set. Priorities only matter when two backends claim
/// the same category: apt outranks dnf for `system` because Debian-family
/// hosts are the primary target.
pub fn default_plugins() -> Vec<Plugin> {
    vec![
        Plugin {
            name: "apt",
            category: Category::System,
            priority: 80,
            factory: Box::new(|runner| Box::new(apt::AptManager::new(runner))),
        },
        Plugin {
            name: "dnf",
            category: Category::System,
            priority: 60,
            factory: Box::new(|runner| Box::new(dnf::DnfManager::new(runner))),
        },
        Plugin {
            name: "flatpak",
            category: Category::Sandbox,
            priority: 50,
            factory: Box::new(|runner| Box::new(flatpak::FlatpakManager::new(runner))),
        },
    ]
}

/// Registry preloaded with every built-in backend.
pub fn default_registry(runner: Arc<dyn CommandRunner>) -> Result<Registry> {
    let mut registry = Registry::new(runner);
    for plugin in default_plugins() {
        registry.register(plugin)?;
    }
    Ok(registry)
}
