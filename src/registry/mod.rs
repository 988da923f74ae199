//! # Backend Registry
//!
//! The registry is the directory of backend plugins and the engine that
//! fans one logical operation out across many backends concurrently.
//!
//! Registration happens once, at startup, through an explicit plugin list
//! (`backends::default_plugins`); there is no import-time side effect and
//! no global instance. `register` takes `&mut self`, so the borrow checker
//! itself rules out registration after concurrent use has begun.
//!
//! ## Fan-out
//!
//! Every `*_all` operation launches one thread per requested backend,
//! collects `(name, outcome)` pairs over an mpsc channel, and returns a
//! map keyed by backend name with one entry per attempted backend. A
//! backend's failure (or panic) never cancels or blocks the others; the
//! map makes no ordering guarantee, so callers wanting display order sort
//! the keys themselves.

mod retry;

use crate::error::{PkgmuxError, Result};
use crate::exec::{CommandRunner, ExecContext};
use crate::manager::{Category, ManagerStatus, Options, PackageInfo, PackageManager, validate_names};
use crate::utils::sanitize;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Factory producing one backend instance over a shared command runner.
pub type BackendFactory =
    Box<dyn Fn(Arc<dyn CommandRunner>) -> Box<dyn PackageManager> + Send + Sync>;

/// A registerable backend: factory plus the priority used to break ties
/// when several backends claim the same category.
pub struct Plugin {
    pub name: &'static str,
    pub category: Category,
    pub priority: u8,
    pub factory: BackendFactory,
}

struct Entry {
    category: Category,
    priority: u8,
    manager: Arc<dyn PackageManager>,
}

/// Which backends an operation should fan out to.
#[derive(Debug, Clone)]
pub enum Selection {
    /// Every registered backend that reports itself available.
    AllAvailable,
    /// Exactly the named backends; naming an unregistered or unavailable
    /// backend is an error up front rather than a doomed attempt.
    Names(Vec<String>),
    /// The single best backend for a category: highest priority among the
    /// available candidates, ties broken by name for determinism.
    Category(Category),
}

/// Aggregation shape of every concurrent operation: one entry per backend
/// that was attempted, keyed by backend name. An empty requested set yields
/// an empty map, which is not an error.
pub type FanOutResult<T> = HashMap<String, Result<T>>;

pub struct Registry {
    runner: Arc<dyn CommandRunner>,
    entries: BTreeMap<String, Entry>,
}

impl Registry {
    /// Create an empty registry over the given runner. Tests pass a
    /// `MockRunner`; the CLI passes `SystemRunner`.
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            entries: BTreeMap::new(),
        }
    }

    /// Register one plugin. Backend names are unique; a duplicate is an
    /// error, not a silent overwrite.
    pub fn register(&mut self, plugin: Plugin) -> Result<()> {
        if self.entries.contains_key(plugin.name) {
            return Err(PkgmuxError::DuplicateBackend {
                name: plugin.name.to_string(),
            });
        }
        let manager: Arc<dyn PackageManager> =
            Arc::from((plugin.factory)(Arc::clone(&self.runner)));
        self.entries.insert(
            plugin.name.to_string(),
            Entry {
                category: plugin.category,
                priority: plugin.priority,
                manager,
            },
        );
        Ok(())
    }

    pub fn backend_names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn PackageManager>> {
        self.entries
            .get(name)
            .map(|e| Arc::clone(&e.manager))
            .ok_or_else(|| PkgmuxError::BackendNotFound {
                name: name.to_string(),
            })
    }

    /// All registered backends that report themselves available, in name
    /// order. Availability is probed in parallel since each probe may hit
    /// the filesystem (binary lookup).
    pub fn available(&self) -> Vec<Arc<dyn PackageManager>> {
        let managers: Vec<&Arc<dyn PackageManager>> =
            self.entries.values().map(|e| &e.manager).collect();
        if managers.len() <= 1 {
            return managers
                .into_iter()
                .filter(|m| m.is_available())
                .map(Arc::clone)
                .collect();
        }
        managers
            .par_iter()
            .filter(|m| m.is_available())
            .map(|m| Arc::clone(m))
            .collect()
    }

    /// Highest-priority available backend whose declared category matches;
    /// ties broken by lexicographically smallest name.
    pub fn best_for_category(&self, category: Category) -> Result<Arc<dyn PackageManager>> {
        self.entries
            .iter()
            .filter(|(_, e)| e.category == category && e.manager.is_available())
            // BTreeMap iterates in name order, so on equal priority the
            // earlier (smaller) name is kept.
            .max_by(|(a_name, a), (b_name, b)| {
                a.priority
                    .cmp(&b.priority)
                    .then_with(|| b_name.cmp(a_name))
            })
            .map(|(_, e)| Arc::clone(&e.manager))
            .ok_or_else(|| PkgmuxError::NoBackendForCategory {
                category: category.to_string(),
            })
    }

    /// Resolve a selection into the concrete backend set for one fan-out.
    /// Backends that report themselves unavailable are never part of the
    /// resolved set, so operations are never attempted against them.
    pub fn resolve(&self, selection: &Selection) -> Result<Vec<Arc<dyn PackageManager>>> {
        match selection {
            Selection::AllAvailable => Ok(self.available()),
            Selection::Names(names) => {
                let mut managers = Vec::with_capacity(names.len());
                for name in names {
                    let manager = self.get(name)?;
                    if !manager.is_available() {
                        return Err(PkgmuxError::classified(
                            crate::classify::ErrorCategory::Unavailable,
                            format!("package manager '{name}' is not available on this host"),
                        ));
                    }
                    managers.push(manager);
                }
                Ok(managers)
            }
            Selection::Category(category) => Ok(vec![self.best_for_category(*category)?]),
        }
    }

    /// Run `op` against every backend in the set, one thread per backend,
    /// and aggregate outcomes keyed by backend name.
    ///
    /// Outcomes travel over a channel, never through a shared slice, so
    /// completion order cannot corrupt the result. A panicking backend is
    /// caught and recorded as its own failure; the remaining backends are
    /// untouched.
    fn fan_out<T, F>(
        &self,
        ctx: &ExecContext,
        backends: &[Arc<dyn PackageManager>],
        op: F,
    ) -> FanOutResult<T>
    where
        T: Send,
        F: Fn(&dyn PackageManager, &ExecContext) -> Result<T> + Send + Sync,
    {
        if backends.is_empty() {
            return HashMap::new();
        }

        let (tx, rx) = mpsc::channel();

        thread::scope(|scope| {
            for manager in backends {
                let tx = tx.clone();
                let ctx = ctx.clone();
                let op = &op;
                scope.spawn(move || {
                    let outcome = catch_unwind(AssertUnwindSafe(|| op(manager.as_ref(), &ctx)))
                        .unwrap_or_else(|_| {
                            Err(PkgmuxError::Other(format!(
                                "backend '{}' panicked",
                                manager.name()
                            )))
                        });
                    // Receiver outlives the scope; send cannot fail while
                    // we are still inside it.
                    let _ = tx.send((manager.name().to_string(), outcome));
                });
            }
            drop(tx);
            rx.iter().collect()
        })
    }

    /// Per-operation context: the caller's cancellation flag, tightened by
    /// the per-call timeout when the options carry one.
    fn op_context(ctx: &ExecContext, opts: &Options) -> ExecContext {
        match opts.timeout_secs {
            Some(secs) => ctx.with_deadline_within(Duration::from_secs(secs)),
            None => ctx.clone(),
        }
    }

    pub fn search_all(
        &self,
        ctx: &ExecContext,
        selection: &Selection,
        query: &str,
        opts: &Options,
    ) -> Result<FanOutResult<Vec<PackageInfo>>> {
        sanitize::validate_search_query(query)?;
        let backends = self.resolve(selection)?;
        let ctx = Self::op_context(ctx, opts);
        Ok(self.fan_out(&ctx, &backends, |mgr, ctx| mgr.search(ctx, query, opts)))
    }

    pub fn list_all(
        &self,
        ctx: &ExecContext,
        selection: &Selection,
        opts: &Options,
    ) -> Result<FanOutResult<Vec<PackageInfo>>> {
        let backends = self.resolve(selection)?;
        let ctx = Self::op_context(ctx, opts);
        Ok(self.fan_out(&ctx, &backends, |mgr, ctx| mgr.list_installed(ctx, opts)))
    }

    pub fn install_all(
        &self,
        ctx: &ExecContext,
        selection: &Selection,
        names: &[String],
        opts: &Options,
    ) -> Result<FanOutResult<Vec<PackageInfo>>> {
        validate_names(names)?;
        let backends = self.resolve(selection)?;
        let ctx = Self::op_context(ctx, opts);
        Ok(self.fan_out(&ctx, &backends, |mgr, ctx| {
            retry::with_retries(opts.retries, || mgr.install(ctx, names, opts))
        }))
    }

    pub fn remove_all(
        &self,
        ctx: &ExecContext,
        selection: &Selection,
        names: &[String],
        opts: &Options,
    ) -> Result<FanOutResult<Vec<PackageInfo>>> {
        validate_names(names)?;
        let backends = self.resolve(selection)?;
        let ctx = Self::op_context(ctx, opts);
        Ok(self.fan_out(&ctx, &backends, |mgr, ctx| mgr.remove(ctx, names, opts)))
    }

    pub fn info_all(
        &self,
        ctx: &ExecContext,
        selection: &Selection,
        name: &str,
        opts: &Options,
    ) -> Result<FanOutResult<PackageInfo>> {
        sanitize::validate_package_name(name)?;
        let backends = self.resolve(selection)?;
        let ctx = Self::op_context(ctx, opts);
        Ok(self.fan_out(&ctx, &backends, |mgr, ctx| mgr.get_info(ctx, name, opts)))
    }

    pub fn refresh_all(
        &self,
        ctx: &ExecContext,
        selection: &Selection,
        opts: &Options,
    ) -> Result<FanOutResult<()>> {
        let backends = self.resolve(selection)?;
        let ctx = Self::op_context(ctx, opts);
        Ok(self.fan_out(&ctx, &backends, |mgr, ctx| {
            retry::with_retries(opts.retries, || mgr.refresh(ctx, opts))
        }))
    }

    pub fn upgrade_all(
        &self,
        ctx: &ExecContext,
        selection: &Selection,
        names: &[String],
        opts: &Options,
    ) -> Result<FanOutResult<Vec<PackageInfo>>> {
        validate_names(names)?;
        let backends = self.resolve(selection)?;
        let ctx = Self::op_context(ctx, opts);
        Ok(self.fan_out(&ctx, &backends, |mgr, ctx| {
            retry::with_retries(opts.retries, || mgr.upgrade(ctx, names, opts))
        }))
    }

    pub fn clean_all(
        &self,
        ctx: &ExecContext,
        selection: &Selection,
        opts: &Options,
    ) -> Result<FanOutResult<()>> {
        let backends = self.resolve(selection)?;
        let ctx = Self::op_context(ctx, opts);
        Ok(self.fan_out(&ctx, &backends, |mgr, ctx| mgr.clean(ctx, opts)))
    }

    pub fn autoremove_all(
        &self,
        ctx: &ExecContext,
        selection: &Selection,
        opts: &Options,
    ) -> Result<FanOutResult<Vec<PackageInfo>>> {
        let backends = self.resolve(selection)?;
        let ctx = Self::op_context(ctx, opts);
        Ok(self.fan_out(&ctx, &backends, |mgr, ctx| mgr.autoremove(ctx, opts)))
    }

    pub fn verify_all(
        &self,
        ctx: &ExecContext,
        selection: &Selection,
        names: &[String],
        opts: &Options,
    ) -> Result<FanOutResult<Vec<PackageInfo>>> {
        validate_names(names)?;
        let backends = self.resolve(selection)?;
        let ctx = Self::op_context(ctx, opts);
        Ok(self.fan_out(&ctx, &backends, |mgr, ctx| mgr.verify(ctx, names, opts)))
    }

    pub fn status_all(
        &self,
        ctx: &ExecContext,
        selection: &Selection,
        opts: &Options,
    ) -> Result<FanOutResult<ManagerStatus>> {
        let backends = self.resolve(selection)?;
        let ctx = Self::op_context(ctx, opts);
        Ok(self.fan_out(&ctx, &backends, |mgr, ctx| mgr.status(ctx, opts)))
    }
}

#[cfg(test)]
mod tests;
