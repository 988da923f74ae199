use super::*;
use crate::classify::ErrorCategory;
use crate::exec::MockRunner;
use crate::manager::PackageStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Scripted in-process backend for registry tests.
struct FakeManager {
    name: &'static str,
    category: Category,
    available: bool,
    behavior: Behavior,
}

enum Behavior {
    /// Return this many packages from search/list.
    Packages(usize),
    /// Fail every operation with the unavailable sentinel.
    Unavailable,
    /// Panic inside the operation.
    Panics,
    /// Spin until the context is cancelled, then honor the cancellation.
    BlocksUntilCancelled,
}

impl FakeManager {
    fn plugin(
        name: &'static str,
        category: Category,
        priority: u8,
        available: bool,
        behavior: Behavior,
    ) -> Plugin {
        Plugin {
            name,
            category,
            priority,
            factory: Box::new(move |_runner| {
                Box::new(FakeManager {
                    name,
                    category,
                    available,
                    behavior: match behavior {
                        Behavior::Packages(n) => Behavior::Packages(n),
                        Behavior::Unavailable => Behavior::Unavailable,
                        Behavior::Panics => Behavior::Panics,
                        Behavior::BlocksUntilCancelled => Behavior::BlocksUntilCancelled,
                    },
                })
            }),
        }
    }

    fn run(&self, ctx: &ExecContext, count_hint: usize) -> Result<Vec<PackageInfo>> {
        match &self.behavior {
            Behavior::Packages(n) => Ok((0..*n)
                .map(|i| PackageInfo::new(self.name, &format!("pkg{i}"), PackageStatus::Available))
                .collect()),
            Behavior::Unavailable => Err(PkgmuxError::classified(
                ErrorCategory::Unavailable,
                format!("{} backend unavailable", self.name),
            )),
            Behavior::Panics => panic!("backend exploded"),
            Behavior::BlocksUntilCancelled => {
                let started = Instant::now();
                while !ctx.is_cancelled() {
                    // Bail out rather than hang the test suite forever if
                    // cancellation never arrives.
                    if started.elapsed() > Duration::from_secs(10) {
                        return Err(PkgmuxError::Other("cancellation never arrived".into()));
                    }
                    thread::sleep(Duration::from_millis(10));
                }
                let _ = count_hint;
                Err(PkgmuxError::Interrupted)
            }
        }
    }
}

impl PackageManager for FakeManager {
    fn name(&self) -> &str {
        self.name
    }
    fn category(&self) -> Category {
        self.category
    }
    fn is_available(&self) -> bool {
        self.available
    }
    fn search(&self, ctx: &ExecContext, _query: &str, _opts: &Options) -> Result<Vec<PackageInfo>> {
        self.run(ctx, 0)
    }
    fn list_installed(&self, ctx: &ExecContext, _opts: &Options) -> Result<Vec<PackageInfo>> {
        self.run(ctx, 0)
    }
    fn install(
        &self,
        ctx: &ExecContext,
        names: &[String],
        _opts: &Options,
    ) -> Result<Vec<PackageInfo>> {
        self.run(ctx, names.len())
    }
}

fn registry_with(plugins: Vec<Plugin>) -> Registry {
    let runner = Arc::new(MockRunner::new());
    let mut registry = Registry::new(runner);
    for plugin in plugins {
        registry.register(plugin).expect("registration");
    }
    registry
}

#[test]
fn duplicate_names_are_rejected() {
    let runner = Arc::new(MockRunner::new());
    let mut registry = Registry::new(runner);
    registry
        .register(FakeManager::plugin(
            "alpha",
            Category::System,
            50,
            true,
            Behavior::Packages(1),
        ))
        .unwrap();
    let err = registry
        .register(FakeManager::plugin(
            "alpha",
            Category::Language,
            10,
            true,
            Behavior::Packages(1),
        ))
        .unwrap_err();
    assert!(matches!(err, PkgmuxError::DuplicateBackend { name } if name == "alpha"));
}

#[test]
fn result_keys_are_exactly_the_attempted_set() {
    let registry = registry_with(vec![
        FakeManager::plugin("a", Category::System, 50, true, Behavior::Packages(2)),
        FakeManager::plugin("b", Category::System, 50, true, Behavior::Unavailable),
        FakeManager::plugin("c", Category::Sandbox, 50, true, Behavior::Packages(1)),
    ]);

    let ctx = ExecContext::background();
    let results = registry
        .search_all(&ctx, &Selection::AllAvailable, "x", &Options::default())
        .unwrap();

    let mut keys: Vec<_> = results.keys().cloned().collect();
    keys.sort();
    assert_eq!(keys, vec!["a", "b", "c"]);
}

#[test]
fn one_failure_never_hides_other_results() {
    let registry = registry_with(vec![
        FakeManager::plugin("a", Category::System, 50, true, Behavior::Packages(2)),
        FakeManager::plugin("b", Category::System, 50, true, Behavior::Unavailable),
    ]);

    let ctx = ExecContext::background();
    let results = registry
        .search_all(&ctx, &Selection::AllAvailable, "x", &Options::default())
        .unwrap();

    assert_eq!(results["a"].as_ref().unwrap().len(), 2);
    let err = results["b"].as_ref().unwrap_err();
    assert_eq!(crate::classify::classify(err), ErrorCategory::Unavailable);
}

#[test]
fn a_panicking_backend_is_isolated() {
    let registry = registry_with(vec![
        FakeManager::plugin("good", Category::System, 50, true, Behavior::Packages(1)),
        FakeManager::plugin("bad", Category::System, 50, true, Behavior::Panics),
    ]);

    let ctx = ExecContext::background();
    let results = registry
        .list_all(&ctx, &Selection::AllAvailable, &Options::default())
        .unwrap();

    assert!(results["good"].is_ok());
    assert!(
        results["bad"]
            .as_ref()
            .unwrap_err()
            .to_string()
            .contains("panicked")
    );
}

#[test]
fn empty_selection_yields_empty_map_not_error() {
    let registry = registry_with(vec![]);
    let ctx = ExecContext::background();
    let results = registry
        .list_all(&ctx, &Selection::AllAvailable, &Options::default())
        .unwrap();
    assert!(results.is_empty());
}

#[test]
fn unavailable_backends_are_never_attempted() {
    let registry = registry_with(vec![
        FakeManager::plugin("here", Category::System, 50, true, Behavior::Packages(1)),
        FakeManager::plugin("gone", Category::System, 50, false, Behavior::Packages(1)),
    ]);

    let ctx = ExecContext::background();
    let results = registry
        .list_all(&ctx, &Selection::AllAvailable, &Options::default())
        .unwrap();

    assert!(results.contains_key("here"));
    assert!(!results.contains_key("gone"));
}

#[test]
fn naming_an_unavailable_backend_is_an_upfront_error() {
    let registry = registry_with(vec![FakeManager::plugin(
        "gone",
        Category::System,
        50,
        false,
        Behavior::Packages(1),
    )]);

    // `resolve` succeeds with trait objects that carry no Debug impl, so
    // pull the error out through `err()` instead of `unwrap_err()`.
    let err = registry
        .resolve(&Selection::Names(vec!["gone".to_string()]))
        .err()
        .unwrap();
    assert_eq!(crate::classify::classify(&err), ErrorCategory::Unavailable);

    let err = registry
        .resolve(&Selection::Names(vec!["never-registered".to_string()]))
        .err()
        .unwrap();
    assert!(matches!(err, PkgmuxError::BackendNotFound { .. }));
}

#[test]
fn best_for_category_prefers_priority_then_name() {
    let registry = registry_with(vec![
        FakeManager::plugin("zeta", Category::System, 80, true, Behavior::Packages(1)),
        FakeManager::plugin("alpha", Category::System, 60, true, Behavior::Packages(1)),
        FakeManager::plugin("box", Category::Sandbox, 90, true, Behavior::Packages(1)),
    ]);

    let best = registry.best_for_category(Category::System).unwrap();
    assert_eq!(best.name(), "zeta");

    // Tie on priority: lexicographically smaller name wins.
    let registry = registry_with(vec![
        FakeManager::plugin("beta", Category::System, 70, true, Behavior::Packages(1)),
        FakeManager::plugin("alpha", Category::System, 70, true, Behavior::Packages(1)),
    ]);
    let best = registry.best_for_category(Category::System).unwrap();
    assert_eq!(best.name(), "alpha");

    // Unavailable candidates never win, regardless of priority.
    let registry = registry_with(vec![
        FakeManager::plugin("strong", Category::System, 99, false, Behavior::Packages(1)),
        FakeManager::plugin("weak", Category::System, 10, true, Behavior::Packages(1)),
    ]);
    let best = registry.best_for_category(Category::System).unwrap();
    assert_eq!(best.name(), "weak");
}

#[test]
fn cancellation_reaches_in_flight_backends() {
    let registry = registry_with(vec![
        FakeManager::plugin("fast", Category::System, 50, true, Behavior::Packages(1)),
        FakeManager::plugin(
            "stuck",
            Category::System,
            50,
            true,
            Behavior::BlocksUntilCancelled,
        ),
    ]);

    let ctx = ExecContext::background();
    let flag = ctx.cancel_flag();
    let cancelled = Arc::new(AtomicBool::new(false));
    let cancelled_clone = Arc::clone(&cancelled);

    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        flag.store(true, Ordering::SeqCst);
        cancelled_clone.store(true, Ordering::SeqCst);
    });

    let start = Instant::now();
    let results = registry
        .list_all(&ctx, &Selection::AllAvailable, &Options::default())
        .unwrap();
    canceller.join().unwrap();

    assert!(cancelled.load(Ordering::SeqCst));
    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(results["fast"].is_ok());
    assert!(matches!(
        results["stuck"].as_ref().unwrap_err(),
        PkgmuxError::Interrupted
    ));
}

#[test]
fn mixed_outcome_scenario_end_to_end() {
    // Backend "a" always succeeds with 2 packages, "b" always reports the
    // unavailable sentinel. The caller sees both outcomes side by side and
    // can report 1/2 succeeded with an overall Success exit.
    let registry = registry_with(vec![
        FakeManager::plugin("a", Category::System, 50, true, Behavior::Packages(2)),
        FakeManager::plugin("b", Category::Sandbox, 50, true, Behavior::Unavailable),
    ]);

    let ctx = ExecContext::background();
    let results = registry
        .search_all(&ctx, &Selection::AllAvailable, "x", &Options::default())
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results["a"].as_ref().unwrap().len(), 2);
    assert!(results["b"].is_err());

    let succeeded = results.values().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 1);
    // At least one backend succeeded: the run as a whole is a success.
    assert!(succeeded > 0);
}

#[test]
fn fan_out_rejects_unsafe_names_before_spawning() {
    let registry = registry_with(vec![FakeManager::plugin(
        "a",
        Category::System,
        50,
        true,
        Behavior::Packages(1),
    )]);

    let ctx = ExecContext::background();
    for op in ["install", "remove", "verify"] {
        let names = vec!["good".to_string(), "bad;rm -rf /".to_string()];
        let result = match op {
            "install" => registry.install_all(&ctx, &Selection::AllAvailable, &names, &Options::default()),
            "remove" => registry.remove_all(&ctx, &Selection::AllAvailable, &names, &Options::default()),
            _ => registry.verify_all(&ctx, &Selection::AllAvailable, &names, &Options::default()),
        };
        let err = result.unwrap_err();
        assert!(
            matches!(err, PkgmuxError::InvalidPackageName { .. }),
            "{op} accepted an unsafe name"
        );
    }

    let err = registry
        .info_all(&ctx, &Selection::AllAvailable, "../etc/passwd", &Options::default())
        .unwrap_err();
    assert!(matches!(err, PkgmuxError::InvalidPackageName { .. }));
}
