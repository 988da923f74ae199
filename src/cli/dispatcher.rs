//! Command dispatcher
//!
//! Routes parsed CLI commands into registry operations and turns the
//! per-backend outcome maps into human or machine output plus one stable
//! exit code. A multi-backend run only fails as a whole when every
//! attempted backend failed; the exit category is then taken from the
//! first failing backend in name order.

use crate::classify::{self, ErrorCategory};
use crate::cli::args::{Cli, Command, GlobalFlags};
use crate::error::{PkgmuxError, Result};
use crate::exec::ExecContext;
use crate::manager::{ManagerStatus, Options, PackageInfo};
use crate::registry::{FanOutResult, Registry, Selection};
use crate::ui;
use crate::utils::machine_output;
use clap::CommandFactory;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io;

pub fn dispatch(args: &Cli, registry: &Registry, ctx: &ExecContext) -> i32 {
    match run(args, registry, ctx) {
        Ok(code) => code,
        Err(e) => {
            ui::error(&e.to_string());
            classify::classify(&e).exit_code()
        }
    }
}

fn run(args: &Cli, registry: &Registry, ctx: &ExecContext) -> Result<i32> {
    validate_machine_output_contract(args)?;
    let opts = build_options(&args.global)?;
    let selection = build_selection(&args.global)?;
    let format = machine_format(&args.global);

    match &args.command {
        Some(Command::Search { query }) => {
            let results = registry.search_all(ctx, &selection, query, &opts)?;
            finish("search", results, format, render_packages)
        }
        Some(Command::List) => {
            let results = registry.list_all(ctx, &selection, &opts)?;
            finish("list", results, format, render_packages)
        }
        Some(Command::Install { packages }) => {
            if !confirm("install", &opts, format.is_some()) {
                ui::info("Aborted.");
                return Ok(0);
            }
            let results = registry.install_all(ctx, &selection, packages, &opts)?;
            finish("install", results, format, render_packages)
        }
        Some(Command::Remove { packages }) => {
            if !confirm("remove", &opts, format.is_some()) {
                ui::info("Aborted.");
                return Ok(0);
            }
            let results = registry.remove_all(ctx, &selection, packages, &opts)?;
            finish("remove", results, format, render_packages)
        }
        Some(Command::Info { package }) => {
            let results = registry.info_all(ctx, &selection, package, &opts)?;
            finish("info", results, format, render_info)
        }
        Some(Command::Refresh) => {
            let results = registry.refresh_all(ctx, &selection, &opts)?;
            finish("refresh", results, format, render_unit)
        }
        Some(Command::Upgrade { packages }) => {
            if !confirm("upgrade", &opts, format.is_some()) {
                ui::info("Aborted.");
                return Ok(0);
            }
            let results = registry.upgrade_all(ctx, &selection, packages, &opts)?;
            finish("upgrade", results, format, render_packages)
        }
        Some(Command::Clean) => {
            let results = registry.clean_all(ctx, &selection, &opts)?;
            finish("clean", results, format, render_unit)
        }
        Some(Command::Autoremove) => {
            if !confirm("autoremove", &opts, format.is_some()) {
                ui::info("Aborted.");
                return Ok(0);
            }
            let results = registry.autoremove_all(ctx, &selection, &opts)?;
            finish("autoremove", results, format, render_packages)
        }
        Some(Command::Verify { packages }) => {
            let results = registry.verify_all(ctx, &selection, packages, &opts)?;
            finish("verify", results, format, render_packages)
        }
        Some(Command::Status) => {
            let results = registry.status_all(ctx, &selection, &opts)?;
            finish("status", results, format, render_status)
        }
        Some(Command::Completions { shell }) => {
            clap_complete::generate(*shell, &mut Cli::command(), "pkgmux", &mut io::stdout());
            Ok(0)
        }
        None => {
            ui::info("No command provided.");
            ui::info("Quick start:");
            ui::indent("pkgmux search curl", 2);
            ui::indent("pkgmux install curl", 2);
            ui::indent("pkgmux -b flatpak install org.mozilla.firefox", 2);
            ui::indent("pkgmux status", 2);
            ui::info("Use `pkgmux --help` for the full command list.");
            Ok(0)
        }
    }
}

/// Whether a mutating command must ask before fanning out. Non-interactive
/// runs auto-confirm, dry-run mutates nothing, and machine output never
/// prompts.
fn needs_confirmation(opts: &Options, machine: bool) -> bool {
    !machine && !opts.dry_run && !opts.effective_assume_yes()
}

fn confirm(action: &str, opts: &Options, machine: bool) -> bool {
    if !needs_confirmation(opts, machine) {
        return true;
    }
    ui::prompt_yes_no(&format!("Proceed with {action} across the selected backends?"))
}

fn build_options(global: &GlobalFlags) -> Result<Options> {
    let extra_args = match global.extra_args.as_deref() {
        Some(raw) => shlex::split(raw).ok_or_else(|| {
            PkgmuxError::classified(
                ErrorCategory::Usage,
                format!("cannot parse --extra-args value '{raw}'"),
            )
        })?,
        None => Vec::new(),
    };

    Ok(Options {
        dry_run: global.dry_run,
        interactive: global.interactive,
        verbose: global.verbose,
        debug: global.debug,
        quiet: global.quiet,
        assume_yes: global.yes,
        no_confirm: global.no_confirm,
        global_scope: global.global_scope,
        skip_broken: global.skip_broken,
        arch: global.arch.clone(),
        extra_args,
        timeout_secs: global.timeout,
        retries: global.retries,
        ..Options::default()
    })
}

fn build_selection(global: &GlobalFlags) -> Result<Selection> {
    if !global.backend.is_empty() {
        return Ok(Selection::Names(global.backend.clone()));
    }
    if let Some(raw) = &global.category {
        let category = raw
            .parse()
            .map_err(|e: String| PkgmuxError::classified(ErrorCategory::Usage, e))?;
        return Ok(Selection::Category(category));
    }
    Ok(Selection::AllAvailable)
}

fn machine_format(global: &GlobalFlags) -> Option<&str> {
    match global.format.as_deref() {
        Some("json") => Some("json"),
        Some("yaml") => Some("yaml"),
        _ => None,
    }
}

fn validate_machine_output_contract(args: &Cli) -> Result<()> {
    if let Some(version) = args.global.output_version.as_deref() {
        if version != "v1" {
            return Err(PkgmuxError::classified(
                ErrorCategory::Usage,
                format!("unsupported output contract version '{version}' (supported: v1)"),
            ));
        }
        match args.global.format.as_deref() {
            Some("json") | Some("yaml") => {}
            Some(other) => {
                return Err(PkgmuxError::classified(
                    ErrorCategory::Usage,
                    format!("--output-version v1 requires --format json|yaml (got '{other}')"),
                ));
            }
            None => {
                ui::warning(
                    "--output-version v1 is set without --format; output remains human-oriented.",
                );
            }
        }
    } else if let Some(other) = args.global.format.as_deref() {
        if other != "json" && other != "yaml" {
            return Err(PkgmuxError::classified(
                ErrorCategory::Usage,
                format!("unsupported --format '{other}' (supported: json, yaml)"),
            ));
        }
    }
    Ok(())
}

/// Exit code for one fan-out: success when any backend succeeded (or none
/// were attempted), otherwise the category of the first failing backend in
/// name order.
fn aggregate_exit_code<T>(sorted: &BTreeMap<String, Result<T>>) -> i32 {
    if sorted.is_empty() || sorted.values().any(|r| r.is_ok()) {
        return ErrorCategory::Success.exit_code();
    }
    sorted
        .values()
        .find_map(|r| r.as_ref().err())
        .map(|e| classify::classify(e).exit_code())
        .unwrap_or_else(|| ErrorCategory::General.exit_code())
}

#[derive(Serialize)]
struct BackendOutcome<'a, T: Serialize> {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<ErrorCategory>,
}

/// Render one fan-out result map and compute the run's exit code.
fn finish<T: Serialize>(
    command: &str,
    results: FanOutResult<T>,
    format: Option<&str>,
    render: fn(&T),
) -> Result<i32> {
    // Key order is unspecified by the registry; sort for stable output.
    let sorted: BTreeMap<String, Result<T>> = results.into_iter().collect();
    let exit = aggregate_exit_code(&sorted);
    let all_failed = exit != 0;

    if let Some(format) = format {
        let mut data = BTreeMap::new();
        let mut warnings = Vec::new();
        let mut errors = Vec::new();
        for (name, outcome) in &sorted {
            match outcome {
                Ok(value) => {
                    data.insert(
                        name.clone(),
                        BackendOutcome {
                            ok: true,
                            result: Some(value),
                            error: None,
                            category: None,
                        },
                    );
                }
                Err(e) => {
                    let line = format!("{name}: {e}");
                    if all_failed {
                        errors.push(line);
                    } else {
                        warnings.push(line);
                    }
                    data.insert(
                        name.clone(),
                        BackendOutcome {
                            ok: false,
                            result: None,
                            error: Some(e.to_string()),
                            category: Some(classify::classify(e)),
                        },
                    );
                }
            }
        }
        machine_output::emit_v1(command, data, warnings, errors, format)?;
        return Ok(exit);
    }

    if sorted.is_empty() {
        ui::info("No backends available for this operation.");
        return Ok(exit);
    }

    ui::debug(&format!("{command}: {} backend(s) attempted", sorted.len()));

    let total = sorted.len();
    let mut succeeded = 0usize;
    for (name, outcome) in &sorted {
        match outcome {
            Ok(value) => {
                succeeded += 1;
                ui::success(name);
                render(value);
            }
            Err(e) => ui::error(&format!("{name}: {e}")),
        }
    }
    if total > 1 {
        ui::separator();
        ui::info(&format!("{succeeded}/{total} backends succeeded"));
    }

    Ok(exit)
}

fn render_packages(packages: &Vec<PackageInfo>) {
    for pkg in packages {
        let version = match (pkg.version.is_empty(), pkg.new_version.is_empty()) {
            (false, false) => format!("{} -> {}", pkg.version, pkg.new_version),
            (false, true) => pkg.version.clone(),
            (true, false) => pkg.new_version.clone(),
            (true, true) => String::new(),
        };
        let mut line = pkg.name.clone();
        if !version.is_empty() {
            line.push_str(&format!(" {version}"));
        }
        line.push_str(&format!(" [{}]", pkg.status));
        if !pkg.description.is_empty() {
            line.push_str(&format!(" - {}", pkg.description));
        }
        ui::indent(&line, 1);
    }
}

fn render_info(pkg: &PackageInfo) {
    ui::keyval("name", &pkg.name);
    ui::keyval("status", &pkg.status.to_string());
    if !pkg.version.is_empty() {
        ui::keyval("installed", &pkg.version);
    }
    if !pkg.new_version.is_empty() {
        ui::keyval("candidate", &pkg.new_version);
    }
    if !pkg.category.is_empty() {
        ui::keyval("section", &pkg.category);
    }
    if !pkg.description.is_empty() {
        ui::keyval("description", &pkg.description);
    }
}

fn render_unit(_: &()) {}

fn render_status(status: &ManagerStatus) {
    ui::keyval(
        "state",
        if status.healthy {
            "healthy"
        } else if status.available {
            "degraded"
        } else {
            "unavailable"
        },
    );
    if !status.tool_version.is_empty() {
        ui::keyval("tool version", &status.tool_version);
    }
    if let Some(n) = status.installed_packages {
        ui::keyval("installed packages", &n.to_string());
    }
    if let Some(n) = status.total_packages {
        ui::keyval("total packages", &n.to_string());
    }
    for issue in &status.issues {
        ui::warning(issue);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn flags(argv: &[&str]) -> GlobalFlags {
        let mut full = vec!["pkgmux"];
        full.extend_from_slice(argv);
        full.push("list");
        Cli::parse_from(full).global
    }

    #[test]
    fn extra_args_are_shell_split() {
        let opts = build_options(&flags(&["--extra-args", "--foo 'bar baz'"])).unwrap();
        assert_eq!(opts.extra_args, vec!["--foo", "bar baz"]);
    }

    #[test]
    fn unparseable_extra_args_is_a_usage_error() {
        let err = build_options(&flags(&["--extra-args", "unclosed 'quote"])).unwrap_err();
        assert_eq!(classify::classify(&err), ErrorCategory::Usage);
    }

    #[test]
    fn skip_broken_flag_reaches_options() {
        let opts = build_options(&flags(&["--skip-broken"])).unwrap();
        assert!(opts.skip_broken);
    }

    #[test]
    fn backend_flags_build_a_names_selection() {
        let selection = build_selection(&flags(&["-b", "apt", "-b", "dnf"])).unwrap();
        assert!(matches!(selection, Selection::Names(names) if names == vec!["apt", "dnf"]));
    }

    #[test]
    fn unknown_category_is_a_usage_error() {
        let err = build_selection(&flags(&["-c", "quantum"])).unwrap_err();
        assert_eq!(classify::classify(&err), ErrorCategory::Usage);
    }

    #[test]
    fn confirmation_only_gates_interactive_mutations() {
        // The zero-value options auto-confirm, so no prompt.
        assert!(!needs_confirmation(&Options::default(), false));

        let interactive = Options {
            interactive: true,
            ..Options::default()
        };
        assert!(needs_confirmation(&interactive, false));
        // Machine output never blocks on stdin.
        assert!(!needs_confirmation(&interactive, true));

        let dry = Options {
            interactive: true,
            dry_run: true,
            ..Options::default()
        };
        assert!(!needs_confirmation(&dry, false));

        let authorized = Options {
            interactive: true,
            assume_yes: true,
            ..Options::default()
        };
        assert!(!needs_confirmation(&authorized, false));
    }

    #[test]
    fn exit_is_success_when_any_backend_succeeded() {
        let mut results: BTreeMap<String, Result<()>> = BTreeMap::new();
        results.insert("apt".into(), Ok(()));
        results.insert(
            "dnf".into(),
            Err(PkgmuxError::classified(
                ErrorCategory::Permission,
                "denied",
            )),
        );
        assert_eq!(aggregate_exit_code(&results), 0);
    }

    #[test]
    fn exit_takes_first_failing_backend_in_name_order() {
        let mut results: BTreeMap<String, Result<()>> = BTreeMap::new();
        results.insert(
            "zzz".into(),
            Err(PkgmuxError::classified(ErrorCategory::Permission, "denied")),
        );
        results.insert(
            "aaa".into(),
            Err(PkgmuxError::classified(
                ErrorCategory::Unavailable,
                "missing",
            )),
        );
        // "aaa" sorts first; its category (unavailable, 69) wins over
        // "zzz"'s permission (77).
        assert_eq!(aggregate_exit_code(&results), 69);
    }

    #[test]
    fn empty_result_map_is_success() {
        let results: BTreeMap<String, Result<()>> = BTreeMap::new();
        assert_eq!(aggregate_exit_code(&results), 0);
    }

    #[test]
    fn output_version_v2_is_rejected() {
        let cli = Cli::parse_from(["pkgmux", "--output-version", "v2", "--format", "json", "list"]);
        let err = validate_machine_output_contract(&cli).unwrap_err();
        assert_eq!(classify::classify(&err), ErrorCategory::Usage);
    }

    #[test]
    fn bogus_format_is_rejected() {
        let cli = Cli::parse_from(["pkgmux", "--format", "xml", "list"]);
        let err = validate_machine_output_contract(&cli).unwrap_err();
        assert_eq!(classify::classify(&err), ErrorCategory::Usage);
    }
}
