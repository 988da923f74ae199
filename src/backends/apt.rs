//! apt/dpkg backend adapter
//!
//! The reference adapter for Debian-family hosts. Captured calls run under
//! the locale-forced base environment so the line parsers below always see
//! English output. Auto-confirmation means `-y` plus
//! `DEBIAN_FRONTEND=noninteractive`; without it, mutating operations run
//! interactively so apt itself can prompt.
//!
//! apt-get reports nearly every failure as exit code 100, so the exit code
//! alone is useless for classification. The interpreter in this module looks
//! at stderr instead; contrast with the dnf adapter, where 100 can mean
//! success.

use crate::classify::ErrorCategory;
use crate::error::{PkgmuxError, Result};
use crate::exec::{CommandRunner, ExecContext};
use crate::manager::{
    Category, ManagerStatus, Options, PackageInfo, PackageManager, PackageStatus, dry_run_preview,
};
use regex::Regex;
use std::sync::Arc;
use std::sync::LazyLock;

/// `Setting up curl (8.5.0-2ubuntu10) ...` — apt's per-package success line
/// during install/upgrade. The name may carry an architecture qualifier.
static SETTING_UP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Setting up ([A-Za-z0-9@.:_+-]+) \(([^)]+)\)").expect("Invalid regex pattern")
});

/// `Removing curl (8.5.0-2ubuntu10) ...` — the removal counterpart.
static REMOVING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Removing ([A-Za-z0-9@.:_+-]+) \(([^)]+)\)").expect("Invalid regex pattern")
});

/// `curl/noble-updates 8.5.0-2ubuntu10 amd64 [upgradable from: 8.5.0-2]` —
/// one line of `apt list --upgradable`.
static UPGRADABLE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9@.:_+-]+)/(\S+)\s+(\S+)\s+\S+\s+\[upgradable from: ([^\]]+)\]")
        .expect("Invalid regex pattern")
});

/// First line of `apt-get --version`: `apt 2.7.14 (amd64)`.
static APT_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^apt (\S+)").expect("Invalid regex pattern"));

const NONINTERACTIVE_ENV: (&str, &str) = ("DEBIAN_FRONTEND", "noninteractive");

pub struct AptManager {
    runner: Arc<dyn CommandRunner>,
}

impl AptManager {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Map an apt-get failure onto the error taxonomy. Owned by this
    /// adapter: apt's exit codes mean different things than other tools'.
    fn interpret(&self, err: PkgmuxError) -> PkgmuxError {
        let PkgmuxError::CommandFailed {
            command,
            code,
            stdout,
            stderr,
        } = err
        else {
            return err;
        };

        let haystack = format!("{stderr}\n{stdout}").to_lowercase();

        if haystack.contains("unable to locate package")
            || haystack.contains("has no installation candidate")
        {
            return PkgmuxError::classified(
                ErrorCategory::Unavailable,
                first_error_line(&stderr, &command),
            );
        }
        if haystack.contains("permission denied")
            || haystack.contains("are you root")
            || haystack.contains("could not get lock")
        {
            return PkgmuxError::classified(
                ErrorCategory::Permission,
                first_error_line(&stderr, &command),
            );
        }
        if haystack.contains("invalid operation") {
            return PkgmuxError::classified(
                ErrorCategory::Usage,
                first_error_line(&stderr, &command),
            );
        }

        // Exit 100 covers everything else apt considers an error; keep the
        // captured output so the keyword fallback still has material.
        PkgmuxError::CommandFailed {
            command,
            code,
            stdout,
            stderr,
        }
    }

    /// argv tail + environment for a mutating apt-get call.
    fn confirm_flags(&self, opts: &Options) -> (Vec<String>, Vec<(String, String)>) {
        let mut args = Vec::new();
        let mut env = Vec::new();
        if opts.effective_assume_yes() {
            args.push("-y".to_string());
            env.push((
                NONINTERACTIVE_ENV.0.to_string(),
                NONINTERACTIVE_ENV.1.to_string(),
            ));
        }
        if let Some(arch) = &opts.arch {
            args.push("-o".to_string());
            args.push(format!("APT::Architecture={arch}"));
        }
        args.extend(opts.extra_args.iter().cloned());
        (args, env)
    }

    /// Run one mutating apt-get operation and parse per-package progress
    /// lines into result records. Interactive runs inherit stdio, so there
    /// is nothing to parse; the requested names are reported as-is.
    fn mutate(
        &self,
        ctx: &ExecContext,
        verb: &str,
        names: &[String],
        opts: &Options,
        progress: &Regex,
        done_status: PackageStatus,
    ) -> Result<Vec<PackageInfo>> {
        if opts.dry_run {
            return Ok(dry_run_preview(self.name(), names));
        }

        let (extra, env) = self.confirm_flags(opts);
        let mut args: Vec<&str> = vec![verb];
        args.extend(extra.iter().map(String::as_str));
        if !names.is_empty() {
            args.push("--");
            args.extend(names.iter().map(String::as_str));
        }

        if opts.interactive && !opts.effective_assume_yes() {
            // A non-zero exit already comes back as CommandFailed.
            self.runner
                .run_interactive(ctx, "apt-get", &args, &env)
                .map_err(|e| self.interpret(e))?;
            return Ok(names
                .iter()
                .map(|n| PackageInfo::new(self.name(), n, done_status))
                .collect());
        }

        let output = self
            .runner
            .run_with_context(ctx, "apt-get", &args, &env)
            .map_err(|e| self.interpret(e))?;

        let mut results = Vec::new();
        for line in output.stdout.lines() {
            if let Some(caps) = progress.captures(line) {
                let mut info = PackageInfo::new(self.name(), &caps[1], done_status);
                info.version = caps[2].to_string();
                results.push(info);
            }
        }

        // Already-satisfied requests produce no progress lines; report the
        // requested names rather than an empty set.
        if results.is_empty() && !names.is_empty() {
            results = names
                .iter()
                .map(|n| PackageInfo::new(self.name(), n, done_status))
                .collect();
        }

        Ok(results)
    }

    fn installed_count(&self, ctx: &ExecContext) -> Option<usize> {
        let output = self
            .runner
            .run_with_context(ctx, "dpkg-query", &["-W", "-f", "${Package}\n"], &[])
            .ok()?;
        Some(output.stdout.lines().filter(|l| !l.is_empty()).count())
    }
}

impl PackageManager for AptManager {
    fn name(&self) -> &str {
        "apt"
    }

    fn category(&self) -> Category {
        Category::System
    }

    fn is_available(&self) -> bool {
        which::which("apt-get").is_ok()
    }

    fn tool_version(&self, ctx: &ExecContext) -> Result<String> {
        let output = self
            .runner
            .run_with_context(ctx, "apt-get", &["--version"], &[])
            .map_err(|e| self.interpret(e))?;
        let first = output.stdout.lines().next().unwrap_or("");
        match APT_VERSION.captures(first) {
            Some(caps) => Ok(caps[1].to_string()),
            None => Ok(first.trim().to_string()),
        }
    }

    fn search(&self, ctx: &ExecContext, query: &str, _opts: &Options) -> Result<Vec<PackageInfo>> {
        let output = self
            .runner
            .run_with_context(ctx, "apt-cache", &["search", "--", query], &[])
            .map_err(|e| self.interpret(e))?;

        // `name - description` per line.
        let mut results = Vec::new();
        for line in output.stdout.lines() {
            if let Some((name, description)) = line.split_once(" - ") {
                let mut info = PackageInfo::new(self.name(), name.trim(), PackageStatus::Available);
                info.description = description.trim().to_string();
                results.push(info);
            }
        }
        Ok(results)
    }

    fn list_installed(&self, ctx: &ExecContext, _opts: &Options) -> Result<Vec<PackageInfo>> {
        let output = self
            .runner
            .run_with_context(
                ctx,
                "dpkg-query",
                &["-W", "-f", "${Package}\t${Version}\t${binary:Summary}\n"],
                &[],
            )
            .map_err(|e| self.interpret(e))?;

        let mut results = Vec::new();
        for line in output.stdout.lines() {
            let mut parts = line.split('\t');
            let Some(name) = parts.next().filter(|n| !n.is_empty()) else {
                continue;
            };
            let mut info = PackageInfo::new(self.name(), name, PackageStatus::Installed);
            info.version = parts.next().unwrap_or("").to_string();
            info.description = parts.next().unwrap_or("").to_string();
            results.push(info);
        }
        Ok(results)
    }

    fn install(
        &self,
        ctx: &ExecContext,
        names: &[String],
        opts: &Options,
    ) -> Result<Vec<PackageInfo>> {
        self.mutate(ctx, "install", names, opts, &SETTING_UP, PackageStatus::Installed)
    }

    fn remove(
        &self,
        ctx: &ExecContext,
        names: &[String],
        opts: &Options,
    ) -> Result<Vec<PackageInfo>> {
        self.mutate(ctx, "remove", names, opts, &REMOVING, PackageStatus::Removed)
    }

    fn get_info(&self, ctx: &ExecContext, name: &str, _opts: &Options) -> Result<PackageInfo> {
        let output = self
            .runner
            .run_with_context(ctx, "apt-cache", &["show", "--", name], &[])
            .map_err(|e| self.interpret(e))?;

        let mut info = PackageInfo::new(self.name(), name, PackageStatus::Available);
        for line in output.stdout.lines() {
            if let Some(version) = line.strip_prefix("Version: ") {
                if info.new_version.is_empty() {
                    info.new_version = version.trim().to_string();
                }
            } else if let Some(desc) = line.strip_prefix("Description-en: ") {
                info.description = desc.trim().to_string();
            } else if let Some(desc) = line.strip_prefix("Description: ") {
                if info.description.is_empty() {
                    info.description = desc.trim().to_string();
                }
            } else if let Some(section) = line.strip_prefix("Section: ") {
                info.category = section.trim().to_string();
            }
        }
        if info.new_version.is_empty() && info.description.is_empty() {
            return Err(PkgmuxError::classified(
                ErrorCategory::Unavailable,
                format!("package '{name}' not found in the apt cache"),
            ));
        }

        // Installed state comes from dpkg, not the cache.
        if let Ok(status_out) = self.runner.run_with_context(
            ctx,
            "dpkg-query",
            &["-W", "-f", "${Version}\t${Status}", "--", name],
            &[],
        ) {
            let mut parts = status_out.stdout.split('\t');
            let installed_version = parts.next().unwrap_or("").to_string();
            if parts.next().is_some_and(|s| s.contains("install ok installed")) {
                info.version = installed_version;
                info.status = if !info.new_version.is_empty() && info.new_version != info.version {
                    PackageStatus::Upgradable
                } else {
                    PackageStatus::Installed
                };
            }
        }

        Ok(info)
    }

    fn refresh(&self, ctx: &ExecContext, opts: &Options) -> Result<()> {
        if opts.dry_run {
            return Ok(());
        }
        // Index refresh never prompts, so no confirmation flags here.
        let mut args: Vec<&str> = vec!["update"];
        args.extend(opts.extra_args.iter().map(String::as_str));
        self.runner
            .run_with_context(ctx, "apt-get", &args, &[])
            .map(|_| ())
            .map_err(|e| self.interpret(e))
    }

    fn upgrade(
        &self,
        ctx: &ExecContext,
        names: &[String],
        opts: &Options,
    ) -> Result<Vec<PackageInfo>> {
        if names.is_empty() {
            return self.mutate(ctx, "upgrade", &[], opts, &SETTING_UP, PackageStatus::Installed);
        }
        // Targeted upgrade: install with the only-upgrade guard so names
        // that are not installed yet are left alone.
        if opts.dry_run {
            return Ok(dry_run_preview(self.name(), names));
        }
        let (extra, env) = self.confirm_flags(opts);
        let mut args: Vec<&str> = vec!["install", "--only-upgrade"];
        args.extend(extra.iter().map(String::as_str));
        args.push("--");
        args.extend(names.iter().map(String::as_str));

        let output = self
            .runner
            .run_with_context(ctx, "apt-get", &args, &env)
            .map_err(|e| self.interpret(e))?;

        let mut results = Vec::new();
        for line in output.stdout.lines() {
            if let Some(caps) = SETTING_UP.captures(line) {
                let mut info = PackageInfo::new(self.name(), &caps[1], PackageStatus::Installed);
                info.version = caps[2].to_string();
                results.push(info);
            }
        }
        Ok(results)
    }

    fn clean(&self, ctx: &ExecContext, opts: &Options) -> Result<()> {
        if opts.dry_run {
            return Ok(());
        }
        self.runner
            .run_with_context(ctx, "apt-get", &["clean"], &[])
            .map(|_| ())
            .map_err(|e| self.interpret(e))
    }

    fn autoremove(&self, ctx: &ExecContext, opts: &Options) -> Result<Vec<PackageInfo>> {
        self.mutate(ctx, "autoremove", &[], opts, &REMOVING, PackageStatus::Removed)
    }

    fn verify(
        &self,
        ctx: &ExecContext,
        names: &[String],
        _opts: &Options,
    ) -> Result<Vec<PackageInfo>> {
        let mut results = Vec::new();
        for name in names {
            let outcome = self.runner.run_with_context(
                ctx,
                "dpkg-query",
                &["-W", "-f", "${Version}\t${Status}", "--", name],
                &[],
            );
            let info = match outcome {
                Ok(output) => {
                    let mut parts = output.stdout.split('\t');
                    let version = parts.next().unwrap_or("").to_string();
                    let ok = parts.next().is_some_and(|s| s.contains("install ok installed"));
                    let mut info = PackageInfo::new(
                        self.name(),
                        name,
                        if ok {
                            PackageStatus::Installed
                        } else {
                            PackageStatus::Unknown
                        },
                    );
                    if ok {
                        info.version = version;
                    }
                    info
                }
                Err(PkgmuxError::Interrupted) => return Err(PkgmuxError::Interrupted),
                Err(_) => PackageInfo::new(self.name(), name, PackageStatus::Unknown),
            };
            results.push(info);
        }
        Ok(results)
    }

    fn status(&self, ctx: &ExecContext, _opts: &Options) -> Result<ManagerStatus> {
        let mut status = ManagerStatus::new(self.name());
        status.available = self.is_available();
        if !status.available {
            status.issues.push("apt-get binary not found".to_string());
            return Ok(status);
        }

        match self.tool_version(ctx) {
            Ok(version) => {
                status.tool_version = version;
                status.healthy = true;
            }
            Err(e) => status.issues.push(e.to_string()),
        }

        status.installed_packages = self.installed_count(ctx);

        if let Ok(output) = self
            .runner
            .run_with_context(ctx, "apt", &["list", "--upgradable"], &[])
        {
            let upgradable = parse_upgradable(self.name(), &output.stdout);
            status.metadata.insert(
                "upgradable".to_string(),
                serde_json::Value::from(upgradable.len()),
            );
        }

        // `apt-get check` validates the dependency cache without changes.
        if let Err(e) = self.runner.run_with_context(ctx, "apt-get", &["check"], &[]) {
            status.healthy = false;
            status.issues.push(self.interpret(e).to_string());
        }

        Ok(status)
    }
}

/// Upgradable set per `apt list --upgradable`, feeding the status
/// summary; kept separate from the trait because the contract has no
/// dedicated operation for it.
pub fn parse_upgradable(manager: &str, stdout: &str) -> Vec<PackageInfo> {
    let mut results = Vec::new();
    for line in stdout.lines() {
        if let Some(caps) = UPGRADABLE_LINE.captures(line) {
            let mut info = PackageInfo::new(manager, &caps[1], PackageStatus::Upgradable);
            info.category = caps[2].to_string();
            info.new_version = caps[3].to_string();
            info.version = caps[4].to_string();
            results.push(info);
        }
    }
    results
}

fn first_error_line(stderr: &str, command: &str) -> String {
    stderr
        .lines()
        .find(|l| !l.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{command} failed"))
}
