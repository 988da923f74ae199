//! dnf backend adapter
//!
//! Narrower than the apt adapter: index refresh, upgrades, and cache
//! cleaning. Its main reason to exist is the exit-code convention clash:
//! `dnf check-update` exits 100 to say "updates are available", which the
//! apt interpreter would call an error. Exit-code meaning belongs to the
//! adapter, never to a global table.

use crate::classify::ErrorCategory;
use crate::error::{PkgmuxError, Result};
use crate::exec::{CommandRunner, ExecContext};
use crate::manager::{
    Category, ManagerStatus, Options, PackageInfo, PackageManager, PackageStatus, dry_run_preview,
};
use regex::Regex;
use std::sync::Arc;
use std::sync::LazyLock;

/// `curl.x86_64  8.6.0-1.fc40  updates` — one line of `dnf check-update`
/// or `dnf list --installed` output.
static PACKAGE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9@._+-]+)\.([A-Za-z0-9_]+)\s+(\S+)\s+(\S+)")
        .expect("Invalid regex pattern")
});

/// `check-update` exit code meaning "updates available".
const DNF_UPDATES_AVAILABLE: i32 = 100;

pub struct DnfManager {
    runner: Arc<dyn CommandRunner>,
}

impl DnfManager {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

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

        if haystack.contains("no match for argument")
            || haystack.contains("unable to find a match")
        {
            return PkgmuxError::classified(
                ErrorCategory::Unavailable,
                stderr.lines().next().unwrap_or(&command).to_string(),
            );
        }
        if haystack.contains("superuser privileges") || haystack.contains("permission denied") {
            return PkgmuxError::classified(
                ErrorCategory::Permission,
                stderr.lines().next().unwrap_or(&command).to_string(),
            );
        }

        PkgmuxError::CommandFailed {
            command,
            code,
            stdout,
            stderr,
        }
    }

    fn parse_package_lines(&self, stdout: &str, status: PackageStatus) -> Vec<PackageInfo> {
        let mut results = Vec::new();
        for line in stdout.lines() {
            // Section headers ("Installed Packages", obsolete notices) and
            // blank lines fail the regex and fall through.
            if let Some(caps) = PACKAGE_LINE.captures(line) {
                let mut info = PackageInfo::new(self.name(), &caps[1], status);
                match status {
                    PackageStatus::Upgradable => info.new_version = caps[3].to_string(),
                    _ => info.version = caps[3].to_string(),
                }
                info.category = caps[4].to_string();
                info.metadata.insert(
                    "arch".to_string(),
                    serde_json::Value::String(caps[2].to_string()),
                );
                results.push(info);
            }
        }
        results
    }

    /// `dnf check-update`: exit 0 means up to date, exit 100 means updates
    /// available, anything else is a real failure.
    fn check_update(&self, ctx: &ExecContext) -> Result<Vec<PackageInfo>> {
        match self
            .runner
            .run_with_context(ctx, "dnf", &["check-update", "--quiet"], &[])
        {
            Ok(_) => Ok(Vec::new()),
            Err(PkgmuxError::CommandFailed { code, stdout, .. })
                if code == Some(DNF_UPDATES_AVAILABLE) =>
            {
                Ok(self.parse_package_lines(&stdout, PackageStatus::Upgradable))
            }
            Err(e) => Err(self.interpret(e)),
        }
    }

    fn confirm_args(&self, opts: &Options) -> Vec<String> {
        let mut args = Vec::new();
        if opts.effective_assume_yes() {
            args.push("-y".to_string());
        }
        if opts.skip_broken {
            args.push("--skip-broken".to_string());
        }
        args.extend(opts.extra_args.iter().cloned());
        args
    }
}

impl PackageManager for DnfManager {
    fn name(&self) -> &str {
        "dnf"
    }

    fn category(&self) -> Category {
        Category::System
    }

    fn is_available(&self) -> bool {
        which::which("dnf").is_ok()
    }

    fn tool_version(&self, ctx: &ExecContext) -> Result<String> {
        let output = self
            .runner
            .run_with_context(ctx, "dnf", &["--version"], &[])
            .map_err(|e| self.interpret(e))?;
        Ok(output.stdout.lines().next().unwrap_or("").trim().to_string())
    }

    fn list_installed(&self, ctx: &ExecContext, _opts: &Options) -> Result<Vec<PackageInfo>> {
        let output = self
            .runner
            .run_with_context(ctx, "dnf", &["list", "--installed", "--quiet"], &[])
            .map_err(|e| self.interpret(e))?;
        Ok(self.parse_package_lines(&output.stdout, PackageStatus::Installed))
    }

    fn refresh(&self, ctx: &ExecContext, opts: &Options) -> Result<()> {
        if opts.dry_run {
            return Ok(());
        }
        self.runner
            .run_with_context(ctx, "dnf", &["makecache", "--quiet"], &[])
            .map(|_| ())
            .map_err(|e| self.interpret(e))
    }

    fn upgrade(
        &self,
        ctx: &ExecContext,
        names: &[String],
        opts: &Options,
    ) -> Result<Vec<PackageInfo>> {
        if opts.dry_run {
            return Ok(dry_run_preview(self.name(), names));
        }

        let extra = self.confirm_args(opts);
        let mut args: Vec<&str> = vec!["upgrade"];
        args.extend(extra.iter().map(String::as_str));
        if !names.is_empty() {
            args.push("--");
            args.extend(names.iter().map(String::as_str));
        }

        let output = self
            .runner
            .run_with_context(ctx, "dnf", &args, &[])
            .map_err(|e| self.interpret(e))?;

        let mut upgraded: Vec<PackageInfo> = output
            .stdout
            .lines()
            .skip_while(|l| !l.starts_with("Upgraded:") && !l.starts_with("Installed:"))
            .skip(1)
            .take_while(|l| l.starts_with(' '))
            .flat_map(|l| l.split_whitespace())
            .map(|spec| {
                // `curl-8.6.0-1.fc40.x86_64` — keep only the name part.
                let name = spec
                    .rsplitn(3, '-')
                    .last()
                    .unwrap_or(spec);
                PackageInfo::new(self.name(), name, PackageStatus::Installed)
            })
            .collect();

        if upgraded.is_empty() && !names.is_empty() {
            upgraded = names
                .iter()
                .map(|n| PackageInfo::new(self.name(), n, PackageStatus::Installed))
                .collect();
        }
        Ok(upgraded)
    }

    fn clean(&self, ctx: &ExecContext, opts: &Options) -> Result<()> {
        if opts.dry_run {
            return Ok(());
        }
        self.runner
            .run_with_context(ctx, "dnf", &["clean", "all"], &[])
            .map(|_| ())
            .map_err(|e| self.interpret(e))
    }

    fn status(&self, ctx: &ExecContext, _opts: &Options) -> Result<ManagerStatus> {
        let mut status = ManagerStatus::new(self.name());
        status.available = self.is_available();
        if !status.available {
            status.issues.push("dnf binary not found".to_string());
            return Ok(status);
        }

        match self.tool_version(ctx) {
            Ok(version) => {
                status.tool_version = version;
                status.healthy = true;
            }
            Err(e) => status.issues.push(e.to_string()),
        }

        match self.check_update(ctx) {
            Ok(upgradable) => {
                status.metadata.insert(
                    "upgradable".to_string(),
                    serde_json::Value::from(upgradable.len()),
                );
            }
            Err(e) => {
                status.healthy = false;
                status.issues.push(e.to_string());
            }
        }

        Ok(status)
    }
}
