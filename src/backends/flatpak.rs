//! flatpak backend adapter
//!
//! Deliberately narrow: search, list, install, remove, status. Everything
//! else stays at the contract's Unsupported default, which is how a sandbox
//! manager coexists with full distro backends behind one trait object.
//! flatpak emits tab-separated columns, no regex needed.

use crate::classify::ErrorCategory;
use crate::error::{PkgmuxError, Result};
use crate::exec::{CommandRunner, ExecContext};
use crate::manager::{
    Category, ManagerStatus, Options, PackageInfo, PackageManager, PackageStatus, dry_run_preview,
};
use std::sync::Arc;

pub struct FlatpakManager {
    runner: Arc<dyn CommandRunner>,
}

impl FlatpakManager {
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

        let haystack = stderr.to_lowercase();
        if haystack.contains("no matches found") || haystack.contains("not installed") {
            return PkgmuxError::classified(
                ErrorCategory::Unavailable,
                stderr.lines().next().unwrap_or(&command).to_string(),
            );
        }
        if haystack.contains("permission denied") || haystack.contains("not allowed") {
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

    fn scope_flag(&self, opts: &Options) -> &'static str {
        if opts.global_scope { "--system" } else { "--user" }
    }
}

impl PackageManager for FlatpakManager {
    fn name(&self) -> &str {
        "flatpak"
    }

    fn category(&self) -> Category {
        Category::Sandbox
    }

    fn is_available(&self) -> bool {
        which::which("flatpak").is_ok()
    }

    fn tool_version(&self, ctx: &ExecContext) -> Result<String> {
        let output = self
            .runner
            .run_with_context(ctx, "flatpak", &["--version"], &[])
            .map_err(|e| self.interpret(e))?;
        // `Flatpak 1.15.6`
        Ok(output
            .stdout
            .split_whitespace()
            .next_back()
            .unwrap_or("")
            .to_string())
    }

    fn search(&self, ctx: &ExecContext, query: &str, _opts: &Options) -> Result<Vec<PackageInfo>> {
        let output = self
            .runner
            .run_with_context(
                ctx,
                "flatpak",
                &[
                    "search",
                    "--columns=application,version,description,remotes",
                    query,
                ],
                &[],
            )
            .map_err(|e| self.interpret(e))?;

        let mut results = Vec::new();
        for line in output.stdout.lines() {
            let parts: Vec<&str> = line.split('\t').collect();
            let Some(app_id) = parts.first().filter(|p| !p.is_empty()) else {
                continue;
            };
            let mut info = PackageInfo::new(self.name(), app_id, PackageStatus::Available);
            info.version = parts.get(1).copied().unwrap_or("").to_string();
            info.description = parts.get(2).copied().unwrap_or("").to_string();
            info.category = parts.get(3).copied().unwrap_or("").to_string();
            results.push(info);
        }
        Ok(results)
    }

    fn list_installed(&self, ctx: &ExecContext, _opts: &Options) -> Result<Vec<PackageInfo>> {
        let output = self
            .runner
            .run_with_context(
                ctx,
                "flatpak",
                &["list", "--app", "--columns=application,version,origin"],
                &[],
            )
            .map_err(|e| self.interpret(e))?;

        let mut results = Vec::new();
        for line in output.stdout.lines() {
            let parts: Vec<&str> = line.split('\t').collect();
            let Some(app_id) = parts.first().filter(|p| !p.is_empty()) else {
                continue;
            };
            let mut info = PackageInfo::new(self.name(), app_id, PackageStatus::Installed);
            info.version = parts.get(1).copied().unwrap_or("").to_string();
            info.category = parts.get(2).copied().unwrap_or("").to_string();
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
        if opts.dry_run {
            return Ok(dry_run_preview(self.name(), names));
        }

        let mut args: Vec<&str> = vec!["install", self.scope_flag(opts)];
        if opts.effective_assume_yes() {
            args.push("-y");
        }
        args.extend(opts.extra_args.iter().map(String::as_str));
        args.extend(names.iter().map(String::as_str));

        if opts.interactive && !opts.effective_assume_yes() {
            // A non-zero exit already comes back as CommandFailed.
            self.runner
                .run_interactive(ctx, "flatpak", &args, &[])
                .map_err(|e| self.interpret(e))?;
        } else {
            self.runner
                .run_with_context(ctx, "flatpak", &args, &[])
                .map_err(|e| self.interpret(e))?;
        }

        Ok(names
            .iter()
            .map(|n| PackageInfo::new(self.name(), n, PackageStatus::Installed))
            .collect())
    }

    fn remove(
        &self,
        ctx: &ExecContext,
        names: &[String],
        opts: &Options,
    ) -> Result<Vec<PackageInfo>> {
        if opts.dry_run {
            return Ok(dry_run_preview(self.name(), names));
        }

        let mut args: Vec<&str> = vec!["uninstall", self.scope_flag(opts)];
        if opts.effective_assume_yes() {
            args.push("-y");
        }
        args.extend(names.iter().map(String::as_str));

        self.runner
            .run_with_context(ctx, "flatpak", &args, &[])
            .map_err(|e| self.interpret(e))?;

        Ok(names
            .iter()
            .map(|n| PackageInfo::new(self.name(), n, PackageStatus::Removed))
            .collect())
    }

    fn status(&self, ctx: &ExecContext, opts: &Options) -> Result<ManagerStatus> {
        let mut status = ManagerStatus::new(self.name());
        status.available = self.is_available();
        if !status.available {
            status.issues.push("flatpak binary not found".to_string());
            return Ok(status);
        }

        match self.tool_version(ctx) {
            Ok(version) => {
                status.tool_version = version;
                status.healthy = true;
            }
            Err(e) => status.issues.push(e.to_string()),
        }

        if let Ok(installed) = self.list_installed(ctx, opts) {
            status.installed_packages = Some(installed.len());
        }

        Ok(status)
    }
}
