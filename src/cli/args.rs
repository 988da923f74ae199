use clap::{Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser, Debug)]
#[command(
    name = "pkgmux",
    about = "One front end for many package managers",
    long_about = "Runs package operations across apt, dnf and flatpak style backends \
                  concurrently, with one uniform command surface and stable exit codes",
    version,
    next_line_help = false,
    term_width = 80
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalFlags,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug)]
pub struct GlobalFlags {
    /// Restrict to specific backends (repeatable)
    #[arg(short = 'b', long = "backend", global = true, value_name = "NAME")]
    pub backend: Vec<String>,

    /// Use the best backend for a category (system, language, sandbox)
    #[arg(short = 'c', long, global = true, value_name = "CATEGORY", conflicts_with = "backend")]
    pub category: Option<String>,

    /// Skip confirmation prompts
    #[arg(short = 'y', long = "yes", global = true)]
    pub yes: bool,

    /// Never prompt, even in interactive mode
    #[arg(long, global = true)]
    pub no_confirm: bool,

    /// Let the native tools prompt on their own terminal
    #[arg(short = 'i', long, global = true)]
    pub interactive: bool,

    /// Preview what would happen without executing anything
    #[arg(short = 'n', long, global = true)]
    pub dry_run: bool,

    /// Quiet mode
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Developer diagnostics
    #[arg(long, global = true, hide = true)]
    pub debug: bool,

    /// System-wide scope instead of per-user where backends distinguish
    #[arg(short = 'g', long = "global", global = true)]
    pub global_scope: bool,

    /// Per-operation timeout in seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Retry failed backend operations this many times
    #[arg(long, global = true, default_value_t = 0, value_name = "N")]
    pub retries: u32,

    /// Extra arguments passed verbatim to the native tools (shell-quoted)
    #[arg(long, global = true, value_name = "ARGS", allow_hyphen_values = true)]
    pub extra_args: Option<String>,

    /// Skip packages with broken dependencies instead of failing (dnf)
    #[arg(long, global = true)]
    pub skip_broken: bool,

    /// Target architecture hint for backends that support one
    #[arg(long, global = true, value_name = "ARCH")]
    pub arch: Option<String>,

    /// Machine-readable output format (json, yaml)
    #[arg(long, global = true, value_name = "FORMAT")]
    pub format: Option<String>,

    /// Machine output contract version (only v1 is defined)
    #[arg(long, global = true, value_name = "VERSION")]
    pub output_version: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search every backend for matching packages
    Search {
        query: String,
    },

    /// List installed packages per backend
    List,

    /// Install packages
    Install {
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Remove packages
    Remove {
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Show details for one package
    Info {
        package: String,
    },

    /// Refresh backend package indexes
    Refresh,

    /// Upgrade named packages, or everything when none are named
    Upgrade {
        packages: Vec<String>,
    },

    /// Drop backend caches
    Clean,

    /// Remove packages nothing depends on anymore
    Autoremove,

    /// Check that packages are correctly installed
    Verify {
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Per-backend health summary
    Status,

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}
