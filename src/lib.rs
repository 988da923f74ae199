pub mod backends;
pub mod classify;
pub mod cli;
pub mod error;
pub mod exec;
pub mod manager;
pub mod registry;
pub mod ui;
pub mod utils;

use clap::Parser;
use exec::{DEFAULT_TIMEOUT, ExecContext, SystemRunner};
use std::sync::Arc;
use std::time::Duration;

/// Run the pkgmux CLI entrypoint. Returns the process exit code.
pub fn run_cli() -> i32 {
    // 0. Initialize color settings (must be first)
    ui::init_colors();

    let args = cli::args::Cli::parse();
    ui::set_quiet(args.global.quiet);
    ui::set_verbose(args.global.verbose || args.global.debug);

    // One context bounds the whole invocation; per-operation timeouts can
    // only tighten it.
    let ctx = match args.global.timeout {
        Some(secs) => ExecContext::with_timeout(Duration::from_secs(secs)),
        None => ExecContext::with_timeout(DEFAULT_TIMEOUT),
    };

    // 1. Signal handling: mark cancellation and let in-flight subprocesses
    // be terminated by their poll loops.
    let cancel = ctx.cancel_flag();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!();
        ui::mark_interrupted();
        cancel.store(true, std::sync::atomic::Ordering::SeqCst);
        ui::warning("Operation cancelled by user.");
    }) {
        ui::warning(&format!("Could not install Ctrl-C handler: {e}"));
    }

    // 2. Wire backends and dispatch.
    let runner = Arc::new(SystemRunner::new());
    let registry = match backends::default_registry(runner) {
        Ok(registry) => registry,
        Err(e) => {
            ui::error(&e.to_string());
            return classify::classify(&e).exit_code();
        }
    };

    let code = cli::dispatcher::dispatch(&args, &registry, &ctx);
    if ui::is_interrupted() {
        return classify::EXIT_INTERRUPTED;
    }
    code
}
