//! Terminal output helpers
//!
//! All human-facing output funnels through here so quiet mode and color
//! handling live in one place. Machine output bypasses this module
//! entirely; see `utils::machine_output`.

use colored::Colorize;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};

static QUIET: AtomicBool = AtomicBool::new(false);
static VERBOSE: AtomicBool = AtomicBool::new(false);
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Disable colors when stdout is not a terminal, so piped output stays
/// free of escape codes. NO_COLOR is honored by the colored crate itself.
pub fn init_colors() {
    if !atty::is(atty::Stream::Stdout) {
        colored::control::set_override(false);
    }
}

pub fn set_quiet(quiet: bool) {
    QUIET.store(quiet, Ordering::SeqCst);
}

pub fn set_verbose(verbose: bool) {
    VERBOSE.store(verbose, Ordering::SeqCst);
}

pub fn mark_interrupted() {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

pub fn is_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

pub fn success(msg: &str) {
    if QUIET.load(Ordering::SeqCst) {
        return;
    }
    println!("{} {}", "✓".green().bold(), msg);
}

pub fn info(msg: &str) {
    if QUIET.load(Ordering::SeqCst) {
        return;
    }
    println!("{} {}", "ℹ".blue().bold(), msg);
}

/// Verbose-only detail line.
pub fn debug(msg: &str) {
    if VERBOSE.load(Ordering::SeqCst) && !QUIET.load(Ordering::SeqCst) {
        println!("{} {}", "·".dimmed(), msg.dimmed());
    }
}

/// Warnings go to stderr and survive quiet mode.
pub fn warning(msg: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), msg);
}

pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red().bold(), msg);
}

pub fn separator() {
    if QUIET.load(Ordering::SeqCst) {
        return;
    }
    println!("{}", "─".repeat(60).bright_black());
}

pub fn keyval(key: &str, val: &str) {
    if QUIET.load(Ordering::SeqCst) {
        return;
    }
    println!("{}: {}", key.bold(), val);
}

pub fn indent(msg: &str, level: usize) {
    if QUIET.load(Ordering::SeqCst) {
        return;
    }
    let spaces = " ".repeat(level * 2);
    println!("{spaces}{msg}");
}

pub fn prompt_yes_no(question: &str) -> bool {
    print!("{} {} [Y/n] ", "?".yellow().bold(), question);

    if let Err(e) = io::stdout().flush() {
        eprintln!("\nWarning: Failed to flush terminal: {e}");
        return true;
    }

    let mut input = String::new();
    match io::stdin().read_line(&mut input) {
        Ok(_) => {
            let input = input.trim().to_lowercase();
            if input.is_empty() {
                return true;
            }
            input == "y" || input == "yes"
        }
        Err(e) => {
            eprintln!("\nWarning: Failed to read input: {e}");
            // Fail-open for broken stdin (non-interactive pipelines).
            true
        }
    }
}
