use std::collections::HashMap;

/// Configuration bag threaded unchanged through every contract operation.
///
/// `Options::default()` is the documented zero value: non-interactive,
/// global scope, no dry-run, no confirmation bypass. Callers that have no
/// opinions pass the default and get safe behavior.
#[derive(Debug, Clone, Default)]
pub struct Options {
    // Execution mode
    pub dry_run: bool,
    pub interactive: bool,
    pub verbose: bool,
    pub debug: bool,
    pub quiet: bool,

    // Authorization
    pub assume_yes: bool,
    pub no_confirm: bool,

    // Scope / filters
    pub global_scope: bool,
    pub skip_broken: bool,
    pub arch: Option<String>,

    /// Backend-specific arguments appended verbatim to mutating commands.
    pub extra_args: Vec<String>,

    pub timeout_secs: Option<u64>,
    pub retries: u32,

    /// Open mapping for backend-specific knobs.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Options {
    /// Whether a backend may auto-confirm prompts.
    ///
    /// A non-interactive run must never block on a prompt nobody can
    /// answer, so "not interactive" implies auto-confirm even when the
    /// caller did not pass assume-yes. `no_confirm` forces it outright.
    pub fn effective_assume_yes(&self) -> bool {
        self.assume_yes || self.no_confirm || !self.interactive
    }
}
