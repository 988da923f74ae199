//! Outcome taxonomy and process exit-code mapping
//!
//! Native tools disagree about what their exit codes mean: apt's 100 is
//! always an error while dnf's 100 means "success, updates available".
//! A single global exit-code table is therefore wrong by construction.
//! Each adapter owns its own interpreter and attaches the resulting
//! category to a typed error; this module only defines the closed taxonomy,
//! the stable process exit codes, and the lookup order at the boundary.

use crate::error::PkgmuxError;
use serde::Serialize;
use std::fmt;

/// Process exit code emitted when a signal interrupts the run.
pub const EXIT_INTERRUPTED: i32 = 130;

/// Closed set of process-level outcome categories, independent of any
/// native tool's own exit-code conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Success,
    /// Bad input or arguments.
    Usage,
    /// Needs elevated privilege (locks, root-only databases).
    Permission,
    /// Backend or package not found / not installed.
    Unavailable,
    /// Anything else, including unclassified subprocess failure.
    General,
}

impl ErrorCategory {
    /// Stable process exit code for scripting consumers.
    /// Follows POSIX/sysexits.h conventions.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::General => 1,
            Self::Usage => 2,
            Self::Unavailable => 69,
            Self::Permission => 77,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Usage => write!(f, "usage error"),
            Self::Permission => write!(f, "permission denied"),
            Self::Unavailable => write!(f, "unavailable"),
            Self::General => write!(f, "general error"),
        }
    }
}

/// Classify an error for the process boundary.
///
/// Lookup order: the typed taxonomy error first, then known sentinel
/// variants, then the keyword fallback. Classification proper happens once,
/// in the adapter that saw the exit code and stderr; this function never
/// re-parses tool output.
pub fn classify(err: &PkgmuxError) -> ErrorCategory {
    match err {
        PkgmuxError::Classified { category, .. } => *category,

        // Known sentinels.
        PkgmuxError::Unsupported { .. } => ErrorCategory::Unavailable,
        PkgmuxError::BackendNotFound { .. } | PkgmuxError::NoBackendForCategory { .. } => {
            ErrorCategory::Unavailable
        }
        PkgmuxError::InvalidPackageName { .. } => ErrorCategory::Usage,
        PkgmuxError::Timeout { .. } => ErrorCategory::General,
        PkgmuxError::Interrupted => ErrorCategory::General,

        // Everything else goes through the message heuristic.
        other => classify_message(&other.to_string()),
    }
}

/// Best-effort keyword fallback for errors that never passed through an
/// adapter interpreter (bubbled up from generic library calls).
///
/// Lower-confidence by design: prefer adding an adapter-local typed
/// classification over teaching this function new keywords.
pub fn classify_message(message: &str) -> ErrorCategory {
    let msg = message.to_lowercase();

    const PERMISSION_HINTS: &[&str] = &[
        "permission denied",
        "are you root",
        "requires root",
        "superuser",
        "operation not permitted",
        "lock file",
        "could not get lock",
        "read-only file system",
    ];
    const UNAVAILABLE_HINTS: &[&str] = &[
        "not found",
        "no such file",
        "unable to locate",
        "not installed",
        "no installation candidate",
        "command not found",
        "unavailable",
    ];
    const USAGE_HINTS: &[&str] = &[
        "invalid operation",
        "invalid argument",
        "unknown option",
        "usage:",
        "unrecognized",
    ];

    if PERMISSION_HINTS.iter().any(|hint| msg.contains(hint)) {
        return ErrorCategory::Permission;
    }
    if UNAVAILABLE_HINTS.iter().any(|hint| msg.contains(hint)) {
        return ErrorCategory::Unavailable;
    }
    if USAGE_HINTS.iter().any(|hint| msg.contains(hint)) {
        return ErrorCategory::Usage;
    }

    ErrorCategory::General
}
