//! Input sanitization utilities for security
//!
//! Package names and search queries cross into native tool command lines.
//! Everything that reaches a subprocess argv is validated here first.

use crate::error::{PkgmuxError, Result};
use regex::Regex;
use std::sync::LazyLock;

/// Safe characters for package names across different package managers.
/// Allows: alphanumeric, dash, underscore, dot, plus, colon, at sign,
/// slash (scoped packages, flatpak application IDs).
static SAFE_PACKAGE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9@.:_+/-]+$").expect("Invalid regex pattern"));

/// Characters that could be dangerous in shell contexts.
static SHELL_DANGEROUS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[;`$(){}|&<>\\'"\n\r\t]"#).expect("Invalid regex pattern"));

const MAX_NAME_LEN: usize = 256;

fn invalid(name: &str, reason: &str) -> PkgmuxError {
    PkgmuxError::InvalidPackageName {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

/// First 50 characters for error display. Cuts on a character boundary so
/// an over-long multibyte name is rejected, never panicked on.
fn display_prefix(input: &str) -> &str {
    match input.char_indices().nth(50) {
        Some((idx, _)) => &input[..idx],
        None => input,
    }
}

/// Validate a package name is safe to pass to a native tool.
///
/// # Security
/// Prevents command injection by ensuring package names only contain safe
/// characters. Names like `foo; rm -rf /` are rejected here, before any
/// adapter builds an argv from them.
pub fn validate_package_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(invalid(name, "name cannot be empty"));
    }

    if name.len() > MAX_NAME_LEN {
        return Err(invalid(display_prefix(name), "name too long (max 256 chars)"));
    }

    if name.chars().any(|c| c.is_control()) {
        return Err(invalid(name, "name contains control characters"));
    }

    if SHELL_DANGEROUS.is_match(name) {
        return Err(invalid(name, "name contains unsafe characters"));
    }

    if !SAFE_PACKAGE_NAME.is_match(name) {
        return Err(invalid(name, "name contains invalid characters"));
    }

    // Prevent path traversal
    if name.contains("..") {
        return Err(invalid(name, "name cannot contain path traversal"));
    }

    Ok(())
}

/// Validate a search query. Queries are looser than names (spaces allowed)
/// but still must not smuggle shell metacharacters.
pub fn validate_search_query(query: &str) -> Result<()> {
    if query.is_empty() {
        return Err(invalid(query, "search query cannot be empty"));
    }

    if query.len() > MAX_NAME_LEN {
        return Err(invalid(display_prefix(query), "search query too long"));
    }

    if query.chars().any(|c| c.is_control()) {
        return Err(invalid(query, "search query contains control characters"));
    }

    if SHELL_DANGEROUS.is_match(query) {
        return Err(invalid(query, "search query contains unsafe characters"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_package_names() {
        assert!(validate_package_name("curl").is_ok());
        assert!(validate_package_name("libssl-dev").is_ok());
        assert!(validate_package_name("python3.12").is_ok());
        assert!(validate_package_name("@angular/cli").is_ok());
        assert!(validate_package_name("org.mozilla.firefox").is_ok());
        assert!(validate_package_name("gcc++").is_ok());
        assert!(validate_package_name("libc6:amd64").is_ok());
    }

    #[test]
    fn shell_injection_blocked() {
        // Semicolon injection
        assert!(validate_package_name("foo; rm -rf /").is_err());
        // Pipe injection
        assert!(validate_package_name("foo | cat").is_err());
        // Command substitution
        assert!(validate_package_name("foo$(cat)").is_err());
        // Backtick substitution
        assert!(validate_package_name("foo`id`").is_err());
        // Ampersand chaining
        assert!(validate_package_name("foo && echo").is_err());
    }

    #[test]
    fn path_traversal_blocked() {
        assert!(validate_package_name("../../../etc/passwd").is_err());
        assert!(validate_package_name("foo/../bar").is_err());
    }

    #[test]
    fn control_characters_blocked() {
        assert!(validate_package_name("foo\x07bar").is_err());
        assert!(validate_package_name("foo\nbar").is_err());
    }

    #[test]
    fn empty_and_long_names() {
        assert!(validate_package_name("").is_err());
        let long_name = "a".repeat(300);
        assert!(validate_package_name(&long_name).is_err());
    }

    #[test]
    fn long_multibyte_names_are_rejected_not_panicked() {
        // 80 four-byte characters: over the length bound, with no char
        // boundary at byte 50.
        let long = "🦀".repeat(80);
        let err = validate_package_name(&long).unwrap_err();
        assert!(matches!(err, PkgmuxError::InvalidPackageName { .. }));
        assert!(validate_search_query(&long).is_err());
    }

    #[test]
    fn rejection_is_the_usage_sentinel() {
        let err = validate_package_name("a;b").unwrap_err();
        assert!(matches!(err, PkgmuxError::InvalidPackageName { .. }));
    }

    #[test]
    fn search_queries_allow_spaces_but_not_metacharacters() {
        assert!(validate_search_query("web browser").is_ok());
        assert!(validate_search_query("foo; true").is_err());
        assert!(validate_search_query("").is_err());
    }
}
