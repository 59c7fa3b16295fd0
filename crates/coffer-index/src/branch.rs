//! Branch name validation.
//!
//! Valid branch names:
//! - Must be non-empty
//! - Must not contain whitespace, control characters, `~`, `^`, `:`, `?`,
//!   `*`, `[` or `\`
//! - Must not contain `..`
//! - Must not start or end with `/`, or end with `.`
//! - Must not contain empty components (`//`)
//!
//! A leading `.` is allowed: it marks reserved branches such as `.metadata`.

use crate::error::{IndexError, IndexResult};

/// Characters that are forbidden anywhere in a branch name.
const FORBIDDEN_CHARS: &[char] = &['~', '^', ':', '?', '*', '[', '\\'];

/// Validate a branch name, returning `Ok(())` if valid.
pub fn validate_branch_name(name: &str) -> IndexResult<()> {
    let invalid = |reason: String| IndexError::InvalidBranch {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("branch name must not be empty".into()));
    }
    if let Some(ch) = name
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || FORBIDDEN_CHARS.contains(c))
    {
        return Err(invalid(format!("contains forbidden character: {ch:?}")));
    }
    if name.contains("..") {
        return Err(invalid("must not contain '..'".into()));
    }
    if name.ends_with('.') {
        return Err(invalid("must not end with '.'".into()));
    }
    if name.starts_with('/') || name.ends_with('/') {
        return Err(invalid("must not start or end with '/'".into()));
    }
    if name.split('/').any(str::is_empty) {
        return Err(invalid("path components must not be empty".into()));
    }
    Ok(())
}
