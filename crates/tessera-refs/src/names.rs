//! Ref name validation.
//!
//! A name is one or more `/`-separated components. Components are
//! non-empty, do not start with `.`, and the whole name does not end with
//! `.lock` or contain `..`, `@{`, whitespace or any of `~^:?*[\`.

use crate::error::{RefError, Result};

const FORBIDDEN: &[char] = &['~', '^', ':', '?', '*', '[', '\\'];

fn invalid(name: &str, reason: impl Into<String>) -> RefError {
    RefError::InvalidName {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Validate a branch or tag name.
///
/// ```
/// use tessera_refs::names::validate_ref_name;
///
/// assert!(validate_ref_name("feature/auth").is_ok());
/// assert!(validate_ref_name("bad..name").is_err());
/// ```
pub fn validate_ref_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(invalid(name, "must not be empty"));
    }
    if let Some(ch) = name.chars().find(|c| c.is_whitespace() || FORBIDDEN.contains(c)) {
        return Err(invalid(name, format!("contains forbidden character {ch:?}")));
    }
    for pattern in ["..", "@{"] {
        if name.contains(pattern) {
            return Err(invalid(name, format!("must not contain {pattern:?}")));
        }
    }
    if name.ends_with(".lock") || name.ends_with('.') {
        return Err(invalid(name, "must not end with '.' or '.lock'"));
    }
    for component in name.split('/') {
        if component.is_empty() {
            return Err(invalid(name, "empty path component"));
        }
        if component.starts_with('.') {
            return Err(invalid(name, format!("component {component:?} starts with '.'")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_and_nested() {
        for name in ["main", "v1.0", "my-branch", "feature/deep/nested"] {
            assert!(validate_ref_name(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn rejects_bad_names() {
        for name in [
            "", "a b", "a\tb", "a~b", "a:b", "a*b", "a..b", "ref@{0}", "main.lock", "trail.",
            "/lead", "trail/", "a//b", ".hidden", "feature/.hidden",
        ] {
            assert!(validate_ref_name(name).is_err(), "{name:?}");
        }
    }
}
