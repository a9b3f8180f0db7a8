//! Ref name validation following git-style conventions.
//!
//! Valid ref names:
//! - Must be non-empty
//! - Must not contain whitespace, `~`, `^`, `:`, `?`, `*`, `[`, `\`
//! - Must not contain `..` (double dot) or `@{`
//! - Must not start or end with `.` or `/`
//! - Must not end with `.lock`
//! - Must not contain consecutive slashes (`//`)
//! - Components between slashes must be non-empty and not start with `.`

use crate::error::{RefError, RefResult};

/// Characters that are forbidden anywhere in a ref name.
const FORBIDDEN_CHARS: &[char] = &[' ', '\t', '\n', '\r', '~', '^', ':', '?', '*', '[', '\\'];

/// Validate a ref name, returning `Ok(())` if valid.
///
/// Ref names become storage keys under `refs/`, so the rules also keep
/// them safe as slash-separated paths.
///
/// # Examples
///
/// ```
/// use cask_refs::names::validate_ref_name;
///
/// assert!(validate_ref_name("nightly").is_ok());
/// assert!(validate_ref_name("builds/linux/latest").is_ok());
/// assert!(validate_ref_name("").is_err());
/// assert!(validate_ref_name("bad..name").is_err());
/// ```
pub fn validate_ref_name(name: &str) -> RefResult<()> {
    let fail = |reason: String| {
        Err(RefError::InvalidName {
            name: name.to_string(),
            reason,
        })
    };

    if name.is_empty() {
        return fail("ref name must not be empty".into());
    }

    for ch in FORBIDDEN_CHARS {
        if name.contains(*ch) {
            return fail(format!("contains forbidden character: {ch:?}"));
        }
    }

    if name.contains("..") {
        return fail("must not contain '..'".into());
    }

    if name.contains("@{") {
        return fail("must not contain '@{'".into());
    }

    if name.starts_with('.') || name.ends_with('.') {
        return fail("must not start or end with '.'".into());
    }

    if name.starts_with('/') || name.ends_with('/') {
        return fail("must not start or end with '/'".into());
    }

    if name.ends_with(".lock") {
        return fail("must not end with '.lock'".into());
    }

    if name.contains("//") {
        return fail("must not contain consecutive slashes '//'".into());
    }

    for component in name.split('/') {
        if component.is_empty() {
            return fail("path components must not be empty".into());
        }
        if component.starts_with('.') {
            return fail(format!("component must not start with '.': {component:?}"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_names_are_valid() {
        assert!(validate_ref_name("nightly").is_ok());
        assert!(validate_ref_name("v1.0.0").is_ok());
        assert!(validate_ref_name("builds/linux/latest").is_ok());
    }

    #[test]
    fn empty_name_rejected() {
        assert!(validate_ref_name("").is_err());
    }

    #[test]
    fn forbidden_characters_rejected() {
        for name in ["has space", "tilde~", "caret^", "colon:", "glob*", "bracket["] {
            assert!(validate_ref_name(name).is_err(), "accepted: {name}");
        }
    }

    #[test]
    fn double_dot_rejected() {
        assert!(validate_ref_name("bad..name").is_err());
    }

    #[test]
    fn reflog_syntax_rejected() {
        assert!(validate_ref_name("name@{0}").is_err());
    }

    #[test]
    fn boundary_dots_and_slashes_rejected() {
        assert!(validate_ref_name(".hidden").is_err());
        assert!(validate_ref_name("trailing.").is_err());
        assert!(validate_ref_name("/abs").is_err());
        assert!(validate_ref_name("trailing/").is_err());
        assert!(validate_ref_name("a//b").is_err());
    }

    #[test]
    fn lock_suffix_rejected() {
        assert!(validate_ref_name("main.lock").is_err());
    }

    #[test]
    fn dot_component_rejected() {
        assert!(validate_ref_name("a/.hidden/b").is_err());
    }
}
