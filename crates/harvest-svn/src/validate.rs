//! Input validation for svn operands
//!
//! Operands are passed as separate arguments, so there is no shell to escape
//! from. The danger is the tool itself: an operand starting with `-` is read
//! as an option. Everything caller-controlled goes through here first.

use harvest_core::{HarvestError, Result};

/// Validate a repository location
///
/// Must be non-empty and must not look like an option.
pub fn validate_location(input: &str) -> Result<&str> {
    if input.is_empty() {
        return Err(HarvestError::InvalidLocation(
            "location cannot be empty".to_string(),
        ));
    }
    if input.starts_with('-') {
        return Err(HarvestError::InvalidLocation(format!(
            "location must not start with '-': '{}'",
            input
        )));
    }
    if input.contains('\0') {
        return Err(HarvestError::InvalidLocation(
            "location contains null byte".to_string(),
        ));
    }
    Ok(input)
}

/// Validate a plain operand such as an export destination
pub fn validate_operand<'a>(input: &'a str, context: &str) -> Result<&'a str> {
    if input.is_empty() {
        return Err(HarvestError::InvalidArgument(format!(
            "{} cannot be empty",
            context
        )));
    }
    if input.starts_with('-') {
        return Err(HarvestError::InvalidArgument(format!(
            "{} must not start with '-': '{}'",
            context, input
        )));
    }
    if input.contains('\0') {
        return Err(HarvestError::InvalidArgument(format!(
            "{} contains null byte",
            context
        )));
    }
    Ok(input)
}

/// Validate one bound of a revision range (`-r FIRST:LAST`)
///
/// Accepts a number or keyword (`1234`, `HEAD`, `PREV`) or a braced date
/// (`{2024-01-01}`, `{2024-01-01T12:00}`).
pub fn validate_revision(input: &str) -> Result<&str> {
    if input.is_empty() {
        return Err(HarvestError::InvalidArgument(
            "revision cannot be empty".to_string(),
        ));
    }

    if let Some(inner) = input.strip_prefix('{') {
        let date = inner.strip_suffix('}').ok_or_else(|| {
            HarvestError::InvalidArgument(format!("unterminated revision date: '{}'", input))
        })?;
        if date.is_empty() || date.chars().any(|c| c.is_control() || c == '{' || c == '}') {
            return Err(HarvestError::InvalidArgument(format!(
                "invalid revision date: '{}'",
                input
            )));
        }
        return Ok(input);
    }

    if input.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(input)
    } else {
        Err(HarvestError::InvalidArgument(format!(
            "revision contains unsafe characters: '{}'. Use a number, a keyword or {{DATE}}.",
            input
        )))
    }
}
