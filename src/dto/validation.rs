//! Validation helpers for DTOs.

use validator::ValidationError;

/// Shortest session code a caller may choose.
pub const MIN_CODE_LENGTH: usize = 3;
/// Longest session code a caller may choose.
pub const MAX_CODE_LENGTH: usize = 12;
/// Longest accepted session or player name, in characters.
pub const MAX_NAME_LENGTH: usize = 40;

/// Validates a caller-supplied session code: 3 to 12 ASCII alphanumerics once trimmed.
///
/// Case is not checked here; codes are upper-cased before use.
pub fn validate_session_code(code: &str) -> Result<(), ValidationError> {
    let code = code.trim();
    if !(MIN_CODE_LENGTH..=MAX_CODE_LENGTH).contains(&code.len()) {
        let mut err = ValidationError::new("session_code_length");
        err.message = Some(
            format!(
                "Session code must be between {MIN_CODE_LENGTH} and {MAX_CODE_LENGTH} characters (got {})",
                code.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        let mut err = ValidationError::new("session_code_format");
        err.message = Some("Session code must contain only letters and digits".into());
        return Err(err);
    }

    Ok(())
}

/// Validates a session or player name: non-blank and at most 40 characters once trimmed.
pub fn validate_display_name(name: &str) -> Result<(), ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        let mut err = ValidationError::new("name_required");
        err.message = Some("Name must not be empty".into());
        return Err(err);
    }

    let length = name.chars().count();
    if length > MAX_NAME_LENGTH {
        let mut err = ValidationError::new("name_length");
        err.message = Some(
            format!("Name must be at most {MAX_NAME_LENGTH} characters (got {length})").into(),
        );
        return Err(err);
    }

    Ok(())
}
