//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest accepted display name, in characters.
pub const MAX_NAME_CHARS: usize = 32;
/// Longest accepted chat message, in characters.
pub const MAX_CHAT_CHARS: usize = 500;

/// Validates that a display name is non-blank and at most [`MAX_NAME_CHARS`] characters once trimmed.
pub fn validate_display_name(name: &str) -> Result<(), ValidationError> {
    bounded_text(name, MAX_NAME_CHARS, "display_name")
}

/// Validates that a chat message is non-blank and at most [`MAX_CHAT_CHARS`] characters once trimmed.
pub fn validate_chat_text(text: &str) -> Result<(), ValidationError> {
    bounded_text(text, MAX_CHAT_CHARS, "chat_text")
}

fn bounded_text(value: &str, max: usize, code: &'static str) -> Result<(), ValidationError> {
    let length = value.trim().chars().count();
    if length == 0 {
        let mut err = ValidationError::new(code);
        err.message = Some("must not be blank".into());
        return Err(err);
    }
    if length > max {
        let mut err = ValidationError::new(code);
        err.message = Some(format!("must be at most {max} characters (got {length})").into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_display_name() {
        assert!(validate_display_name("ada").is_ok());
        assert!(validate_display_name("  ada  ").is_ok());
        assert!(validate_display_name(&"é".repeat(32)).is_ok());
        assert!(validate_display_name("").is_err());
        assert!(validate_display_name("   ").is_err());
        assert!(validate_display_name(&"x".repeat(33)).is_err());
    }

    #[test]
    fn test_validate_chat_text() {
        assert!(validate_chat_text("hello").is_ok());
        assert!(validate_chat_text(&"x".repeat(500)).is_ok());
        assert!(validate_chat_text(&"x".repeat(501)).is_err());
        assert!(validate_chat_text("\n\t").is_err());
    }
}
