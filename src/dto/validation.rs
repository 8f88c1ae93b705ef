//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest accepted player name, in characters.
pub const MAX_PLAYER_NAME_LEN: usize = 24;

/// Validates that a player name can be used as a record key: 1 to 24 characters, not blank,
/// and free of `.` (field paths are dot separated).
///
/// # Examples
///
/// ```ignore
/// validate_player_name("Alice")   // Ok
/// validate_player_name("")        // Err - empty
/// validate_player_name("a.b")     // Err - dot
/// ```
pub fn validate_player_name(name: &str) -> Result<(), ValidationError> {
    let length = name.chars().count();
    if name.trim().is_empty() || length > MAX_PLAYER_NAME_LEN {
        let mut err = ValidationError::new("player_name_length");
        err.message = Some(
            format!("Player name must be 1 to {MAX_PLAYER_NAME_LEN} characters (got {length})")
                .into(),
        );
        return Err(err);
    }

    if name.contains('.') {
        let mut err = ValidationError::new("player_name_format");
        err.message = Some("Player name must not contain '.'".into());
        return Err(err);
    }

    Ok(())
}
