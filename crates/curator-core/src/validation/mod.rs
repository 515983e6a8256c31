//! Validation helpers for operator-supplied action configuration.

use crate::error::AppError;

const MIMETYPE_HINT: &str = "Please enter a mimetype (e.g. image/jpeg, video/mp4, audio/mp3, etc...)";

/// A mimetype must split on `/` into exactly two parts with a non-empty subtype.
pub fn validate_mimetype(mimetype: &str) -> Result<(), AppError> {
    let parts: Vec<&str> = mimetype.split('/').collect();
    if parts.len() != 2 || parts[1].is_empty() {
        return Err(AppError::Configuration(MIMETYPE_HINT.to_string()));
    }
    Ok(())
}

/// Trims leading and trailing `/` and `\` from a path template.
pub fn normalize_path_template(path: &str) -> String {
    path.trim_matches(|c| c == '/' || c == '\\').to_string()
}
