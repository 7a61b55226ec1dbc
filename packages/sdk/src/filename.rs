use thiserror::Error;

/// Why a file name was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FileNameError {
    #[error("file name cannot be empty")]
    Empty,
    #[error("path separators are not allowed in file names")]
    ContainsPathSeparator,
    #[error("'..' is not allowed as a file name")]
    PathTraversal,
    #[error("null bytes are not allowed in file names")]
    NullByte,
    #[error("hidden file names (starting with '.') are not allowed")]
    Hidden,
    #[error("control characters are not allowed in file names")]
    ControlCharacter,
}

/// Validate a file name used as a store key and as a cache path component.
///
/// Returns the trimmed name.
pub fn validate_file_name(name: &str) -> Result<&str, FileNameError> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(FileNameError::Empty);
    }

    if trimmed.contains('\0') {
        return Err(FileNameError::NullByte);
    }

    if trimmed.chars().any(|c| c.is_control()) {
        return Err(FileNameError::ControlCharacter);
    }

    if trimmed.contains('/') || trimmed.contains('\\') {
        return Err(FileNameError::ContainsPathSeparator);
    }

    if trimmed == ".." {
        return Err(FileNameError::PathTraversal);
    }

    if trimmed.starts_with('.') {
        return Err(FileNameError::Hidden);
    }

    Ok(trimmed)
}
