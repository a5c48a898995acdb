use crate::error::ValidationError;

/// Upper bound on prompt length, in characters.
pub const MAX_PROMPT_CHARS: usize = 500;

/// Check a prompt against the length bounds and hand it back unchanged.
///
/// A prompt made only of whitespace counts as empty.
pub fn validate_prompt(prompt: &str) -> Result<&str, ValidationError> {
    if prompt.trim().is_empty() {
        return Err(ValidationError::Empty);
    }

    let len = prompt.chars().count();
    if len > MAX_PROMPT_CHARS {
        return Err(ValidationError::TooLong {
            len,
            max: MAX_PROMPT_CHARS,
        });
    }

    Ok(prompt)
}
