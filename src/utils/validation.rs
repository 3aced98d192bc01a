use validator::{Validate, ValidationError};

use crate::error::{Error, Result};

pub fn validate<T: Validate>(val: &T) -> Result<()> {
    val.validate().map_err(Error::from)
}

/// Topic, subtopic and variant ids travel in paths and single-flight keys.
pub fn validate_identifier(value: &str) -> std::result::Result<(), ValidationError> {
    let ok = !value.is_empty()
        && value.len() <= 128
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'));
    if ok {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_identifier"))
    }
}

pub fn ensure_identifier(field: &str, value: &str) -> Result<()> {
    validate_identifier(value)
        .map_err(|_| Error::BadRequest(format!("Invalid {}: {:?}", field, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers() {
        assert!(validate_identifier("penal-code_art.234").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("a/b").is_err());
        assert!(ensure_identifier("topic_id", "has space").is_err());
    }
}
