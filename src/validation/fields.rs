use crate::core::error::ValidationError;

/// Trim a required form value, rejecting blank input
pub fn require_non_blank<'a>(
    field: &'static str,
    value: &'a str,
) -> Result<&'a str, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::BlankField(field));
    }
    Ok(trimmed)
}

/// Normalize an optional form value: blank becomes `None`
pub fn optional_field(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_non_blank_trims() {
        assert_eq!(require_non_blank("office", "  301 "), Ok("301"));
    }

    #[test]
    fn test_require_non_blank_rejects_whitespace() {
        assert_eq!(
            require_non_blank("office", " \t"),
            Err(ValidationError::BlankField("office"))
        );
        assert_eq!(
            require_non_blank("department", ""),
            Err(ValidationError::BlankField("department"))
        );
    }

    #[test]
    fn test_optional_field() {
        assert_eq!(optional_field(None), None);
        assert_eq!(optional_field(Some("   ".to_string())), None);
        assert_eq!(optional_field(Some(" ab ".to_string())), Some("ab".to_string()));
    }
}
