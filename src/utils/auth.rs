/// Compare a provided password with the stored one in constant time
///
/// A missing stored password never matches, even an empty input.
pub fn password_matches(provided: &str, stored: Option<&str>) -> bool {
    match stored {
        Some(expected) => constant_time_eq(provided.as_bytes(), expected.as_bytes()),
        None => false,
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_matches_valid() {
        assert!(password_matches("pass123", Some("pass123")));
    }

    #[test]
    fn test_password_matches_invalid() {
        assert!(!password_matches("pass124", Some("pass123")));
    }

    #[test]
    fn test_password_matches_different_length() {
        assert!(!password_matches("pass", Some("pass123")));
    }

    #[test]
    fn test_password_matches_case_sensitive() {
        assert!(!password_matches("Admin", Some("admin")));
    }

    #[test]
    fn test_password_missing_never_matches() {
        assert!(!password_matches("", None));
        assert!(!password_matches("admin", None));
    }

    #[test]
    fn test_password_empty_pair() {
        assert!(password_matches("", Some("")));
    }
}
