//! Request field checks shared by the HTTP handlers

use crate::error::{Error, Result};

/// `local@host.rest` with no whitespace and exactly one `@`.
///
/// The domain needs a `.` with at least one character on each side; any
/// later dots, including a trailing one, are accepted.
pub fn validate_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }

    domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

/// Fail with a 400 listing the expected fields when any value is blank.
pub fn require_fields(values: &[Option<&str>], message: &'static str) -> Result<()> {
    let all_present = values
        .iter()
        .all(|v| v.map(|s| !s.trim().is_empty()).unwrap_or(false));

    if all_present {
        Ok(())
    } else {
        Err(Error::bad_request(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("jane@acme.io"));
        assert!(validate_email("a.b+c@mail.acme.co.uk"));
        assert!(!validate_email("jane@acme"));
        assert!(!validate_email("@acme.io"));
        assert!(!validate_email("jane@@acme.io"));
        assert!(!validate_email("ja ne@acme.io"));
        assert!(!validate_email("jane@.io"));
        assert!(!validate_email("jane@acme."));
        assert!(!validate_email("jane@."));
        assert!(validate_email("jane@acme.io."));
        assert!(validate_email("jane@a..io"));
    }

    #[test]
    fn test_require_fields() {
        assert!(require_fields(&[Some("a"), Some("b")], "need a, b").is_ok());

        let err = require_fields(&[Some("a"), None], "need a, b").unwrap_err();
        assert_eq!(err.to_string(), "need a, b");
        assert!(require_fields(&[Some("")], "need a").is_err());
    }
}
