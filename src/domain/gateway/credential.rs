//! Credential Validator - gates every connection before a session exists.
//!
//! Exact string equality only: no trimming, no case folding, no prefix
//! matching. An empty expected credential rejects everything (fail closed).
//! The comparison runs in constant time over equal-length inputs so that
//! response timing does not reveal how much of a guess was correct.

use secrecy::{ExposeSecret, Secret};
use subtle::ConstantTimeEq;

use super::GatewayError;

/// Returns true iff `expected` is non-empty and `presented == expected`.
pub fn validate(presented: &str, expected: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    constant_time_compare(presented.as_bytes(), expected.as_bytes())
}

/// Process-wide holder of the gateway credential.
///
/// Built once at startup and shared read-only across every connection.
#[derive(Debug, Clone)]
pub struct CredentialValidator {
    expected: Secret<String>,
}

impl CredentialValidator {
    /// Creates a validator for the configured gateway credential.
    pub fn new(expected: Secret<String>) -> Self {
        Self { expected }
    }

    /// Checks a credential taken from the connection parameters.
    ///
    /// A missing credential is treated as empty and therefore rejected.
    pub fn check(&self, presented: Option<&str>) -> Result<(), GatewayError> {
        if validate(presented.unwrap_or_default(), self.expected.expose_secret()) {
            Ok(())
        } else {
            Err(GatewayError::Auth)
        }
    }
}

fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn accepts_exact_match() {
        assert!(validate("secret", "secret"));
    }

    #[test]
    fn rejects_mismatch() {
        assert!(!validate("wrong", "secret"));
    }

    #[test]
    fn rejects_when_expected_is_empty() {
        assert!(!validate("", ""));
        assert!(!validate("anything", ""));
    }

    #[test]
    fn rejects_prefix_and_suffix_matches() {
        assert!(!validate("secre", "secret"));
        assert!(!validate("secret1", "secret"));
    }

    #[test]
    fn does_not_trim_or_fold_case() {
        assert!(!validate(" secret", "secret"));
        assert!(!validate("secret\n", "secret"));
        assert!(!validate("SECRET", "secret"));
    }

    #[test]
    fn validator_rejects_missing_credential() {
        let validator = CredentialValidator::new(Secret::new("secret".to_string()));
        assert!(matches!(validator.check(None), Err(GatewayError::Auth)));
    }

    #[test]
    fn validator_accepts_configured_credential() {
        let validator = CredentialValidator::new(Secret::new("secret".to_string()));
        assert!(validator.check(Some("secret")).is_ok());
    }

    #[test]
    fn validator_debug_does_not_leak_credential() {
        let validator = CredentialValidator::new(Secret::new("hunter2".to_string()));
        assert!(!format!("{:?}", validator).contains("hunter2"));
    }

    proptest! {
        #[test]
        fn validate_is_exact_nonempty_equality(presented in ".{0,24}", expected in ".{0,24}") {
            prop_assert_eq!(
                validate(&presented, &expected),
                !expected.is_empty() && presented == expected
            );
        }

        #[test]
        fn validate_accepts_itself_when_nonempty(value in ".{1,32}") {
            prop_assert!(validate(&value, &value));
        }
    }
}
