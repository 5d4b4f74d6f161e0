use crate::config::RewriteConfig;
use crate::error::ValidationError;

/// Preconditions checked before a rewrite is dispatched, first failure wins:
/// identity, non-empty text, maximum length, then the optional minimum.
///
/// Lengths count characters of the trimmed input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputPolicy {
    pub max_length: usize,
    /// 0 disables the minimum
    pub min_length: usize,
}

impl Default for InputPolicy {
    fn default() -> Self {
        Self::from_config(&RewriteConfig::default())
    }
}

impl InputPolicy {
    pub fn from_config(config: &RewriteConfig) -> Self {
        Self {
            max_length: config.max_length,
            min_length: config.min_length,
        }
    }

    /// Validate `input` and return its trimmed form.
    pub fn check<'a>(
        &self,
        identity_ready: bool,
        input: &'a str,
    ) -> Result<&'a str, ValidationError> {
        if !identity_ready {
            return Err(ValidationError::NoIdentity);
        }

        let text = input.trim();
        if text.is_empty() {
            return Err(ValidationError::EmptyText);
        }

        let length = text.chars().count();
        if length > self.max_length {
            return Err(ValidationError::TooLong {
                max: self.max_length,
            });
        }

        if self.min_length > 0 && length <= self.min_length {
            return Err(ValidationError::TooShort {
                min: self.min_length,
            });
        }

        Ok(text)
    }

    /// Whether a submit control for `input` should be enabled.
    pub fn is_submittable(&self, input: &str) -> bool {
        self.check(true, input).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_and_trims() {
        let policy = InputPolicy::default();
        assert_eq!(policy.check(true, "  hello world \n"), Ok("hello world"));
    }

    #[test]
    fn test_identity_checked_first() {
        let policy = InputPolicy::default();
        assert_eq!(policy.check(false, ""), Err(ValidationError::NoIdentity));
    }

    #[test]
    fn test_blank_inputs_rejected() {
        let policy = InputPolicy::default();
        for input in ["", " ", "\n\t  ", "\u{3000}"] {
            assert_eq!(
                policy.check(true, input),
                Err(ValidationError::EmptyText),
                "input {input:?}"
            );
        }
    }

    #[test]
    fn test_max_length_counts_chars() {
        let policy = InputPolicy::default();
        let at_limit = "é".repeat(1000);
        assert!(policy.check(true, &at_limit).is_ok());

        let over = "a".repeat(1001);
        assert_eq!(
            policy.check(true, &over),
            Err(ValidationError::TooLong { max: 1000 })
        );
    }

    #[test]
    fn test_surrounding_whitespace_not_counted() {
        let policy = InputPolicy::default();
        let padded = format!("   {}   ", "a".repeat(1000));
        assert!(policy.check(true, &padded).is_ok());
    }

    #[test]
    fn test_min_length_strictly_greater() {
        let policy = InputPolicy {
            max_length: 1000,
            min_length: 13,
        };
        assert_eq!(
            policy.check(true, "thirteen char"),
            Err(ValidationError::TooShort { min: 13 })
        );
        assert!(policy.check(true, "fourteen chars").is_ok());
    }

    #[test]
    fn test_empty_wins_over_min_length() {
        let policy = InputPolicy {
            max_length: 1000,
            min_length: 13,
        };
        assert_eq!(policy.check(true, "  "), Err(ValidationError::EmptyText));
    }

    #[test]
    fn test_is_submittable() {
        let policy = InputPolicy::default();
        assert!(policy.is_submittable("rewrite me"));
        assert!(!policy.is_submittable("   "));
    }
}
