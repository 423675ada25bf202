use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

const MIN_DIGITS: usize = 9;
const MAX_DIGITS: usize = 13;

/// Normalized business tax identifier (ma so thue).
///
/// Raw input is stripped to digits, accepted at 9-13 digits, and
/// left-zero-padded to 10 digits when exactly 9 were supplied.
/// Normalization is idempotent: parsing an already-normalized value
/// returns it unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Mst(String);

impl Mst {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let digits: String = input.chars().filter(|ch| ch.is_ascii_digit()).collect();
        if digits.is_empty() {
            return Err(ValidationError::EmptyIdentifier);
        }

        let len = digits.len();
        if !(MIN_DIGITS..=MAX_DIGITS).contains(&len) {
            return Err(ValidationError::IdentifierLength {
                len,
                min: MIN_DIGITS,
                max: MAX_DIGITS,
            });
        }

        if len == MIN_DIGITS {
            return Ok(Self(format!("0{digits}")));
        }
        Ok(Self(digits))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Mst {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Mst {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for Mst {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Mst> for String {
    fn from(value: Mst) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_nine_digit_input_to_ten() {
        let mst = Mst::parse("110198560").expect("valid identifier");
        assert_eq!(mst.as_str(), "0110198560");
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = Mst::parse("110198560").expect("valid identifier");
        let twice = Mst::parse(once.as_str()).expect("still valid");
        assert_eq!(once, twice);
    }

    #[test]
    fn strips_non_digit_characters() {
        let mst = Mst::parse(" 01-1019.8560 ").expect("valid identifier");
        assert_eq!(mst.as_str(), "0110198560");
    }

    #[test]
    fn accepts_branch_suffix_up_to_thirteen_digits() {
        let mst = Mst::parse("0110198560001").expect("valid identifier");
        assert_eq!(mst.as_str(), "0110198560001");
    }

    #[test]
    fn rejects_too_short_and_too_long() {
        assert!(matches!(
            Mst::parse("12345678").expect_err("too short"),
            ValidationError::IdentifierLength { len: 8, .. }
        ));
        assert!(matches!(
            Mst::parse("12345678901234").expect_err("too long"),
            ValidationError::IdentifierLength { len: 14, .. }
        ));
    }

    #[test]
    fn rejects_input_without_digits() {
        assert!(matches!(
            Mst::parse("abc").expect_err("no digits"),
            ValidationError::EmptyIdentifier
        ));
    }
}
