//! Fragment sequence numbers.
//!
//! Media fragments are numbered with unsigned decimal integers that run well past
//! 64 bits (47-digit values are normal). They are kept as normalized digit strings
//! and ordered numerically: a shorter number is smaller, equal lengths compare
//! digit by digit.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FragmentNumber(String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFragmentNumberError(String);

impl fmt::Display for ParseFragmentNumberError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not an unsigned decimal fragment number: {:?}", self.0)
    }
}

impl std::error::Error for ParseFragmentNumberError {}

impl FragmentNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for FragmentNumber {
    fn default() -> Self {
        FragmentNumber("0".to_string())
    }
}

impl FromStr for FragmentNumber {
    type Err = ParseFragmentNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseFragmentNumberError(s.to_string()));
        }
        let normalized = digits.trim_start_matches('0');
        if normalized.is_empty() {
            return Ok(FragmentNumber::default());
        }
        Ok(FragmentNumber(normalized.to_string()))
    }
}

impl From<u64> for FragmentNumber {
    fn from(value: u64) -> Self {
        FragmentNumber(value.to_string())
    }
}

impl Ord for FragmentNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for FragmentNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for FragmentNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
