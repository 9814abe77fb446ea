//! Austrian social insurance number (SVNR) validation.
//!
//! Validation is a pure, total function over arbitrary strings: formatting
//! characters are stripped, the remaining digits are length-checked and the
//! tenth digit is compared against the weighted mod-11 checksum of the first
//! nine. Uniqueness against stored numbers is a caller policy and lives with
//! the record owners (see `workflows::employees` and [`audit`]).

pub mod audit;

use serde::{Deserialize, Serialize};

pub use audit::{audit_reader, AuditReport, AuditRow};

/// Number of digits in a well-formed SVNR.
pub const SVNR_LENGTH: usize = 10;

const WEIGHTS: [u32; 9] = [3, 7, 9, 5, 8, 4, 2, 1, 6];

/// Digit counts after which a display separator is inserted (`XX XXXX XX XX`).
const DISPLAY_GROUP_BREAKS: [usize; 3] = [2, 6, 8];

/// Reason an SVNR was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SvnrError {
    #[error("SVNR must contain exactly 10 digits (found {found})")]
    WrongLength { found: usize },
    #[error("SVNR check digit mismatch (expected {expected}, found {found})")]
    ChecksumMismatch { expected: u8, found: u8 },
    #[error("SVNR is already assigned to {holder}")]
    DuplicateNumber { holder: String },
}

impl SvnrError {
    pub const fn label(&self) -> &'static str {
        match self {
            SvnrError::WrongLength { .. } => "wrong_length",
            SvnrError::ChecksumMismatch { .. } => "checksum_mismatch",
            SvnrError::DuplicateNumber { .. } => "duplicate_number",
        }
    }
}

/// Outcome of a single validation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub normalized: String,
    pub valid: bool,
    pub reason: Option<SvnrError>,
}

impl ValidationResult {
    fn accepted(normalized: String) -> Self {
        Self {
            normalized,
            valid: true,
            reason: None,
        }
    }

    fn rejected(normalized: String, reason: SvnrError) -> Self {
        Self {
            normalized,
            valid: false,
            reason: Some(reason),
        }
    }

    /// Downgrade an otherwise valid result because another record holds the number.
    pub fn into_duplicate(self, holder: impl Into<String>) -> Self {
        Self::rejected(
            self.normalized,
            SvnrError::DuplicateNumber {
                holder: holder.into(),
            },
        )
    }

    /// Convert into a `Result`, yielding the normalized number on success.
    pub fn into_result(self) -> Result<String, SvnrError> {
        match self.reason {
            Some(reason) => Err(reason),
            None => Ok(self.normalized),
        }
    }
}

/// Validate a raw SVNR candidate.
///
/// Never fails: every input produces a structured result. `normalized` holds
/// at most the first ten digits of the input; the length check runs against
/// the full digit count so overlong input still reports `WrongLength`.
pub fn validate(raw: &str) -> ValidationResult {
    let digits: Vec<u8> = raw
        .bytes()
        .filter(u8::is_ascii_digit)
        .map(|byte| byte - b'0')
        .collect();
    let normalized = render_digits(&digits[..digits.len().min(SVNR_LENGTH)]);

    if digits.len() != SVNR_LENGTH {
        return ValidationResult::rejected(
            normalized,
            SvnrError::WrongLength {
                found: digits.len(),
            },
        );
    }

    let expected = check_digit(&digits);
    let found = digits[SVNR_LENGTH - 1];
    if expected == found {
        ValidationResult::accepted(normalized)
    } else {
        ValidationResult::rejected(normalized, SvnrError::ChecksumMismatch { expected, found })
    }
}

/// Shorthand for `validate(raw).valid`.
pub fn is_valid(raw: &str) -> bool {
    validate(raw).valid
}

/// Weighted mod-11 check digit over the first nine digits; a remainder of 10 maps to 0.
fn check_digit(digits: &[u8]) -> u8 {
    let sum: u32 = digits
        .iter()
        .zip(WEIGHTS)
        .map(|(&digit, weight)| u32::from(digit) * weight)
        .sum();

    match sum % 11 {
        10 => 0,
        remainder => remainder as u8,
    }
}

/// Group the digits of `raw` for display as `XX XXXX XX XX`.
///
/// Partial input is grouped as far as it goes and anything past ten digits is
/// dropped, so the output is stable when re-applied on every keystroke.
pub fn format_display(raw: &str) -> String {
    let mut formatted = String::with_capacity(SVNR_LENGTH + DISPLAY_GROUP_BREAKS.len());
    let digits = raw.chars().filter(char::is_ascii_digit).take(SVNR_LENGTH);

    for (index, digit) in digits.enumerate() {
        if DISPLAY_GROUP_BREAKS.contains(&index) {
            formatted.push(' ');
        }
        formatted.push(digit);
    }

    formatted
}

fn render_digits(digits: &[u8]) -> String {
    digits.iter().map(|digit| char::from(b'0' + digit)).collect()
}
