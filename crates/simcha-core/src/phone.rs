//! Israeli phone number normalization and validation.
//!
//! The SMS gateway wants local format (`05xxxxxxxx`), WhatsApp wants the
//! international digits (`972xxxxxxxxx`). Both conversions are pure and
//! never fail; validation is a separate guard.

use regex::Regex;
use std::sync::LazyLock;

/// Israel country code, without the `+`.
pub const COUNTRY_CODE: &str = "972";

/// Local-form numbers: mobile `05x`/`07x` (10 digits) or landline
/// `02/03/04/08/09` (9 digits).
static LOCAL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0(?:[57]\d{8}|[23489]\d{7})$").expect("pattern is valid"));

fn strip_non_digits(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Normalize a raw phone string to local format.
///
/// Strips non-digit characters; a leading country code becomes a single
/// leading zero; an already-local number passes through unchanged; anything
/// else gets a zero prefixed.
pub fn format_local(raw: &str) -> String {
    let digits = strip_non_digits(raw);
    if let Some(rest) = digits.strip_prefix(COUNTRY_CODE) {
        format!("0{rest}")
    } else if digits.starts_with('0') {
        digits
    } else {
        format!("0{digits}")
    }
}

/// Whether the string is a plausible local number, after stripping dashes
/// and spaces. Used as a client-side guard before attempting a send.
pub fn is_valid(raw: &str) -> bool {
    let cleaned: String = raw.chars().filter(|c| !matches!(c, '-' | ' ')).collect();
    LOCAL_PATTERN.is_match(&cleaned)
}

/// Normalize to international digits (`972...`), or `None` when the number
/// fails the regional pattern.
pub fn to_international(raw: &str) -> Option<String> {
    let local = format_local(raw);
    if !is_valid(&local) {
        return None;
    }
    Some(format!("{COUNTRY_CODE}{}", &local[1..]))
}
