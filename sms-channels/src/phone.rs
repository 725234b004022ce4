//! Phone number canonicalization, validation, and log masking.
//!
//! Numbers are stored and compared in a canonical `+`-prefixed form. Anything
//! written to a log goes through [`mask`] first; full numbers never appear in
//! log output.

const MIN_DIGITS: usize = 7;
const MAX_DIGITS: usize = 15;

const MASK_PREFIX_LEN: usize = 4;
const MASK_SUFFIX_LEN: usize = 2;

/// Normalize a number to canonical form: strip separators, fold a leading
/// `00` into `+`, keep an existing `+`.
pub fn canonicalize(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut digits: String = trimmed
        .chars()
        .filter(|ch| ch.is_ascii_digit())
        .collect();
    if let Some(rest) = digits.strip_prefix("00") {
        digits = rest.to_string();
        return format!("+{digits}");
    }
    if trimmed.starts_with('+') {
        return format!("+{digits}");
    }
    digits
}

/// E.164-like validation over the canonical form: optional `+`, 7 to 15
/// digits, first digit non-zero.
pub fn is_valid(number: &str) -> bool {
    let digits = number.strip_prefix('+').unwrap_or(number);
    if digits.len() < MIN_DIGITS || digits.len() > MAX_DIGITS {
        return false;
    }
    if !digits.chars().all(|ch| ch.is_ascii_digit()) {
        return false;
    }
    !digits.starts_with('0')
}

/// Mask a number for logging: fixed-length prefix and suffix visible,
/// asterisks in between. Numbers too short to mask meaningfully are fully
/// hidden.
pub fn mask(number: &str) -> String {
    let chars: Vec<char> = number.chars().collect();
    if chars.len() <= MASK_PREFIX_LEN + MASK_SUFFIX_LEN {
        return "*".repeat(chars.len().max(3));
    }
    let prefix: String = chars[..MASK_PREFIX_LEN].iter().collect();
    let suffix: String = chars[chars.len() - MASK_SUFFIX_LEN..].iter().collect();
    let hidden = chars.len() - MASK_PREFIX_LEN - MASK_SUFFIX_LEN;
    format!("{prefix}{}{suffix}", "*".repeat(hidden))
}
