use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // local@domain.tld, no whitespace, single @
    static ref EMAIL_RE: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
}

const USERNAME_SPECIALS: &[char] = &['!', '@', '#', '$', '&', '*'];
const USERNAME_MIN_LEN: usize = 8;

pub fn is_valid_email(candidate: &str) -> bool {
    EMAIL_RE.is_match(candidate)
}

/// Username strength rule used for live feedback on the username field.
///
/// Accepts when the value is at least eight UTF-16 code units long (the length
/// a browser reports for the field) and contains an
/// ASCII uppercase letter, an ASCII digit and one of `! @ # $ & *`. Values
/// spanning more than one line are rejected.
pub fn is_strong_username(candidate: &str) -> bool {
    if candidate
        .chars()
        .any(|c| matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}'))
    {
        return false;
    }

    candidate.encode_utf16().count() >= USERNAME_MIN_LEN
        && candidate.chars().any(|c| c.is_ascii_uppercase())
        && candidate.chars().any(|c| c.is_ascii_digit())
        && candidate.chars().any(|c| USERNAME_SPECIALS.contains(&c))
}
