use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref EMAIL: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
    static ref CODIGO: Regex = Regex::new(r"^[A-Z]{3}-\d{4}-\d{4}$").unwrap();
    static ref CODIGO_STRIP: Regex = Regex::new(r"[^A-Z0-9-]").unwrap();
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL.is_match(email)
}

/// Referral codes look like `HMD-2025-0000`.
pub fn is_valid_codigo(codigo: &str) -> bool {
    CODIGO.is_match(codigo)
}

/// Live formatting applied while the code is typed: uppercase, drop anything outside
/// `[A-Z0-9-]`, then insert the dashes once the letter and year groups are complete.
pub fn format_codigo_input(raw: &str) -> String {
    let upper = raw.to_uppercase();
    let mut value = CODIGO_STRIP.replace_all(&upper, "").into_owned();

    // Only ASCII survives the strip, so byte offsets are char offsets.
    if value.len() > 3 && !value.contains('-') {
        value = format!("{}-{}", &value[..3], &value[3..]);
    }
    if value.len() > 8 && value.split('-').count() == 2 {
        let (head, tail) = value.split_once('-').unwrap_or((value.as_str(), ""));
        value = if tail.len() > 4 {
            format!("{head}-{}-{}", &tail[..4], &tail[4..])
        } else {
            format!("{head}-{tail}-")
        };
    }
    value
}
