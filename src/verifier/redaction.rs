use regex::Regex;
use std::sync::OnceLock;
use tracing::error;

const PATTERNS: [(&str, &str); 4] = [
    (
        r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
        "[EMAIL_REDACTED]",
    ),
    (r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b", "[PHONE_REDACTED]"),
    (r"\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b", "[DOB_REDACTED]"),
    (r"\b\d{4}[/-]\d{1,2}[/-]\d{1,2}\b", "[DATE_REDACTED]"),
];

static COMPILED: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();

fn compiled() -> &'static [(Regex, &'static str)] {
    COMPILED.get_or_init(|| {
        PATTERNS
            .iter()
            .filter_map(|(pattern, replacement)| match Regex::new(pattern) {
                Ok(re) => Some((re, *replacement)),
                Err(e) => {
                    error!(pattern, error = %e, "Invalid redaction pattern");
                    None
                }
            })
            .collect()
    })
}

/// Replace email-, phone- and date-like substrings with placeholders.
///
/// Patterns apply in order: email, phone, day-first date, year-first date.
pub fn redact(text: &str) -> String {
    let mut result = text.to_string();
    for (re, replacement) in compiled() {
        result = re.replace_all(&result, *replacement).into_owned();
    }
    result
}
