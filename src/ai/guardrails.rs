//! Input screening applied before any user text reaches a prompt.
//!
//! Requests that try to steer the model away from its instructions are
//! rejected outright. Personal data is replaced with placeholders so it
//! never leaves the service.

use regex::{Regex, RegexSet};
use std::borrow::Cow;
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::error::AppError;
use crate::Result;

fn injection_patterns() -> &'static RegexSet {
    static SET: OnceLock<RegexSet> = OnceLock::new();
    SET.get_or_init(|| {
        RegexSet::new([
            r"(?i)ignore\s+(all\s+)?(the\s+)?previous\s+instructions",
            r"(?i)disregard\s+(all\s+)?(the\s+)?previous",
            r"(?i)forget\s+everything",
            r"(?i)system\s+prompt",
            r"(?i)<\s*script",
            r"(?i)javascript:",
            r"(?i)\b(eval|exec)\s*\(",
            r"__import__",
            r"(?i)\bsubprocess\b",
            r"(?i)os\.system",
        ])
        .expect("Invalid injection pattern defined in code")
    })
}

struct PiiRule {
    label: &'static str,
    pattern: &'static str,
}

// Order matters: card and SSN numbers would otherwise be partly taken by
// the phone rule.
const PII_RULES: &[PiiRule] = &[
    PiiRule { label: "EMAIL", pattern: r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b" },
    PiiRule { label: "CREDIT_CARD", pattern: r"\b\d{4}[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{4}\b" },
    PiiRule { label: "SSN", pattern: r"\b\d{3}-\d{2}-\d{4}\b" },
    PiiRule { label: "PHONE", pattern: r"\b\d{3}[-.\s]?\d{3}[-.\s]?\d{4}\b" },
];

fn pii_patterns() -> &'static [(&'static str, Regex)] {
    static RULES: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    RULES.get_or_init(|| {
        PII_RULES
            .iter()
            .map(|rule| {
                let re = Regex::new(rule.pattern).expect("Invalid PII pattern defined in code");
                (rule.label, re)
            })
            .collect()
    })
}

fn markup() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("Invalid markup pattern defined in code"))
}

/// Rejects text that tries to override the model's instructions.
pub fn screen(field: &str, text: &str) -> Result<()> {
    if let Some(index) = injection_patterns().matches(text).iter().next() {
        warn!(field, pattern = index, "AI request rejected by input screening");
        return Err(AppError::ValidationError(format!(
            "The {} contains instructions that cannot be processed",
            field
        )));
    }
    Ok(())
}

/// Replaces email addresses, card numbers, SSNs and phone numbers with
/// `[<KIND>_REDACTED]` and strips markup tags.
pub fn scrub(text: &str) -> Cow<'_, str> {
    let mut out = Cow::Borrowed(text);
    for (label, re) in pii_patterns() {
        if re.is_match(&out) {
            let count = re.find_iter(&out).count();
            info!(kind = *label, count, "Redacting personal data from AI input");
            let replacement = format!("[{}_REDACTED]", label);
            out = Cow::Owned(re.replace_all(&out, replacement.as_str()).into_owned());
        }
    }
    if markup().is_match(&out) {
        out = Cow::Owned(markup().replace_all(&out, "").into_owned());
    }
    out
}

/// Screens then scrubs one field, returning the text safe for a prompt.
pub fn sanitize(field: &str, text: &str) -> Result<String> {
    screen(field, text)?;
    Ok(scrub(text).into_owned())
}
