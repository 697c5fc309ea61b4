//! Declarative request validation.
//!
//! Tool-call arguments are screened against a static per-tool schema before
//! any handler sees them. Validation failures are returned as structured
//! error lists, never thrown; callers decide what to do with a rejected call.

pub mod security;

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::metrics::BridgeMetrics;
use security::{sanitize, scan};

/// A validation pass slower than this appends a performance warning.
const SLOW_VALIDATION: Duration = Duration::from_millis(100);

// =============================================================================
// Field types and rules
// =============================================================================

/// Primitive type expected for a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Array,
    Object,
    /// ISO calendar date, `YYYY-MM-DD`.
    Date,
    Email,
    Url,
}

impl FieldType {
    /// Validate a JSON value against this type.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        match self {
            FieldType::String => {
                if value.is_string() {
                    Ok(())
                } else {
                    Err(format!("expected string, got {}", value_type_name(value)))
                }
            }
            FieldType::Number => {
                if value.is_number() {
                    Ok(())
                } else {
                    Err(format!("expected number, got {}", value_type_name(value)))
                }
            }
            FieldType::Boolean => {
                if value.is_boolean() {
                    Ok(())
                } else {
                    Err(format!("expected boolean, got {}", value_type_name(value)))
                }
            }
            FieldType::Array => {
                if value.is_array() {
                    Ok(())
                } else {
                    Err(format!("expected array, got {}", value_type_name(value)))
                }
            }
            FieldType::Object => {
                if value.is_object() {
                    Ok(())
                } else {
                    Err(format!("expected object, got {}", value_type_name(value)))
                }
            }
            FieldType::Date => match value.as_str() {
                Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .map(|_| ())
                    .map_err(|_| format!("expected ISO date (YYYY-MM-DD), got '{s}'")),
                None => Err(format!("expected date string, got {}", value_type_name(value))),
            },
            FieldType::Email => match value.as_str() {
                Some(s) => {
                    if email_pattern().is_match(s) {
                        Ok(())
                    } else {
                        Err("expected a valid email address".to_string())
                    }
                }
                None => Err(format!("expected email string, got {}", value_type_name(value))),
            },
            FieldType::Url => match value.as_str() {
                Some(s) => match url::Url::parse(s) {
                    Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
                    Ok(parsed) => Err(format!("unsupported url scheme '{}'", parsed.scheme())),
                    Err(_) => Err("expected a valid http(s) url".to_string()),
                },
                None => Err(format!("expected url string, got {}", value_type_name(value))),
            },
        }
    }
}

fn email_pattern() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").unwrap())
}

fn value_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Custom per-field predicate. Plain function pointer so rules stay `Clone`
/// and const-constructible.
pub type CustomCheck = fn(&Value) -> Result<(), String>;

/// Declarative rule for one schema field.
#[derive(Debug, Clone)]
pub struct ValidationRule {
    pub required: bool,
    pub field_type: FieldType,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub pattern: Option<Regex>,
    pub allowed_values: Option<Vec<Value>>,
    pub custom: Option<CustomCheck>,
    pub sanitize: bool,
}

impl ValidationRule {
    pub fn required(field_type: FieldType) -> Self {
        Self {
            required: true,
            field_type,
            min_length: None,
            max_length: None,
            min: None,
            max: None,
            pattern: None,
            allowed_values: None,
            custom: None,
            sanitize: false,
        }
    }

    pub fn optional(field_type: FieldType) -> Self {
        Self {
            required: false,
            ..Self::required(field_type)
        }
    }

    pub fn with_length(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.min_length = min;
        self.max_length = max;
        self
    }

    pub fn with_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn with_pattern(mut self, pattern: &str) -> Self {
        // Schemas are declared once at startup; a bad pattern is a programmer
        // error surfaced immediately, not a runtime condition.
        self.pattern =
            Some(Regex::new(pattern).unwrap_or_else(|e| panic!("invalid rule pattern: {e}")));
        self
    }

    pub fn with_allowed_values(mut self, values: Vec<Value>) -> Self {
        self.allowed_values = Some(values);
        self
    }

    pub fn with_custom(mut self, check: CustomCheck) -> Self {
        self.custom = Some(check);
        self
    }

    pub fn sanitized(mut self) -> Self {
        self.sanitize = true;
        self
    }
}

/// Ordered field-name → rule mapping, declared once per tool.
#[derive(Debug, Clone, Default)]
pub struct ValidationSchema {
    fields: Vec<(String, ValidationRule)>,
}

impl ValidationSchema {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn field(mut self, name: impl Into<String>, rule: ValidationRule) -> Self {
        self.fields.push((name.into(), rule));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, ValidationRule)> {
        self.fields.iter()
    }
}

// =============================================================================
// Validation report
// =============================================================================

/// Result of one validation pass.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub sanitized_data: Map<String, Value>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// Convert a failed report into the taxonomy error handed back to the
    /// tool caller. Structured error lists only, never stack traces.
    pub fn into_error(self, tool_name: &str) -> Option<crate::types::BridgeError> {
        if self.is_valid {
            return None;
        }
        Some(
            crate::types::BridgeError::invalid_tool_params(format!(
                "invalid arguments for {tool_name}"
            ))
            .with_details(serde_json::json!({
                "errors": self.errors,
                "warnings": self.warnings,
            }))
            .ensure_correlation_id(),
        )
    }
}

// =============================================================================
// Validator
// =============================================================================

/// Validates and sanitizes structured tool-call arguments.
#[derive(Debug)]
pub struct RequestValidator {
    metrics: Arc<BridgeMetrics>,
}

impl RequestValidator {
    pub fn new(metrics: Arc<BridgeMetrics>) -> Self {
        Self { metrics }
    }

    /// Validate `args` for `tool_name` against `schema`.
    ///
    /// Per field: presence, type, security scan (threats reject the field),
    /// optional sanitization (warned, counted), length/range/pattern/allowed
    /// set/custom checks. Keys absent from the schema produce warnings, not
    /// errors. The final (possibly sanitized) value of every present field is
    /// returned in `sanitized_data` regardless of whether the field errored.
    pub fn validate(
        &self,
        tool_name: &str,
        args: &Value,
        schema: &ValidationSchema,
    ) -> ValidationReport {
        let started = Instant::now();
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut sanitized_data = Map::new();
        let mut threat_count: u64 = 0;

        match args.as_object() {
            None => errors.push("arguments must be a JSON object".to_string()),
            Some(obj) => {
                for (name, rule) in schema.iter() {
                    let value = match obj.get(name) {
                        Some(v) if !is_absent(v) => v,
                        _ => {
                            if rule.required {
                                errors.push(format!("{name} is required"));
                            }
                            continue;
                        }
                    };

                    if let Err(e) = rule.field_type.check(value) {
                        errors.push(format!("{name}: {e}"));
                        continue;
                    }

                    let mut field_threats = Vec::new();
                    let mut final_value = value.clone();
                    match value {
                        Value::String(s) => {
                            let check = security::screen(s, rule.sanitize, rule.max_length);
                            field_threats = check.threats;
                            if let Some(cleaned) = check.sanitized_value {
                                if cleaned != *s {
                                    warnings.push(format!("{name} was sanitized"));
                                    self.metrics.validation.record_sanitization();
                                }
                                final_value = Value::String(cleaned);
                            }
                        }
                        Value::Array(_) => {
                            field_threats = scan_value(value);
                            if rule.sanitize {
                                let cleaned = sanitize_value(value, rule.max_length);
                                if cleaned != final_value {
                                    warnings.push(format!("{name} was sanitized"));
                                    self.metrics.validation.record_sanitization();
                                    final_value = cleaned;
                                }
                            }
                        }
                        _ => {}
                    }

                    if !field_threats.is_empty() {
                        threat_count += field_threats.len() as u64;
                        errors.push(format!("{name} rejected: {}", field_threats.join("; ")));
                    }

                    apply_bounds(name, rule, &final_value, &mut errors);
                    sanitized_data.insert(name.clone(), final_value);
                }

                for key in obj.keys() {
                    if !schema.contains(key) {
                        warnings.push(format!("unknown field ignored: {key}"));
                    }
                }
            }
        }

        let elapsed = started.elapsed();
        if elapsed > SLOW_VALIDATION {
            warnings.push(format!(
                "validation took {}ms (threshold {}ms)",
                elapsed.as_millis(),
                SLOW_VALIDATION.as_millis(),
            ));
            self.metrics.validation.record_performance_warning();
        }

        let is_valid = errors.is_empty();
        self.metrics.validation.record_validation(is_valid);
        self.metrics.validation.record_security_threats(threat_count);

        if !is_valid {
            tracing::warn!(
                tool = tool_name,
                threats = threat_count,
                "validation failed: {:?}",
                errors,
            );
        } else {
            tracing::debug!(tool = tool_name, "validation passed");
        }

        ValidationReport {
            is_valid,
            errors,
            sanitized_data,
            warnings,
        }
    }
}

/// Absent for presence purposes: missing, null, or an empty string.
fn is_absent(value: &Value) -> bool {
    value.is_null() || value.as_str().is_some_and(str::is_empty)
}

/// Collect scan threats from a scalar string or the string elements of an
/// array. Non-string values carry no injectable text.
fn scan_value(value: &Value) -> Vec<String> {
    let mut threats = Vec::new();
    match value {
        Value::String(s) => threats.extend(scan(s).threats),
        Value::Array(items) => {
            for item in items {
                if let Value::String(s) = item {
                    threats.extend(scan(s).threats);
                }
            }
        }
        _ => {}
    }
    threats
}

fn sanitize_value(value: &Value, max_length: Option<usize>) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize(s, max_length)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Value::String(sanitize(s, max_length)),
                    other => other.clone(),
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

fn apply_bounds(name: &str, rule: &ValidationRule, value: &Value, errors: &mut Vec<String>) {
    if let Some(s) = value.as_str() {
        let len = s.chars().count();
        if let Some(min) = rule.min_length {
            if len < min {
                errors.push(format!("{name} must be at least {min} characters"));
            }
        }
        if let Some(max) = rule.max_length {
            if len > max {
                errors.push(format!("{name} must be at most {max} characters"));
            }
        }
        if let Some(pattern) = &rule.pattern {
            if !pattern.is_match(s) {
                errors.push(format!("{name} does not match the expected format"));
            }
        }
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = rule.min {
            if n < min {
                errors.push(format!("{name} must be >= {min}"));
            }
        }
        if let Some(max) = rule.max {
            if n > max {
                errors.push(format!("{name} must be <= {max}"));
            }
        }
    }

    if let Some(allowed) = &rule.allowed_values {
        if !allowed.contains(value) {
            errors.push(format!("{name} is not one of the allowed values"));
        }
    }

    if let Some(check) = rule.custom {
        if let Err(e) = check(value) {
            errors.push(format!("{name}: {e}"));
        }
    }
}

// =============================================================================
// Tool schemas
// =============================================================================

fn all_api_names(value: &Value) -> Result<(), String> {
    let Some(items) = value.as_array() else {
        return Err("expected an array".to_string());
    };
    if items.is_empty() {
        return Err("at least one entry required".to_string());
    }
    if items.len() > 10 {
        return Err("at most 10 entries allowed".to_string());
    }
    for item in items {
        match item.as_str() {
            Some(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') => {}
            Some(s) => return Err(format!("'{s}' is not a valid API name")),
            None => return Err("entries must be strings".to_string()),
        }
    }
    Ok(())
}

/// Schema for the analytics report query tool.
pub fn query_analytics_schema() -> ValidationSchema {
    ValidationSchema::new()
        .field(
            "propertyId",
            ValidationRule::required(FieldType::String)
                .with_length(Some(1), Some(32))
                .with_pattern(r"^\d+$")
                .sanitized(),
        )
        .field("startDate", ValidationRule::required(FieldType::Date))
        .field("endDate", ValidationRule::required(FieldType::Date))
        .field(
            "metrics",
            ValidationRule::required(FieldType::Array).with_custom(all_api_names),
        )
        .field(
            "dimensions",
            ValidationRule::optional(FieldType::Array).with_custom(all_api_names),
        )
        .field(
            "limit",
            ValidationRule::optional(FieldType::Number).with_range(Some(1.0), Some(250_000.0)),
        )
}
