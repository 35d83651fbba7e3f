//! Request validation from column types and catalog rules.

use crate::config::{ResolvedResource, ValidationRule, ValueKind};
use crate::error::AppError;
use crate::tree::Row;
use regex::Regex;
use serde_json::Value;

pub struct RequestValidator;

impl RequestValidator {
    /// Validate a complete row for create. Every required column must be present and non-null.
    pub fn validate(body: &Row, resource: &ResolvedResource) -> Result<(), AppError> {
        for column in &resource.columns {
            if resource.is_managed(&column.name) {
                continue;
            }
            let val = body.get(&column.name);
            let rule = resource.validation.get(&column.name);
            if rule.and_then(|r| r.required) == Some(true) && val.map_or(true, Value::is_null) {
                return Err(AppError::Validation(format!("{} is required", column.name)));
            }
            if let Some(v) = val {
                validate_kind(&column.name, v, column.kind)?;
                if let Some(rule) = rule {
                    validate_field(&column.name, v, rule)?;
                }
            }
        }
        Ok(())
    }

    /// Validate only the fields present in body (for PUT/PATCH). Required is not enforced for missing
    /// fields, but a required field cannot be set to null.
    pub fn validate_partial(body: &Row, resource: &ResolvedResource) -> Result<(), AppError> {
        for (col, v) in body {
            let Some(column) = resource.column(col) else { continue };
            let rule = resource.validation.get(col);
            if v.is_null() && rule.and_then(|r| r.required) == Some(true) {
                return Err(AppError::Validation(format!("{} is required", col)));
            }
            validate_kind(col, v, column.kind)?;
            if let Some(rule) = rule {
                validate_field(col, v, rule)?;
            }
        }
        Ok(())
    }
}

fn validate_kind(col: &str, v: &Value, kind: ValueKind) -> Result<(), AppError> {
    let ok = match (kind, v) {
        (_, Value::Null) => true,
        (ValueKind::Uuid, Value::String(s)) => uuid::Uuid::parse_str(s).is_ok(),
        (ValueKind::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
        (ValueKind::Number, Value::Number(_)) => true,
        (ValueKind::Boolean, Value::Bool(_)) => true,
        (ValueKind::Text, Value::String(_)) => true,
        (ValueKind::Timestamp, Value::String(s)) => super::parse_time(s).is_some(),
        (ValueKind::Json, _) => true,
        _ => false,
    };
    if ok {
        return Ok(());
    }
    let expected = match kind {
        ValueKind::Uuid => "a UUID",
        ValueKind::Integer => "an integer",
        ValueKind::Number => "a number",
        ValueKind::Boolean => "a boolean",
        ValueKind::Text => "a string",
        ValueKind::Timestamp => "a timestamp",
        ValueKind::Json => "JSON",
    };
    Err(AppError::Validation(format!("{} must be {}", col, expected)))
}

fn validate_field(col: &str, v: &Value, rule: &ValidationRule) -> Result<(), AppError> {
    if v.is_null() {
        return Ok(());
    }
    if let Some(format) = &rule.format {
        validate_format(col, v, format)?;
    }
    if let Some(max) = rule.max_length {
        if let Some(s) = v.as_str() {
            if s.chars().count() > max as usize {
                return Err(AppError::Validation(format!(
                    "{} must be at most {} characters",
                    col, max
                )));
            }
        }
    }
    if let Some(min) = rule.min_length {
        if let Some(s) = v.as_str() {
            if s.chars().count() < min as usize {
                return Err(AppError::Validation(format!(
                    "{} must be at least {} characters",
                    col, min
                )));
            }
        }
    }
    if let Some(ref pattern) = rule.pattern {
        let re = Regex::new(pattern).map_err(|_| AppError::Validation(format!("invalid pattern for {}", col)))?;
        if let Some(s) = v.as_str() {
            if !re.is_match(s) {
                return Err(AppError::Validation(format!("{} does not match required pattern", col)));
            }
        }
    }
    if let Some(ref allowed) = rule.allowed {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            return Err(AppError::Validation(format!(
                "{} must be one of: {:?}",
                col,
                allowed.iter().take(5).collect::<Vec<_>>()
            )));
        }
    }
    if let Some(min) = rule.minimum {
        if let Some(n) = v.as_f64() {
            if n < min {
                return Err(AppError::Validation(format!("{} must be at least {}", col, min)));
            }
        }
    }
    if let Some(max) = rule.maximum {
        if let Some(n) = v.as_f64() {
            if n > max {
                return Err(AppError::Validation(format!("{} must be at most {}", col, max)));
            }
        }
    }
    Ok(())
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn validate_format(col: &str, v: &Value, format: &str) -> Result<(), AppError> {
    let Some(s) = v.as_str() else { return Ok(()) };
    match format.to_lowercase().as_str() {
        "email" => {
            let valid = s
                .split_once('@')
                .map_or(false, |(local, domain)| !local.is_empty() && domain.contains('.'));
            if !valid {
                return Err(AppError::Validation(format!("{} must be a valid email", col)));
            }
        }
        "uuid" => {
            if uuid::Uuid::parse_str(s).is_err() {
                return Err(AppError::Validation(format!("{} must be a valid UUID", col)));
            }
        }
        _ => {}
    }
    Ok(())
}
