//! Filters registered on top of minijinja's builtins

use minijinja::value::Value;
use minijinja::{Error, ErrorKind};
use regex::Regex;

fn as_f64(value: &Value) -> Option<f64> {
    if let Some(s) = value.as_str() {
        return s.trim().parse().ok();
    }
    if value.is_number() {
        return f64::try_from(value.clone()).ok();
    }
    None
}

fn conversion_error(value: &Value, target: &str) -> Error {
    Error::new(
        ErrorKind::InvalidOperation,
        format!("cannot convert {value:?} to {target} and no default was given"),
    )
}

/// `value | float(default)`; strings are parsed.
pub fn to_float(value: Value, default: Option<Value>) -> Result<Value, Error> {
    match as_f64(&value) {
        Some(n) => Ok(Value::from(n)),
        None => default.ok_or_else(|| conversion_error(&value, "float")),
    }
}

/// `value | int(default)`; floats truncate toward zero.
pub fn to_int(value: Value, default: Option<Value>) -> Result<Value, Error> {
    if let Some(i) = value.as_i64() {
        return Ok(Value::from(i));
    }
    match as_f64(&value) {
        Some(n) if n.is_finite() => Ok(Value::from(n.trunc() as i64)),
        _ => default.ok_or_else(|| conversion_error(&value, "int")),
    }
}

pub fn round(value: Value, precision: Option<i32>) -> Result<Value, Error> {
    let n = as_f64(&value).ok_or_else(|| conversion_error(&value, "float"))?;
    let factor = 10f64.powi(precision.unwrap_or(0));
    Ok(Value::from((n * factor).round() / factor))
}

pub fn slugify(value: &str) -> String {
    ha_core::slugify(value)
}

pub fn to_json(value: Value) -> Result<String, Error> {
    serde_json::to_string(&value)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))
}

pub fn from_json(value: &str) -> Result<Value, Error> {
    let parsed: serde_json::Value = serde_json::from_str(value)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;
    Ok(Value::from_serialize(&parsed))
}

pub fn regex_replace(value: &str, find: &str, replace: &str) -> Result<String, Error> {
    let re = Regex::new(find)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, format!("bad pattern: {e}")))?;
    Ok(re.replace_all(value, replace).into_owned())
}
