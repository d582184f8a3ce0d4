use serde_json::Value;

/// A single source record: field name to JSON value.
pub type Record = serde_json::Map<String, Value>;

/// Resolves the identifier used to reference a record in anomaly samples.
///
/// Uses the value of `id_field` when it is present and non-null, otherwise the
/// record's absolute offset within its partition stream.
pub fn record_identifier(record: &Record, id_field: &str, offset: u64) -> String {
    match record.get(id_field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => offset.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Renders a non-null value the way rules and statistics see it.
///
/// Strings are used as-is (no surrounding quotes), everything else uses its
/// JSON representation.
pub fn stringify_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Interprets a value as a number: JSON numbers, or strings that parse as `f64`.
pub fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}
