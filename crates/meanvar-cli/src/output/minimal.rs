use rust_decimal::Decimal;
use serde_json::Value;

use super::weight_rows;

/// Print just the key answer from the output.
///
/// Optimizer results print one `asset weight` line per held asset. Other
/// results fall back to well-known fields, then to the first field.
pub fn print_minimal(value: &Value) {
    print!("{}", render_minimal(value));
}

pub fn render_minimal(value: &Value) -> String {
    if let Some(rows) = weight_rows(value) {
        return rows
            .into_iter()
            .filter(|(_, w)| w.parse::<Decimal>().map_or(true, |w| !w.is_zero()))
            .map(|(asset, weight)| format!("{} {}\n", asset, weight))
            .collect();
    }

    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    let priority_keys = ["sharpe_ratio", "observations", "expected_return"];

    if let Value::Object(map) = result_obj {
        for key in &priority_keys {
            if let Some(val) = map.get(*key) {
                if !val.is_null() {
                    return format!("{}\n", format_minimal(val));
                }
            }
        }

        if let Some((key, val)) = map.iter().next() {
            return format!("{}: {}\n", key, format_minimal(val));
        }
    }

    format!("{}\n", format_minimal(result_obj))
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
