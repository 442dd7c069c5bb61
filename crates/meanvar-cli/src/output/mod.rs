pub mod csv_out;
pub mod minimal;
pub mod table;
pub mod weights_file;

use crate::OutputFormat;
use serde_json::Value;

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(value) {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("JSON serialization error: {}", e),
        },
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}

/// The `result.weights` array of an optimizer envelope, if present.
pub(crate) fn weight_rows(value: &Value) -> Option<Vec<(String, String)>> {
    let rows = value.get("result")?.get("weights")?.as_array()?;
    rows.iter()
        .map(|row| {
            let asset = row.get("asset")?.as_str()?.to_string();
            let weight = match row.get("weight")? {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Some((asset, weight))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_weight_rows_accepts_string_and_number_weights() {
        let v = json!({"result": {"weights": [
            {"asset": "A", "weight": "0.75"},
            {"asset": "B", "weight": 0.25}
        ]}});
        assert_eq!(
            weight_rows(&v).unwrap(),
            vec![("A".to_string(), "0.75".to_string()), ("B".to_string(), "0.25".to_string())]
        );
        assert!(weight_rows(&json!({"result": {"mean": []}})).is_none());
    }
}
