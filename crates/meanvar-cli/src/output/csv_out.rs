use serde_json::Value;
use std::io::{self, Write};

use super::weight_rows;
use super::weights_file::write_weight_records;

/// Write output as CSV to stdout.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    if let Err(e) = write_csv(value, stdout.lock()) {
        eprintln!("CSV output error: {}", e);
    }
}

/// Optimizer results become the `asset,weight` table; statistics become one
/// row per asset with its mean and covariance row; anything else is written
/// as `field,value` pairs.
pub fn write_csv<W: Write>(value: &Value, out: W) -> Result<(), csv::Error> {
    if let Some(rows) = weight_rows(value) {
        return write_weight_records(csv::Writer::from_writer(out), rows);
    }

    let mut wtr = csv::Writer::from_writer(out);
    let result = value.get("result").unwrap_or(value);

    let moments = (
        result.get("assets").and_then(Value::as_array),
        result.get("mean").and_then(Value::as_array),
        result.get("covariance").and_then(Value::as_array),
    );
    if let (Some(assets), Some(mean), Some(covariance)) = moments {
        let mut header = vec!["asset".to_string(), "mean".to_string()];
        header.extend(assets.iter().map(format_csv_value));
        wtr.write_record(&header)?;
        for (i, asset) in assets.iter().enumerate() {
            let mut row = vec![
                format_csv_value(asset),
                mean.get(i).map(format_csv_value).unwrap_or_default(),
            ];
            if let Some(Value::Array(cov_row)) = covariance.get(i) {
                row.extend(cov_row.iter().map(format_csv_value));
            }
            wtr.write_record(&row)?;
        }
    } else if let Value::Object(map) = result {
        wtr.write_record(["field", "value"])?;
        for (key, val) in map {
            wtr.write_record([key.as_str(), &format_csv_value(val)])?;
        }
    } else {
        wtr.write_record([&format_csv_value(result)])?;
    }

    wtr.flush()?;
    Ok(())
}

fn format_csv_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
