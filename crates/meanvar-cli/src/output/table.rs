use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

use super::weight_rows;

/// Format output as tables using the tabled crate.
pub fn print_table(value: &Value) {
    print!("{}", render_table(value));
}

/// Render an envelope as: weights, scalar summary, per-asset moments and
/// covariance (when present), then warnings and methodology.
pub fn render_table(value: &Value) -> String {
    let mut out = String::new();

    let Value::Object(envelope) = value else {
        return format!("{}\n", format_value(value));
    };
    let Some(Value::Object(result)) = envelope.get("result") else {
        out.push_str(&field_table(envelope));
        return out;
    };

    if let Some(rows) = weight_rows(value) {
        let mut builder = Builder::default();
        builder.push_record(["Asset", "Weight"]);
        for (asset, weight) in rows {
            builder.push_record([asset, weight]);
        }
        out.push_str(&format!("{}\n\n", Table::from(builder)));
    }

    let scalars: Map<String, Value> = result
        .iter()
        .filter(|(_, v)| !v.is_array() && !v.is_object())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if !scalars.is_empty() {
        out.push_str(&field_table(&scalars));
    }

    if let Some(moments) = moments_table(result) {
        out.push('\n');
        out.push_str(&moments);
    }

    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            out.push_str("\nWarnings:\n");
            for w in warnings.iter().filter_map(|w| w.as_str()) {
                out.push_str(&format!("  - {}\n", w));
            }
        }
    }

    if let Some(Value::String(meth)) = envelope.get("methodology") {
        out.push_str(&format!("\nMethodology: {}\n", meth));
    }

    out
}

fn field_table(map: &Map<String, Value>) -> String {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (key, val) in map {
        builder.push_record([key.as_str(), &format_value(val)]);
    }
    format!("{}\n", Table::from(builder))
}

/// Mean and covariance rows keyed by asset, for statistics output.
fn moments_table(result: &Map<String, Value>) -> Option<String> {
    let assets: Vec<String> = result
        .get("assets")?
        .as_array()?
        .iter()
        .map(format_value)
        .collect();
    let mean = result.get("mean")?.as_array()?;
    let covariance = result.get("covariance")?.as_array()?;

    let mut header = vec!["Asset".to_string(), "Mean".to_string()];
    header.extend(assets.iter().cloned());

    let mut builder = Builder::default();
    builder.push_record(header);
    for (i, asset) in assets.iter().enumerate() {
        let mut row = vec![asset.clone(), mean.get(i).map(format_value).unwrap_or_default()];
        if let Some(Value::Array(cov_row)) = covariance.get(i) {
            row.extend(cov_row.iter().map(format_value));
        }
        builder.push_record(row);
    }
    Some(format!("{}\n", Table::from(builder)))
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(format_value).collect();
            items.join(", ")
        }
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_optimizer_envelope() {
        let v = json!({
            "result": {
                "weights": [{"asset": "AAA", "weight": "0.6"}, {"asset": "BBB", "weight": "0.4"}],
                "sharpe_ratio": "0.25",
                "degenerate_assets": []
            },
            "methodology": "m",
            "warnings": ["careful"]
        });
        let out = render_table(&v);
        assert!(out.contains("AAA"));
        assert!(out.contains("sharpe_ratio"));
        assert!(!out.contains("degenerate_assets"));
        assert!(out.contains("  - careful"));
        assert!(out.contains("Methodology: m"));
    }

    #[test]
    fn test_statistics_envelope() {
        let v = json!({
            "result": {
                "assets": ["X", "Y"],
                "mean": ["0.01", "0.02"],
                "covariance": [["0.1", "0.01"], ["0.01", "0.2"]],
                "observations": 10
            }
        });
        let out = render_table(&v);
        assert!(out.contains("Mean"));
        assert!(out.contains("0.2"));
        assert!(out.contains("observations"));
    }
}
