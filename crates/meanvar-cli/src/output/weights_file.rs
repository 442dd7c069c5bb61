use std::io::Write;
use std::path::Path;

use meanvar_core::AssetWeight;

/// Persist weights as a two-column `asset,weight` CSV.
pub fn write_weights(
    path: &Path,
    weights: &[AssetWeight],
) -> Result<(), Box<dyn std::error::Error>> {
    let wtr = csv::Writer::from_path(path)
        .map_err(|e| format!("Failed to create '{}': {}", path.display(), e))?;
    write_weight_records(
        wtr,
        weights
            .iter()
            .map(|aw| (aw.asset.clone(), aw.weight.to_string())),
    )?;
    tracing::info!(path = %path.display(), assets = weights.len(), "wrote weights file");
    Ok(())
}

/// Write `asset,weight` rows under a header to any CSV writer.
pub fn write_weight_records<W: Write>(
    mut wtr: csv::Writer<W>,
    rows: impl IntoIterator<Item = (String, String)>,
) -> Result<(), csv::Error> {
    wtr.write_record(["asset", "weight"])?;
    for (asset, weight) in rows {
        wtr.write_record([asset, weight])?;
    }
    wtr.flush()?;
    Ok(())
}
