//! CSV-backed returns provider.
//!
//! Layout: the first column holds the observation date (header name is
//! ignored), every other column is one asset's periodic simple returns.
//! Empty and `nan` cells are missing data.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::str::FromStr;

use meanvar_core::returns::{
    ProvidedReturns, ReturnObservation, ReturnsProvider, ReturnsRequest, ReturnsTable,
};
use meanvar_core::{MeanVarError, MeanVarResult};

/// Reads a returns table from a CSV file on every request.
#[derive(Debug, Clone)]
pub struct CsvReturnsProvider {
    path: PathBuf,
}

impl CsvReturnsProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ReturnsProvider for CsvReturnsProvider {
    fn returns_table(&self, request: &ReturnsRequest) -> MeanVarResult<ProvidedReturns> {
        let file = File::open(&self.path).map_err(|e| {
            MeanVarError::DataSource(format!(
                "Failed to open returns CSV '{}': {}",
                self.path.display(),
                e
            ))
        })?;
        let provided = load_returns(file, request)?;
        tracing::info!(
            path = %self.path.display(),
            assets = provided.table.n_assets(),
            observations = provided.table.n_observations(),
            dropped_assets = provided.dropped_assets.len(),
            dropped_rows = provided.dropped_rows,
            "loaded returns table"
        );
        Ok(provided)
    }
}

/// A parsed row restricted to the selected columns.
struct RawRow {
    line: usize,
    date: NaiveDate,
    cells: Vec<Option<Decimal>>,
}

/// Parse CSV returns and apply the request's universe and date range.
pub fn load_returns<R: Read>(
    reader: R,
    request: &ReturnsRequest,
) -> MeanVarResult<ProvidedReturns> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| MeanVarError::DataSource(format!("Failed to read CSV headers: {}", e)))?
        .clone();
    if headers.len() < 2 {
        return Err(MeanVarError::DataSource(
            "Returns CSV needs a date column and at least one asset column".into(),
        ));
    }
    let file_assets: Vec<String> = headers.iter().skip(1).map(|h| h.to_string()).collect();
    let mut seen = HashSet::new();
    if let Some(dup) = file_assets.iter().find(|a| !seen.insert(a.as_str())) {
        return Err(MeanVarError::DataSource(format!(
            "Duplicate asset column '{}'",
            dup
        )));
    }

    let mut warnings = Vec::new();
    let mut dropped_assets = Vec::new();

    // Column positions (within file_assets) of the requested universe
    let selected: Vec<usize> = match &request.universe {
        None => (0..file_assets.len()).collect(),
        Some(universe) => {
            let mut cols = Vec::with_capacity(universe.len());
            for asset in universe {
                match file_assets.iter().position(|a| a == asset) {
                    Some(j) if !cols.contains(&j) => cols.push(j),
                    Some(_) => {}
                    None => dropped_assets.push(asset.clone()),
                }
            }
            if !dropped_assets.is_empty() {
                tracing::warn!(
                    assets = ?dropped_assets,
                    "requested assets missing from returns file"
                );
                warnings.push(format!(
                    "No return data found for: {}",
                    dropped_assets.join(", ")
                ));
            }
            cols
        }
    };

    let mut rows: Vec<RawRow> = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let line = idx + 2;
        let record = record.map_err(|e| {
            MeanVarError::DataSource(format!("CSV parse error on line {}: {}", line, e))
        })?;
        let raw_date = record.get(0).unwrap_or_default();
        let date = parse_date(raw_date).ok_or_else(|| {
            MeanVarError::DataSource(format!("Unparseable date '{}' on line {}", raw_date, line))
        })?;
        if request.start.map_or(false, |s| date < s) || request.end.map_or(false, |e| date > e) {
            continue;
        }

        let mut cells = Vec::with_capacity(selected.len());
        for &j in &selected {
            let raw = record.get(j + 1).unwrap_or_default();
            let cell = parse_return(raw).map_err(|reason| {
                MeanVarError::DataSource(format!(
                    "Bad return '{}' for {} on line {}: {}",
                    raw, file_assets[j], line, reason
                ))
            })?;
            cells.push(cell);
        }
        rows.push(RawRow { line, date, cells });
    }

    rows.sort_by_key(|r| r.date);
    if let Some(pair) = rows.windows(2).find(|p| p[0].date == p[1].date) {
        return Err(MeanVarError::DataSource(format!(
            "Duplicate date {} on lines {} and {}",
            pair[0].date, pair[0].line, pair[1].line
        )));
    }

    // Coverage per selected asset inside the date range
    let mut kept: Vec<usize> = Vec::new();
    let mut empty = Vec::new();
    let mut partial_assets = Vec::new();
    for (k, &j) in selected.iter().enumerate() {
        let present = rows.iter().filter(|r| r.cells[k].is_some()).count();
        if present == 0 {
            empty.push(file_assets[j].clone());
        } else {
            if present < rows.len() {
                partial_assets.push(file_assets[j].clone());
                warnings.push(format!(
                    "{} has {} of {} observations; incomplete rows are dropped",
                    file_assets[j],
                    present,
                    rows.len()
                ));
            }
            kept.push(k);
        }
    }
    if !empty.is_empty() {
        tracing::warn!(assets = ?empty, "dropping assets with no observations in range");
        warnings.push(format!(
            "Dropped assets with no observations in range: {}",
            empty.join(", ")
        ));
        dropped_assets.extend(empty);
    }
    if kept.is_empty() {
        return Err(MeanVarError::DataSource(
            "No asset has any observation in the requested range".into(),
        ));
    }

    // Listwise deletion over the kept assets
    let total_rows = rows.len();
    let observations: Vec<ReturnObservation> = rows
        .into_iter()
        .filter_map(|row| {
            let returns: Option<Vec<Decimal>> = kept.iter().map(|&k| row.cells[k]).collect();
            returns.map(|returns| ReturnObservation {
                date: Some(row.date),
                returns,
            })
        })
        .collect();
    let dropped_rows = total_rows - observations.len();
    if dropped_rows > 0 {
        warnings.push(format!(
            "Dropped {} of {} rows with missing returns",
            dropped_rows, total_rows
        ));
    }

    let assets = kept.iter().map(|&k| file_assets[selected[k]].clone()).collect();
    let table = ReturnsTable::new(assets, observations)?;

    Ok(ProvidedReturns {
        table,
        dropped_assets,
        partial_assets,
        dropped_rows,
        warnings,
    })
}

/// Dates as `YYYY-MM-DD`, optionally followed by a time and UTC offset.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(d);
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.date());
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%dT%H:%M:%S%:z"] {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return Some(dt.date_naive());
        }
    }
    None
}

/// `Ok(None)` for missing cells; decimal or scientific notation otherwise.
fn parse_return(raw: &str) -> Result<Option<Decimal>, String> {
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") || raw.eq_ignore_ascii_case("na") {
        return Ok(None);
    }
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map(Some)
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use std::io::Write;

    const SAMPLE: &str = "\
Date,AAA,BBB,CCC,DDD
2024-01-03,0.01,0.02,,0.001
2024-01-02,-0.01,0.01,,
2024-01-04,0.02,1e-3,,0.002
2024-01-05,0.00,-0.02,,0.003
";

    fn load(body: &str, request: &ReturnsRequest) -> MeanVarResult<ProvidedReturns> {
        load_returns(body.as_bytes(), request)
    }

    fn names(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_full_file_sorted_and_cleaned() {
        let p = load(SAMPLE, &ReturnsRequest::default()).unwrap();

        assert_eq!(p.table.assets(), &names(&["AAA", "BBB", "DDD"])[..]);
        assert_eq!(p.dropped_assets, names(&["CCC"]));
        assert_eq!(p.partial_assets, names(&["DDD"]));
        // 2024-01-02 has no DDD value
        assert_eq!(p.dropped_rows, 1);
        assert_eq!(p.table.n_observations(), 3);
        assert_eq!(
            p.table.observations()[0].date,
            NaiveDate::from_ymd_opt(2024, 1, 3)
        );
        assert_eq!(p.table.value(1, "BBB"), Some(dec!(0.001)));
        assert_eq!(p.warnings.len(), 3);
    }

    #[test]
    fn test_universe_filter_and_missing_asset() {
        let request = ReturnsRequest {
            universe: Some(names(&["BBB", "ZZZ", "AAA"])),
            ..ReturnsRequest::default()
        };
        let p = load(SAMPLE, &request).unwrap();
        assert_eq!(p.table.assets(), &names(&["BBB", "AAA"])[..]);
        assert_eq!(p.dropped_assets, names(&["ZZZ"]));
        assert_eq!(p.table.n_observations(), 4);
        assert_eq!(p.dropped_rows, 0);
        assert!(p.warnings[0].contains("ZZZ"));
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let request = ReturnsRequest {
            universe: Some(names(&["AAA"])),
            start: NaiveDate::from_ymd_opt(2024, 1, 3),
            end: NaiveDate::from_ymd_opt(2024, 1, 4),
        };
        let p = load(SAMPLE, &request).unwrap();
        assert_eq!(p.table.column(0), vec![dec!(0.01), dec!(0.02)]);
    }

    #[test]
    fn test_timestamps_with_offsets_accepted() {
        let body = "Date,X\n\
                    2024-01-02 00:00:00+00:00,0.01\n\
                    2024-01-03T00:00:00,nan\n\
                    2024-01-04,0.02\n";
        let p = load(body, &ReturnsRequest::default()).unwrap();
        assert_eq!(p.table.n_observations(), 2);
        assert_eq!(p.partial_assets, names(&["X"]));
    }

    #[test]
    fn test_only_empty_assets_is_an_error() {
        let body = "Date,X\n2024-01-02,\n2024-01-03,\n";
        let err = load(body, &ReturnsRequest::default()).unwrap_err();
        assert!(matches!(err, MeanVarError::DataSource(_)));
    }

    #[test]
    fn test_bad_cell_reports_line() {
        let body = "Date,X\n2024-01-02,0.01\n2024-01-03,abc\n";
        let err = load(body, &ReturnsRequest::default()).unwrap_err();
        assert!(err.to_string().contains("line 3"), "{}", err);
    }

    #[test]
    fn test_duplicate_dates_rejected() {
        let body = "Date,X\n2024-01-02,0.01\n2024-01-02,0.02\n";
        let err = load(body, &ReturnsRequest::default()).unwrap_err();
        assert!(err.to_string().contains("Duplicate date"));
    }

    #[test]
    fn test_provider_reads_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(SAMPLE.as_bytes()).unwrap();
        let provider = CsvReturnsProvider::new(f.path());
        let p = provider.returns_table(&ReturnsRequest::default()).unwrap();
        assert_eq!(p.table.n_assets(), 3);

        let missing = CsvReturnsProvider::new("/no/such/returns.csv");
        assert!(matches!(
            missing.returns_table(&ReturnsRequest::default()),
            Err(MeanVarError::DataSource(_))
        ));
    }
}
