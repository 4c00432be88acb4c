//! Passport-index CSV loading.
//!
//! The dataset is a CSV file with header `Passport,Destination,Requirement`
//! (ISO-3 codes and a requirement token per row). Rows are read with the
//! `csv` crate and handed to the core normalizer; structurally broken CSV
//! (missing columns, bad quoting) fails the load, while semantically bad
//! rows are skipped and reported by the normalizer.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use visa_assist_core::models::RawVisaRow;
use visa_assist_core::normalize::{normalize_with_tolerance, NormalizeOutcome};

use crate::config::DatasetConfig;

/// Read raw rows from any CSV source.
pub fn read_rows<R: Read>(reader: R) -> Result<Vec<RawVisaRow>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut rows = Vec::new();
    for (i, record) in csv_reader.deserialize::<RawVisaRow>().enumerate() {
        // +2: 1-based, plus the header line
        let row = record.with_context(|| format!("Malformed dataset row at line {}", i + 2))?;
        rows.push(row);
    }
    Ok(rows)
}

/// Read raw rows from the CSV file at `path`.
pub fn read_rows_from_path(path: &Path) -> Result<Vec<RawVisaRow>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open dataset: {}", path.display()))?;
    read_rows(file)
}

/// Load and normalize the configured dataset, enforcing the rejection tolerance.
pub fn load_rules(config: &DatasetConfig) -> Result<NormalizeOutcome> {
    let rows = read_rows_from_path(&config.path)?;
    let outcome = normalize_with_tolerance(&rows, config.max_rejected_rows)?;

    tracing::info!(
        rows = rows.len(),
        rules = outcome.rules.len(),
        dropped = outcome.dropped,
        rejected = outcome.rejected.len(),
        path = %config.path.display(),
        "loaded dataset"
    );

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use visa_assist_core::Error;

    const SAMPLE: &str = "\
Passport,Destination,Requirement
USA,IND,visa required
USA,USA,-1
DEU,JPN,90
FRA,ZZZ,eta
";

    #[test]
    fn reads_header_mapped_rows() {
        let rows = read_rows(SAMPLE.as_bytes()).unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0], RawVisaRow::new("USA", "IND", "visa required"));
    }

    #[test]
    fn missing_column_is_structural_error() {
        let bad = "Passport,Destination\nUSA,IND\n";
        assert!(read_rows(bad.as_bytes()).is_err());
    }

    #[test]
    fn load_applies_tolerance() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("visa.csv");
        std::fs::write(&path, SAMPLE).unwrap();

        let mut config = DatasetConfig {
            path,
            source_tag: "passport-index-2025".into(),
            max_rejected_rows: 0,
        };
        let err = load_rules(&config).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::TooManyRejectedRows { rejected: 1, .. })
        ));

        config.max_rejected_rows = 1;
        let outcome = load_rules(&config).unwrap();
        assert_eq!(outcome.rules.len(), 2);
        assert_eq!(outcome.dropped, 1);
        assert_eq!(outcome.rejected.len(), 1);
    }
}
