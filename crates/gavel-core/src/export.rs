//! CSV artifact writer: dedupe, deterministic order, timestamped filename.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::ScrapeError;
use crate::record::{Record, Source, CSV_HEADER};

/// Write the run's records to `{source}_auctions_{YYYY-MM-DD_HH-MM-SS}.csv`
/// under `out_dir` and return the artifact path.
///
/// Records are deduplicated by `property_url` (last write wins when the
/// same listing was extracted twice) and emitted sorted by `property_url`
/// so repeated runs over identical data produce identical artifacts. A run
/// with zero records still writes the header.
pub fn export(
    records: &[Record],
    out_dir: &Path,
    source: Source,
    stamp: DateTime<Utc>,
) -> Result<PathBuf, ScrapeError> {
    // BTreeMap gives both dedupe and the sorted output order.
    let mut unique: BTreeMap<&str, &Record> = BTreeMap::new();
    for record in records {
        unique.insert(record.property_url.as_str(), record);
    }

    let filename = format!(
        "{}_auctions_{}.csv",
        source.file_stem(),
        stamp.format("%Y-%m-%d_%H-%M-%S")
    );
    let path = out_dir.join(filename);

    std::fs::create_dir_all(out_dir)
        .map_err(|e| ScrapeError::ExportIo(format!("creating {}: {e}", out_dir.display())))?;

    let mut writer = csv::Writer::from_path(&path)
        .map_err(|e| ScrapeError::ExportIo(format!("opening {}: {e}", path.display())))?;

    writer
        .write_record(CSV_HEADER)
        .map_err(|e| ScrapeError::ExportIo(e.to_string()))?;
    for record in unique.values() {
        writer
            .write_record(record.to_row())
            .map_err(|e| ScrapeError::ExportIo(e.to_string()))?;
    }
    writer
        .flush()
        .map_err(|e| ScrapeError::ExportIo(e.to_string()))?;

    tracing::info!(rows = unique.len(), path = %path.display(), "artifact written");
    Ok(path)
}
