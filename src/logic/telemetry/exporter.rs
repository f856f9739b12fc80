//! Telemetry Exporter
//!
//! Writes a run's series to disk for offline analysis or plotting.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::series::TelemetrySnapshot;

// ============================================================================
// EXPORT FORMATS
// ============================================================================

/// Supported export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Full snapshot, pretty-printed JSON
    Json,
    /// epoch,accuracy,loss rows for spreadsheets
    Csv,
}

impl ExportFormat {
    /// Pick a format from the file extension, JSON unless it ends in `.csv`
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => ExportFormat::Csv,
            _ => ExportFormat::Json,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

// ============================================================================
// EXPORT FUNCTIONS
// ============================================================================

/// Export the snapshot; returns the number of points written
pub fn export_series(
    snapshot: &TelemetrySnapshot,
    destination: &Path,
    format: ExportFormat,
) -> std::io::Result<usize> {
    match format {
        ExportFormat::Json => {
            let mut writer = BufWriter::new(File::create(destination)?);
            serde_json::to_writer_pretty(&mut writer, snapshot)?;
            writer.flush()?;
        }
        ExportFormat::Csv => {
            let mut writer = csv::Writer::from_path(destination)?;
            for point in &snapshot.points {
                writer.serialize(point)?;
            }
            writer.flush()?;
        }
    }

    log::info!(
        "Exported {} telemetry points to {:?} ({})",
        snapshot.points.len(),
        destination,
        format.as_str()
    );
    Ok(snapshot.points.len())
}
