//! Dataset Module - Ground Truth Loading
//!
//! Reads the labeled water quality CSV into typed observations.
//! Loading is best-effort per row: short or unparsable rows are skipped,
//! only an unreadable file or an empty result is fatal.

pub mod record;


use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

pub use record::{
    parse_feature_inputs, FeatureInputError, Features, Label, Observation, FEATURE_COUNT,
    FEATURE_NAMES, FEATURE_SHORT_NAMES,
};

/// 14 features followed by the label column
pub const MIN_FIELDS: usize = FEATURE_COUNT + 1;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("failed to read CSV {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no valid data loaded from CSV ({skipped} rows skipped)")]
    NoData { skipped: usize },
}

// ============================================================================
// DATASET
// ============================================================================

/// Observations loaded from one file, owned by the session until replaced
#[derive(Debug, Clone)]
pub struct Dataset {
    source: PathBuf,
    observations: Vec<Observation>,
    skipped_rows: usize,
    loaded_at: DateTime<Utc>,
}

/// Overview handed to the presentation layer after a load
#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub source: String,
    pub total_records: usize,
    pub skipped_rows: usize,
    pub safe_count: usize,
    pub unsafe_count: usize,
    pub loaded_at: DateTime<Utc>,
}

impl Dataset {
    pub fn from_observations(source: impl Into<PathBuf>, observations: Vec<Observation>) -> Self {
        Self {
            source: source.into(),
            observations,
            skipped_rows: 0,
            loaded_at: Utc::now(),
        }
    }

    /// Absolute path of the file the rows came from
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn get(&self, index: usize) -> Option<&Observation> {
        self.observations.get(index)
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }

    pub fn summary(&self) -> DatasetSummary {
        let safe_count = self.observations.iter().filter(|o| o.label().is_safe()).count();
        DatasetSummary {
            source: self.source.to_string_lossy().to_string(),
            total_records: self.observations.len(),
            skipped_rows: self.skipped_rows,
            safe_count,
            unsafe_count: self.observations.len() - safe_count,
            loaded_at: self.loaded_at,
        }
    }
}

// ============================================================================
// LOADING
// ============================================================================

/// Load a dataset file.
///
/// The first record is a header and is always discarded. The stored
/// source path is canonicalized because the training binary runs in its
/// own working directory.
pub fn load_csv(path: impl AsRef<Path>) -> Result<Dataset, DatasetError> {
    let path = path.as_ref();
    let read_error = |source| DatasetError::Read {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(read_error)?;
    let (observations, skipped_rows) = parse_records(file).map_err(read_error)?;

    if observations.is_empty() {
        return Err(DatasetError::NoData { skipped: skipped_rows });
    }

    let source = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    log::info!(
        "Loaded {} observations from {:?} ({} rows skipped)",
        observations.len(),
        source,
        skipped_rows
    );

    Ok(Dataset {
        source,
        observations,
        skipped_rows,
        loaded_at: Utc::now(),
    })
}

/// Parse delimited records after the header.
///
/// Returns the accepted observations and the number of skipped rows.
/// Only I/O failures are errors.
pub fn parse_records<R: Read>(reader: R) -> std::io::Result<(Vec<Observation>, usize)> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut observations = Vec::new();
    let mut skipped = 0usize;

    for result in rdr.records() {
        match result {
            Ok(record) => match parse_row(&record) {
                Some(observation) => observations.push(observation),
                None => skipped += 1,
            },
            Err(e) => match e.into_kind() {
                csv::ErrorKind::Io(err) => return Err(err),
                other => {
                    log::debug!("Skipping undecodable CSV record: {:?}", other);
                    skipped += 1;
                }
            },
        }
    }

    Ok((observations, skipped))
}

fn parse_row(record: &csv::StringRecord) -> Option<Observation> {
    if record.len() < MIN_FIELDS {
        return None;
    }

    let mut features = [0.0; FEATURE_COUNT];
    for (slot, field) in features.iter_mut().zip(record.iter()) {
        *slot = parse_finite(field)?;
    }

    // Label: truncate to integer, nonzero = safe
    let label = parse_finite(record.get(FEATURE_COUNT)?)?.trunc();
    Some(Observation::new(features, Label::from_bool(label != 0.0)))
}

fn parse_finite(field: &str) -> Option<f64> {
    field.parse::<f64>().ok().filter(|v| v.is_finite())
}
