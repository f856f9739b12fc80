use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// FEATURE LAYOUT
// ============================================================================

/// Number of features per observation
pub const FEATURE_COUNT: usize = 14;

/// Feature names in the exact order the binary expects them
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "Aluminium",
    "Ammonia",
    "Arsenic",
    "Barium",
    "Chloramine",
    "Chromium",
    "Copper",
    "Fluoride",
    "Bacteria",
    "Viruses",
    "Mercury",
    "Radium",
    "Silver",
    "Uranium",
];

/// Short column headers used in result tables
pub const FEATURE_SHORT_NAMES: [&str; FEATURE_COUNT] = [
    "Alum", "Amm", "Ars", "Bar", "Chlor", "Chrom", "Cop",
    "Fluor", "Bact", "Vir", "Merc", "Rad", "Silv", "Uran",
];

/// One feature vector in layout order
pub type Features = [f64; FEATURE_COUNT];

// ============================================================================
// LABEL
// ============================================================================

/// Binary water safety outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Unsafe,
    Safe,
}

impl Label {
    /// Nonzero means safe
    pub fn from_int(value: i64) -> Self {
        if value != 0 { Label::Safe } else { Label::Unsafe }
    }

    pub fn from_bool(safe: bool) -> Self {
        if safe { Label::Safe } else { Label::Unsafe }
    }

    pub fn is_safe(&self) -> bool {
        matches!(self, Label::Safe)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Unsafe => "Unsafe",
            Label::Safe => "Safe",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// OBSERVATION
// ============================================================================

/// One labeled row of the ground-truth dataset.
///
/// Fields are private so the feature count can never drift from
/// `FEATURE_COUNT` after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    features: Features,
    label: Label,
}

impl Observation {
    pub fn new(features: Features, label: Label) -> Self {
        Self { features, label }
    }

    pub fn features(&self) -> &Features {
        &self.features
    }

    pub fn label(&self) -> Label {
        self.label
    }
}

// ============================================================================
// MANUAL INPUT
// ============================================================================

/// Error from validating hand-entered feature values
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FeatureInputError {
    #[error("expected {} feature values, got {0}", FEATURE_COUNT)]
    WrongCount(usize),
    #[error("please enter a value for {0}")]
    Empty(&'static str),
    #[error("invalid value for {name}: {value:?}")]
    NotNumeric { name: &'static str, value: String },
}

/// Parse 14 text fields (in layout order) into a feature vector
pub fn parse_feature_inputs<S: AsRef<str>>(inputs: &[S]) -> Result<Features, FeatureInputError> {
    if inputs.len() != FEATURE_COUNT {
        return Err(FeatureInputError::WrongCount(inputs.len()));
    }

    let mut features = [0.0; FEATURE_COUNT];
    for (i, raw) in inputs.iter().enumerate() {
        let name = FEATURE_NAMES[i];
        let value = raw.as_ref().trim();
        if value.is_empty() {
            return Err(FeatureInputError::Empty(name));
        }
        features[i] = value
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| FeatureInputError::NotNumeric {
                name,
                value: value.to_string(),
            })?;
    }

    Ok(features)
}
