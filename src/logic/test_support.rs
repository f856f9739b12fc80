//! Fake training binary for tests: a shell script in a scratch directory.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;

use crate::logic::config::OrchestratorConfig;
use crate::logic::evaluation::EvaluationState;
use crate::logic::events::{EventSink, UiEvent};

pub const SCALER_JSON: &str = r#"{"min_vals": [0,0,0,0,0,0,0,0,0,0,0,0,0,0], "max_vals": [10,10,10,10,10,10,10,10,10,10,10,10,10,10]}"#;

/// Well-behaved binary.
///
/// Train prints noise around two progress lines and a summary, then writes
/// the scaler. Predict answers Safe when the first feature is 1.
pub fn standard_script() -> String {
    format!(
        r#"echo "$@" >> calls.log
case "$1" in
  --train)
    echo "Loaded data from $2"
    echo '{{"epoch": 1, "accuracy": 0.5, "loss": 0.69, "val_accuracy": 48.0}}'
    echo 'warming up'
    echo '{{"epoch": 2, "accuracy": 0.75, "loss": 0.5}}'
    echo '{{"status": "checkpoint"}}'
    echo '{{"val_accuracy": 81.5, "test_accuracy": 80.25}}'
    printf '%s' '{scaler}' > scaler.bin
    ;;
  --predict)
    if [ "$2" = "1" ]; then
      echo '{{"prediction": 1, "probability": 0.91}}'
    else
      echo '{{"prediction": 0, "probability": 0.12}}'
    fi
    ;;
esac
"#,
        scaler = SCALER_JSON
    )
}

pub struct FakeBinary {
    dir: TempDir,
    path: PathBuf,
}

impl FakeBinary {
    pub fn new(body: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("WaterQualityTesting");
        fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        Self { dir, path }
    }

    pub fn standard() -> Self {
        Self::new(&standard_script())
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn config(&self) -> OrchestratorConfig {
        OrchestratorConfig::new(&self.path, self.dir.path())
            .with_predict_timeout(Duration::from_secs(5))
    }

    /// Argument lines recorded by scripts that log their calls
    pub fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.dir.path().join("calls.log"))
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn write_scaler(&self) {
        fs::write(self.dir.path().join("scaler.bin"), SCALER_JSON).unwrap();
    }
}

/// Dataset whose label equals its first feature (0 or 1)
pub fn write_dataset(dir: &Path, rows: usize) -> PathBuf {
    let mut content = String::from(
        "Aluminium,Ammonia,Arsenic,Barium,Chloramine,Chromium,Copper,Fluoride,Bacteria,Viruses,Mercury,Radium,Silver,Uranium,is_safe\n",
    );
    for i in 0..rows {
        let label = i % 2;
        content.push_str(&format!("{},{},{}\n", label, vec!["0.5"; 13].join(","), label));
    }
    let path = dir.join("water.csv");
    fs::write(&path, content).unwrap();
    path
}

/// Sink that keeps every event for later assertions
#[derive(Default)]
pub struct CollectingSink {
    events: parking_lot::Mutex<Vec<UiEvent>>,
}

impl CollectingSink {
    pub fn events(&self) -> Vec<UiEvent> {
        self.events.lock().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.name().to_string()).collect()
    }

    pub fn states(&self) -> Vec<EvaluationState> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                UiEvent::EvaluationState(state) => Some(*state),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: &UiEvent) {
        self.events.lock().push(event.clone());
    }
}
