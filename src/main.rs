//! Water Quality Testing - Command Line Entry Point

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use water_quality_core::api;
use water_quality_core::constants::{APP_NAME, APP_VERSION, DEFAULT_EPOCHS, DEFAULT_LEARNING_RATE};
use water_quality_core::logic::events::{EventSink, LogSink, UiEvent};
use water_quality_core::logic::runner::CancelToken;
use water_quality_core::logic::telemetry::RunState;
use water_quality_core::logic::{OrchestratorConfig, Session};

#[derive(Parser)]
#[command(name = "water-quality")]
#[command(about = "Train and check the water quality classifier through its binary")]
struct Cli {
    /// Training binary (defaults to WQ_BINARY_PATH)
    #[arg(long, global = true)]
    binary: Option<PathBuf>,

    /// Directory the binary runs in and writes scaler.bin to (defaults to WQ_WORKING_DIR)
    #[arg(long, global = true)]
    working_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a dataset and print its summary
    Load { csv: PathBuf },

    /// Train on a dataset, then evaluate a random sample
    Train {
        csv: PathBuf,

        #[arg(long, default_value_t = DEFAULT_EPOCHS)]
        epochs: u32,

        #[arg(long, default_value_t = DEFAULT_LEARNING_RATE)]
        learning_rate: f64,

        /// Skip the sample evaluation after training
        #[arg(long)]
        skip_eval: bool,

        /// Write the training series to this file (.csv or .json)
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Predict one sample from 14 feature values, Aluminium to Uranium
    Predict {
        #[arg(num_args = 14, required = true, allow_hyphen_values = true)]
        values: Vec<String>,
    },
}

/// Prints live progress, everything else goes to the log
struct ConsoleSink;

impl EventSink for ConsoleSink {
    fn emit(&self, event: &UiEvent) {
        if let UiEvent::TelemetryUpdated(snapshot) = event {
            if snapshot.state == RunState::Running {
                if let Some(point) = snapshot.points.last() {
                    println!(
                        "Epoch: {:>5}  Accuracy: {:6.2}%  Loss: {:.4}",
                        point.epoch, point.accuracy, point.loss
                    );
                }
                return;
            }
        }
        LogSink.emit(event);
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("{} v{}", APP_NAME, APP_VERSION);

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let mut config = OrchestratorConfig::default();
    if let Some(binary) = cli.binary {
        config.binary_path = binary;
    }
    if let Some(working_dir) = cli.working_dir {
        config.working_dir = working_dir;
    }
    let mut session = Session::new(config).with_sink(Arc::new(ConsoleSink));

    match cli.command {
        Commands::Load { csv } => {
            let summary = api::load_dataset(&mut session, &csv.to_string_lossy())?;
            println!(
                "Loaded {} records from {} ({} safe, {} unsafe, {} rows skipped)",
                summary.total_records,
                summary.source,
                summary.safe_count,
                summary.unsafe_count,
                summary.skipped_rows
            );
        }

        Commands::Train {
            csv,
            epochs,
            learning_rate,
            skip_eval,
            export,
        } => {
            api::load_dataset(&mut session, &csv.to_string_lossy())?;

            let cancel = CancelToken::new();
            let trigger = cancel.clone();
            // first interrupt cancels the current step, a second one exits
            tokio::spawn(async move {
                while tokio::signal::ctrl_c().await.is_ok() {
                    if trigger.is_cancelled() {
                        eprintln!("Interrupted");
                        std::process::exit(130);
                    }
                    log::warn!("Interrupt received, stopping");
                    trigger.cancel();
                }
            });

            let trained = api::train_model(&mut session, epochs, learning_rate, &cancel).await;

            if let Some(path) = export {
                match api::export_telemetry(&session, &path.to_string_lossy()) {
                    Ok(count) => println!("Exported {} points to {}", count, path.display()),
                    Err(e) => log::warn!("{}", e),
                }
            }

            let outcome = trained?;
            match &outcome.summary {
                Some(summary) => println!(
                    "Validation accuracy: {:.2}%  Test accuracy: {:.2}%",
                    summary.val_accuracy, summary.test_accuracy
                ),
                None => println!("Training finished without a summary"),
            }

            if !skip_eval {
                let table = api::evaluate_model(&mut session, &cancel).await?;
                println!("\n{}\n\n{}", table.render(), table.match_line());
            }
        }

        Commands::Predict { values } => {
            let info = api::predict_water(&session, &values).await?;
            match info.probability {
                Some(p) => println!("Prediction: {} (probability {:.2})", info.label, p),
                None => println!("Prediction: {}", info.label),
            }
        }
    }

    Ok(())
}
