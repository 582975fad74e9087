use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::time::Instant;
use sysinfo::{get_current_pid, ProcessExt, System, SystemExt};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use stroke_risk::config::{AppConfig, LoggingConfig, DEFAULT_CONFIG_PATH};
use stroke_risk::{
    save_artifacts, table, train, FsArtifactStore, InferenceService, Result, StrokeRecord,
    STROKE_SCHEMA,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct StrokeRiskArgs {
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, help = "Configuration file")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fit the preprocessor and model, report metrics, save both artifacts
    Train {
        #[arg(short, long, help = "Labeled training CSV, overrides data.training_csv")]
        data: Option<PathBuf>,
    },
    /// Score one patient record given as a JSON object
    Predict {
        #[arg(help = "Record file, `-` for stdin")]
        record: PathBuf,
    },
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn monitor_memory() -> u64 {
    /* Resident memory of this process in bytes, 0 when unavailable */
    let Ok(pid) = get_current_pid() else {
        return 0;
    };
    let mut system = System::new();
    system.refresh_process(pid);
    system.process(pid).map(|p| p.memory()).unwrap_or(0)
}

fn run_train(config: &AppConfig, data: Option<PathBuf>) -> Result<()> {
    let start_time = Instant::now();
    let start_memory = monitor_memory();

    let path = data.unwrap_or_else(|| config.data.training_csv.clone());
    let table = table::read_csv(&path, &STROKE_SCHEMA, &config.data.ingest_options())?;
    let outcome = train(&table, &config.training)?;

    println!("Before SMOTE: {} rows", outcome.train_rows);
    println!("After SMOTE: {} rows", outcome.balanced_rows);
    match &outcome.evaluation {
        Some(report) => println!("{report}"),
        None => println!("No held-out rows, evaluation skipped"),
    }

    let store = FsArtifactStore::new(&config.artifacts.dir);
    save_artifacts(&store, &outcome.artifacts)?;

    let end_memory = monitor_memory();
    info!(
        elapsed = ?start_time.elapsed(),
        memory_bytes = end_memory.saturating_sub(start_memory),
        dir = %config.artifacts.dir.display(),
        "training finished"
    );
    Ok(())
}

fn run_predict(config: &AppConfig, record: PathBuf) -> Result<()> {
    let text = if record.as_os_str() == "-" {
        std::io::read_to_string(std::io::stdin())?
    } else {
        fs::read_to_string(&record)?
    };
    let record = StrokeRecord::from_json(&text)?;
    debug!(?record, "parsed record");

    let store = FsArtifactStore::new(&config.artifacts.dir);
    let service = InferenceService::from_store(&store, config.serving.threshold)?;
    let prediction = service.predict(&record)?;

    info!(
        "{}: {:.2}%",
        prediction.verdict,
        prediction.probability * 100.0
    );
    println!("{}", serde_json::to_string(&prediction)?);
    Ok(())
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let cli = StrokeRiskArgs::parse();
    let config = AppConfig::load_from_path(&cli.config)?;
    init_logging(&config.logging);

    debug!("Arguments {:#?}", cli);

    match cli.command {
        Command::Train { data } => run_train(&config, data)?,
        Command::Predict { record } => run_predict(&config, record)?,
    }
    Ok(())
}
