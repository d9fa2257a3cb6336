//! Tracklet CLI - drive the capture pipeline from a terminal
//!
//! Commands:
//! - run: connect to a collector and stream interaction NDJSON from stdin
//! - session: compose and print the session record without connecting
//! - validate: validate interaction NDJSON input

use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::io::AsyncBufReadExt;

use tracklet::{
    Collector, CollectorConfig, EnvironmentSnapshot, FileIdentityStore, IdentityStore, InputField,
    Interaction, LocationResolver, Session, TrackError, CLIENT_VERSION, DEFAULT_COLLECTOR_URL,
    DEFAULT_GEO_ENDPOINT,
};

/// Tracklet - Embeddable behavioral telemetry collector for web sessions
#[derive(Parser)]
#[command(name = "tracklet")]
#[command(version = CLIENT_VERSION)]
#[command(about = "Stream visitor interaction telemetry to a collector", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to a collector and stream interaction NDJSON from stdin
    Run {
        /// Collector WebSocket URL
        #[arg(long, default_value = DEFAULT_COLLECTOR_URL)]
        url: String,

        /// Environment snapshot JSON file (host defaults when omitted)
        #[arg(long)]
        environment: Option<PathBuf>,

        /// File persisting the visitor identifier across runs
        #[arg(long, default_value = ".tracklet-identity")]
        identity_file: PathBuf,

        /// Geolocation endpoint
        #[arg(long, default_value = DEFAULT_GEO_ENDPOINT)]
        geo_endpoint: String,

        /// Skip the geolocation lookup
        #[arg(long)]
        no_geo: bool,

        /// Debounce window in milliseconds
        #[arg(long, default_value = "500")]
        debounce_ms: u64,

        /// Flush interval in milliseconds
        #[arg(long, default_value = "1000")]
        flush_ms: u64,
    },

    /// Compose and print the session record without connecting
    Session {
        /// Environment snapshot JSON file (host defaults when omitted)
        #[arg(long)]
        environment: Option<PathBuf>,

        /// File persisting the visitor identifier across runs
        #[arg(long)]
        identity_file: Option<PathBuf>,

        /// Perform the geolocation lookup
        #[arg(long)]
        lookup: bool,

        /// Geolocation endpoint
        #[arg(long, default_value = DEFAULT_GEO_ENDPOINT)]
        geo_endpoint: String,

        /// Pretty-print the record
        #[arg(long)]
        pretty: bool,
    },

    /// Validate interaction NDJSON
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Host environment file: the snapshot plus the input fields present at load
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvironmentFile {
    #[serde(flatten)]
    snapshot: EnvironmentSnapshot,
    #[serde(default)]
    input_fields: Vec<InputField>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("failed to start runtime: {error}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(error))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), TrackletCliError> {
    match cli.command {
        Commands::Run {
            url,
            environment,
            identity_file,
            geo_endpoint,
            no_geo,
            debounce_ms,
            flush_ms,
        } => {
            cmd_run(
                url,
                environment.as_deref(),
                identity_file,
                geo_endpoint,
                no_geo,
                debounce_ms,
                flush_ms,
            )
            .await
        }

        Commands::Session {
            environment,
            identity_file,
            lookup,
            geo_endpoint,
            pretty,
        } => {
            cmd_session(
                environment.as_deref(),
                identity_file.as_deref(),
                lookup,
                &geo_endpoint,
                pretty,
            )
            .await
        }

        Commands::Validate { input, json } => cmd_validate(&input, json),
    }
}

async fn cmd_run(
    url: String,
    environment: Option<&Path>,
    identity_file: PathBuf,
    geo_endpoint: String,
    no_geo: bool,
    debounce_ms: u64,
    flush_ms: u64,
) -> Result<(), TrackletCliError> {
    let host = load_environment(environment)?;

    let config = CollectorConfig {
        collector_url: url,
        geo_endpoint: (!no_geo).then_some(geo_endpoint),
        debounce_window: Duration::from_millis(debounce_ms),
        flush_interval: Duration::from_millis(flush_ms),
    };

    let identity: Arc<dyn IdentityStore> = Arc::new(FileIdentityStore::new(identity_file));
    let (collector, handle) = Collector::new(config, host.snapshot, identity, host.input_fields);

    if atty::is(atty::Stream::Stdin) {
        eprintln!("stdin is a TTY; pipe interaction NDJSON, or type lines and finish with Ctrl-D");
    }

    // One interaction per line; malformed lines are skipped, capture goes on.
    // EOF drops the handle, which is the page-unload analog.
    let reader = tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<Interaction>(trimmed) {
                        Ok(interaction) => handle.record(interaction),
                        Err(error) => {
                            tracing::warn!(%error, "skipping malformed interaction line");
                        }
                    }
                }
                Ok(None) => break,
                Err(error) => {
                    tracing::warn!(%error, "stdin read failed");
                    break;
                }
            }
        }
        drop(handle);
    });

    let result = collector.run().await;
    reader.abort();
    result?;
    Ok(())
}

async fn cmd_session(
    environment: Option<&Path>,
    identity_file: Option<&Path>,
    lookup: bool,
    geo_endpoint: &str,
    pretty: bool,
) -> Result<(), TrackletCliError> {
    let host = load_environment(environment)?;

    let identifier = identity_file.and_then(|path| FileIdentityStore::new(path).get());

    let geo = if lookup {
        LocationResolver::new(geo_endpoint).resolve().await
    } else {
        None
    };

    let session = Session::compose(&host.snapshot, identifier, geo);
    let output = if pretty {
        serde_json::to_string_pretty(&session)?
    } else {
        serde_json::to_string(&session)?
    };
    println!("{output}");

    Ok(())
}

fn cmd_validate(input: &Path, json: bool) -> Result<(), TrackletCliError> {
    let input_data = if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let mut total = 0usize;
    let mut errors: Vec<ValidationErrorDetail> = Vec::new();

    for (index, line) in input_data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        total += 1;
        if let Err(error) = serde_json::from_str::<Interaction>(trimmed) {
            errors.push(ValidationErrorDetail {
                line: index + 1,
                error: error.to_string(),
            });
        }
    }

    let report = ValidationReport {
        total_interactions: total,
        valid_interactions: total - errors.len(),
        invalid_interactions: errors.len(),
        errors,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total interactions:   {}", report.total_interactions);
        println!("Valid interactions:   {}", report.valid_interactions);
        println!("Invalid interactions: {}", report.invalid_interactions);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - line {}: {}", err.line, err.error);
            }
        }
    }

    if report.invalid_interactions > 0 {
        Err(TrackletCliError::ValidationFailed(report.invalid_interactions))
    } else {
        Ok(())
    }
}

fn load_environment(path: Option<&Path>) -> Result<EnvironmentFile, TrackletCliError> {
    match path {
        Some(path) => {
            let contents = fs::read_to_string(path)?;
            Ok(serde_json::from_str(&contents)?)
        }
        None => Ok(EnvironmentFile::default()),
    }
}

// Error types

#[derive(Debug)]
enum TrackletCliError {
    Io(io::Error),
    Json(serde_json::Error),
    Track(TrackError),
    ValidationFailed(usize),
}

impl From<io::Error> for TrackletCliError {
    fn from(e: io::Error) -> Self {
        TrackletCliError::Io(e)
    }
}

impl From<serde_json::Error> for TrackletCliError {
    fn from(e: serde_json::Error) -> Self {
        TrackletCliError::Json(e)
    }
}

impl From<TrackError> for TrackletCliError {
    fn from(e: TrackError) -> Self {
        TrackletCliError::Track(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<TrackletCliError> for CliError {
    fn from(e: TrackletCliError) -> Self {
        match e {
            TrackletCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            TrackletCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            TrackletCliError::Track(e) => CliError {
                code: "TRANSPORT_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check the collector URL and that the collector is reachable".to_string()),
            },
            TrackletCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} interactions failed validation", count),
                hint: Some("Fix the reported lines and retry".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_interactions: usize,
    valid_interactions: usize,
    invalid_interactions: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    line: usize,
    error: String,
}
