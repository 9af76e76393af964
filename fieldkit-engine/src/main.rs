//! fieldkit-check - command-line address/email check
//!
//! Builds a page orchestrator against the configured remote validation
//! service, writes the given address (and email) into fresh records, runs the
//! submit-time check and prints the resulting canonical records as JSON.
//! Correction popups are answered on the console.
//!
//! Exit status is non-zero when submission stays blocked.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::signal;
use tokio::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fieldkit_common::config::{EngineConfig, API_KEY_ENV_VAR, ENDPOINT_ENV_VAR};
use fieldkit_common::events::{CorrectionFlow, UserDecision};
use fieldkit_engine::capability::{address, names, EMAIL};
use fieldkit_engine::remote::JsonRpcClient;
use fieldkit_engine::validation::{CorrectionPresenter, PopupRequest};
use fieldkit_engine::{Orchestrator, Record};

/// Command-line arguments for fieldkit-check
#[derive(Parser, Debug)]
#[command(name = "fieldkit-check")]
#[command(about = "Check an address (and email) against the validation service")]
#[command(version)]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON-RPC endpoint of the validation service
    #[arg(long, env = ENDPOINT_ENV_VAR)]
    endpoint: Option<String>,

    /// API key sent as X-Auth-Key
    #[arg(long, env = API_KEY_ENV_VAR, hide_env_values = true)]
    api_key: Option<String>,

    /// ISO country code
    #[arg(long, default_value = "DE")]
    country: String,

    #[arg(long)]
    postal_code: Option<String>,

    #[arg(long)]
    locality: Option<String>,

    /// Street line, optionally including the building number
    #[arg(long)]
    street: Option<String>,

    #[arg(long)]
    building_number: Option<String>,

    /// Email address to check alongside the address
    #[arg(long)]
    email: Option<String>,
}

/// Answers correction popups on stdin/stdout
struct ConsolePresenter {
    input: Mutex<Lines<BufReader<Stdin>>>,
}

impl ConsolePresenter {
    fn new() -> Self {
        Self {
            input: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }
}

#[async_trait]
impl CorrectionPresenter for ConsolePresenter {
    async fn present(&self, request: PopupRequest) -> UserDecision {
        println!();
        match request.flow {
            CorrectionFlow::VariantSelection => {
                println!("The address may need a correction. Did you mean:");
                for (index, prediction) in request.predictions.iter().enumerate() {
                    let line: Vec<&str> = [
                        address::STREET_NAME,
                        address::BUILDING_NUMBER,
                        address::POSTAL_CODE,
                        address::LOCALITY,
                    ]
                    .iter()
                    .map(|field| prediction.get(field))
                    .filter(|value| !value.is_empty())
                    .collect();
                    println!("  [{}] {}", index + 1, line.join(" "));
                }
                println!("Enter a number, 'e' to edit or 'c' to keep your input:");
            }
            CorrectionFlow::NotFound => {
                println!("The address could not be found.");
                println!("Enter 'e' to edit or 'c' to keep your input:");
            }
            _ => {
                println!("The address needs a correction: {}", request.status.join(", "));
                println!("Enter 'e' to edit or 'c' to keep your input:");
            }
        }

        let answer = match self.input.lock().await.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) | Err(_) => return UserDecision::Edit,
        };

        match answer.trim() {
            "c" | "C" => UserDecision::ForceConfirm,
            other => match other.parse::<usize>() {
                Ok(choice) if choice >= 1 => UserDecision::SelectVariant { index: choice - 1 },
                _ => UserDecision::Edit,
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let config_arg = args.config.as_ref().map(|p| p.to_string_lossy().to_string());
    let mut config = EngineConfig::resolve(config_arg.as_deref())
        .context("Failed to load configuration")?;
    if let Some(endpoint) = &args.endpoint {
        config.remote.endpoint = endpoint.clone();
    }
    if let Some(api_key) = &args.api_key {
        config.remote.api_key = Some(api_key.clone());
    }

    // Initialize tracing
    let default_filter = format!(
        "fieldkit_engine={0},fieldkit_common={0}",
        config.logging.level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting fieldkit-check v{}", env!("CARGO_PKG_VERSION"));
    info!("Remote endpoint: {}", config.remote.endpoint);
    if config.remote.api_key.is_none() {
        warn!("No API key configured (set {} or --api-key)", API_KEY_ENV_VAR);
    }

    let remote = Arc::new(
        JsonRpcClient::new(&config.remote).context("Failed to create remote client")?,
    );
    let orchestrator = Orchestrator::new(config, remote, Arc::new(ConsolePresenter::new()));

    tokio::select! {
        result = run(&orchestrator, &args) => result,
        _ = shutdown_signal() => Ok(ExitCode::FAILURE),
    }
}

async fn run(orchestrator: &Orchestrator, args: &Args) -> Result<ExitCode> {
    let (address_record, report) = orchestrator
        .create_record(
            "address",
            &[
                names::ADDRESS,
                names::ADDRESS_CHECK,
                names::POSTAL_CODE_AUTOCOMPLETE,
                names::LOCALITY_AUTOCOMPLETE,
                names::STREET_NAME_AUTOCOMPLETE,
            ],
            0,
        )
        .await;
    if !report.is_complete() {
        warn!("Some capabilities were dropped: {:?}", report.dropped);
    }

    address_record.set_field(address::COUNTRY_CODE, args.country.as_str()).await;
    let inputs = [
        (address::POSTAL_CODE, &args.postal_code),
        (address::LOCALITY, &args.locality),
        (address::STREET_FULL, &args.street),
        (address::BUILDING_NUMBER, &args.building_number),
    ];
    for (field, value) in inputs {
        if let Some(value) = value {
            address_record.set_field(field, value.as_str()).await;
        }
    }

    let email_record = match &args.email {
        Some(email) => {
            let (record, _) = orchestrator.create_record("email", &[names::EMAIL], 1).await;
            record.set_field(EMAIL, email.as_str()).await;
            Some(record)
        }
        None => None,
    };

    let outcome = orchestrator.submit().await;

    let mut records = vec![record_json(&address_record).await];
    if let Some(record) = &email_record {
        records.push(record_json(record).await);
    }
    let output = json!({
        "proceed": outcome.proceed,
        "records": records,
        "checks": outcome.per_record,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("Failed to encode result")?
    );

    Ok(if outcome.proceed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn record_json(record: &Arc<Record>) -> serde_json::Value {
    json!({
        "id": record.id(),
        "kind": record.kind(),
        "fields": record.settled_snapshot().await,
    })
}

/// Interrupt signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
