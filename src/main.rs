use anyhow::Context;
use clap::Parser;
use edoc_ledger::config::{Config, ReferenceTables};
use edoc_ledger::{EDocContract, EDocService, Response, SledLedger, utils};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Invoke one e-document ledger operation against a local sled ledger.
#[derive(Parser)]
#[command(name = "edoc-ledger", version)]
struct Cli {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Ledger directory, overrides `ledger.path`
    #[arg(long)]
    db: Option<PathBuf>,

    /// Function to invoke, e.g. `create` or `history`
    function: String,

    /// Ordered string arguments of the function
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(db) = cli.db {
        config.ledger.path = db;
    }

    utils::init_tracing(&config.log)?;

    let ledger = if config.ledger.temporary {
        SledLedger::temporary()?
    } else {
        SledLedger::open(&config.ledger.path)
            .with_context(|| format!("opening ledger at {}", config.ledger.path.display()))?
    };
    let ledger = Arc::new(ledger);
    let tables = ReferenceTables::from_config(&config.reference)?;
    let contract = EDocContract::new(EDocService::with_tables(Arc::clone(&ledger), tables));

    let response = contract.invoke(&cli.function, &cli.args);
    ledger.flush()?;

    match response {
        Response::Success(payload) => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&payload)?;
            if !payload.is_empty() {
                writeln!(stdout)?;
            }
            Ok(ExitCode::SUCCESS)
        }
        Response::Error(message) => {
            eprintln!("{message}");
            Ok(ExitCode::FAILURE)
        }
    }
}
