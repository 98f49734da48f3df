//! Point d'entrée CLI pour geoimport
//!
//! Le résultat (`{"savedRowCount", "failedRowCount"}` ou `{"error"}`) est écrit
//! en JSON sur stdout ; les logs et le rapport vont sur stderr.

use std::process::ExitCode;

use clap::Parser;
use serde_json::json;
use tracing::{error, Level};
use tracing_subscriber::{fmt, EnvFilter};

mod cli;

use cli::Commands;

// Charger .env au démarrage
fn load_env() {
    if dotenvy::dotenv().is_err() {
        // Essayer depuis le répertoire du binaire
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let _ = dotenvy::from_path(dir.join(".env"));
            }
        }
    }
}

/// Importer une FeatureCollection GeoJSON du stockage objet vers PostGIS
#[derive(Parser)]
#[command(name = "geoimport")]
#[command(author, version)]
#[command(about = "Importer une FeatureCollection GeoJSON du stockage objet vers PostGIS")]
#[command(long_about = "Import en flux d'un objet GeoJSON (bucket + clé) vers une table PostGIS, par batches écrits en concurrence bornée.\n\nLes batches en échec sont réessayés ligne à ligne ; le résultat est affiché en JSON sur stdout.")]
struct Cli {
    /// Augmenter la verbosité (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> ExitCode {
    load_env();

    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Import(args) => cli::cmd_import(args, !cli.quiet).await,
        Commands::Count(args) => cli::cmd_count(args).await,
    };

    match result {
        Ok(result) => {
            println!("{}", json!(result));
            ExitCode::SUCCESS
        }
        Err(e) => {
            let message = format!("{e:#}");
            error!(error = %message, "Import failed");
            println!("{}", json!({ "error": message }));
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (_, 0) => Level::INFO,
        (_, 1) => Level::DEBUG,
        (_, _) => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .init();
}
