//! LedgerMirror CLI
//!
//! Incremental backup of an accounting API into a local directory.
//!
//! # Commands
//!
//! - `run` - Back up the selected resource kinds
//! - `state` - Show the checkpoint state
//! - `test-connection` - Authenticate and list accounting years

mod commands;

use clap::{Parser, Subcommand};
use commands::run::RunOptions;
use ledgermirror_engine::ResourceKind;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Incremental backup of accounting data.
#[derive(Parser)]
#[command(name = "ledgermirror")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Output directory for backup files
    #[arg(global = true, long, env = "OUT_DIR", default_value = "output")]
    out_dir: PathBuf,

    /// Enable debug logging
    #[arg(global = true, long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the backup
    Run {
        /// Run without saving files or updating state
        #[arg(long)]
        dry_run: bool,

        /// Also write entries as CSV
        #[arg(long)]
        csv: bool,

        /// Back up reports
        #[arg(long)]
        reports: bool,

        /// Back up invoices
        #[arg(long)]
        invoices: bool,

        /// Back up credit notes
        #[arg(long)]
        creditnotes: bool,

        /// Back up entries
        #[arg(long)]
        entries: bool,

        /// Back up vouchers
        #[arg(long)]
        vouchers: bool,

        /// Back up contacts
        #[arg(long)]
        contacts: bool,
    },

    /// Display current backup state
    State,

    /// Test API connection and credentials
    TestConnection,
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    // OUT_DIR may come from .env, so load it before parsing.
    let dotenv = dotenv::dotenv();
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.debug {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = dotenv {
        debug!("No .env file loaded: {}", e);
    }

    let out_dir = commands::expand_tilde(&cli.out_dir);

    match cli.command {
        Commands::Run {
            dry_run,
            csv,
            reports,
            invoices,
            creditnotes,
            entries,
            vouchers,
            contacts,
        } => {
            let selected = [
                (reports, ResourceKind::Reports),
                (invoices, ResourceKind::Invoices),
                (creditnotes, ResourceKind::CreditNotes),
                (entries, ResourceKind::Entries),
                (vouchers, ResourceKind::Vouchers),
                (contacts, ResourceKind::Contacts),
            ];
            let options = RunOptions {
                dry_run,
                csv,
                kinds: selected
                    .into_iter()
                    .filter(|(on, _)| *on)
                    .map(|(_, kind)| kind)
                    .collect(),
            };
            commands::run::run(&out_dir, &options)
        }
        Commands::State => {
            commands::state::run(&out_dir)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::TestConnection => commands::test_connection::run(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_flags_parse() {
        let cli = Cli::try_parse_from([
            "ledgermirror",
            "run",
            "--dry-run",
            "--entries",
            "--csv",
            "--out-dir",
            "/tmp/backup",
        ])
        .unwrap();

        assert_eq!(cli.out_dir, PathBuf::from("/tmp/backup"));
        match cli.command {
            Commands::Run {
                dry_run,
                csv,
                entries,
                invoices,
                ..
            } => {
                assert!(dry_run && csv && entries);
                assert!(!invoices);
            }
            _ => panic!("expected run"),
        }
    }
}
