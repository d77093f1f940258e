//! Test-connection command implementation.

use ledgermirror_client::{connect, ClientConfig};
use ledgermirror_engine::{periods_from_body, Period, Query, SyncResult, Transport};
use std::process::ExitCode;

/// Authenticates and lists the accounting years.
pub fn run() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let transport = connect(ClientConfig::from_env()?)?;

    println!("Testing API connection...");
    match accounting_years(&transport) {
        Ok(years) => {
            println!("Connection successful!");
            println!("Found {} accounting year(s):", years.len());
            for year in years {
                println!("  - {} ({} to {})", year.id, year.start, year.end);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            println!("Connection failed: {e}");
            Ok(ExitCode::from(1))
        }
    }
}

fn accounting_years<T: Transport>(transport: &T) -> SyncResult<Vec<Period>> {
    let body = transport.fetch(&Query::new("/v1/{organizationId}/accountingyears"))?;
    periods_from_body(body)
}
