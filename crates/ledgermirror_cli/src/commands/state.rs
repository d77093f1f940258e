//! State command implementation.

use ledgermirror_engine::{CheckpointStore, ResourceKind, CHECKPOINT_FILE};
use std::fmt::Write;
use std::path::Path;

/// Prints the checkpoint state stored in `out_dir`.
pub fn run(out_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let path = out_dir.join(CHECKPOINT_FILE);
    if !path.exists() {
        println!("No state file found at {}", path.display());
        println!("Run 'ledgermirror run' to create an initial backup.");
        return Ok(());
    }

    let store = CheckpointStore::load(&path)?;
    print!("{}", render(&store));
    Ok(())
}

fn render(store: &CheckpointStore) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "State file: {}\n", store.path().display());
    let _ = writeln!(out, "Last sync times:");
    for kind in ResourceKind::ALL {
        let label = format!("{}:", kind.label());
        let _ = writeln!(out, "  {:<13} {}", label, store.raw(kind));
    }

    let years = store.initialized_periods();
    if !years.is_empty() {
        let _ = writeln!(out, "\nEntries initialized for years: {:?}", years);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn renders_every_kind_and_sorted_years() {
        let dir = TempDir::new().unwrap();
        let mut store = CheckpointStore::new(dir.path().join(CHECKPOINT_FILE));
        store.mark_period_initialized(2024);
        store.mark_period_initialized(2022);

        let text = render(&store);

        assert!(text.contains("  Credit Notes: 2000-01-01T00:00:00Z"));
        assert!(text.contains("  Contacts:     2000-01-01T00:00:00Z"));
        assert!(text.contains("Entries initialized for years: [2022, 2024]"));
    }

    #[test]
    fn missing_state_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(run(dir.path()).is_ok());
    }
}
