//! CLI command implementations.

pub mod run;
pub mod state;
pub mod test_connection;

use std::path::{Path, PathBuf};

/// Expands a leading `~/` to the home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tilde_is_expanded() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        assert_eq!(expand_tilde(Path::new("~/backup")), home.join("backup"));
        assert_eq!(expand_tilde(Path::new("/srv/backup")), PathBuf::from("/srv/backup"));
        assert_eq!(expand_tilde(Path::new("backup/~")), PathBuf::from("backup/~"));
    }
}
