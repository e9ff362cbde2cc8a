//! Bootstrap helpers for safe-sentinel.
//!
//! Endpoint overrides and the Etherscan key usually live in
//! `~/.safe-sentinel/.env` (standard dotenvy format) so they are picked up
//! no matter which directory the tool is started from.

use std::path::{Path, PathBuf};

/// `~/.safe-sentinel`, or `./.safe-sentinel` when no home directory exists.
pub fn sentinel_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".safe-sentinel")
}

/// Path to the tool-specific `.env` file: `~/.safe-sentinel/.env`.
pub fn sentinel_env_path() -> PathBuf {
    sentinel_home().join(".env")
}

/// REPL line history: `~/.safe-sentinel/history`.
pub fn history_path() -> PathBuf {
    sentinel_home().join("history")
}

/// Load `./.env` and then `~/.safe-sentinel/.env`.
///
/// dotenvy never overwrites existing env vars, so the effective priority is:
///
///   explicit env vars > `./.env` > `~/.safe-sentinel/.env`
pub fn load_env() {
    let _ = dotenvy::dotenv();
    load_env_file(&sentinel_env_path());
}

fn load_env_file(path: &Path) {
    if !path.exists() {
        return;
    }
    if let Err(e) = dotenvy::from_path(path) {
        eprintln!("Warning: failed to load {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sentinel_paths_share_home() {
        let env = sentinel_env_path();
        let history = history_path();
        assert!(env.ends_with(".safe-sentinel/.env"));
        assert_eq!(env.parent(), history.parent());
    }

    #[test]
    fn test_quoted_values_survive_dotenv_parsing() {
        let dir = tempdir().unwrap();
        let env_path = dir.path().join(".env");

        // `#` would start a comment if the value were unquoted.
        std::fs::write(
            &env_path,
            "ETHERSCAN_API_KEY=\"abc#123\"\nBACKEND_API_URL_ANALYZER=http://localhost:9000\n",
        )
        .unwrap();

        let parsed: Vec<(String, String)> = dotenvy::from_path_iter(&env_path)
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0], ("ETHERSCAN_API_KEY".into(), "abc#123".into()));
        assert_eq!(parsed[1].1, "http://localhost:9000");
    }

    #[test]
    fn test_missing_env_file_is_ignored() {
        let dir = tempdir().unwrap();
        load_env_file(&dir.path().join("absent.env"));
    }
}
