use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::config::AppConfig;
use crate::error::Result;
use crate::persistence::SnapshotStore;

#[derive(Parser)]
#[command(name = "vigil")]
#[command(version)]
#[command(about = "Supervisory core for a semi-autonomous trading bot", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the bot until interrupted
    Run {
        /// Config file path (defaults to config/default.toml when present)
        #[arg(short, long, env = "VIGIL_CONFIG")]
        config: Option<PathBuf>,

        /// Request live order execution
        #[arg(long)]
        live: bool,
    },
    /// Print the last persisted snapshot
    Status {
        /// Snapshot file (defaults to persistence.state_file)
        #[arg(long)]
        state_file: Option<PathBuf>,
    },
}

/// Resolve the snapshot path for `status`: explicit flag, then config,
/// then the built-in default
pub fn status_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(|| {
        let file = AppConfig::load()
            .map(|c| c.persistence.state_file)
            .unwrap_or_else(|_| crate::config::PersistenceConfig::default().state_file);
        PathBuf::from(file)
    })
}

/// Print the persisted snapshot at `path` as pretty JSON
pub async fn show_status(path: &Path) -> Result<()> {
    match SnapshotStore::new(path).load().await? {
        Some(snapshot) => {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        None => {
            println!("No snapshot found at {}", path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::parse_from(["vigil", "run", "--config", "cfg.toml", "--live"]);
        match cli.command {
            Commands::Run { config, live } => {
                assert_eq!(config, Some(PathBuf::from("cfg.toml")));
                assert!(live);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_explicit_status_path_wins() {
        let path = status_path(Some(PathBuf::from("/tmp/x.json")));
        assert_eq!(path, PathBuf::from("/tmp/x.json"));
    }
}
