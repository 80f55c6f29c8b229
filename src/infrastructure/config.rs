use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Terminal client for creating logistics service requests.
#[derive(Debug, Parser)]
#[command(name = "solicita", version, about)]
pub struct Cli {
    /// Base URL of the REST backend.
    #[arg(long, env = "SOLICITA_API_URL", default_value = "http://localhost:3000/api")]
    pub api_url: String,

    /// Directory holding the draft, the session and the log file.
    #[arg(long, env = "SOLICITA_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Open the interactive wizard (default).
    Tui,
    /// Inspect or discard the saved draft.
    Draft {
        #[command(subcommand)]
        action: DraftAction,
    },
    /// Forget the stored session.
    Logout,
}

#[derive(Debug, Subcommand)]
pub enum DraftAction {
    /// Print the saved draft as JSON.
    Show,
    /// Delete the saved draft.
    Clear,
}

/// Resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub data_dir: PathBuf,
    pub timeout: Duration,
    pub log_level: String,
}

impl Config {
    pub fn from_cli(cli: &Cli) -> Self {
        let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
        Self {
            api_url: cli.api_url.clone(),
            data_dir,
            timeout: Duration::from_secs(cli.timeout_secs.max(1)),
            log_level: cli.log_level.clone(),
        }
    }

    pub fn draft_path(&self) -> PathBuf {
        self.data_dir.join("draft.json")
    }

    pub fn session_path(&self) -> PathBuf {
        self.data_dir.join("session.json")
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join("solicita.log")
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("solicita")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["solicita", "--data-dir", "/tmp/solicita"]).unwrap();
        let config = Config::from_cli(&cli);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.draft_path(), PathBuf::from("/tmp/solicita/draft.json"));
        assert_eq!(config.session_path(), PathBuf::from("/tmp/solicita/session.json"));
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_subcommands() {
        let cli = Cli::try_parse_from(["solicita", "draft", "clear"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Draft { action: DraftAction::Clear })
        ));

        let cli = Cli::try_parse_from(["solicita", "--timeout-secs", "0", "logout"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Logout)));
        assert_eq!(Config::from_cli(&cli).timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_api_url_flag() {
        let cli = Cli::try_parse_from(["solicita", "--api-url", "https://api.example.cl"]).unwrap();
        assert_eq!(Config::from_cli(&cli).api_url, "https://api.example.cl");
    }
}
