use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use journal_state::{
    AutoSaveStore, Config, FileStore, HttpIdentityService, MemoryStore, SessionCoordinator, StorageScopes,
};
use tracing_subscriber::EnvFilter;

const DRAFT_KEY: &str = "journal:draft";

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] journal_state::config::ConfigError),
    #[error(transparent)]
    Identity(#[from] journal_state::IdentityError),
    #[error(transparent)]
    Auth(#[from] journal_state::AuthError),
    #[error("invalid JSON output: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "journal-state", about = "Session and draft state for the journal dashboard")]
struct Cli {
    /// Overrides `JOURNAL_API_BASE_URL`.
    #[arg(long)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the authenticated user as JSON.
    Whoami,
    /// End the session and clear local state.
    Logout,
    /// Save a draft journal entry, then print the draft history.
    Draft { text: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "journal-state failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = Config::from_env_with_base_url(cli.base_url.as_deref())?;

    let local = Arc::new(FileStore::new(&config.storage_path));
    let scopes = StorageScopes::new(local.clone(), Arc::new(MemoryStore::new()));

    match cli.command {
        Command::Whoami => {
            let coordinator = coordinator(&config, scopes)?;
            let user = coordinator.authenticate().await?;
            println!("{}", serde_json::to_string_pretty(&user)?);
        }
        Command::Logout => {
            let coordinator = coordinator(&config, scopes)?;
            coordinator.logout().await;
        }
        Command::Draft { text } => {
            let draft = AutoSaveStore::restore(DRAFT_KEY, String::new(), local, config.autosave);
            draft.update(text);
            draft.flush();
            tracing::info!(key = draft.key(), cursor = draft.cursor(), "draft saved");
            println!("{}", serde_json::to_string_pretty(&draft.history())?);
        }
    }
    Ok(())
}

fn coordinator(config: &Config, scopes: StorageScopes) -> Result<SessionCoordinator, CliError> {
    let identity = HttpIdentityService::new(config.api_base_url.clone())?;
    tracing::info!(base_url = identity.base_url(), "identity service configured");
    Ok(SessionCoordinator::new(Arc::new(identity), scopes, config.session))
}
