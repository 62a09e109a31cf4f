use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use flywheel_core::{
    exit_code, ContentFormat, EngineConfig, EngineError, EntityIndex, InsertPosition, Operation,
    Orchestrator, OrchestratorContext, StateStore, VcsOps,
};

#[derive(Parser)]
#[command(name = "flywheel", about = "Wikilink suggestion and auto-linking engine for a local vault")]
struct Cli {
    /// Vault root. Defaults to `FLYWHEEL_VAULT_PATH`.
    #[arg(long, global = true)]
    vault: Option<PathBuf>,

    /// Commit the mutation to git when the vault is a repository.
    #[arg(long, global = true)]
    commit: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Append content to a section, running the suggestion/auto-link pipeline.
    AddToSection {
        note_path: String,
        section: String,
        payload: String,
        #[arg(long, default_value = "bullet")]
        format: String,
    },
    /// Toggle a checkbox task's state.
    ToggleTask {
        note_path: String,
        section: String,
        task_text: String,
    },
    /// Show the last tracked commit recorded by the engine.
    LastCommit,
    /// Revert the vault's HEAD commit.
    Undo,
}

fn parse_format(s: &str) -> ContentFormat {
    match s.to_ascii_lowercase().as_str() {
        "plain" => ContentFormat::Plain,
        "task" => ContentFormat::Task,
        "numbered" => ContentFormat::Numbered,
        "timestamp" => ContentFormat::TimestampBullet,
        _ => ContentFormat::Bullet,
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let code = run(cli).await;
    std::process::exit(code);
}

async fn run(cli: Cli) -> i32 {
    let vault_path = match cli.vault.or_else(|| std::env::var("FLYWHEEL_VAULT_PATH").ok().map(PathBuf::from)) {
        Some(path) => path,
        None => {
            tracing::error!("no vault path given: pass --vault or set FLYWHEEL_VAULT_PATH");
            return 2;
        }
    };
    let config = EngineConfig::new(vault_path);

    let mut store = match StateStore::open(&config.vault_path) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, "failed to open state store");
            return exit_code(&e);
        }
    };

    match cli.command {
        Command::LastCommit => {
            match VcsOps::last_tracked_commit(&store) {
                Ok(Some(hash)) => println!("{hash}"),
                Ok(None) => println!("no tracked commit"),
                Err(e) => {
                    tracing::error!(error = %e, "failed to read tracked commit");
                    return exit_code(&e);
                }
            }
            0
        }
        Command::Undo => {
            let outcome = VcsOps::undo_last(&config.vault_path).await;
            if outcome.success {
                println!("{}", outcome.message);
                0
            } else {
                tracing::error!(error = %outcome.message, "undo failed");
                3
            }
        }
        Command::AddToSection { note_path, section, payload, format } => {
            let mut index = EntityIndex::new();
            if let Err(e) = index.rebuild(&store) {
                tracing::error!(error = %e, "failed to build entity index");
                return exit_code(&e);
            }
            let snapshot = index.snapshot();

            let ctx = OrchestratorContext {
                vault: config.vault_path.clone(),
                note_path,
                commit: cli.commit,
                commit_prefix: config.commit_prefix.clone(),
                action_description: "add to section".to_string(),
            };
            let operation = Operation::AddToSection {
                section,
                payload,
                format: parse_format(&format),
                position: InsertPosition::Append,
            };
            let now_ms = chrono::Utc::now().timestamp_millis();
            dispatch(Orchestrator::run(&ctx, operation, &mut store, &snapshot, &config, now_ms).await)
        }
        Command::ToggleTask { note_path, section, task_text } => {
            let index = EntityIndex::new();
            let snapshot = index.snapshot();
            let ctx = OrchestratorContext {
                vault: config.vault_path.clone(),
                note_path,
                commit: cli.commit,
                commit_prefix: config.commit_prefix.clone(),
                action_description: "toggle task".to_string(),
            };
            let operation = Operation::ToggleTask { section, task_text };
            let now_ms = chrono::Utc::now().timestamp_millis();
            dispatch(Orchestrator::run(&ctx, operation, &mut store, &snapshot, &config, now_ms).await)
        }
    }
}

fn dispatch(result: Result<flywheel_core::OperationOutcome, EngineError>) -> i32 {
    match result {
        Ok(outcome) => {
            println!("{}", outcome.message);
            if !outcome.suggestion_suffix.is_empty() {
                println!("{}", outcome.suggestion_suffix);
            }
            if let Some(error) = outcome.git_error {
                tracing::warn!(error, "commit did not complete");
                return 3;
            }
            0
        }
        Err(e) => {
            tracing::error!(error = %e, kind = %e.kind(), "operation failed");
            if !e.suggestions.is_empty() {
                tracing::info!(suggestions = ?e.suggestions, "did you mean one of these sections?");
            }
            exit_code(&e)
        }
    }
}
