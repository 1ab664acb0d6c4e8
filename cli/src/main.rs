use std::collections::HashMap;
use std::io::{self, BufRead};

use clap::{Args, Parser, Subcommand};
use fitsession::validate::validate_new_secret;
use fitsession::workout::{self, WorkoutForm};
use fitsession::{ApiClient, PendingReset, SessionConfig, SessionError, SessionManager};
use reqwest::Method;
use serde_json::{Value, json};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("failed to read password: {0}")]
    Io(#[from] io::Error),
    #[error("missing password; pass --password, set FITSESSION_PASSWORD or type it on stdin")]
    MissingSecret,
    #[error("logging setup failed: {0}")]
    Logging(String),
}

#[derive(Parser, Debug)]
#[command(name = "fitsession", about = "Fitness tracker session and API CLI")]
struct Cli {
    #[arg(long, env = "FITSESSION_BACKEND")]
    backend: Option<String>,

    #[arg(long, env = "FITSESSION_API_URL")]
    api_url: Option<String>,

    #[arg(long, env = "FITSESSION_STORE_DIR")]
    store_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and remember the session.
    Login(CredentialArgs),
    /// Create an account.
    Register(CredentialArgs),
    Logout,
    /// Show the remembered session.
    Whoami,
    Reset(ResetCommand),
    Api(ApiCommand),
    Workout(WorkoutCommand),
}

#[derive(Args, Debug)]
struct CredentialArgs {
    #[arg(long)]
    email: String,

    #[arg(long, env = "FITSESSION_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[derive(Args, Debug)]
struct ResetCommand {
    #[command(subcommand)]
    command: ResetSubcommand,
}

#[derive(Subcommand, Debug)]
enum ResetSubcommand {
    /// Ask for a reset link by email.
    Request {
        #[arg(long)]
        email: String,
    },
    /// Set a new password from a reset link or bare token.
    Confirm {
        #[arg(long)]
        link: String,

        #[arg(long, env = "FITSESSION_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        #[arg(long, help = "Repeat of the new password; defaults to --password")]
        confirm: Option<String>,
    },
}

#[derive(Args, Debug)]
struct ApiCommand {
    #[command(subcommand)]
    command: ApiSubcommand,
}

#[derive(Subcommand, Debug)]
enum ApiSubcommand {
    Get {
        path: String,
    },
    Post {
        path: String,
        #[arg(long)]
        data: String,
    },
    Put {
        path: String,
        #[arg(long)]
        data: String,
    },
    Delete {
        path: String,
    },
}

#[derive(Args, Debug)]
struct WorkoutCommand {
    #[command(subcommand)]
    command: WorkoutSubcommand,
}

#[derive(Subcommand, Debug)]
enum WorkoutSubcommand {
    Exercises,
    Log {
        #[arg(long)]
        exercise: u64,
        #[arg(long)]
        weight: String,
        #[arg(long)]
        reps: String,
        #[arg(long)]
        sets: String,
        #[arg(long, default_value = "")]
        notes: String,
        #[arg(long, default_value = "", help = "YYYY-MM-DD; defaults to today")]
        date: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "fitsession=warn".into()),
        )
        .with_writer(io::stderr)
        .try_init()
        .map_err(|e| CliError::Logging(e.to_string()))?;

    let config = load_config(&cli)?;
    let manager = SessionManager::from_config(&config)?;
    tracing::debug!(backend = ?config.backend, api_url = %config.api_url, "session manager ready");

    match cli.command {
        Command::Login(args) => run_login(&manager, args).await,
        Command::Register(args) => run_register(&manager, args).await,
        Command::Logout => run_logout(&manager).await,
        Command::Whoami => run_whoami(&manager).await,
        Command::Reset(reset) => run_reset(&manager, reset).await,
        Command::Api(api) => run_api(&config, manager, api).await,
        Command::Workout(cmd) => run_workout(&config, manager, cmd).await,
    }
}

/// Environment settings with command-line flags taking precedence.
fn load_config(cli: &Cli) -> Result<SessionConfig, CliError> {
    let overrides: HashMap<&str, String> = [
        ("FITSESSION_BACKEND", cli.backend.clone()),
        ("FITSESSION_API_URL", cli.api_url.clone()),
        ("FITSESSION_STORE_DIR", cli.store_dir.clone()),
    ]
    .into_iter()
    .filter_map(|(key, value)| value.map(|value| (key, value)))
    .collect();

    let config = SessionConfig::from_lookup(|key| overrides.get(key).cloned().or_else(|| std::env::var(key).ok()))?;
    Ok(config)
}

async fn run_login(manager: &SessionManager, args: CredentialArgs) -> Result<(), CliError> {
    let password = resolve_secret(args.password)?;
    let session = manager.sign_in(&args.email, &password).await?;
    print_json(&json!({
        "status": manager.state().status,
        "signed_in_as": session.user.display_name(),
        "user": session.user,
    }))
}

async fn run_register(manager: &SessionManager, args: CredentialArgs) -> Result<(), CliError> {
    let password = resolve_secret(args.password)?;
    let outcome = manager.sign_up(&args.email, &password).await?;
    let state = manager.state();
    print_json(&json!({
        "status": state.status,
        "user": outcome.user,
        "signed_in": state.is_authenticated(),
    }))
}

async fn run_logout(manager: &SessionManager) -> Result<(), CliError> {
    manager.initialize().await;
    if let Err(error) = manager.sign_out().await {
        tracing::warn!(%error, "remote sign-out failed; local session cleared");
    }
    print_json(&json!({ "status": manager.state().status }))
}

async fn run_whoami(manager: &SessionManager) -> Result<(), CliError> {
    let state = manager.initialize().await;
    print_json(&json!({ "status": state.status, "user": state.user() }))
}

async fn run_reset(manager: &SessionManager, reset: ResetCommand) -> Result<(), CliError> {
    match reset.command {
        ResetSubcommand::Request { email } => {
            manager.request_password_reset(&email).await?;
            print_json(&json!({ "message": "If the email exists, a reset link has been sent" }))
        }
        ResetSubcommand::Confirm { link, password, confirm } => {
            let pending = PendingReset::from_link(&link)?;
            let password = resolve_secret(password)?;
            let confirm = confirm.unwrap_or_else(|| password.clone());
            validate_new_secret(&password, &confirm)?;
            manager.confirm_password_reset(&pending.token, &password).await?;
            print_json(&json!({ "message": "Password updated; sign in with the new password" }))
        }
    }
}

async fn run_api(config: &SessionConfig, manager: SessionManager, api: ApiCommand) -> Result<(), CliError> {
    manager.initialize().await;
    let client = ApiClient::new(&config.api_url, config.timeouts, manager)?;
    let (method, path, body) = match api.command {
        ApiSubcommand::Get { path } => (Method::GET, path, None),
        ApiSubcommand::Post { path, data } => (Method::POST, path, Some(serde_json::from_str::<Value>(&data)?)),
        ApiSubcommand::Put { path, data } => (Method::PUT, path, Some(serde_json::from_str::<Value>(&data)?)),
        ApiSubcommand::Delete { path } => (Method::DELETE, path, None),
    };
    let json = client.request_value(method, &path, body.as_ref()).await?;
    print_json(&json)
}

async fn run_workout(config: &SessionConfig, manager: SessionManager, cmd: WorkoutCommand) -> Result<(), CliError> {
    manager.initialize().await;
    let client = ApiClient::new(&config.api_url, config.timeouts, manager)?;
    match cmd.command {
        WorkoutSubcommand::Exercises => {
            let exercises = workout::list_exercises(&client).await?;
            print_json(&serde_json::to_value(exercises)?)
        }
        WorkoutSubcommand::Log { exercise, weight, reps, sets, notes, date } => {
            let form = WorkoutForm { exercise_id: Some(exercise), weight, reps, sets, notes, date };
            let request = form.to_request()?;
            let entry = workout::submit_entry(&client, &request).await?;
            print_json(&json!({ "score": entry.score, "is_pr": entry.is_pr, "date": entry.date }))
        }
    }
}

/// Use the flag or environment value, else read one line from stdin.
fn resolve_secret(flag: Option<String>) -> Result<String, CliError> {
    if let Some(secret) = flag.filter(|secret| !secret.is_empty()) {
        return Ok(secret);
    }
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let secret = line.trim_end_matches(['\r', '\n']).to_owned();
    if secret.is_empty() {
        return Err(CliError::MissingSecret);
    }
    Ok(secret)
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
