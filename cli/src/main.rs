use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde_json::{Value, json};
use session::supabase::{SupabaseAuth, SupabaseConfig};
use session::{
    AuthSnapshot, IdentityProvider, Language, Navigator, PathClassifier, ProviderError, Session, SessionConfig,
    SessionController, StaticRoutes,
};
use tokio::sync::watch;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("missing Supabase project; pass --supabase-url/--anon-key or set SUPABASE_URL/SUPABASE_ANON_KEY")]
    MissingProject,
    #[error("identity provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("session controller stopped unexpectedly")]
    ControllerStopped,
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "allside-cli", about = "Drive the Allside session controller from a terminal")]
struct Cli {
    #[arg(long, env = "SUPABASE_URL")]
    supabase_url: Option<String>,

    #[arg(long, env = "SUPABASE_ANON_KEY", hide_env_values = true)]
    anon_key: Option<String>,

    /// Log controller internals to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mount the controller on a path and print every navigation it performs.
    Session(SessionCommand),
    /// Revoke an access token.
    SignOut {
        #[arg(long, env = "ALLSIDE_ACCESS_TOKEN", hide_env_values = true)]
        access_token: String,
    },
    /// Show how a path is classified.
    Classify { path: String },
}

#[derive(Args, Debug)]
struct SessionCommand {
    #[arg(long, default_value = "/")]
    path: String,

    #[arg(long, requires = "password")]
    email: Option<String>,

    #[arg(long, env = "ALLSIDE_PASSWORD", hide_env_values = true, requires = "email")]
    password: Option<String>,

    /// Keep following auth events for this many seconds after start-up.
    #[arg(long, default_value_t = 2)]
    watch_secs: u64,
}

/// Prints each redirect instead of changing a browser location.
struct StdoutNavigator;

impl Navigator for StdoutNavigator {
    fn replace(&self, path: &str) {
        println!("navigate {path}");
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Classify { path } => run_classify(&path),
        Command::Session(cmd) => run_session(project(cli.supabase_url, cli.anon_key)?, cmd).await,
        Command::SignOut { access_token } => run_sign_out(project(cli.supabase_url, cli.anon_key)?, access_token).await,
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::WARN };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();
}

fn project(url: Option<String>, anon_key: Option<String>) -> Result<SupabaseConfig, CliError> {
    match (url, anon_key) {
        (Some(url), Some(anon_key)) => Ok(SupabaseConfig::new(url, anon_key)),
        _ => Err(CliError::MissingProject),
    }
}

fn classify(path: &str) -> Value {
    let routes = StaticRoutes;
    json!({
        "path": path,
        "language": routes.language_of(path),
        "public": routes.is_public(path),
        "auth_form": routes.is_auth_form(path),
        "en": routes.localize(path, Language::En),
        "fr": routes.localize(path, Language::Fr),
    })
}

fn run_classify(path: &str) -> Result<(), CliError> {
    print_json(&classify(path))
}

async fn run_session(project: SupabaseConfig, cmd: SessionCommand) -> Result<(), CliError> {
    let auth = Arc::new(SupabaseAuth::new(project)?);
    let mut controller = SessionController::new(auth.clone(), Arc::new(StdoutNavigator))
        .with_config(SessionConfig::from_env());
    let mut snapshots = controller.mount(cmd.path.as_str());

    let settled = snapshots
        .wait_for(|s| !s.loading)
        .await
        .map_err(|_| CliError::ControllerStopped)?
        .clone();
    print_snapshot(&settled)?;

    if let (Some(email), Some(password)) = (cmd.email.as_deref(), cmd.password.as_deref()) {
        auth.sign_in_with_password(email, password).await?;
    }

    follow(&mut snapshots, Duration::from_secs(cmd.watch_secs)).await?;
    controller.unmount().await;
    Ok(())
}

/// Print each published snapshot until `window` elapses.
async fn follow(snapshots: &mut watch::Receiver<AuthSnapshot>, window: Duration) -> Result<(), CliError> {
    let deadline = tokio::time::sleep(window);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            () = &mut deadline => return Ok(()),
            changed = snapshots.changed() => {
                changed.map_err(|_| CliError::ControllerStopped)?;
                let snapshot = snapshots.borrow_and_update().clone();
                print_snapshot(&snapshot)?;
            }
        }
    }
}

async fn run_sign_out(project: SupabaseConfig, access_token: String) -> Result<(), CliError> {
    let auth = SupabaseAuth::new(project)?.with_session(Session { access_token, refresh_token: None, user: None });
    auth.sign_out().await?;
    println!("signed out");
    Ok(())
}

fn print_snapshot(snapshot: &AuthSnapshot) -> Result<(), CliError> {
    print_json(&serde_json::to_value(snapshot)?)
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
