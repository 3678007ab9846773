//! blogctl CLI - authentication and realtime crawler-task monitoring.
//!
//! This is the binary entry point. See the `blogctl` library for the
//! transport pipeline and channel implementation.

use anyhow::Result;
use blogctl::{api, ApiClient, Config, CredentialStore, TaskChannel, TaskRecord};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "blogctl", version, about = "Admin client for the blog platform")]
struct Cli {
    /// Server base URL (overrides config and BLOGCTL_SERVER_URL).
    #[arg(long)]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Authenticate and store the bearer token.
    Login {
        /// Admin account name.
        username: String,
        /// Password; falls back to BLOGCTL_PASSWORD, then prompts.
        #[arg(long)]
        password: Option<String>,
    },
    /// Clear the stored token and cached key.
    Logout,
    /// One-shot crawler task listing.
    Tasks {
        /// Filter by status (running / completed / failed).
        #[arg(long)]
        status: Option<String>,
    },
    /// Follow task updates over the realtime channel until Ctrl-C.
    Monitor,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let mut config = Config::load()?;
    if let Some(server) = cli.server {
        config.server_url = server;
    }

    let store = Arc::new(CredentialStore::open()?);
    let client = ApiClient::new(&config, Arc::clone(&store))?;

    match cli.command {
        Commands::Login { username, password } => {
            let password = match password.or_else(|| std::env::var("BLOGCTL_PASSWORD").ok()) {
                Some(p) => p,
                None => prompt_password()?,
            };
            let response = api::auth::login(&client, &username, &password).await?;
            let name = response
                .user
                .map(|u| u.username)
                .unwrap_or_else(|| username.clone());
            println!("Logged in as {name}.");
            if response.is_default_password {
                println!("Warning: this account still uses the default password.");
            }
        }

        Commands::Logout => {
            api::auth::logout(&client);
            println!("Logged out.");
        }

        Commands::Tasks { status } => {
            let query = api::tasks::TaskQuery {
                status,
                ..api::tasks::TaskQuery::default()
            };
            let page = api::tasks::list(&client, &query).await?;
            if page.items.is_empty() {
                println!("No tasks.");
            } else {
                for task in &page.items {
                    println!("{}", render_task(task));
                }
                println!("{} of {} task(s)", page.items.len(), page.total);
            }
        }

        Commands::Monitor => monitor(&config, &client, store).await?,
    }

    Ok(())
}

/// Follow task updates until Ctrl-C.
async fn monitor(config: &Config, client: &ApiClient, store: Arc<CredentialStore>) -> Result<()> {
    let channel = TaskChannel::new(config, store);

    // Seed with the current listing; the channel still works without it.
    match api::tasks::list(client, &api::tasks::TaskQuery::default()).await {
        Ok(page) => channel.tasks().set(page.items),
        Err(e) => log::warn!("Initial task listing failed: {e}"),
    }

    channel.connect();
    println!("Monitoring crawler tasks (Ctrl-C to stop)...");
    for task in channel.tasks().snapshot() {
        println!("{}", render_task(&task));
    }

    let mut seen: HashMap<String, String> = HashMap::new();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            () = tokio::time::sleep(Duration::from_secs(1)) => {
                for task in channel.tasks().snapshot() {
                    let line = render_task(&task);
                    if seen.get(&task.task_id) != Some(&line) {
                        println!("{line}");
                        seen.insert(task.task_id.clone(), line);
                    }
                }
            }
        }
    }

    channel.disconnect();
    // Let the driver run its teardown before the runtime goes away.
    tokio::time::sleep(Duration::from_millis(100)).await;
    println!("Stopped.");
    Ok(())
}

fn render_task(task: &TaskRecord) -> String {
    let status = task.status().unwrap_or("unknown");
    let progress = task
        .fields
        .get("progress")
        .and_then(serde_json::Value::as_i64)
        .map(|p| format!(" {p}%"))
        .unwrap_or_default();
    let message = task
        .fields
        .get("message")
        .and_then(serde_json::Value::as_str)
        .filter(|m| !m.is_empty())
        .map(|m| format!("  {m}"))
        .unwrap_or_default();
    format!("[{status}]{progress} {}{message}", task.task_id)
}

fn prompt_password() -> Result<String> {
    print!("Password: ");
    std::io::stdout().flush()?;
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim_end().to_string())
}
