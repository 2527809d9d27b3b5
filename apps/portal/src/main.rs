use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{HttpWorkflowApi, SessionState, UserPortal};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod console;
mod render;

use config::{load_settings, Overrides};
use console::{ConsoleCommand, Flow};

/// Console client for the workflow portal.
#[derive(Parser, Debug)]
#[command(name = "workflow-portal")]
struct Args {
    /// Settings file; defaults to ./portal.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    username: Option<String>,
    /// Signs in on startup together with --username.
    #[arg(long)]
    password: Option<String>,
    #[arg(long)]
    request_timeout_secs: Option<u64>,
    #[arg(long)]
    log_filter: Option<String>,
}

impl From<Args> for Overrides {
    fn from(args: Args) -> Self {
        Self {
            config: args.config,
            server_url: args.server_url,
            username: args.username,
            password: args.password,
            request_timeout_secs: args.request_timeout_secs,
            log_filter: args.log_filter,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = load_settings(&Args::parse().into())?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_filter))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let session = Arc::new(SessionState::new());
    let api = HttpWorkflowApi::with_timeout(
        &settings.server_url,
        session.clone(),
        settings.request_timeout(),
    )
    .with_context(|| format!("cannot use server url '{}'", settings.server_url))?;
    info!(server_url = api.server_url(), "workflow portal starting");
    let portal = UserPortal::new(Arc::new(api), session);
    let printer = render::spawn_printer(portal.subscribe_events());

    if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
        let _ = portal.login(username, password).await;
    } else if let Some(username) = &settings.username {
        println!("type 'login {username} <password>' to sign in");
    }
    println!("{}", console::HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match ConsoleCommand::parse(&line) {
            Ok(None) => {}
            Ok(Some(command)) => {
                if console::execute(&portal, command).await == Flow::Quit {
                    break;
                }
            }
            Err(err) => println!("{err:#}"),
        }
    }

    if portal.session().current().await.is_some() {
        portal.logout().await;
    }
    drop(portal);
    let _ = printer.await;
    Ok(())
}
