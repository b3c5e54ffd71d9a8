use std::path::PathBuf;

use anyhow::{Context, Result};
use boxes_server::ServerConfig;
use boxes_settings::BoxesSettings;
use boxes_store::{Database, UserRepo};
use boxes_telemetry::{init_telemetry, TelemetryConfig};
use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;

#[derive(Parser)]
#[command(name = "boxes", version, about = "Box inventory API with weekly and average-volume limits")]
struct Cli {
    /// Settings file (defaults to $BOXES_HOME/settings.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Manage API users
    User {
        #[command(subcommand)]
        command: UserCommand,
    },
}

#[derive(Subcommand)]
enum UserCommand {
    /// Create a user and print its API token
    Add {
        username: String,
        /// Grant staff privileges
        #[arg(long)]
        staff: bool,
    },
    /// List users
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => boxes_settings::load_settings_from_path(path),
        None => boxes_settings::load_settings(),
    }
    .context("failed to load settings")?;
    if let Some(path) = cli.database {
        settings.database.path = path;
    }

    init_telemetry(&TelemetryConfig::from_level_str(
        &settings.logging.level,
        settings.logging.json,
    ))?;

    match cli.command {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                settings.server.host = host;
            }
            if let Some(port) = port {
                settings.server.port = port;
            }
            serve(settings).await
        }
        Command::User { command } => {
            let db = open_db(&settings)?;
            run_user_command(UserRepo::new(db), command)
        }
    }
}

async fn serve(settings: BoxesSettings) -> Result<()> {
    let db = open_db(&settings)?;
    let config = ServerConfig {
        host: settings.server.host,
        port: settings.server.port,
        limits: settings.rules,
    };
    let handle = boxes_server::start(config, db)
        .await
        .context("failed to start server")?;

    tracing::info!(addr = %handle.addr(), "boxes server ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    tracing::info!("shutting down");
    handle.shutdown().await;
    Ok(())
}

fn run_user_command(users: UserRepo, command: UserCommand) -> Result<()> {
    match command {
        UserCommand::Add { username, staff } => {
            let (user, token) = users.create(&username, staff)?;
            println!("created user {} (id {}, staff: {})", user.username, user.id, user.is_staff);
            println!("token: {}", token.expose_secret());
        }
        UserCommand::List => {
            for user in users.list()? {
                println!("{}\t{}\t{}", user.id, user.username, user.is_staff);
            }
        }
    }
    Ok(())
}

fn open_db(settings: &BoxesSettings) -> Result<Database> {
    let path = &settings.database.path;
    Database::open(path).with_context(|| format!("failed to open database at {}", path.display()))
}
