use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use weather_api::api::{self, AppState};
use weather_api::auth::{hash_password, read_password};
use weather_api::cache::CacheStore;
use weather_api::config::WeatherApiConfig;
use weather_api::{telemetry, web};

#[derive(Parser)]
#[command(name = "weather-api", version, about = "Weather forecast API with caching, authentication and rate limiting")]
struct Cli {
    /// Path to a TOML configuration file (defaults to ./config.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Print a bcrypt hash for use in `auth.users`.
    /// Reads the password from stdin unless given as an argument.
    HashPassword { password: Option<String> },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(cli.config).await,
        Command::HashPassword { password } => {
            let password = match password {
                Some(password) => password,
                None => read_password(std::io::stdin().lock())?,
            };
            println!("{}", hash_password(&password)?);
            Ok(())
        }
    }
}

async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    let config = WeatherApiConfig::load_from_path(config_path.as_deref())?;
    let telemetry = telemetry::init(&config.logging, &config.telemetry)?;

    tracing::info!(version = weather_api::VERSION, "Starting weather-api");

    let result = async {
        let cache = CacheStore::connect(&config.cache).await;
        let state = AppState::from_config(&config, cache)?;
        web::run(&config.server, api::router(state)).await
    }
    .await;

    if let Err(err) = &result {
        tracing::error!("Server failed: {:#}", err);
    }

    telemetry.shutdown();
    result
}
