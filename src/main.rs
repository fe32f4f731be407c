//! `weather-agent` command-line entry point.
//!
//! ```text
//! weather-agent ask "Is Beijing good for a hike this weekend?"
//! weather-agent chat
//! weather-agent forecast 北京 --days 7
//! weather-agent warning shanghai
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use weather_agent::agent_core::WeatherAgent;
use weather_agent::config::AppConfig;
use weather_agent::mcp_client::{fetch_forecast, WeatherToolsClient};

#[derive(Parser, Debug)]
#[command(
    name = "weather-agent",
    version,
    about = "Weather assistant driving a tool server over MCP stdio"
)]
struct Cli {
    /// YAML configuration file (environment variables fill unset fields)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Weather server executable or script, overriding discovery
    #[arg(long)]
    server: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer a single question, then exit
    Ask {
        #[arg(required = true)]
        query: Vec<String>,
    },
    /// Interactive session; type `exit` to quit
    Chat,
    /// Print the daily forecast without involving the model
    Forecast {
        location: String,
        #[arg(short, long, default_value_t = 3)]
        days: u32,
    },
    /// Print active weather warnings without involving the model
    Warning { location: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => AppConfig::from_env().context("invalid configuration")?,
    };
    if let Some(server) = cli.server {
        config.server.path = Some(server);
    }

    match weather_agent::init_tracing(&config.logging, "agent.log") {
        Ok(path) => tracing::debug!(log_file = %path.display(), "logging initialized"),
        Err(e) => eprintln!("warning: logging disabled: {e}"),
    }

    match cli.command {
        Command::Ask { query } => {
            let answer = WeatherAgent::ask_once(config, &query.join(" ")).await?;
            println!("{answer}");
        }
        Command::Chat => chat(config).await?,
        Command::Forecast { location, days } => {
            println!("{}", fetch_forecast(&config, &location, days).await?);
        }
        Command::Warning { location } => {
            let mut client = WeatherToolsClient::new(&config);
            let result = match client.connect(&config).await {
                Ok(()) => client.get_weather_warning(&location).await,
                Err(e) => Err(e),
            };
            client.close().await;
            println!("{}", result?);
        }
    }
    Ok(())
}

/// Read queries from stdin until `exit`, EOF, or Ctrl-C.
async fn chat(config: AppConfig) -> anyhow::Result<()> {
    let agent = WeatherAgent::from_config(config)?;
    if let Err(e) = agent.initialize().await {
        agent.cleanup().await;
        return Err(e.into());
    }

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let result: anyhow::Result<()> = async {
        loop {
            stdout.write_all(b"> ").await?;
            stdout.flush().await?;

            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => None,
            };
            let Some(line) = line else { break };
            let query = line.trim();
            if query.is_empty() {
                continue;
            }
            if matches!(query, "exit" | "quit") {
                break;
            }

            tokio::select! {
                answer = agent.ask(query) => {
                    stdout.write_all(format!("{}\n\n", answer?).as_bytes()).await?;
                }
                _ = tokio::signal::ctrl_c() => {
                    stdout.write_all(b"\ninterrupted\n").await?;
                    break;
                }
            }
        }
        Ok(())
    }
    .await;

    agent.cleanup().await;
    result
}
