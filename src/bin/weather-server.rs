//! Weather tool server — MCP over stdio.
//!
//! Spawned by the agent as a child process. Reads JSON-RPC requests from
//! stdin and writes replies to stdout, one message per line. Logs go to a
//! file; stderr is reserved for startup failures the parent surfaces.

use anyhow::Context;
use weather_agent::config::AppConfig;
use weather_agent::weather::{source_from_config, WeatherServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid weather server configuration")?;

    if let Err(e) = weather_agent::init_tracing(&config.logging, "weather-server.log") {
        eprintln!("weather-server: logging disabled: {e}");
    }

    let source = source_from_config(&config.weather);
    tracing::info!(
        source = source.name(),
        pid = std::process::id(),
        "weather server starting"
    );

    WeatherServer::new(source)
        .serve(tokio::io::stdin(), tokio::io::stdout())
        .await
        .context("stdio channel failed")?;
    Ok(())
}
