//! The weather tool server that runs as the MCP subprocess.

pub mod errors;
pub mod format;
pub mod location;
pub mod provider;
pub mod server;

pub use errors::WeatherError;
pub use provider::{source_from_config, QWeatherClient, SimulatedWeather, WeatherSource};
pub use server::WeatherServer;
