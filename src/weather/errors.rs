//! Weather provider error types.

use thiserror::Error;

/// Errors raised while resolving locations or fetching weather data.
#[derive(Debug, Error)]
pub enum WeatherError {
    /// Provider settings are missing or malformed.
    #[error("weather provider misconfigured: {reason}")]
    Config { reason: String },

    /// The HTTP request could not be completed.
    #[error("request to {endpoint} failed: {reason}")]
    Http { endpoint: String, reason: String },

    /// The provider answered with a non-success HTTP status.
    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },

    /// The provider answered with a non-"200" API code.
    #[error("{endpoint} returned API code {code}")]
    Api { endpoint: String, code: String },

    /// The response body was not the expected JSON.
    #[error("failed to parse response from {endpoint}: {reason}")]
    Parse { endpoint: String, reason: String },

    /// The location could not be turned into a city id or coordinates.
    #[error("unable to resolve location: {location}")]
    Unresolved { location: String },

    /// The provider returned an empty data set.
    #[error("no forecast data for {location}")]
    NoData { location: String },
}
