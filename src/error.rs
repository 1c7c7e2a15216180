//! Error handling for Aeolus
//!
//! Every error carries a stable code and a recoverability class so that
//! layers can decide between "log and skip" and "abort the cycle".

use thiserror::Error;

/// Result type alias for Aeolus operations
pub type Result<T> = std::result::Result<T, AeolusError>;

/// Main error type for Aeolus operations
#[derive(Error, Debug)]
pub enum AeolusError {
    // Audio Graph Errors
    #[error("Gain bus not ready: {bus}")]
    BusNotReady { bus: String },

    #[error("Unknown audio node: {id}")]
    UnknownNode { id: u64 },

    #[error("Audio node already disposed: {id}")]
    NodeDisposed { id: u64 },

    #[error("Audio node {id} does not support {operation}")]
    UnsupportedOperation { id: u64, operation: &'static str },

    #[error("Audio context is not running")]
    AudioContextSuspended,

    #[error("Invalid pitch: {name}")]
    InvalidPitch { name: String },

    // Resource Errors
    #[error("Asset not found: {path}")]
    AssetNotFound { path: String },

    #[error("Failed to decode asset {path}: {reason}")]
    AssetDecode { path: String, reason: String },

    #[error("No chime samples could be loaded ({attempted} attempted)")]
    NoChimesLoaded { attempted: usize },

    // Weather Errors
    #[error("Missing weather field: {field}")]
    MissingWeatherField { field: &'static str },

    #[error("Incomplete weather data: missing {missing}")]
    IncompleteWeather { missing: &'static str },

    #[error("Weather request failed: {reason}")]
    WeatherFetch { reason: String },

    #[error("Location unavailable: {reason}")]
    LocationUnavailable { reason: String },

    #[error("Telemetry post failed: {reason}")]
    Telemetry { reason: String },

    // Session Errors
    #[error("A scene cycle is already running")]
    CycleInProgress,

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl AeolusError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            AeolusError::BusNotReady { .. } => "BUS_NOT_READY",
            AeolusError::UnknownNode { .. } => "UNKNOWN_NODE",
            AeolusError::NodeDisposed { .. } => "NODE_DISPOSED",
            AeolusError::UnsupportedOperation { .. } => "UNSUPPORTED_OPERATION",
            AeolusError::AudioContextSuspended => "AUDIO_CONTEXT_SUSPENDED",
            AeolusError::InvalidPitch { .. } => "INVALID_PITCH",
            AeolusError::AssetNotFound { .. } => "ASSET_NOT_FOUND",
            AeolusError::AssetDecode { .. } => "ASSET_DECODE",
            AeolusError::NoChimesLoaded { .. } => "NO_CHIMES_LOADED",
            AeolusError::MissingWeatherField { .. } => "MISSING_WEATHER_FIELD",
            AeolusError::IncompleteWeather { .. } => "INCOMPLETE_WEATHER",
            AeolusError::WeatherFetch { .. } => "WEATHER_FETCH",
            AeolusError::LocationUnavailable { .. } => "LOCATION_UNAVAILABLE",
            AeolusError::Telemetry { .. } => "TELEMETRY",
            AeolusError::CycleInProgress => "CYCLE_IN_PROGRESS",
            AeolusError::InvalidConfig { .. } => "INVALID_CONFIG",
            AeolusError::Io(_) => "IO_ERROR",
            AeolusError::Serialization(_) => "SERIALIZATION_ERROR",
            #[cfg(feature = "http")]
            AeolusError::Http(_) => "HTTP_ERROR",
        }
    }

    /// Check if this error is recoverable without aborting the cycle
    ///
    /// Resource-load failures and missing per-layer weather fields only
    /// silence the dependent layer; node errors during teardown are swallowed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AeolusError::BusNotReady { .. }
                | AeolusError::UnknownNode { .. }
                | AeolusError::NodeDisposed { .. }
                | AeolusError::AudioContextSuspended
                | AeolusError::AssetNotFound { .. }
                | AeolusError::AssetDecode { .. }
                | AeolusError::NoChimesLoaded { .. }
                | AeolusError::MissingWeatherField { .. }
                | AeolusError::Telemetry { .. }
                | AeolusError::CycleInProgress
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            AeolusError::BusNotReady { .. } => vec![
                "Initialize the session before starting layers",
                "The operation was skipped; the next cycle will retry",
            ],
            AeolusError::AssetNotFound { .. } | AeolusError::AssetDecode { .. } => vec![
                "Check the asset root in the configuration",
                "Only WAV files can be decoded",
            ],
            AeolusError::NoChimesLoaded { .. } => vec![
                "Check that the chime sample directory exists under the asset root",
            ],
            AeolusError::IncompleteWeather { .. } | AeolusError::WeatherFetch { .. } => vec![
                "Check the weather API key and endpoint",
                "The cycle will retry once with the last known coordinates",
            ],
            AeolusError::LocationUnavailable { .. } => vec![
                "Pass --lat and --lon or set coordinates in the configuration",
            ],
            AeolusError::InvalidConfig { .. } => vec![
                "All durations in the timings block must be positive",
            ],
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = AeolusError::BusNotReady {
            bus: "drone".to_string(),
        };
        assert_eq!(err.error_code(), "BUS_NOT_READY");
        assert_eq!(err.to_string(), "Gain bus not ready: drone");
    }

    #[test]
    fn test_layer_errors_are_recoverable() {
        assert!(AeolusError::MissingWeatherField { field: "uv" }.is_recoverable());
        assert!(AeolusError::NodeDisposed { id: 3 }.is_recoverable());
        assert!(!AeolusError::IncompleteWeather { missing: "location" }.is_recoverable());
    }

    #[test]
    fn test_recovery_suggestions() {
        let err = AeolusError::WeatherFetch {
            reason: "timeout".to_string(),
        };
        assert!(!err.recovery_suggestions().is_empty());
    }
}
