use thiserror::Error;

/// Everything that can go wrong inside the telemetry pipeline.
///
/// None of these ever reach a request handler: the recording functions,
/// the HTTP middleware and the flusher loop all catch them and report
/// them on the local `tracing` channel instead.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend responded with HTTP status {status}")]
    Status { status: u16 },

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("diagnostics init failed: {0}")]
    Diagnostics(String),
}

pub type Result<T, E = TelemetryError> = std::result::Result<T, E>;
