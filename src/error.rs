use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("FortiADC API error: code {code} from {path}")]
    Api { code: i64, path: String },

    #[error("Sink write failed: {0}")]
    SinkWriteFailed(String),

    #[error("Empty topology: {0}")]
    EmptyTopology(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExporterError {
    /// Faults that invalidate the current session and are retried with backoff.
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            ExporterError::ConnectionFailed(_) | ExporterError::AuthenticationFailed(_)
        )
    }

    /// Faults scoped to one piece of data; the scrape cycle carries on without it.
    pub fn is_data_level(&self) -> bool {
        matches!(
            self,
            ExporterError::MalformedResponse(_)
                | ExporterError::Api { .. }
                | ExporterError::Json(_)
        )
    }

    /// Short label used for the `kind` dimension of the error counter.
    pub fn kind(&self) -> &'static str {
        match self {
            ExporterError::AuthenticationFailed(_) => "authentication",
            ExporterError::ConnectionFailed(_) => "connection",
            ExporterError::MalformedResponse(_) | ExporterError::Json(_) => "malformed",
            ExporterError::Api { .. } => "api",
            ExporterError::SinkWriteFailed(_) => "sink",
            ExporterError::EmptyTopology(_) => "empty_topology",
            ExporterError::Config(_) => "config",
            ExporterError::Server(_) => "server",
            ExporterError::Io(_) => "io",
        }
    }
}

impl From<reqwest::Error> for ExporterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ExporterError::MalformedResponse(err.to_string())
        } else if err.is_builder() {
            ExporterError::Config(err.to_string())
        } else {
            ExporterError::ConnectionFailed(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, ExporterError>;
