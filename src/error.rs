use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrateError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("API request failed with status {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("API request failed with status {status} after {retries} retries")]
    RetriesExhausted { status: u16, retries: u32 },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Command failed: {command}\n{stderr}")]
    Git { command: String, stderr: String },

    #[error("Invalid project filter: {0}")]
    InvalidFilter(#[from] regex::Error),
}

impl MigrateError {
    /// HTTP status carried by the error, if it came from an upstream response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } | Self::RetriesExhausted { status, .. } => Some(*status),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.status().is_some_and(is_transient_status)
    }

    /// 422 responses that report a duplicate label, ref or repository.
    pub fn is_already_exists(&self) -> bool {
        match self {
            Self::Upstream { status: 422, body } => {
                body.contains("already exists") || body.contains("already_exists")
            }
            _ => false,
        }
    }

    /// Pull request rejected because head and base do not differ or head is unusable.
    pub fn is_precondition_failure(&self) -> bool {
        match self {
            Self::Upstream { status: 422, body } => {
                body.contains("No commits between")
                    || (body.contains("Validation Failed")
                        && body.contains(r#""head","code":"invalid""#))
            }
            _ => false,
        }
    }
}

pub fn is_transient_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

pub type Result<T> = std::result::Result<T, MigrateError>;
