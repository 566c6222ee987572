use reqwest::StatusCode;

/// Why a summary could not be obtained from the backend.
#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    #[error("Summary backend unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),

    // Anything other than exactly 200 OK
    #[error("Summary backend responded with status {status}")]
    Status { status: StatusCode },

    #[error("Summary backend returned a malformed body: {0}")]
    MalformedBody(#[source] serde_json::Error),

    #[error("Invalid summary endpoint URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

impl SummaryError {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SummaryError::Unreachable(_) => "unreachable",
            SummaryError::Status { .. } => "status",
            SummaryError::MalformedBody(_) => "malformed_body",
            SummaryError::InvalidUrl(_) => "invalid_url",
            SummaryError::HttpClient(_) => "http_client",
        }
    }
}
