use thiserror::Error;
use yardsale_search::FetchFailure;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("endpoint not found: {url}")]
    NotFound { url: String },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// The body parsed as JSON but is not a `{ ok, data | error }` envelope.
    #[error("malformed {context} envelope: {reason}")]
    Envelope { context: String, reason: String },

    /// The API answered `ok: false`.
    #[error("sales API error: {0}")]
    Api(String),

    #[error("invalid base URL \"{base_url}\": {reason}")]
    InvalidBaseUrl { base_url: String, reason: String },
}

impl From<ClientError> for FetchFailure {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Deserialize { .. } | ClientError::Envelope { .. } => {
                FetchFailure::Malformed(err.to_string())
            }
            ClientError::Http(_)
            | ClientError::NotFound { .. }
            | ClientError::UnexpectedStatus { .. }
            | ClientError::Api(_)
            | ClientError::InvalidBaseUrl { .. } => FetchFailure::Network(err.to_string()),
        }
    }
}
