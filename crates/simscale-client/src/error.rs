//! Error types for the HTTP backend.

use thiserror::Error;

use simscale_orchestrator::BackendError;

/// Errors that can occur when talking to the batch service.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Invalid endpoint or client setup.
    #[error("connection failed: {0}")]
    Connection(String),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status returned by the service.
    #[error("HTTP {status}{}: {message}", code.as_deref().map(|c| format!(" ({c})")).unwrap_or_default())]
    Status {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<ClientError> for BackendError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Status {
                status: 404,
                message,
                ..
            } => BackendError::NotFound(message),
            ClientError::Status {
                status: 409,
                message,
                ..
            } => BackendError::Conflict(message),
            ClientError::Status {
                status, message, ..
            } => BackendError::Rejected { status, message },
            ClientError::Http(e) if e.is_decode() => BackendError::InvalidResponse(e.to_string()),
            ClientError::Http(e) => BackendError::Transport(e.to_string()),
            ClientError::Connection(msg) => BackendError::Transport(msg),
            ClientError::Serialization(msg) => BackendError::InvalidResponse(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16) -> ClientError {
        ClientError::Status {
            status,
            code: Some("Code".to_string()),
            message: "msg".to_string(),
        }
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(BackendError::from(status(404)), BackendError::NotFound(_)));
        assert!(matches!(BackendError::from(status(409)), BackendError::Conflict(_)));
        assert!(matches!(
            BackendError::from(status(503)),
            BackendError::Rejected { status: 503, .. }
        ));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(status(409).to_string(), "HTTP 409 (Code): msg");
        let bare = ClientError::Status {
            status: 500,
            code: None,
            message: "boom".to_string(),
        };
        assert_eq!(bare.to_string(), "HTTP 500: boom");
    }

    #[test]
    fn test_serialization_is_invalid_response() {
        let err = serde_json::from_str::<u32>("nope").unwrap_err();
        assert!(matches!(
            BackendError::from(ClientError::from(err)),
            BackendError::InvalidResponse(_)
        ));
    }
}
