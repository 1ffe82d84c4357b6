/// Failures crossing a component boundary.
///
/// Every variant is `Clone` so a single in-flight request can hand the same
/// failure to every caller waiting on it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FinderError {
    #[error("Location permission denied")]
    PermissionDenied,
    #[error("Request to {0} timed out")]
    Timeout(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Unexpected status {status} from {endpoint}")]
    Status { status: u16, endpoint: String },
    #[error("Malformed response from {endpoint}: {message}")]
    Parse { endpoint: String, message: String },
    #[error("Position unavailable: {0}")]
    Position(String),
    #[error("Invalid parameter: {0}")]
    Validation(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl FinderError {
    /// Failures that may succeed when the same request is issued again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FinderError::Timeout(_)
                | FinderError::Network(_)
                | FinderError::Status { .. }
                | FinderError::Parse { .. }
                | FinderError::Position(_)
        )
    }

    pub(crate) fn from_ureq(endpoint: &str, err: ureq::Error) -> Self {
        match err {
            ureq::Error::Timeout(_) => FinderError::Timeout(endpoint.to_string()),
            ureq::Error::StatusCode(status) => FinderError::Status {
                status,
                endpoint: endpoint.to_string(),
            },
            ureq::Error::Json(e) => FinderError::Parse {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            },
            other => FinderError::Network(format!("{}: {}", endpoint, other)),
        }
    }
}

impl From<std::io::Error> for FinderError {
    fn from(err: std::io::Error) -> Self {
        FinderError::Storage(err.to_string())
    }
}

pub type FinderResult<T> = Result<T, FinderError>;
