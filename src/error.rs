use std::fmt::{Display, Formatter};

/// Failure categories of the remote completion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    AuthError,
    RateLimited,
    ServerError,
    NetworkError,
    Timeout,
}

impl ServiceErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthError => "auth_error",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::NetworkError => "network_error",
            Self::Timeout => "timeout",
        }
    }

    /// Classify a non-success HTTP status returned by the provider.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::AuthError,
            429 => Self::RateLimited,
            _ => Self::ServerError,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceError {
    pub kind: ServiceErrorKind,
    pub message: String,
}

impl ServiceError {
    pub fn new(kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for ServiceError {}

impl From<reqwest::Error> for ServiceError {
    fn from(value: reqwest::Error) -> Self {
        let kind = if value.is_timeout() {
            ServiceErrorKind::Timeout
        } else if let Some(status) = value.status() {
            ServiceErrorKind::from_status(status.as_u16())
        } else if value.is_decode() {
            ServiceErrorKind::ServerError
        } else {
            ServiceErrorKind::NetworkError
        };
        ServiceError::new(kind, value.to_string())
    }
}

#[derive(Debug)]
pub enum AppError {
    InvalidInput(String),
    Service(ServiceError),
    SelectionExhausted(String),
    Config(String),
    Json(serde_json::Error),
    Io(std::io::Error),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::InvalidInput(s) => write!(f, "invalid input: {}", s),
            AppError::Service(e) => write!(f, "completion service failed: {}", e),
            AppError::SelectionExhausted(s) => write!(f, "speaker selection exhausted: {}", s),
            AppError::Config(s) => write!(f, "configuration error: {}", s),
            AppError::Json(e) => write!(f, "{}", e),
            AppError::Io(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for AppError {}

impl From<ServiceError> for AppError {
    fn from(value: ServiceError) -> Self {
        AppError::Service(value)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        AppError::Json(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        AppError::Io(value)
    }
}
