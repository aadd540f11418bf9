use hyper::http::StatusCode;
use thiserror::Error;

/// Boxed error used for request bodies coming off the transport.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Standard error type for the dotweb framework.
#[derive(Debug, Error)]
pub enum DotwebError {
    #[error("route conflict: {0}")]
    RouteConflict(String),

    #[error("malformed route: {0}")]
    RouteMalformed(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("request body is empty")]
    EmptyBody,

    #[error("connection is not hijackable")]
    NotHijackable,

    #[error("response header already committed")]
    HeaderAlreadyCommitted,

    #[error("session store failure: {0}")]
    SessionStoreFailure(String),

    #[error("cache store failure: {0}")]
    CacheStoreFailure(String),

    #[error("config parse error: {0}")]
    ConfigParse(String),

    #[error("handler panicked: {0}")]
    HandlerPanic(String),

    #[error("bind error: {0}")]
    Bind(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DotwebError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            DotwebError::NotFound(_) => StatusCode::NOT_FOUND,
            DotwebError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            DotwebError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            DotwebError::EmptyBody | DotwebError::Bind(_) | DotwebError::Json(_) => {
                StatusCode::BAD_REQUEST
            }
            DotwebError::RouteConflict(_)
            | DotwebError::RouteMalformed(_)
            | DotwebError::NotHijackable
            | DotwebError::HeaderAlreadyCommitted
            | DotwebError::SessionStoreFailure(_)
            | DotwebError::CacheStoreFailure(_)
            | DotwebError::ConfigParse(_)
            | DotwebError::HandlerPanic(_)
            | DotwebError::Io(_)
            | DotwebError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            DotwebError::RouteConflict(_) => "ROUTE_CONFLICT",
            DotwebError::RouteMalformed(_) => "ROUTE_MALFORMED",
            DotwebError::NotFound(_) => "NOT_FOUND",
            DotwebError::MethodNotAllowed(_) => "METHOD_NOT_ALLOWED",
            DotwebError::UnsupportedMediaType(_) => "UNSUPPORTED_MEDIA_TYPE",
            DotwebError::EmptyBody => "EMPTY_BODY",
            DotwebError::NotHijackable => "NOT_HIJACKABLE",
            DotwebError::HeaderAlreadyCommitted => "HEADER_ALREADY_COMMITTED",
            DotwebError::SessionStoreFailure(_) => "SESSION_STORE_FAILURE",
            DotwebError::CacheStoreFailure(_) => "CACHE_STORE_FAILURE",
            DotwebError::ConfigParse(_) => "CONFIG_PARSE",
            DotwebError::HandlerPanic(_) => "HANDLER_PANIC",
            DotwebError::Bind(_) => "BIND_ERROR",
            DotwebError::Io(_) => "IO_ERROR",
            DotwebError::Json(_) => "JSON_ERROR",
            DotwebError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T, E = DotwebError> = std::result::Result<T, E>;
