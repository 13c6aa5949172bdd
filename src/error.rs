use std::fmt;

use thiserror::Error;

use crate::tile::TileCoord;

/// Request identifiers returned by S3 alongside a response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestDiagnostics {
    /// Value of the `x-amz-request-id` response header
    pub request_id: Option<String>,
    /// Value of the `x-amz-id-2` response header
    pub id2: Option<String>,
}

impl RequestDiagnostics {
    pub fn new(request_id: Option<String>, id2: Option<String>) -> Self {
        Self { request_id, id2 }
    }

    pub fn is_empty(&self) -> bool {
        self.request_id.is_none() && self.id2.is_none()
    }
}

/// Raw failure shapes reported by an object store transport.
///
/// Only `ObjectStore` implementations construct these. Everything above the
/// accessor works with the classified [`StorageError`] instead.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The request did not complete within the attempt timeout
    #[error("{message}")]
    Timeout { message: String },

    /// The connection was dropped before a complete response arrived
    #[error("{message}")]
    ConnectionReset { message: String },

    /// The service answered with a non-success status
    #[error("{}", .message.as_deref().unwrap_or("unknown error"))]
    Service {
        status: u16,
        code: Option<String>,
        message: Option<String>,
        diagnostics: RequestDiagnostics,
    },

    /// The body length disagreed with the declared Content-Length
    #[error("Content-Length does not match response body length")]
    TruncatedBody {
        declared: u64,
        actual: u64,
        diagnostics: RequestDiagnostics,
    },

    /// Anything else (request construction, credentials, unknown dispatch failures)
    #[error("{message}")]
    Other { message: String },
}

impl TransportError {
    /// HTTP status reported by the service, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Service { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn diagnostics(&self) -> Option<&RequestDiagnostics> {
        match self {
            TransportError::Service { diagnostics, .. }
            | TransportError::TruncatedBody { diagnostics, .. } => Some(diagnostics),
            _ => None,
        }
    }
}

/// Normalized kinds produced by the error classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Timeout,
    NotFound,
    Forbidden,
    ConnectionReset,
    InternalError,
    TruncatedResponse,
    ServiceUnavailable,
    RateLimited,
    ServerError,
}

impl ErrorKind {
    /// Symbolic code, as reported to operators.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "TimeoutError",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::ConnectionReset => "ECONNRESET",
            ErrorKind::InternalError => "InternalError",
            ErrorKind::TruncatedResponse => "TruncatedResponseError",
            ErrorKind::ServiceUnavailable => "ServiceUnavailable",
            ErrorKind::RateLimited => "SlowDown",
            ErrorKind::ServerError => "ServerError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A transport failure the classifier recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct StorageError {
    pub kind: ErrorKind,
    pub message: String,
    pub status: u16,
    pub retryable: bool,
    pub request_id: Option<String>,
    pub id2: Option<String>,
}

impl StorageError {
    /// The "does not exist" error for a payload kind (tile or grid).
    pub fn missing(payload: Payload, status: u16) -> Self {
        let kind = if status == 403 {
            ErrorKind::Forbidden
        } else {
            ErrorKind::NotFound
        };
        Self {
            kind,
            message: payload.missing_message().to_string(),
            status,
            retryable: false,
            request_id: None,
            id2: None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self.kind, ErrorKind::NotFound | ErrorKind::Forbidden)
    }
}

/// What a request was reading, which decides the wording of missing errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    Tile,
    Grid,
}

impl Payload {
    pub fn missing_message(&self) -> &'static str {
        match self {
            Payload::Tile => "Tile does not exist",
            Payload::Grid => "Grid does not exist",
        }
    }
}

/// Errors raised while opening a source.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("Invalid URI {0}")]
    InvalidUri(String),

    #[error("{key} must exist on S3")]
    NotOnS3 { key: &'static str },

    #[error("buckets for tiles and grids must match")]
    BucketMismatch,

    #[error("buckets for tiles and grids must be in the same region")]
    RegionMismatch,

    #[error("Invalid descriptor: {0}")]
    Descriptor(String),

    #[error("Unsupported prepare rule: {0}")]
    UnsupportedRewrite(String),

    #[error("Could not find {{z}}, {{x}} and {{y}} tokens in url: {0}")]
    MissingTokens(String),

    #[error("Failed to read descriptor {path}: {message}")]
    Read { path: String, message: String },
}

/// Every error a caller of the tile source can observe.
#[derive(Debug, Error)]
pub enum TileError {
    /// A classified storage failure (missing, retries exhausted, ...)
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A transport failure the classifier does not manage, passed through as-is
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("No \"tiles\" key")]
    NoTiles,

    #[error("No \"grids\" key")]
    NoGrids,

    /// Zoom above the addressable range, or x/y outside `[0, 2^z)`
    #[error("Invalid tile coordinate {0}")]
    InvalidCoord(TileCoord),

    #[error("Duplicate not found: {0}")]
    DuplicateNotFound(u64),

    /// A mask tile could not be decoded into an alpha channel
    #[error("Mask decode failed: {message}")]
    MaskDecode { message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Geocoder data not supported")]
    GeocoderUnsupported,

    /// Deflate/inflate of geocoder payloads
    #[error("Compression error: {0}")]
    Compression(String),
}

impl TileError {
    /// Numeric status when one applies.
    pub fn status(&self) -> Option<u16> {
        match self {
            TileError::Storage(e) => Some(e.status),
            TileError::Transport(e) => e.status(),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, TileError::Storage(e) if e.retryable)
    }

    /// True for "does not exist" failures, which the not-found substitution may recover.
    pub fn is_missing(&self) -> bool {
        matches!(self, TileError::Storage(e) if e.is_missing())
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            TileError::Storage(e) => Some(e.kind),
            _ => None,
        }
    }
}
