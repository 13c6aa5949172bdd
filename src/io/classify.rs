//! Error classification at the transport boundary.
//!
//! Maps raw [`TransportError`] shapes onto the small [`ErrorKind`] taxonomy,
//! deciding status code and retryability. Rules apply in priority order and
//! the first match wins; failures no rule matches are left unmanaged and
//! reach the caller unchanged.

use crate::error::{ErrorKind, Payload, StorageError, TileError, TransportError};

/// Classify a transport failure. Returns `None` for failures we do not manage.
pub fn classify(err: &TransportError, payload: Payload) -> Option<StorageError> {
    let (kind, status, message) = match err {
        TransportError::Timeout { message } => {
            let message = if message.is_empty() {
                "Timed out".to_string()
            } else {
                message.clone()
            };
            (ErrorKind::Timeout, 504, message)
        }
        TransportError::Service { status, .. } if *status == 404 || *status == 403 => {
            return Some(StorageError::missing(payload, *status));
        }
        TransportError::ConnectionReset { message } => {
            (ErrorKind::ConnectionReset, 500, message.clone())
        }
        TransportError::Service { code, .. } if code.as_deref() == Some("InternalError") => {
            (ErrorKind::InternalError, 500, err.to_string())
        }
        TransportError::TruncatedBody { .. } => (ErrorKind::TruncatedResponse, 500, err.to_string()),
        TransportError::Service {
            status: 503,
            code: None,
            message: None,
            ..
        } => (ErrorKind::ServiceUnavailable, 503, "503 Unknown".to_string()),
        TransportError::Service { status, code, .. } if code.as_deref() == Some("SlowDown") => {
            (ErrorKind::RateLimited, *status, err.to_string())
        }
        TransportError::Service { status, .. } if *status >= 500 => {
            (ErrorKind::ServerError, *status, err.to_string())
        }
        _ => return None,
    };

    let mut classified = StorageError {
        kind,
        message,
        status,
        retryable: true,
        request_id: None,
        id2: None,
    };

    if status >= 500 {
        if let Some(diagnostics) = err.diagnostics() {
            if let Some(ref id) = diagnostics.request_id {
                classified.message = format!("[x-amz-request-id:{}] {}", id, classified.message);
                classified.request_id = Some(id.clone());
            }
            if let Some(ref id2) = diagnostics.id2 {
                classified.message = format!("[x-amz-id-2:{}] {}", id2, classified.message);
                classified.id2 = Some(id2.clone());
            }
        }
    }

    Some(classified)
}

/// Classify, falling back to the unmodified transport error.
pub fn to_tile_error(err: TransportError, payload: Payload) -> TileError {
    match classify(&err, payload) {
        Some(classified) => TileError::Storage(classified),
        None => TileError::Transport(err),
    }
}
