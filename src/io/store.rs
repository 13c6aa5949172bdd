use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::{RequestDiagnostics, TransportError};

/// An object as returned by a GET.
#[derive(Debug, Clone, Default)]
pub struct StoredObject {
    pub body: Bytes,
    /// Declared Content-Length, when the response carried one
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub cache_control: Option<String>,
    /// Raw `Expires` header value
    pub expires: Option<String>,
    pub diagnostics: RequestDiagnostics,
}

impl StoredObject {
    /// An object whose declared length matches its body.
    pub fn new(body: impl Into<Bytes>) -> Self {
        let body = body.into();
        Self {
            content_length: Some(body.len() as u64),
            body,
            ..Default::default()
        }
    }
}

/// Parameters of a single PUT.
#[derive(Debug, Clone, Default)]
pub struct PutObject {
    pub bucket: String,
    pub key: String,
    pub body: Bytes,
    pub acl: Option<String>,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub cache_control: Option<String>,
    pub expires: Option<DateTime<Utc>>,
    pub server_side_encryption: Option<String>,
    pub sse_kms_key_id: Option<String>,
}

/// One page of a key listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub keys: Vec<String>,
    /// Token for the next page, `None` when the listing is exhausted
    pub next_token: Option<String>,
}

/// Trait for the object storage capability the tile source is built on.
///
/// Implementations perform exactly one request per call and report failures
/// in their raw [`TransportError`] shape; retries and classification happen
/// in [`RetryingAccessor`](super::RetryingAccessor).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch a whole object.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject, TransportError>;

    /// Store a whole object.
    async fn put_object(&self, request: PutObject) -> Result<(), TransportError>;

    /// List keys beginning with `prefix`, one page at a time.
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        token: Option<String>,
    ) -> Result<ListPage, TransportError>;
}

#[async_trait]
impl<T: ObjectStore + ?Sized> ObjectStore for std::sync::Arc<T> {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject, TransportError> {
        (**self).get_object(bucket, key).await
    }

    async fn put_object(&self, request: PutObject) -> Result<(), TransportError> {
        (**self).put_object(request).await
    }

    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        token: Option<String>,
    ) -> Result<ListPage, TransportError> {
        (**self).list_page(bucket, prefix, token).await
    }
}
