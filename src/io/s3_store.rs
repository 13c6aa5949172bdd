use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::{RequestId, RequestIdExt};
use aws_sdk_s3::primitives::{ByteStream, DateTime as S3DateTime};
use aws_sdk_s3::types::{ObjectCannedAcl, ServerSideEncryption};
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::store::{ListPage, ObjectStore, PutObject, StoredObject};
use crate::error::{RequestDiagnostics, TransportError};

/// Default per-attempt timeout, matching the `timeout` URI parameter default.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(2000);

/// S3-backed implementation of [`ObjectStore`].
///
/// The wrapped client is expected to have SDK-level retries disabled (see
/// [`create_s3_client`]): retry decisions belong to the accessor, which knows
/// how each failure was classified.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject, TransportError> {
        debug!(bucket, key, "S3 GET");
        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(transport_error)?;

        let diagnostics = RequestDiagnostics::new(
            resp.request_id().map(str::to_string),
            resp.extended_request_id().map(str::to_string),
        );
        let content_length = resp.content_length().and_then(|len| u64::try_from(len).ok());
        let content_type = resp.content_type().map(str::to_string);
        let content_encoding = resp.content_encoding().map(str::to_string);
        let etag = resp.e_tag().map(str::to_string);
        let last_modified = resp
            .last_modified()
            .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()));
        let cache_control = resp.cache_control().map(str::to_string);
        let expires = resp.expires_string().map(str::to_string);

        // A connection dropped mid-body surfaces here rather than from send()
        let body = resp
            .body
            .collect()
            .await
            .map_err(|e| TransportError::ConnectionReset {
                message: e.to_string(),
            })?
            .into_bytes();

        Ok(StoredObject {
            body,
            content_length,
            content_type,
            content_encoding,
            etag,
            last_modified,
            cache_control,
            expires,
            diagnostics,
        })
    }

    async fn put_object(&self, request: PutObject) -> Result<(), TransportError> {
        debug!(bucket = %request.bucket, key = %request.key, bytes = request.body.len(), "S3 PUT");
        let mut put = self
            .client
            .put_object()
            .bucket(request.bucket)
            .key(request.key)
            .body(ByteStream::from(request.body));

        if let Some(acl) = request.acl {
            put = put.acl(ObjectCannedAcl::from(acl.as_str()));
        }
        if let Some(content_type) = request.content_type {
            put = put.content_type(content_type);
        }
        if let Some(encoding) = request.content_encoding {
            put = put.content_encoding(encoding);
        }
        if let Some(cache_control) = request.cache_control {
            put = put.cache_control(cache_control);
        }
        if let Some(expires) = request.expires {
            put = put.expires(S3DateTime::from_secs(expires.timestamp()));
        }
        if let Some(sse) = request.server_side_encryption {
            put = put.server_side_encryption(ServerSideEncryption::from(sse.as_str()));
        }
        if let Some(kms_key) = request.sse_kms_key_id {
            put = put.ssekms_key_id(kms_key);
        }

        put.send().await.map_err(transport_error)?;
        Ok(())
    }

    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        token: Option<String>,
    ) -> Result<ListPage, TransportError> {
        let resp = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .set_continuation_token(token)
            .send()
            .await
            .map_err(transport_error)?;

        let keys = resp
            .contents()
            .iter()
            .filter_map(|obj| obj.key().map(str::to_string))
            .collect();

        let next_token = if resp.is_truncated() == Some(true) {
            resp.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ListPage { keys, next_token })
    }
}

/// Convert an SDK failure into its raw transport shape.
fn transport_error<E>(err: SdkError<E, HttpResponse>) -> TransportError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let diagnostics = err
        .raw_response()
        .map(|raw| {
            RequestDiagnostics::new(
                raw.headers().get("x-amz-request-id").map(str::to_string),
                raw.headers().get("x-amz-id-2").map(str::to_string),
            )
        })
        .unwrap_or_default();

    match &err {
        SdkError::TimeoutError(_) => TransportError::Timeout {
            message: "Timed out".to_string(),
        },
        SdkError::DispatchFailure(failure) if failure.is_timeout() => TransportError::Timeout {
            message: DisplayErrorContext(&err).to_string(),
        },
        SdkError::DispatchFailure(failure) if failure.is_io() => TransportError::ConnectionReset {
            message: DisplayErrorContext(&err).to_string(),
        },
        SdkError::ResponseError(_) => TransportError::ConnectionReset {
            message: DisplayErrorContext(&err).to_string(),
        },
        SdkError::ServiceError(service) => TransportError::Service {
            status: service.raw().status().as_u16(),
            code: err.code().map(str::to_string),
            message: err.message().map(str::to_string),
            diagnostics,
        },
        _ => TransportError::Other {
            message: DisplayErrorContext(&err).to_string(),
        },
    }
}

/// Create an S3 client suitable for [`S3ObjectStore`].
///
/// SDK retries are disabled and each attempt is bounded by `attempt_timeout`.
/// A custom endpoint (MinIO, localstack) switches to path-style addressing:
/// ```ignore
/// let client = create_s3_client(Some("http://localhost:9000"), "us-east-1", DEFAULT_ATTEMPT_TIMEOUT).await;
/// ```
pub async fn create_s3_client(
    endpoint_url: Option<&str>,
    region: &str,
    attempt_timeout: Duration,
) -> Client {
    let region = aws_config::Region::new(region.to_string());
    let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(region)
        .retry_config(aws_config::retry::RetryConfig::disabled())
        .timeout_config(
            aws_config::timeout::TimeoutConfig::builder()
                .operation_attempt_timeout(attempt_timeout)
                .build(),
        );

    if let Some(endpoint) = endpoint_url {
        config_loader = config_loader.endpoint_url(endpoint);
    }

    let sdk_config = config_loader.load().await;

    let s3_config = if endpoint_url.is_some() {
        aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build()
    } else {
        aws_sdk_s3::config::Builder::from(&sdk_config).build()
    };

    Client::from_conf(s3_config)
}
