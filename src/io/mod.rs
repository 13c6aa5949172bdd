mod accessor;
mod classify;
mod location;
mod s3_store;
mod store;

pub use accessor::{
    fingerprint, put_request, PutOutcome, ReadErrorPolicy, RetryPolicy, RetryingAccessor, Stats,
    StatsSnapshot, WritePolicy, BLOCKED_SUFFIX,
};
pub use classify::{classify, to_tile_error};
pub use location::S3Location;
pub use s3_store::{create_s3_client, S3ObjectStore, DEFAULT_ATTEMPT_TIMEOUT};
pub use store::{ListPage, ObjectStore, PutObject, StoredObject};
