//! Test utilities for integration tests.
//!
//! This module provides an in-memory object store that can be scripted to
//! fail, plus helpers for building PNG mask fixtures.

use std::collections::{BTreeMap, VecDeque};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use image::{ImageFormat, Rgba, RgbaImage};
use serde_json::Value;

use tilestore_s3::error::RequestDiagnostics;
use tilestore_s3::io::{ListPage, ObjectStore, PutObject, StoredObject};
use tilestore_s3::source::{ConnectionOptions, Descriptor, DEFAULT_S3_ACL};
use tilestore_s3::{RetryPolicy, SourceOptions, TileSource, TransportError};

// =============================================================================
// Mock Object Store
// =============================================================================

/// An in-memory object store with request tracking and scripted failures.
///
/// Cloning shares the underlying state, so a test can keep a handle while
/// the source owns another.
#[derive(Clone, Default)]
pub struct MockStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    objects: Mutex<BTreeMap<(String, String), StoredObject>>,
    puts: Mutex<Vec<PutObject>>,
    get_failures: Mutex<VecDeque<TransportError>>,
    put_failures: Mutex<VecDeque<TransportError>>,
    list_failures: Mutex<VecDeque<TransportError>>,
    page_size: Mutex<Option<usize>>,
    gets: AtomicUsize,
    put_attempts: AtomicUsize,
    lists: AtomicUsize,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(self, bucket: &str, key: &str, body: impl Into<Bytes>) -> Self {
        self.insert(bucket, key, StoredObject::new(body));
        self
    }

    pub fn with_stored(self, bucket: &str, key: &str, object: StoredObject) -> Self {
        self.insert(bucket, key, object);
        self
    }

    /// Fail the next `times` GETs with `err`.
    pub fn fail_gets(self, err: TransportError, times: usize) -> Self {
        self.inner
            .get_failures
            .lock()
            .unwrap()
            .extend(std::iter::repeat(err).take(times));
        self
    }

    /// Fail the next `times` PUTs with `err`.
    pub fn fail_puts(self, err: TransportError, times: usize) -> Self {
        self.inner
            .put_failures
            .lock()
            .unwrap()
            .extend(std::iter::repeat(err).take(times));
        self
    }

    /// Fail the next `times` listings with `err`.
    pub fn fail_lists(self, err: TransportError, times: usize) -> Self {
        self.inner
            .list_failures
            .lock()
            .unwrap()
            .extend(std::iter::repeat(err).take(times));
        self
    }

    /// Return at most `size` keys per listing page.
    pub fn with_page_size(self, size: usize) -> Self {
        *self.inner.page_size.lock().unwrap() = Some(size);
        self
    }

    pub fn insert(&self, bucket: &str, key: &str, object: StoredObject) {
        self.inner
            .objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), object);
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.inner
            .objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.body.clone())
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner
            .objects
            .lock()
            .unwrap()
            .keys()
            .map(|(_, key)| key.clone())
            .collect()
    }

    /// Successful PUT requests, in order.
    pub fn puts(&self) -> Vec<PutObject> {
        self.inner.puts.lock().unwrap().clone()
    }

    pub fn get_count(&self) -> usize {
        self.inner.gets.load(Ordering::SeqCst)
    }

    pub fn put_attempts(&self) -> usize {
        self.inner.put_attempts.load(Ordering::SeqCst)
    }

    pub fn list_count(&self) -> usize {
        self.inner.lists.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MockStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject, TransportError> {
        self.inner.gets.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.inner.get_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.inner
            .objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| service_error(404, Some("NoSuchKey"), Some("The specified key does not exist.")))
    }

    async fn put_object(&self, request: PutObject) -> Result<(), TransportError> {
        self.inner.put_attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.inner.put_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.insert(&request.bucket, &request.key, StoredObject::new(request.body.clone()));
        self.inner.puts.lock().unwrap().push(request);
        Ok(())
    }

    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        token: Option<String>,
    ) -> Result<ListPage, TransportError> {
        self.inner.lists.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.inner.list_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        let page_size = self.inner.page_size.lock().unwrap().unwrap_or(usize::MAX);

        let objects = self.inner.objects.lock().unwrap();
        let mut matching = objects
            .keys()
            .filter(|(b, key)| b == bucket && key.starts_with(prefix))
            .map(|(_, key)| key.clone())
            .filter(|key| token.as_ref().map_or(true, |after| key > after));

        let keys: Vec<String> = matching.by_ref().take(page_size).collect();
        let next_token = match matching.next() {
            Some(_) => keys.last().cloned(),
            None => None,
        };
        Ok(ListPage { keys, next_token })
    }
}

// =============================================================================
// Transport Errors
// =============================================================================

pub fn service_error(status: u16, code: Option<&str>, message: Option<&str>) -> TransportError {
    TransportError::Service {
        status,
        code: code.map(str::to_string),
        message: message.map(str::to_string),
        diagnostics: RequestDiagnostics::default(),
    }
}

pub fn hangup() -> TransportError {
    TransportError::ConnectionReset {
        message: "socket hang up".to_string(),
    }
}

// =============================================================================
// Sources
// =============================================================================

pub const BUCKET: &str = "mapbox";

/// Options with a fast retry policy.
pub fn fast_options() -> SourceOptions {
    SourceOptions {
        retry: RetryPolicy::new(5, Duration::from_millis(1)),
        ..SourceOptions::default()
    }
}

pub fn open_source(descriptor: Value, store: MockStore) -> TileSource<MockStore> {
    open_with(descriptor, store, fast_options())
}

pub fn open_with(descriptor: Value, store: MockStore, options: SourceOptions) -> TileSource<MockStore> {
    TileSource::new(
        "s3:///test.s3",
        Descriptor::from_value(descriptor).unwrap(),
        ConnectionOptions::new(DEFAULT_S3_ACL),
        store,
        options,
    )
    .unwrap()
}

pub fn tiles_url(path: &str) -> String {
    format!("https://{}.s3.amazonaws.com/{}", BUCKET, path)
}

// =============================================================================
// PNG Fixtures
// =============================================================================

/// Encode an RGBA image as PNG bytes.
pub fn encode_png(image: &RgbaImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

/// A square PNG whose every pixel has the given alpha.
pub fn uniform_png(size: u32, alpha: u8) -> Vec<u8> {
    encode_png(&RgbaImage::from_pixel(size, size, Rgba([0, 0, 0, alpha])))
}

/// A square PNG that is opaque except for the given transparent pixel.
pub fn png_with_hole(size: u32, hole: (u32, u32)) -> Vec<u8> {
    let mut image = RgbaImage::from_pixel(size, size, Rgba([0, 0, 0, 255]));
    image.put_pixel(hole.0, hole.1, Rgba([0, 0, 0, 0]));
    encode_png(&image)
}

/// A PNG whose left half is opaque and right half transparent.
pub fn half_opaque_png(size: u32) -> Vec<u8> {
    encode_png(&RgbaImage::from_fn(size, size, |x, _| {
        let alpha = if x < size / 2 { 255 } else { 0 };
        Rgba([0, 0, 0, alpha])
    }))
}
