//! Key enumeration.
//!
//! Lists the objects stored under a tile template and turns their keys back
//! into `"z/x/y"` strings. Templates whose path starts with a `{prefix}`
//! directory are listed under each of the 256 possible prefixes in turn.

use std::sync::Arc;

use futures::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};
use regex::Regex;
use tracing::debug;

use crate::error::{SourceError, TileError};
use crate::io::{ObjectStore, RetryPolicy, RetryingAccessor, S3Location, WritePolicy};

/// A coordinate position in a key template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Z,
    X,
    Y,
}

impl Axis {
    fn index(self) -> usize {
        match self {
            Axis::Z => 0,
            Axis::X => 1,
            Axis::Y => 2,
        }
    }
}

/// How to list and parse the keys of one template.
#[derive(Debug, Clone)]
pub struct ZxyStreamConfig {
    pub bucket: String,
    /// Key prefixes to list, in order
    pub list_prefixes: Vec<String>,
    /// Axis of each capture group, in template order
    pub token_order: [Axis; 3],
    pub pattern: Regex,
}

impl ZxyStreamConfig {
    /// Derive the listing plan for a tiles URL.
    pub fn derive(tiles_url: &str) -> Result<Self, TileError> {
        let location = S3Location::from_url(tiles_url)
            .ok_or_else(|| SourceError::InvalidUri(tiles_url.to_string()))?;
        let template = location.key.as_str();

        let tokens = Regex::new(r"\{(prefix|prefix4|z|x|y)\}")
            .map_err(|e| SourceError::Descriptor(e.to_string()))?;

        let mut order = Vec::with_capacity(3);
        let mut pattern = String::from("^");
        let mut head_end = None;
        let mut last = 0;

        for caps in tokens.captures_iter(template) {
            let (Some(token), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            pattern.push_str(&regex::escape(&template[last..token.start()]));
            last = token.end();

            let axis = match name.as_str() {
                "prefix" => {
                    pattern.push_str("[0-9a-f]{2}");
                    continue;
                }
                "prefix4" => {
                    pattern.push_str("[0-9a-f]{4}");
                    head_end.get_or_insert(token.start());
                    continue;
                }
                "z" => Axis::Z,
                "x" => Axis::X,
                _ => Axis::Y,
            };
            pattern.push_str("([0-9]+)");
            head_end.get_or_insert(token.start());
            order.push(axis);
        }
        pattern.push_str(&regex::escape(&template[last..]));
        pattern.push('$');

        let token_order: [Axis; 3] = order
            .try_into()
            .map_err(|_| SourceError::MissingTokens(tiles_url.to_string()))?;
        if [Axis::Z, Axis::X, Axis::Y]
            .iter()
            .any(|axis| !token_order.contains(axis))
        {
            return Err(SourceError::MissingTokens(tiles_url.to_string()).into());
        }

        let head = &template[..head_end.unwrap_or(template.len())];
        let list_prefixes = if head.contains("{prefix}") {
            (0..256u32)
                .map(|i| head.replace("{prefix}", &format!("{:02x}", i)))
                .collect()
        } else {
            vec![head.to_string()]
        };

        let pattern = Regex::new(&pattern).map_err(|e| SourceError::Descriptor(e.to_string()))?;

        Ok(Self {
            bucket: location.bucket,
            list_prefixes,
            token_order,
            pattern,
        })
    }

    /// `"z/x/y"` for a key that matches the template.
    pub fn parse_key(&self, key: &str) -> Option<String> {
        let caps = self.pattern.captures(key)?;
        let mut zxy = [""; 3];
        for (i, axis) in self.token_order.iter().enumerate() {
            zxy[axis.index()] = caps.get(i + 1)?.as_str();
        }
        Some(format!("{}/{}/{}", zxy[0], zxy[1], zxy[2]))
    }
}

/// Stream the `"z/x/y"` of every stored tile matching `tiles_url`.
///
/// Keys that do not match the template are skipped. Listings are retried
/// with the default [`RetryPolicy`].
pub fn zxy_stream<S>(
    store: S,
    tiles_url: &str,
) -> Result<BoxStream<'static, Result<String, TileError>>, TileError>
where
    S: ObjectStore + 'static,
{
    zxy_stream_with(store, tiles_url, RetryPolicy::default())
}

/// [`zxy_stream`] with an explicit retry policy for the listing requests.
pub fn zxy_stream_with<S>(
    store: S,
    tiles_url: &str,
    retry: RetryPolicy,
) -> Result<BoxStream<'static, Result<String, TileError>>, TileError>
where
    S: ObjectStore + 'static,
{
    let config = Arc::new(ZxyStreamConfig::derive(tiles_url)?);
    let accessor = Arc::new(RetryingAccessor::with_policies(store, retry, WritePolicy::default()));
    Ok(list_keys(accessor, Arc::clone(&config))
        .try_filter_map(move |key| {
            let config = Arc::clone(&config);
            async move { Ok(config.parse_key(&key)) }
        })
        .boxed())
}

struct Cursor {
    prefix: usize,
    token: Option<String>,
}

fn list_keys<S>(
    accessor: Arc<RetryingAccessor<S>>,
    config: Arc<ZxyStreamConfig>,
) -> impl Stream<Item = Result<String, TileError>> + Send
where
    S: ObjectStore + 'static,
{
    let start = Cursor {
        prefix: 0,
        token: None,
    };
    stream::try_unfold(start, move |cursor| {
        let accessor = Arc::clone(&accessor);
        let config = Arc::clone(&config);
        async move {
            let Some(prefix) = config.list_prefixes.get(cursor.prefix) else {
                return Ok(None);
            };
            let page = accessor.list(&config.bucket, prefix, cursor.token).await?;
            debug!(prefix = %prefix, keys = page.keys.len(), "Listed page");

            let next = match page.next_token {
                Some(token) => Cursor {
                    prefix: cursor.prefix,
                    token: Some(token),
                },
                None => Cursor {
                    prefix: cursor.prefix + 1,
                    token: None,
                },
            };
            let keys = page.keys.into_iter().map(Ok::<String, TileError>);
            Ok::<_, TileError>(Some((stream::iter(keys), next)))
        }
    })
    .try_flatten()
}
