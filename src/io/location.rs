//! Bucket/key resolution for S3 URLs.
//!
//! Tile templates arrive as URLs in any of the addressing styles S3 accepts:
//!
//! - `s3://bucket/key`
//! - `https://bucket.s3.amazonaws.com/key` (virtual-hosted, optionally regional)
//! - `https://s3.amazonaws.com/bucket/key` (path style, optionally regional)
//!
//! An optional `region` query parameter is carried along.

use url::Url;

/// A resolved S3 object location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Location {
    pub bucket: String,
    /// Object key, percent-decoded (template placeholders appear as `{z}`)
    pub key: String,
    pub region: Option<String>,
}

impl S3Location {
    /// Parse an S3 URL. Returns `None` for URLs that do not name both a bucket and a key.
    pub fn from_url(raw: &str) -> Option<Self> {
        let url = Url::parse(raw).ok()?;
        let host = url.host_str()?.to_string();
        let path = urlencoding::decode(url.path()).ok()?.into_owned();
        let path = path.trim_start_matches('/');

        let region = url
            .query_pairs()
            .find(|(k, _)| k == "region")
            .map(|(_, v)| v.into_owned());

        let (bucket, key) = if url.scheme() == "s3" {
            (host, path.to_string())
        } else if is_path_style_host(&host) {
            let (bucket, key) = path.split_once('/')?;
            (bucket.to_string(), key.to_string())
        } else if let Some(idx) = virtual_host_split(&host) {
            (host[..idx].to_string(), path.to_string())
        } else {
            return None;
        };

        if bucket.is_empty() || key.is_empty() {
            return None;
        }

        Some(Self {
            bucket,
            key,
            region,
        })
    }

    /// The `s3://bucket/key` form of this location.
    pub fn to_s3_url(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }

    /// The virtual-hosted https URL for a bucket and key.
    pub fn https_url(bucket: &str, key: &str) -> String {
        format!("https://{}.s3.amazonaws.com/{}", bucket, key)
    }
}

fn is_path_style_host(host: &str) -> bool {
    host.starts_with("s3.") || host.starts_with("s3-")
}

/// Index of the `.s3.`/`.s3-` separator in a virtual-hosted bucket host.
fn virtual_host_split(host: &str) -> Option<usize> {
    if !host.ends_with(".amazonaws.com") && !host.ends_with(".amazonaws.com.cn") {
        return None;
    }
    host.find(".s3.").or_else(|| host.find(".s3-"))
}
