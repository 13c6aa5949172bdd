//! Source URIs.
//!
//! A source is opened from one of:
//!
//! - `s3://bucket/path/{z}/{x}/{y}.png?acl=...`: a bare key template; a
//!   descriptor with a single `tiles` entry is synthesized from it
//! - `s3:///path/to/source.s3`, `file:///path/to/source.s3` or a plain path:
//!   a JSON descriptor file

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use url::Url;

use super::descriptor::Descriptor;
use super::options::{ConnectionOptions, DEFAULT_DESCRIPTOR_ACL, DEFAULT_S3_ACL};
use crate::error::SourceError;
use crate::io::S3Location;

/// Extension of descriptor files discovered by [`list_sources`].
pub const DESCRIPTOR_EXTENSION: &str = "s3";

/// A parsed source URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceUri {
    /// Key template in a bucket
    Template {
        bucket: String,
        template: String,
        query: String,
    },
    /// Descriptor document on the local filesystem
    File { path: PathBuf, query: String },
}

impl SourceUri {
    pub fn parse(raw: &str) -> Result<Self, SourceError> {
        let invalid = || SourceError::InvalidUri(raw.to_string());

        if raw.starts_with("s3://") || raw.starts_with("file://") {
            let url = Url::parse(raw).map_err(|_| invalid())?;
            let query = url.query().unwrap_or_default().to_string();
            let path = urlencoding::decode(url.path())
                .map_err(|_| invalid())?
                .into_owned();

            return match url.host_str().filter(|h| !h.is_empty()) {
                Some(bucket) if url.scheme() == "s3" => {
                    let template = path.trim_start_matches('/').to_string();
                    if template.is_empty() {
                        return Err(invalid());
                    }
                    Ok(SourceUri::Template {
                        bucket: bucket.to_string(),
                        template,
                        query,
                    })
                }
                Some(_) => Err(invalid()),
                None if path.is_empty() || path == "/" => Err(invalid()),
                None => Ok(SourceUri::File {
                    path: PathBuf::from(path),
                    query,
                }),
            };
        }

        if raw.contains("://") || raw.is_empty() {
            return Err(invalid());
        }

        let (path, query) = raw.split_once('?').unwrap_or((raw, ""));
        Ok(SourceUri::File {
            path: PathBuf::from(path),
            query: query.to_string(),
        })
    }

    /// Connection options from the query string.
    pub fn options(&self) -> ConnectionOptions {
        match self {
            SourceUri::Template { query, .. } => ConnectionOptions::from_query(query, DEFAULT_S3_ACL),
            SourceUri::File { query, .. } => {
                ConnectionOptions::from_query(query, DEFAULT_DESCRIPTOR_ACL)
            }
        }
    }

    /// Build or read the descriptor this URI points at.
    pub async fn load_descriptor(&self) -> Result<Descriptor, SourceError> {
        match self {
            SourceUri::Template {
                bucket, template, ..
            } => Ok(self.template_descriptor(bucket, template)),
            SourceUri::File { path, .. } => {
                let text = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| SourceError::Read {
                        path: path.display().to_string(),
                        message: e.to_string(),
                    })?;
                Descriptor::from_json(&text)
            }
        }
    }

    fn template_descriptor(&self, bucket: &str, template: &str) -> Descriptor {
        let mut tiles = S3Location::https_url(bucket, template);
        let geocoder_data = tiles
            .find("/{z}/{x}/{y}")
            .map(|idx| tiles[..idx].to_string());
        if let Some(region) = self.options().region {
            tiles.push_str("?region=");
            tiles.push_str(&region);
        }
        Descriptor::for_template(tiles, geocoder_data)
    }
}

/// Descriptor files in `dir`, keyed by source id.
///
/// A missing directory yields an empty listing.
pub async fn list_sources(dir: impl AsRef<Path>) -> Result<BTreeMap<String, String>, SourceError> {
    let dir = absolute(dir.as_ref())?;
    let mut sources = BTreeMap::new();

    let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(sources),
        Err(e) => return Err(read_error(&dir, e)),
    };

    let pattern = Regex::new(&format!(r"^([\w-]+)\.{}$", DESCRIPTOR_EXTENSION))
        .map_err(|e| SourceError::Descriptor(e.to_string()))?;

    while let Some(entry) = entries.next_entry().await.map_err(|e| read_error(&dir, e))? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(caps) = pattern.captures(name) {
            sources.insert(caps[1].to_string(), file_uri(&dir.join(name)));
        }
    }

    Ok(sources)
}

/// URI of the descriptor for source `id` in `dir`, if the file exists.
pub async fn find_source(dir: impl AsRef<Path>, id: &str) -> Result<String, SourceError> {
    let dir = absolute(dir.as_ref())?;
    let file = dir.join(format!("{}.{}", id, DESCRIPTOR_EXTENSION));
    tokio::fs::metadata(&file)
        .await
        .map_err(|e| read_error(&file, e))?;
    Ok(file_uri(&file))
}

fn file_uri(path: &Path) -> String {
    format!("s3://{}", path.display())
}

fn absolute(path: &Path) -> Result<PathBuf, SourceError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .map_err(|e| read_error(path, e))
}

fn read_error(path: &Path, e: std::io::Error) -> SourceError {
    SourceError::Read {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}
