//! Per-connection write and transport options carried in the source URI query.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use crate::tile::{parse_http_date, CacheDefaults};

/// Canned ACL for sources opened from an `s3://` URI.
pub const DEFAULT_S3_ACL: &str = "private";

/// Canned ACL for sources opened from a descriptor file.
pub const DEFAULT_DESCRIPTOR_ACL: &str = "public-read";

/// Options parsed from the URI query string.
///
/// | Parameter      | Meaning                                                  |
/// |----------------|----------------------------------------------------------|
/// | `acl`          | canned ACL applied to every PUT                          |
/// | `sse`          | server-side encryption algorithm                         |
/// | `sseKmsId`     | KMS key id for `aws:kms` encryption                      |
/// | `expires`      | `Expires` for written objects (epoch millis or a date)   |
/// | `cacheControl` | `Cache-Control` for written objects (quotes are dropped) |
/// | `timeout`      | per-attempt timeout in milliseconds                      |
/// | `region`       | bucket region                                            |
/// | `strict`       | `true` to reject tiles outside the declared zoom range   |
/// | `events`       | `true` to report every successful tile write             |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub acl: String,
    pub sse: Option<String>,
    pub sse_kms_id: Option<String>,
    pub expires: Option<DateTime<Utc>>,
    pub cache_control: Option<String>,
    pub timeout: Option<Duration>,
    pub region: Option<String>,
    pub strict: bool,
    pub events: bool,
}

impl ConnectionOptions {
    pub fn new(default_acl: &str) -> Self {
        Self {
            acl: default_acl.to_string(),
            sse: None,
            sse_kms_id: None,
            expires: None,
            cache_control: None,
            timeout: None,
            region: None,
            strict: false,
            events: false,
        }
    }

    /// Parse a query string (without the leading `?`).
    ///
    /// Malformed values are ignored rather than rejected.
    pub fn from_query(query: &str, default_acl: &str) -> Self {
        let mut options = Self::new(default_acl);
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let value = value.into_owned();
            match key.as_ref() {
                "acl" if !value.is_empty() => options.acl = value,
                "sse" if !value.is_empty() => options.sse = Some(value),
                "sseKmsId" if !value.is_empty() => options.sse_kms_id = Some(value),
                "expires" => options.expires = parse_expires(&value),
                "cacheControl" => {
                    let value: String = value.chars().filter(|c| *c != '\'' && *c != '"').collect();
                    if !value.is_empty() {
                        options.cache_control = Some(value);
                    }
                }
                "timeout" if is_digits(&value) => {
                    options.timeout = value.parse().ok().map(Duration::from_millis);
                }
                "region" if !value.is_empty() => options.region = Some(value),
                "strict" => options.strict = value == "true",
                "events" => options.events = value == "true",
                _ => {}
            }
        }
        options
    }

    pub fn cache_defaults(&self) -> CacheDefaults {
        CacheDefaults {
            cache_control: self.cache_control.clone(),
            expires: self.expires,
        }
    }
}

fn is_digits(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

fn parse_expires(value: &str) -> Option<DateTime<Utc>> {
    if is_digits(value) {
        let millis: i64 = value.parse().ok()?;
        return Utc.timestamp_millis_opt(millis).single();
    }
    parse_http_date(value)
}
