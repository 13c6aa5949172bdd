//! Tile key templating.
//!
//! Templates carry positional tokens that are filled per tile:
//!
//! | Token       | Value                                             |
//! |-------------|---------------------------------------------------|
//! | `{z}`       | zoom                                              |
//! | `{x}`       | column                                            |
//! | `{y}`       | row, flipped to `2^z - 1 - y` for the TMS scheme  |
//! | `{prefix}`  | `x mod 16` and `y mod 16` as one hex digit each   |
//! | `{prefix4}` | `x mod 256` and `y mod 256` as two hex digits each |
//!
//! An optional [`RewriteRule`] reshapes the template before tokens are filled.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::coord::TileCoord;
use crate::error::SourceError;

/// Row numbering convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    #[default]
    Xyz,
    Tms,
}

/// Signature of an injected rewrite hook.
pub type RewriteFn = dyn Fn(&str, TileCoord) -> String + Send + Sync;

/// Template rewrite applied before token substitution.
///
/// Descriptors select one of the built-in rules with a short rule string
/// (see [`RewriteRule::parse`]); embedding code can inject any closure.
#[derive(Clone, Default)]
pub enum RewriteRule {
    #[default]
    Identity,
    /// Replace every occurrence of `from` with `to`
    Replace { from: String, to: String },
    /// Fill a `{quadkey}` token with the tile's quadkey
    Quadkey,
    Custom(Arc<RewriteFn>),
}

impl RewriteRule {
    /// Parse a descriptor rule string.
    ///
    /// Supported forms: `replace:<from>=><to>` and `quadkey`.
    pub fn parse(rule: &str) -> Result<Self, SourceError> {
        let rule = rule.trim();
        if rule.is_empty() {
            return Ok(RewriteRule::Identity);
        }
        if rule == "quadkey" {
            return Ok(RewriteRule::Quadkey);
        }
        if let Some(spec) = rule.strip_prefix("replace:") {
            if let Some((from, to)) = spec.split_once("=>") {
                if !from.is_empty() {
                    return Ok(RewriteRule::Replace {
                        from: from.to_string(),
                        to: to.to_string(),
                    });
                }
            }
        }
        Err(SourceError::UnsupportedRewrite(rule.to_string()))
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&str, TileCoord) -> String + Send + Sync + 'static,
    {
        RewriteRule::Custom(Arc::new(f))
    }

    pub fn apply<'a>(&self, template: &'a str, coord: TileCoord) -> Cow<'a, str> {
        match self {
            RewriteRule::Identity => Cow::Borrowed(template),
            RewriteRule::Replace { from, to } => Cow::Owned(template.replace(from.as_str(), to)),
            RewriteRule::Quadkey => Cow::Owned(template.replace("{quadkey}", &coord.quadkey())),
            RewriteRule::Custom(f) => Cow::Owned(f(template, coord)),
        }
    }
}

impl fmt::Debug for RewriteRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RewriteRule::Identity => f.write_str("Identity"),
            RewriteRule::Replace { from, to } => f
                .debug_struct("Replace")
                .field("from", from)
                .field("to", to)
                .finish(),
            RewriteRule::Quadkey => f.write_str("Quadkey"),
            RewriteRule::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Two hex digits: `x mod 16` then `y mod 16`.
pub fn prefix(x: u32, y: u32) -> String {
    format!("{:x}{:x}", x % 16, y % 16)
}

/// Four hex digits: `x mod 256` then `y mod 256`, each zero padded.
pub fn prefix4(x: u32, y: u32) -> String {
    format!("{:02x}{:02x}", x % 256, y % 256)
}

/// Fill the tokens of `template` for `coord`.
pub fn expand(template: &str, coord: TileCoord, scheme: Scheme) -> String {
    let y = match scheme {
        Scheme::Xyz => coord.y as u64,
        Scheme::Tms => coord.flipped_y(),
    };
    template
        .replace("{prefix}", &prefix(coord.x, coord.y))
        .replace("{prefix4}", &prefix4(coord.x, coord.y))
        .replace("{z}", &coord.z.to_string())
        .replace("{x}", &coord.x.to_string())
        .replace("{y}", &y.to_string())
}

/// A key template bound to its scheme and rewrite rule.
#[derive(Debug, Clone)]
pub struct UrlTemplate {
    template: String,
    scheme: Scheme,
    rewrite: RewriteRule,
}

impl UrlTemplate {
    pub fn new(template: impl Into<String>, scheme: Scheme) -> Self {
        Self {
            template: template.into(),
            scheme,
            rewrite: RewriteRule::Identity,
        }
    }

    pub fn with_rewrite(mut self, rewrite: RewriteRule) -> Self {
        self.rewrite = rewrite;
        self
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// The concrete key for `coord`.
    pub fn expand(&self, coord: TileCoord) -> String {
        let rewritten = self.rewrite.apply(&self.template, coord);
        expand(&rewritten, coord, self.scheme)
    }
}
