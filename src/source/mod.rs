//! Source descriptors, connection options and URIs.

mod descriptor;
mod options;
mod uri;

pub use descriptor::{Descriptor, Locations, HIDDEN_KEYS};
pub use options::{ConnectionOptions, DEFAULT_DESCRIPTOR_ACL, DEFAULT_S3_ACL};
pub use uri::{find_source, list_sources, SourceUri, DESCRIPTOR_EXTENSION};
