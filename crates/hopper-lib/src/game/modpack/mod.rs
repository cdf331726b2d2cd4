//! Pack archives: manifest schemas, normalization, and materialization.

pub mod materializer;
pub mod resolver;
pub mod types;

pub use materializer::ArchiveMaterializer;
pub use resolver::resolve_manifest;
pub use types::{Manifest, ManifestFile, OverridesSpec};
