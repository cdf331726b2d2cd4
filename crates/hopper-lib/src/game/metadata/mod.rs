pub mod catalog;
pub mod loaders;
pub mod types;

pub use catalog::VersionCatalog;
pub use types::{VersionDescriptor, VersionDetail, VersionType};
