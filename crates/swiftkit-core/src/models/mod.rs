//! Result types for Swift operations.
//!
//! - `Listing`, `ContainerInfo`, `ObjectEntry`: account and container listings
//! - `ListOptions`, `ListFormat`: listing query parameters
//! - `Metadata`: status plus headers from HEAD requests
//! - `ObjectWritten`, `DownloadedObject`: object upload/download results

pub mod listing;
pub mod metadata;

pub use listing::{ContainerInfo, ListFormat, ListOptions, Listing, ObjectEntry, ObjectInfo};
pub use metadata::{DownloadedObject, Metadata, ObjectWritten};
