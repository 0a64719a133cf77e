//! Tenant-scoped document storage and domain canonicalization.

pub mod domain;
pub mod registry;
pub mod storage;

pub use domain::{normalize_host, DomainResolver};
pub use storage::{DomainDocumentStorage, Upload};
