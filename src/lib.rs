//! Content-addressed metadata catalog for AI-generated images.
//!
//! The catalog walks a directory tree of generated images, extracts the
//! embedded generation parameters (prompts, sampler settings) in parallel,
//! and keeps user annotations (favorites, ratings, tags, categories) in a
//! second table. Both tables are keyed by the SHA-256 of the image's
//! root-relative path and persisted as CSV, one state directory per watched
//! root. Reconciliation on open re-extracts only when the persisted key set
//! no longer matches the scan.

pub mod annotations;
pub mod catalog;
pub mod config;
pub mod error;
pub mod extract;
pub mod filter;
pub mod key;
pub mod parser;
pub mod scanner;
pub mod scorer;
pub mod store;
pub mod sync;
pub mod thumbnails;

pub use annotations::{Annotation, AnnotationTable};
pub use catalog::Catalog;
pub use config::CatalogConfig;
pub use error::{CatalogError, Result};
pub use extract::ExifTable;
pub use filter::{FilterCriteria, FilterOutcome};
pub use key::{key_for, ImageKey};
pub use parser::ExifRecord;
pub use scanner::ImageRef;
pub use scorer::AestheticScorer;
