//! Statistical data import pipeline.
//!
//! A subject arrives as two CSV files: a metadata file declaring which
//! columns are filters and which are indicators, and a data file with
//! one observation per row. The importer validates both, resolves every
//! geography, school and filter value to a stored dimension, then
//! commits observations referencing those dimensions in fixed-size
//! batches.

pub mod batch;
pub mod cache;
pub mod config;
pub mod csv_line;
pub mod error;
pub mod meta;
pub mod model;
pub mod observation;
pub mod pipeline;
pub mod resolve;
pub mod store;
pub mod validate;

pub use config::{GeographyMode, ImportConfig};
pub use error::{ImportError, ImportResult, StoreError};
pub use pipeline::{ImportSummary, ImporterService};
pub use store::{EntityStore, MemoryStore, PgStore};
