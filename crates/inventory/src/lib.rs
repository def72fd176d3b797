#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_docs)]

//! # Overview
//!
//! Read-only view of the datasets and snapshots that exist on a host.
//! [`Inventory`] runs `zfs list` locally or through a remote shell and
//! [`parse_listing`] turns its tab-separated output into [`Dataset`] records
//! ordered oldest-first.
//!
//! # Design
//!
//! Records are plain data. Every query spawns a fresh `zfs list`, so callers
//! that need a current view simply query again; nothing is cached.
//!
//! # Errors
//!
//! All failures are reported as [`InventoryError`]. A name that matches more
//! than one record is reported as [`InventoryError::DuplicateDataset`]; it
//! indicates a broken listing rather than a condition worth retrying.

mod dataset;
mod error;
mod listing;
mod query;

pub use dataset::{Dataset, DatasetKind};
pub use error::InventoryError;
pub use listing::{parse_creation, parse_listing};
pub use query::Inventory;
