//! Storage protocols consumed by idvault.
//!
//! Two backend shapes are modelled:
//!
//! - [`ObjectStore`] -- named blobs grouped in containers (get/put/delete/list)
//! - [`TableStore`] -- rows addressed by (partition, row) with equality and
//!   date-comparison queries
//!
//! Implementations:
//!
//! - [`InMemoryObjectStore`] / [`InMemoryTableStore`] -- `HashMap`-based, with
//!   fault injection for tests
//! - [`FsObjectStore`] / [`FsTableStore`] -- one file per object or row under a
//!   root directory
//!
//! # Rules
//!
//! 1. A missing object or row is `Ok(None)`, never an error.
//! 2. Puts and upserts overwrite.
//! 3. Deletes are idempotent and report whether something was removed.
//! 4. Writing to a container or table that was never created is an error;
//!    creation is idempotent.

pub mod codec;
pub mod error;
pub mod fs;
pub mod memory;
pub mod object;
pub mod table;

pub use codec::{decode, encode};
pub use error::{StoreError, StoreResult};
pub use fs::{FsObjectStore, FsTableStore};
pub use memory::{InMemoryObjectStore, InMemoryTableStore};
pub use object::{validate_name, ObjectStore};
pub use table::{
    FieldValue, FilterClause, RowStream, TableFilter, TableRow, TableStore, PARTITION_KEY, ROW_KEY,
};
