//! The physical layer: heaps, table schema, the lazy row database, coded
//! indices and signature blobs. Everything here is a view over the bytes
//! of one metadata image; cross-assembly semantics live in `structured`.

pub mod database;
pub mod heaps;
pub mod indices;
pub(crate) mod pe;
pub(crate) mod root;
pub mod rows;
pub mod schema;
pub mod signatures;

pub use database::{Database, RowIterator, TableRow};
pub use indices::{FullReference, RowReference};
pub use schema::TableKind;
