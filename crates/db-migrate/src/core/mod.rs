//! Core abstractions for database-agnostic migration.
//!
//! - [`schema`]: table and column descriptors
//! - [`value`]: SQL value representation and row batches
//! - [`traits`]: the adapter contract, SQL dialects and type mappers
//! - [`identifier`]: identifier validation and quoting
//!
//! Driver modules (`drivers/mysql`, `drivers/sqlite`, `drivers/postgres`)
//! implement these abstractions; the orchestrator only sees the traits.

pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{ColumnDescriptor, TableDescriptor};
pub use traits::{Adapter, ColumnMapping, Dialect, TypeMapper, TypeMapping};
pub use value::{Batch, Row, SqlNullType, SqlValue};
