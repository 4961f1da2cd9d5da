//! Shared utilities for database drivers.

pub mod batch;
pub mod stream;
pub mod tls;

pub use batch::{is_lock_error, write_batch_atomic, BatchInserter, DriverFailure};
pub use stream::{forward_error, pump_rows};
pub use tls::{SslMode, TlsBuilder};
