//! Entity and collection containers returned by storage operations.
//!
//! # Responsibility
//! - Define the record (single row) and collection (ordered row set) shapes
//!   shared by every adapter and the relation engine.
//!
//! # Invariants
//! - A record's property set is fixed by its shape; unknown reads yield
//!   `Value::Null`, never an error.
//! - Collections hold records of one shape only.

pub mod collection;
pub mod record;

pub use collection::Collection;
pub use record::{Nested, Record, RecordShape};
