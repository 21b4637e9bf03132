//! `waybill-core` — the in-memory table shared by every waybill crate.
//!
//! A [`Table`] is an ordered header plus rows of scalar [`Value`]s. Tables are
//! treated as values: transformations return new tables.

pub mod table;
pub mod value;

pub use table::{Table, TableError};
pub use value::Value;
