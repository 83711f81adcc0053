//! Raw SQL, one module per table.

pub mod events;
pub mod kv;
