//! Macro implementations

pub mod bulk_record;

pub use bulk_record::derive_bulk_record;
