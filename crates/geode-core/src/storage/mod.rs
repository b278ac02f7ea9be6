//! # Storage Module
//!
//! Disk-backed trace storage.

mod redb_trace;

pub use redb_trace::RedbTrace;
