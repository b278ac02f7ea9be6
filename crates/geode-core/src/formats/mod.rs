//! # Formats Module
//!
//! Binary serialization for Geode traces.
//!
//! Pure byte transforms only; file I/O belongs to the surface layer.

mod persistence;

pub use persistence::*;
