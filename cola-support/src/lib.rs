//! Small generic helpers shared by the COLA core and its embedders.
//!
//! Nothing in this crate knows about the COLA file format; it only hosts
//! generic, allocation-and-sorting plumbing that would otherwise be
//! duplicated across the core's components.

mod buffer;

pub use buffer::{insertion_sort_by_key, SlabBuffer};
