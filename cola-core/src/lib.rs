//! Cache-oblivious lookahead array (COLA) index core.
//!
//! A durable, append-oriented key index built from geometrically sized
//! levels: level 0 is a small unsorted insertion buffer, every level below
//! it is twice the size of the one above and holds at most one entry per
//! key, and writes cascade downward through an amortized merge process
//! instead of rewriting the whole file on every insert.
//!
//! This crate owns the on-disk layout, the insert/lookup/merge engine, and
//! the collaborator traits ([`filter::MembershipFilter`],
//! [`merge::CompactionPolicy`], [`stats::StatsSink`]) through which an
//! embedder plugs in its own membership filter, compaction behavior, and
//! metrics. It does not open files by path directly, manage a value log, or
//! provide range scans — see [`store::PositionalStore`] and
//! [`cola::Cola`] for what it does own.

mod cola;
mod config;
mod error;
mod filter;
mod header;
mod item;
mod merge;
mod stats;
mod store;

pub use crate::cola::Cola;
pub use config::{FormatConfig, FORMAT_VERSION};
pub use error::{Error, Lookup, Result};
pub use filter::{AcceptAllFilter, BitsetFilter, MembershipFilter};
pub use item::{Item, Opt};
pub use merge::{merge_sorted_runs, CompactionPolicy, LastWriterWins};
pub use stats::{Metrics, NoopStats, StatsSink};
pub use store::{LocalFile, MemoryStore, PositionalStore};
