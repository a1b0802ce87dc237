//! Database-to-database operations and reports
//!
//! - `adder`: one-producer merges (add, repository filters, deduplicate)
//! - `adder_set`: two-producer set algebra (intersect, subtract)
//! - `multi`: k-way merge of several producers
//! - `stats`: sizes, sources, histogram, duplicates, hash table
//! - `random`: performance analysis helpers

pub mod adder;
pub mod adder_set;
pub mod multi;
pub mod random;
pub mod stats;

pub use adder::{for_each_hash, Adder};
pub use adder_set::SetAdder;
pub use multi::add_multiple;
