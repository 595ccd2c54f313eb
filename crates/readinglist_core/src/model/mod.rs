//! Domain model for reading lists and the items saved into them.
//!
//! # Responsibility
//! - Define the canonical records shared by the index, store and controller.
//! - Own name canonicalization used for uniqueness comparisons.
//!
//! # Invariants
//! - Every list is identified by a stable `ReadingListId`.
//! - `canonical_name` is always derived from `name`, never set independently.

pub mod canonical;
pub mod reading_list;
