//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the durable store contract consumed by the controller.
//! - Isolate SQLite query details from orchestration code.
//!
//! # Invariants
//! - Every write method is atomic at single-call granularity.
//! - Repository writes call `ReadingList::validate()` before SQL mutations.
//! - Uniqueness violations surface as semantic errors
//!   (`CanonicalNameTaken`), not raw SQLite errors.

pub mod reading_list_repo;
