//! In-memory projections kept in sync with the reading list store.

pub mod membership;
