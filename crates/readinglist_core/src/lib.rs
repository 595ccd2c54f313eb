//! Reading list consistency engine.
//!
//! Named, user-created collections of saved items backed by a local SQLite
//! store. This crate owns name uniqueness, the protected default list and
//! list/item membership.

pub mod db;
pub mod index;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use index::membership::{IndexError, MembershipIndex};
pub use logging::{default_log_level, init_logging, logging_status, LogLevel, LoggingError};
pub use model::canonical::{canonicalize_name, names_collide};
pub use model::reading_list::{
    ArticleRef, ArticleResolver, ItemKey, ReadingList, ReadingListId, ReadingListValidationError,
};
pub use repo::reading_list_repo::{
    ReadingListStore, RepoError, RepoResult, SqliteReadingListStore,
};
pub use service::config::ControllerConfig;
pub use service::reading_lists_controller::{
    ReadingListError, ReadingListResult, ReadingListsController,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
