//! Controller configuration.
//!
//! # Invariants
//! - `default_list_name` is non-blank after trim.
//! - Limits count user-created lists only; the default list is exempt from
//!   `max_lists`.

const DEFAULT_LIST_NAME: &str = "Saved";
const MAX_LISTS: usize = 100;
const MAX_ENTRIES_PER_LIST: usize = 1000;

/// Tunables for `ReadingListsController`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Name given to the protected default list when it is first created.
    pub default_list_name: String,
    /// Maximum number of user-created lists.
    pub max_lists: usize,
    /// Maximum number of item keys in one list.
    pub max_entries_per_list: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            default_list_name: DEFAULT_LIST_NAME.to_string(),
            max_lists: MAX_LISTS,
            max_entries_per_list: MAX_ENTRIES_PER_LIST,
        }
    }
}

impl ControllerConfig {
    pub fn with_default_list_name(mut self, name: impl Into<String>) -> Self {
        self.default_list_name = name.into();
        self
    }

    pub fn with_max_lists(mut self, max_lists: usize) -> Self {
        self.max_lists = max_lists;
        self
    }

    pub fn with_max_entries_per_list(mut self, max_entries: usize) -> Self {
        self.max_entries_per_list = max_entries;
        self
    }
}
