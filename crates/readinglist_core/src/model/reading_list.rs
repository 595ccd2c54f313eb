//! Reading list domain model.
//!
//! # Responsibility
//! - Define the canonical record for user-created reading lists.
//! - Define item references accepted from the item identity collaborator.
//!
//! # Invariants
//! - `id` is stable and never reused while the list exists.
//! - `canonical_name` always equals `canonicalize_name(name)`.
//! - `item_keys` holds each key at most once.
//! - `is_default` is fixed at creation.

use crate::model::canonical::canonicalize_name;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for a reading list.
pub type ReadingListId = Uuid;

/// Canonical identifier of a saved item (for example an article key).
///
/// The engine never derives keys; callers obtain them from an
/// [`ArticleResolver`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemKey(String);

impl ItemKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for ItemKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ItemKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Pre-resolved item reference handed to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRef {
    /// Stable canonical key stored in `ReadingList::item_keys`.
    pub key: ItemKey,
    /// Locator the key was resolved from. Informational only.
    pub locator: String,
}

impl ArticleRef {
    pub fn new(key: impl Into<ItemKey>, locator: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            locator: locator.into(),
        }
    }
}

/// Item identity collaborator contract.
///
/// Implemented by the host application (e.g. URL to article key mapping);
/// the engine only consumes the resolved references.
pub trait ArticleResolver {
    /// Returns a stable reference for `locator`, or `None` when the locator
    /// cannot be mapped to an item.
    fn resolve(&self, locator: &str) -> Option<ArticleRef>;
}

/// Validation errors for reading list records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadingListValidationError {
    /// Name is empty after trimming.
    BlankName,
    /// Stored canonical name does not match the name it was derived from.
    CanonicalNameMismatch { name: String, canonical_name: String },
    /// `updated_at` is earlier than `created_at`.
    InvalidTimestamps { created_at: i64, updated_at: i64 },
}

impl Display for ReadingListValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName => write!(f, "reading list name must not be blank"),
            Self::CanonicalNameMismatch {
                name,
                canonical_name,
            } => write!(
                f,
                "canonical name `{canonical_name}` does not match name `{name}`"
            ),
            Self::InvalidTimestamps {
                created_at,
                updated_at,
            } => write!(
                f,
                "updated_at ({updated_at}) must be >= created_at ({created_at})"
            ),
        }
    }
}

impl Error for ReadingListValidationError {}

/// Canonical record for one reading list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingList {
    pub id: ReadingListId,
    /// User-visible name, trimmed.
    pub name: String,
    /// Comparison key derived from `name`. Never displayed.
    pub canonical_name: String,
    pub description: Option<String>,
    pub is_default: bool,
    pub item_keys: BTreeSet<ItemKey>,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds. Always >= `created_at`.
    pub updated_at: i64,
}

impl ReadingList {
    /// Creates a new list with a generated stable ID.
    ///
    /// # Invariants
    /// - `canonical_name` is derived from the trimmed `name`.
    /// - `created_at == updated_at == now_ms`.
    pub fn new(name: &str, is_default: bool, now_ms: i64) -> Self {
        Self::with_id(Uuid::new_v4(), name, is_default, now_ms)
    }

    /// Creates a list with a caller-provided ID. Used by store read paths
    /// and tests.
    pub fn with_id(id: ReadingListId, name: &str, is_default: bool, now_ms: i64) -> Self {
        let name = name.trim().to_string();
        Self {
            id,
            canonical_name: canonicalize_name(&name),
            name,
            description: None,
            is_default,
            item_keys: BTreeSet::new(),
            created_at: now_ms,
            updated_at: now_ms,
        }
    }

    /// Replaces the visible name and recomputes `canonical_name`.
    pub fn rename(&mut self, name: &str, now_ms: i64) {
        self.name = name.trim().to_string();
        self.canonical_name = canonicalize_name(&self.name);
        self.touch(now_ms);
    }

    /// Advances `updated_at`, never moving it backwards.
    pub fn touch(&mut self, now_ms: i64) {
        self.updated_at = self.updated_at.max(now_ms);
    }

    pub fn contains(&self, key: &ItemKey) -> bool {
        self.item_keys.contains(key)
    }

    /// Checks record-level invariants.
    pub fn validate(&self) -> Result<(), ReadingListValidationError> {
        if self.name.trim().is_empty() {
            return Err(ReadingListValidationError::BlankName);
        }
        if self.canonical_name != canonicalize_name(&self.name) {
            return Err(ReadingListValidationError::CanonicalNameMismatch {
                name: self.name.clone(),
                canonical_name: self.canonical_name.clone(),
            });
        }
        if self.updated_at < self.created_at {
            return Err(ReadingListValidationError::InvalidTimestamps {
                created_at: self.created_at,
                updated_at: self.updated_at,
            });
        }
        Ok(())
    }
}
