//! Bidirectional list/item membership index.
//!
//! # Responsibility
//! - Hold the in-memory projection of every stored reading list.
//! - Answer uniqueness and membership questions without touching storage.
//!
//! # Invariants
//! - `by_canonical_name` and `lists` describe the same set of lists.
//! - `lists_by_item[key]` contains `id` iff `lists[id].item_keys` contains `key`.
//! - At most one indexed list has `is_default = true`.
//! - Empty inverse entries are pruned.

use crate::model::canonical::canonicalize_name;
use crate::model::reading_list::{ItemKey, ReadingList, ReadingListId};
use std::collections::{BTreeSet, HashMap};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors from index mutations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// Canonical name already maps to another list.
    DuplicateName {
        canonical_name: String,
        existing: ReadingListId,
    },
    /// A second default list was inserted.
    DuplicateDefault {
        existing: ReadingListId,
        rejected: ReadingListId,
    },
    /// Target list is not indexed.
    ListNotFound(ReadingListId),
}

impl Display for IndexError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateName {
                canonical_name,
                existing,
            } => write!(
                f,
                "canonical name `{canonical_name}` already used by reading list {existing}"
            ),
            Self::DuplicateDefault { existing, rejected } => write!(
                f,
                "default reading list already exists ({existing}); rejected {rejected}"
            ),
            Self::ListNotFound(id) => write!(f, "reading list not indexed: {id}"),
        }
    }
}

impl Error for IndexError {}

#[derive(Debug, Default, Clone)]
pub struct MembershipIndex {
    lists: HashMap<ReadingListId, ReadingList>,
    by_canonical_name: HashMap<String, ReadingListId>,
    lists_by_item: HashMap<ItemKey, BTreeSet<ReadingListId>>,
    default_id: Option<ReadingListId>,
}

impl MembershipIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an index from a store snapshot.
    ///
    /// Fails on the first list violating name uniqueness or the single
    /// default rule.
    pub fn from_lists(lists: impl IntoIterator<Item = ReadingList>) -> Result<Self, IndexError> {
        let mut index = Self::new();
        for list in lists {
            index.insert_list(list)?;
        }
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    pub fn list(&self, id: ReadingListId) -> Option<&ReadingList> {
        self.lists.get(&id)
    }

    pub fn list_by_canonical_name(&self, canonical_name: &str) -> Option<&ReadingList> {
        self.by_canonical_name
            .get(canonical_name)
            .and_then(|id| self.lists.get(id))
    }

    pub fn default_list(&self) -> Option<&ReadingList> {
        self.default_id.and_then(|id| self.lists.get(&id))
    }

    /// Number of indexed lists excluding the default list.
    pub fn user_list_count(&self) -> usize {
        self.lists.len() - usize::from(self.default_id.is_some())
    }

    /// Returns every list: default first, then `created_at ASC, id ASC`.
    pub fn lists(&self) -> Vec<&ReadingList> {
        let mut lists: Vec<&ReadingList> = self.lists.values().collect();
        lists.sort_by(|left, right| {
            right
                .is_default
                .cmp(&left.is_default)
                .then(left.created_at.cmp(&right.created_at))
                .then(left.id.cmp(&right.id))
        });
        lists
    }

    /// Ids of lists containing `key`, in id order.
    pub fn lists_containing(&self, key: &ItemKey) -> Vec<ReadingListId> {
        self.lists_by_item
            .get(key)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Adds a list to every projection.
    pub fn insert_list(&mut self, list: ReadingList) -> Result<(), IndexError> {
        if let Some(existing) = self.by_canonical_name.get(&list.canonical_name) {
            return Err(IndexError::DuplicateName {
                canonical_name: list.canonical_name.clone(),
                existing: *existing,
            });
        }
        if list.is_default {
            if let Some(existing) = self.default_id {
                return Err(IndexError::DuplicateDefault {
                    existing,
                    rejected: list.id,
                });
            }
            self.default_id = Some(list.id);
        }

        for key in &list.item_keys {
            self.lists_by_item
                .entry(key.clone())
                .or_default()
                .insert(list.id);
        }
        self.by_canonical_name
            .insert(list.canonical_name.clone(), list.id);
        self.lists.insert(list.id, list);
        Ok(())
    }

    /// Removes a list from every projection. No-op for unknown ids.
    pub fn remove_list(&mut self, id: ReadingListId) -> Option<ReadingList> {
        let list = self.lists.remove(&id)?;
        self.by_canonical_name.remove(&list.canonical_name);
        for key in &list.item_keys {
            self.unlink_item(key, id);
        }
        if self.default_id == Some(id) {
            self.default_id = None;
        }
        Some(list)
    }

    /// Changes the name of an indexed list.
    pub fn rename_list(
        &mut self,
        id: ReadingListId,
        name: &str,
        now_ms: i64,
    ) -> Result<&ReadingList, IndexError> {
        let canonical_name = canonicalize_name(name);
        if let Some(existing) = self.by_canonical_name.get(&canonical_name) {
            if *existing != id {
                return Err(IndexError::DuplicateName {
                    canonical_name,
                    existing: *existing,
                });
            }
        }

        let list = self.lists.get_mut(&id).ok_or(IndexError::ListNotFound(id))?;
        self.by_canonical_name.remove(&list.canonical_name);
        list.rename(name, now_ms);
        self.by_canonical_name
            .insert(list.canonical_name.clone(), id);
        Ok(list)
    }

    /// Replaces the description of an indexed list.
    pub fn set_description(
        &mut self,
        id: ReadingListId,
        description: Option<String>,
        now_ms: i64,
    ) -> Result<&ReadingList, IndexError> {
        let list = self.lists.get_mut(&id).ok_or(IndexError::ListNotFound(id))?;
        list.description = description;
        list.touch(now_ms);
        Ok(list)
    }

    /// Links `key` to list `id` in both directions.
    ///
    /// Returns `Ok(false)` when the key was already present.
    pub fn add_membership(
        &mut self,
        id: ReadingListId,
        key: &ItemKey,
        now_ms: i64,
    ) -> Result<bool, IndexError> {
        let list = self.lists.get_mut(&id).ok_or(IndexError::ListNotFound(id))?;
        if !list.item_keys.insert(key.clone()) {
            return Ok(false);
        }
        list.touch(now_ms);
        self.lists_by_item
            .entry(key.clone())
            .or_default()
            .insert(id);
        Ok(true)
    }

    /// Unlinks `key` from list `id` in both directions.
    ///
    /// Returns `Ok(false)` when the key was not present.
    pub fn remove_membership(
        &mut self,
        id: ReadingListId,
        key: &ItemKey,
        now_ms: i64,
    ) -> Result<bool, IndexError> {
        let list = self.lists.get_mut(&id).ok_or(IndexError::ListNotFound(id))?;
        if !list.item_keys.remove(key) {
            return Ok(false);
        }
        list.touch(now_ms);
        self.unlink_item(key, id);
        Ok(true)
    }

    fn unlink_item(&mut self, key: &ItemKey, id: ReadingListId) {
        if let Some(ids) = self.lists_by_item.get_mut(key) {
            ids.remove(&id);
            if ids.is_empty() {
                self.lists_by_item.remove(key);
            }
        }
    }
}
