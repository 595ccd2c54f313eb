//! Reading list use-case controller.
//!
//! # Responsibility
//! - Validate and canonicalize list names.
//! - Create, rename and batch-delete lists; manage list membership.
//! - Guarantee the protected default list exists and is never deleted.
//!
//! # Invariants
//! - No two lists share a canonical name.
//! - Exactly one default list exists after `open` returns.
//! - Every mutation holds the store lock for its whole
//!   check, persist, apply sequence; the index is written only after the
//!   store call succeeded.
//! - Lock order is always store, then index.

use crate::index::membership::{IndexError, MembershipIndex};
use crate::model::canonical::canonicalize_name;
use crate::model::reading_list::{ArticleRef, ItemKey, ReadingList, ReadingListId};
use crate::repo::reading_list_repo::{ReadingListStore, RepoError};
use crate::service::config::ControllerConfig;
use log::{info, warn};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

pub type ReadingListResult<T> = Result<T, ReadingListError>;

/// Errors returned by controller operations. Never retried internally.
#[derive(Debug)]
pub enum ReadingListError {
    /// A list with the same canonical name exists. Carries the name exactly
    /// as requested by the caller.
    DuplicateName { name: String },
    /// Name is blank after trim.
    InvalidName(String),
    /// Target list does not exist.
    ListNotFound(ReadingListId),
    /// Operation is not permitted on the default list.
    DefaultListProtected(ReadingListId),
    /// User list count already equals the configured maximum.
    ListLimitReached { limit: usize },
    /// The list would hold more entries than the configured maximum.
    EntryLimitReached { name: String, limit: usize },
    /// Persistence failure. The in-memory index was not modified.
    StoreFailure(RepoError),
    /// Store snapshot violates an index invariant.
    Index(IndexError),
    /// Internal consistency mismatch between index and store.
    InconsistentState(&'static str),
}

impl Display for ReadingListError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateName { name } => {
                write!(f, "a reading list with the same name already exists: `{name}`")
            }
            Self::InvalidName(value) => write!(f, "invalid reading list name: `{value}`"),
            Self::ListNotFound(id) => write!(f, "reading list not found: {id}"),
            Self::DefaultListProtected(id) => {
                write!(f, "default reading list cannot be modified: {id}")
            }
            Self::ListLimitReached { limit } => {
                write!(f, "reading list limit reached: {limit}")
            }
            Self::EntryLimitReached { name, limit } => {
                write!(f, "reading list `{name}` entry limit reached: {limit}")
            }
            Self::StoreFailure(err) => write!(f, "{err}"),
            Self::Index(err) => write!(f, "{err}"),
            Self::InconsistentState(details) => {
                write!(f, "inconsistent reading list state: {details}")
            }
        }
    }
}

impl Error for ReadingListError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StoreFailure(err) => Some(err),
            Self::Index(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ReadingListError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::ListNotFound(id),
            other => Self::StoreFailure(other),
        }
    }
}

impl From<IndexError> for ReadingListError {
    fn from(value: IndexError) -> Self {
        match value {
            IndexError::ListNotFound(id) => Self::ListNotFound(id),
            other => Self::Index(other),
        }
    }
}

/// Serialized reading list controller over a durable store.
///
/// `Send + Sync` whenever the store is `Send`, so one instance can be shared
/// between interactive callers and background writers.
pub struct ReadingListsController<S: ReadingListStore> {
    store: Mutex<S>,
    index: RwLock<MembershipIndex>,
    config: ControllerConfig,
}

impl<S: ReadingListStore> ReadingListsController<S> {
    /// Loads every stored list and creates the default list if absent.
    ///
    /// # Errors
    /// - `InvalidName` when the configured default name is blank.
    /// - `Index` when the stored lists violate uniqueness.
    /// - `DuplicateName` when a user list already owns the default name.
    pub fn open(mut store: S, config: ControllerConfig) -> ReadingListResult<Self> {
        validate_name(&config.default_list_name)?;

        let lists = store.load_reading_lists()?;
        let mut index = MembershipIndex::from_lists(lists)?;
        ensure_default_list(&mut store, &mut index, &config)?;
        info!(
            "event=reading_lists_open module=service status=ok list_count={}",
            index.len()
        );

        Ok(Self {
            store: Mutex::new(store),
            index: RwLock::new(index),
            config,
        })
    }

    /// Opens with `ControllerConfig::default()`.
    pub fn with_default_config(store: S) -> ReadingListResult<Self> {
        Self::open(store, ControllerConfig::default())
    }

    /// Releases the underlying store.
    pub fn into_store(self) -> S {
        self.store.into_inner()
    }

    /// Creates a list, optionally seeded with items.
    ///
    /// # Contract
    /// - Fails with `DuplicateName` carrying `name` verbatim when the
    ///   canonical name is taken.
    /// - Item keys are deduplicated.
    /// - Exactly one store write; nothing is indexed on failure.
    pub fn create_reading_list(
        &self,
        name: &str,
        articles: &[ArticleRef],
    ) -> ReadingListResult<ReadingList> {
        self.create_reading_list_with_description(name, None, articles)
    }

    /// Same as `create_reading_list`, also setting a description.
    pub fn create_reading_list_with_description(
        &self,
        name: &str,
        description: Option<&str>,
        articles: &[ArticleRef],
    ) -> ReadingListResult<ReadingList> {
        let trimmed = validate_name(name)?;
        let canonical_name = canonicalize_name(trimmed);
        let mut store = self.store.lock();

        // The index may lag behind rows written or deleted by another
        // connection; the store decides.
        let indexed = self
            .index
            .read()
            .list_by_canonical_name(&canonical_name)
            .map(|list| (list.id, list.is_default));
        if let Some((_, true)) = indexed {
            return Err(ReadingListError::DuplicateName {
                name: name.to_string(),
            });
        }
        let indexed_id = indexed.map(|(id, _)| id);
        match store.find_by_canonical_name(&canonical_name)? {
            Some(existing) => {
                warn!(
                    "event=reading_list_create module=service status=error error_code=duplicate_name list_id={}",
                    existing.id
                );
                if indexed_id != Some(existing.id) {
                    let mut index = self.index.write();
                    if let Some(stale_id) = indexed_id {
                        index.remove_list(stale_id);
                    }
                    adopt_stored_list(&mut index, existing)?;
                }
                return Err(ReadingListError::DuplicateName {
                    name: name.to_string(),
                });
            }
            None => {
                if let Some(stale_id) = indexed_id {
                    info!(
                        "event=reading_list_evict module=service status=ok list_id={stale_id}"
                    );
                    self.index.write().remove_list(stale_id);
                }
            }
        }

        if self.index.read().user_list_count() >= self.config.max_lists {
            return Err(ReadingListError::ListLimitReached {
                limit: self.config.max_lists,
            });
        }

        let mut list = ReadingList::new(trimmed, false, now_epoch_ms());
        list.description = normalize_description(description);
        list.item_keys
            .extend(articles.iter().map(|article| article.key.clone()));
        if list.item_keys.len() > self.config.max_entries_per_list {
            return Err(ReadingListError::EntryLimitReached {
                name: list.name,
                limit: self.config.max_entries_per_list,
            });
        }

        match store.insert_reading_list(&list) {
            Ok(()) => {}
            Err(RepoError::CanonicalNameTaken(_)) => {
                return Err(ReadingListError::DuplicateName {
                    name: name.to_string(),
                });
            }
            Err(err) => {
                warn!("event=reading_list_create module=service status=error error={err}");
                return Err(ReadingListError::StoreFailure(err));
            }
        }

        self.index.write().insert_list(list.clone())?;
        info!(
            "event=reading_list_create module=service status=ok list_id={} item_count={}",
            list.id,
            list.item_keys.len()
        );
        Ok(list)
    }

    /// Deletes every list whose canonical name matches one of `names`.
    ///
    /// # Contract
    /// - Names are resolved against the index, then the store; rows only
    ///   present in the store are indexed before deletion.
    /// - Names that resolve to nothing are skipped; zero matches is `Ok`.
    /// - The default list is skipped the same way.
    /// - Returns deleted lists in input order, each at most once.
    /// - All matches are removed in one store transaction.
    pub fn delete_reading_lists_named<N: AsRef<str>>(
        &self,
        names: &[N],
    ) -> ReadingListResult<Vec<ReadingList>> {
        let mut store = self.store.lock();

        let ids: Vec<ReadingListId> = {
            let mut index = self.index.write();
            let mut seen = HashSet::new();
            let mut ids = Vec::new();
            for name in names {
                let canonical_name = canonicalize_name(name.as_ref());
                let target = match index.list_by_canonical_name(&canonical_name) {
                    Some(list) => Some((list.id, list.is_default)),
                    // Rows written by another connection are adopted first.
                    None => match store.find_by_canonical_name(&canonical_name)? {
                        Some(stored) if !stored.is_default => {
                            let id = stored.id;
                            adopt_stored_list(&mut index, stored)?;
                            Some((id, false))
                        }
                        _ => None,
                    },
                };
                if let Some((id, false)) = target {
                    if seen.insert(id) {
                        ids.push(id);
                    }
                }
            }
            ids
        };

        if ids.is_empty() {
            info!(
                "event=reading_list_delete module=service status=skip requested={} deleted=0",
                names.len()
            );
            return Ok(Vec::new());
        }

        store.remove_reading_lists(&ids)?;

        let mut index = self.index.write();
        let deleted: Vec<ReadingList> = ids.iter().filter_map(|id| index.remove_list(*id)).collect();
        info!(
            "event=reading_list_delete module=service status=ok requested={} deleted={}",
            names.len(),
            deleted.len()
        );
        Ok(deleted)
    }

    /// Renames a user list.
    ///
    /// Changing only the case of the list's own name is allowed.
    pub fn rename_reading_list(
        &self,
        id: ReadingListId,
        new_name: &str,
    ) -> ReadingListResult<ReadingList> {
        let trimmed = validate_name(new_name)?;
        let canonical_name = canonicalize_name(trimmed);
        let mut store = self.store.lock();

        let mut renamed = {
            let index = self.index.read();
            let current = index.list(id).ok_or(ReadingListError::ListNotFound(id))?;
            if current.is_default {
                return Err(ReadingListError::DefaultListProtected(id));
            }
            if let Some(other) = index.list_by_canonical_name(&canonical_name) {
                if other.id != id {
                    return Err(ReadingListError::DuplicateName {
                        name: new_name.to_string(),
                    });
                }
            }
            current.clone()
        };

        let now = now_epoch_ms();
        renamed.rename(trimmed, now);
        match store.update_reading_list(&renamed) {
            Ok(()) => {}
            Err(RepoError::CanonicalNameTaken(_)) => {
                return Err(ReadingListError::DuplicateName {
                    name: new_name.to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        }

        let mut index = self.index.write();
        let updated = index.rename_list(id, trimmed, now)?.clone();
        info!("event=reading_list_rename module=service status=ok list_id={id}");
        Ok(updated)
    }

    /// Replaces the description of any list, the default list included.
    pub fn update_description(
        &self,
        id: ReadingListId,
        description: Option<&str>,
    ) -> ReadingListResult<ReadingList> {
        let mut store = self.store.lock();

        let mut updated = self
            .index
            .read()
            .list(id)
            .cloned()
            .ok_or(ReadingListError::ListNotFound(id))?;
        let now = now_epoch_ms();
        updated.description = normalize_description(description);
        updated.touch(now);
        store.update_reading_list(&updated)?;

        let mut index = self.index.write();
        let applied = index
            .set_description(id, updated.description, now)?
            .clone();
        Ok(applied)
    }

    /// Adds items to a list. Already present keys are ignored.
    pub fn add_articles(
        &self,
        id: ReadingListId,
        articles: &[ArticleRef],
    ) -> ReadingListResult<ReadingList> {
        let mut store = self.store.lock();

        let fresh: Vec<ItemKey> = {
            let index = self.index.read();
            let list = index.list(id).ok_or(ReadingListError::ListNotFound(id))?;
            let fresh: BTreeSet<ItemKey> = articles
                .iter()
                .map(|article| article.key.clone())
                .filter(|key| !list.contains(key))
                .collect();
            if fresh.is_empty() {
                return Ok(list.clone());
            }
            if list.item_keys.len() + fresh.len() > self.config.max_entries_per_list {
                return Err(ReadingListError::EntryLimitReached {
                    name: list.name.clone(),
                    limit: self.config.max_entries_per_list,
                });
            }
            fresh.into_iter().collect()
        };

        let now = now_epoch_ms();
        store.add_entries(id, &fresh, now)?;

        let mut index = self.index.write();
        for key in &fresh {
            index.add_membership(id, key, now)?;
        }
        info!(
            "event=reading_list_add_entries module=service status=ok list_id={id} added={}",
            fresh.len()
        );
        index
            .list(id)
            .cloned()
            .ok_or(ReadingListError::InconsistentState(
                "list missing after adding entries",
            ))
    }

    /// Removes items from a list. Absent keys are ignored.
    pub fn remove_articles(
        &self,
        id: ReadingListId,
        keys: &[ItemKey],
    ) -> ReadingListResult<ReadingList> {
        let mut store = self.store.lock();

        let present: Vec<ItemKey> = {
            let index = self.index.read();
            let list = index.list(id).ok_or(ReadingListError::ListNotFound(id))?;
            let present: BTreeSet<ItemKey> =
                keys.iter().filter(|key| list.contains(key)).cloned().collect();
            if present.is_empty() {
                return Ok(list.clone());
            }
            present.into_iter().collect()
        };

        let now = now_epoch_ms();
        store.remove_entries(id, &present, now)?;

        let mut index = self.index.write();
        for key in &present {
            index.remove_membership(id, key, now)?;
        }
        info!(
            "event=reading_list_remove_entries module=service status=ok list_id={id} removed={}",
            present.len()
        );
        index
            .list(id)
            .cloned()
            .ok_or(ReadingListError::InconsistentState(
                "list missing after removing entries",
            ))
    }

    /// Removes one item from every list containing it.
    ///
    /// Returns the ids of affected lists.
    pub fn remove_article_from_all_lists(
        &self,
        key: &ItemKey,
    ) -> ReadingListResult<Vec<ReadingListId>> {
        let mut store = self.store.lock();

        let ids = self.index.read().lists_containing(key);
        if ids.is_empty() {
            return Ok(ids);
        }

        let now = now_epoch_ms();
        store.remove_item_from_lists(key, &ids, now)?;

        let mut index = self.index.write();
        for id in &ids {
            index.remove_membership(*id, key, now)?;
        }
        info!(
            "event=reading_list_unsave module=service status=ok affected={}",
            ids.len()
        );
        Ok(ids)
    }

    /// Rebuilds the index from the store.
    ///
    /// Used after another writer changed the store directly. On failure the
    /// previous index stays in place.
    pub fn refresh_from_store(&self) -> ReadingListResult<()> {
        let mut store = self.store.lock();

        let lists = store.load_reading_lists()?;
        let mut index = MembershipIndex::from_lists(lists)?;
        ensure_default_list(&mut *store, &mut index, &self.config)?;

        let list_count = index.len();
        *self.index.write() = index;
        info!("event=reading_lists_refresh module=service status=ok list_count={list_count}");
        Ok(())
    }

    /// Returns the protected default list.
    pub fn default_reading_list(&self) -> ReadingListResult<ReadingList> {
        self.index
            .read()
            .default_list()
            .cloned()
            .ok_or(ReadingListError::InconsistentState(
                "default reading list missing",
            ))
    }

    pub fn reading_list(&self, id: ReadingListId) -> Option<ReadingList> {
        self.index.read().list(id).cloned()
    }

    /// Looks a list up by any name sharing its canonical key.
    pub fn reading_list_named(&self, name: &str) -> Option<ReadingList> {
        self.index
            .read()
            .list_by_canonical_name(&canonicalize_name(name))
            .cloned()
    }

    /// Returns every list: default first, then creation order.
    pub fn reading_lists(&self) -> Vec<ReadingList> {
        self.index.read().lists().into_iter().cloned().collect()
    }

    /// Returns every list containing `key`.
    pub fn reading_lists_containing(&self, key: &ItemKey) -> Vec<ReadingList> {
        let index = self.index.read();
        index
            .lists_containing(key)
            .into_iter()
            .filter_map(|id| index.list(id).cloned())
            .collect()
    }
}

fn ensure_default_list<S: ReadingListStore>(
    store: &mut S,
    index: &mut MembershipIndex,
    config: &ControllerConfig,
) -> ReadingListResult<()> {
    if index.default_list().is_some() {
        return Ok(());
    }

    let default_list = ReadingList::new(&config.default_list_name, true, now_epoch_ms());
    if index
        .list_by_canonical_name(&default_list.canonical_name)
        .is_some()
    {
        return Err(ReadingListError::DuplicateName {
            name: config.default_list_name.clone(),
        });
    }

    match store.insert_reading_list(&default_list) {
        Ok(()) => {}
        Err(RepoError::CanonicalNameTaken(_)) => {
            return Err(ReadingListError::DuplicateName {
                name: config.default_list_name.clone(),
            });
        }
        Err(err) => return Err(ReadingListError::StoreFailure(err)),
    }
    info!(
        "event=default_list_create module=service status=ok list_id={}",
        default_list.id
    );
    index.insert_list(default_list)?;
    Ok(())
}

fn adopt_stored_list(index: &mut MembershipIndex, list: ReadingList) -> ReadingListResult<()> {
    let list_id = list.id;
    match index.insert_list(list) {
        Ok(()) => {
            info!("event=reading_list_adopt module=service status=ok list_id={list_id}");
            Ok(())
        }
        Err(err) => {
            warn!(
                "event=reading_list_adopt module=service status=error list_id={list_id} error={err}"
            );
            Err(ReadingListError::Index(err))
        }
    }
}

fn validate_name(name: &str) -> ReadingListResult<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ReadingListError::InvalidName(name.to_string()));
    }
    Ok(trimmed)
}

fn normalize_description(description: Option<&str>) -> Option<String> {
    description
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
