//! Reading list store contract and SQLite implementation.
//!
//! # Responsibility
//! - Persist list records and membership edges.
//! - Provide lookup-by-canonical-name and full snapshot loading.
//!
//! # Invariants
//! - Multi-row writes run in one `IMMEDIATE` transaction.
//! - Read paths reject invalid persisted state instead of masking it.
//! - Entry rows are removed together with their list (`ON DELETE CASCADE`).

use crate::db::migrations::latest_version;
use crate::db::{is_current, schema_version, DbError};
use crate::model::reading_list::{
    ItemKey, ReadingList, ReadingListId, ReadingListValidationError,
};
use rusqlite::{
    params, Connection, ErrorCode, OptionalExtension, Row, Transaction, TransactionBehavior,
};
use std::collections::{BTreeSet, HashMap};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const LIST_SELECT_SQL: &str = "SELECT
    uuid,
    name,
    canonical_name,
    description,
    is_default,
    created_at,
    updated_at
FROM reading_lists";

const CANONICAL_NAME_CONSTRAINT: &str = "reading_lists.canonical_name";

pub type RepoResult<T> = Result<T, RepoError>;

/// Store-level error for reading list persistence.
#[derive(Debug)]
pub enum RepoError {
    Validation(ReadingListValidationError),
    Db(DbError),
    NotFound(ReadingListId),
    InvalidData(String),
    /// Another row already owns this canonical name.
    CanonicalNameTaken(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "reading list not found: {id}"),
            Self::InvalidData(message) => {
                write!(f, "invalid persisted reading list data: {message}")
            }
            Self::CanonicalNameTaken(canonical_name) => {
                write!(f, "canonical name already stored: `{canonical_name}`")
            }
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match expected {expected_version}"
            ),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ReadingListValidationError> for RepoError {
    fn from(value: ReadingListValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Durable storage contract for reading lists.
///
/// Every method is atomic: it either applies fully or leaves storage
/// unchanged.
pub trait ReadingListStore {
    /// Inserts one list together with its entries.
    fn insert_reading_list(&mut self, list: &ReadingList) -> RepoResult<()>;
    /// Deletes every listed id in one transaction. Unknown ids are ignored.
    fn remove_reading_lists(&mut self, ids: &[ReadingListId]) -> RepoResult<()>;
    /// Finds a stored list by canonical name.
    fn find_by_canonical_name(&self, canonical_name: &str) -> RepoResult<Option<ReadingList>>;
    /// Loads every stored list with entries.
    fn load_reading_lists(&self) -> RepoResult<Vec<ReadingList>>;
    /// Persists name, description and `updated_at` of an existing list.
    fn update_reading_list(&mut self, list: &ReadingList) -> RepoResult<()>;
    /// Adds entries to one list. Already present keys are ignored.
    fn add_entries(
        &mut self,
        id: ReadingListId,
        keys: &[ItemKey],
        updated_at: i64,
    ) -> RepoResult<()>;
    /// Removes entries from one list. Absent keys are ignored.
    fn remove_entries(
        &mut self,
        id: ReadingListId,
        keys: &[ItemKey],
        updated_at: i64,
    ) -> RepoResult<()>;
    /// Removes one item from several lists in one transaction.
    fn remove_item_from_lists(
        &mut self,
        key: &ItemKey,
        ids: &[ReadingListId],
        updated_at: i64,
    ) -> RepoResult<()>;

    /// Deletes one list.
    fn remove_reading_list(&mut self, id: ReadingListId) -> RepoResult<()> {
        self.remove_reading_lists(&[id])
    }
}

/// SQLite-backed reading list store.
///
/// Owns its connection so the controller can move it behind a lock.
pub struct SqliteReadingListStore {
    conn: Connection,
}

impl SqliteReadingListStore {
    /// Wraps a migrated connection.
    ///
    /// # Errors
    /// - `UninitializedConnection` when migrations were not applied.
    pub fn try_new(conn: Connection) -> RepoResult<Self> {
        ensure_connection_ready(&conn)?;
        Ok(Self { conn })
    }

    /// Borrows the underlying connection (diagnostics and tests).
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn immediate(&mut self) -> RepoResult<Transaction<'_>> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }
}

impl ReadingListStore for SqliteReadingListStore {
    fn insert_reading_list(&mut self, list: &ReadingList) -> RepoResult<()> {
        list.validate()?;

        let tx = self.immediate()?;
        let inserted = tx.execute(
            "INSERT INTO reading_lists (
                uuid,
                name,
                canonical_name,
                description,
                is_default,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                list.id.to_string(),
                list.name.as_str(),
                list.canonical_name.as_str(),
                list.description.as_deref(),
                bool_to_int(list.is_default),
                list.created_at,
                list.updated_at,
            ],
        );
        if let Err(err) = inserted {
            return Err(map_insert_error(err, list));
        }

        let id_text = list.id.to_string();
        for key in &list.item_keys {
            insert_entry(&tx, id_text.as_str(), key, list.updated_at)?;
        }

        tx.commit()?;
        Ok(())
    }

    fn remove_reading_lists(&mut self, ids: &[ReadingListId]) -> RepoResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let tx = self.immediate()?;
        for id in ids {
            tx.execute(
                "DELETE FROM reading_lists WHERE uuid = ?1;",
                [id.to_string()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn find_by_canonical_name(&self, canonical_name: &str) -> RepoResult<Option<ReadingList>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{LIST_SELECT_SQL} WHERE canonical_name = ?1;"))?;
        let mut rows = stmt.query([canonical_name])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        let mut list = parse_list_row(row)?;
        list.item_keys = load_entries_for_list(&self.conn, &list.id.to_string())?;
        Ok(Some(list))
    }

    fn load_reading_lists(&self) -> RepoResult<Vec<ReadingList>> {
        let mut entries = load_all_entries(&self.conn)?;
        let mut stmt = self.conn.prepare(&format!(
            "{LIST_SELECT_SQL} ORDER BY is_default DESC, created_at ASC, uuid ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut lists = Vec::new();
        while let Some(row) = rows.next()? {
            let mut list = parse_list_row(row)?;
            list.item_keys = entries.remove(&list.id).unwrap_or_default();
            lists.push(list);
        }
        Ok(lists)
    }

    fn update_reading_list(&mut self, list: &ReadingList) -> RepoResult<()> {
        list.validate()?;

        let changed = self
            .conn
            .execute(
                "UPDATE reading_lists
                 SET
                    name = ?2,
                    canonical_name = ?3,
                    description = ?4,
                    updated_at = ?5
                 WHERE uuid = ?1;",
                params![
                    list.id.to_string(),
                    list.name.as_str(),
                    list.canonical_name.as_str(),
                    list.description.as_deref(),
                    list.updated_at,
                ],
            )
            .map_err(|err| map_insert_error(err, list))?;

        if changed == 0 {
            return Err(RepoError::NotFound(list.id));
        }
        Ok(())
    }

    fn add_entries(
        &mut self,
        id: ReadingListId,
        keys: &[ItemKey],
        updated_at: i64,
    ) -> RepoResult<()> {
        let id_text = id.to_string();
        let tx = self.immediate()?;
        if !list_exists_in_tx(&tx, id_text.as_str())? {
            return Err(RepoError::NotFound(id));
        }

        for key in keys {
            insert_entry(&tx, id_text.as_str(), key, updated_at)?;
        }
        touch_list_in_tx(&tx, id_text.as_str(), updated_at)?;

        tx.commit()?;
        Ok(())
    }

    fn remove_entries(
        &mut self,
        id: ReadingListId,
        keys: &[ItemKey],
        updated_at: i64,
    ) -> RepoResult<()> {
        let id_text = id.to_string();
        let tx = self.immediate()?;
        if !list_exists_in_tx(&tx, id_text.as_str())? {
            return Err(RepoError::NotFound(id));
        }

        for key in keys {
            tx.execute(
                "DELETE FROM reading_list_entries WHERE list_uuid = ?1 AND item_key = ?2;",
                params![id_text.as_str(), key.as_str()],
            )?;
        }
        touch_list_in_tx(&tx, id_text.as_str(), updated_at)?;

        tx.commit()?;
        Ok(())
    }

    fn remove_item_from_lists(
        &mut self,
        key: &ItemKey,
        ids: &[ReadingListId],
        updated_at: i64,
    ) -> RepoResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let tx = self.immediate()?;
        for id in ids {
            let id_text = id.to_string();
            tx.execute(
                "DELETE FROM reading_list_entries WHERE list_uuid = ?1 AND item_key = ?2;",
                params![id_text.as_str(), key.as_str()],
            )?;
            touch_list_in_tx(&tx, id_text.as_str(), updated_at)?;
        }
        tx.commit()?;
        Ok(())
    }
}

fn insert_entry(
    tx: &Transaction<'_>,
    list_uuid: &str,
    key: &ItemKey,
    created_at: i64,
) -> RepoResult<()> {
    tx.execute(
        "INSERT OR IGNORE INTO reading_list_entries (list_uuid, item_key, created_at)
         VALUES (?1, ?2, ?3);",
        params![list_uuid, key.as_str(), created_at],
    )?;
    Ok(())
}

fn touch_list_in_tx(tx: &Transaction<'_>, list_uuid: &str, updated_at: i64) -> RepoResult<()> {
    tx.execute(
        "UPDATE reading_lists
         SET updated_at = MAX(updated_at, ?2)
         WHERE uuid = ?1;",
        params![list_uuid, updated_at],
    )?;
    Ok(())
}

fn list_exists_in_tx(tx: &Transaction<'_>, list_uuid: &str) -> RepoResult<bool> {
    let found = tx
        .query_row(
            "SELECT 1 FROM reading_lists WHERE uuid = ?1;",
            [list_uuid],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn load_entries_for_list(conn: &Connection, list_uuid: &str) -> RepoResult<BTreeSet<ItemKey>> {
    let mut stmt = conn.prepare(
        "SELECT item_key
         FROM reading_list_entries
         WHERE list_uuid = ?1
         ORDER BY item_key ASC;",
    )?;
    let mut rows = stmt.query([list_uuid])?;
    let mut keys = BTreeSet::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        keys.insert(ItemKey::new(value));
    }
    Ok(keys)
}

fn load_all_entries(conn: &Connection) -> RepoResult<HashMap<ReadingListId, BTreeSet<ItemKey>>> {
    let mut stmt = conn.prepare("SELECT list_uuid, item_key FROM reading_list_entries;")?;
    let mut rows = stmt.query([])?;
    let mut entries: HashMap<ReadingListId, BTreeSet<ItemKey>> = HashMap::new();
    while let Some(row) = rows.next()? {
        let list_uuid: String = row.get(0)?;
        let item_key: String = row.get(1)?;
        entries
            .entry(parse_uuid(&list_uuid, "reading_list_entries.list_uuid")?)
            .or_default()
            .insert(ItemKey::new(item_key));
    }
    Ok(entries)
}

fn parse_list_row(row: &Row<'_>) -> RepoResult<ReadingList> {
    let uuid_text: String = row.get("uuid")?;
    let id = parse_uuid(&uuid_text, "reading_lists.uuid")?;

    let is_default = match row.get::<_, i64>("is_default")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid is_default value `{other}` in reading_lists.is_default"
            )));
        }
    };

    let list = ReadingList {
        id,
        name: row.get("name")?,
        canonical_name: row.get("canonical_name")?,
        description: row.get("description")?,
        is_default,
        item_keys: BTreeSet::new(),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    };
    list.validate()?;
    Ok(list)
}

fn parse_uuid(value: &str, column: &str) -> RepoResult<ReadingListId> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

fn map_insert_error(err: rusqlite::Error, list: &ReadingList) -> RepoError {
    if let rusqlite::Error::SqliteFailure(failure, Some(message)) = &err {
        if failure.code == ErrorCode::ConstraintViolation
            && message.contains(CANONICAL_NAME_CONSTRAINT)
        {
            return RepoError::CanonicalNameTaken(list.canonical_name.clone());
        }
    }
    err.into()
}

fn ensure_connection_ready(conn: &Connection) -> RepoResult<()> {
    if is_current(conn)? {
        return Ok(());
    }
    Err(RepoError::UninitializedConnection {
        expected_version: latest_version(),
        actual_version: schema_version(conn)?,
    })
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
