use readinglist_core::db::{open_db, open_db_in_memory};
use readinglist_core::{
    ArticleRef, ControllerConfig, ItemKey, ReadingList, ReadingListError, ReadingListId,
    ReadingListStore, ReadingListsController, RepoError, RepoResult, SqliteReadingListStore,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Delegating store whose writes fail while `fail_writes` is set.
struct FlakyStore {
    inner: SqliteReadingListStore,
    fail_writes: Arc<AtomicBool>,
}

impl FlakyStore {
    fn check(&self) -> RepoResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepoError::InvalidData("injected write failure".to_string()));
        }
        Ok(())
    }
}

impl ReadingListStore for FlakyStore {
    fn insert_reading_list(&mut self, list: &ReadingList) -> RepoResult<()> {
        self.check()?;
        self.inner.insert_reading_list(list)
    }

    fn remove_reading_lists(&mut self, ids: &[ReadingListId]) -> RepoResult<()> {
        self.check()?;
        self.inner.remove_reading_lists(ids)
    }

    fn find_by_canonical_name(&self, canonical_name: &str) -> RepoResult<Option<ReadingList>> {
        self.inner.find_by_canonical_name(canonical_name)
    }

    fn load_reading_lists(&self) -> RepoResult<Vec<ReadingList>> {
        self.inner.load_reading_lists()
    }

    fn update_reading_list(&mut self, list: &ReadingList) -> RepoResult<()> {
        self.check()?;
        self.inner.update_reading_list(list)
    }

    fn add_entries(
        &mut self,
        id: ReadingListId,
        keys: &[ItemKey],
        updated_at: i64,
    ) -> RepoResult<()> {
        self.check()?;
        self.inner.add_entries(id, keys, updated_at)
    }

    fn remove_entries(
        &mut self,
        id: ReadingListId,
        keys: &[ItemKey],
        updated_at: i64,
    ) -> RepoResult<()> {
        self.check()?;
        self.inner.remove_entries(id, keys, updated_at)
    }

    fn remove_item_from_lists(
        &mut self,
        key: &ItemKey,
        ids: &[ReadingListId],
        updated_at: i64,
    ) -> RepoResult<()> {
        self.check()?;
        self.inner.remove_item_from_lists(key, ids, updated_at)
    }
}

fn flaky_controller() -> (ReadingListsController<FlakyStore>, Arc<AtomicBool>) {
    let fail_writes = Arc::new(AtomicBool::new(false));
    let store = FlakyStore {
        inner: SqliteReadingListStore::try_new(open_db_in_memory().unwrap()).unwrap(),
        fail_writes: Arc::clone(&fail_writes),
    };
    let controller = ReadingListsController::with_default_config(store).unwrap();
    (controller, fail_writes)
}

#[test]
fn failed_create_leaves_index_untouched() {
    let (controller, fail_writes) = flaky_controller();
    fail_writes.store(true, Ordering::SeqCst);

    let err = controller
        .create_reading_list("doggos", &[ArticleRef::new("a", "//a")])
        .unwrap_err();
    assert!(matches!(err, ReadingListError::StoreFailure(_)));
    assert!(controller.reading_list_named("doggos").is_none());
    assert!(controller
        .reading_lists_containing(&ItemKey::from("a"))
        .is_empty());

    fail_writes.store(false, Ordering::SeqCst);
    controller.create_reading_list("doggos", &[]).unwrap();
}

#[test]
fn failed_delete_keeps_every_list() {
    let (controller, fail_writes) = flaky_controller();
    controller.create_reading_list("doggos", &[]).unwrap();
    controller.create_reading_list("goats", &[]).unwrap();
    fail_writes.store(true, Ordering::SeqCst);

    let err = controller
        .delete_reading_lists_named(&["doggos", "goats"])
        .unwrap_err();
    assert!(matches!(err, ReadingListError::StoreFailure(_)));
    assert!(controller.reading_list_named("doggos").is_some());
    assert!(controller.reading_list_named("goats").is_some());

    fail_writes.store(false, Ordering::SeqCst);
    let stored = controller.into_store().inner.load_reading_lists().unwrap();
    assert_eq!(stored.len(), 3);
}

#[test]
fn failed_membership_writes_leave_lists_unchanged() {
    let (controller, fail_writes) = flaky_controller();
    let list = controller
        .create_reading_list("sneks", &[ArticleRef::new("kept", "//kept")])
        .unwrap();
    fail_writes.store(true, Ordering::SeqCst);

    assert!(controller
        .add_articles(list.id, &[ArticleRef::new("new", "//new")])
        .is_err());
    assert!(controller
        .remove_articles(list.id, &[ItemKey::from("kept")])
        .is_err());
    assert!(controller
        .remove_article_from_all_lists(&ItemKey::from("kept"))
        .is_err());
    assert!(controller.rename_reading_list(list.id, "snakes").is_err());

    assert_eq!(controller.reading_list(list.id).unwrap(), list);
    assert_eq!(
        controller.reading_lists_containing(&ItemKey::from("kept")),
        vec![list]
    );
}

#[test]
fn concurrent_creates_of_case_variants_admit_exactly_one() {
    let store = SqliteReadingListStore::try_new(open_db_in_memory().unwrap()).unwrap();
    let controller = ReadingListsController::with_default_config(store).unwrap();
    let variants = [
        "pebbles", "Pebbles", "PEBBLES", "pEbBLes", "pebbleS", "PeBbLeS", "pebBles", "PEBbles",
    ];

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = variants
            .iter()
            .map(|name| {
                let controller = &controller;
                scope.spawn(move || controller.create_reading_list(name, &[]))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    });

    let created = results.iter().filter(|result| result.is_ok()).count();
    let duplicates = results
        .iter()
        .filter(|result| matches!(result, Err(ReadingListError::DuplicateName { .. })))
        .count();
    assert_eq!(created, 1);
    assert_eq!(duplicates, variants.len() - 1);
    assert_eq!(controller.reading_lists().len(), 2);
}

#[test]
fn lists_persist_across_reopen_without_duplicating_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("readinglists.db");

    let (default_id, sneks) = {
        let store = SqliteReadingListStore::try_new(open_db(&path).unwrap()).unwrap();
        let controller = ReadingListsController::with_default_config(store).unwrap();
        let sneks = controller
            .create_reading_list("sneks", &[ArticleRef::new("snek", "//snek")])
            .unwrap();
        (controller.default_reading_list().unwrap().id, sneks)
    };

    let store = SqliteReadingListStore::try_new(open_db(&path).unwrap()).unwrap();
    let controller = ReadingListsController::with_default_config(store).unwrap();
    assert_eq!(controller.default_reading_list().unwrap().id, default_id);
    assert_eq!(controller.reading_list_named("SNEKS").unwrap(), sneks);
    assert_eq!(controller.reading_lists().len(), 2);
}

#[test]
fn rows_written_by_another_connection_are_detected_and_refreshed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.db");

    let store = SqliteReadingListStore::try_new(open_db(&path).unwrap()).unwrap();
    let controller = ReadingListsController::with_default_config(store).unwrap();

    let mut background = SqliteReadingListStore::try_new(open_db(&path).unwrap()).unwrap();
    let synced = ReadingList::new("Goats", false, 1_000);
    background.insert_reading_list(&synced).unwrap();
    let other = ReadingList::new("Cattos", false, 1_000);
    background.insert_reading_list(&other).unwrap();

    let err = controller.create_reading_list("goats", &[]).unwrap_err();
    assert!(matches!(err, ReadingListError::DuplicateName { ref name } if name == "goats"));
    assert_eq!(controller.reading_list_named("goats").unwrap().id, synced.id);
    assert!(controller.reading_list_named("cattos").is_none());

    controller.refresh_from_store().unwrap();
    assert_eq!(controller.reading_list_named("cattos").unwrap().id, other.id);
    assert_eq!(controller.reading_lists().len(), 3);
}

#[test]
fn refresh_restores_default_list_removed_externally() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.db");

    let store = SqliteReadingListStore::try_new(open_db(&path).unwrap()).unwrap();
    let controller = ReadingListsController::with_default_config(store).unwrap();
    let original_default = controller.default_reading_list().unwrap();

    let mut background = SqliteReadingListStore::try_new(open_db(&path).unwrap()).unwrap();
    background.remove_reading_list(original_default.id).unwrap();

    controller.refresh_from_store().unwrap();
    let restored = controller.default_reading_list().unwrap();
    assert_ne!(restored.id, original_default.id);
    assert_eq!(restored.name, "Saved");
}

#[test]
fn open_fails_when_a_user_list_owns_the_default_name() {
    let mut store = SqliteReadingListStore::try_new(open_db_in_memory().unwrap()).unwrap();
    store
        .insert_reading_list(&ReadingList::new("saved", false, 1))
        .unwrap();

    let err = ReadingListsController::open(store, ControllerConfig::default())
        .err()
        .unwrap();
    assert!(matches!(err, ReadingListError::DuplicateName { ref name } if name == "Saved"));
}

#[test]
fn delete_by_name_removes_rows_written_by_another_connection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.db");

    let store = SqliteReadingListStore::try_new(open_db(&path).unwrap()).unwrap();
    let controller = ReadingListsController::with_default_config(store).unwrap();

    let mut background = SqliteReadingListStore::try_new(open_db(&path).unwrap()).unwrap();
    let sneks = ReadingList::new("sneks", false, 1_000);
    background.insert_reading_list(&sneks).unwrap();

    let deleted = controller.delete_reading_lists_named(&["SNEKS"]).unwrap();
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].id, sneks.id);
    assert!(background.find_by_canonical_name("sneks").unwrap().is_none());
    assert!(controller.reading_list_named("sneks").is_none());

    controller.create_reading_list("sneks", &[]).unwrap();
}

#[test]
fn delete_by_name_skips_default_row_found_only_in_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.db");

    let store = SqliteReadingListStore::try_new(open_db(&path).unwrap()).unwrap();
    let controller = ReadingListsController::with_default_config(store).unwrap();
    let original_default = controller.default_reading_list().unwrap();

    let mut background = SqliteReadingListStore::try_new(open_db(&path).unwrap()).unwrap();
    background.remove_reading_list(original_default.id).unwrap();
    let replacement = ReadingList::new("Library", true, 1_000);
    background.insert_reading_list(&replacement).unwrap();

    let deleted = controller.delete_reading_lists_named(&["library"]).unwrap();
    assert!(deleted.is_empty());
    assert!(background.find_by_canonical_name("library").unwrap().is_some());
}

#[test]
fn name_freed_by_another_connection_can_be_reused() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.db");

    let store = SqliteReadingListStore::try_new(open_db(&path).unwrap()).unwrap();
    let controller = ReadingListsController::with_default_config(store).unwrap();
    let goats = controller.create_reading_list("goats", &[]).unwrap();

    let mut background = SqliteReadingListStore::try_new(open_db(&path).unwrap()).unwrap();
    background.remove_reading_list(goats.id).unwrap();

    let recreated = controller.create_reading_list("Goats", &[]).unwrap();
    assert_ne!(recreated.id, goats.id);
    assert!(controller.reading_list(goats.id).is_none());
    assert_eq!(controller.reading_list_named("goats").unwrap().id, recreated.id);
    assert_eq!(controller.reading_lists().len(), 2);
}

#[test]
fn name_replaced_by_another_connection_reports_stored_list() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.db");

    let store = SqliteReadingListStore::try_new(open_db(&path).unwrap()).unwrap();
    let controller = ReadingListsController::with_default_config(store).unwrap();
    let goats = controller.create_reading_list("goats", &[]).unwrap();

    let mut background = SqliteReadingListStore::try_new(open_db(&path).unwrap()).unwrap();
    background.remove_reading_list(goats.id).unwrap();
    let replacement = ReadingList::new("GOATS", false, 2_000);
    background.insert_reading_list(&replacement).unwrap();

    let err = controller.create_reading_list("goats", &[]).unwrap_err();
    assert!(matches!(err, ReadingListError::DuplicateName { ref name } if name == "goats"));
    assert!(controller.reading_list(goats.id).is_none());
    assert_eq!(
        controller.reading_list_named("goats").unwrap().id,
        replacement.id
    );
}

#[test]
fn unadoptable_store_row_surfaces_index_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.db");

    let store = SqliteReadingListStore::try_new(open_db(&path).unwrap()).unwrap();
    let controller = ReadingListsController::with_default_config(store).unwrap();
    let original_default = controller.default_reading_list().unwrap();

    // A second default row cannot coexist with the indexed one.
    let mut background = SqliteReadingListStore::try_new(open_db(&path).unwrap()).unwrap();
    background.remove_reading_list(original_default.id).unwrap();
    background
        .insert_reading_list(&ReadingList::new("Library", true, 1_000))
        .unwrap();

    let err = controller.create_reading_list("library", &[]).unwrap_err();
    assert!(matches!(err, ReadingListError::Index(_)));
    assert!(controller.reading_list_named("library").is_none());

    controller.refresh_from_store().unwrap();
    assert_eq!(controller.default_reading_list().unwrap().name, "Library");
}

#[test]
fn concurrent_delete_and_create_keep_index_and_store_in_agreement() {
    let store = SqliteReadingListStore::try_new(open_db_in_memory().unwrap()).unwrap();
    let controller = ReadingListsController::with_default_config(store).unwrap();
    controller.create_reading_list("doggos", &[]).unwrap();
    controller.create_reading_list("goats", &[]).unwrap();
    let variants = ["Doggos", "DOGGOS", "dOgGoS", "doggoS", "DoGgOs", "doGGos"];

    std::thread::scope(|scope| {
        let controller = &controller;
        scope.spawn(move || {
            for _ in 0..4 {
                controller
                    .delete_reading_lists_named(&["doggos", "goats"])
                    .unwrap();
            }
        });
        for name in variants {
            scope.spawn(move || {
                let result = controller.create_reading_list(name, &[]);
                assert!(matches!(
                    result,
                    Ok(_) | Err(ReadingListError::DuplicateName { .. })
                ));
            });
        }
    });

    let mut indexed: Vec<(ReadingListId, String)> = controller
        .reading_lists()
        .into_iter()
        .map(|list| (list.id, list.canonical_name))
        .collect();
    let mut stored: Vec<(ReadingListId, String)> = controller
        .into_store()
        .load_reading_lists()
        .unwrap()
        .into_iter()
        .map(|list| (list.id, list.canonical_name))
        .collect();
    indexed.sort();
    stored.sort();
    assert_eq!(indexed, stored);
    assert!(
        stored
            .iter()
            .filter(|(_, canonical_name)| canonical_name == "doggos")
            .count()
            <= 1
    );
    assert!(stored.iter().all(|(_, canonical_name)| canonical_name != "goats"));
}
