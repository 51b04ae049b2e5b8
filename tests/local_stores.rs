//! End-to-end behaviour over local key-value storage.

use std::time::Duration;

use quicklists::{
    CHECKLISTS_KEY, CHECKLIST_ITEMS_KEY, KeyValueStorage, LoadPhase, MemoryStorage, Progress,
    Quicklists,
};
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(2);

async fn open_loaded(storage: MemoryStorage) -> Quicklists {
    let session = Quicklists::builder()
        .memory_storage(storage)
        .open()
        .expect("open should succeed");
    session
        .checklists()
        .wait_for(WAIT, |s| s.phase.is_settled())
        .await
        .expect("checklists should settle");
    session
        .items()
        .wait_for(WAIT, |s| s.phase.is_settled())
        .await
        .expect("items should settle");
    session
}

#[tokio::test]
async fn duplicate_titles_get_distinct_slugs() {
    let session = open_loaded(MemoryStorage::new()).await;
    let checklists = session.checklists();

    checklists.add("Groceries").await.expect("add should be accepted");
    checklists.add("Groceries").await.expect("add should be accepted");

    let state = checklists.state().await.expect("store should be alive");
    assert_eq!(state.checklists.len(), 2);
    assert_eq!(state.checklists[0].id, "groceries");

    let suffix = state.checklists[1]
        .id
        .strip_prefix("groceries")
        .expect("second id should extend the slug");
    assert!(!suffix.is_empty());
    assert!(suffix.chars().all(|c| c.is_ascii_digit()), "got suffix {suffix}");
}

#[tokio::test]
async fn size_tracks_adds_minus_effective_removes() {
    let session = open_loaded(MemoryStorage::new()).await;
    let checklists = session.checklists();

    for title in ["Groceries", "Packing", "Chores"] {
        checklists.add(title).await.expect("add should be accepted");
    }
    checklists.remove("packing").await.expect("remove should be accepted");
    checklists.remove("packing").await.expect("remove should be accepted");
    checklists.remove("missing").await.expect("remove should be accepted");
    checklists
        .edit("chores", "Weekend chores")
        .await
        .expect("edit should be accepted");

    let state = checklists.state().await.expect("store should be alive");
    let titles: Vec<_> = state.checklists.iter().map(|c| c.title.as_str()).collect();
    assert_eq!(titles, ["Groceries", "Weekend chores"]);
    // Ids never change on edit.
    assert_eq!(state.checklists[1].id, "chores");
}

#[tokio::test]
async fn blank_title_is_rejected_until_cleared() {
    let session = open_loaded(MemoryStorage::new()).await;
    let checklists = session.checklists();

    checklists.add("   ").await.expect("add should be accepted");
    let state = checklists.state().await.expect("store should be alive");
    assert!(state.checklists.is_empty());
    assert_eq!(
        state.error.as_deref(),
        Some("failed to add checklist: title must not be blank")
    );

    // The error outlives later successful commands.
    checklists.add("Groceries").await.expect("add should be accepted");
    assert!(checklists.state().await.expect("store should be alive").error.is_some());

    checklists.clear_error().await.expect("clear should be accepted");
    assert_eq!(checklists.state().await.expect("store should be alive").error, None);
}

#[tokio::test]
async fn removing_a_checklist_removes_its_items() {
    let storage = MemoryStorage::new();
    let session = open_loaded(storage.clone()).await;
    let (checklists, items) = (session.checklists(), session.items());

    checklists.add("Groceries").await.expect("add should be accepted");
    checklists.add("Packing").await.expect("add should be accepted");
    items.add("groceries", "Milk").await.expect("add should be accepted");
    items.add("groceries", "Eggs").await.expect("add should be accepted");
    items.add("packing", "Socks").await.expect("add should be accepted");
    items.state().await.expect("store should be alive");

    checklists.remove("groceries").await.expect("remove should be accepted");

    let state = items
        .wait_for(WAIT, |s| s.checklist_items.len() == 1)
        .await
        .expect("cascade should purge items");
    assert_eq!(state.checklist_items[0].title, "Socks");
    assert!(state.items_for("groceries").next().is_none());

    // The purged collection is what was persisted.
    items.state().await.expect("store should be alive");
    let raw = storage
        .get_item(CHECKLIST_ITEMS_KEY)
        .expect("read should succeed")
        .expect("items should be saved");
    assert!(!raw.contains("groceries"), "got: {raw}");
}

#[tokio::test]
async fn toggle_twice_restores_checked() {
    let session = open_loaded(MemoryStorage::new()).await;
    let items = session.items();

    items.add("groceries", "Milk").await.expect("add should be accepted");
    let id = items.state().await.expect("store should be alive").checklist_items[0]
        .id
        .clone();

    items.toggle(&id).await.expect("toggle should be accepted");
    assert!(items.state().await.expect("store should be alive").checklist_items[0].checked);
    items.toggle(&id).await.expect("toggle should be accepted");
    assert!(!items.state().await.expect("store should be alive").checklist_items[0].checked);
}

#[tokio::test]
async fn reset_only_unchecks_matching_checklist() {
    let session = open_loaded(MemoryStorage::new()).await;
    let items = session.items();

    items.add("groceries", "Milk").await.expect("add should be accepted");
    items.add("packing", "Socks").await.expect("add should be accepted");
    for item in items.state().await.expect("store should be alive").checklist_items {
        items.toggle(item.id).await.expect("toggle should be accepted");
    }
    items.reset("groceries").await.expect("reset should be accepted");

    items.set_active_checklist("groceries").await.expect("switch should be accepted");
    let state = items.state().await.expect("store should be alive");
    assert_eq!(state.progress("groceries"), Progress { checked: 0, total: 1 });
    assert_eq!(state.progress("packing"), Progress { checked: 1, total: 1 });
    assert_eq!(items.active_items().len(), 1);
    assert_eq!(items.active_items()[0].title, "Milk");
}

#[tokio::test]
async fn edit_item_keeps_id_and_checklist() {
    let session = open_loaded(MemoryStorage::new()).await;
    let items = session.items();

    items.add("groceries", "Milk").await.expect("add should be accepted");
    let before = items.state().await.expect("store should be alive").checklist_items[0].clone();
    items
        .edit(&before.id, "Oat milk")
        .await
        .expect("edit should be accepted");
    items.remove("missing").await.expect("remove should be accepted");

    let after = items.state().await.expect("store should be alive").checklist_items;
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].id, before.id);
    assert_eq!(after[0].checklist_id, "groceries");
    assert_eq!(after[0].title, "Oat milk");
}

#[tokio::test]
async fn malformed_storage_fails_load_and_is_never_overwritten() {
    let storage = MemoryStorage::new();
    let bad = r#"[{"id": "groceries", "title": "Groceries"}, {"id": "", "title": "Packing"}]"#;
    storage.set_item(CHECKLISTS_KEY, bad).expect("seed should succeed");

    let session = open_loaded(storage.clone()).await;
    let state = session.checklists().snapshot();
    assert_eq!(state.phase, LoadPhase::LoadFailed);
    assert!(state.checklists.is_empty());
    let error = state.error.expect("load failure should be reported");
    assert!(error.starts_with("failed to load checklists: "), "got: {error}");
    assert!(error.contains("index 1"), "got: {error}");

    // Commands still apply in memory, but nothing is saved over the data.
    session.checklists().add("Chores").await.expect("add should be accepted");
    let state = session.checklists().state().await.expect("store should be alive");
    assert_eq!(state.checklists.len(), 1);
    assert_eq!(
        storage.get_item(CHECKLISTS_KEY).expect("read should succeed").as_deref(),
        Some(bad)
    );
}

#[tokio::test]
async fn file_storage_survives_a_new_session() {
    let tmp = TempDir::new().expect("failed to create temp dir");

    {
        let session = Quicklists::builder()
            .file_storage(tmp.path())
            .open()
            .expect("open should succeed");
        session
            .checklists()
            .wait_for(WAIT, |s| s.loaded())
            .await
            .expect("checklists should load");
        session
            .items()
            .wait_for(WAIT, |s| s.loaded())
            .await
            .expect("items should load");
        session.checklists().add("Groceries").await.expect("add should be accepted");
        session.items().add("groceries", "Milk").await.expect("add should be accepted");
        session.checklists().state().await.expect("store should be alive");
        session.items().state().await.expect("store should be alive");
        session.shutdown().await.expect("shutdown should be accepted");
    }

    let session = Quicklists::builder()
        .file_storage(tmp.path())
        .open()
        .expect("open should succeed");
    let checklists = session
        .checklists()
        .wait_for(WAIT, |s| s.loaded())
        .await
        .expect("checklists should load");
    let items = session
        .items()
        .wait_for(WAIT, |s| s.loaded())
        .await
        .expect("items should load");

    assert_eq!(checklists.checklists[0].id, "groceries");
    assert_eq!(items.checklist_items[0].title, "Milk");
    assert!(!items.checklist_items[0].checked);
    assert!(tmp.path().join("checklistItems.json").exists());
}
