use expense_tracker::model::{ItemInput, NewProject};
use expense_tracker::saving::{load_snapshot, save_snapshot};
use expense_tracker::store::{FieldValue, Fields, MemoryStore, StoreSnapshot};
use expense_tracker::Tracker;
use std::sync::Arc;
use tempfile::tempdir;

#[test]
fn snapshot_survives_a_save_and_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("store.bin.gz");

    let mut snapshot = StoreSnapshot::default();
    snapshot.documents.insert(
        "projects/p1".to_string(),
        Fields::from([
            ("name".to_string(), FieldValue::Text("Porch".to_string())),
            ("amount".to_string(), FieldValue::Number(12.5)),
            ("createdAt".to_string(), FieldValue::Timestamp(chrono::Utc::now())),
        ]),
    );

    save_snapshot(&snapshot, &path).unwrap();
    assert!(path.exists());
    assert!(!path.with_extension("tmp").exists());

    let loaded = load_snapshot(&path).unwrap();
    assert_eq!(loaded.documents, snapshot.documents);
}

#[test]
fn loading_garbage_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.bin.gz");
    std::fs::write(&path, b"not a snapshot").unwrap();

    assert!(load_snapshot(&path).is_err());
    assert!(MemoryStore::open(&path).is_err());
}

#[tokio::test]
async fn reopened_store_keeps_projects_and_totals() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.bin.gz");

    let project_id = {
        let tracker = Tracker::new(Arc::new(MemoryStore::open(&path).unwrap()));
        let input = NewProject {
            name: "Fence".to_string(),
            ..NewProject::default()
        };
        let project_id = tracker.create_project("u1", &input).await.unwrap().unwrap();
        let section = tracker.add_section(&project_id, "Posts").await.unwrap().unwrap();
        tracker
            .add_item(&project_id, &section, &ItemInput::new("Post", 40.0))
            .await
            .unwrap();
        project_id
    };

    let reopened = Arc::new(MemoryStore::open(&path).unwrap());
    assert_eq!(reopened.len().unwrap(), 3);
    let tracker = Tracker::new(reopened);
    assert_eq!(tracker.compute_total(&project_id).await.unwrap(), 40.0);
    assert_eq!(tracker.load_meta(&project_id).await.unwrap().unwrap().name, "Fence");
}

#[tokio::test]
async fn failed_snapshot_write_leaves_the_store_unchanged() {
    use expense_tracker::error::StoreError;
    use expense_tracker::store::DocumentStore;
    use expense_tracker::CollectionRoot;

    let dir = tempdir().unwrap();
    let path = dir.path().join("store.bin.gz");
    let store = MemoryStore::open(&path).unwrap();
    let projects = CollectionRoot::Projects.collection();
    let named = |name: &str| Fields::from([("name".to_string(), FieldValue::Text(name.to_string()))]);

    let kept = store.create(&projects, named("Kept")).await.unwrap();
    let kept_path = projects.doc(&kept).unwrap();

    // A directory where the temporary snapshot goes makes every save fail
    std::fs::create_dir(path.with_extension("tmp")).unwrap();

    let err = store.create(&projects, named("Lost")).await.unwrap_err();
    assert!(matches!(err, StoreError::Snapshot(_)));
    assert!(store.update(&kept_path, named("Renamed")).await.is_err());
    assert!(store.set(&projects.doc("fixed").unwrap(), named("Set")).await.is_err());
    assert!(store.delete(&kept_path).await.is_err());

    let listed = store.list(&projects).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].text("name"), Some("Kept"));

    std::fs::remove_dir(path.with_extension("tmp")).unwrap();
    let reopened = MemoryStore::open(&path).unwrap();
    assert_eq!(reopened.len().unwrap(), 1);
}
