use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use codeshell_core::testing::MemoryGateway;
use codeshell_core::{
    ChangeEvent, ChangeKind, DirectoryEntry, ExplorerFeed, FileRef, FolderSelection,
    SessionError, SessionStore, WatchOptions,
};
use tokio::time::timeout;

fn workspace() -> Arc<MemoryGateway> {
    let gateway = Arc::new(MemoryGateway::new());
    gateway.insert_directory(
        "/proj",
        vec![
            DirectoryEntry::directory("/proj/src"),
            DirectoryEntry::file("/proj/README.md"),
        ],
    );
    gateway.insert_directory("/proj/src", vec![DirectoryEntry::file("/proj/src/main.rs")]);
    gateway.insert_file("/proj/README.md", "# proj\n");
    gateway.insert_file("/proj/src/main.rs", "fn main() {\n    // TODO\n}\n");
    gateway
}

#[tokio::test]
async fn folder_pick_drives_listing_and_editing() {
    let gateway = workspace();
    gateway.queue_pick(FolderSelection::Cancelled);
    gateway.queue_pick(FolderSelection::Selected(PathBuf::from("/proj")));

    let session = Arc::new(SessionStore::new(gateway.clone()));
    let feed = Arc::new(ExplorerFeed::new(session.clone()));
    let mut updates = feed.subscribe_updates();
    let watch = feed.clone().attach(WatchOptions::default()).await.unwrap();

    assert_eq!(session.open_folder().await.unwrap(), None);
    assert_eq!(session.current_directory(), None);
    assert_eq!(
        session.open_folder().await.unwrap(),
        Some(PathBuf::from("/proj"))
    );

    timeout(Duration::from_secs(2), async {
        while updates.borrow_and_update().listing == 0 {
            updates.changed().await.unwrap();
        }
    })
    .await
    .unwrap();
    let listing = feed.listing();
    assert_eq!(listing.len(), 2);

    // Open the file shown second in the listing, then a nested one.
    session.open_file(FileRef::from(&listing[1])).await.unwrap();
    session.open_file(FileRef::new("/proj/src/main.rs")).await.unwrap();
    session.open_file(FileRef::from(&listing[1])).await.unwrap();
    assert_eq!(session.len(), 2);
    assert_eq!(session.active_file().unwrap().name(), "README.md");

    feed.search("todo").await.unwrap();
    assert!(feed.search_results().is_empty());
    feed.search("TODO").await.unwrap();
    assert_eq!(
        feed.search_results(),
        vec![DirectoryEntry::file("/proj/src/main.rs")]
    );

    gateway.insert_directory("/proj", vec![DirectoryEntry::directory("/proj/src")]);
    gateway.emit(ChangeEvent::new("/proj/README.md", ChangeKind::Removed));
    timeout(Duration::from_secs(2), async {
        while feed.listing().len() != 1 {
            updates.changed().await.unwrap();
        }
    })
    .await
    .unwrap();

    let closed = session.close_file(1).unwrap();
    assert_eq!(closed.path(), PathBuf::from("/proj/src/main.rs"));
    assert_eq!(session.active_index(), Some(0));
    assert!(matches!(
        session.close_file(5),
        Err(SessionError::IndexOutOfRange { index: 5, len: 1 })
    ));

    watch.shutdown().await;
    assert_eq!(gateway.subscriber_count(), 0);
}

#[tokio::test]
async fn session_snapshot_reflects_state() {
    let gateway = workspace();
    let session = SessionStore::new(gateway);
    session.set_current_directory("/proj");
    session.open_file(FileRef::new("/proj/README.md")).await.unwrap();

    let snapshot = session.snapshot();
    assert_eq!(snapshot.open_files.len(), 1);
    assert_eq!(snapshot.active_index, Some(0));
    assert_eq!(snapshot.current_directory, Some(PathBuf::from("/proj")));
}
