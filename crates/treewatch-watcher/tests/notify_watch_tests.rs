//! End-to-end tests against the real notify backend.
//!
//! Filesystem notifications arrive asynchronously, so every assertion
//! pumps the dispatcher until a condition holds or a deadline passes.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::{tempdir, TempDir};
use treewatch_core::{EventKind, WatchEvent};
use treewatch_watcher::{EventReceiver, TreeWatcher};

const DEADLINE: Duration = Duration::from_secs(5);
const SETTLE: Duration = Duration::from_millis(400);

fn scratch() -> (TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    (dir, root)
}

struct Harness {
    watcher: TreeWatcher,
    rx: EventReceiver,
    seen: Vec<WatchEvent>,
}

impl Harness {
    fn new(watcher: TreeWatcher) -> Self {
        let rx = watcher.subscribe();
        Self {
            watcher,
            rx,
            seen: Vec::new(),
        }
    }

    fn collect(&mut self) {
        let events = self.rx.drain().into_iter().filter_map(|note| note.event().cloned());
        self.seen.extend(events);
    }

    fn wait_for(&mut self, kind: EventKind, filename: &str) -> bool {
        let deadline = Instant::now() + DEADLINE;
        while Instant::now() < deadline {
            self.watcher.dispatch_for(Duration::from_millis(50));
            self.collect();
            if self.count(kind, filename) > 0 {
                return true;
            }
        }
        false
    }

    fn settle(&mut self) {
        self.watcher.dispatch_for(SETTLE);
        self.collect();
    }

    fn count(&self, kind: EventKind, filename: &str) -> usize {
        self.seen
            .iter()
            .filter(|event| event.kind == kind && event.filename == filename)
            .count()
    }

    fn count_file(&self, filename: &str) -> usize {
        self.seen.iter().filter(|event| event.filename == filename).count()
    }
}

#[test]
fn test_add_change_unlink_with_extension_filter() {
    let (_dir, root) = scratch();
    let mut watcher = TreeWatcher::new(&root).unwrap();
    watcher
        .set_allowed_extensions([".txt"])
        .set_monitored_directories([&root]);
    let mut h = Harness::new(watcher);
    h.watcher.start_watching().unwrap();

    let file = root.join("a.txt");
    fs::write(&file, "one").unwrap();
    assert!(h.wait_for(EventKind::Add, "a.txt"), "no add for a.txt");
    h.settle();
    assert_eq!(h.count(EventKind::Add, "a.txt"), 1);
    let add = h.seen.iter().find(|e| e.kind == EventKind::Add).unwrap();
    assert_eq!(add.relative_path, root);
    assert_eq!(add.watched_dir, root);

    h.seen.clear();
    fs::write(&file, "two").unwrap();
    assert!(h.wait_for(EventKind::Change, "a.txt"), "no change for a.txt");
    h.settle();
    assert_eq!(h.count(EventKind::Change, "a.txt"), 1);

    h.seen.clear();
    fs::remove_file(&file).unwrap();
    assert!(h.wait_for(EventKind::Unlink, "a.txt"), "no unlink for a.txt");
    h.settle();
    assert_eq!(h.count(EventKind::Unlink, "a.txt"), 1);

    h.seen.clear();
    fs::write(root.join("a.bin"), [0u8, 1, 2]).unwrap();
    h.settle();
    assert_eq!(h.count_file("a.bin"), 0);
}

#[test]
fn test_rename_is_one_unlink_and_one_add() {
    let (_dir, root) = scratch();
    fs::write(root.join("old.txt"), "x").unwrap();

    let mut h = Harness::new(TreeWatcher::new(&root).unwrap());
    h.watcher.start_watching().unwrap();
    h.settle();
    h.seen.clear();

    fs::rename(root.join("old.txt"), root.join("new.txt")).unwrap();
    assert!(h.wait_for(EventKind::Add, "new.txt"), "no add for new.txt");
    h.settle();

    assert_eq!(h.count(EventKind::Unlink, "old.txt"), 1);
    assert_eq!(h.count(EventKind::Add, "new.txt"), 1);
    assert_eq!(h.seen.len(), 2);
}

#[test]
fn test_existing_files_are_not_reported_as_added() {
    let (_dir, root) = scratch();
    fs::create_dir(root.join("nested")).unwrap();
    fs::write(root.join("old.txt"), "x").unwrap();
    fs::write(root.join("nested/older.txt"), "y").unwrap();

    let mut h = Harness::new(TreeWatcher::new(&root).unwrap());
    h.watcher.start_watching().unwrap();
    assert_eq!(h.watcher.initial_file_count(), 2);

    h.settle();
    assert_eq!(h.count(EventKind::Add, "old.txt"), 0);
    assert_eq!(h.count(EventKind::Add, "older.txt"), 0);

    fs::write(root.join("fresh.txt"), "z").unwrap();
    assert!(h.wait_for(EventKind::Add, "fresh.txt"));
    h.settle();
    assert_eq!(h.count(EventKind::Add, "fresh.txt"), 1);
}

#[test]
fn test_ignored_directory_is_silent_while_sibling_reports() {
    let (_dir, root) = scratch();
    fs::create_dir(root.join("ignored")).unwrap();
    fs::create_dir(root.join("kept")).unwrap();

    let mut watcher = TreeWatcher::new(&root).unwrap();
    watcher.ignore_directory(["ignored"]);
    let mut h = Harness::new(watcher);
    h.watcher.start_watching().unwrap();

    fs::write(root.join("ignored/secret.txt"), "x").unwrap();
    fs::write(root.join("kept/visible.txt"), "y").unwrap();

    assert!(h.wait_for(EventKind::Add, "visible.txt"));
    h.settle();
    assert_eq!(h.count_file("secret.txt"), 0);
}

#[test]
fn test_subdirectory_handler_fires_once_despite_nested_watch() {
    let (_dir, root) = scratch();
    fs::create_dir(root.join("sub")).unwrap();

    let root_calls = Arc::new(Mutex::new(Vec::new()));
    let sub_calls = Arc::new(Mutex::new(Vec::new()));

    let mut watcher = TreeWatcher::new(&root).unwrap();
    let sink = Arc::clone(&root_calls);
    watcher
        .set_handler(&root, EventKind::Add, move |event: &WatchEvent| {
            sink.lock().unwrap().push(event.filename.clone());
            Ok(())
        })
        .unwrap();
    let sink = Arc::clone(&sub_calls);
    watcher
        .set_handler("sub", EventKind::Add, move |event: &WatchEvent| {
            sink.lock().unwrap().push(event.filename.clone());
            Ok(())
        })
        .unwrap();

    let mut h = Harness::new(watcher);
    h.watcher.start_watching().unwrap();
    assert_eq!(h.watcher.subscription_count(), 2);

    fs::write(root.join("sub/x.txt"), "x").unwrap();
    assert!(h.wait_for(EventKind::Add, "x.txt"));
    h.settle();

    assert_eq!(*sub_calls.lock().unwrap(), vec!["x.txt".to_string()]);
    assert!(root_calls.lock().unwrap().is_empty());
    assert_eq!(h.count(EventKind::Add, "x.txt"), 1);
}

#[test]
fn test_nothing_delivered_after_stop() {
    let (_dir, root) = scratch();
    let mut h = Harness::new(TreeWatcher::new(&root).unwrap());
    h.watcher.start_watching().unwrap();

    fs::write(root.join("before.txt"), "x").unwrap();
    assert!(h.wait_for(EventKind::Add, "before.txt"));

    h.watcher.stop_watching();
    assert_eq!(h.watcher.subscription_count(), 0);

    fs::write(root.join("after.txt"), "y").unwrap();
    h.settle();
    assert_eq!(h.count_file("after.txt"), 0);
}

#[test]
fn test_start_fails_for_missing_directory() {
    let (_dir, root) = scratch();
    let mut watcher = TreeWatcher::new(&root).unwrap();
    watcher.set_monitored_directories(["does-not-exist"]);

    let err = watcher.start_watching().unwrap_err();
    assert!(err.to_string().contains("does-not-exist"));
    assert_eq!(watcher.subscription_count(), 0);
}
