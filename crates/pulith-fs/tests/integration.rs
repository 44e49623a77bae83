use pulith_fs::{AtomicWriteOptions, Transaction, Workspace, atomic_read, atomic_write};
use tempfile::tempdir;

#[test]
fn test_atomic_write_basic() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.txt");

    atomic_write(&path, b"hello world", AtomicWriteOptions::new()).unwrap();

    assert!(path.exists());
    assert_eq!(atomic_read(&path).unwrap(), b"hello world");
}

#[test]
fn test_atomic_write_replaces_existing() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("existing.txt");

    std::fs::write(&path, "original").unwrap();
    atomic_write(&path, b"new content", AtomicWriteOptions::new()).unwrap();

    assert_eq!(atomic_read(&path).unwrap(), b"new content");
}

#[test]
fn test_staged_write_then_commit_under_lock() {
    let dir = tempdir().unwrap();
    let _lock = Transaction::open_locked(dir.path().join("lock")).unwrap();

    let workspace = Workspace::new(dir.path().join("tmp")).unwrap();
    std::fs::write(workspace.file("object"), b"payload").unwrap();
    let dest = dir.path().join("objects").join("object");
    workspace.commit("object", &dest, false).unwrap();
    drop(workspace);

    assert_eq!(atomic_read(&dest).unwrap(), b"payload");
    let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("tmp"))
        .unwrap()
        .collect();
    assert!(leftovers.is_empty());
}
