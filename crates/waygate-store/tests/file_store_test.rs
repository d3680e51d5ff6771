//! File store persistence tests.

use std::{fs, sync::Arc};

use waygate_store::{FileStore, IdentityStore, KeyValueStore, StoreError, keys};

#[test]
fn values_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("identity.json");

    let store = FileStore::open(&path).unwrap();
    store.set(keys::ACTIVE_TUNNEL, "tg-abc-123456").unwrap();
    store.set(keys::AUTH_TOKEN, "a.b.c").unwrap();
    store.remove(keys::AUTH_TOKEN).unwrap();
    drop(store);

    let reopened = FileStore::open(&path).unwrap();
    assert_eq!(reopened.get(keys::ACTIVE_TUNNEL).unwrap().as_deref(), Some("tg-abc-123456"));
    assert_eq!(reopened.get(keys::AUTH_TOKEN).unwrap(), None);
}

#[test]
fn missing_file_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path().join("absent.json")).unwrap();
    assert_eq!(store.get("anything").unwrap(), None);
    assert!(!store.path().exists());
}

#[test]
fn no_temp_files_left_behind() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("identity.json");
    let store = FileStore::open(&path).unwrap();
    for i in 0..5 {
        store.set("k", &i.to_string()).unwrap();
    }

    let names: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["identity.json".to_string()]);
}

#[cfg(unix)]
#[test]
fn file_is_private() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("identity.json");
    FileStore::open(&path).unwrap().set("k", "v").unwrap();

    let mode = fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn corrupt_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("identity.json");
    fs::write(&path, "not json").unwrap();

    assert!(matches!(FileStore::open(&path), Err(StoreError::Corrupt { .. })));
}

#[test]
fn identity_handle_persists_across_processes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("identity.json");

    let first = IdentityStore::new(Arc::new(FileStore::open(&path).unwrap()));
    let minted = first.ensure_tunnel_handle(|| "tg-first-aaaaaa".to_string()).unwrap();

    let second = IdentityStore::new(Arc::new(FileStore::open(&path).unwrap()));
    assert_eq!(second.tunnel_handle().unwrap(), Some(minted));
}
