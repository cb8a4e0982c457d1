//! Integration tests for the file-backed host store.

mod common;

use common::*;
use fleetshell::store::{FileHostStore, HostStore, StoreError};
use pretty_assertions::assert_eq;

#[test]
fn test_hosts_survive_reopen() {
    let temp = TempStore::new();
    let first = temp
        .store
        .create(host("10.0.0.1").with_alias("disk", "df -h"))
        .unwrap();
    let second = temp.store.create(host("10.0.0.2:2222")).unwrap();
    assert_ne!(first.id, second.id);

    let reopened = FileHostStore::open(temp.path()).unwrap();
    assert_eq!(reopened.count("").unwrap(), 2);

    let record = reopened.get("10.0.0.1").unwrap();
    assert_eq!(record.id, first.id);
    assert_eq!(record.host.credential, "secret");
    assert_eq!(record.host.resolve_command("disk"), "df -h");

    // Ids keep increasing after a reopen
    let third = reopened.create(host("10.0.0.3")).unwrap();
    assert!(third.id > second.id);
}

#[test]
fn test_remove_is_persisted() {
    let temp = TempStore::new();
    temp.store.create(host("10.0.0.1")).unwrap();
    temp.store.create(host("10.0.0.2")).unwrap();
    temp.store.remove("10.0.0.1").unwrap();

    let reopened = FileHostStore::open(temp.path()).unwrap();
    assert!(matches!(
        reopened.get("10.0.0.1"),
        Err(StoreError::NotFound(_))
    ));
    assert_eq!(reopened.count("").unwrap(), 1);
}

#[test]
fn test_update_keeps_password_when_blank() {
    let temp = TempStore::new();
    let record = temp.store.create(host("10.0.0.1")).unwrap();

    let mut changed = host("10.0.0.1");
    changed.user = "ops".to_string();
    changed.credential = String::new();
    temp.store.update(record.id, changed).unwrap();

    let reopened = FileHostStore::open(temp.path()).unwrap();
    let updated = reopened.get_by_id(record.id).unwrap();
    assert_eq!(updated.host.user, "ops");
    assert_eq!(updated.host.credential, "secret");
}

#[test]
fn test_search_pages_through_matches() {
    let temp = TempStore::new();
    for host in hosts(5) {
        temp.store.create(host).unwrap();
    }
    temp.store.create(host("db.internal")).unwrap();

    assert_eq!(temp.store.count("10.0.0").unwrap(), 5);
    assert_eq!(temp.store.count("DB").unwrap(), 1);

    let page_one = temp.store.search("10.0.0", 4, 0).unwrap();
    let page_two = temp.store.search("10.0.0", 4, 4).unwrap();
    assert_eq!(page_one.len(), 4);
    assert_eq!(page_two.len(), 1);
    assert!(page_one.iter().all(|r| r.host.address != page_two[0].host.address));
}

#[test]
fn test_missing_file_starts_empty() {
    let temp = tempfile::TempDir::new().unwrap();
    let store = FileHostStore::open(temp.path().join("absent.json")).unwrap();
    assert_eq!(store.count("").unwrap(), 0);
}
