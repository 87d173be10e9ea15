use std::fs;

use serde_json::Value;
use tempfile::tempdir;
use warden_access::Handle;
use warden_core::current_unix_timestamp_ms;
use warden_store::{Store, STORE_VERSION};

const GROUP: &str = "120363000000000001@g.us";

fn handle(raw: &str) -> Handle {
    Handle::parse(raw).expect("valid handle")
}

#[tokio::test]
async fn integration_allowlist_membership_survives_restart() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("data").join("store.json");

    let store = Store::open(&path).expect("open");
    store
        .add_allowlist(&[handle("15550000001@s.whatsapp.net")])
        .await
        .expect("add");
    store.close().await;
    drop(store);

    let reopened = Store::open(&path).expect("reopen");
    assert!(reopened.is_allowlisted(&handle("15550000001@s.whatsapp.net")));
    assert!(!reopened.is_allowlisted(&handle("15550000002@s.whatsapp.net")));
}

#[tokio::test]
async fn integration_mute_expiry_prunes_entry_on_read() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("store.json");
    let store = Store::open(&path).expect("open");
    let member = handle("15550000003@s.whatsapp.net");
    let now = current_unix_timestamp_ms();

    store
        .add_mutes(GROUP, &[member.clone()], Some(now + 60_000))
        .await
        .expect("mute");
    assert!(store.get_mute_at(GROUP, &member, now + 1_000).muted);

    let after = store.get_mute_at(GROUP, &member, now + 61_000);
    assert!(!after.muted);
    assert!(store.snapshot().groups[GROUP].mutes.is_empty(), "entry removed");

    store
        .add_bans(GROUP, &[handle("15550000009@s.whatsapp.net")])
        .await
        .expect("rewrite");
    let persisted: Value =
        serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("json");
    assert_eq!(persisted["groups"][GROUP]["mutes"], Value::Object(Default::default()));
}

#[tokio::test]
async fn integration_corrupt_store_is_quarantined_and_reset() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("store.json");
    fs::write(&path, "{ this is not json").expect("write corrupt file");

    let store = Store::open(&path).expect("open");
    let snapshot = store.snapshot();
    assert_eq!(snapshot.version, STORE_VERSION);
    assert!(snapshot.groups.is_empty());
    assert!(snapshot.allowlist.is_empty());

    let quarantined = fs::read_dir(dir.path())
        .expect("read dir")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .filter(|name| name.starts_with("store.json.corrupt."))
        .collect::<Vec<_>>();
    assert_eq!(quarantined.len(), 1);
    let suffix = quarantined[0].trim_start_matches("store.json.corrupt.");
    assert!(suffix.parse::<u64>().is_ok(), "timestamp suffix: {suffix}");
    assert!(!path.exists(), "original moved aside");
}
