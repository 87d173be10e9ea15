use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::tempdir;
use warden_access::Handle;
use warden_core::current_unix_timestamp_ms;

use super::Store;
use crate::document::{ModerationFlag, DEFAULT_WELCOME_TEMPLATE, STORE_VERSION};
use crate::error::StoreError;

const GROUP: &str = "120363000000000001@g.us";

fn handle(raw: &str) -> Handle {
    Handle::parse(raw).expect("valid handle")
}

fn read_json(path: &std::path::Path) -> Value {
    let raw = std::fs::read_to_string(path).expect("read store file");
    serde_json::from_str(&raw).expect("parse store file")
}

#[tokio::test]
async fn integration_allowlist_survives_reopen() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("data").join("store.json");
    let alice = handle("15550000001@s.whatsapp.net");

    let store = Store::open(&path).expect("open store");
    let outcome = store
        .add_allowlist(&[alice.clone(), alice.clone()])
        .await
        .expect("add allowlist");
    assert_eq!(outcome.added, 1);
    assert_eq!(outcome.total, 1);
    store.close().await;
    drop(store);

    let reopened = Store::open(&path).expect("reopen store");
    assert!(reopened.is_allowlisted(&alice));
    assert_eq!(reopened.list_allowlist(), vec![alice]);
    assert_eq!(read_json(&path)["version"], json!(STORE_VERSION));
}

#[tokio::test]
async fn regression_seed_does_not_restore_removed_allowlist_entries() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("store.json");
    let alice = handle("15550000001@s.whatsapp.net");
    let bob = handle("15550000002@s.whatsapp.net");
    let configured = [alice.clone(), bob.clone()];

    let store = Store::open(&path).expect("open store");
    let seeded = store.seed_allowlist(&configured).await.expect("seed");
    assert_eq!(seeded.added, 2);
    store
        .remove_allowlist(std::slice::from_ref(&bob))
        .await
        .expect("remove bob");
    store.close().await;
    drop(store);

    let reopened = Store::open(&path).expect("reopen store");
    let reseeded = reopened.seed_allowlist(&configured).await.expect("seed");
    assert_eq!(reseeded.added, 0);
    assert_eq!(reseeded.total, 1);
    assert_eq!(reopened.list_allowlist(), vec![alice]);
}

#[tokio::test]
async fn regression_corrupt_store_is_quarantined_and_reset() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("store.json");
    std::fs::write(&path, "{ not json").expect("write corrupt file");

    let store = Store::open(&path).expect("open store");
    assert!(store.list_allowlist().is_empty());
    assert!(!path.exists());

    let quarantined = std::fs::read_dir(temp.path())
        .expect("read dir")
        .filter_map(Result::ok)
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .filter(|name| name.starts_with("store.json.corrupt."))
        .collect::<Vec<_>>();
    assert_eq!(quarantined.len(), 1);
    let suffix = quarantined[0].trim_start_matches("store.json.corrupt.");
    assert!(suffix.parse::<u64>().is_ok());
}

#[tokio::test]
async fn regression_non_object_json_resets_without_quarantine() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("store.json");
    std::fs::write(&path, "[]").expect("write array file");

    let store = Store::open(&path).expect("open store");
    assert!(store.snapshot().groups.is_empty());
    assert!(path.exists(), "non-object file stays in place");
    let names = std::fs::read_dir(temp.path())
        .expect("read dir")
        .filter_map(Result::ok)
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["store.json".to_string()]);

    store
        .set_moderation_flag(GROUP, ModerationFlag::AntiLink, true)
        .await
        .expect("set flag");
    assert_eq!(read_json(&path)["version"], json!(STORE_VERSION));
}

#[tokio::test]
async fn regression_failed_rewrite_leaves_document_unchanged() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("store.json");
    let store = Store::open(&path).expect("open store");
    let bob = handle("15550000002@s.whatsapp.net");
    store
        .add_bans(GROUP, std::slice::from_ref(&bob))
        .await
        .expect("add ban");

    std::fs::remove_file(&path).expect("remove store file");
    std::fs::create_dir(&path).expect("block store path");

    let error = store
        .set_moderation_flag(GROUP, ModerationFlag::AntiLink, true)
        .await
        .expect_err("rewrite over a directory fails");
    assert!(matches!(error, StoreError::Persist { .. }));
    assert!(!store.get_moderation(GROUP).anti_link);

    store
        .remove_bans(GROUP, std::slice::from_ref(&bob))
        .await
        .expect_err("rewrite over a directory fails");
    assert_eq!(store.list_bans(GROUP), vec![bob.clone()]);

    std::fs::remove_dir(&path).expect("unblock store path");
    store
        .add_allowlist(&[handle("15550000001@s.whatsapp.net")])
        .await
        .expect("add allowlist");
    let persisted = read_json(&path);
    assert_eq!(persisted["groups"][GROUP]["moderation"]["antiLink"], json!(false));
    assert_eq!(persisted["groups"][GROUP]["bans"], json!([bob.to_string()]));
}

#[tokio::test]
async fn functional_missing_file_starts_empty_without_writing() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("store.json");
    let store = Store::open(&path).expect("open store");

    let removed = store
        .remove_bans(GROUP, &[handle("1234567@s.whatsapp.net")])
        .await
        .expect("remove bans");
    assert_eq!(removed.removed, 0);
    assert!(!path.exists(), "no-op mutations must not rewrite the file");
}

#[tokio::test]
async fn functional_mute_expires_and_is_pruned_on_read() {
    let temp = tempdir().expect("tempdir");
    let store = Store::open(temp.path().join("store.json")).expect("open store");
    let bob = handle("15550000002@s.whatsapp.net");
    let until = current_unix_timestamp_ms() + 60_000;

    let outcome = store
        .add_mutes(GROUP, std::slice::from_ref(&bob), Some(until))
        .await
        .expect("add mutes");
    assert_eq!(outcome.added, 1);

    let before = store.get_mute_at(GROUP, &bob, until - 1);
    assert!(before.muted);
    assert_eq!(before.until, Some(until));

    let after = store.get_mute_at(GROUP, &bob, until);
    assert!(!after.muted);
    assert!(store.snapshot().groups[GROUP].mutes.is_empty());
}

#[tokio::test]
async fn unit_add_mutes_reports_updates_and_noops() {
    let temp = tempdir().expect("tempdir");
    let store = Store::open(temp.path().join("store.json")).expect("open store");
    let bob = handle("15550000002@s.whatsapp.net");
    let targets = [bob.clone()];

    let first = store.add_mutes(GROUP, &targets, None).await.expect("mute");
    assert_eq!((first.added, first.updated, first.total), (1, 0, 1));

    let repeat = store.add_mutes(GROUP, &targets, None).await.expect("mute");
    assert!(repeat.is_noop());

    let until = current_unix_timestamp_ms() + 3_600_000;
    let timed = store
        .add_mutes(GROUP, &targets, Some(until))
        .await
        .expect("mute");
    assert_eq!((timed.added, timed.updated), (0, 1));

    let past = store
        .add_mutes(GROUP, &targets, Some(1))
        .await
        .expect("mute in the past");
    assert!(past.is_noop());
    assert_eq!(store.get_mute(GROUP, &bob).until, Some(until));

    let removed = store.remove_mutes(GROUP, &targets).await.expect("unmute");
    assert_eq!(removed.removed, 1);
    assert!(!store.get_mute(GROUP, &bob).muted);
}

#[tokio::test]
async fn functional_bans_match_any_candidate() {
    let temp = tempdir().expect("tempdir");
    let store = Store::open(temp.path().join("store.json")).expect("open store");
    let privacy = handle("9001@lid");
    let phone = handle("15551234567@s.whatsapp.net");

    store
        .add_bans(GROUP, std::slice::from_ref(&privacy))
        .await
        .expect("ban");
    let candidates = BTreeSet::from([phone.clone(), privacy.clone()]);
    assert!(store.is_any_banned(GROUP, &candidates));
    assert!(!store.is_banned(GROUP, &phone));

    let removed = store
        .remove_bans(GROUP, &candidates.into_iter().collect::<Vec<_>>())
        .await
        .expect("unban");
    assert_eq!(removed.removed, 1);
    assert!(store.list_bans(GROUP).is_empty());
}

#[tokio::test]
async fn unit_banned_words_dedupe_case_insensitively() {
    let temp = tempdir().expect("tempdir");
    let store = Store::open(temp.path().join("store.json")).expect("open store");

    let first = store
        .add_banned_word(GROUP, "  Free   Money ")
        .await
        .expect("add word");
    assert_eq!((first.added, first.total), (1, 1));
    let duplicate = store
        .add_banned_word(GROUP, "free money")
        .await
        .expect("add word");
    assert_eq!((duplicate.added, duplicate.total), (0, 1));
    assert_eq!(store.list_banned_words(GROUP), vec!["Free Money".to_string()]);

    let removed = store
        .remove_banned_word(GROUP, "FREE MONEY")
        .await
        .expect("remove word");
    assert_eq!((removed.removed, removed.total), (1, 0));
}

#[tokio::test]
async fn unit_readers_return_defaults_without_creating_groups() {
    let temp = tempdir().expect("tempdir");
    let store = Store::open(temp.path().join("store.json")).expect("open store");

    let moderation = store.get_moderation(GROUP);
    assert!(!moderation.any_rule_enabled());
    assert!(moderation.exempt_allowlisted);
    assert!(moderation.exempt_admins);
    assert_eq!(store.get_welcome(GROUP).template, DEFAULT_WELCOME_TEMPLATE);
    assert!(store.snapshot().groups.is_empty());
}

#[tokio::test]
async fn unit_invalid_group_id_is_rejected() {
    let temp = tempdir().expect("tempdir");
    let store = Store::open(temp.path().join("store.json")).expect("open store");
    let error = store
        .set_moderation_flag("15550000001@s.whatsapp.net", ModerationFlag::AntiLink, true)
        .await
        .expect_err("direct chat id must be rejected");
    assert!(matches!(error, StoreError::InvalidGroupId(_)));
}

#[tokio::test]
async fn functional_flag_and_welcome_setters_report_changes() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("store.json");
    let store = Store::open(&path).expect("open store");

    let on = store
        .set_moderation_flag(GROUP, ModerationFlag::AntiLink, true)
        .await
        .expect("set flag");
    assert!(on.value && on.changed);
    let again = store
        .set_moderation_flag(GROUP, ModerationFlag::AntiLink, true)
        .await
        .expect("set flag");
    assert!(!again.changed);

    let template = store
        .set_welcome_template(GROUP, "Hi {user}\r\nwelcome to {group}")
        .await
        .expect("set template");
    assert_eq!(template.template, "Hi {user}\nwelcome to {group}");
    store
        .set_welcome_enabled(GROUP, true)
        .await
        .expect("enable welcome");

    let persisted = read_json(&path);
    let group = &persisted["groups"][GROUP];
    assert_eq!(group["moderation"]["antiLink"], json!(true));
    assert_eq!(group["moderation"]["exemptAdmins"], json!(true));
    assert_eq!(group["welcome"]["enabled"], json!(true));
}

#[tokio::test]
async fn integration_concurrent_mutations_are_all_persisted() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("store.json");
    let store = Arc::new(Store::open(&path).expect("open store"));

    let mut tasks = Vec::new();
    for index in 0..16 {
        let store = Arc::clone(&store);
        tasks.push(tokio::spawn(async move {
            let target = handle(&format!("1555000{index:04}@s.whatsapp.net"));
            store.add_bans(GROUP, &[target]).await.expect("ban")
        }));
    }
    for task in tasks {
        task.await.expect("join");
    }
    store.close().await;

    let reopened = Store::open(&path).expect("reopen");
    assert_eq!(reopened.list_bans(GROUP).len(), 16);
}

#[tokio::test]
async fn regression_legacy_mutes_are_coerced_on_load() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("store.json");
    let future = current_unix_timestamp_ms() + 600_000;
    std::fs::write(
        &path,
        serde_json::to_string(&json!({
            "version": 3,
            "groups": {
                GROUP: {
                    "mutes": {
                        "111111@s.whatsapp.net": future,
                        "222222@s.whatsapp.net": null,
                        "333333@s.whatsapp.net": 5,
                        "444444@lid": { "until": future.to_string() }
                    }
                }
            }
        }))
        .expect("encode"),
    )
    .expect("write legacy file");

    let store = Store::open(&path).expect("open store");
    let mutes = store.snapshot().groups[GROUP].mutes.clone();
    assert_eq!(mutes.len(), 3);
    assert_eq!(
        store.get_mute(GROUP, &handle("111111@s.whatsapp.net")).until,
        Some(future)
    );
    let indefinite = store.get_mute(GROUP, &handle("222222@s.whatsapp.net"));
    assert!(indefinite.muted && indefinite.until.is_none());
    assert!(store.get_mute(GROUP, &handle("444444@lid")).muted);
}

#[cfg(unix)]
#[tokio::test]
async fn functional_store_file_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("state").join("store.json");
    let store = Store::open(&path).expect("open store");
    store
        .add_allowlist(&[handle("15550000001@s.whatsapp.net")])
        .await
        .expect("add allowlist");

    let mode = std::fs::metadata(&path).expect("metadata").permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
    let dir_mode = std::fs::metadata(path.parent().expect("parent"))
        .expect("metadata")
        .permissions()
        .mode();
    assert_eq!(dir_mode & 0o777, 0o700);
}
