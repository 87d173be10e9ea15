//! Load-time coercion of a raw JSON document into a `StoreDocument`.
//!
//! Missing fields take defaults, malformed values are coerced or dropped, and
//! legacy layouts are migrated, so every read after load sees a well-formed
//! document.

use std::collections::{BTreeMap, HashSet};

use serde_json::{Map, Value};
use warden_access::{is_group_id, Handle};

use crate::document::{
    GroupRecord, ModerationSettings, MuteEntry, StoreDocument, WelcomeSettings,
    DEFAULT_WELCOME_TEMPLATE, MAX_WELCOME_TEMPLATE_CHARS, STORE_VERSION,
};

pub fn normalize_document(value: &Value, now_ms: u64) -> StoreDocument {
    let Some(object) = value.as_object() else {
        return StoreDocument::default();
    };
    let found_version = object.get("version").and_then(Value::as_u64);
    if found_version.is_some_and(|version| version < u64::from(STORE_VERSION)) {
        tracing::debug!(
            found = found_version.unwrap_or_default(),
            current = STORE_VERSION,
            "migrating store document"
        );
    }

    let mut groups = BTreeMap::new();
    if let Some(raw_groups) = object.get("groups").and_then(Value::as_object) {
        for (group_id, raw_group) in raw_groups {
            let group_id = group_id.trim();
            if !is_group_id(group_id) {
                continue;
            }
            groups.insert(group_id.to_string(), normalize_group(raw_group, now_ms));
        }
    }

    StoreDocument {
        version: STORE_VERSION,
        groups,
        allowlist: normalize_handle_list(object.get("allowlist")),
    }
}

pub fn normalize_group(value: &Value, now_ms: u64) -> GroupRecord {
    let empty = Map::new();
    let object = value.as_object().unwrap_or(&empty);

    let mut moderation = normalize_moderation(object.get("moderation"));
    // Documents before version 5 kept banned words next to `moderation`.
    if let Some(legacy) = object.get("bannedWords") {
        let merged = moderation
            .banned_words
            .iter()
            .cloned()
            .chain(string_items(Some(legacy)));
        moderation.banned_words = dedupe_banned_words(merged);
    }

    GroupRecord {
        bans: normalize_handle_list(object.get("bans")),
        mutes: normalize_mute_map(object.get("mutes"), now_ms),
        moderation,
        welcome: normalize_welcome(object.get("welcome")),
    }
}

fn normalize_moderation(value: Option<&Value>) -> ModerationSettings {
    let defaults = ModerationSettings::default();
    let Some(object) = value.and_then(Value::as_object) else {
        return defaults;
    };
    let flag = |key: &str, default: bool| object.get(key).and_then(Value::as_bool).unwrap_or(default);
    ModerationSettings {
        anti_link: flag("antiLink", defaults.anti_link),
        filter_enabled: flag("filterEnabled", defaults.filter_enabled),
        anti_image: flag("antiImage", defaults.anti_image),
        anti_sticker: flag("antiSticker", defaults.anti_sticker),
        exempt_allowlisted: flag("exemptAllowlisted", defaults.exempt_allowlisted),
        exempt_admins: flag("exemptAdmins", defaults.exempt_admins),
        banned_words: dedupe_banned_words(string_items(object.get("bannedWords"))),
    }
}

fn normalize_welcome(value: Option<&Value>) -> WelcomeSettings {
    let Some(object) = value.and_then(Value::as_object) else {
        return WelcomeSettings::default();
    };
    WelcomeSettings {
        enabled: object
            .get("enabled")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        template: normalize_welcome_template(
            object.get("template").and_then(Value::as_str).unwrap_or(""),
        ),
    }
}

/// Parses, dedupes and keeps first-seen order.
pub fn normalize_handle_list(value: Option<&Value>) -> Vec<Handle> {
    let mut seen = HashSet::new();
    string_items(value)
        .filter_map(|raw| Handle::parse(&raw))
        .filter(|handle| seen.insert(handle.clone()))
        .collect()
}

fn normalize_mute_map(value: Option<&Value>, now_ms: u64) -> BTreeMap<Handle, MuteEntry> {
    let Some(object) = value.and_then(Value::as_object) else {
        return BTreeMap::new();
    };
    object
        .iter()
        .filter_map(|(raw_handle, raw_entry)| {
            let handle = Handle::parse(raw_handle)?;
            let entry = normalize_mute_entry(raw_entry, now_ms)?;
            Some((handle, entry))
        })
        .collect()
}

/// Coerces one persisted mute entry. Returns `None` for entries that are
/// malformed or already expired at `now_ms`.
pub fn normalize_mute_entry(value: &Value, now_ms: u64) -> Option<MuteEntry> {
    let until = match value {
        Value::Null => return Some(MuteEntry { until: None }),
        Value::Number(_) | Value::String(_) => value,
        Value::Object(object) => match object.get("until") {
            None | Some(Value::Null) => return Some(MuteEntry { until: None }),
            Some(until) => until,
        },
        _ => return None,
    };
    let until = coerce_millis(until)?;
    (until > now_ms).then_some(MuteEntry { until: Some(until) })
}

fn coerce_millis(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|ms| ms.is_finite() && *ms >= 0.0).map(|ms| ms as u64)),
        Value::String(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    }
}

/// Trims and collapses internal whitespace; `None` for blank phrases.
pub fn normalize_banned_word(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

/// Normalizes every phrase and drops case-insensitive duplicates, keeping the
/// first spelling seen.
pub fn dedupe_banned_words<I>(phrases: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    phrases
        .into_iter()
        .filter_map(|raw| normalize_banned_word(&raw))
        .filter(|phrase| seen.insert(phrase.to_lowercase()))
        .collect()
}

/// CRLF becomes LF, surrounding whitespace is trimmed, blank falls back to
/// the default and anything longer than the limit is cut.
pub fn normalize_welcome_template(raw: &str) -> String {
    let unified = raw.replace("\r\n", "\n");
    let trimmed = unified.trim();
    if trimmed.is_empty() {
        return DEFAULT_WELCOME_TEMPLATE.to_string();
    }
    trimmed.chars().take(MAX_WELCOME_TEMPLATE_CHARS).collect()
}

fn string_items(value: Option<&Value>) -> impl Iterator<Item = String> + '_ {
    value
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|item| item.as_str().map(str::to_string))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        dedupe_banned_words, normalize_document, normalize_mute_entry, normalize_welcome_template,
    };
    use crate::document::{DEFAULT_WELCOME_TEMPLATE, MAX_WELCOME_TEMPLATE_CHARS, STORE_VERSION};

    const NOW: u64 = 1_700_000_000_000;

    #[test]
    fn unit_non_object_document_yields_defaults() {
        let document = normalize_document(&json!([1, 2, 3]), NOW);
        assert_eq!(document.version, STORE_VERSION);
        assert!(document.groups.is_empty());
        assert!(document.allowlist.is_empty());
    }

    #[test]
    fn functional_group_fields_default_and_coerce() {
        let document = normalize_document(
            &json!({
                "version": 5,
                "allowlist": ["111111:2@s.whatsapp.net", "111111@s.whatsapp.net", "junk", 7],
                "groups": {
                    "not-a-group": {},
                    "123@g.us": {
                        "bans": ["222@LID", "222@lid", "nope"],
                        "moderation": { "antiLink": "yes", "filterEnabled": true },
                        "welcome": { "enabled": true, "template": "   " }
                    }
                }
            }),
            NOW,
        );
        assert_eq!(document.allowlist.len(), 1);
        assert_eq!(document.groups.len(), 1);
        let group = &document.groups["123@g.us"];
        assert_eq!(group.bans.len(), 1);
        assert_eq!(group.bans[0].to_string(), "222@lid");
        assert!(!group.moderation.anti_link);
        assert!(group.moderation.filter_enabled);
        assert!(group.moderation.exempt_allowlisted);
        assert!(group.moderation.exempt_admins);
        assert!(group.welcome.enabled);
        assert_eq!(group.welcome.template, DEFAULT_WELCOME_TEMPLATE);
    }

    #[test]
    fn regression_legacy_group_level_banned_words_are_migrated() {
        let document = normalize_document(
            &json!({
                "version": 4,
                "groups": {
                    "123@g.us": {
                        "bannedWords": ["Spam  Link", "spam link", " scam "],
                        "moderation": { "bannedWords": ["scam"] }
                    }
                }
            }),
            NOW,
        );
        let words = &document.groups["123@g.us"].moderation.banned_words;
        assert_eq!(words, &vec!["scam".to_string(), "Spam Link".to_string()]);
    }

    #[test]
    fn unit_mute_entry_coercion_rules() {
        assert_eq!(normalize_mute_entry(&json!(null), NOW).map(|e| e.until), Some(None));
        assert_eq!(normalize_mute_entry(&json!({}), NOW).map(|e| e.until), Some(None));
        assert_eq!(
            normalize_mute_entry(&json!({ "until": null }), NOW).map(|e| e.until),
            Some(None)
        );
        assert_eq!(
            normalize_mute_entry(&json!(NOW + 5), NOW).map(|e| e.until),
            Some(Some(NOW + 5))
        );
        assert_eq!(
            normalize_mute_entry(&json!((NOW + 9).to_string()), NOW).map(|e| e.until),
            Some(Some(NOW + 9))
        );
        assert!(normalize_mute_entry(&json!(NOW), NOW).is_none());
        assert!(normalize_mute_entry(&json!({ "until": NOW - 1 }), NOW).is_none());
        assert!(normalize_mute_entry(&json!({ "until": "soon" }), NOW).is_none());
        assert!(normalize_mute_entry(&json!(true), NOW).is_none());
    }

    #[test]
    fn unit_banned_words_dedupe_case_insensitively_in_order() {
        let words = dedupe_banned_words(
            ["Buy Now", "  buy   now ", "", "Free", "FREE"]
                .into_iter()
                .map(str::to_string),
        );
        assert_eq!(words, vec!["Buy Now".to_string(), "Free".to_string()]);
    }

    #[test]
    fn unit_welcome_template_normalization() {
        assert_eq!(normalize_welcome_template("  hi\r\nthere  "), "hi\nthere");
        assert_eq!(normalize_welcome_template(""), DEFAULT_WELCOME_TEMPLATE);
        let long = "x".repeat(MAX_WELCOME_TEMPLATE_CHARS + 10);
        assert_eq!(
            normalize_welcome_template(&long).chars().count(),
            MAX_WELCOME_TEMPLATE_CHARS
        );
    }
}
