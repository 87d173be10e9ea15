use std::sync::LazyLock;

use regex::Regex;
use warden_store::ModerationSettings;

use crate::contract::MessageContent;

static LINK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)https?://\S+|www\.\S+|\b[a-z0-9-]+\.[a-z]{2,}(?:/\S*)?")
        .expect("link pattern compiles")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Enumerates supported `ModerationRule` values, in evaluation order.
pub enum ModerationRule {
    AntiImage,
    AntiSticker,
    Filter,
    AntiLink,
}

impl ModerationRule {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AntiImage => "antiimage",
            Self::AntiSticker => "antisticker",
            Self::Filter => "filter",
            Self::AntiLink => "antilink",
        }
    }

    pub fn warning_text(self, mention_tag: &str) -> String {
        match self {
            Self::AntiImage => format!("⚠️ {mention_tag} images are not allowed in this group."),
            Self::AntiSticker => {
                format!("⚠️ {mention_tag} stickers are not allowed in this group.")
            }
            Self::Filter => format!("⚠️ {mention_tag} that phrase is not allowed in this group."),
            Self::AntiLink => format!("⚠️ {mention_tag} links are not allowed in this group."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub rule: ModerationRule,
    /// Matched phrase or link, when the rule is text based.
    pub matched: Option<String>,
}

/// First URL-looking token in `text`.
pub fn find_first_link(text: &str) -> Option<&str> {
    LINK_PATTERN.find(text).map(|found| found.as_str())
}

/// Lowercases and collapses whitespace runs to single spaces.
pub fn normalize_search_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// First banned phrase contained in `text`, compared case-insensitively with
/// whitespace collapsed on both sides.
pub fn find_banned_phrase(text: &str, phrases: &[String]) -> Option<String> {
    let haystack = normalize_search_text(text);
    if haystack.is_empty() {
        return None;
    }
    phrases
        .iter()
        .map(|phrase| normalize_search_text(phrase))
        .find(|needle| !needle.is_empty() && haystack.contains(needle.as_str()))
}

/// Evaluates the enabled rules in fixed order and returns the first match.
/// Each rule is checked on its own, so an enabled filter that does not match
/// never hides a link.
pub fn first_violation(settings: &ModerationSettings, content: &MessageContent) -> Option<Violation> {
    let text = content.text.as_deref().unwrap_or("");
    if settings.anti_image && content.has_image {
        return Some(Violation {
            rule: ModerationRule::AntiImage,
            matched: None,
        });
    }
    if settings.anti_sticker && content.has_sticker {
        return Some(Violation {
            rule: ModerationRule::AntiSticker,
            matched: None,
        });
    }
    if settings.filter_enabled {
        if let Some(phrase) = find_banned_phrase(text, &settings.banned_words) {
            return Some(Violation {
                rule: ModerationRule::Filter,
                matched: Some(phrase),
            });
        }
    }
    if settings.anti_link {
        if let Some(link) = find_first_link(text) {
            return Some(Violation {
                rule: ModerationRule::AntiLink,
                matched: Some(link.to_string()),
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use warden_store::ModerationSettings;

    use super::{find_banned_phrase, find_first_link, first_violation, ModerationRule};
    use crate::contract::MessageContent;

    fn text(value: &str) -> MessageContent {
        MessageContent {
            text: Some(value.to_string()),
            ..MessageContent::default()
        }
    }

    #[test]
    fn unit_link_detection_covers_schemes_www_and_bare_domains() {
        assert_eq!(
            find_first_link("see https://example.com/a?b=1 now"),
            Some("https://example.com/a?b=1")
        );
        assert_eq!(find_first_link("WWW.Example.org"), Some("WWW.Example.org"));
        assert_eq!(find_first_link("visit example.com/abc"), Some("example.com/abc"));
        assert_eq!(find_first_link("no links here"), None);
        assert_eq!(find_first_link("version 1.2"), None);
    }

    #[test]
    fn unit_banned_phrase_matching_collapses_whitespace_and_case() {
        let phrases = vec!["free   money".to_string(), "scam".to_string()];
        assert_eq!(
            find_banned_phrase("Get FREE\n money today", &phrases),
            Some("free money".to_string())
        );
        assert_eq!(find_banned_phrase("all good", &phrases), None);
        assert_eq!(find_banned_phrase("   ", &phrases), None);
    }

    #[test]
    fn functional_rules_apply_in_fixed_order() {
        let settings = ModerationSettings {
            anti_link: true,
            filter_enabled: true,
            anti_image: true,
            banned_words: vec!["scam".to_string()],
            ..ModerationSettings::default()
        };
        let image = MessageContent {
            has_image: true,
            text: Some("scam at https://x.io".to_string()),
            ..MessageContent::default()
        };
        assert_eq!(
            first_violation(&settings, &image).map(|v| v.rule),
            Some(ModerationRule::AntiImage)
        );
        assert_eq!(
            first_violation(&settings, &text("scam at https://x.io")).map(|v| v.rule),
            Some(ModerationRule::Filter)
        );
        assert_eq!(first_violation(&settings, &text("hello")), None);
    }

    #[test]
    fn regression_enabled_filter_without_match_still_checks_links() {
        let settings = ModerationSettings {
            anti_link: true,
            filter_enabled: true,
            banned_words: vec!["scam".to_string()],
            ..ModerationSettings::default()
        };
        let violation = first_violation(&settings, &text("visit www.example.com")).expect("link");
        assert_eq!(violation.rule, ModerationRule::AntiLink);
        assert_eq!(violation.matched.as_deref(), Some("www.example.com"));
    }

    #[test]
    fn unit_disabled_rules_never_match() {
        let settings = ModerationSettings::default();
        let sticker = MessageContent {
            has_sticker: true,
            text: Some("https://example.com".to_string()),
            ..MessageContent::default()
        };
        assert_eq!(first_violation(&settings, &sticker), None);
    }
}
