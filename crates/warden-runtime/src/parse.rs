use std::sync::LazyLock;

use regex::Regex;
use warden_access::Handle;

use crate::contract::MessageContent;

const MAX_MUTE_MS: u64 = 365 * 24 * 60 * 60 * 1_000;

static DURATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,6})([smhdw])$").expect("duration pattern compiles")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    /// Lowercased command name without the prefix.
    pub name: String,
    pub args: Vec<String>,
    /// Arguments joined by single spaces.
    pub raw_args: String,
}

/// Splits `text` into a command name and arguments when it starts with
/// `prefix`. Blank text, a missing prefix or a bare prefix yield `None`.
pub fn parse_command(text: &str, prefix: &str) -> Option<ParsedCommand> {
    let trimmed = text.trim();
    if trimmed.is_empty() || prefix.is_empty() {
        return None;
    }
    let rest = trimmed.strip_prefix(prefix)?.trim();
    let mut parts = rest.split_whitespace();
    let name = parts.next()?.to_lowercase();
    let args = parts.map(str::to_string).collect::<Vec<_>>();
    let raw_args = args.join(" ");
    Some(ParsedCommand {
        name,
        args,
        raw_args,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Enumerates supported `TargetSource` values.
pub enum TargetSource {
    Mentions,
    Reply,
    Number,
}

impl TargetSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mentions => "mentions",
            Self::Reply => "reply",
            Self::Number => "number",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Mentions => "by mention",
            Self::Reply => "by reply",
            Self::Number => "by phone number",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetResolution {
    pub targets: Vec<Handle>,
    /// `None` when nothing resolved.
    pub source: Option<TargetSource>,
}

/// Resolves command targets from mentions, then the replied-to author, then
/// phone-number arguments. The first non-empty source wins.
pub fn resolve_targets(content: &MessageContent, args: &[String]) -> TargetResolution {
    let mentions = unique(content.mentions.iter().filter_map(|raw| Handle::parse(raw)));
    if !mentions.is_empty() {
        return TargetResolution {
            targets: mentions,
            source: Some(TargetSource::Mentions),
        };
    }

    if let Some(author) = content.quoted_author.as_deref().and_then(Handle::parse) {
        return TargetResolution {
            targets: vec![author],
            source: Some(TargetSource::Reply),
        };
    }

    let numbers = unique(args.iter().filter_map(|arg| Handle::from_phone_literal(arg)));
    if !numbers.is_empty() {
        return TargetResolution {
            targets: numbers,
            source: Some(TargetSource::Number),
        };
    }

    TargetResolution::default()
}

fn unique(handles: impl Iterator<Item = Handle>) -> Vec<Handle> {
    let mut out = Vec::new();
    for handle in handles {
        if !out.contains(&handle) {
            out.push(handle);
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Enumerates supported `DurationUnit` values.
pub enum DurationUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
}

impl DurationUnit {
    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "s" => Some(Self::Seconds),
            "m" => Some(Self::Minutes),
            "h" => Some(Self::Hours),
            "d" => Some(Self::Days),
            "w" => Some(Self::Weeks),
            _ => None,
        }
    }

    fn millis(self) -> u64 {
        match self {
            Self::Seconds => 1_000,
            Self::Minutes => 60_000,
            Self::Hours => 3_600_000,
            Self::Days => 86_400_000,
            Self::Weeks => 604_800_000,
        }
    }

    fn noun(self) -> &'static str {
        match self {
            Self::Seconds => "second",
            Self::Minutes => "minute",
            Self::Hours => "hour",
            Self::Days => "day",
            Self::Weeks => "week",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuteDuration {
    pub count: u64,
    pub unit: DurationUnit,
    pub millis: u64,
}

impl MuteDuration {
    /// Mutes are capped at 365 days.
    pub fn exceeds_maximum(&self) -> bool {
        self.millis > MAX_MUTE_MS
    }

    pub fn describe(&self) -> String {
        let plural = if self.count == 1 { "" } else { "s" };
        format!("{} {}{plural}", self.count, self.unit.noun())
    }
}

/// Parses tokens like `10m` or `2d`. Zero counts and anything not matching
/// `<1-6 digits><s|m|h|d|w>` are not durations.
pub fn parse_duration_token(raw: &str) -> Option<MuteDuration> {
    let token = raw.trim().to_lowercase();
    let captures = DURATION_PATTERN.captures(&token)?;
    let count = captures.get(1)?.as_str().parse::<u64>().ok()?;
    if count == 0 {
        return None;
    }
    let unit = DurationUnit::from_suffix(captures.get(2)?.as_str())?;
    Some(MuteDuration {
        count,
        unit,
        millis: count.saturating_mul(unit.millis()),
    })
}

pub fn parse_on_off(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "on" | "enable" | "enabled" | "1" | "true" | "yes" | "y" => Some(true),
        "off" | "disable" | "disabled" | "0" | "false" | "no" | "n" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        parse_command, parse_duration_token, parse_on_off, resolve_targets, DurationUnit,
        TargetSource,
    };
    use crate::contract::MessageContent;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|arg| arg.to_string()).collect()
    }

    #[test]
    fn unit_parse_command_requires_exact_prefix() {
        let parsed = parse_command("  !AntiLink   on  ", "!").expect("command");
        assert_eq!(parsed.name, "antilink");
        assert_eq!(parsed.args, vec!["on".to_string()]);
        assert_eq!(parsed.raw_args, "on");

        assert!(parse_command("!", "!").is_none());
        assert!(parse_command("!   ", "!").is_none());
        assert!(parse_command("", "!").is_none());
        assert!(parse_command("antilink on", "!").is_none());
        assert!(parse_command("/antilink on", "!").is_none());
        assert_eq!(parse_command("! ping", "!").expect("command").name, "ping");
        assert_eq!(parse_command("..menu 2", "..").expect("command").args, vec!["2"]);
    }

    #[test]
    fn functional_targets_prefer_mentions_then_reply_then_numbers() {
        let content = MessageContent {
            mentions: vec![
                "1001@lid".to_string(),
                "1001:3@lid".to_string(),
                "garbage".to_string(),
            ],
            quoted_author: Some("15550000002@s.whatsapp.net".to_string()),
            ..MessageContent::default()
        };
        let resolved = resolve_targets(&content, &args(&["+15550000003"]));
        assert_eq!(resolved.source, Some(TargetSource::Mentions));
        assert_eq!(resolved.targets.len(), 1);

        let reply_only = MessageContent {
            quoted_author: Some("15550000002@s.whatsapp.net".to_string()),
            ..MessageContent::default()
        };
        let resolved = resolve_targets(&reply_only, &args(&["+15550000003"]));
        assert_eq!(resolved.source, Some(TargetSource::Reply));
        assert_eq!(resolved.targets[0].to_string(), "15550000002@s.whatsapp.net");

        let resolved = resolve_targets(
            &MessageContent::default(),
            &args(&["+1(555)000-0003", "10m", "12345", "+15550000003"]),
        );
        assert_eq!(resolved.source, Some(TargetSource::Number));
        assert_eq!(resolved.targets.len(), 1);
        assert_eq!(resolved.targets[0].to_string(), "15550000003@s.whatsapp.net");
    }

    #[test]
    fn unit_no_targets_is_not_an_error() {
        let resolved = resolve_targets(&MessageContent::default(), &args(&["on"]));
        assert!(resolved.targets.is_empty());
        assert!(resolved.source.is_none());
    }

    #[test]
    fn unit_duration_tokens() {
        let ten_minutes = parse_duration_token("10M").expect("duration");
        assert_eq!(ten_minutes.unit, DurationUnit::Minutes);
        assert_eq!(ten_minutes.millis, 600_000);
        assert_eq!(ten_minutes.describe(), "10 minutes");
        assert_eq!(parse_duration_token("1d").expect("duration").describe(), "1 day");

        assert!(!parse_duration_token("52w").expect("duration").exceeds_maximum());
        assert!(!parse_duration_token("365d").expect("duration").exceeds_maximum());
        assert!(parse_duration_token("366d").expect("duration").exceeds_maximum());
        assert!(parse_duration_token("999999w").expect("duration").exceeds_maximum());

        assert!(parse_duration_token("0m").is_none());
        assert!(parse_duration_token("1234567s").is_none());
        assert!(parse_duration_token("10").is_none());
        assert!(parse_duration_token("m10").is_none());
        assert!(parse_duration_token("+15550000003").is_none());
    }

    #[test]
    fn unit_on_off_vocabulary() {
        for word in ["on", "ENABLE", "enabled", "1", "true", "yes", "y"] {
            assert_eq!(parse_on_off(word), Some(true), "{word}");
        }
        for word in ["off", "disable", "Disabled", "0", "false", "no", "n"] {
            assert_eq!(parse_on_off(word), Some(false), "{word}");
        }
        assert_eq!(parse_on_off("maybe"), None);
        assert_eq!(parse_on_off(""), None);
    }
}
