use warden_access::Handle;

pub const DEFAULT_COMMAND_PREFIX: &str = "!";
pub const DEFAULT_WARNING_COOLDOWN_MS: u64 = 15_000;
pub const DEFAULT_COMMAND_COOLDOWN_MS: u64 = 1_200;
pub const DEFAULT_FUN_COOLDOWN_MS: u64 = 6_000;
pub const DEFAULT_GROUP_SNAPSHOT_TTL_MS: u64 = 30_000;
pub const DEFAULT_MENU_TTL_MS: u64 = 90_000;
pub const DEFAULT_GROUP_ACTION_SPACING_MS: u64 = 350;
pub const DEFAULT_PING_RESPONSE: &str = "🏓 Pong! The bot is running ✅";

pub(crate) const WARNING_CACHE_CEILING: usize = 5_000;
pub(crate) const COOLDOWN_CACHE_CEILING: usize = 20_000;
pub(crate) const MENU_CACHE_CEILING: usize = 2_000;
pub(crate) const SNAPSHOT_CACHE_CEILING: usize = 2_000;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Runtime settings for the command router and enforcers.
pub struct BotConfig {
    pub prefix: String,
    /// Privileged commands additionally require the caller to be a group admin.
    pub require_caller_admin: bool,
    pub warning_cooldown_ms: u64,
    pub command_cooldown_ms: u64,
    pub fun_cooldown_ms: u64,
    pub group_snapshot_ttl_ms: u64,
    pub menu_ttl_ms: u64,
    pub group_action_spacing_ms: u64,
    pub ping_response: String,
    /// Added to the store allowlist at startup.
    pub seed_allowlist: Vec<Handle>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_COMMAND_PREFIX.to_string(),
            require_caller_admin: false,
            warning_cooldown_ms: DEFAULT_WARNING_COOLDOWN_MS,
            command_cooldown_ms: DEFAULT_COMMAND_COOLDOWN_MS,
            fun_cooldown_ms: DEFAULT_FUN_COOLDOWN_MS,
            group_snapshot_ttl_ms: DEFAULT_GROUP_SNAPSHOT_TTL_MS,
            menu_ttl_ms: DEFAULT_MENU_TTL_MS,
            group_action_spacing_ms: DEFAULT_GROUP_ACTION_SPACING_MS,
            ping_response: DEFAULT_PING_RESPONSE.to_string(),
            seed_allowlist: Vec::new(),
        }
    }
}

impl BotConfig {
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = normalize_prefix(prefix);
        self
    }
}

/// Blank prefixes fall back to `!`.
pub fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        DEFAULT_COMMAND_PREFIX.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Parses a comma- or newline-delimited list of participant ids or phone
/// numbers, skipping entries that do not normalize.
pub fn parse_allowlist_entries(raw: &str) -> Vec<Handle> {
    let mut handles = Vec::new();
    for entry in raw.split([',', ';', '\n']) {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        match Handle::parse_lenient(entry) {
            Some(handle) if !handles.contains(&handle) => handles.push(handle),
            Some(_) => {}
            None => tracing::warn!(entry, "ignoring unparseable allowlist entry"),
        }
    }
    handles
}

#[cfg(test)]
mod tests {
    use super::{normalize_prefix, parse_allowlist_entries, BotConfig};

    #[test]
    fn unit_blank_prefix_falls_back_to_bang() {
        assert_eq!(normalize_prefix("   "), "!");
        assert_eq!(normalize_prefix(" / "), "/");
        assert_eq!(BotConfig::default().with_prefix("").prefix, "!");
    }

    #[test]
    fn functional_allowlist_entries_accept_ids_and_phone_numbers() {
        let handles = parse_allowlist_entries(
            "+1 555 000 0001, 15550000001@s.whatsapp.net,9001@lid , nope",
        );
        let rendered = handles.iter().map(ToString::to_string).collect::<Vec<_>>();
        assert_eq!(
            rendered,
            vec!["15550000001@s.whatsapp.net".to_string(), "9001@lid".to_string()]
        );
    }
}
