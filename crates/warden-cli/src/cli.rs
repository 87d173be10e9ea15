use std::path::PathBuf;

use clap::{ArgAction, Parser};
use tracing::level_filters::LevelFilter;
use warden_runtime::{
    normalize_prefix, parse_allowlist_entries, BotConfig, DEFAULT_COMMAND_COOLDOWN_MS,
    DEFAULT_COMMAND_PREFIX, DEFAULT_FUN_COOLDOWN_MS, DEFAULT_GROUP_ACTION_SPACING_MS,
    DEFAULT_GROUP_SNAPSHOT_TTL_MS, DEFAULT_MENU_TTL_MS, DEFAULT_PING_RESPONSE,
    DEFAULT_WARNING_COOLDOWN_MS,
};

use crate::bootstrap::parse_log_level;

#[derive(Debug, Parser)]
#[command(
    name = "warden",
    about = "Group moderation and authorization bot core",
    version
)]
pub struct Cli {
    #[arg(
        long,
        env = "WARDEN_PREFIX",
        default_value = DEFAULT_COMMAND_PREFIX,
        help = "Command prefix. Blank values fall back to '!'."
    )]
    pub prefix: String,

    #[arg(
        long = "store-path",
        env = "WARDEN_STORE_PATH",
        default_value = "./data/store.json",
        help = "JSON document holding allowlist, bans, mutes and group settings."
    )]
    pub store_path: PathBuf,

    #[arg(
        long,
        env = "WARDEN_ALLOWLIST",
        default_value = "",
        help = "Comma-delimited user ids or phone numbers added to the allowlist at startup."
    )]
    pub allowlist: String,

    #[arg(
        long = "require-caller-admin",
        env = "WARDEN_REQUIRE_CALLER_ADMIN",
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Protected commands also require the caller to be a group admin."
    )]
    pub require_caller_admin: bool,

    #[arg(
        long = "warning-cooldown-ms",
        env = "WARDEN_WARNING_COOLDOWN_MS",
        default_value_t = DEFAULT_WARNING_COOLDOWN_MS
    )]
    pub warning_cooldown_ms: u64,

    #[arg(
        long = "command-cooldown-ms",
        env = "WARDEN_COMMAND_COOLDOWN_MS",
        default_value_t = DEFAULT_COMMAND_COOLDOWN_MS
    )]
    pub command_cooldown_ms: u64,

    #[arg(
        long = "fun-cooldown-ms",
        env = "WARDEN_FUN_COOLDOWN_MS",
        default_value_t = DEFAULT_FUN_COOLDOWN_MS
    )]
    pub fun_cooldown_ms: u64,

    #[arg(
        long = "group-action-spacing-ms",
        env = "WARDEN_GROUP_ACTION_SPACING_MS",
        default_value_t = DEFAULT_GROUP_ACTION_SPACING_MS,
        help = "Pause between per-target participant updates."
    )]
    pub group_action_spacing_ms: u64,

    #[arg(
        long = "ping-response",
        env = "WARDEN_PING_RESPONSE",
        default_value = DEFAULT_PING_RESPONSE
    )]
    pub ping_response: String,

    #[arg(
        long = "log-level",
        env = "WARDEN_LOG_LEVEL",
        default_value = "info",
        value_parser = parse_log_level,
        help = "Default log level; RUST_LOG takes precedence."
    )]
    pub log_level: LevelFilter,

    #[arg(help = "Replay fixture with bot identities, group snapshots and inbound events.")]
    pub fixture: PathBuf,
}

impl Cli {
    pub fn bot_config(&self) -> BotConfig {
        BotConfig {
            prefix: normalize_prefix(&self.prefix),
            require_caller_admin: self.require_caller_admin,
            warning_cooldown_ms: self.warning_cooldown_ms,
            command_cooldown_ms: self.command_cooldown_ms,
            fun_cooldown_ms: self.fun_cooldown_ms,
            group_snapshot_ttl_ms: DEFAULT_GROUP_SNAPSHOT_TTL_MS,
            menu_ttl_ms: DEFAULT_MENU_TTL_MS,
            group_action_spacing_ms: self.group_action_spacing_ms,
            ping_response: self.ping_response.clone(),
            seed_allowlist: parse_allowlist_entries(&self.allowlist),
        }
    }
}
