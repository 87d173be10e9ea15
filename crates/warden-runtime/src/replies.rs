//! Fixed user-facing texts shared by the router and the command handlers.

pub const GROUP_ONLY: &str = "This command only works inside groups.";
pub const NOT_ALLOWLISTED: &str = "Sorry, this command is limited to allowlisted members.";
pub const ALLOWLIST_NOT_CONFIGURED: &str = "⚠️ The allowlist has not been configured yet.";
pub const CALLER_NOT_ADMIN: &str = "Sorry, this command is only available to group admins.";
pub const CANNOT_VERIFY_ADMIN: &str =
    "Could not verify group admin permissions right now. Try again later.";
pub const BOT_IDENTITY_UNRESOLVED: &str =
    "Could not determine the bot's own account right now. Try again later.";
pub const BOT_NOT_ADMIN: &str =
    "This command cannot run because the bot is not an admin of this group.";
pub const GENERIC_FAILURE: &str = "Something went wrong while running the command.";
pub const NOTHING_DONE: &str = "No action was taken.";

pub fn unknown_command(prefix: &str) -> String {
    format!("Unknown command. Type {prefix}help to list the commands.")
}

pub fn seconds(count: u64) -> String {
    if count == 1 {
        "1 second".to_string()
    } else {
        format!("{count} seconds")
    }
}

pub fn command_cooldown(wait_seconds: u64) -> String {
    format!(
        "⏳ Please wait {} before using commands again.",
        seconds(wait_seconds)
    )
}

pub fn fun_cooldown(wait_seconds: u64) -> String {
    format!(
        "⏳ Please wait {} before using fun commands again.",
        seconds(wait_seconds)
    )
}

pub fn no_targets(example: &str) -> String {
    format!("No target given. Use a mention, a reply or a phone number.\nExample: {example}")
}

pub fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on ✅"
    } else {
        "off ❌"
    }
}

pub fn members(count: usize) -> String {
    if count == 1 {
        "1 member".to_string()
    } else {
        format!("{count} members")
    }
}
