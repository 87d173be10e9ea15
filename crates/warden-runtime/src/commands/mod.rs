//! Command catalogue, invocation context and dispatch.
//!
//! The catalogue is a static table; names and aliases resolve through a flat
//! index built once. Dispatch matches on `CommandId` and calls the handler in
//! its submodule.

mod admin;
mod general;
mod moderation;

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use anyhow::{Context, Result};
use warden_access::Handle;
use warden_store::Store;

use crate::config::BotConfig;
use crate::contract::{GroupTransport, InboundMessage, MessageKey, OutboundContent, SendOptions};
use crate::enforcers::SenderIdentity;
use crate::group_admin::GroupAdminService;
use crate::menu::MenuManager;
use crate::parse::TargetSource;

pub(crate) use moderation::render_rules;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Enumerates supported `CommandCategory` values.
pub enum CommandCategory {
    Admin,
    Moderation,
    Fun,
}

impl CommandCategory {
    pub const ALL: [CommandCategory; 3] = [Self::Admin, Self::Moderation, Self::Fun];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Moderation => "moderation",
            Self::Fun => "fun",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Admin => "Administration",
            Self::Moderation => "Moderation",
            Self::Fun => "General",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Enumerates supported `CommandId` values.
pub enum CommandId {
    Help,
    Menu,
    Ping,
    Auth,
    Targets,
    Rules,
    AntiLink,
    AntiImage,
    AntiSticker,
    Filter,
    Exempt,
    Welcome,
    Kick,
    Ban,
    Unban,
    Mute,
    Unmute,
    Promote,
    Demote,
    Allowlist,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandDefinition {
    pub id: CommandId,
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub category: CommandCategory,
    /// Restricted to allowlisted callers.
    pub privileged: bool,
    pub group_only: bool,
    pub requires_bot_admin: bool,
    pub summary: &'static str,
}

const fn command(
    id: CommandId,
    name: &'static str,
    aliases: &'static [&'static str],
    category: CommandCategory,
    privileged: bool,
    requires_bot_admin: bool,
    summary: &'static str,
) -> CommandDefinition {
    CommandDefinition {
        id,
        name,
        aliases,
        category,
        privileged,
        group_only: true,
        requires_bot_admin,
        summary,
    }
}

use CommandCategory::{Admin, Fun, Moderation};

pub static COMMANDS: &[CommandDefinition] = &[
    command(CommandId::Kick, "kick", &[], Admin, true, true, "remove members"),
    command(CommandId::Ban, "ban", &[], Admin, true, true, "remove and ban permanently"),
    command(CommandId::Unban, "unban", &[], Admin, true, false, "lift a ban (by phone number)"),
    command(CommandId::Mute, "mute", &[], Admin, true, false, "mute members [duration]"),
    command(CommandId::Unmute, "unmute", &[], Admin, true, false, "lift a mute"),
    command(CommandId::Promote, "promote", &[], Admin, true, true, "make group admin"),
    command(CommandId::Demote, "demote", &[], Admin, true, true, "revoke group admin"),
    command(CommandId::Allowlist, "allowlist", &["allow"], Admin, true, false, "manage the allowlist"),
    command(CommandId::Rules, "rules", &[], Moderation, false, false, "show the current rules"),
    command(CommandId::AntiLink, "antilink", &[], Moderation, true, false, "block links"),
    command(CommandId::AntiImage, "antiimage", &[], Moderation, true, false, "block images"),
    command(CommandId::AntiSticker, "antisticker", &[], Moderation, true, false, "block stickers"),
    command(CommandId::Filter, "filter", &[], Moderation, true, false, "banned phrases"),
    command(CommandId::Exempt, "exempt", &[], Moderation, true, false, "moderation exemptions"),
    command(CommandId::Welcome, "welcome", &[], Moderation, true, false, "welcome message"),
    command(CommandId::Help, "help", &[], Fun, false, false, "list all commands"),
    command(CommandId::Menu, "menu", &[], Fun, false, false, "interactive menu"),
    command(CommandId::Ping, "ping", &["p"], Fun, false, false, "quick health check"),
    command(CommandId::Auth, "auth", &["whoami"], Fun, false, false, "your permission status"),
    command(CommandId::Targets, "targets", &["target"], Fun, false, false, "how targets are picked"),
];

static COMMAND_INDEX: LazyLock<HashMap<&'static str, &'static CommandDefinition>> =
    LazyLock::new(|| {
        let mut index = HashMap::new();
        for definition in COMMANDS {
            index.insert(definition.name, definition);
            for alias in definition.aliases {
                index.insert(*alias, definition);
            }
        }
        index
    });

/// Resolves a lowercased name or alias.
pub fn lookup_command(name: &str) -> Option<&'static CommandDefinition> {
    COMMAND_INDEX.get(name).copied()
}

/// Full command list grouped by category.
pub fn render_help(prefix: &str) -> String {
    let mut lines = vec![
        "📋 Commands".to_string(),
        String::new(),
        "🛡️ Protected commands only work for allowlisted members.".to_string(),
    ];
    for category in CommandCategory::ALL {
        let commands = COMMANDS
            .iter()
            .filter(|definition| definition.category == category)
            .collect::<Vec<_>>();
        if commands.is_empty() {
            continue;
        }
        lines.push(String::new());
        lines.push(format!("• {}", category.title()));
        for definition in commands {
            let names = std::iter::once(definition.name)
                .chain(definition.aliases.iter().copied())
                .map(|name| format!("{prefix}{name}"))
                .collect::<Vec<_>>()
                .join(" / ");
            let marker = if definition.privileged {
                " (protected)"
            } else {
                ""
            };
            lines.push(format!("- {names}{marker}: {}", definition.summary));
        }
    }
    lines.push(String::new());
    lines.push(format!("Type {prefix}targets to learn how to pick a target."));
    lines.join("\n")
}

/// Shared collaborators every handler may use.
pub struct CommandServices {
    pub config: BotConfig,
    pub store: Arc<Store>,
    pub transport: Arc<dyn GroupTransport>,
    pub admin: Arc<GroupAdminService>,
    pub menu: MenuManager,
}

/// Reply function bound to the invoking chat and message.
#[derive(Clone)]
pub struct Replier {
    transport: Arc<dyn GroupTransport>,
    chat_id: String,
    quoted: MessageKey,
}

impl Replier {
    pub fn new(transport: Arc<dyn GroupTransport>, chat_id: &str, quoted: &MessageKey) -> Self {
        Self {
            transport,
            chat_id: chat_id.to_string(),
            quoted: quoted.clone(),
        }
    }

    pub async fn reply(&self, text: impl Into<String>) -> Result<()> {
        self.send(OutboundContent::text(text), SendOptions::quoting(&self.quoted))
            .await
    }

    pub async fn reply_unquoted(&self, text: impl Into<String>) -> Result<()> {
        self.send(OutboundContent::text(text), SendOptions::default())
            .await
    }

    async fn send(&self, content: OutboundContent, options: SendOptions) -> Result<()> {
        self.transport
            .send_message(&self.chat_id, content, options)
            .await
            .with_context(|| format!("failed to send reply to {}", self.chat_id))?;
        Ok(())
    }
}

/// Per-invocation state. Built by the router after every gate passed.
pub struct CommandContext {
    pub definition: &'static CommandDefinition,
    pub chat_id: String,
    pub group_id: Option<String>,
    pub sender: Option<SenderIdentity>,
    pub bot: Option<Handle>,
    pub args: Vec<String>,
    pub raw_args: String,
    pub targets: Vec<Handle>,
    pub target_source: Option<TargetSource>,
    pub is_allowlisted: bool,
    pub message: InboundMessage,
    pub replier: Replier,
}

impl CommandContext {
    pub async fn reply(&self, text: impl Into<String>) -> Result<()> {
        self.replier.reply(text).await
    }

    /// The group the command runs in. Group-only commands never run without one.
    pub fn group(&self) -> Result<&str> {
        self.group_id
            .as_deref()
            .with_context(|| format!("command '{}' requires a group", self.definition.name))
    }

    pub fn first_arg(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or("")
    }
}

pub async fn execute(services: &CommandServices, ctx: &CommandContext) -> Result<()> {
    match ctx.definition.id {
        CommandId::Help => general::help(services, ctx).await,
        CommandId::Menu => general::menu(services, ctx).await,
        CommandId::Ping => general::ping(services, ctx).await,
        CommandId::Auth => general::auth(services, ctx).await,
        CommandId::Targets => general::targets(services, ctx).await,
        CommandId::Rules => moderation::rules(services, ctx).await,
        CommandId::AntiLink | CommandId::AntiImage | CommandId::AntiSticker => {
            moderation::toggle(services, ctx).await
        }
        CommandId::Filter => moderation::filter(services, ctx).await,
        CommandId::Exempt => moderation::exempt(services, ctx).await,
        CommandId::Welcome => moderation::welcome(services, ctx).await,
        CommandId::Kick | CommandId::Promote | CommandId::Demote => {
            admin::participant_update(services, ctx).await
        }
        CommandId::Ban => admin::ban(services, ctx).await,
        CommandId::Unban => admin::unban(services, ctx).await,
        CommandId::Mute => admin::mute(services, ctx).await,
        CommandId::Unmute => admin::unmute(services, ctx).await,
        CommandId::Allowlist => admin::allowlist(services, ctx).await,
    }
}
