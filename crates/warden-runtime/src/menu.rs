//! Text menus with digit navigation.

use std::sync::Arc;

use anyhow::{Context, Result};
use warden_core::{current_unix_timestamp_ms, TtlCache};

use crate::commands::{render_help, CommandCategory, COMMANDS};
use crate::config::MENU_CACHE_CEILING;
use crate::contract::{GroupTransport, InboundMessage, MessageKey, OutboundContent, SendOptions};

/// A digit reply quoting some other message only navigates this soon after
/// the menu was sent.
const FOREIGN_REPLY_WINDOW_MS: u64 = 15_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Enumerates supported `MenuView` values.
pub enum MenuView {
    Root,
    Admin,
    Moderation,
    Fun,
    Help,
}

impl MenuView {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Admin => "admin",
            Self::Moderation => "moderation",
            Self::Fun => "fun",
            Self::Help => "help",
        }
    }

    /// Section named by a `menu` argument. Unknown names show the root.
    pub fn from_arg(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "1" | "admin" | "admins" => Self::Admin,
            "2" | "moderation" | "mod" => Self::Moderation,
            "3" | "fun" => Self::Fun,
            "4" | "help" => Self::Help,
            _ => Self::Root,
        }
    }

    /// Section for a lone navigation digit.
    pub fn from_digit(raw: &str) -> Option<Self> {
        match raw.trim() {
            "0" => Some(Self::Root),
            "1" => Some(Self::Admin),
            "2" => Some(Self::Moderation),
            "3" => Some(Self::Fun),
            "4" => Some(Self::Help),
            _ => None,
        }
    }

    fn category(self) -> Option<CommandCategory> {
        match self {
            Self::Admin => Some(CommandCategory::Admin),
            Self::Moderation => Some(CommandCategory::Moderation),
            Self::Fun => Some(CommandCategory::Fun),
            Self::Root | Self::Help => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MenuRecord {
    view: MenuView,
    message_id: Option<String>,
}

/// Sends menus and remembers the last one per group.
pub struct MenuManager {
    prefix: String,
    require_caller_admin: bool,
    transport: Arc<dyn GroupTransport>,
    last_menu: TtlCache<MenuRecord>,
}

impl MenuManager {
    pub fn new(
        prefix: &str,
        require_caller_admin: bool,
        transport: Arc<dyn GroupTransport>,
        ttl_ms: u64,
    ) -> Self {
        Self {
            prefix: prefix.to_string(),
            require_caller_admin,
            transport,
            last_menu: TtlCache::new(ttl_ms, MENU_CACHE_CEILING),
        }
    }

    pub fn render(&self, view: MenuView) -> String {
        let prefix = &self.prefix;
        match view {
            MenuView::Help => render_help(prefix),
            MenuView::Root => {
                let mut lines = vec![
                    "🤖 Menu".to_string(),
                    String::new(),
                    "1. Administration".to_string(),
                    "2. Moderation".to_string(),
                    "3. General".to_string(),
                    "4. Full command list".to_string(),
                    String::new(),
                    "Reply with a number to open a section (0 returns here).".to_string(),
                    "🛡️ Protected commands only work for allowlisted members.".to_string(),
                ];
                if self.require_caller_admin {
                    lines.push("They also require the caller to be a group admin.".to_string());
                }
                lines.join("\n")
            }
            MenuView::Admin | MenuView::Moderation | MenuView::Fun => {
                let Some(category) = view.category() else {
                    return self.render(MenuView::Root);
                };
                let mut lines = vec![format!("📂 {}", category.title()), String::new()];
                lines.extend(
                    COMMANDS
                        .iter()
                        .filter(|definition| definition.category == category)
                        .map(|definition| {
                            format!("- {prefix}{}: {}", definition.name, definition.summary)
                        }),
                );
                lines.push(String::new());
                lines.push("0. Back to the menu".to_string());
                lines.join("\n")
            }
        }
    }

    /// Sends `view` quoting `quoted` and remembers it for digit navigation.
    pub async fn send(&self, group_id: &str, view: MenuView, quoted: &MessageKey) -> Result<()> {
        let message_id = self
            .transport
            .send_message(
                group_id,
                OutboundContent::text(self.render(view)),
                SendOptions::quoting(quoted),
            )
            .await
            .with_context(|| format!("failed to send {} menu", view.as_str()))?;
        self.last_menu.insert(
            group_id,
            MenuRecord { view, message_id },
            current_unix_timestamp_ms(),
        );
        Ok(())
    }

    /// Handles a lone digit sent while a menu is remembered for the group.
    /// Returns whether the message was consumed as navigation.
    pub async fn maybe_navigate(&self, group_id: &str, message: &InboundMessage) -> Result<bool> {
        let Some(view) = MenuView::from_digit(message.text()) else {
            return Ok(false);
        };
        let Some((record, age_ms)) = self
            .last_menu
            .get_with_age(group_id, current_unix_timestamp_ms())
        else {
            return Ok(false);
        };
        let replies_elsewhere = message
            .content
            .quoted_message_id
            .as_deref()
            .is_some_and(|quoted| record.message_id.as_deref() != Some(quoted));
        if replies_elsewhere && age_ms > FOREIGN_REPLY_WINDOW_MS {
            return Ok(false);
        }
        tracing::debug!(
            group = group_id,
            from = record.view.as_str(),
            to = view.as_str(),
            "menu navigation"
        );
        self.send(group_id, view, &message.key).await?;
        Ok(true)
    }
}
