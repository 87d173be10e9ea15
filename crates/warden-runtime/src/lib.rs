//! Message pipeline for the Warden group moderation bot.
//!
//! Provides the transport contract, mute and moderation enforcement, the
//! command catalogue with its handlers, menu navigation, membership handling
//! and the [`CommandRouter`] that ties them together.
//!
//! ```rust
//! use warden_runtime::{parse_command, parse_duration_token};
//!
//! let parsed = parse_command("!Mute @15550000001 10m", "!").expect("command");
//! assert_eq!(parsed.name, "mute");
//! let duration = parse_duration_token(&parsed.args[1]).expect("duration");
//! assert_eq!(duration.describe(), "10 minutes");
//! ```

pub mod commands;
pub mod config;
pub mod contract;
pub mod enforcers;
pub mod group_admin;
pub mod membership;
pub mod menu;
pub mod moderation_rules;
pub mod parse;
pub mod recording;
pub mod replies;
pub mod router;

pub use commands::{lookup_command, render_help, CommandCategory, CommandDefinition, CommandId};
pub use config::*;
pub use contract::*;
pub use enforcers::{EnforcementOutcome, ModerationEnforcer, MuteEnforcer, SenderIdentity, WarningGate};
pub use group_admin::{AdminStatus, GroupAdminService, ParticipantActionReport};
pub use membership::{render_welcome, MembershipHandler, MembershipReport};
pub use menu::{MenuManager, MenuView};
pub use moderation_rules::{first_violation, ModerationRule, Violation};
pub use parse::*;
pub use recording::{RecordedAction, RecordingTransport};
pub use router::{CommandRouter, DenialReason, RouteOutcome};
