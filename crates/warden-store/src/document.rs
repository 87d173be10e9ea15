use std::collections::BTreeMap;

use serde::Serialize;
use warden_access::Handle;

/// Current on-disk document version.
pub const STORE_VERSION: u32 = 5;
/// Welcome template used when a group has none (or an empty one).
pub const DEFAULT_WELCOME_TEMPLATE: &str =
    "👋 Welcome {user}!\n\nGlad to have you in {group}.\n\n{rules}";
pub const MAX_WELCOME_TEMPLATE_CHARS: usize = 2_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreDocument {
    pub version: u32,
    pub groups: BTreeMap<String, GroupRecord>,
    pub allowlist: Vec<Handle>,
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self {
            version: STORE_VERSION,
            groups: BTreeMap::new(),
            allowlist: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
/// Per-group policy and user state.
pub struct GroupRecord {
    pub bans: Vec<Handle>,
    pub mutes: BTreeMap<Handle, MuteEntry>,
    pub moderation: ModerationSettings,
    pub welcome: WelcomeSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
/// `until = None` is an indefinite mute.
pub struct MuteEntry {
    pub until: Option<u64>,
}

impl MuteEntry {
    pub fn is_active_at(&self, now_ms: u64) -> bool {
        !warden_core::is_expired_ms(self.until, now_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationSettings {
    pub anti_link: bool,
    pub filter_enabled: bool,
    pub anti_image: bool,
    pub anti_sticker: bool,
    pub exempt_allowlisted: bool,
    pub exempt_admins: bool,
    pub banned_words: Vec<String>,
}

impl Default for ModerationSettings {
    fn default() -> Self {
        Self {
            anti_link: false,
            filter_enabled: false,
            anti_image: false,
            anti_sticker: false,
            exempt_allowlisted: true,
            exempt_admins: true,
            banned_words: Vec::new(),
        }
    }
}

impl ModerationSettings {
    /// True when at least one enforcement rule (not an exemption) is on.
    pub fn any_rule_enabled(&self) -> bool {
        self.anti_link || self.filter_enabled || self.anti_image || self.anti_sticker
    }

    pub fn flag(&self, flag: ModerationFlag) -> bool {
        match flag {
            ModerationFlag::AntiLink => self.anti_link,
            ModerationFlag::FilterEnabled => self.filter_enabled,
            ModerationFlag::AntiImage => self.anti_image,
            ModerationFlag::AntiSticker => self.anti_sticker,
            ModerationFlag::ExemptAllowlisted => self.exempt_allowlisted,
            ModerationFlag::ExemptAdmins => self.exempt_admins,
        }
    }

    fn flag_mut(&mut self, flag: ModerationFlag) -> &mut bool {
        match flag {
            ModerationFlag::AntiLink => &mut self.anti_link,
            ModerationFlag::FilterEnabled => &mut self.filter_enabled,
            ModerationFlag::AntiImage => &mut self.anti_image,
            ModerationFlag::AntiSticker => &mut self.anti_sticker,
            ModerationFlag::ExemptAllowlisted => &mut self.exempt_allowlisted,
            ModerationFlag::ExemptAdmins => &mut self.exempt_admins,
        }
    }

    /// Returns true when the stored value changed.
    pub(crate) fn set_flag(&mut self, flag: ModerationFlag, value: bool) -> bool {
        let slot = self.flag_mut(flag);
        if *slot == value {
            return false;
        }
        *slot = value;
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModerationFlag {
    AntiLink,
    FilterEnabled,
    AntiImage,
    AntiSticker,
    ExemptAllowlisted,
    ExemptAdmins,
}

impl ModerationFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AntiLink => "antiLink",
            Self::FilterEnabled => "filterEnabled",
            Self::AntiImage => "antiImage",
            Self::AntiSticker => "antiSticker",
            Self::ExemptAllowlisted => "exemptAllowlisted",
            Self::ExemptAdmins => "exemptAdmins",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WelcomeSettings {
    pub enabled: bool,
    pub template: String,
}

impl Default for WelcomeSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            template: DEFAULT_WELCOME_TEMPLATE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MuteStatus {
    pub muted: bool,
    pub until: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddOutcome {
    pub added: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveOutcome {
    pub removed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MuteOutcome {
    pub added: usize,
    pub updated: usize,
    pub total: usize,
}

impl MuteOutcome {
    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.updated == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleOutcome {
    pub value: bool,
    pub changed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateOutcome {
    pub template: String,
    pub changed: bool,
}
