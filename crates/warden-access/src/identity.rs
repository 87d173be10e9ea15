use std::fmt;

use serde::{Deserialize, Serialize};

const PHONE_SERVER: &str = "s.whatsapp.net";
const PRIVACY_SERVER: &str = "lid";
const GROUP_SUFFIX: &str = "@g.us";

/// Pseudo-chat used by the platform for status broadcasts.
pub const BROADCAST_CHAT_ID: &str = "status@broadcast";

const PHONE_DIGITS_MIN: usize = 6;
const PHONE_DIGITS_MAX: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Identifier scheme a participant handle belongs to.
pub enum Namespace {
    Phone,
    Privacy,
}

impl Namespace {
    pub fn server(self) -> &'static str {
        match self {
            Self::Phone => PHONE_SERVER,
            Self::Privacy => PRIVACY_SERVER,
        }
    }

    pub fn other(self) -> Self {
        match self {
            Self::Phone => Self::Privacy,
            Self::Privacy => Self::Phone,
        }
    }

    fn from_server(server: &str) -> Option<Self> {
        match server {
            PHONE_SERVER => Some(Self::Phone),
            PRIVACY_SERVER => Some(Self::Privacy),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
/// Canonical, namespace-tagged participant identifier (`<user>@<server>`).
///
/// Equality is plain structural equality. Two handles in different namespaces
/// may still denote the same participant; only `IdentityResolver` decides that.
pub struct Handle {
    user: String,
    namespace: Namespace,
}

impl Handle {
    /// Normalizes a raw participant id.
    ///
    /// Rejects ids without a recognized namespace suffix, strips the
    /// `:<device>` decoration from the user part and lowercases the server.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let (user_part, server_part) = trimmed.split_once('@')?;
        let user = user_part.split(':').next().unwrap_or_default().trim();
        let server = server_part.trim().to_ascii_lowercase();
        if user.is_empty() || server.is_empty() {
            return None;
        }
        let namespace = Namespace::from_server(&server)?;
        Some(Self {
            user: user.to_string(),
            namespace,
        })
    }

    /// Builds a phone-namespace handle from a phone-number literal such as
    /// `+1 (555) 123-4567`. Non-digits are ignored; 6 to 20 digits are required.
    pub fn from_phone_literal(raw: &str) -> Option<Self> {
        let digits = raw
            .chars()
            .filter(char::is_ascii_digit)
            .collect::<String>();
        if !(PHONE_DIGITS_MIN..=PHONE_DIGITS_MAX).contains(&digits.len()) {
            return None;
        }
        Some(Self {
            user: digits,
            namespace: Namespace::Phone,
        })
    }

    /// Accepts either a full id or a bare phone-number literal.
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        if raw.contains('@') {
            Self::parse(raw)
        } else {
            Self::from_phone_literal(raw)
        }
    }

    pub fn user(&self) -> &str {
        self.user.as_str()
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// Text used to mention this participant inside a message body.
    pub fn mention_tag(&self) -> String {
        format!("@{}", self.user)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}@{}", self.user, self.namespace.server())
    }
}

impl From<Handle> for String {
    fn from(value: Handle) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for Handle {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Handle::parse(&value).ok_or_else(|| format!("invalid participant handle '{value}'"))
    }
}

pub fn is_group_id(chat_id: &str) -> bool {
    chat_id.trim().ends_with(GROUP_SUFFIX) && chat_id.trim().len() > GROUP_SUFFIX.len()
}

/// Direct chats are addressed by the peer's own participant id.
pub fn is_direct_chat_id(chat_id: &str) -> bool {
    Handle::parse(chat_id).is_some()
}

/// Renders up to `limit` user ids, then `... (+N)` for the remainder.
pub fn format_handles(handles: &[Handle], limit: usize) -> String {
    if handles.is_empty() {
        return String::new();
    }
    let head = handles
        .iter()
        .take(limit)
        .map(Handle::user)
        .collect::<Vec<_>>()
        .join(", ");
    if handles.len() <= limit {
        return head;
    }
    format!("{head} ... (+{})", handles.len() - limit)
}
