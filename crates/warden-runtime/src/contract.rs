//! Transport capability consumed by the core and the event shapes it delivers.
//!
//! The core never talks to the chat network directly. Everything it needs
//! (sending, deleting, group snapshots, participant updates) goes through
//! `GroupTransport`, which keeps the moderation logic testable with an
//! in-memory double.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use warden_access::Handle;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Addresses one message on the network.
pub struct MessageKey {
    pub chat_id: String,
    #[serde(default)]
    pub from_self: bool,
    /// Sender id inside groups; absent in direct chats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
    /// Sender id in the other namespace, when the network supplies it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_alt_id: Option<String>,
    pub message_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub has_image: bool,
    #[serde(default)]
    pub has_sticker: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentions: Vec<String>,
    /// Author of the message this one replies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quoted_author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quoted_message_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub key: MessageKey,
    #[serde(default)]
    pub content: MessageContent,
}

impl InboundMessage {
    pub fn text(&self) -> &str {
        self.content.text.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `MembershipAction` values.
pub enum MembershipAction {
    Add,
    Invite,
    Remove,
    Promote,
    Demote,
    #[serde(other)]
    Other,
}

impl MembershipAction {
    pub fn is_join(self) -> bool {
        matches!(self, Self::Add | Self::Invite)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipEvent {
    pub group_id: String,
    pub action: MembershipAction,
    #[serde(default)]
    pub participants: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboundContent {
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        mentions: Vec<Handle>,
    },
    Delete {
        key: MessageKey,
    },
}

impl OutboundContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            mentions: Vec::new(),
        }
    }

    pub fn text_with_mentions(text: impl Into<String>, mentions: Vec<Handle>) -> Self {
        Self::Text {
            text: text.into(),
            mentions,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Message the outbound text replies to.
    pub quoted: Option<MessageKey>,
}

impl SendOptions {
    pub fn quoting(key: &MessageKey) -> Self {
        Self {
            quoted: Some(key.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupParticipant {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_id: Option<String>,
    /// Either a full phone-namespace id or a bare phone number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub admin: bool,
}

impl GroupParticipant {
    /// Every normalizable form this participant is known by.
    pub fn handles(&self) -> Vec<Handle> {
        let mut handles = Vec::with_capacity(3);
        let forms = [
            Handle::parse(&self.id),
            self.alt_id.as_deref().and_then(Handle::parse),
            self.phone_number.as_deref().and_then(Handle::parse_lenient),
        ];
        for handle in forms.into_iter().flatten() {
            if !handles.contains(&handle) {
                handles.push(handle);
            }
        }
        handles
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Membership snapshot of one group.
pub struct GroupMetadata {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub participants: Vec<GroupParticipant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `ParticipantAction` values.
pub enum ParticipantAction {
    Remove,
    Promote,
    Demote,
}

impl ParticipantAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Remove => "remove",
            Self::Promote => "promote",
            Self::Demote => "demote",
        }
    }
}

#[async_trait]
/// Trait contract for the chat-network session the core drives.
pub trait GroupTransport: Send + Sync {
    /// Raw ids of the bot's own account, in every namespace known.
    fn bot_identities(&self) -> Vec<String>;

    /// Sends text or a delete directive. Returns the id of the sent message
    /// when the network reports one.
    async fn send_message(
        &self,
        chat_id: &str,
        content: OutboundContent,
        options: SendOptions,
    ) -> Result<Option<String>>;

    async fn group_metadata(&self, group_id: &str) -> Result<GroupMetadata>;

    async fn group_participants_update(
        &self,
        group_id: &str,
        participants: &[Handle],
        action: ParticipantAction,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{GroupParticipant, InboundMessage, MembershipAction, MembershipEvent};

    #[test]
    fn unit_participant_handles_collect_every_namespace_once() {
        let participant = GroupParticipant {
            id: "9001@lid".to_string(),
            alt_id: Some("15551234567@s.whatsapp.net".to_string()),
            phone_number: Some("+1 555 123 4567".to_string()),
            admin: true,
        };
        let rendered = participant
            .handles()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        assert_eq!(
            rendered,
            vec![
                "9001@lid".to_string(),
                "15551234567@s.whatsapp.net".to_string()
            ]
        );
    }

    #[test]
    fn functional_inbound_shapes_deserialize_with_defaults() {
        let message: InboundMessage = serde_json::from_value(json!({
            "key": {
                "chat_id": "123@g.us",
                "author_id": "15550000001@s.whatsapp.net",
                "message_id": "m1"
            },
            "content": { "text": "!ping" }
        }))
        .expect("message");
        assert!(!message.key.from_self);
        assert_eq!(message.text(), "!ping");
        assert!(message.content.mentions.is_empty());

        let event: MembershipEvent = serde_json::from_value(json!({
            "group_id": "123@g.us",
            "action": "leave",
            "participants": ["9001@lid"]
        }))
        .expect("membership");
        assert_eq!(event.action, MembershipAction::Other);
        assert!(!event.action.is_join());
    }
}
