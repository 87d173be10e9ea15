//! Replays a JSON fixture through the full pipeline against a recording
//! transport and reports every outcome and outbound action.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use warden_access::{is_group_id, Handle, IdentityResolver};
use warden_runtime::{
    BotConfig, CommandRouter, GroupMetadata, InboundMessage, MembershipEvent, MembershipReport,
    RecordedAction, RecordingTransport, RouteOutcome,
};
use warden_store::Store;

pub const REPLAY_FIXTURE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
/// Enumerates supported `ReplayEvent` values.
pub enum ReplayEvent {
    Message(InboundMessage),
    Membership(MembershipEvent),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayFixture {
    pub schema_version: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub bot_identities: Vec<String>,
    /// Pairs of ids known to be the same account in both namespaces.
    #[serde(default)]
    pub identity_links: Vec<(String, String)>,
    #[serde(default)]
    pub groups: BTreeMap<String, GroupMetadata>,
    pub events: Vec<ReplayEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
/// One JSON line of replay output.
pub enum ReplayLine {
    Outcome {
        event: usize,
        #[serde(flatten)]
        outcome: RouteOutcome,
    },
    Membership {
        event: usize,
        membership: MembershipReport,
    },
    Action {
        event: usize,
        #[serde(flatten)]
        action: RecordedAction,
    },
}

pub fn parse_replay_fixture(raw: &str) -> Result<ReplayFixture> {
    let fixture = serde_json::from_str::<ReplayFixture>(raw)
        .context("failed to parse replay fixture")?;
    validate_replay_fixture(&fixture)?;
    Ok(fixture)
}

pub fn load_replay_fixture(path: &Path) -> Result<ReplayFixture> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read replay fixture {}", path.display()))?;
    parse_replay_fixture(&raw)
}

pub fn validate_replay_fixture(fixture: &ReplayFixture) -> Result<()> {
    if fixture.schema_version != REPLAY_FIXTURE_SCHEMA_VERSION {
        bail!(
            "unsupported replay fixture schema_version {} (expected {})",
            fixture.schema_version,
            REPLAY_FIXTURE_SCHEMA_VERSION
        );
    }
    if fixture.name.trim().is_empty() {
        bail!("replay fixture name cannot be empty");
    }
    if fixture.events.is_empty() {
        bail!("replay fixture must include at least one event");
    }
    for raw in &fixture.bot_identities {
        if Handle::parse(raw).is_none() {
            bail!("bot identity '{raw}' is not a user id");
        }
    }
    for (first, second) in &fixture.identity_links {
        let (Some(first_handle), Some(second_handle)) = (Handle::parse(first), Handle::parse(second))
        else {
            bail!("identity link '{first}' <-> '{second}' contains an invalid id");
        };
        if first_handle.namespace() == second_handle.namespace() {
            bail!("identity link '{first}' <-> '{second}' must span both namespaces");
        }
    }
    for group_id in fixture.groups.keys() {
        if !is_group_id(group_id) {
            bail!("group key '{group_id}' is not a group id");
        }
    }

    let mut message_ids = HashSet::new();
    for (index, event) in fixture.events.iter().enumerate() {
        match event {
            ReplayEvent::Message(message) => {
                let key = &message.key;
                if key.message_id.trim().is_empty() {
                    bail!("fixture event index {index} has empty message_id");
                }
                if !message_ids.insert((key.chat_id.as_str(), key.message_id.as_str())) {
                    bail!(
                        "fixture event index {index} duplicates message '{}' in '{}'",
                        key.message_id,
                        key.chat_id
                    );
                }
            }
            ReplayEvent::Membership(membership) => {
                if !is_group_id(&membership.group_id) {
                    bail!("fixture event index {index} targets non-group '{}'", membership.group_id);
                }
            }
        }
    }
    Ok(())
}

/// Builds the recording transport a fixture describes.
pub fn fixture_transport(fixture: &ReplayFixture) -> RecordingTransport {
    let transport = RecordingTransport::new(fixture.bot_identities.iter().cloned());
    for (group_id, metadata) in &fixture.groups {
        transport.set_group(group_id, metadata.clone());
    }
    for (first, second) in &fixture.identity_links {
        if let (Some(first), Some(second)) = (Handle::parse(first), Handle::parse(second)) {
            transport.link_identities(first, second);
        }
    }
    transport
}

pub async fn run_replay(
    fixture: &ReplayFixture,
    store: Arc<Store>,
    config: BotConfig,
) -> Result<Vec<ReplayLine>> {
    let transport = Arc::new(fixture_transport(fixture));
    let router = CommandRouter::new(
        config,
        store,
        transport.clone(),
        IdentityResolver::new(transport.clone()),
    );

    let mut lines = Vec::new();
    for (event, item) in fixture.events.iter().enumerate() {
        match item {
            ReplayEvent::Message(message) => {
                let outcome = router.handle(message).await;
                tracing::debug!(event, outcome = outcome.as_str(), "replayed message");
                lines.push(ReplayLine::Outcome { event, outcome });
            }
            ReplayEvent::Membership(membership) => {
                let report = router.handle_membership(membership).await;
                lines.push(ReplayLine::Membership {
                    event,
                    membership: report,
                });
            }
        }
        lines.extend(
            transport
                .take_actions()
                .into_iter()
                .map(|action| ReplayLine::Action { event, action }),
        );
    }
    tracing::info!(
        fixture = %fixture.name,
        events = fixture.events.len(),
        lines = lines.len(),
        "replay finished"
    );
    Ok(lines)
}
