use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tempfile::{tempdir, TempDir};
use warden_access::{Handle, IdentityLookup, IdentityResolver};
use warden_runtime::{
    replies, BotConfig, CommandRouter, DenialReason, GroupMetadata, GroupParticipant,
    GroupTransport, InboundMessage, MessageContent, MessageKey, OutboundContent,
    ParticipantAction, RecordedAction, RecordingTransport, RouteOutcome, SendOptions,
};
use warden_store::Store;

const GROUP: &str = "120363000000000001@g.us";
const BOT: &str = "15559999999@s.whatsapp.net";
const A: &str = "15550000001@s.whatsapp.net";
const B: &str = "15550000002@s.whatsapp.net";
const C: &str = "15550000003@s.whatsapp.net";

fn handle(raw: &str) -> Handle {
    Handle::parse(raw).expect("valid handle")
}

fn group() -> GroupMetadata {
    let participant = |id: &str, admin: bool| GroupParticipant {
        id: id.to_string(),
        alt_id: None,
        phone_number: None,
        admin,
    };
    GroupMetadata {
        subject: "Scenario group".to_string(),
        participants: vec![
            participant(BOT, true),
            participant(A, true),
            participant(B, false),
            participant(C, false),
        ],
    }
}

fn message(id: &str, author: &str, text: &str) -> InboundMessage {
    InboundMessage {
        key: MessageKey {
            chat_id: GROUP.to_string(),
            from_self: false,
            author_id: Some(author.to_string()),
            author_alt_id: None,
            message_id: id.to_string(),
        },
        content: MessageContent {
            text: Some(text.to_string()),
            ..MessageContent::default()
        },
    }
}

/// Recording transport whose delete directives fail.
struct FailingDeletes {
    inner: RecordingTransport,
    failed_deletes: AtomicUsize,
}

#[async_trait]
impl GroupTransport for FailingDeletes {
    fn bot_identities(&self) -> Vec<String> {
        self.inner.bot_identities()
    }

    async fn send_message(
        &self,
        chat_id: &str,
        content: OutboundContent,
        options: SendOptions,
    ) -> Result<Option<String>> {
        if matches!(content, OutboundContent::Delete { .. }) {
            self.failed_deletes.fetch_add(1, Ordering::SeqCst);
            bail!("delete rejected by network");
        }
        self.inner.send_message(chat_id, content, options).await
    }

    async fn group_metadata(&self, group_id: &str) -> Result<GroupMetadata> {
        self.inner.group_metadata(group_id).await
    }

    async fn group_participants_update(
        &self,
        group_id: &str,
        participants: &[Handle],
        action: ParticipantAction,
    ) -> Result<()> {
        self.inner
            .group_participants_update(group_id, participants, action)
            .await
    }
}

#[async_trait]
impl IdentityLookup for FailingDeletes {
    async fn alternate_handle(&self, _handle: &Handle) -> Result<Option<Handle>> {
        bail!("lookup service offline")
    }
}

struct Scenario {
    _dir: TempDir,
    store: Arc<Store>,
    transport: Arc<RecordingTransport>,
    router: CommandRouter,
}

async fn scenario(config: BotConfig) -> Scenario {
    let dir = tempdir().expect("tempdir");
    let store = Arc::new(Store::open(dir.path().join("store.json")).expect("store"));
    store
        .seed_allowlist(&[handle(A)])
        .await
        .expect("seed allowlist");
    let transport = Arc::new(RecordingTransport::new([BOT]).with_group(GROUP, group()));
    let router = CommandRouter::new(
        config,
        store.clone(),
        transport.clone(),
        IdentityResolver::new(transport.clone()),
    );
    Scenario {
        _dir: dir,
        store,
        transport,
        router,
    }
}

fn quiet() -> BotConfig {
    BotConfig {
        command_cooldown_ms: 0,
        fun_cooldown_ms: 0,
        group_action_spacing_ms: 0,
        ..BotConfig::default()
    }
}

#[tokio::test]
async fn integration_non_allowlisted_caller_gets_fixed_denial_without_mutation() {
    let scenario = scenario(quiet()).await;

    let outcome = scenario
        .router
        .handle(&message("m1", B, "!antilink on"))
        .await;

    assert_eq!(outcome, RouteOutcome::Denied(DenialReason::NotAllowlisted));
    assert_eq!(
        scenario.transport.sent_texts(GROUP),
        vec![replies::NOT_ALLOWLISTED.to_string()]
    );
    assert!(!scenario.store.get_moderation(GROUP).anti_link);
}

#[tokio::test]
async fn integration_allowlisted_admin_enables_antilink_and_link_is_enforced() {
    let scenario = scenario(quiet()).await;

    let outcome = scenario
        .router
        .handle(&message("m1", A, "!antilink on"))
        .await;
    assert_eq!(outcome, RouteOutcome::Executed);
    assert!(scenario.store.get_moderation(GROUP).anti_link);
    assert_eq!(
        scenario.transport.sent_texts(GROUP),
        vec!["✅ Anti-link enabled.".to_string()]
    );
    scenario.transport.take_actions();

    let outcome = scenario
        .router
        .handle(&message("m2", C, "look at example.org"))
        .await;
    assert_eq!(outcome, RouteOutcome::Moderated);
    assert_eq!(scenario.transport.deleted_message_ids(GROUP), vec!["m2".to_string()]);
    let actions = scenario.transport.take_actions();
    match actions.as_slice() {
        [RecordedAction::Send {
            content: OutboundContent::Delete { .. },
            ..
        }, RecordedAction::Send {
            content: OutboundContent::Text { text, mentions },
            ..
        }] => {
            assert_eq!(text, "⚠️ @15550000003 links are not allowed in this group.");
            assert_eq!(mentions, &vec![handle(C)]);
        }
        other => panic!("unexpected actions: {other:?}"),
    }

    scenario
        .router
        .handle(&message("m3", C, "again www.example.org"))
        .await;
    let actions = scenario.transport.take_actions();
    assert_eq!(actions.len(), 1, "second warning suppressed");
}

#[tokio::test]
async fn integration_unban_by_phone_literal_removes_single_entry() {
    let scenario = scenario(quiet()).await;
    scenario
        .store
        .add_bans(GROUP, &[handle("15551234567@s.whatsapp.net"), handle(B)])
        .await
        .expect("ban");

    let outcome = scenario
        .router
        .handle(&message("m1", A, "!unban +1-555-123-4567"))
        .await;

    assert_eq!(outcome, RouteOutcome::Executed);
    assert_eq!(scenario.store.list_bans(GROUP), vec![handle(B)]);
    assert_eq!(scenario.transport.deleted_message_ids(GROUP), vec!["m1".to_string()]);
}

#[tokio::test]
async fn regression_transport_failures_degrade_only_the_side_effect() {
    let dir = tempdir().expect("tempdir");
    let store = Arc::new(Store::open(dir.path().join("store.json")).expect("store"));
    store
        .set_moderation_flag(GROUP, warden_store::ModerationFlag::AntiLink, true)
        .await
        .expect("flag");
    let transport = Arc::new(FailingDeletes {
        inner: RecordingTransport::new([BOT]).with_group(GROUP, group()),
        failed_deletes: AtomicUsize::new(0),
    });
    let router = CommandRouter::new(
        quiet(),
        store,
        transport.clone(),
        IdentityResolver::new(transport.clone()),
    );

    let outcome = router
        .handle(&message("m1", C, "https://spam.example"))
        .await;

    assert_eq!(outcome, RouteOutcome::Moderated);
    assert_eq!(transport.failed_deletes.load(Ordering::SeqCst), 1);
    let texts = transport.inner.sent_texts(GROUP);
    assert_eq!(texts.len(), 1, "warning still sent");
    assert!(texts[0].contains("links are not allowed"));
}
