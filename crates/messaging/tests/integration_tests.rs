use chrono::{TimeZone, Utc};
use courier_config::{DatabaseConfig, MessagingConfig};
use courier_database::{
    initialize_database, Attachment, ConversationFilter, ConversationFlags, EventPriority,
    NotificationStatus, Participant, ParticipantRole, Priority, StoreMode, UnreadCounters, Urgency,
};
use courier_messaging::{
    BroadcastRequest, ClientCache, Delta, DomainEvent, ErrorKind, FanoutHub, ManualClock,
    MessagingCore, MessagingError, MessagingResult, NotificationDispatcher, NotificationPoller,
    OutgoingMessage, ParticipantDirectory, StaticDirectory, SubscriptionState, SystemClock,
};
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn directory() -> StaticDirectory {
    StaticDirectory::new([
        Participant::new("alice", "Alice", ParticipantRole::User),
        Participant::new("bob", "Bob", ParticipantRole::User),
        Participant::new("carol", "Carol", ParticipantRole::User),
        Participant::new("dave", "Dave", ParticipantRole::User),
        Participant::new("admin", "Admin", ParticipantRole::Admin),
    ])
}

async fn file_pool() -> (SqlitePool, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let config = DatabaseConfig {
        url: format!("sqlite://{}", temp_dir.path().join("courier.db").display()),
        max_connections: 8,
        busy_timeout_ms: 5000,
    };
    let pool = initialize_database(&config, StoreMode::Durable).await.unwrap();
    (pool, temp_dir)
}

async fn memory_pool() -> SqlitePool {
    initialize_database(&DatabaseConfig::default(), StoreMode::Ephemeral)
        .await
        .unwrap()
}

async fn core() -> (MessagingCore<StaticDirectory>, TempDir) {
    let (pool, dir) = file_pool().await;
    (MessagingCore::new(pool, directory(), &MessagingConfig::default()), dir)
}

/// Resolves like [`directory`] but never answers for one participant.
struct StallingDirectory {
    inner: StaticDirectory,
    stalled: &'static str,
    lookups: Arc<AtomicUsize>,
}

impl ParticipantDirectory for StallingDirectory {
    async fn resolve_participant(&self, id: &str) -> MessagingResult<Participant> {
        if id == self.stalled {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        self.inner.resolve_participant(id).await
    }
}

fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()))
}

#[tokio::test]
async fn conversation_pair_is_canonical() {
    let (core, _dir) = core().await;

    let first = core.registry().get_or_create("bob", "alice").await.unwrap();
    let second = core.registry().get_or_create("alice", "bob").await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.participant_a, "alice");
    assert_eq!(first.participant_b, "bob");
    assert_eq!(core.registry().list("alice", ConversationFilter::All).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_get_or_create_yields_one_conversation() {
    let (core, _dir) = core().await;

    let mut handles = Vec::new();
    for index in 0..10 {
        let core = core.clone();
        handles.push(tokio::spawn(async move {
            let (first, second) = if index % 2 == 0 { ("alice", "bob") } else { ("bob", "alice") };
            core.registry().get_or_create(first, second).await.unwrap().id
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap());
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
}

#[tokio::test]
async fn registry_rejects_self_and_unknown_participants() {
    let (core, _dir) = core().await;

    let self_pair = core.registry().get_or_create("alice", "alice").await.unwrap_err();
    assert_eq!(self_pair, MessagingError::SelfMessage);

    let unknown = core.registry().get_or_create("alice", "mallory").await.unwrap_err();
    assert_eq!(unknown.kind(), ErrorKind::UnknownParticipant);

    let empty = core.registry().get_or_create("", "bob").await.unwrap_err();
    assert_eq!(empty.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn end_to_end_unread_flow() {
    let (core, _dir) = core().await;
    let conversation = core.registry().get_or_create("alice", "bob").await.unwrap();

    let hello = core
        .messages()
        .append(OutgoingMessage::text(&conversation.id, "alice", "bob", "Hello"))
        .await
        .unwrap();
    assert!(!hello.is_read);
    assert_eq!(core.messages().unread_count(&conversation.id, "bob").await.unwrap(), 1);
    assert_eq!(core.messages().unread_count(&conversation.id, "alice").await.unwrap(), 0);

    let stored = core.registry().get(&conversation.id).await.unwrap();
    assert_eq!(stored.last_message_preview.as_deref(), Some("Hello"));
    assert_eq!(stored.last_message_at.as_deref(), Some(hello.created_at.as_str()));

    let marked = core.messages().mark_read(&conversation.id, "bob").await.unwrap();
    assert_eq!(marked, 1);
    assert_eq!(core.messages().unread_count(&conversation.id, "bob").await.unwrap(), 0);

    core.messages()
        .append(OutgoingMessage::text(&conversation.id, "alice", "bob", "Still there?"))
        .await
        .unwrap();
    assert_eq!(core.messages().unread_count(&conversation.id, "bob").await.unwrap(), 1);

    let messages = core
        .messages()
        .list_by_conversation(&conversation.id, None, None)
        .await
        .unwrap();
    let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["Hello", "Still there?"]);
    assert!(messages[0].is_read);
    assert!(!messages[1].is_read);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn counters_match_recount_under_concurrent_writes() {
    let (pool, _dir) = file_pool().await;
    let core = MessagingCore::new(pool.clone(), directory(), &MessagingConfig::default());
    let conversation = core.registry().get_or_create("alice", "bob").await.unwrap();

    let mut handles = Vec::new();
    for index in 0..20 {
        let core = core.clone();
        let conversation_id = conversation.id.clone();
        handles.push(tokio::spawn(async move {
            core.messages()
                .append(OutgoingMessage::text(&conversation_id, "alice", "bob", format!("ping {index}")))
                .await
                .unwrap();
            if index % 5 == 0 {
                core.messages().mark_read(&conversation_id, "bob").await.unwrap();
            }
            core.messages()
                .append(OutgoingMessage::text(&conversation_id, "bob", "alice", format!("pong {index}")))
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let stored = core.registry().get(&conversation.id).await.unwrap();
    assert_eq!(
        stored.unread_count_b,
        UnreadCounters::recount(&pool, &conversation.id, "bob").await.unwrap()
    );
    assert_eq!(stored.unread_count_a, 20);
    assert_eq!(
        stored.unread_count_a,
        UnreadCounters::recount(&pool, &conversation.id, "alice").await.unwrap()
    );

    core.messages().mark_read(&conversation.id, "bob").await.unwrap();
    assert_eq!(core.messages().unread_count(&conversation.id, "bob").await.unwrap(), 0);
    assert_eq!(UnreadCounters::recount(&pool, &conversation.id, "bob").await.unwrap(), 0);
}

#[tokio::test]
async fn mark_read_only_touches_the_readers_side() {
    let (core, _dir) = core().await;
    let conversation = core.registry().get_or_create("alice", "bob").await.unwrap();

    for content in ["one", "two"] {
        core.messages()
            .append(OutgoingMessage::text(&conversation.id, "alice", "bob", content))
            .await
            .unwrap();
    }
    core.messages()
        .append(OutgoingMessage::text(&conversation.id, "bob", "alice", "three"))
        .await
        .unwrap();

    assert_eq!(core.messages().mark_read(&conversation.id, "bob").await.unwrap(), 2);
    assert_eq!(core.messages().mark_read(&conversation.id, "bob").await.unwrap(), 0);
    assert_eq!(core.messages().unread_count(&conversation.id, "alice").await.unwrap(), 1);

    let outsider = core.messages().mark_read(&conversation.id, "carol").await.unwrap_err();
    assert_eq!(outsider.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn append_validation_errors() {
    let (core, _dir) = core().await;
    let conversation = core.registry().get_or_create("alice", "bob").await.unwrap();
    let messages = core.messages();

    let empty = messages
        .append(OutgoingMessage::text(&conversation.id, "alice", "bob", "   "))
        .await
        .unwrap_err();
    assert_eq!(empty.kind(), ErrorKind::Validation);

    let own = messages
        .append(OutgoingMessage::text(&conversation.id, "alice", "alice", "hi"))
        .await
        .unwrap_err();
    assert_eq!(own, MessagingError::SelfMessage);

    let missing = messages
        .append(OutgoingMessage::text("no-such-conversation", "alice", "bob", "hi"))
        .await
        .unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);

    let wrong_pair = messages
        .append(OutgoingMessage::text(&conversation.id, "alice", "carol", "hi"))
        .await
        .unwrap_err();
    assert_eq!(wrong_pair.kind(), ErrorKind::Forbidden);

    let too_long = messages
        .append(OutgoingMessage::text(&conversation.id, "alice", "bob", "x".repeat(10_001)))
        .await
        .unwrap_err();
    assert_eq!(too_long.kind(), ErrorKind::Validation);

    assert_eq!(messages.unread_count(&conversation.id, "bob").await.unwrap(), 0);
}

#[tokio::test]
async fn attachment_only_message_previews_file_name() {
    let (core, _dir) = core().await;
    let conversation = core.registry().get_or_create("alice", "bob").await.unwrap();

    let attachment = Attachment {
        id: "att-1".into(),
        name: "report.pdf".into(),
        mime_type: "application/pdf".into(),
        url: "https://files.example/report.pdf".into(),
        size_bytes: 2048,
    };
    let message = core
        .messages()
        .append(OutgoingMessage::text(&conversation.id, "alice", "bob", "").with_attachments(vec![attachment]))
        .await
        .unwrap();

    assert_eq!(message.attachments.len(), 1);
    let stored = core.registry().get(&conversation.id).await.unwrap();
    assert_eq!(stored.last_message_preview.as_deref(), Some("📎 report.pdf"));
}

#[tokio::test]
async fn replies_must_target_the_same_conversation() {
    let (core, _dir) = core().await;
    let with_bob = core.registry().get_or_create("alice", "bob").await.unwrap();
    let with_carol = core.registry().get_or_create("alice", "carol").await.unwrap();

    let original = core
        .messages()
        .append(OutgoingMessage::text(&with_bob.id, "alice", "bob", "Lunch?"))
        .await
        .unwrap();

    let reply = core
        .messages()
        .append(OutgoingMessage::text(&with_bob.id, "bob", "alice", "Sure").replying_to(&original.id))
        .await
        .unwrap();
    assert_eq!(reply.reply_to_id.as_deref(), Some(original.id.as_str()));

    let cross = core
        .messages()
        .append(OutgoingMessage::text(&with_carol.id, "carol", "alice", "Me too").replying_to(&original.id))
        .await
        .unwrap_err();
    assert_eq!(cross.kind(), ErrorKind::InvalidReply);

    let dangling = core
        .messages()
        .append(OutgoingMessage::text(&with_bob.id, "bob", "alice", "?").replying_to("missing"))
        .await
        .unwrap_err();
    assert_eq!(dangling.kind(), ErrorKind::InvalidReply);
    assert_eq!(core.messages().unread_count(&with_bob.id, "alice").await.unwrap(), 1);
}

#[tokio::test]
async fn admin_origin_follows_sender_role() {
    let (core, _dir) = core().await;
    let conversation = core.registry().get_or_create("admin", "bob").await.unwrap();

    let message = core
        .messages()
        .append(
            OutgoingMessage::text(&conversation.id, "admin", "bob", "Maintenance tonight")
                .with_priority(Priority::Urgent),
        )
        .await
        .unwrap();

    assert!(message.is_admin_origin);
    assert_eq!(message.priority, Priority::Urgent);
}

#[tokio::test]
async fn since_id_returns_strictly_later_messages() {
    let pool = memory_pool().await;
    let clock = manual_clock();
    let core = MessagingCore::with_clock(pool, directory(), &MessagingConfig::default(), clock.clone());
    let conversation = core.registry().get_or_create("alice", "bob").await.unwrap();

    let mut ids = Vec::new();
    for index in 0..4 {
        let message = core
            .messages()
            .append(OutgoingMessage::text(&conversation.id, "alice", "bob", format!("m{index}")))
            .await
            .unwrap();
        ids.push(message.id);
        if index % 2 == 1 {
            clock.advance(chrono::Duration::seconds(1));
        }
    }

    let later = core
        .messages()
        .list_by_conversation(&conversation.id, Some(&ids[1]), None)
        .await
        .unwrap();
    let later_ids: Vec<&str> = later.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(later_ids, vec![ids[2].as_str(), ids[3].as_str()]);

    let limited = core
        .messages()
        .list_by_conversation(&conversation.id, None, Some(2))
        .await
        .unwrap();
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[0].id, ids[0]);

    let foreign = core
        .messages()
        .list_by_conversation(&conversation.id, Some("missing"), None)
        .await
        .unwrap_err();
    assert_eq!(foreign.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn resync_after_a_backward_clock_step_still_returns_the_next_message() {
    let pool = memory_pool().await;
    let clock = manual_clock();
    let core = MessagingCore::with_clock(pool, directory(), &MessagingConfig::default(), clock.clone());
    let conversation = core.registry().get_or_create("alice", "bob").await.unwrap();

    clock.advance(chrono::Duration::seconds(10));
    let first = core
        .messages()
        .append(OutgoingMessage::text(&conversation.id, "alice", "bob", "first"))
        .await
        .unwrap();
    clock.advance(chrono::Duration::seconds(-1));
    let second = core
        .messages()
        .append(OutgoingMessage::text(&conversation.id, "bob", "alice", "second"))
        .await
        .unwrap();

    assert!(second.created_at >= first.created_at);
    let batch = core.resync(&conversation.id, "alice", Some(first.id.as_str())).await.unwrap();
    let resynced: Vec<&str> = batch.messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(resynced, vec![second.id.as_str()]);
}

#[tokio::test]
async fn soft_delete_removes_the_text_from_the_conversation_preview() {
    let (core, _dir) = core().await;
    let conversation = core.registry().get_or_create("alice", "bob").await.unwrap();
    core.messages()
        .append(OutgoingMessage::text(&conversation.id, "alice", "bob", "see you at 9"))
        .await
        .unwrap();
    let secret = core
        .messages()
        .append(OutgoingMessage::text(&conversation.id, "alice", "bob", "secret password 1234"))
        .await
        .unwrap();

    core.messages().soft_delete(&secret.id, "alice").await.unwrap();

    let refreshed = core.registry().get(&conversation.id).await.unwrap();
    assert_eq!(refreshed.last_message_preview.as_deref(), Some("see you at 9"));
}

#[tokio::test]
async fn soft_delete_keeps_a_tombstone_and_releases_the_counter() {
    let (core, _dir) = core().await;
    let conversation = core.registry().get_or_create("alice", "bob").await.unwrap();
    let message = core
        .messages()
        .append(OutgoingMessage::text(&conversation.id, "alice", "bob", "oops"))
        .await
        .unwrap();

    let forbidden = core.messages().soft_delete(&message.id, "bob").await.unwrap_err();
    assert_eq!(forbidden.kind(), ErrorKind::Forbidden);

    let deleted = core.messages().soft_delete(&message.id, "alice").await.unwrap();
    assert!(deleted.is_deleted);
    assert!(deleted.deleted_at.is_some());
    assert_eq!(core.messages().unread_count(&conversation.id, "bob").await.unwrap(), 0);

    let again = core.messages().soft_delete(&message.id, "alice").await.unwrap();
    assert_eq!(again.deleted_at, deleted.deleted_at);
    assert_eq!(core.messages().unread_count(&conversation.id, "bob").await.unwrap(), 0);

    let listed = core
        .messages()
        .list_by_conversation(&conversation.id, None, None)
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].is_deleted);

    let react = core.messages().react(&message.id, "bob", "👍").await.unwrap_err();
    assert_eq!(react.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn reactions_and_stars_are_per_participant() {
    let (core, _dir) = core().await;
    let conversation = core.registry().get_or_create("alice", "bob").await.unwrap();
    let message = core
        .messages()
        .append(OutgoingMessage::text(&conversation.id, "alice", "bob", "Shipped!"))
        .await
        .unwrap();

    core.messages().react(&message.id, "bob", "🎉").await.unwrap();
    core.messages().react(&message.id, "bob", "🎉").await.unwrap();
    let reacted = core.messages().react(&message.id, "alice", "🎉").await.unwrap();
    assert_eq!(reacted.reactions.get("🎉"), Some(&2));

    core.messages().star(&message.id, "bob").await.unwrap();
    let starred = core.messages().star(&message.id, "bob").await.unwrap();
    assert_eq!(starred.star_count, 1);

    let outsider = core.messages().star(&message.id, "carol").await.unwrap_err();
    assert_eq!(outsider.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn archived_conversations_keep_their_history() {
    let (core, _dir) = core().await;
    let conversation = core.registry().get_or_create("alice", "bob").await.unwrap();
    core.messages()
        .append(OutgoingMessage::text(&conversation.id, "alice", "bob", "Archive me"))
        .await
        .unwrap();

    let archived = core
        .registry()
        .set_flags(
            &conversation.id,
            ConversationFlags {
                archived: Some(true),
                ..ConversationFlags::default()
            },
        )
        .await
        .unwrap();
    assert!(archived.is_archived);

    assert!(core.registry().list("alice", ConversationFilter::All).await.unwrap().is_empty());
    assert_eq!(core.registry().list("alice", ConversationFilter::Archived).await.unwrap().len(), 1);

    let history = core
        .messages()
        .list_by_conversation(&conversation.id, None, None)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(archived.unread_count_b, 1);
}

#[tokio::test]
async fn delete_removes_conversation_and_messages() {
    let (core, _dir) = core().await;
    let conversation = core.registry().get_or_create("alice", "bob").await.unwrap();
    core.messages()
        .append(OutgoingMessage::text(&conversation.id, "alice", "bob", "bye"))
        .await
        .unwrap();

    core.registry().delete(&conversation.id).await.unwrap();

    let gone = core.registry().get(&conversation.id).await.unwrap_err();
    assert_eq!(gone.kind(), ErrorKind::NotFound);
    let listing = core
        .messages()
        .list_by_conversation(&conversation.id, None, None)
        .await
        .unwrap_err();
    assert_eq!(listing.kind(), ErrorKind::NotFound);

    let again = core.registry().delete(&conversation.id).await.unwrap_err();
    assert_eq!(again.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn broadcast_reports_partial_failure() {
    let (core, _dir) = core().await;

    let request = BroadcastRequest::new(
        "admin",
        "System maintenance at 22:00",
        vec![
            "alice".to_string(),
            "ghost-1".to_string(),
            "bob".to_string(),
            "ghost-2".to_string(),
            "carol".to_string(),
        ],
    );
    let summary = core.broadcasts().broadcast(request).await;

    assert_eq!(summary.requested, 5);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.failed.len(), 2);
    for failure in &summary.failed {
        assert_eq!(failure.error_kind, ErrorKind::UnknownParticipant);
        assert_eq!(failure.attempts, 1);
    }
    let delivered: Vec<&str> = summary.delivered.iter().map(|d| d.recipient_id.as_str()).collect();
    assert_eq!(delivered, vec!["alice", "bob", "carol"]);

    for delivery in &summary.delivered {
        let messages = core
            .messages()
            .list_by_conversation(&delivery.conversation_id, None, None)
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, delivery.message_id);
        assert!(messages[0].is_admin_origin);
        assert_eq!(
            core.messages()
                .unread_count(&delivery.conversation_id, &delivery.recipient_id)
                .await
                .unwrap(),
            1
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn broadcast_times_out_a_stalled_recipient_without_holding_up_the_rest() {
    let (pool, _dir) = file_pool().await;
    let lookups = Arc::new(AtomicUsize::new(0));
    let stalling = StallingDirectory {
        inner: directory(),
        stalled: "dave",
        lookups: Arc::clone(&lookups),
    };
    let mut config = MessagingConfig::default();
    config.broadcast.recipient_timeout_ms = 300;
    config.broadcast.max_attempts = 3;
    config.broadcast.retry_backoff_ms = 10;
    config.broadcast.concurrency = 4;
    let core = MessagingCore::new(pool, stalling, &config);

    let started = Instant::now();
    let summary = core
        .broadcasts()
        .broadcast(BroadcastRequest::new(
            "admin",
            "Inspection tomorrow",
            vec!["alice".to_string(), "dave".to_string(), "carol".to_string()],
        ))
        .await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(summary.requested, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed.len(), 1);
    let failure = &summary.failed[0];
    assert_eq!(failure.recipient_id, "dave");
    assert_eq!(failure.error_kind, ErrorKind::Timeout);
    assert_eq!(failure.attempts, 3);
    assert_eq!(lookups.load(Ordering::SeqCst), 3);

    let delivered: Vec<&str> = summary.delivered.iter().map(|d| d.recipient_id.as_str()).collect();
    assert_eq!(delivered, vec!["alice", "carol"]);
    for delivery in &summary.delivered {
        let messages = core
            .messages()
            .list_by_conversation(&delivery.conversation_id, None, None)
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
    }
}

#[tokio::test]
async fn committing_the_same_message_id_twice_stores_one_message() {
    let (core, _dir) = core().await;
    let conversation = core.registry().get_or_create("admin", "bob").await.unwrap();
    let outgoing = OutgoingMessage::text(&conversation.id, "admin", "bob", "Shift change at 6");

    let first = core.messages().commit("broadcast-bob-1", &outgoing).await.unwrap();
    let retry = core.messages().commit("broadcast-bob-1", &outgoing).await.unwrap();

    assert!(first.inserted);
    assert!(!retry.inserted);
    assert_eq!(retry.message.id, first.message.id);
    let messages = core
        .messages()
        .list_by_conversation(&conversation.id, None, None)
        .await
        .unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(core.messages().unread_count(&conversation.id, "bob").await.unwrap(), 1);
}

#[tokio::test]
async fn broadcast_deduplicates_recipients() {
    let (core, _dir) = core().await;

    let request = BroadcastRequest::new(
        "admin",
        "Hello twice?",
        vec!["alice".to_string(), "alice".to_string(), "bob".to_string()],
    );
    let summary = core.broadcasts().broadcast(request).await;

    assert_eq!(summary.requested, 2);
    assert_eq!(summary.succeeded, 2);
    let conversation = core.registry().get_or_create("admin", "alice").await.unwrap();
    assert_eq!(conversation.unread_count_b, 1);
}

#[tokio::test]
async fn subscribers_receive_deltas_and_cache_is_idempotent() {
    let (core, _dir) = core().await;
    let mut bob = core.subscribe_participant("bob").await;
    assert_eq!(bob.state(), SubscriptionState::Subscribed);

    let conversation = core.registry().get_or_create("alice", "bob").await.unwrap();
    core.messages()
        .append(OutgoingMessage::text(&conversation.id, "alice", "bob", "Hello"))
        .await
        .unwrap();
    core.messages().mark_read(&conversation.id, "bob").await.unwrap();

    let mut received = Vec::new();
    while let Some(delta) = bob.try_recv() {
        received.push(delta);
    }
    let names: Vec<&str> = received.iter().map(Delta::name).collect();
    assert_eq!(
        names,
        vec![
            "conversation_created",
            "message_created",
            "conversation_updated",
            "messages_read",
            "conversation_updated",
        ]
    );

    let mut cache = ClientCache::new();
    cache.apply_all(&received);
    let snapshot = cache.clone();
    assert_eq!(cache.apply_all(&received), 0);

    let cached = snapshot.conversation(&conversation.id).unwrap();
    assert_eq!(cached.unread_count_b, 0);
    let messages = snapshot.messages(&conversation.id);
    assert_eq!(messages.len(), 1);
    assert!(messages[0].is_read);

    // replaying the original create must not un-read the message
    cache.apply(&received[1]);
    assert!(cache.messages(&conversation.id)[0].is_read);
}

#[tokio::test]
async fn resync_catches_up_after_last_seen_message() {
    let (core, _dir) = core().await;
    let conversation = core.registry().get_or_create("alice", "bob").await.unwrap();
    let first = core
        .messages()
        .append(OutgoingMessage::text(&conversation.id, "alice", "bob", "one"))
        .await
        .unwrap();
    core.messages()
        .append(OutgoingMessage::text(&conversation.id, "alice", "bob", "two"))
        .await
        .unwrap();

    let batch = core.resync(&conversation.id, "bob", Some(&first.id)).await.unwrap();
    assert_eq!(batch.conversation.id, conversation.id);
    assert_eq!(batch.messages.len(), 1);
    assert_eq!(batch.messages[0].content, "two");

    let mut cache = ClientCache::new();
    cache.apply_all(&batch.into_deltas());
    assert_eq!(cache.conversation(&conversation.id).unwrap().unread_count_b, 2);

    let outsider = core.resync(&conversation.id, "carol", None).await.unwrap_err();
    assert_eq!(outsider.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn notification_dispatch_is_idempotent_and_derives_urgency() {
    let (core, _dir) = core().await;
    let mut feed = core.subscribe_notifications().await;

    let event = DomainEvent::new("report_submitted", "New report", "Batch 7 is ready")
        .with_event_id("evt-42")
        .with_subject("report:7")
        .with_priority(EventPriority::Critical);

    let first = core.notifications().dispatch(event.clone()).await.unwrap();
    let second = core.notifications().dispatch(event).await.unwrap();

    assert_eq!(first.id, "evt-42");
    assert_eq!(first, second);
    assert_eq!(first.urgency, Urgency::High);
    assert_eq!(first.status, NotificationStatus::Unread);

    assert!(matches!(feed.try_recv(), Some(Delta::NotificationCreated { .. })));
    assert!(feed.try_recv().is_none());

    let normal = core
        .notifications()
        .dispatch(DomainEvent::new("user_joined", "Welcome", "Dave joined"))
        .await
        .unwrap();
    assert_eq!(normal.urgency, Urgency::Normal);
    assert_eq!(core.notifications().unread_count().await.unwrap(), 2);

    let read = core.notifications().mark_read(&first.id).await.unwrap();
    assert_eq!(read.status, NotificationStatus::Read);
    let reread = core.notifications().mark_read(&first.id).await.unwrap();
    assert_eq!(reread.read_at, read.read_at);

    assert_eq!(core.notifications().mark_all_read().await.unwrap(), 1);
    assert_eq!(core.notifications().unread_count().await.unwrap(), 0);

    core.notifications().delete(&normal.id).await.unwrap();
    let missing = core.notifications().delete(&normal.id).await.unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);

    let invalid = core
        .notifications()
        .dispatch(DomainEvent::new("", "Untitled", ""))
        .await
        .unwrap_err();
    assert_eq!(invalid.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn poller_snapshots_until_shutdown() {
    let pool = memory_pool().await;
    let core = MessagingCore::new(pool.clone(), directory(), &MessagingConfig::default());
    assert_eq!(core.notification_poller().interval(), Duration::from_secs(30));

    let hub = FanoutHub::new(16);
    let dispatcher = Arc::new(NotificationDispatcher::new(
        pool,
        hub.clone(),
        Arc::new(SystemClock),
        Duration::from_secs(5),
    ));
    let poller = NotificationPoller::new(Arc::clone(&dispatcher), Duration::from_millis(20));
    let (mut snapshots, handle) = poller.spawn(hub.shutdown_receiver());

    let first = snapshots.recv().await.unwrap();
    assert_eq!(first.unread_count, 0);

    dispatcher
        .dispatch(DomainEvent::new("report_submitted", "Report", "Batch 8"))
        .await
        .unwrap();

    let latest = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let snapshot = snapshots.recv().await.unwrap();
            if snapshot.unread_count == 1 {
                break snapshot;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(latest.notifications.len(), 1);

    hub.shutdown();
    handle.await.unwrap();
    while snapshots.recv().await.is_some() {}
}

#[tokio::test]
async fn shutdown_closes_subscriptions() {
    let (core, _dir) = core().await;
    let mut alice = core.subscribe_participant("alice").await;

    core.shutdown();

    assert!(alice.recv().await.is_none());
    assert_eq!(alice.state(), SubscriptionState::Closed);
    assert_eq!(core.subscribe_participant("bob").await.state(), SubscriptionState::Closed);
}

#[tokio::test]
async fn ephemeral_store_round_trips_messages() {
    let pool = memory_pool().await;
    let core = MessagingCore::new(pool, directory(), &MessagingConfig::default());

    let conversation = core.registry().get_or_create("carol", "dave").await.unwrap();
    core.messages()
        .append(OutgoingMessage::text(&conversation.id, "dave", "carol", "in memory"))
        .await
        .unwrap();

    let listed = core.registry().list("carol", ConversationFilter::Unread).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].unread_count_a, 1);
}
