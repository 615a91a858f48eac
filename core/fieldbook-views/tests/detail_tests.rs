use fieldbook_broadcast::{BroadcastMessage, InProcessBus};
use fieldbook_sync::{
    DeleteOutcome, DeleteWorkflow, MemoryStore, SyncContext, SyncError,
    transport::mock::MockTransport,
};
use fieldbook_types::{
    CreateEntryError, DataObject, DataObjectError, DataType, DataValue, Definition, Entry,
    Experience, ExperienceId, ExperienceSyncErrors, OnSyncedData, OnlineStatus, Page,
};
use fieldbook_views::Host;
use fieldbook_views::detail::{
    DeleteSubstate, DetailAction, DetailMachine, DetailState, DetailValue, NOTICE_TIMEOUT,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn make_context(transport: Arc<MockTransport>) -> SyncContext {
    SyncContext::new(
        transport,
        Arc::new(MemoryStore::new()),
        Arc::new(InProcessBus::new()),
    )
}

fn experience_with_entry(id: &str) -> Experience {
    let definition = Definition::new("def-1".into(), "weight", DataType::Integer);
    let mut experience = Experience::new(ExperienceId::from(id), "workouts", vec![definition]);
    let entry = Entry::new(
        "ent-1".into(),
        experience.id.clone(),
        vec![DataObject::new(
            "dob-1".into(),
            "def-1".into(),
            DataValue::Integer(7),
        )],
        chrono::Utc::now(),
    );
    experience.entries = Page::from_items(vec![entry]);
    experience
}

async fn mounted_host(ctx: &SyncContext, id: &str) -> Host<DetailMachine> {
    let mut host = Host::new(DetailState::initial(ExperienceId::from(id)));
    host.apply_and_settle(DetailAction::Mounted, ctx).await;
    host
}

fn data_of(state: &DetailState) -> &fieldbook_views::detail::DetailData {
    match &state.value {
        DetailValue::Data(data) => data,
        other => panic!("expected data state, got {other:?}"),
    }
}

// ── Loading ──────────────────────────────────────────────────────

#[tokio::test]
async fn mount_fetches_online_experience() {
    let transport = Arc::new(MockTransport::new());
    transport.script_fetch_detail(Ok(experience_with_entry("exp-1")));
    let ctx = make_context(transport);

    let host = mounted_host(&ctx, "exp-1").await;
    let data = data_of(host.state());
    assert_eq!(data.status, OnlineStatus::Online);
    assert_eq!(data.experience.entries.len(), 1);
    assert!(data.displayed_errors.is_empty());
}

#[tokio::test]
async fn mount_reads_offline_experience_from_the_cache() {
    let transport = Arc::new(MockTransport::new());
    let ctx = make_context(transport.clone());
    let offline = Experience::offline("workouts", Vec::new());
    ctx.ledgers
        .write()
        .await
        .unsynced
        .insert_offline_experience(offline.clone());

    let host = mounted_host(&ctx, offline.id.as_str()).await;
    let data = data_of(host.state());
    assert_eq!(data.status, OnlineStatus::Offline);
    // No network round trip for an offline id.
    assert_eq!(transport.calls().fetch_detail, 0);
}

#[tokio::test]
async fn ledgered_errors_fold_into_display_on_load() {
    let transport = Arc::new(MockTransport::new());
    transport.script_fetch_detail(Ok(experience_with_entry("exp-1")));
    let ctx = make_context(transport);

    let mut errors = ExperienceSyncErrors::default();
    errors.create_entries.insert(
        "ent-1".into(),
        CreateEntryError {
            error: None,
            data_objects: vec![DataObjectError {
                index: 0,
                error: Some("is invalid".into()),
                ..Default::default()
            }],
        },
    );
    ctx.ledgers
        .write()
        .await
        .errors
        .write(ExperienceId::from("exp-1"), errors);

    let host = mounted_host(&ctx, "exp-1").await;
    let data = data_of(host.state());
    assert_eq!(data.status, OnlineStatus::PartOffline);
    assert_eq!(data.displayed_errors.entries.len(), 1);
    assert_eq!(data.displayed_errors.entries[0].index, 1);
    assert_eq!(
        data.displayed_errors.entries[0].errors,
        vec![(String::new(), "is invalid".to_string())]
    );
}

#[tokio::test]
async fn stale_fetch_result_is_dropped() {
    let transport = Arc::new(MockTransport::new());
    transport.script_fetch_detail(Ok(experience_with_entry("exp-1")));
    let ctx = make_context(transport);
    let mut host = mounted_host(&ctx, "exp-1").await;

    // A duplicate fetch result arriving in `data` must not reset state.
    host.apply_and_settle(DetailAction::ToggleMenu, &ctx).await;
    host.apply_and_settle(
        DetailAction::Loaded {
            experience: experience_with_entry("exp-1"),
            errors: None,
        },
        &ctx,
    )
    .await;
    assert!(data_of(host.state()).menu_open);
}

// ── Delete workflow ──────────────────────────────────────────────

#[tokio::test]
async fn request_then_cancel_resolves_ledger_and_navigates_back() {
    let transport = Arc::new(MockTransport::new());
    transport.script_fetch_detail(Ok(experience_with_entry("exp-1")));
    let ctx = make_context(transport);
    let mut host = mounted_host(&ctx, "exp-1").await;

    host.apply_and_settle(DetailAction::RequestDelete, &ctx).await;
    assert_eq!(data_of(host.state()).delete, DeleteSubstate::Confirming);
    assert_eq!(
        ctx.ledgers.read().await.delete.current(),
        Some(&DeleteWorkflow::Requested {
            id: ExperienceId::from("exp-1")
        })
    );

    host.apply_and_settle(DetailAction::CancelDelete, &ctx).await;
    let data = data_of(host.state());
    assert_eq!(data.delete, DeleteSubstate::Idle);
    assert!(data.closed);

    // The next reader consumes `cancelled` exactly once.
    let taken = ctx.ledgers.write().await.delete.take_resolved();
    assert_eq!(
        taken,
        Some(DeleteWorkflow::Cancelled {
            id: ExperienceId::from("exp-1"),
            title: "workouts".into()
        })
    );
    assert!(ctx.ledgers.write().await.delete.take_resolved().is_none());
}

#[tokio::test]
async fn confirmed_delete_broadcasts_and_records_ledger() {
    let transport = Arc::new(MockTransport::new());
    transport.script_fetch_detail(Ok(experience_with_entry("exp-1")));
    let bus: Arc<InProcessBus> = Arc::new(InProcessBus::new());
    let ctx = SyncContext::new(transport, Arc::new(MemoryStore::new()), bus.clone());
    // A second tab on the same bus.
    let other_tab = fieldbook_broadcast::Broadcaster::new(bus);
    let mut subscription = other_tab.subscribe();

    let mut host = mounted_host(&ctx, "exp-1").await;
    host.apply_and_settle(DetailAction::RequestDelete, &ctx).await;
    host.apply_and_settle(DetailAction::ConfirmDelete, &ctx).await;
    host.settle(&ctx).await;

    let data = data_of(host.state());
    assert!(data.closed);
    assert!(matches!(
        ctx.ledgers.read().await.delete.current(),
        Some(DeleteWorkflow::Deleted { .. })
    ));
    match subscription.recv().await {
        Some(BroadcastMessage::EntityDeleted { id, title }) => {
            assert_eq!(id, ExperienceId::from("exp-1"));
            assert_eq!(title, "workouts");
        }
        other => panic!("expected deletion broadcast, got {other:?}"),
    }
}

#[tokio::test]
async fn failed_delete_shows_auto_dismissing_notice() {
    let transport = Arc::new(MockTransport::new());
    transport.script_fetch_detail(Ok(experience_with_entry("exp-1")));
    transport.script_delete_experiences(Ok(vec![DeleteOutcome::Failed {
        id: ExperienceId::from("exp-1"),
        error: "not yours".into(),
    }]));
    let ctx = make_context(transport);
    let mut host = mounted_host(&ctx, "exp-1").await;

    host.apply_and_settle(DetailAction::RequestDelete, &ctx).await;
    host.apply_and_settle(DetailAction::ConfirmDelete, &ctx).await;

    let data = data_of(host.state());
    assert_eq!(data.delete, DeleteSubstate::Idle);
    assert_eq!(data.notice.as_deref(), Some("not yours"));
    assert!(!data.closed);
}

#[tokio::test(start_paused = true)]
async fn notice_dismisses_itself_after_the_timeout() {
    let transport = Arc::new(MockTransport::new());
    transport.script_fetch_detail(Ok(experience_with_entry("exp-1")));
    let ctx = make_context(transport);
    let mut host = mounted_host(&ctx, "exp-1").await;

    host.apply_and_settle(
        DetailAction::ShowNotice {
            message: "saved".into(),
        },
        &ctx,
    )
    .await;
    assert_eq!(data_of(host.state()).notice.as_deref(), Some("saved"));

    tokio::time::sleep(NOTICE_TIMEOUT + std::time::Duration::from_secs(1)).await;
    host.settle(&ctx).await;
    assert_eq!(data_of(host.state()).notice, None);
}

#[tokio::test(start_paused = true)]
async fn manual_dismiss_cancels_the_timer() {
    let transport = Arc::new(MockTransport::new());
    transport.script_fetch_detail(Ok(experience_with_entry("exp-1")));
    let ctx = make_context(transport);
    let mut host = mounted_host(&ctx, "exp-1").await;

    host.apply_and_settle(
        DetailAction::ShowNotice {
            message: "saved".into(),
        },
        &ctx,
    )
    .await;
    host.apply_and_settle(DetailAction::DismissNotice, &ctx).await;

    // The cleared timer never fires; a fired-then-cleared timer would
    // also be harmless, but here the handle is gone entirely.
    tokio::time::sleep(NOTICE_TIMEOUT + std::time::Duration::from_secs(1)).await;
    host.settle(&ctx).await;
    assert_eq!(data_of(host.state()).notice, None);
}

// ── Sync application ─────────────────────────────────────────────

#[tokio::test]
async fn sync_received_swaps_experience_and_entries() {
    let transport = Arc::new(MockTransport::new());
    let ctx = make_context(transport);
    let mut offline = Experience::offline("workouts", Vec::new());
    let entry = Entry::offline(offline.id.clone(), Vec::new());
    offline.entries = Page::from_items(vec![entry.clone()]);
    ctx.ledgers
        .write()
        .await
        .unsynced
        .insert_offline_experience(offline.clone());

    let mut host = mounted_host(&ctx, offline.id.as_str()).await;
    assert_eq!(data_of(host.state()).status, OnlineStatus::Offline);

    let mut server_entry = entry.clone();
    server_entry.id = "ent-1".into();
    server_entry.experience_id = ExperienceId::from("exp-1");
    let mut synced = OnSyncedData::default();
    synced
        .offline_experience_map
        .insert(offline.id.clone(), ExperienceId::from("exp-1"));
    synced.synced_entries.insert(
        ExperienceId::from("exp-1"),
        [(entry.id.clone(), server_entry.clone())].into_iter().collect(),
    );

    host.apply_and_settle(DetailAction::SyncReceived(synced.clone()), &ctx)
        .await;
    let data = data_of(host.state());
    assert_eq!(data.experience.id, ExperienceId::from("exp-1"));
    assert_eq!(data.experience.entries.items[0].id, server_entry.id);
    assert_eq!(data.status, OnlineStatus::Online);

    // Idempotent: the same payload applied again is a no-op.
    let before = data.clone();
    host.apply_and_settle(DetailAction::SyncReceived(synced), &ctx)
        .await;
    assert_eq!(data_of(host.state()), &before);
}

#[tokio::test]
async fn optimistic_entry_error_removal() {
    let transport = Arc::new(MockTransport::new());
    transport.script_fetch_detail(Ok(experience_with_entry("exp-1")));
    let ctx = make_context(transport);
    let mut errors = ExperienceSyncErrors::default();
    errors
        .create_entries
        .insert("ent-1".into(), CreateEntryError::general("bad"));
    ctx.ledgers
        .write()
        .await
        .errors
        .write(ExperienceId::from("exp-1"), errors);

    let mut host = mounted_host(&ctx, "exp-1").await;
    assert_eq!(data_of(host.state()).displayed_errors.entries.len(), 1);

    // The user resubmits the entry; its line disappears before any
    // round trip completes. The ledger itself is untouched.
    host.apply_and_settle(
        DetailAction::EntryErrorResolved {
            entry_id: "ent-1".into(),
        },
        &ctx,
    )
    .await;
    assert!(data_of(host.state()).displayed_errors.entries.is_empty());
    assert!(
        ctx.ledgers
            .read()
            .await
            .errors
            .contains(&ExperienceId::from("exp-1"))
    );
}

#[tokio::test]
async fn deletion_in_another_tab_closes_this_view() {
    let transport = Arc::new(MockTransport::new());
    transport.script_fetch_detail(Ok(experience_with_entry("exp-1")));
    let ctx = make_context(transport);
    let mut host = mounted_host(&ctx, "exp-1").await;

    host.apply_and_settle(
        DetailAction::EntityDeleted {
            id: ExperienceId::from("exp-1"),
        },
        &ctx,
    )
    .await;
    assert!(data_of(host.state()).closed);
}

#[tokio::test]
async fn transport_failure_with_known_connectivity_shows_error() {
    let transport = Arc::new(MockTransport::new());
    transport.script_fetch_detail(Err(SyncError::Network("boom".into())));
    let ctx = make_context(transport);
    ctx.connectivity.emit(true);

    let host = mounted_host(&ctx, "exp-1").await;
    assert!(matches!(host.state().value, DetailValue::Errors { .. }));
}

#[tokio::test]
async fn broadcast_messages_map_onto_actions() {
    use fieldbook_views::Machine;
    let action = DetailMachine::from_broadcast(BroadcastMessage::ConnectionChanged {
        connected: true,
    });
    assert!(matches!(
        action,
        Some(DetailAction::ConnectionChanged { connected: true })
    ));
}
