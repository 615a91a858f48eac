use async_trait::async_trait;
use fieldbook_broadcast::{BroadcastMessage, InProcessBus};
use fieldbook_sync::{
    DeleteOutcome, EntrySubmission, ExperienceSubmission, ExperienceUpdate, MemoryStore,
    SyncConfig, SyncContext, SyncCoordinator, SyncError, SyncResult, SyncTransport,
    UpdateSubmission, transport::mock::MockTransport,
};
use fieldbook_types::{
    DataObject, DataType, DataValue, Definition, Entry, Experience, ExperienceId, Page,
    Pagination,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

fn make_context(transport: Arc<dyn SyncTransport>) -> (SyncContext, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let ctx = SyncContext::new(transport, store.clone(), Arc::new(InProcessBus::new()));
    (ctx, store)
}

fn offline_experience() -> Experience {
    let definition = Definition::offline("weight", DataType::Integer);
    let mut experience = Experience::offline("workouts", vec![definition.clone()]);
    let entry = Entry::offline(
        experience.id.clone(),
        vec![DataObject::offline(definition.id, DataValue::Integer(7))],
    );
    experience.entries.items.push(entry);
    experience
}

async fn cache_offline_experience(ctx: &SyncContext) -> Experience {
    let experience = offline_experience();
    ctx.ledgers
        .write()
        .await
        .unsynced
        .insert_offline_experience(experience.clone());
    experience
}

// ── Enable/disable ───────────────────────────────────────────────

#[tokio::test]
async fn disconnected_signal_disables_sync_and_runs_nothing() {
    let transport = Arc::new(MockTransport::new());
    let (ctx, _) = make_context(transport.clone());
    cache_offline_experience(&ctx).await;
    let coordinator = SyncCoordinator::new(ctx);

    let result = coordinator.connection_changed(false).await.unwrap();
    assert!(result.is_none());
    assert!(!coordinator.is_sync_enabled());
    assert_eq!(transport.calls().create_experiences, 0);
}

#[tokio::test]
async fn connected_signal_runs_exactly_one_pass() {
    let transport = Arc::new(MockTransport::new());
    let (ctx, store) = make_context(transport.clone());
    let offline = cache_offline_experience(&ctx).await;
    let coordinator = SyncCoordinator::new(ctx.clone());

    let data = coordinator.connection_changed(true).await.unwrap().unwrap();

    assert!(coordinator.is_sync_enabled());
    assert_eq!(transport.calls().create_experiences, 1);
    assert!(data.offline_experience_map.contains_key(&offline.id));
    // The swap survives a reload.
    assert!(store.persist_count() > 0);
    assert!(ctx.ledgers.read().await.unsynced.is_empty());
}

#[tokio::test]
async fn pass_with_nothing_to_sync_produces_no_payload() {
    let transport = Arc::new(MockTransport::new());
    let (ctx, _) = make_context(transport.clone());
    let coordinator = SyncCoordinator::new(ctx);

    let result = coordinator.connection_changed(true).await.unwrap();
    assert!(result.is_none());
    assert_eq!(transport.calls().create_experiences, 0);
}

#[tokio::test]
async fn completion_is_broadcast_with_plus_self_delivery() {
    let transport = Arc::new(MockTransport::new());
    let (ctx, _) = make_context(transport);
    cache_offline_experience(&ctx).await;
    let mut subscription = ctx.broadcaster.subscribe();
    let coordinator = SyncCoordinator::new(ctx);

    coordinator.connection_changed(true).await.unwrap();

    // The origin tab's own subscribers get the connectivity change first,
    // then the completion payload.
    assert!(matches!(
        subscription.recv().await,
        Some(BroadcastMessage::ConnectionChanged { connected: true })
    ));
    match subscription.recv().await {
        Some(BroadcastMessage::SyncCompleted(data)) => {
            assert_eq!(data.offline_experience_map.len(), 1);
        }
        other => panic!("expected sync completion, got {other:?}"),
    }
}

// ── In-flight guard ──────────────────────────────────────────────

/// Transport that stalls the create call until released.
struct StallTransport {
    release: Notify,
    create_calls: AtomicUsize,
}

impl StallTransport {
    fn new() -> Self {
        Self {
            release: Notify::new(),
            create_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SyncTransport for StallTransport {
    async fn sync_create_experiences(
        &self,
        experiences: Vec<Experience>,
    ) -> SyncResult<Vec<ExperienceSubmission>> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.release.notified().await;
        let mock = MockTransport::new();
        mock.sync_create_experiences(experiences).await
    }

    async fn sync_create_entries(
        &self,
        _experience_id: &ExperienceId,
        _entries: Vec<Entry>,
    ) -> SyncResult<Vec<EntrySubmission>> {
        Ok(Vec::new())
    }

    async fn sync_update_experiences(
        &self,
        _updates: Vec<ExperienceUpdate>,
    ) -> SyncResult<Vec<UpdateSubmission>> {
        Ok(Vec::new())
    }

    async fn fetch_detail(
        &self,
        _id: &ExperienceId,
        _pagination: Pagination,
    ) -> SyncResult<Experience> {
        Err(SyncError::Network("unused".into()))
    }

    async fn fetch_list(&self, _pagination: Pagination) -> SyncResult<Page<Experience>> {
        Err(SyncError::Network("unused".into()))
    }

    async fn delete_experiences(
        &self,
        _ids: Vec<ExperienceId>,
    ) -> SyncResult<Vec<DeleteOutcome>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn second_signal_while_pass_in_flight_runs_no_additional_pass() {
    let transport = Arc::new(StallTransport::new());
    let (ctx, _) = make_context(transport.clone());
    cache_offline_experience(&ctx).await;
    let coordinator = Arc::new(SyncCoordinator::new(ctx));

    let first = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.connection_changed(true).await })
    };
    // Let the first pass reach the stalled transport call.
    while transport.create_calls.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }

    // A second `true` signal while the first pass is in flight is a no-op.
    let second = coordinator.connection_changed(true).await.unwrap();
    assert!(second.is_none());
    assert_eq!(transport.create_calls.load(Ordering::SeqCst), 1);

    transport.release.notify_one();
    let first = first.await.unwrap().unwrap();
    assert!(first.is_some());
}

// ── Backoff ──────────────────────────────────────────────────────

fn short_backoff() -> SyncConfig {
    SyncConfig {
        backoff: vec![
            std::time::Duration::from_secs(2),
            std::time::Duration::from_secs(2),
            std::time::Duration::from_secs(3),
            std::time::Duration::from_secs(5),
        ],
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn transport_failures_retry_through_the_schedule() {
    let transport = Arc::new(MockTransport::new());
    // Three transport failures, then success.
    for _ in 0..3 {
        transport.script_create_experiences(Err(SyncError::Network("offline".into())));
    }
    let (ctx, _) = make_context(transport.clone());
    cache_offline_experience(&ctx).await;
    let coordinator = SyncCoordinator::with_config(ctx, short_backoff());

    let data = coordinator.connection_changed(true).await.unwrap();
    assert!(data.is_some());
    assert_eq!(transport.calls().create_experiences, 4);
}

#[tokio::test(start_paused = true)]
async fn exhausting_the_schedule_is_terminal() {
    let transport = Arc::new(MockTransport::new());
    // One more failure than the schedule has slots.
    for _ in 0..5 {
        transport.script_create_experiences(Err(SyncError::Network("offline".into())));
    }
    let (ctx, _) = make_context(transport.clone());
    cache_offline_experience(&ctx).await;
    let coordinator = SyncCoordinator::with_config(ctx, short_backoff());

    let error = coordinator.connection_changed(true).await.unwrap_err();
    assert!(matches!(error, SyncError::DataFetchingFailed));
    assert_eq!(transport.calls().create_experiences, 5);
}

#[tokio::test(start_paused = true)]
async fn retries_stop_when_connectivity_goes_explicitly_false() {
    let transport = Arc::new(MockTransport::new());
    for _ in 0..5 {
        transport.script_create_experiences(Err(SyncError::Network("offline".into())));
    }
    let (ctx, _) = make_context(transport.clone());
    cache_offline_experience(&ctx).await;
    let coordinator = Arc::new(SyncCoordinator::with_config(ctx.clone(), short_backoff()));

    let handle = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.connection_changed(true).await })
    };
    // Let the first attempt fail and the pass enter backoff.
    while transport.calls().create_experiences == 0 {
        tokio::task::yield_now().await;
    }
    ctx.connectivity.emit(false);

    let result = handle.await.unwrap();
    assert!(result.is_err());
    // No further attempts ran after the signal went false.
    assert_eq!(transport.calls().create_experiences, 1);
}
