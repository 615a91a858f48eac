//! The experience-detail view.
//!
//! Shows one experience with its paginated entries, folded sync errors,
//! the options menu, and the delete-experience workflow. The displayed
//! error list always derives from the sync error ledger, never the
//! reverse; resolving a field locally removes its displayed line
//! optimistically and later reconciliation passes settle any divergence.

use crate::machine::{Dispatcher, Effects, Machine, Timeouts};
use async_trait::async_trait;
use fieldbook_broadcast::BroadcastMessage;
use fieldbook_sync::{DeleteOutcome, SyncContext, error_for};
use fieldbook_types::{
    DisplayedErrors, Entry, EntryId, Experience, ExperienceId, ExperienceSyncErrors,
    OnSyncedData, OnlineStatus, Page, Pagination, fold_experience_errors,
};
use std::time::Duration;
use tracing::{debug, warn};

/// Page size for entry fetches.
pub const ENTRIES_PAGE_SIZE: usize = 10;

/// How long an auto-dismissing notice stays up.
pub const NOTICE_TIMEOUT: Duration = Duration::from_secs(10);

const FETCH_RETRY_SCHEDULE: [Duration; 4] = [
    Duration::from_secs(2),
    Duration::from_secs(2),
    Duration::from_secs(3),
    Duration::from_secs(5),
];

/// Delete-workflow substate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteSubstate {
    Idle,
    Confirming,
    Deleting,
}

/// Loaded-view substates.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailData {
    pub experience: Experience,
    pub status: OnlineStatus,
    /// Folded from the sync error ledger; rebuilt on every sync pass.
    pub displayed_errors: DisplayedErrors,
    pub menu_open: bool,
    pub delete: DeleteSubstate,
    pub notice: Option<String>,
    pub connected: Option<bool>,
    /// Set once this view is done (deleted, or delete cancelled) and the
    /// host should navigate away.
    pub closed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DetailValue {
    Loading {
        id: ExperienceId,
        attempts: usize,
    },
    Errors {
        id: ExperienceId,
        error: String,
    },
    Data(Box<DetailData>),
}

/// Full view state: the tagged value plus this transition's effects.
#[derive(Debug)]
pub struct DetailState {
    pub value: DetailValue,
    pub effects: Effects<DetailEffect>,
}

impl DetailState {
    /// State for a view mounted on the given experience.
    #[must_use]
    pub fn initial(id: ExperienceId) -> Self {
        Self {
            value: DetailValue::Loading { id, attempts: 0 },
            effects: Effects::none(),
        }
    }

    fn next(&self, value: DetailValue) -> Self {
        Self {
            value,
            effects: Effects::none(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum DetailAction {
    Mounted,
    Loaded {
        experience: Experience,
        errors: Option<ExperienceSyncErrors>,
    },
    FetchFailed {
        message: String,
        retryable: bool,
    },
    RetryTimerFired,
    Refetch,
    NextEntriesPage,
    EntriesPageLoaded(Page<Entry>),
    ToggleMenu,
    RequestDelete,
    CancelDelete,
    ConfirmDelete,
    DeleteSucceeded,
    DeleteFailed {
        message: String,
    },
    /// The user re-edited and resubmitted an errored entry; its displayed
    /// line goes away without waiting for the round trip.
    EntryErrorResolved {
        entry_id: EntryId,
    },
    SyncReceived(OnSyncedData),
    ConnectionChanged {
        connected: bool,
    },
    ShowNotice {
        message: String,
    },
    NoticeTimerFired,
    DismissNotice,
    EntityDeleted {
        id: ExperienceId,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DetailEffect {
    Fetch {
        id: ExperienceId,
        pagination: Pagination,
    },
    FetchEntriesPage {
        id: ExperienceId,
        pagination: Pagination,
    },
    ScheduleFetchRetry {
        attempt: usize,
    },
    ClearFetchRetry,
    RecordDeleteRequested {
        id: ExperienceId,
    },
    RecordDeleteCancelled {
        id: ExperienceId,
        title: String,
    },
    DeleteExperience {
        id: ExperienceId,
    },
    FinishDelete {
        id: ExperienceId,
        title: String,
    },
    ScheduleNoticeClose,
    ClearNoticeTimer,
}

/// Timer names owned by this view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetailTimer {
    FetchRetry,
    NoticeClose,
}

/// The experience-detail machine.
pub struct DetailMachine;

fn data_from_load(experience: Experience, errors: Option<ExperienceSyncErrors>) -> DetailData {
    let errors = errors.unwrap_or_default();
    let has_errors = !errors.is_empty();
    let base = OnlineStatus::for_id(experience.id.as_str());
    let status = if has_errors && base.is_synced() {
        OnlineStatus::PartOffline
    } else {
        base
    };
    let displayed_errors =
        fold_experience_errors(&experience.entries.items, &experience.definitions, &errors);
    DetailData {
        experience,
        status,
        displayed_errors,
        menu_open: false,
        delete: DeleteSubstate::Idle,
        notice: None,
        connected: None,
        closed: false,
    }
}

fn apply_on_synced(data: &mut DetailData, synced: &OnSyncedData) {
    if let Some(server_id) = synced.offline_experience_map.get(&data.experience.id) {
        data.experience.id = server_id.clone();
        for entry in &mut data.experience.entries.items {
            entry.experience_id = server_id.clone();
        }
        data.status = data.status.advance(OnlineStatus::Online);
    }
    let id = data.experience.id.clone();

    if let Some(entry_map) = synced.synced_entries.get(&id) {
        for entry in &mut data.experience.entries.items {
            if let Some(server_entry) = entry_map.get(&entry.id) {
                *entry = server_entry.clone();
            }
        }
    }

    if let Some(errors) = synced.sync_errors.get(&id) {
        data.displayed_errors = fold_experience_errors(
            &data.experience.entries.items,
            &data.experience.definitions,
            errors,
        );
        data.status = data.status.advance(OnlineStatus::PartOffline);
    } else if synced.updated_clean.contains(&id)
        || synced.offline_experience_map.values().any(|v| v == &id)
    {
        data.displayed_errors = DisplayedErrors::default();
        data.status = data.status.advance(OnlineStatus::Online);
    }
}

#[async_trait]
impl Machine for DetailMachine {
    type State = DetailState;
    type Action = DetailAction;
    type Effect = DetailEffect;
    type TimerKey = DetailTimer;

    fn reduce(state: &DetailState, action: DetailAction) -> DetailState {
        match action {
            DetailAction::Mounted => match &state.value {
                DetailValue::Loading { id, .. } => {
                    let mut next = state.next(DetailValue::Loading {
                        id: id.clone(),
                        attempts: 0,
                    });
                    next.effects.push(DetailEffect::Fetch {
                        id: id.clone(),
                        pagination: Pagination::first(ENTRIES_PAGE_SIZE),
                    });
                    next
                }
                _ => state.next(state.value.clone()),
            },

            DetailAction::Loaded { experience, errors } => match &state.value {
                DetailValue::Loading { .. } => {
                    let mut next = state.next(DetailValue::Data(Box::new(data_from_load(
                        experience, errors,
                    ))));
                    next.effects.push(DetailEffect::ClearFetchRetry);
                    next
                }
                _ => {
                    debug!("detail fetch result arrived outside loading, dropping");
                    state.next(state.value.clone())
                }
            },

            DetailAction::FetchFailed { message, retryable } => match &state.value {
                DetailValue::Loading { id, attempts } => {
                    if retryable && *attempts < FETCH_RETRY_SCHEDULE.len() {
                        let mut next = state.next(DetailValue::Loading {
                            id: id.clone(),
                            attempts: attempts + 1,
                        });
                        next.effects
                            .push(DetailEffect::ScheduleFetchRetry { attempt: *attempts });
                        next
                    } else {
                        state.next(DetailValue::Errors {
                            id: id.clone(),
                            error: message,
                        })
                    }
                }
                _ => state.next(state.value.clone()),
            },

            DetailAction::RetryTimerFired => match &state.value {
                DetailValue::Loading { id, .. } => {
                    let mut next = state.next(state.value.clone());
                    next.effects.push(DetailEffect::Fetch {
                        id: id.clone(),
                        pagination: Pagination::first(ENTRIES_PAGE_SIZE),
                    });
                    next
                }
                _ => state.next(state.value.clone()),
            },

            DetailAction::Refetch => match &state.value {
                DetailValue::Errors { id, .. } => {
                    let mut next = state.next(DetailValue::Loading {
                        id: id.clone(),
                        attempts: 0,
                    });
                    next.effects.push(DetailEffect::Fetch {
                        id: id.clone(),
                        pagination: Pagination::first(ENTRIES_PAGE_SIZE),
                    });
                    next
                }
                _ => state.next(state.value.clone()),
            },

            DetailAction::NextEntriesPage => match &state.value {
                DetailValue::Data(data) if data.experience.entries.page_info.has_next_page => {
                    let cursor = data
                        .experience
                        .entries
                        .page_info
                        .end_cursor
                        .clone()
                        .unwrap_or_default();
                    let mut next = state.next(state.value.clone());
                    next.effects.push(DetailEffect::FetchEntriesPage {
                        id: data.experience.id.clone(),
                        pagination: Pagination::after(ENTRIES_PAGE_SIZE, cursor),
                    });
                    next
                }
                _ => state.next(state.value.clone()),
            },

            DetailAction::EntriesPageLoaded(page) => match &state.value {
                DetailValue::Data(data) => {
                    let mut data = data.clone();
                    data.experience.entries.append(page);
                    state.next(DetailValue::Data(data))
                }
                _ => {
                    debug!("entries page arrived outside data, dropping");
                    state.next(state.value.clone())
                }
            },

            DetailAction::ToggleMenu => match &state.value {
                DetailValue::Data(data) => {
                    let mut data = data.clone();
                    data.menu_open = !data.menu_open;
                    state.next(DetailValue::Data(data))
                }
                _ => state.next(state.value.clone()),
            },

            DetailAction::RequestDelete => match &state.value {
                DetailValue::Data(data) if data.delete == DeleteSubstate::Idle => {
                    let mut data = data.clone();
                    data.menu_open = false;
                    data.delete = DeleteSubstate::Confirming;
                    let id = data.experience.id.clone();
                    let mut next = state.next(DetailValue::Data(data));
                    next.effects.push(DetailEffect::RecordDeleteRequested { id });
                    next
                }
                _ => state.next(state.value.clone()),
            },

            DetailAction::CancelDelete => match &state.value {
                DetailValue::Data(data) if data.delete == DeleteSubstate::Confirming => {
                    let mut data = data.clone();
                    data.delete = DeleteSubstate::Idle;
                    data.closed = true;
                    let id = data.experience.id.clone();
                    let title = data.experience.title.clone();
                    let mut next = state.next(DetailValue::Data(data));
                    next.effects
                        .push(DetailEffect::RecordDeleteCancelled { id, title });
                    next
                }
                _ => state.next(state.value.clone()),
            },

            DetailAction::ConfirmDelete => match &state.value {
                DetailValue::Data(data) if data.delete == DeleteSubstate::Confirming => {
                    let mut data = data.clone();
                    data.delete = DeleteSubstate::Deleting;
                    let id = data.experience.id.clone();
                    let mut next = state.next(DetailValue::Data(data));
                    next.effects.push(DetailEffect::DeleteExperience { id });
                    next
                }
                _ => state.next(state.value.clone()),
            },

            DetailAction::DeleteSucceeded => match &state.value {
                DetailValue::Data(data) if data.delete == DeleteSubstate::Deleting => {
                    let mut data = data.clone();
                    data.closed = true;
                    let id = data.experience.id.clone();
                    let title = data.experience.title.clone();
                    let mut next = state.next(DetailValue::Data(data));
                    next.effects.push(DetailEffect::FinishDelete { id, title });
                    next
                }
                _ => {
                    debug!("delete result arrived outside deleting, dropping");
                    state.next(state.value.clone())
                }
            },

            DetailAction::DeleteFailed { message } => match &state.value {
                DetailValue::Data(data) if data.delete == DeleteSubstate::Deleting => {
                    let mut data = data.clone();
                    data.delete = DeleteSubstate::Idle;
                    data.notice = Some(message);
                    let mut next = state.next(DetailValue::Data(data));
                    next.effects.push(DetailEffect::ScheduleNoticeClose);
                    next
                }
                _ => state.next(state.value.clone()),
            },

            DetailAction::EntryErrorResolved { entry_id } => match &state.value {
                DetailValue::Data(data) => {
                    let mut data = data.clone();
                    data.displayed_errors.entries.retain(|e| e.id != entry_id);
                    state.next(DetailValue::Data(data))
                }
                _ => state.next(state.value.clone()),
            },

            DetailAction::SyncReceived(synced) => match &state.value {
                DetailValue::Data(data) => {
                    let mut data = data.clone();
                    apply_on_synced(&mut data, &synced);
                    state.next(DetailValue::Data(data))
                }
                _ => state.next(state.value.clone()),
            },

            DetailAction::ConnectionChanged { connected } => match &state.value {
                DetailValue::Data(data) => {
                    let mut data = data.clone();
                    data.connected = Some(connected);
                    state.next(DetailValue::Data(data))
                }
                DetailValue::Errors { id, .. } if connected => {
                    let mut next = state.next(DetailValue::Loading {
                        id: id.clone(),
                        attempts: 0,
                    });
                    next.effects.push(DetailEffect::Fetch {
                        id: id.clone(),
                        pagination: Pagination::first(ENTRIES_PAGE_SIZE),
                    });
                    next
                }
                _ => state.next(state.value.clone()),
            },

            DetailAction::ShowNotice { message } => match &state.value {
                DetailValue::Data(data) => {
                    let mut data = data.clone();
                    data.notice = Some(message);
                    let mut next = state.next(DetailValue::Data(data));
                    next.effects.push(DetailEffect::ScheduleNoticeClose);
                    next
                }
                _ => state.next(state.value.clone()),
            },

            DetailAction::NoticeTimerFired => match &state.value {
                DetailValue::Data(data) => {
                    let mut data = data.clone();
                    data.notice = None;
                    state.next(DetailValue::Data(data))
                }
                _ => state.next(state.value.clone()),
            },

            DetailAction::DismissNotice => match &state.value {
                DetailValue::Data(data) => {
                    let mut data = data.clone();
                    data.notice = None;
                    let mut next = state.next(DetailValue::Data(data));
                    next.effects.push(DetailEffect::ClearNoticeTimer);
                    next
                }
                _ => state.next(state.value.clone()),
            },

            DetailAction::EntityDeleted { id } => match &state.value {
                DetailValue::Data(data) if data.experience.id == id => {
                    let mut data = data.clone();
                    data.closed = true;
                    state.next(DetailValue::Data(data))
                }
                _ => state.next(state.value.clone()),
            },
        }
    }

    fn take_effects(state: &mut DetailState) -> Vec<DetailEffect> {
        state.effects.take()
    }

    async fn run_effect(
        effect: DetailEffect,
        ctx: &SyncContext,
        timeouts: &mut Timeouts<DetailTimer>,
        dispatch: Dispatcher<DetailAction>,
    ) {
        match effect {
            DetailEffect::Fetch { id, pagination } => {
                if id.is_offline() {
                    let ledgers = ctx.ledgers.read().await;
                    match ledgers.unsynced.offline_experience(&id) {
                        Some(experience) => {
                            let errors = error_for(&ledgers, &id);
                            dispatch.dispatch(DetailAction::Loaded {
                                experience: experience.clone(),
                                errors,
                            });
                        }
                        None => dispatch.dispatch(DetailAction::FetchFailed {
                            message: format!("experience {id} not found"),
                            retryable: false,
                        }),
                    }
                    return;
                }
                match ctx.transport.fetch_detail(&id, pagination).await {
                    Ok(experience) => {
                        let errors = error_for(&*ctx.ledgers.read().await, &id);
                        dispatch.dispatch(DetailAction::Loaded { experience, errors });
                    }
                    Err(e) => {
                        let retryable = ctx.connectivity.current().is_none();
                        dispatch.dispatch(DetailAction::FetchFailed {
                            message: e.to_string(),
                            retryable,
                        });
                    }
                }
            }

            DetailEffect::FetchEntriesPage { id, pagination } => {
                match ctx.transport.fetch_detail(&id, pagination).await {
                    Ok(experience) => {
                        dispatch.dispatch(DetailAction::EntriesPageLoaded(experience.entries));
                    }
                    Err(e) => warn!("entries page fetch failed: {e}"),
                }
            }

            DetailEffect::ScheduleFetchRetry { attempt } => {
                let delay = FETCH_RETRY_SCHEDULE[attempt.min(FETCH_RETRY_SCHEDULE.len() - 1)];
                timeouts.schedule(
                    DetailTimer::FetchRetry,
                    delay,
                    dispatch,
                    DetailAction::RetryTimerFired,
                );
            }

            DetailEffect::ClearFetchRetry => {
                timeouts.clear(&DetailTimer::FetchRetry);
            }

            DetailEffect::RecordDeleteRequested { id } => {
                ctx.ledgers.write().await.delete.request(id);
                ctx.persist_logged().await;
            }

            DetailEffect::RecordDeleteCancelled { id, title } => {
                ctx.ledgers.write().await.delete.cancel(id, title);
                ctx.persist_logged().await;
            }

            DetailEffect::DeleteExperience { id } => {
                match ctx.transport.delete_experiences(vec![id.clone()]).await {
                    Ok(outcomes) => match outcomes.into_iter().next() {
                        Some(DeleteOutcome::Deleted { .. }) => {
                            dispatch.dispatch(DetailAction::DeleteSucceeded);
                        }
                        Some(DeleteOutcome::Failed { error, .. }) => {
                            dispatch.dispatch(DetailAction::DeleteFailed { message: error });
                        }
                        None => dispatch.dispatch(DetailAction::DeleteFailed {
                            message: format!("no delete result for {id}"),
                        }),
                    },
                    Err(e) => dispatch.dispatch(DetailAction::DeleteFailed {
                        message: e.to_string(),
                    }),
                }
            }

            DetailEffect::FinishDelete { id, title } => {
                {
                    let mut ledgers = ctx.ledgers.write().await;
                    ledgers.delete.deleted(id.clone(), title.clone());
                    ledgers.unsynced.remove_offline_experience(&id);
                    ledgers.errors.remove(&id);
                }
                if let Err(e) = ctx.broadcaster.publish(
                    BroadcastMessage::EntityDeleted { id, title },
                    fieldbook_broadcast::Delivery::OthersOnly,
                ) {
                    warn!("failed to broadcast deletion: {e}");
                }
                ctx.persist_logged().await;
            }

            DetailEffect::ScheduleNoticeClose => {
                timeouts.schedule(
                    DetailTimer::NoticeClose,
                    NOTICE_TIMEOUT,
                    dispatch,
                    DetailAction::NoticeTimerFired,
                );
            }

            DetailEffect::ClearNoticeTimer => {
                timeouts.clear(&DetailTimer::NoticeClose);
            }
        }
    }

    fn from_broadcast(message: BroadcastMessage) -> Option<DetailAction> {
        match message {
            BroadcastMessage::ConnectionChanged { connected } => {
                Some(DetailAction::ConnectionChanged { connected })
            }
            BroadcastMessage::EntityDeleted { id, .. } => {
                Some(DetailAction::EntityDeleted { id })
            }
            BroadcastMessage::SyncCompleted(data) => Some(DetailAction::SyncReceived(data)),
        }
    }
}
