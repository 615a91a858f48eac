//! The experience-list view.
//!
//! Shows every experience (fetched pages plus locally created ones), with
//! per-item online status, error flags, and options menus. Consumes the
//! delete ledger on mount so a just-resolved delete from another view shows
//! its notice here exactly once.

use crate::machine::{Dispatcher, Effects, Machine, Timeouts};
use async_trait::async_trait;
use fieldbook_broadcast::BroadcastMessage;
use fieldbook_sync::{DeleteWorkflow, SyncContext};
use fieldbook_types::{
    Experience, ExperienceId, ExperienceSyncErrors, OnSyncedData, OnlineStatus, Page, PageInfo,
    Pagination,
};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Page size for list fetches.
pub const LIST_PAGE_SIZE: usize = 10;

/// Retry schedule for the initial fetch while connectivity is unknown.
const FETCH_RETRY_SCHEDULE: [Duration; 4] = [
    Duration::from_secs(2),
    Duration::from_secs(2),
    Duration::from_secs(3),
    Duration::from_secs(5),
];

/// One rendered list row.
#[derive(Debug, Clone, PartialEq)]
pub struct ListItem {
    pub id: ExperienceId,
    pub title: String,
    pub status: OnlineStatus,
    pub has_errors: bool,
    pub menu_open: bool,
}

impl ListItem {
    fn from_experience(experience: &Experience, errors: Option<&ExperienceSyncErrors>) -> Self {
        let has_errors = errors.is_some_and(|e| !e.is_empty());
        let base = OnlineStatus::for_id(experience.id.as_str());
        let status = if has_errors && base.is_synced() {
            OnlineStatus::PartOffline
        } else {
            base
        };
        Self {
            id: experience.id.clone(),
            title: experience.title.clone(),
            status,
            has_errors,
            menu_open: false,
        }
    }
}

/// Search substate.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchState {
    Inactive,
    Active {
        query: String,
        results: Vec<SearchHit>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: ExperienceId,
    pub title: String,
}

/// A just-resolved delete workflow, shown once.
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteNotice {
    Deleted { title: String },
    Cancelled { title: String },
}

/// Loaded-view substates.
#[derive(Debug, Clone, PartialEq)]
pub struct ListData {
    pub connected: Option<bool>,
    pub items: Vec<ListItem>,
    pub page_info: PageInfo,
    pub search: SearchState,
    pub notice: Option<DeleteNotice>,
}

/// Top-level value: `loading -> data | errors`, `errors -> loading` on
/// refetch. `data` has no outgoing top-level transition.
#[derive(Debug, Clone, PartialEq)]
pub enum ListValue {
    Loading {
        attempts: usize,
        notice: Option<DeleteNotice>,
    },
    Errors {
        error: String,
    },
    Data(ListData),
}

/// Full view state: the tagged value plus this transition's effects.
#[derive(Debug)]
pub struct ListState {
    pub value: ListValue,
    pub effects: Effects<ListEffect>,
}

impl ListState {
    /// State for a freshly mounted view.
    #[must_use]
    pub fn initial() -> Self {
        Self {
            value: ListValue::Loading {
                attempts: 0,
                notice: None,
            },
            effects: Effects::none(),
        }
    }

    fn next(&self, value: ListValue) -> Self {
        Self {
            value,
            effects: Effects::none(),
        }
    }
}

/// What the fetch effect hands back: the server page, locally created
/// experiences, and the current error ledger entries.
#[derive(Debug, Clone)]
pub struct FetchedList {
    pub page: Page<Experience>,
    pub offline: Vec<Experience>,
    pub errors: HashMap<ExperienceId, ExperienceSyncErrors>,
}

#[derive(Debug, Clone)]
pub enum ListAction {
    Mounted,
    Loaded(FetchedList),
    NextPageLoaded(FetchedList),
    FetchFailed { message: String, retryable: bool },
    RetryTimerFired,
    Refetch,
    NextPage,
    ToggleSearch,
    SearchInput { query: String },
    ToggleMenu { id: ExperienceId },
    CloseAllMenus,
    ConnectionChanged { connected: bool },
    SyncReceived(OnSyncedData),
    EntityDeleted { id: ExperienceId, title: String },
    DeleteNoticeRead(Option<DeleteWorkflow>),
    DismissNotice,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ListEffect {
    FetchPage { pagination: Pagination },
    ConsumeDeleteLedger,
    ScheduleFetchRetry { attempt: usize },
    ClearFetchRetry,
}

/// Timer names owned by this view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListTimer {
    FetchRetry,
}

/// The experience-list machine.
pub struct ListMachine;

fn build_items(fetched: &FetchedList) -> Vec<ListItem> {
    let mut items: Vec<ListItem> = fetched
        .offline
        .iter()
        .map(|e| ListItem::from_experience(e, fetched.errors.get(&e.id)))
        .collect();
    items.extend(
        fetched
            .page
            .items
            .iter()
            .map(|e| ListItem::from_experience(e, fetched.errors.get(&e.id))),
    );
    items
}

fn search_results(items: &[ListItem], query: &str) -> Vec<SearchHit> {
    let needle = query.to_lowercase();
    items
        .iter()
        .filter(|item| item.title.to_lowercase().contains(&needle))
        .map(|item| SearchHit {
            id: item.id.clone(),
            title: item.title.clone(),
        })
        .collect()
}

fn notice_from_workflow(workflow: DeleteWorkflow) -> Option<DeleteNotice> {
    match workflow {
        DeleteWorkflow::Deleted { title, .. } => Some(DeleteNotice::Deleted { title }),
        DeleteWorkflow::Cancelled { title, .. } => Some(DeleteNotice::Cancelled { title }),
        DeleteWorkflow::Requested { .. } => None,
    }
}

fn apply_on_synced(data: &mut ListData, synced: &OnSyncedData) {
    for item in &mut data.items {
        if let Some(server_id) = synced.offline_experience_map.get(&item.id) {
            item.id = server_id.clone();
        }
        if let Some(errors) = synced.sync_errors.get(&item.id) {
            item.has_errors = !errors.is_empty();
            item.status = item.status.advance(OnlineStatus::PartOffline);
        } else if synced.updated_clean.contains(&item.id)
            || synced.offline_experience_map.values().any(|v| v == &item.id)
        {
            item.has_errors = false;
            item.status = item.status.advance(OnlineStatus::Online);
        }
    }
    if let SearchState::Active { results, .. } = &mut data.search {
        for hit in results.iter_mut() {
            if let Some(server_id) = synced.offline_experience_map.get(&hit.id) {
                hit.id = server_id.clone();
            }
        }
    }
}

#[async_trait]
impl Machine for ListMachine {
    type State = ListState;
    type Action = ListAction;
    type Effect = ListEffect;
    type TimerKey = ListTimer;

    fn reduce(state: &ListState, action: ListAction) -> ListState {
        match action {
            ListAction::Mounted => {
                let mut next = state.next(ListValue::Loading {
                    attempts: 0,
                    notice: None,
                });
                next.effects.push(ListEffect::ConsumeDeleteLedger);
                next.effects.push(ListEffect::FetchPage {
                    pagination: Pagination::first(LIST_PAGE_SIZE),
                });
                next
            }

            ListAction::Loaded(fetched) => match &state.value {
                ListValue::Loading { notice, .. } => {
                    let items = build_items(&fetched);
                    let mut next = state.next(ListValue::Data(ListData {
                        connected: None,
                        items,
                        page_info: fetched.page.page_info,
                        search: SearchState::Inactive,
                        notice: notice.clone(),
                    }));
                    next.effects.push(ListEffect::ClearFetchRetry);
                    next
                }
                _ => {
                    debug!("list fetch result arrived outside loading, dropping");
                    state.next(state.value.clone())
                }
            },

            ListAction::NextPageLoaded(fetched) => match &state.value {
                ListValue::Data(data) => {
                    let mut data = data.clone();
                    let page_info = fetched.page.page_info.clone();
                    data.items.extend(build_items(&FetchedList {
                        offline: Vec::new(),
                        ..fetched
                    }));
                    data.page_info = page_info;
                    state.next(ListValue::Data(data))
                }
                _ => {
                    debug!("next-page result arrived outside data, dropping");
                    state.next(state.value.clone())
                }
            },

            ListAction::FetchFailed { message, retryable } => match &state.value {
                ListValue::Loading { attempts, notice } => {
                    if retryable && *attempts < FETCH_RETRY_SCHEDULE.len() {
                        let mut next = state.next(ListValue::Loading {
                            attempts: attempts + 1,
                            notice: notice.clone(),
                        });
                        next.effects
                            .push(ListEffect::ScheduleFetchRetry { attempt: *attempts });
                        next
                    } else {
                        state.next(ListValue::Errors { error: message })
                    }
                }
                _ => state.next(state.value.clone()),
            },

            ListAction::RetryTimerFired => match &state.value {
                ListValue::Loading { .. } => {
                    let mut next = state.next(state.value.clone());
                    next.effects.push(ListEffect::FetchPage {
                        pagination: Pagination::first(LIST_PAGE_SIZE),
                    });
                    next
                }
                _ => state.next(state.value.clone()),
            },

            ListAction::Refetch => match &state.value {
                ListValue::Errors { .. } => {
                    let mut next = state.next(ListValue::Loading {
                        attempts: 0,
                        notice: None,
                    });
                    next.effects.push(ListEffect::FetchPage {
                        pagination: Pagination::first(LIST_PAGE_SIZE),
                    });
                    next
                }
                _ => state.next(state.value.clone()),
            },

            ListAction::NextPage => match &state.value {
                ListValue::Data(data) if data.page_info.has_next_page => {
                    let cursor = data.page_info.end_cursor.clone().unwrap_or_default();
                    let mut next = state.next(state.value.clone());
                    next.effects.push(ListEffect::FetchPage {
                        pagination: Pagination::after(LIST_PAGE_SIZE, cursor),
                    });
                    next
                }
                _ => state.next(state.value.clone()),
            },

            ListAction::ToggleSearch => match &state.value {
                ListValue::Data(data) => {
                    let mut data = data.clone();
                    data.search = match data.search {
                        SearchState::Inactive => SearchState::Active {
                            query: String::new(),
                            results: Vec::new(),
                        },
                        SearchState::Active { .. } => SearchState::Inactive,
                    };
                    state.next(ListValue::Data(data))
                }
                _ => state.next(state.value.clone()),
            },

            ListAction::SearchInput { query } => match &state.value {
                ListValue::Data(data) => {
                    let mut data = data.clone();
                    if matches!(data.search, SearchState::Active { .. }) {
                        let results = search_results(&data.items, &query);
                        data.search = SearchState::Active { query, results };
                    }
                    state.next(ListValue::Data(data))
                }
                _ => state.next(state.value.clone()),
            },

            ListAction::ToggleMenu { id } => match &state.value {
                ListValue::Data(data) => {
                    let mut data = data.clone();
                    for item in &mut data.items {
                        item.menu_open = item.id == id && !item.menu_open;
                    }
                    state.next(ListValue::Data(data))
                }
                _ => state.next(state.value.clone()),
            },

            ListAction::CloseAllMenus => match &state.value {
                ListValue::Data(data) => {
                    let mut data = data.clone();
                    for item in &mut data.items {
                        item.menu_open = false;
                    }
                    state.next(ListValue::Data(data))
                }
                _ => state.next(state.value.clone()),
            },

            ListAction::ConnectionChanged { connected } => match &state.value {
                ListValue::Data(data) => {
                    let mut data = data.clone();
                    data.connected = Some(connected);
                    state.next(ListValue::Data(data))
                }
                ListValue::Errors { .. } if connected => {
                    let mut next = state.next(ListValue::Loading {
                        attempts: 0,
                        notice: None,
                    });
                    next.effects.push(ListEffect::FetchPage {
                        pagination: Pagination::first(LIST_PAGE_SIZE),
                    });
                    next
                }
                _ => state.next(state.value.clone()),
            },

            ListAction::SyncReceived(synced) => match &state.value {
                ListValue::Data(data) => {
                    let mut data = data.clone();
                    apply_on_synced(&mut data, &synced);
                    state.next(ListValue::Data(data))
                }
                _ => state.next(state.value.clone()),
            },

            ListAction::EntityDeleted { id, title } => match &state.value {
                ListValue::Data(data) => {
                    let mut data = data.clone();
                    data.items.retain(|item| item.id != id);
                    data.notice = Some(DeleteNotice::Deleted { title });
                    state.next(ListValue::Data(data))
                }
                _ => state.next(state.value.clone()),
            },

            ListAction::DeleteNoticeRead(workflow) => {
                let notice = workflow.and_then(notice_from_workflow);
                match &state.value {
                    ListValue::Loading { attempts, .. } => state.next(ListValue::Loading {
                        attempts: *attempts,
                        notice,
                    }),
                    ListValue::Data(data) => {
                        let mut data = data.clone();
                        if notice.is_some() {
                            data.notice = notice;
                        }
                        state.next(ListValue::Data(data))
                    }
                    _ => state.next(state.value.clone()),
                }
            }

            ListAction::DismissNotice => match &state.value {
                ListValue::Data(data) => {
                    let mut data = data.clone();
                    data.notice = None;
                    state.next(ListValue::Data(data))
                }
                ListValue::Loading { attempts, .. } => state.next(ListValue::Loading {
                    attempts: *attempts,
                    notice: None,
                }),
                _ => state.next(state.value.clone()),
            },
        }
    }

    fn take_effects(state: &mut ListState) -> Vec<ListEffect> {
        state.effects.take()
    }

    async fn run_effect(
        effect: ListEffect,
        ctx: &SyncContext,
        timeouts: &mut Timeouts<ListTimer>,
        dispatch: Dispatcher<ListAction>,
    ) {
        match effect {
            ListEffect::FetchPage { pagination } => {
                let next_page = pagination.after.is_some();
                let (offline, errors) = {
                    let ledgers = ctx.ledgers.read().await;
                    let offline = if next_page {
                        Vec::new()
                    } else {
                        ledgers.unsynced.offline_experiences()
                    };
                    let errors: HashMap<ExperienceId, ExperienceSyncErrors> = ledgers
                        .errors
                        .iter()
                        .map(|(id, e)| (id.clone(), e.clone()))
                        .collect();
                    (offline, errors)
                };
                match ctx.transport.fetch_list(pagination).await {
                    Ok(page) => {
                        let fetched = FetchedList {
                            page,
                            offline,
                            errors,
                        };
                        if next_page {
                            dispatch.dispatch(ListAction::NextPageLoaded(fetched));
                        } else {
                            dispatch.dispatch(ListAction::Loaded(fetched));
                        }
                    }
                    Err(e) => {
                        let retryable = ctx.connectivity.current().is_none();
                        dispatch.dispatch(ListAction::FetchFailed {
                            message: e.to_string(),
                            retryable,
                        });
                    }
                }
            }

            ListEffect::ConsumeDeleteLedger => {
                let taken = ctx.ledgers.write().await.delete.take_resolved();
                if taken.is_some() {
                    ctx.persist_logged().await;
                }
                dispatch.dispatch(ListAction::DeleteNoticeRead(taken));
            }

            ListEffect::ScheduleFetchRetry { attempt } => {
                let delay = FETCH_RETRY_SCHEDULE[attempt.min(FETCH_RETRY_SCHEDULE.len() - 1)];
                timeouts.schedule(
                    ListTimer::FetchRetry,
                    delay,
                    dispatch,
                    ListAction::RetryTimerFired,
                );
            }

            ListEffect::ClearFetchRetry => {
                timeouts.clear(&ListTimer::FetchRetry);
            }
        }
    }

    fn from_broadcast(message: BroadcastMessage) -> Option<ListAction> {
        match message {
            BroadcastMessage::ConnectionChanged { connected } => {
                Some(ListAction::ConnectionChanged { connected })
            }
            BroadcastMessage::EntityDeleted { id, title } => {
                Some(ListAction::EntityDeleted { id, title })
            }
            BroadcastMessage::SyncCompleted(data) => Some(ListAction::SyncReceived(data)),
        }
    }
}
