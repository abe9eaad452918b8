use crate::application::schedule_store::{ItemState, PlacementSource, ScheduleError, ScheduleStore};
use crate::domain::models::SchedulableItem;
use crate::domain::placement::PlacementRejection;
use crate::infrastructure::planning_client::PlanningCollaborator;
use crate::infrastructure::planning_mapper::{
    encode_planning_request, PlacementSuggestion, PlanningRequest, PlanningResponse,
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

const NO_PENDING_REQUEST: u64 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AutoPlaceError {
    #[error("planning collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),
    #[error("auto-placement request {0} was superseded")]
    Superseded(u64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OverflowReason {
    Declined,
    NotSuggested,
    Rejected { rejection: PlacementRejection },
    StateChanged { state: ItemState },
    Invalid { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverflowEntry {
    pub item_id: String,
    pub reason: OverflowReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AutoPlaceReport {
    pub placed: Vec<SchedulableItem>,
    pub overflow: Vec<OverflowEntry>,
}

impl AutoPlaceReport {
    pub fn placed_count(&self) -> usize {
        self.placed.len()
    }

    pub fn overflow_count(&self) -> usize {
        self.overflow.len()
    }

    fn push_overflow(&mut self, item_id: &str, reason: OverflowReason) {
        self.overflow.push(OverflowEntry {
            item_id: item_id.to_string(),
            reason,
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoPlaceTicket {
    generation: u64,
    request: PlanningRequest,
}

impl AutoPlaceTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn request(&self) -> &PlanningRequest {
        &self.request
    }
}

pub struct AutoPlacementOrchestrator<P>
where
    P: PlanningCollaborator + ?Sized,
{
    planner: Arc<P>,
    next_generation: AtomicU64,
    pending: AtomicU64,
}

impl<P> AutoPlacementOrchestrator<P>
where
    P: PlanningCollaborator + ?Sized,
{
    pub fn new(planner: Arc<P>) -> Self {
        Self {
            planner,
            next_generation: AtomicU64::new(1),
            pending: AtomicU64::new(NO_PENDING_REQUEST),
        }
    }

    pub fn begin(&self, store: &ScheduleStore) -> AutoPlaceTicket {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        self.pending.store(generation, Ordering::SeqCst);
        AutoPlaceTicket {
            generation,
            request: encode_planning_request(store),
        }
    }

    pub fn is_current(&self, ticket: &AutoPlaceTicket) -> bool {
        self.pending.load(Ordering::SeqCst) == ticket.generation
    }

    pub fn has_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst) != NO_PENDING_REQUEST
    }

    pub fn cancel_pending(&self) {
        self.pending.store(NO_PENDING_REQUEST, Ordering::SeqCst);
    }

    pub async fn fetch(&self, ticket: &AutoPlaceTicket) -> Result<PlanningResponse, AutoPlaceError> {
        if !self.is_current(ticket) {
            return Err(AutoPlaceError::Superseded(ticket.generation));
        }
        if ticket.request.tasks_to_schedule.is_empty() {
            return Ok(PlanningResponse::default());
        }

        match self.planner.propose(&ticket.request).await {
            Ok(response) => Ok(response),
            Err(error) => {
                // a failed request is over; do not let it block the next one
                let _ = self.pending.compare_exchange(
                    ticket.generation,
                    NO_PENDING_REQUEST,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
                Err(AutoPlaceError::CollaboratorUnavailable(error.to_string()))
            }
        }
    }

    pub fn complete(
        &self,
        store: &mut ScheduleStore,
        ticket: &AutoPlaceTicket,
        response: PlanningResponse,
    ) -> Result<AutoPlaceReport, AutoPlaceError> {
        self.pending
            .compare_exchange(
                ticket.generation,
                NO_PENDING_REQUEST,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map_err(|_| AutoPlaceError::Superseded(ticket.generation))?;

        Ok(apply_suggestions(store, &ticket.request, response))
    }
}

fn apply_suggestions(
    store: &mut ScheduleStore,
    request: &PlanningRequest,
    response: PlanningResponse,
) -> AutoPlaceReport {
    let mut report = AutoPlaceReport::default();
    let mut handled = HashSet::new();

    for suggestion in response.scheduled_tasks {
        if !handled.insert(suggestion.task_id.clone()) {
            continue;
        }
        let duration_minutes = suggested_duration(store, &suggestion);
        let result = store.schedule_from(
            &suggestion.task_id,
            suggestion.day_index,
            suggestion.start_minutes,
            duration_minutes,
            PlacementSource::Automatic,
        );
        match result {
            Ok(item) => report.placed.push(item),
            Err(ScheduleError::Rejected(rejection)) => {
                report.push_overflow(&suggestion.task_id, OverflowReason::Rejected { rejection });
            }
            Err(ScheduleError::InvalidStateTransition { state, .. }) => {
                report.push_overflow(&suggestion.task_id, OverflowReason::StateChanged { state });
            }
            Err(ScheduleError::InvalidItem(message)) => {
                report.push_overflow(&suggestion.task_id, OverflowReason::Invalid { message });
            }
        }
    }

    for task_id in response.overflow_tasks {
        if handled.insert(task_id.clone()) && store.state_of(&task_id) == ItemState::Backlog {
            report.push_overflow(&task_id, OverflowReason::Declined);
        }
    }

    for task in &request.tasks_to_schedule {
        if handled.insert(task.id.clone()) && store.state_of(&task.id) == ItemState::Backlog {
            report.push_overflow(&task.id, OverflowReason::NotSuggested);
        }
    }

    report
}

// Only tasks without a duration of their own take the collaborator's value.
fn suggested_duration(store: &ScheduleStore, suggestion: &PlacementSuggestion) -> Option<u32> {
    match store.get(&suggestion.task_id) {
        Some(item) if item.is_event() || item.duration_minutes.is_some() => None,
        _ => Some(suggestion.duration_minutes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Policy, Priority};
    use crate::infrastructure::error::InfraError;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    #[derive(Debug)]
    enum FakeReply {
        Success(PlanningResponse),
        Unavailable,
    }

    #[derive(Debug)]
    struct FakePlanner {
        reply: Mutex<Option<FakeReply>>,
        calls: AtomicUsize,
        last_request: Mutex<Option<PlanningRequest>>,
    }

    impl FakePlanner {
        fn replying(reply: FakeReply) -> Self {
            Self {
                reply: Mutex::new(Some(reply)),
                calls: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl PlanningCollaborator for FakePlanner {
        async fn propose(&self, request: &PlanningRequest) -> Result<PlanningResponse, InfraError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().expect("request lock poisoned") = Some(request.clone());
            match self.reply.lock().expect("reply lock poisoned").take() {
                Some(FakeReply::Success(response)) => Ok(response),
                Some(FakeReply::Unavailable) => {
                    Err(InfraError::Planning("network error while requesting placements".to_string()))
                }
                None => Ok(PlanningResponse::default()),
            }
        }
    }

    fn suggestion(task_id: &str, day_index: usize, start: u32, duration: u32) -> PlacementSuggestion {
        PlacementSuggestion {
            task_id: task_id.to_string(),
            day_index,
            start_minutes: start,
            duration_minutes: duration,
        }
    }

    fn backlog_store() -> ScheduleStore {
        let mut store = ScheduleStore::new(Policy::default());
        for (id, priority) in [
            ("a1", Priority::Urgent),
            ("a2", Priority::High),
            ("a3", Priority::Medium),
        ] {
            store
                .insert_backlog(SchedulableItem::task(id, format!("Task {id}"), priority))
                .expect("seed backlog");
        }
        store
            .insert_backlog(SchedulableItem::task("manual", "Manual", Priority::Low))
            .expect("seed manual");
        store
    }

    #[tokio::test]
    async fn racing_manual_edit_sends_conflicting_suggestion_to_overflow() {
        let planner = Arc::new(FakePlanner::replying(FakeReply::Success(PlanningResponse {
            scheduled_tasks: vec![
                suggestion("a1", 0, 540, 120),
                suggestion("a2", 1, 540, 90),
                suggestion("a3", 2, 600, 60),
            ],
            overflow_tasks: Vec::new(),
        })));
        let orchestrator = AutoPlacementOrchestrator::new(Arc::clone(&planner));
        let mut store = backlog_store();

        let ticket = orchestrator.begin(&store);
        let manual = store
            .schedule("manual", 2, 615, None)
            .expect("manual placement while request is pending");
        let response = orchestrator.fetch(&ticket).await.expect("fetch suggestions");
        let report = orchestrator
            .complete(&mut store, &ticket, response)
            .expect("apply suggestions");

        assert_eq!(report.placed_count(), 2);
        assert_eq!(report.overflow_count(), 1);
        assert_eq!(
            report.overflow[0],
            OverflowEntry {
                item_id: "a3".to_string(),
                reason: OverflowReason::Rejected {
                    rejection: PlacementRejection::Overlap {
                        conflicting_item_id: "manual".to_string()
                    }
                },
            }
        );
        assert_eq!(store.get("manual").and_then(|item| item.placement), manual.placement);
        assert_eq!(store.state_of("a3"), ItemState::Backlog);
        assert_eq!(planner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn request_snapshot_contains_only_backlog_and_existing_slots() {
        let planner = Arc::new(FakePlanner::replying(FakeReply::Success(
            PlanningResponse::default(),
        )));
        let orchestrator = AutoPlacementOrchestrator::new(Arc::clone(&planner));
        let mut store = backlog_store();
        store.schedule("a1", 0, 540, None).expect("schedule a1");

        let ticket = orchestrator.begin(&store);
        let _ = orchestrator.fetch(&ticket).await.expect("fetch");

        let request = planner
            .last_request
            .lock()
            .expect("request lock poisoned")
            .clone()
            .expect("request was sent");
        let ids = request
            .tasks_to_schedule
            .iter()
            .map(|task| task.id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["a2", "a3", "manual"]);
        assert_eq!(request.existing_schedule.len(), 1);
    }

    #[tokio::test]
    async fn collaborator_failure_applies_nothing() {
        let planner = Arc::new(FakePlanner::replying(FakeReply::Unavailable));
        let orchestrator = AutoPlacementOrchestrator::new(planner);
        let store = backlog_store();

        let ticket = orchestrator.begin(&store);
        let result = orchestrator.fetch(&ticket).await;

        assert!(matches!(result, Err(AutoPlaceError::CollaboratorUnavailable(_))));
        assert!(!orchestrator.has_pending());
        assert_eq!(store.backlog().len(), 4);
    }

    #[tokio::test]
    async fn automatic_placement_keeps_events_out_of_lunch() {
        let planner = Arc::new(FakePlanner::replying(FakeReply::Success(PlanningResponse {
            scheduled_tasks: vec![suggestion("e1", 0, 720, 60)],
            overflow_tasks: Vec::new(),
        })));
        let orchestrator = AutoPlacementOrchestrator::new(planner);
        let mut store = ScheduleStore::new(Policy::default());
        store
            .insert_backlog(SchedulableItem::event("e1", "Offsite"))
            .expect("seed event");

        let ticket = orchestrator.begin(&store);
        let response = orchestrator.fetch(&ticket).await.expect("fetch");
        let report = orchestrator
            .complete(&mut store, &ticket, response)
            .expect("complete");

        assert!(report.placed.is_empty());
        assert_eq!(
            report.overflow[0].reason,
            OverflowReason::Rejected {
                rejection: PlacementRejection::LunchConflict
            }
        );
    }

    #[tokio::test]
    async fn declined_unanswered_and_duplicate_suggestions_are_accounted_for() {
        let planner = Arc::new(FakePlanner::replying(FakeReply::Success(PlanningResponse {
            scheduled_tasks: vec![
                suggestion("a1", 0, 540, 120),
                suggestion("a1", 1, 540, 120),
                suggestion("ghost", 3, 540, 60),
            ],
            overflow_tasks: vec!["a2".to_string(), "a1".to_string()],
        })));
        let orchestrator = AutoPlacementOrchestrator::new(planner);
        let mut store = backlog_store();

        let ticket = orchestrator.begin(&store);
        let response = orchestrator.fetch(&ticket).await.expect("fetch");
        let report = orchestrator
            .complete(&mut store, &ticket, response)
            .expect("complete");

        assert_eq!(report.placed_count(), 1);
        assert_eq!(
            report.overflow,
            vec![
                OverflowEntry {
                    item_id: "ghost".to_string(),
                    reason: OverflowReason::StateChanged {
                        state: ItemState::Unknown
                    },
                },
                OverflowEntry {
                    item_id: "a2".to_string(),
                    reason: OverflowReason::Declined,
                },
                OverflowEntry {
                    item_id: "a3".to_string(),
                    reason: OverflowReason::NotSuggested,
                },
                OverflowEntry {
                    item_id: "manual".to_string(),
                    reason: OverflowReason::NotSuggested,
                },
            ]
        );
        assert_eq!(store.backlog().len() + store.scheduled().len(), 4);
    }

    #[tokio::test]
    async fn newer_request_supersedes_older_result() {
        let planner = Arc::new(FakePlanner::replying(FakeReply::Success(PlanningResponse {
            scheduled_tasks: vec![suggestion("a1", 0, 540, 120)],
            overflow_tasks: Vec::new(),
        })));
        let orchestrator = AutoPlacementOrchestrator::new(planner);
        let mut store = backlog_store();

        let stale = orchestrator.begin(&store);
        let response = orchestrator.fetch(&stale).await.expect("fetch stale");
        let fresh = orchestrator.begin(&store);

        let result = orchestrator.complete(&mut store, &stale, response);

        assert_eq!(result, Err(AutoPlaceError::Superseded(stale.generation())));
        assert!(orchestrator.is_current(&fresh));
        assert_eq!(store.backlog().len(), 4);
    }

    #[tokio::test]
    async fn cancelled_request_is_discarded() {
        let planner = Arc::new(FakePlanner::replying(FakeReply::Success(
            PlanningResponse::default(),
        )));
        let orchestrator = AutoPlacementOrchestrator::new(Arc::clone(&planner));
        let store = backlog_store();

        let ticket = orchestrator.begin(&store);
        orchestrator.cancel_pending();
        let result = orchestrator.fetch(&ticket).await;

        assert_eq!(result, Err(AutoPlaceError::Superseded(ticket.generation())));
        assert_eq!(planner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_backlog_skips_the_collaborator() {
        let planner = Arc::new(FakePlanner::replying(FakeReply::Unavailable));
        let orchestrator = AutoPlacementOrchestrator::new(Arc::clone(&planner));
        let mut store = ScheduleStore::new(Policy::default());

        let ticket = orchestrator.begin(&store);
        let response = orchestrator.fetch(&ticket).await.expect("empty fetch");
        let report = orchestrator
            .complete(&mut store, &ticket, response)
            .expect("complete");

        assert_eq!(report, AutoPlaceReport::default());
        assert_eq!(planner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn completed_ticket_cannot_be_applied_twice() {
        let planner = Arc::new(FakePlanner::replying(FakeReply::Success(PlanningResponse {
            scheduled_tasks: vec![suggestion("a1", 0, 540, 120)],
            overflow_tasks: Vec::new(),
        })));
        let orchestrator = AutoPlacementOrchestrator::new(planner);
        let mut store = backlog_store();

        let ticket = orchestrator.begin(&store);
        let response = orchestrator.fetch(&ticket).await.expect("fetch");
        orchestrator
            .complete(&mut store, &ticket, response.clone())
            .expect("first completion");

        assert!(orchestrator.complete(&mut store, &ticket, response).is_err());
    }

    #[tokio::test]
    async fn events_and_sized_tasks_keep_their_own_duration() {
        let planner = Arc::new(FakePlanner::replying(FakeReply::Success(PlanningResponse {
            scheduled_tasks: vec![
                suggestion("e1", 0, 540, 120),
                suggestion("t1", 1, 540, 30),
                suggestion("t2", 2, 540, 90),
            ],
            overflow_tasks: Vec::new(),
        })));
        let orchestrator = AutoPlacementOrchestrator::new(planner);
        let mut store = ScheduleStore::new(Policy::default());
        let mut event = SchedulableItem::event("e1", "Client visit");
        event.priority = Priority::Urgent;
        store.insert_backlog(event).expect("seed event");
        store
            .insert_backlog(SchedulableItem::task("t1", "Report", Priority::Low).with_duration(45))
            .expect("seed sized task");
        store
            .insert_backlog(SchedulableItem::task("t2", "Hiring", Priority::High))
            .expect("seed plain task");

        let ticket = orchestrator.begin(&store);
        let response = orchestrator.fetch(&ticket).await.expect("fetch");
        let report = orchestrator
            .complete(&mut store, &ticket, response)
            .expect("complete");

        assert_eq!(report.placed_count(), 3);
        let duration_of = |item_id: &str| {
            store
                .get(item_id)
                .and_then(|item| item.placement)
                .map(|placement| placement.duration_minutes)
        };
        assert_eq!(duration_of("e1"), Some(60));
        assert_eq!(duration_of("t1"), Some(45));
        assert_eq!(duration_of("t2"), Some(90));
        assert_eq!(store.get("e1").and_then(|item| item.duration_minutes), Some(60));
    }

    #[tokio::test]
    async fn own_duration_that_no_longer_fits_goes_to_overflow() {
        let planner = Arc::new(FakePlanner::replying(FakeReply::Success(PlanningResponse {
            scheduled_tasks: vec![suggestion("t1", 0, 660, 30)],
            overflow_tasks: Vec::new(),
        })));
        let orchestrator = AutoPlacementOrchestrator::new(planner);
        let mut store = ScheduleStore::new(Policy::default());
        store
            .insert_backlog(SchedulableItem::task("t1", "Workshop", Priority::Low).with_duration(90))
            .expect("seed sized task");

        let ticket = orchestrator.begin(&store);
        let response = orchestrator.fetch(&ticket).await.expect("fetch");
        let report = orchestrator
            .complete(&mut store, &ticket, response)
            .expect("complete");

        // 11:00 + 90 minutes runs into lunch
        assert_eq!(
            report.overflow,
            vec![OverflowEntry {
                item_id: "t1".to_string(),
                reason: OverflowReason::Rejected {
                    rejection: PlacementRejection::LunchConflict
                },
            }]
        );
        assert_eq!(store.state_of("t1"), ItemState::Backlog);
    }
}
