use crate::application::auto_placement::{AutoPlaceError, AutoPlacementOrchestrator, OverflowEntry};
use crate::application::bootstrap::{bootstrap_workspace, BootstrapResult};
use crate::application::interaction::{
    DragOrigin, DragSession, DropOutcome, DropPreview, InteractionController,
};
use crate::application::planners::{HeuristicPlanner, ManualOnlyPlanner};
use crate::application::schedule_store::{ItemState, ScheduleError, ScheduleStore, StoreOperation};
use crate::domain::ids::next_id;
use crate::domain::models::{
    format_hhmm, parse_hhmm, parse_item_kind, parse_priority, ItemKind, Priority, SchedulableItem,
};
use crate::infrastructure::config::{
    load_planner_config, load_policy, optional_lookup_value, PlannerConfig, PlannerStrategy,
    PLANNER_API_KEY_KEYS, PLANNER_ENDPOINT_KEYS,
};
use crate::infrastructure::credential_store::{ApiKeyStore, InMemoryApiKeyStore, KeyringApiKeyStore};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::planning_client::{PlanningCollaborator, ReqwestPlanningClient, RetryPolicy};
use chrono::Utc;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

pub struct AppState {
    config_dir: PathBuf,
    logs_dir: PathBuf,
    runtime: Mutex<RuntimeState>,
    orchestrator: AutoPlacementOrchestrator<dyn PlanningCollaborator>,
    api_key_store: Arc<dyn ApiKeyStore>,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        Self::with_api_key_store(workspace_root, Arc::new(KeyringApiKeyStore::default()))
    }

    pub fn with_api_key_store(
        workspace_root: PathBuf,
        api_key_store: Arc<dyn ApiKeyStore>,
    ) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let planner_config = load_planner_config(&bootstrap.config_dir)?
            .with_overrides(|key| std::env::var(key).ok());
        planner_config.validate()?;
        let planner = build_planner(&planner_config, api_key_store.as_ref(), |key| {
            std::env::var(key).ok()
        })?;
        Self::assemble(bootstrap, planner, api_key_store)
    }

    pub fn with_planner(
        workspace_root: PathBuf,
        planner: Arc<dyn PlanningCollaborator>,
    ) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        Self::assemble(bootstrap, planner, Arc::new(InMemoryApiKeyStore::default()))
    }

    fn assemble(
        bootstrap: BootstrapResult,
        planner: Arc<dyn PlanningCollaborator>,
        api_key_store: Arc<dyn ApiKeyStore>,
    ) -> Result<Self, InfraError> {
        let policy = load_policy(&bootstrap.config_dir)?;

        Ok(Self {
            config_dir: bootstrap.config_dir,
            logs_dir: bootstrap.logs_dir,
            runtime: Mutex::new(RuntimeState {
                store: ScheduleStore::new(policy),
                controller: InteractionController::new(),
            }),
            orchestrator: AutoPlacementOrchestrator::new(planner),
            api_key_store,
            log_guard: Mutex::new(()),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        let expected = error.is_placement_rejection()
            || matches!(error, InfraError::AutoPlace(AutoPlaceError::Superseded(_)));
        if expected {
            self.log_warn(command, &error.to_string());
        } else {
            self.log_error(command, &error.to_string());
        }
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_warn(&self, command: &str, message: &str) {
        self.append_log("warn", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }

    fn run_command<T, F>(&self, command: &str, operation: F) -> Result<T, InfraError>
    where
        F: FnOnce() -> Result<T, InfraError>,
    {
        let result = operation();
        if let Err(error) = &result {
            let _ = self.command_error(command, error);
        }
        result
    }
}

struct RuntimeState {
    store: ScheduleStore,
    controller: InteractionController,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GridDayResponse {
    pub day_index: usize,
    pub name: String,
    pub items: Vec<SchedulableItem>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WeekGridResponse {
    pub day_start: String,
    pub day_end: String,
    pub slot_minutes: u32,
    pub blackout_start: String,
    pub blackout_end: String,
    pub cell_starts: Vec<String>,
    pub days: Vec<GridDayResponse>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DragStateResponse {
    pub item_id: String,
    pub origin: DragOrigin,
}

#[derive(Debug, Clone, Serialize)]
pub struct AutoPlaceResponse {
    pub placed: Vec<SchedulableItem>,
    pub overflow: Vec<OverflowEntry>,
    pub elapsed_ms: u128,
}

pub fn create_item_impl(
    state: &AppState,
    title: String,
    priority: Option<String>,
    kind: Option<String>,
    duration_minutes: Option<u32>,
    client: Option<String>,
    description: Option<String>,
) -> Result<SchedulableItem, InfraError> {
    state.run_command("create_item", || {
        let title = required_text(&title, "title")?;
        let priority = match priority.as_deref().map(str::trim).filter(|value| !value.is_empty()) {
            Some(value) => parse_priority(value)
                .ok_or_else(|| InfraError::InvalidConfig(format!("unsupported priority: {value}")))?,
            None => Priority::Medium,
        };
        let kind = match kind.as_deref().map(str::trim).filter(|value| !value.is_empty()) {
            Some(value) => parse_item_kind(value)
                .ok_or_else(|| InfraError::InvalidConfig(format!("unsupported item kind: {value}")))?,
            None => ItemKind::Task,
        };

        let item = SchedulableItem {
            id: next_id("itm"),
            title: title.to_string(),
            priority,
            kind,
            duration_minutes,
            client: optional_text(client.as_deref()),
            description: optional_text(description.as_deref()),
            placement: None,
        };
        lock_runtime(state)?.store.insert_backlog(item.clone())?;

        state.log_info(
            "create_item",
            &format!("created item_id={} priority={}", item.id, item.priority.as_str()),
        );
        Ok(item)
    })
}

pub fn remove_item_impl(state: &AppState, item_id: String) -> Result<bool, InfraError> {
    state.run_command("remove_item", || {
        let item_id = required_text(&item_id, "item_id")?;
        let mut runtime = lock_runtime(state)?;
        if runtime.store.remove(item_id).is_none() {
            return Ok(false);
        }
        if dragged_item(&runtime.controller) == Some(item_id) {
            runtime.controller.cancel_drag();
        }
        drop(runtime);

        state.log_info("remove_item", &format!("removed item_id={item_id}"));
        Ok(true)
    })
}

pub fn list_backlog_impl(state: &AppState) -> Result<Vec<SchedulableItem>, InfraError> {
    state.run_command("list_backlog", || {
        let runtime = lock_runtime(state)?;
        Ok(runtime.store.backlog().into_iter().cloned().collect())
    })
}

pub fn list_scheduled_impl(
    state: &AppState,
    day_index: Option<usize>,
) -> Result<Vec<SchedulableItem>, InfraError> {
    state.run_command("list_scheduled", || {
        let runtime = lock_runtime(state)?;
        let items = match day_index {
            Some(day_index) => {
                runtime.store.policy().week.check_day(day_index)?;
                runtime.store.scheduled_on(day_index)
            }
            None => runtime.store.scheduled(),
        };
        Ok(items.into_iter().cloned().collect())
    })
}

pub fn week_grid_impl(state: &AppState) -> Result<WeekGridResponse, InfraError> {
    state.run_command("week_grid", || {
        let runtime = lock_runtime(state)?;
        let policy = runtime.store.policy();
        let days = (0..policy.week.days.len())
            .map(|day_index| GridDayResponse {
                day_index,
                name: policy.week.day_name(day_index).unwrap_or_default().to_string(),
                items: runtime
                    .store
                    .scheduled_on(day_index)
                    .into_iter()
                    .cloned()
                    .collect(),
            })
            .collect();

        Ok(WeekGridResponse {
            day_start: format_hhmm(policy.week.day_start_minutes),
            day_end: format_hhmm(policy.week.day_end_minutes),
            slot_minutes: policy.week.slot_minutes,
            blackout_start: format_hhmm(policy.blackout.start_minutes),
            blackout_end: format_hhmm(policy.blackout.end_minutes),
            cell_starts: policy
                .week
                .cell_starts()
                .into_iter()
                .map(format_hhmm)
                .collect(),
            days,
        })
    })
}

pub fn schedule_item_impl(
    state: &AppState,
    item_id: String,
    day_index: usize,
    start_time: String,
    duration_minutes: Option<u32>,
) -> Result<SchedulableItem, InfraError> {
    state.run_command("schedule_item", || {
        let item_id = required_text(&item_id, "item_id")?;
        let start_minutes = parse_start_time(&start_time)?;
        let updated = lock_runtime(state)?.store.schedule(
            item_id,
            day_index,
            start_minutes,
            duration_minutes,
        )?;

        state.log_info(
            "schedule_item",
            &format!(
                "scheduled item_id={item_id} day={day_index} start={}",
                format_hhmm(start_minutes)
            ),
        );
        Ok(updated)
    })
}

pub fn reschedule_item_impl(
    state: &AppState,
    item_id: String,
    day_index: usize,
    start_time: String,
) -> Result<SchedulableItem, InfraError> {
    state.run_command("reschedule_item", || {
        let item_id = required_text(&item_id, "item_id")?;
        let start_minutes = parse_start_time(&start_time)?;
        let updated = lock_runtime(state)?
            .store
            .reschedule(item_id, day_index, start_minutes)?;

        state.log_info(
            "reschedule_item",
            &format!(
                "rescheduled item_id={item_id} day={day_index} start={}",
                format_hhmm(start_minutes)
            ),
        );
        Ok(updated)
    })
}

pub fn unschedule_item_impl(state: &AppState, item_id: String) -> Result<SchedulableItem, InfraError> {
    state.run_command("unschedule_item", || {
        let item_id = required_text(&item_id, "item_id")?;
        let updated = lock_runtime(state)?.store.unschedule(item_id)?;

        state.log_info("unschedule_item", &format!("unscheduled item_id={item_id}"));
        Ok(updated)
    })
}

pub fn drag_start_impl(
    state: &AppState,
    item_id: String,
    origin: String,
) -> Result<DragStateResponse, InfraError> {
    state.run_command("drag_start", || {
        let item_id = required_text(&item_id, "item_id")?;
        let origin = parse_drag_origin(&origin)?;
        let mut runtime = lock_runtime(state)?;
        let (operation, expected) = match origin {
            DragOrigin::Backlog => (StoreOperation::Schedule, ItemState::Backlog),
            DragOrigin::Grid => (StoreOperation::Reschedule, ItemState::Scheduled),
        };
        let current = runtime.store.state_of(item_id);
        if current != expected {
            return Err(ScheduleError::InvalidStateTransition {
                item_id: item_id.to_string(),
                operation,
                state: current,
            }
            .into());
        }
        runtime.controller.drag_start(item_id, origin)?;
        drop(runtime);

        state.log_info("drag_start", &format!("dragging item_id={item_id}"));
        Ok(DragStateResponse {
            item_id: item_id.to_string(),
            origin,
        })
    })
}

pub fn drag_over_impl(
    state: &AppState,
    day_index: usize,
    cell_index: usize,
) -> Result<DropPreview, InfraError> {
    state.run_command("drag_over", || {
        let runtime = lock_runtime(state)?;
        Ok(runtime
            .controller
            .drag_over(&runtime.store, day_index, cell_index)?)
    })
}

pub fn drop_on_cell_impl(
    state: &AppState,
    day_index: usize,
    cell_index: usize,
) -> Result<DropOutcome, InfraError> {
    state.run_command("drop_on_cell", || {
        let mut runtime = lock_runtime(state)?;
        let RuntimeState { store, controller } = &mut *runtime;
        let outcome = controller.drop_on_cell(store, day_index, cell_index)?;
        drop(runtime);

        log_drop_outcome(state, "drop_on_cell", &outcome);
        Ok(outcome)
    })
}

pub fn drop_on_backlog_impl(state: &AppState) -> Result<DropOutcome, InfraError> {
    state.run_command("drop_on_backlog", || {
        let mut runtime = lock_runtime(state)?;
        let RuntimeState { store, controller } = &mut *runtime;
        let outcome = controller.drop_on_backlog_area(store)?;
        drop(runtime);

        log_drop_outcome(state, "drop_on_backlog", &outcome);
        Ok(outcome)
    })
}

pub fn cancel_drag_impl(state: &AppState) -> Result<Option<String>, InfraError> {
    state.run_command("cancel_drag", || {
        let cancelled = lock_runtime(state)?.controller.cancel_drag();
        if let Some(item_id) = cancelled.as_deref() {
            state.log_info("cancel_drag", &format!("cancelled drag item_id={item_id}"));
        }
        Ok(cancelled)
    })
}

pub fn quick_add_impl(
    state: &AppState,
    day_index: usize,
    start_time: String,
    title: Option<String>,
) -> Result<SchedulableItem, InfraError> {
    state.run_command("quick_add", || {
        let start_minutes = parse_start_time(&start_time)?;
        let mut runtime = lock_runtime(state)?;
        let RuntimeState { store, controller } = &mut *runtime;
        let created = controller.quick_add(store, day_index, start_minutes, title.as_deref())?;
        drop(runtime);

        state.log_info(
            "quick_add",
            &format!(
                "created event item_id={} day={day_index} start={}",
                created.id,
                format_hhmm(start_minutes)
            ),
        );
        Ok(created)
    })
}

pub async fn auto_place_impl(state: &AppState) -> Result<AutoPlaceResponse, InfraError> {
    let result = auto_place(state).await;
    if let Err(error) = &result {
        let _ = state.command_error("auto_place", error);
    }
    result
}

async fn auto_place(state: &AppState) -> Result<AutoPlaceResponse, InfraError> {
    let started = Instant::now();
    let ticket = {
        let runtime = lock_runtime(state)?;
        state.orchestrator.begin(&runtime.store)
    };
    state.log_info(
        "auto_place",
        &format!(
            "requesting placements request={} tasks={}",
            ticket.generation(),
            ticket.request().tasks_to_schedule.len()
        ),
    );

    let response = state.orchestrator.fetch(&ticket).await?;
    let report = {
        let mut runtime = lock_runtime(state)?;
        state
            .orchestrator
            .complete(&mut runtime.store, &ticket, response)?
    };

    let elapsed_ms = started.elapsed().as_millis();
    state.log_info(
        "auto_place",
        &format!(
            "placed={} overflow={} elapsed_ms={elapsed_ms}",
            report.placed_count(),
            report.overflow_count()
        ),
    );
    Ok(AutoPlaceResponse {
        placed: report.placed,
        overflow: report.overflow,
        elapsed_ms,
    })
}

pub fn save_planner_api_key_impl(state: &AppState, api_key: String) -> Result<bool, InfraError> {
    state.run_command("save_planner_api_key", || {
        let api_key = required_text(&api_key, "api_key")?;
        state.api_key_store.save_api_key(api_key)?;

        // the running planner keeps its key; the new one applies on next start
        state.log_info("save_planner_api_key", "stored planner api key");
        Ok(true)
    })
}

pub fn build_planner<F>(
    config: &PlannerConfig,
    api_key_store: &dyn ApiKeyStore,
    lookup: F,
) -> Result<Arc<dyn PlanningCollaborator>, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    match config.strategy {
        PlannerStrategy::Heuristic => Ok(Arc::new(HeuristicPlanner)),
        PlannerStrategy::Manual => Ok(Arc::new(ManualOnlyPlanner)),
        PlannerStrategy::Remote => {
            let endpoint = config
                .endpoint
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| {
                    InfraError::InvalidConfig(format!(
                        "missing planner endpoint (set one of: {})",
                        PLANNER_ENDPOINT_KEYS.join(", ")
                    ))
                })?;
            let api_key = match optional_lookup_value(&lookup, PLANNER_API_KEY_KEYS) {
                Some(api_key) => Some(api_key),
                None => api_key_store.load_api_key()?,
            };
            let client = ReqwestPlanningClient::new(
                endpoint,
                api_key,
                Duration::from_secs(config.timeout_seconds),
            )?
            .with_retry_policy(RetryPolicy {
                max_attempts: config.max_attempts,
                ..RetryPolicy::default()
            });
            Ok(Arc::new(client))
        }
    }
}

fn lock_runtime(state: &AppState) -> Result<MutexGuard<'_, RuntimeState>, InfraError> {
    state
        .runtime
        .lock()
        .map_err(|error| InfraError::InvalidConfig(format!("runtime lock poisoned: {error}")))
}

fn dragged_item(controller: &InteractionController) -> Option<&str> {
    match controller.session() {
        DragSession::Dragging { item_id, .. } => Some(item_id),
        DragSession::Idle => None,
    }
}

fn log_drop_outcome(state: &AppState, command: &str, outcome: &DropOutcome) {
    match outcome {
        DropOutcome::Scheduled { item } | DropOutcome::Rescheduled { item } => {
            let placement = item
                .placement
                .map(|placement| {
                    format!(
                        " day={} start={}",
                        placement.day_index,
                        format_hhmm(placement.start_minutes)
                    )
                })
                .unwrap_or_default();
            state.log_info(command, &format!("placed item_id={}{placement}", item.id));
        }
        DropOutcome::Unscheduled { item } => {
            state.log_info(command, &format!("returned item_id={} to backlog", item.id));
        }
        DropOutcome::Unchanged { item_id } => {
            state.log_info(command, &format!("item_id={item_id} unchanged"));
        }
        DropOutcome::Rejected { item_id, rejection } => {
            state.log_warn(command, &format!("rejected item_id={item_id}: {rejection}"));
        }
    }
}

fn required_text<'a>(value: &'a str, field_name: &str) -> Result<&'a str, InfraError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(InfraError::InvalidConfig(format!(
            "{field_name} must not be empty"
        )));
    }
    Ok(value)
}

fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

fn parse_start_time(value: &str) -> Result<u32, InfraError> {
    parse_hhmm(value)
        .ok_or_else(|| InfraError::InvalidConfig(format!("start_time must be HH:MM, got {value:?}")))
}

fn parse_drag_origin(value: &str) -> Result<DragOrigin, InfraError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "backlog" => Ok(DragOrigin::Backlog),
        "grid" | "calendar" => Ok(DragOrigin::Grid),
        other => Err(InfraError::InvalidConfig(format!(
            "unsupported drag origin: {other}"
        ))),
    }
}
