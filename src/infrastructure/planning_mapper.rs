use crate::application::schedule_store::ScheduleStore;
use crate::domain::models::{
    parse_weekday, weekday_name, DurationTable, Policy, Priority, TimeWindow, WorkWeek,
};
use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlanningTask {
    pub id: String,
    pub title: String,
    pub priority: Priority,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExistingSlot {
    pub day: usize,
    pub start_minutes: u32,
    pub duration_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlanningConstraints {
    pub days: Vec<String>,
    pub day_start_minutes: u32,
    pub day_end_minutes: u32,
    pub slot_minutes: u32,
    pub blackout_start_minutes: u32,
    pub blackout_end_minutes: u32,
    pub durations: DurationTable,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlanningRequest {
    pub tasks_to_schedule: Vec<PlanningTask>,
    pub existing_schedule: Vec<ExistingSlot>,
    pub constraints: PlanningConstraints,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlacementSuggestion {
    pub task_id: String,
    pub day_index: usize,
    pub start_minutes: u32,
    pub duration_minutes: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlanningResponse {
    #[serde(default)]
    pub scheduled_tasks: Vec<PlacementSuggestion>,
    #[serde(default)]
    pub overflow_tasks: Vec<String>,
}

pub fn encode_planning_request(store: &ScheduleStore) -> PlanningRequest {
    let tasks_to_schedule = store
        .backlog()
        .into_iter()
        .map(|item| PlanningTask {
            id: item.id.clone(),
            title: item.title.clone(),
            priority: item.priority,
        })
        .collect();
    let existing_schedule = store
        .scheduled()
        .into_iter()
        .filter_map(|item| item.placement)
        .map(|placement| ExistingSlot {
            day: placement.day_index,
            start_minutes: placement.start_minutes,
            duration_minutes: placement.duration_minutes,
        })
        .collect();

    PlanningRequest {
        tasks_to_schedule,
        existing_schedule,
        constraints: encode_constraints(store.policy()),
    }
}

pub fn encode_constraints(policy: &Policy) -> PlanningConstraints {
    PlanningConstraints {
        days: policy
            .week
            .days
            .iter()
            .map(|day| weekday_name(*day).to_string())
            .collect(),
        day_start_minutes: policy.week.day_start_minutes,
        day_end_minutes: policy.week.day_end_minutes,
        slot_minutes: policy.week.slot_minutes,
        blackout_start_minutes: policy.blackout.start_minutes,
        blackout_end_minutes: policy.blackout.end_minutes,
        durations: policy.durations,
    }
}

pub fn decode_constraints(constraints: &PlanningConstraints) -> Result<Policy, InfraError> {
    let days = constraints
        .days
        .iter()
        .map(|day| {
            parse_weekday(day).ok_or_else(|| {
                InfraError::InvalidConfig(format!("unsupported planning day: {day}"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let policy = Policy {
        week: WorkWeek {
            days,
            day_start_minutes: constraints.day_start_minutes,
            day_end_minutes: constraints.day_end_minutes,
            slot_minutes: constraints.slot_minutes,
        },
        blackout: TimeWindow::new(
            constraints.blackout_start_minutes,
            constraints.blackout_end_minutes,
        ),
        durations: constraints.durations,
    };
    policy.validate().map_err(InfraError::InvalidConfig)?;
    Ok(policy)
}

/// Reads the outermost JSON object of a reply, ignoring any fence or prose.
pub fn decode_planning_response(body: &str) -> Result<PlanningResponse, InfraError> {
    let payload = extract_json_object(body).ok_or_else(|| {
        InfraError::Planning(format!("planning response did not contain a JSON object; body={body}"))
    })?;
    let parsed: PlanningResponse = serde_json::from_str(payload).map_err(|error| {
        InfraError::Planning(format!("invalid planning payload: {error}; body={body}"))
    })?;
    normalize_planning_response(parsed)
}

pub fn normalize_planning_response(
    response: PlanningResponse,
) -> Result<PlanningResponse, InfraError> {
    let mut scheduled_tasks = Vec::with_capacity(response.scheduled_tasks.len());
    for mut suggestion in response.scheduled_tasks {
        let task_id = suggestion.task_id.trim();
        if task_id.is_empty() {
            return Err(InfraError::Planning(
                "planning suggestion is missing taskId".to_string(),
            ));
        }
        suggestion.task_id = task_id.to_string();
        scheduled_tasks.push(suggestion);
    }

    let mut overflow_tasks = Vec::with_capacity(response.overflow_tasks.len());
    for task_id in response.overflow_tasks {
        let task_id = task_id.trim();
        if task_id.is_empty() {
            return Err(InfraError::Planning(
                "planning overflow entry is empty".to_string(),
            ));
        }
        overflow_tasks.push(task_id.to_string());
    }

    Ok(PlanningResponse {
        scheduled_tasks,
        overflow_tasks,
    })
}

fn extract_json_object(body: &str) -> Option<&str> {
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (end > start).then(|| &body[start..=end])
}
