use crate::domain::models::Policy;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::planning_client::PlanningCollaborator;
use crate::infrastructure::planning_mapper::{
    decode_constraints, PlacementSuggestion, PlanningRequest, PlanningResponse, PlanningTask,
};
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Interval {
    start: u32,
    end: u32,
}

/// Local planner used when no remote collaborator is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicPlanner;

#[async_trait]
impl PlanningCollaborator for HeuristicPlanner {
    async fn propose(&self, request: &PlanningRequest) -> Result<PlanningResponse, InfraError> {
        let policy = decode_constraints(&request.constraints)?;
        Ok(plan_week(&policy, request))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ManualOnlyPlanner;

#[async_trait]
impl PlanningCollaborator for ManualOnlyPlanner {
    async fn propose(&self, request: &PlanningRequest) -> Result<PlanningResponse, InfraError> {
        Ok(PlanningResponse {
            scheduled_tasks: Vec::new(),
            overflow_tasks: request
                .tasks_to_schedule
                .iter()
                .map(|task| task.id.clone())
                .collect(),
        })
    }
}

fn plan_week(policy: &Policy, request: &PlanningRequest) -> PlanningResponse {
    let day_count = policy.week.days.len();
    let mut busy_by_day = vec![Vec::new(); day_count];
    let mut load_by_day = vec![0u32; day_count];
    for slot in &request.existing_schedule {
        if let Some(busy) = busy_by_day.get_mut(slot.day) {
            busy.push(Interval {
                start: slot.start_minutes,
                end: slot.start_minutes.saturating_add(slot.duration_minutes),
            });
            load_by_day[slot.day] = load_by_day[slot.day].saturating_add(slot.duration_minutes);
        }
    }

    let mut tasks = request.tasks_to_schedule.iter().collect::<Vec<&PlanningTask>>();
    tasks.sort_by(|left, right| right.priority.cmp(&left.priority));

    let mut response = PlanningResponse::default();
    for task in tasks {
        let duration = policy.durations.for_priority(task.priority);
        let mut day_order = (0..day_count).collect::<Vec<_>>();
        day_order.sort_by_key(|day| (load_by_day[*day], *day));

        let found = day_order.into_iter().find_map(|day| {
            let mut busy = busy_by_day[day].clone();
            busy.push(Interval {
                start: policy.blackout.start_minutes,
                end: policy.blackout.end_minutes,
            });
            first_fit(policy, &merge_intervals(busy), duration).map(|start| (day, start))
        });

        match found {
            Some((day, start_minutes)) => {
                busy_by_day[day].push(Interval {
                    start: start_minutes,
                    end: start_minutes.saturating_add(duration),
                });
                load_by_day[day] = load_by_day[day].saturating_add(duration);
                response.scheduled_tasks.push(PlacementSuggestion {
                    task_id: task.id.clone(),
                    day_index: day,
                    start_minutes,
                    duration_minutes: duration,
                });
            }
            None => response.overflow_tasks.push(task.id.clone()),
        }
    }
    response
}

fn first_fit(policy: &Policy, busy: &[Interval], duration: u32) -> Option<u32> {
    let week = &policy.week;
    free_slots(week.day_start_minutes, week.day_end_minutes, busy)
        .into_iter()
        .find_map(|slot| {
            let start = align_up(slot.start, week.day_start_minutes, week.slot_minutes);
            (start.saturating_add(duration) <= slot.end).then_some(start)
        })
}

fn align_up(minutes: u32, origin: u32, granularity: u32) -> u32 {
    if granularity == 0 || minutes <= origin {
        return minutes.max(origin);
    }
    let offset = minutes - origin;
    origin + offset.div_ceil(granularity) * granularity
}

fn free_slots(window_start: u32, window_end: u32, busy_intervals: &[Interval]) -> Vec<Interval> {
    if window_end <= window_start {
        return Vec::new();
    }

    let mut slots = Vec::new();
    let mut cursor = window_start;
    for interval in busy_intervals {
        if interval.start > cursor {
            slots.push(Interval {
                start: cursor,
                end: interval.start.min(window_end),
            });
        }
        if interval.end > cursor {
            cursor = interval.end;
        }
    }
    if cursor < window_end {
        slots.push(Interval {
            start: cursor,
            end: window_end,
        });
    }
    slots.retain(|slot| slot.end > slot.start);
    slots
}

fn merge_intervals(mut intervals: Vec<Interval>) -> Vec<Interval> {
    intervals.sort_unstable_by_key(|interval| interval.start);
    let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
    for interval in intervals {
        match merged.last_mut() {
            Some(last) if interval.start <= last.end => {
                if interval.end > last.end {
                    last.end = interval.end;
                }
            }
            _ => merged.push(interval),
        }
    }
    merged
}
