use crate::domain::models::{Placement, Policy, SchedulableItem};
use crate::domain::placement::{can_place, BlackoutRule, PlacementCandidate, PlacementRejection};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    Unknown,
    Backlog,
    Scheduled,
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unknown => "unknown",
            Self::Backlog => "in the backlog",
            Self::Scheduled => "scheduled",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreOperation {
    Insert,
    Schedule,
    Reschedule,
    Unschedule,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Insert => "insert",
            Self::Schedule => "schedule",
            Self::Reschedule => "reschedule",
            Self::Unschedule => "unschedule",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementSource {
    Manual,
    Automatic,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("placement rejected: {0}")]
    Rejected(#[from] PlacementRejection),
    #[error("cannot {operation} item {item_id}: item is {state}")]
    InvalidStateTransition {
        item_id: String,
        operation: StoreOperation,
        state: ItemState,
    },
    #[error("invalid item: {0}")]
    InvalidItem(String),
}

impl ScheduleError {
    pub fn rejection(&self) -> Option<&PlacementRejection> {
        match self {
            Self::Rejected(rejection) => Some(rejection),
            _ => None,
        }
    }

    pub fn is_precondition_violation(&self) -> bool {
        matches!(self, Self::InvalidStateTransition { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleStore {
    policy: Policy,
    items: HashMap<String, SchedulableItem>,
    order: Vec<String>,
}

impl ScheduleStore {
    pub fn new(policy: Policy) -> Self {
        Self {
            policy,
            items: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, item_id: &str) -> Option<&SchedulableItem> {
        self.items.get(item_id)
    }

    pub fn state_of(&self, item_id: &str) -> ItemState {
        match self.items.get(item_id) {
            None => ItemState::Unknown,
            Some(item) if item.is_scheduled() => ItemState::Scheduled,
            Some(_) => ItemState::Backlog,
        }
    }

    pub fn backlog(&self) -> Vec<&SchedulableItem> {
        self.ordered()
            .filter(|item| !item.is_scheduled())
            .collect()
    }

    pub fn scheduled(&self) -> Vec<&SchedulableItem> {
        let mut scheduled = self
            .ordered()
            .filter(|item| item.is_scheduled())
            .collect::<Vec<_>>();
        scheduled.sort_by_key(|item| {
            item.placement
                .map(|placement| (placement.day_index, placement.start_minutes))
        });
        scheduled
    }

    pub fn scheduled_on(&self, day_index: usize) -> Vec<&SchedulableItem> {
        self.scheduled()
            .into_iter()
            .filter(|item| {
                item.placement
                    .is_some_and(|placement| placement.day_index == day_index)
            })
            .collect()
    }

    pub fn placements(&self) -> impl Iterator<Item = (&str, &Placement)> {
        self.ordered().filter_map(|item| {
            item.placement
                .as_ref()
                .map(|placement| (item.id.as_str(), placement))
        })
    }

    pub fn insert_backlog(&mut self, mut item: SchedulableItem) -> Result<(), ScheduleError> {
        item.validate().map_err(ScheduleError::InvalidItem)?;
        self.ensure_unknown(&item.id)?;
        item.placement = None;
        self.order.push(item.id.clone());
        self.items.insert(item.id.clone(), item);
        Ok(())
    }

    /// Nothing is stored when the placement is rejected.
    pub fn insert_scheduled(
        &mut self,
        mut item: SchedulableItem,
        day_index: usize,
        start_minutes: u32,
        duration_minutes: Option<u32>,
    ) -> Result<SchedulableItem, ScheduleError> {
        item.validate().map_err(ScheduleError::InvalidItem)?;
        self.ensure_unknown(&item.id)?;
        let duration = duration_minutes.unwrap_or_else(|| self.policy.durations.default_for(&item));
        let candidate = PlacementCandidate {
            item_id: item.id.clone(),
            day_index,
            start_minutes,
            duration_minutes: duration,
        };
        self.validate(&candidate, blackout_rule(&item, PlacementSource::Manual))?;

        item.duration_minutes = Some(duration);
        item.placement = Some(candidate.placement());
        self.order.push(item.id.clone());
        self.items.insert(item.id.clone(), item.clone());
        Ok(item)
    }

    pub fn remove(&mut self, item_id: &str) -> Option<SchedulableItem> {
        let removed = self.items.remove(item_id)?;
        self.order.retain(|candidate| candidate != item_id);
        Some(removed)
    }

    pub fn schedule(
        &mut self,
        item_id: &str,
        day_index: usize,
        start_minutes: u32,
        duration_minutes: Option<u32>,
    ) -> Result<SchedulableItem, ScheduleError> {
        self.schedule_from(
            item_id,
            day_index,
            start_minutes,
            duration_minutes,
            PlacementSource::Manual,
        )
    }

    pub fn schedule_from(
        &mut self,
        item_id: &str,
        day_index: usize,
        start_minutes: u32,
        duration_minutes: Option<u32>,
        source: PlacementSource,
    ) -> Result<SchedulableItem, ScheduleError> {
        let placement =
            self.check_schedule_from(item_id, day_index, start_minutes, duration_minutes, source)?;
        self.commit(item_id, placement)
    }

    pub fn check_schedule(
        &self,
        item_id: &str,
        day_index: usize,
        start_minutes: u32,
        duration_minutes: Option<u32>,
    ) -> Result<Placement, ScheduleError> {
        self.check_schedule_from(
            item_id,
            day_index,
            start_minutes,
            duration_minutes,
            PlacementSource::Manual,
        )
    }

    fn check_schedule_from(
        &self,
        item_id: &str,
        day_index: usize,
        start_minutes: u32,
        duration_minutes: Option<u32>,
        source: PlacementSource,
    ) -> Result<Placement, ScheduleError> {
        let item = self.require(item_id, StoreOperation::Schedule, ItemState::Backlog)?;
        let duration = duration_minutes.unwrap_or_else(|| self.policy.durations.default_for(item));
        let candidate = PlacementCandidate {
            item_id: item_id.to_string(),
            day_index,
            start_minutes,
            duration_minutes: duration,
        };
        self.validate(&candidate, blackout_rule(item, source))?;
        Ok(candidate.placement())
    }

    pub fn reschedule(
        &mut self,
        item_id: &str,
        day_index: usize,
        start_minutes: u32,
    ) -> Result<SchedulableItem, ScheduleError> {
        let placement = self.check_reschedule(item_id, day_index, start_minutes)?;
        self.commit(item_id, placement)
    }

    pub fn check_reschedule(
        &self,
        item_id: &str,
        day_index: usize,
        start_minutes: u32,
    ) -> Result<Placement, ScheduleError> {
        let item = self.require(item_id, StoreOperation::Reschedule, ItemState::Scheduled)?;
        let duration = item
            .placement
            .map(|placement| placement.duration_minutes)
            .unwrap_or_else(|| self.policy.durations.default_for(item));
        let candidate = PlacementCandidate {
            item_id: item_id.to_string(),
            day_index,
            start_minutes,
            duration_minutes: duration,
        };
        self.validate(&candidate, blackout_rule(item, PlacementSource::Manual))?;
        Ok(candidate.placement())
    }

    pub fn unschedule(&mut self, item_id: &str) -> Result<SchedulableItem, ScheduleError> {
        self.require(item_id, StoreOperation::Unschedule, ItemState::Scheduled)?;
        let item = self
            .items
            .get_mut(item_id)
            .ok_or_else(|| invalid_transition(item_id, StoreOperation::Unschedule, ItemState::Unknown))?;
        item.placement = None;
        let updated = item.clone();

        self.order.retain(|candidate| candidate != item_id);
        self.order.push(item_id.to_string());
        Ok(updated)
    }

    fn commit(&mut self, item_id: &str, placement: Placement) -> Result<SchedulableItem, ScheduleError> {
        let item = self
            .items
            .get_mut(item_id)
            .ok_or_else(|| invalid_transition(item_id, StoreOperation::Schedule, ItemState::Unknown))?;
        item.duration_minutes = Some(placement.duration_minutes);
        item.placement = Some(placement);
        Ok(item.clone())
    }

    fn validate(
        &self,
        candidate: &PlacementCandidate,
        blackout: BlackoutRule,
    ) -> Result<(), ScheduleError> {
        can_place(&self.policy, candidate, self.placements(), blackout)?;
        Ok(())
    }

    fn require(
        &self,
        item_id: &str,
        operation: StoreOperation,
        expected: ItemState,
    ) -> Result<&SchedulableItem, ScheduleError> {
        let state = self.state_of(item_id);
        match self.items.get(item_id) {
            Some(item) if state == expected => Ok(item),
            _ => Err(invalid_transition(item_id, operation, state)),
        }
    }

    fn ensure_unknown(&self, item_id: &str) -> Result<(), ScheduleError> {
        match self.state_of(item_id) {
            ItemState::Unknown => Ok(()),
            state => Err(invalid_transition(item_id, StoreOperation::Insert, state)),
        }
    }

    fn ordered(&self) -> impl Iterator<Item = &SchedulableItem> {
        self.order
            .iter()
            .filter_map(|item_id| self.items.get(item_id))
    }
}

fn blackout_rule(item: &SchedulableItem, source: PlacementSource) -> BlackoutRule {
    if item.is_event() && source == PlacementSource::Manual {
        BlackoutRule::Exempt
    } else {
        BlackoutRule::Enforce
    }
}

fn invalid_transition(item_id: &str, operation: StoreOperation, state: ItemState) -> ScheduleError {
    ScheduleError::InvalidStateTransition {
        item_id: item_id.to_string(),
        operation,
        state,
    }
}
