use crate::application::schedule_store::{ScheduleError, ScheduleStore};
use crate::domain::ids::next_id;
use crate::domain::models::{Placement, SchedulableItem};
use crate::domain::placement::PlacementRejection;
use crate::domain::time_grid::GridError;
use serde::{Deserialize, Serialize};
use std::mem;
use thiserror::Error;

const QUICK_ADD_TITLE: &str = "New event";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DragOrigin {
    Backlog,
    Grid,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DragSession {
    #[default]
    Idle,
    Dragging {
        item_id: String,
        origin: DragOrigin,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DropOutcome {
    Scheduled { item: SchedulableItem },
    Rescheduled { item: SchedulableItem },
    Unscheduled { item: SchedulableItem },
    Rejected { item_id: String, rejection: PlacementRejection },
    /// Backlog item dropped back onto the backlog.
    Unchanged { item_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "preview", rename_all = "snake_case")]
pub enum DropPreview {
    Allowed { placement: Placement },
    Blocked { rejection: PlacementRejection },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InteractionError {
    #[error("a drag session is already in progress for item {item_id}")]
    DragInProgress { item_id: String },
    #[error("no drag session is in progress")]
    NoActiveDrag,
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Store(#[from] ScheduleError),
}

#[derive(Debug, Default)]
pub struct InteractionController {
    session: DragSession,
}

impl InteractionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self) -> &DragSession {
        &self.session
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.session, DragSession::Dragging { .. })
    }

    pub fn drag_start(&mut self, item_id: &str, origin: DragOrigin) -> Result<(), InteractionError> {
        if let DragSession::Dragging { item_id: active, .. } = &self.session {
            return Err(InteractionError::DragInProgress {
                item_id: active.clone(),
            });
        }
        self.session = DragSession::Dragging {
            item_id: item_id.to_string(),
            origin,
        };
        Ok(())
    }

    pub fn drag_over(
        &self,
        store: &ScheduleStore,
        day_index: usize,
        cell_index: usize,
    ) -> Result<DropPreview, InteractionError> {
        let DragSession::Dragging { item_id, origin } = &self.session else {
            return Err(InteractionError::NoActiveDrag);
        };
        let week = &store.policy().week;
        week.check_day(day_index)?;
        let start_minutes = week.minutes_for_cell(cell_index)?;

        let checked = match origin {
            DragOrigin::Backlog => store.check_schedule(item_id, day_index, start_minutes, None),
            DragOrigin::Grid => store.check_reschedule(item_id, day_index, start_minutes),
        };
        match checked {
            Ok(placement) => Ok(DropPreview::Allowed { placement }),
            Err(ScheduleError::Rejected(rejection)) => Ok(DropPreview::Blocked { rejection }),
            Err(error) => Err(error.into()),
        }
    }

    pub fn drop_on_cell(
        &mut self,
        store: &mut ScheduleStore,
        day_index: usize,
        cell_index: usize,
    ) -> Result<DropOutcome, InteractionError> {
        let (item_id, origin) = self.take_session()?;
        let week = &store.policy().week;
        week.check_day(day_index)?;
        let start_minutes = week.minutes_for_cell(cell_index)?;

        let result = match origin {
            DragOrigin::Backlog => store
                .schedule(&item_id, day_index, start_minutes, None)
                .map(|item| DropOutcome::Scheduled { item }),
            DragOrigin::Grid => store
                .reschedule(&item_id, day_index, start_minutes)
                .map(|item| DropOutcome::Rescheduled { item }),
        };
        match result {
            Ok(outcome) => Ok(outcome),
            Err(ScheduleError::Rejected(rejection)) => Ok(DropOutcome::Rejected { item_id, rejection }),
            Err(error) => Err(error.into()),
        }
    }

    pub fn drop_on_backlog_area(
        &mut self,
        store: &mut ScheduleStore,
    ) -> Result<DropOutcome, InteractionError> {
        let (item_id, origin) = self.take_session()?;
        match origin {
            DragOrigin::Backlog => Ok(DropOutcome::Unchanged { item_id }),
            DragOrigin::Grid => {
                let item = store.unschedule(&item_id)?;
                Ok(DropOutcome::Unscheduled { item })
            }
        }
    }

    /// Drag released outside any drop target.
    pub fn cancel_drag(&mut self) -> Option<String> {
        match mem::take(&mut self.session) {
            DragSession::Dragging { item_id, .. } => Some(item_id),
            DragSession::Idle => None,
        }
    }

    /// Creates an event straight on the grid.
    pub fn quick_add(
        &self,
        store: &mut ScheduleStore,
        day_index: usize,
        start_minutes: u32,
        title: Option<&str>,
    ) -> Result<SchedulableItem, ScheduleError> {
        let title = title
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(QUICK_ADD_TITLE);
        let event = SchedulableItem::event(next_id("evt"), title);
        store.insert_scheduled(event, day_index, start_minutes, None)
    }

    fn take_session(&mut self) -> Result<(String, DragOrigin), InteractionError> {
        match mem::take(&mut self.session) {
            DragSession::Dragging { item_id, origin } => Ok((item_id, origin)),
            DragSession::Idle => Err(InteractionError::NoActiveDrag),
        }
    }
}
