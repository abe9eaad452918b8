use crate::domain::models::{Placement, Policy};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementCandidate {
    pub item_id: String,
    pub day_index: usize,
    pub start_minutes: u32,
    pub duration_minutes: u32,
}

impl PlacementCandidate {
    pub fn placement(&self) -> Placement {
        Placement {
            day_index: self.day_index,
            start_minutes: self.start_minutes,
            duration_minutes: self.duration_minutes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum PlacementRejection {
    #[error("placement is outside the work week")]
    OutOfBounds,
    #[error("placement intersects the lunch blackout window")]
    LunchConflict,
    #[error("placement overlaps item {conflicting_item_id}")]
    Overlap { conflicting_item_id: String },
}

/// Whether the blackout window applies to a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlackoutRule {
    Enforce,
    Exempt,
}

pub fn can_place<'a, I>(
    policy: &Policy,
    candidate: &PlacementCandidate,
    existing: I,
    blackout: BlackoutRule,
) -> Result<(), PlacementRejection>
where
    I: IntoIterator<Item = (&'a str, &'a Placement)>,
{
    let within = policy
        .week
        .is_within_work_hours(
            candidate.day_index,
            candidate.start_minutes,
            candidate.duration_minutes,
        )
        .unwrap_or(false);
    if !within {
        return Err(PlacementRejection::OutOfBounds);
    }

    let candidate_end = candidate.start_minutes + candidate.duration_minutes;
    if blackout == BlackoutRule::Enforce
        && policy
            .blackout
            .intersects(candidate.start_minutes, candidate_end)
    {
        return Err(PlacementRejection::LunchConflict);
    }

    let proposed = candidate.placement();
    for (item_id, placement) in existing {
        if item_id == candidate.item_id {
            continue;
        }
        if proposed.overlaps(placement) {
            return Err(PlacementRejection::Overlap {
                conflicting_item_id: item_id.to_string(),
            });
        }
    }

    Ok(())
}
