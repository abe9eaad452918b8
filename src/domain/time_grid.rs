use crate::domain::models::WorkWeek;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("day index {day_index} is outside the work week (0..{days})")]
    DayOutOfRange { day_index: usize, days: usize },
    #[error("cell index {cell_index} is outside the work day (0..{cells})")]
    CellOutOfRange { cell_index: usize, cells: usize },
}

impl WorkWeek {
    pub fn check_day(&self, day_index: usize) -> Result<(), GridError> {
        if day_index >= self.days.len() {
            return Err(GridError::DayOutOfRange {
                day_index,
                days: self.days.len(),
            });
        }
        Ok(())
    }

    pub fn is_within_work_hours(
        &self,
        day_index: usize,
        start_minutes: u32,
        duration_minutes: u32,
    ) -> Result<bool, GridError> {
        self.check_day(day_index)?;
        let Some(end_minutes) = start_minutes.checked_add(duration_minutes) else {
            return Ok(false);
        };
        Ok(duration_minutes > 0
            && start_minutes >= self.day_start_minutes
            && end_minutes <= self.day_end_minutes)
    }

    pub fn cells_per_day(&self) -> usize {
        if self.slot_minutes == 0 || self.day_end_minutes <= self.day_start_minutes {
            return 0;
        }
        ((self.day_end_minutes - self.day_start_minutes) / self.slot_minutes) as usize
    }

    pub fn minutes_for_cell(&self, cell_index: usize) -> Result<u32, GridError> {
        let cells = self.cells_per_day();
        if cell_index >= cells {
            return Err(GridError::CellOutOfRange { cell_index, cells });
        }
        Ok(self.day_start_minutes + cell_index as u32 * self.slot_minutes)
    }

    /// Cell containing `minutes`, or `None` outside the work day.
    pub fn cell_for_minutes(&self, minutes: u32) -> Option<usize> {
        if self.slot_minutes == 0
            || minutes < self.day_start_minutes
            || minutes >= self.day_end_minutes
        {
            return None;
        }
        Some(((minutes - self.day_start_minutes) / self.slot_minutes) as usize)
    }

    pub fn cell_starts(&self) -> Vec<u32> {
        (0..self.cells_per_day())
            .map(|cell| self.day_start_minutes + cell as u32 * self.slot_minutes)
            .collect()
    }
}
