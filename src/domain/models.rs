use chrono::{NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

pub const MINUTES_PER_DAY: u32 = 24 * 60;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Task,
    Event,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Placement {
    pub day_index: usize,
    pub start_minutes: u32,
    pub duration_minutes: u32,
}

impl Placement {
    pub fn end_minutes(&self) -> u32 {
        self.start_minutes.saturating_add(self.duration_minutes)
    }

    pub fn overlaps(&self, other: &Placement) -> bool {
        self.day_index == other.day_index
            && ranges_intersect(
                self.start_minutes,
                self.end_minutes(),
                other.start_minutes,
                other.end_minutes(),
            )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchedulableItem {
    pub id: String,
    pub title: String,
    pub priority: Priority,
    pub kind: ItemKind,
    pub duration_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement: Option<Placement>,
}

impl SchedulableItem {
    pub fn task(id: impl Into<String>, title: impl Into<String>, priority: Priority) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            priority,
            kind: ItemKind::Task,
            duration_minutes: None,
            client: None,
            description: None,
            placement: None,
        }
    }

    pub fn event(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            kind: ItemKind::Event,
            ..Self::task(id, title, Priority::Medium)
        }
    }

    pub fn with_duration(mut self, duration_minutes: u32) -> Self {
        self.duration_minutes = Some(duration_minutes);
        self
    }

    pub fn is_event(&self) -> bool {
        self.kind == ItemKind::Event
    }

    pub fn is_scheduled(&self) -> bool {
        self.placement.is_some()
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "item.id")?;
        validate_non_empty(&self.title, "item.title")?;
        if self.duration_minutes == Some(0) {
            return Err("item.duration_minutes must be > 0".to_string());
        }
        Ok(())
    }
}

/// Half-open `[start, end)` minute window within a day.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeWindow {
    pub start_minutes: u32,
    pub end_minutes: u32,
}

impl TimeWindow {
    pub fn new(start_minutes: u32, end_minutes: u32) -> Self {
        Self {
            start_minutes,
            end_minutes,
        }
    }

    pub fn intersects(&self, start_minutes: u32, end_minutes: u32) -> bool {
        ranges_intersect(
            self.start_minutes,
            self.end_minutes,
            start_minutes,
            end_minutes,
        )
    }

    pub fn validate(&self, field_name: &str) -> Result<(), String> {
        if self.end_minutes <= self.start_minutes {
            return Err(format!("{field_name}.end must be after {field_name}.start"));
        }
        if self.end_minutes > MINUTES_PER_DAY {
            return Err(format!("{field_name}.end must be within the day"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DurationTable {
    pub urgent: u32,
    pub high: u32,
    pub medium: u32,
    pub low: u32,
    pub event: u32,
}

impl Default for DurationTable {
    fn default() -> Self {
        Self {
            urgent: 120,
            high: 90,
            medium: 60,
            low: 30,
            event: 60,
        }
    }
}

impl DurationTable {
    pub fn for_priority(&self, priority: Priority) -> u32 {
        match priority {
            Priority::Urgent => self.urgent,
            Priority::High => self.high,
            Priority::Medium => self.medium,
            Priority::Low => self.low,
        }
    }

    pub fn default_for(&self, item: &SchedulableItem) -> u32 {
        if let Some(duration) = item.duration_minutes {
            return duration;
        }
        match item.kind {
            ItemKind::Event => self.event,
            ItemKind::Task => self.for_priority(item.priority),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for (value, field_name) in [
            (self.urgent, "durations.urgent"),
            (self.high, "durations.high"),
            (self.medium, "durations.medium"),
            (self.low, "durations.low"),
            (self.event, "durations.event"),
        ] {
            if value == 0 {
                return Err(format!("{field_name} must be > 0"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkWeek {
    pub days: Vec<Weekday>,
    pub day_start_minutes: u32,
    pub day_end_minutes: u32,
    pub slot_minutes: u32,
}

impl Default for WorkWeek {
    fn default() -> Self {
        Self {
            days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            day_start_minutes: 8 * 60,
            day_end_minutes: 18 * 60,
            slot_minutes: 15,
        }
    }
}

impl WorkWeek {
    pub fn validate(&self) -> Result<(), String> {
        if self.days.is_empty() {
            return Err("week.days must not be empty".to_string());
        }
        if self.day_end_minutes <= self.day_start_minutes {
            return Err("week.work_hours.end must be after week.work_hours.start".to_string());
        }
        if self.day_end_minutes > MINUTES_PER_DAY {
            return Err("week.work_hours.end must be within the day".to_string());
        }
        if self.slot_minutes == 0 {
            return Err("week.slot_minutes must be > 0".to_string());
        }
        if (self.day_end_minutes - self.day_start_minutes) % self.slot_minutes != 0 {
            return Err("week.slot_minutes must evenly divide the work day".to_string());
        }
        Ok(())
    }

    pub fn day_name(&self, day_index: usize) -> Option<&'static str> {
        self.days.get(day_index).copied().map(weekday_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub week: WorkWeek,
    pub blackout: TimeWindow,
    pub durations: DurationTable,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            week: WorkWeek::default(),
            blackout: TimeWindow::new(12 * 60, 13 * 60),
            durations: DurationTable::default(),
        }
    }
}

impl Policy {
    pub fn validate(&self) -> Result<(), String> {
        self.week.validate()?;
        self.blackout.validate("blackout")?;
        self.durations.validate()
    }
}

pub fn ranges_intersect(left_start: u32, left_end: u32, right_start: u32, right_end: u32) -> bool {
    left_start < right_end && right_start < left_end
}

pub fn parse_hhmm(value: &str) -> Option<u32> {
    let time = NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()?;
    Some(time.hour() * 60 + time.minute())
}

pub fn format_hhmm(minutes: u32) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

pub fn parse_priority(value: &str) -> Option<Priority> {
    match value.trim().to_ascii_lowercase().as_str() {
        "low" => Some(Priority::Low),
        "medium" | "normal" => Some(Priority::Medium),
        "high" => Some(Priority::High),
        "urgent" => Some(Priority::Urgent),
        _ => None,
    }
}

pub fn parse_item_kind(value: &str) -> Option<ItemKind> {
    match value.trim().to_ascii_lowercase().as_str() {
        "task" => Some(ItemKind::Task),
        "event" => Some(ItemKind::Event),
        _ => None,
    }
}

pub fn parse_weekday(value: &str) -> Option<Weekday> {
    match value.trim().to_ascii_lowercase().as_str() {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
