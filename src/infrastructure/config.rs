use crate::domain::models::{parse_hhmm, parse_weekday, DurationTable, Policy, TimeWindow, WorkWeek};
use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const WEEK_JSON: &str = "week.json";
const PLANNER_JSON: &str = "planner.json";
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_MAX_ATTEMPTS: u8 = 2;

pub const PLANNER_ENDPOINT_KEYS: &[&str] = &["MYWEEK_PLANNER_ENDPOINT", "PLANNER_ENDPOINT"];
pub const PLANNER_API_KEY_KEYS: &[&str] = &["MYWEEK_PLANNER_API_KEY", "PLANNER_API_KEY"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HoursConfig {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WeekConfig {
    pub schema: u8,
    pub days: Vec<String>,
    pub work_hours: HoursConfig,
    pub slot_minutes: u32,
    pub blackout: HoursConfig,
    #[serde(default)]
    pub durations: DurationTable,
}

impl WeekConfig {
    pub fn to_policy(&self) -> Result<Policy, InfraError> {
        let days = self
            .days
            .iter()
            .map(|day| {
                parse_weekday(day)
                    .ok_or_else(|| InfraError::InvalidConfig(format!("unsupported day in {WEEK_JSON}: {day}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let policy = Policy {
            week: WorkWeek {
                days,
                day_start_minutes: parse_config_time(&self.work_hours.start, "workHours.start")?,
                day_end_minutes: parse_config_time(&self.work_hours.end, "workHours.end")?,
                slot_minutes: self.slot_minutes,
            },
            blackout: TimeWindow::new(
                parse_config_time(&self.blackout.start, "blackout.start")?,
                parse_config_time(&self.blackout.end, "blackout.end")?,
            ),
            durations: self.durations,
        };
        policy.validate().map_err(InfraError::InvalidConfig)?;
        Ok(policy)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlannerStrategy {
    #[default]
    Heuristic,
    Remote,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlannerConfig {
    pub schema: u8,
    #[serde(default)]
    pub strategy: PlannerStrategy,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u8,
}

impl PlannerConfig {
    /// Environment values win over the file.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = optional_lookup_value(&lookup, PLANNER_ENDPOINT_KEYS) {
            self.endpoint = Some(endpoint);
            if self.strategy == PlannerStrategy::Heuristic {
                self.strategy = PlannerStrategy::Remote;
            }
        }
        self
    }

    pub fn validate(&self) -> Result<(), InfraError> {
        if self.timeout_seconds == 0 {
            return Err(InfraError::InvalidConfig(
                "planner.timeoutSeconds must be > 0".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(InfraError::InvalidConfig(
                "planner.maxAttempts must be > 0".to_string(),
            ));
        }
        if self.strategy == PlannerStrategy::Remote
            && self
                .endpoint
                .as_deref()
                .map(str::trim)
                .is_none_or(str::is_empty)
        {
            return Err(InfraError::InvalidConfig(format!(
                "remote planner requires an endpoint (set planner.endpoint or one of: {})",
                PLANNER_ENDPOINT_KEYS.join(", ")
            )));
        }
        Ok(())
    }
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

fn default_max_attempts() -> u8 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            WEEK_JSON,
            serde_json::json!({
                "schema": 1,
                "days": ["Monday", "Tuesday", "Wednesday", "Thursday", "Friday"],
                "workHours": {
                    "start": "08:00",
                    "end": "18:00"
                },
                "slotMinutes": 15,
                "blackout": {
                    "start": "12:00",
                    "end": "13:00"
                },
                "durations": {
                    "urgent": 120,
                    "high": 90,
                    "medium": 60,
                    "low": 30,
                    "event": 60
                }
            }),
        ),
        (
            PLANNER_JSON,
            serde_json::json!({
                "schema": 1,
                "strategy": "heuristic",
                "endpoint": null,
                "timeoutSeconds": DEFAULT_TIMEOUT_SECONDS,
                "maxAttempts": DEFAULT_MAX_ATTEMPTS
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_week_config(config_dir: &Path) -> Result<WeekConfig, InfraError> {
    let value = read_config(&config_dir.join(WEEK_JSON))?;
    Ok(serde_json::from_value(value)?)
}

pub fn load_policy(config_dir: &Path) -> Result<Policy, InfraError> {
    load_week_config(config_dir)?.to_policy()
}

pub fn load_planner_config(config_dir: &Path) -> Result<PlannerConfig, InfraError> {
    let value = read_config(&config_dir.join(PLANNER_JSON))?;
    let config: PlannerConfig = serde_json::from_value(value)?;
    config.validate()?;
    Ok(config)
}

pub fn optional_lookup_value<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    for key in keys {
        if let Some(value) = lookup(key) {
            let normalized = value.trim();
            if !normalized.is_empty() {
                return Some(normalized.to_string());
            }
        }
    }
    None
}

fn parse_config_time(value: &str, field_name: &str) -> Result<u32, InfraError> {
    parse_hhmm(value).ok_or_else(|| {
        InfraError::InvalidConfig(format!("{field_name} must be HH:MM, got {value:?}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_DIR: AtomicUsize = AtomicUsize::new(0);

    struct TempConfigDir {
        path: PathBuf,
    }

    impl TempConfigDir {
        fn new() -> Self {
            let sequence = NEXT_TEMP_DIR.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "myweek-config-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp config dir");
            Self { path }
        }

        fn write(&self, name: &str, value: serde_json::Value) {
            fs::write(self.path.join(name), value.to_string()).expect("write config");
        }
    }

    impl Drop for TempConfigDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    #[test]
    fn default_configs_load_into_default_policy() {
        let dir = TempConfigDir::new();
        ensure_default_configs(&dir.path).expect("write defaults");

        let policy = load_policy(&dir.path).expect("load policy");
        let planner = load_planner_config(&dir.path).expect("load planner config");

        assert_eq!(policy, Policy::default());
        assert_eq!(planner.strategy, PlannerStrategy::Heuristic);
        assert_eq!(planner.timeout_seconds, DEFAULT_TIMEOUT_SECONDS);
        assert_eq!(planner.endpoint, None);
    }

    #[test]
    fn existing_files_are_not_overwritten() {
        let dir = TempConfigDir::new();
        let mut week = default_files()
            .remove(WEEK_JSON)
            .expect("week defaults");
        week["slotMinutes"] = serde_json::json!(30);
        dir.write(WEEK_JSON, week);

        ensure_default_configs(&dir.path).expect("write defaults");
        let policy = load_policy(&dir.path).expect("load policy");

        assert_eq!(policy.week.slot_minutes, 30);
    }

    #[test]
    fn rejects_unsupported_schema() {
        let dir = TempConfigDir::new();
        dir.write(PLANNER_JSON, serde_json::json!({ "schema": 2, "strategy": "manual" }));

        match load_planner_config(&dir.path) {
            Err(InfraError::InvalidConfig(message)) => assert!(message.contains("unsupported schema 2")),
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_work_hours() {
        let dir = TempConfigDir::new();
        let mut week = default_files()
            .remove(WEEK_JSON)
            .expect("week defaults");
        week["workHours"]["end"] = serde_json::json!("7pm");
        dir.write(WEEK_JSON, week);

        match load_policy(&dir.path) {
            Err(InfraError::InvalidConfig(message)) => assert!(message.contains("workHours.end")),
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    #[test]
    fn rejects_work_day_not_divisible_into_slots() {
        let dir = TempConfigDir::new();
        let mut week = default_files()
            .remove(WEEK_JSON)
            .expect("week defaults");
        week["slotMinutes"] = serde_json::json!(25);
        dir.write(WEEK_JSON, week);

        assert!(matches!(
            load_policy(&dir.path),
            Err(InfraError::InvalidConfig(_))
        ));
    }

    #[test]
    fn remote_strategy_requires_endpoint() {
        let dir = TempConfigDir::new();
        dir.write(PLANNER_JSON, serde_json::json!({ "schema": 1, "strategy": "remote" }));

        assert!(matches!(
            load_planner_config(&dir.path),
            Err(InfraError::InvalidConfig(_))
        ));
    }

    #[test]
    fn environment_endpoint_switches_to_remote() {
        let config = PlannerConfig {
            schema: 1,
            strategy: PlannerStrategy::Heuristic,
            endpoint: None,
            timeout_seconds: 30,
            max_attempts: 2,
        };

        let overridden = config.with_overrides(|key| match key {
            "PLANNER_ENDPOINT" => Some(" https://planner.example.com/plan ".to_string()),
            _ => None,
        });

        assert_eq!(overridden.strategy, PlannerStrategy::Remote);
        assert_eq!(
            overridden.endpoint.as_deref(),
            Some("https://planner.example.com/plan")
        );
        assert!(overridden.validate().is_ok());
    }

    #[test]
    fn manual_strategy_is_kept_with_environment_endpoint() {
        let config = PlannerConfig {
            schema: 1,
            strategy: PlannerStrategy::Manual,
            endpoint: None,
            timeout_seconds: 30,
            max_attempts: 2,
        };

        let overridden = config.with_overrides(|key| match key {
            "MYWEEK_PLANNER_ENDPOINT" => Some("https://planner.example.com/plan".to_string()),
            _ => None,
        });

        assert_eq!(overridden.strategy, PlannerStrategy::Manual);
    }
}
