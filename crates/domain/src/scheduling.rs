//! Daily schedule RPC types.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::WorkKind;

/// Parse a strict `HH:MM` 24-hour time string.
pub fn parse_hh_mm(raw: &str) -> Option<NaiveTime> {
    let (h, m) = raw.split_once(':')?;
    if h.len() != 2 || m.len() != 2 {
        return None;
    }
    let hours: u32 = h.parse().ok()?;
    let minutes: u32 = m.parse().ok()?;
    NaiveTime::from_hms_opt(hours, minutes, 0)
}

fn validate_hh_mm(value: &str) -> Result<(), ValidationError> {
    parse_hh_mm(value).map(|_| ()).ok_or_else(|| {
        let mut error = ValidationError::new("time_format");
        error.message = Some("expected HH:MM".into());
        error
    })
}

/// A time slot in a daily plan request. `start`/`end` are local `HH:MM`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TimeSlotInput {
    #[validate(custom(function = validate_hh_mm))]
    pub start: String,
    #[validate(custom(function = validate_hh_mm))]
    pub end: String,
    pub kind: WorkKind,
    #[validate(range(min = 0.0))]
    pub capacity_hours: Option<f64>,
    pub pinned_project_id: Option<Uuid>,
}

/// Where `plan_daily` draws its candidate tasks from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSourceType {
    AllTasks,
    Project,
    WeeklySchedule,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskSource {
    #[serde(rename = "type")]
    pub source_type: TaskSourceType,
    pub project_id: Option<Uuid>,
    /// Week start date (YYYY-MM-DD) of the stored weekly schedule to draw from.
    pub weekly_schedule_date: Option<String>,
}

impl Default for TaskSource {
    fn default() -> Self {
        Self {
            source_type: TaskSourceType::AllTasks,
            project_id: None,
            weekly_schedule_date: None,
        }
    }
}

/// User-pinned (task, slot) pair the packer must honor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedAssignmentInput {
    pub task_id: Uuid,
    pub slot_index: usize,
    pub duration_hours: Option<f64>,
}

/// Request for a single-day packing run.
#[derive(Debug, Deserialize, Validate)]
pub struct DailyScheduleRequest {
    /// Schedule date (YYYY-MM-DD).
    pub date: String,
    #[serde(default)]
    pub task_source: TaskSource,
    #[validate(length(min = 1), nested)]
    pub time_slots: Vec<TimeSlotInput>,
    #[serde(default)]
    pub fixed_assignments: Vec<FixedAssignmentInput>,
}

/// One packed assignment in the daily response.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleAssignment {
    pub task_id: Uuid,
    pub task_title: String,
    pub slot_index: usize,
    pub slot_start: String,
    pub slot_end: String,
    pub slot_kind: WorkKind,
    pub duration_hours: f64,
    pub is_fixed: bool,
}

#[derive(Debug, Serialize)]
pub struct DailyScheduleResponse {
    pub success: bool,
    pub date: String,
    pub assignments: Vec<ScheduleAssignment>,
    pub unscheduled_task_ids: Vec<Uuid>,
    pub total_scheduled_hours: f64,
    pub optimization_status: String,
    pub solve_time_seconds: f64,
    pub objective_value: f64,
    pub generated_at: DateTime<Utc>,
}

/// Stored daily plan blob.
#[derive(Debug, Deserialize, Validate)]
pub struct SaveDailyPlanRequest {
    pub plan: Value,
}

#[derive(Debug, Serialize)]
pub struct DailyPlanDocument {
    pub date: String,
    pub plan_json: Value,
    pub updated_at: DateTime<Utc>,
}

/// Pagination for schedule listings. Limit is capped at 100.
#[derive(Debug, Deserialize, Validate)]
pub struct ScheduleListQuery {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_schedule_limit")]
    #[validate(range(min = 1, max = 100))]
    pub limit: i64,
}

fn default_schedule_limit() -> i64 {
    20
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hh_mm_accepts_valid_times() {
        assert_eq!(
            parse_hh_mm("09:30"),
            NaiveTime::from_hms_opt(9, 30, 0)
        );
        assert_eq!(
            parse_hh_mm("23:59"),
            NaiveTime::from_hms_opt(23, 59, 0)
        );
        assert_eq!(parse_hh_mm("00:00"), NaiveTime::from_hms_opt(0, 0, 0));
    }

    #[test]
    fn parse_hh_mm_rejects_out_of_range_and_malformed() {
        assert!(parse_hh_mm("24:00").is_none());
        assert!(parse_hh_mm("12:60").is_none());
        assert!(parse_hh_mm("9:30").is_none());
        assert!(parse_hh_mm("0930").is_none());
        assert!(parse_hh_mm("").is_none());
        assert!(parse_hh_mm("ab:cd").is_none());
    }
}
