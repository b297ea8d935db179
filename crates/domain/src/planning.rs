//! Weekly planning pipeline request/response types.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use validator::Validate;

use crate::WorkKind;
use crate::scheduling::TimeSlotInput;

/// Per-project weekly allocation band.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProjectAllocationInput {
    pub project_id: Uuid,
    #[validate(range(min = 0.0))]
    pub target_hours: f64,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub max_hours: f64,
    #[serde(default)]
    #[validate(range(min = 0.0, max = 1.0))]
    pub priority_weight: f64,
}

/// Weekly capacity envelope.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct WeeklyConstraints {
    #[validate(range(min = 0.1, max = 168.0))]
    pub total_capacity_hours: f64,
    #[validate(range(min = 0.0, max = 24.0))]
    pub daily_max_hours: Option<f64>,
    #[validate(range(min = 0))]
    pub deep_work_blocks: Option<i32>,
    #[validate(range(min = 0.0))]
    pub meeting_buffer_hours: Option<f64>,
    #[serde(default)]
    #[validate(nested)]
    pub project_allocations: Vec<ProjectAllocationInput>,
}

fn default_true() -> bool {
    true
}

fn default_pipeline_timeout() -> u64 {
    30
}

/// Request for the weekly optimization pipeline.
#[derive(Debug, Deserialize, Validate)]
pub struct OptimizationRequest {
    /// Week start date (YYYY-MM-DD).
    pub week_start_date: String,
    #[validate(nested)]
    pub constraints: WeeklyConstraints,
    pub project_filter: Option<Vec<Uuid>>,
    #[serde(default)]
    pub selected_recurring_task_ids: Vec<Uuid>,
    #[validate(length(min = 1), nested)]
    pub daily_time_slots: Vec<TimeSlotInput>,
    #[serde(default)]
    pub preferences: Value,
    #[validate(length(max = 2000))]
    pub user_prompt: Option<String>,
    #[serde(default = "default_true")]
    pub use_ai_priority: bool,
    #[serde(default = "default_true")]
    pub enable_caching: bool,
    #[serde(default = "default_pipeline_timeout")]
    pub optimization_timeout_seconds: u64,
    #[serde(default = "default_true")]
    pub fallback_on_failure: bool,
}

/// Pipeline execution stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Initialization,
    Priorities,
    Selection,
    Packing,
    Integration,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Initialization => "initialization",
            PipelineStage::Priorities => "priorities",
            PipelineStage::Selection => "selection",
            PipelineStage::Packing => "packing",
            PipelineStage::Integration => "integration",
        }
    }
}

/// Overall pipeline status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OptimizationStatus {
    Success,
    PartialSuccess,
    Failed,
}

/// Result of one pipeline stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: PipelineStage,
    pub success: bool,
    pub duration_seconds: f64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl StageReport {
    pub fn ok(stage: PipelineStage, duration_seconds: f64) -> Self {
        Self {
            stage,
            success: true,
            duration_seconds,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn failed(stage: PipelineStage, duration_seconds: f64, errors: Vec<String>) -> Self {
        Self {
            stage,
            success: false,
            duration_seconds,
            errors,
            warnings: Vec::new(),
        }
    }
}

/// Weekly selection outcome, reconstructed from the solver result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklySelectionReport {
    pub success: bool,
    pub status: String,
    pub selected_task_ids: Vec<Uuid>,
    pub selected_recurring_task_ids: Vec<Uuid>,
    pub selected_hours: f64,
    pub hours_by_project: HashMap<Uuid, f64>,
    pub solve_time_seconds: f64,
    pub objective_value: f64,
}

/// One assignment inside a stored daily plan. This is the blob shape the
/// reschedule engine diffs against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanAssignment {
    pub task_id: Uuid,
    pub task_title: String,
    pub slot_index: usize,
    /// Slot start, local `HH:MM`.
    pub start_time: String,
    /// Slot end, local `HH:MM`.
    pub slot_end: String,
    pub slot_kind: WorkKind,
    pub duration_hours: f64,
    #[serde(default)]
    pub is_fixed: bool,
    /// Set on `continue` proposals to carry the updated remainder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_hours: Option<f64>,
}

/// Per-day packing outcome inside the weekly response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyOptimizationReport {
    pub date: String,
    pub total_scheduled_hours: f64,
    pub assignments: Vec<PlanAssignment>,
    pub unscheduled_task_ids: Vec<Uuid>,
    pub optimization_status: String,
    pub solve_time_seconds: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineMetrics {
    pub total_duration_seconds: f64,
    pub solver_time_seconds: f64,
    pub tasks_processed: usize,
    pub optimization_efficiency: f64,
}

/// Response from the weekly optimization pipeline.
#[derive(Debug, Serialize)]
pub struct OptimizationResponse {
    pub success: bool,
    pub status: OptimizationStatus,
    pub week_start_date: String,
    pub weekly_selection: Option<WeeklySelectionReport>,
    pub daily_optimizations: Vec<DailyOptimizationReport>,
    pub total_optimized_hours: f64,
    pub capacity_utilization: f64,
    pub consistency_score: f64,
    pub optimization_insights: Vec<String>,
    pub pipeline_metrics: PipelineMetrics,
    pub stage_results: Vec<StageReport>,
    pub generated_at: DateTime<Utc>,
}

/// Summary of one selected task stored in the weekly schedule blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedTaskSummary {
    pub task_id: Uuid,
    pub title: String,
    pub remaining_hours: f64,
    pub priority: i16,
}

/// Weekly schedule blob persisted per `(user, week_start)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyScheduleBlob {
    pub week_start_date: String,
    pub selected_tasks: Vec<SelectedTaskSummary>,
    pub selected_recurring_task_ids: Vec<Uuid>,
    pub project_allocations: Vec<ProjectAllocationInput>,
    pub daily_optimizations: Vec<DailyOptimizationReport>,
    pub insights: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

/// Entry in the weekly-schedule options listing.
#[derive(Debug, Serialize)]
pub struct WeeklyScheduleOption {
    pub week_start_date: String,
    pub task_count: usize,
    pub title: String,
}
