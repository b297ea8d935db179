//! Work session types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::errors::InvalidEnumValue;
use crate::impl_pg_text_enum;

/// How a checkout was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutType {
    Scheduled,
    Manual,
}

impl CheckoutType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutType::Scheduled => "scheduled",
            CheckoutType::Manual => "manual",
        }
    }
}

impl TryFrom<String> for CheckoutType {
    type Error = InvalidEnumValue;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "scheduled" => Ok(CheckoutType::Scheduled),
            "manual" => Ok(CheckoutType::Manual),
            _ => Err(InvalidEnumValue::new("checkout_type", value)),
        }
    }
}

impl_pg_text_enum!(CheckoutType);

/// What the user decided at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionDecision {
    Continue,
    Switch,
    Break,
    Complete,
}

impl SessionDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionDecision::Continue => "continue",
            SessionDecision::Switch => "switch",
            SessionDecision::Break => "break",
            SessionDecision::Complete => "complete",
        }
    }
}

impl TryFrom<String> for SessionDecision {
    type Error = InvalidEnumValue;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "continue" => Ok(SessionDecision::Continue),
            "switch" => Ok(SessionDecision::Switch),
            "break" => Ok(SessionDecision::Break),
            "complete" => Ok(SessionDecision::Complete),
            _ => Err(InvalidEnumValue::new("decision", value)),
        }
    }
}

impl_pg_text_enum!(SessionDecision);

/// Work session entity. Mutated only by the session engine; the escalator owns
/// the three notification flags and `marked_unresponsive_at`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub task_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub planned_checkout_at: DateTime<Utc>,
    pub planned_outcome: Option<String>,
    pub paused_at: Option<DateTime<Utc>>,
    pub total_paused_seconds: i64,
    pub ended_at: Option<DateTime<Utc>>,
    pub checkout_type: Option<CheckoutType>,
    pub decision: Option<SessionDecision>,
    pub continue_reason: Option<String>,
    pub kpt_keep: Option<String>,
    pub kpt_problem: Option<String>,
    pub kpt_try: Option<String>,
    pub remaining_estimate_hours: Option<f64>,
    pub snooze_count: i16,
    pub last_snooze_at: Option<DateTime<Utc>>,
    pub notification_5min_sent: bool,
    pub notification_checkout_sent: bool,
    pub notification_overdue_sent: bool,
    pub marked_unresponsive_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkSession {
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }
}

/// Start a new work session.
#[derive(Debug, Deserialize, Validate)]
pub struct StartSessionRequest {
    pub task_id: Uuid,
    pub planned_checkout_at: DateTime<Utc>,
    #[validate(length(max = 500))]
    pub planned_outcome: Option<String>,
}

/// Resume a paused session.
#[derive(Debug, Default, Deserialize)]
pub struct ResumeSessionRequest {
    /// Shift `planned_checkout_at` by the pause duration.
    #[serde(default)]
    pub extend_checkout: bool,
}

/// Snooze the current session's checkout deadline.
#[derive(Debug, Deserialize, Validate)]
pub struct SnoozeRequest {
    #[validate(range(min = 1, max = 15))]
    pub snooze_minutes: i64,
}

/// Checkout the current session.
#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    pub checkout_type: CheckoutType,
    pub decision: SessionDecision,
    #[validate(length(max = 500))]
    pub continue_reason: Option<String>,
    #[validate(length(max = 500))]
    pub kpt_keep: Option<String>,
    #[validate(length(max = 500))]
    pub kpt_problem: Option<String>,
    #[validate(length(max = 500))]
    pub kpt_try: Option<String>,
    #[validate(range(min = 0.0, max = 999.99))]
    pub remaining_estimate_hours: Option<f64>,
    pub next_task_id: Option<Uuid>,
}

/// Edit KPT fields of a completed session. `Some("")` clears a field, `None`
/// leaves it untouched.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateKptRequest {
    #[validate(length(max = 500))]
    pub kpt_keep: Option<String>,
    #[validate(length(max = 500))]
    pub kpt_problem: Option<String>,
    #[validate(length(max = 500))]
    pub kpt_try: Option<String>,
}

/// Checkout response: the terminal session plus the work log it produced.
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub session: WorkSession,
    pub log: crate::WorkLog,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reschedule_suggestion: Option<crate::RescheduleSuggestion>,
}

/// Pagination for history listings.
#[derive(Debug, Deserialize, Validate)]
pub struct HistoryQuery {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_history_limit")]
    #[validate(range(min = 1, max = 100))]
    pub limit: i64,
}

fn default_history_limit() -> i64 {
    20
}
