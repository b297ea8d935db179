//! Reschedule suggestion types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use validator::Validate;

use crate::errors::InvalidEnumValue;
use crate::impl_pg_text_enum;

/// What produced a reschedule suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RescheduleTriggerType {
    Checkout,
    ManualCheckout,
    OverdueRecovery,
}

impl RescheduleTriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RescheduleTriggerType::Checkout => "CHECKOUT",
            RescheduleTriggerType::ManualCheckout => "MANUAL_CHECKOUT",
            RescheduleTriggerType::OverdueRecovery => "OVERDUE_RECOVERY",
        }
    }
}

impl TryFrom<String> for RescheduleTriggerType {
    type Error = InvalidEnumValue;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "CHECKOUT" => Ok(RescheduleTriggerType::Checkout),
            "MANUAL_CHECKOUT" => Ok(RescheduleTriggerType::ManualCheckout),
            "OVERDUE_RECOVERY" => Ok(RescheduleTriggerType::OverdueRecovery),
            _ => Err(InvalidEnumValue::new("trigger_type", value)),
        }
    }
}

impl_pg_text_enum!(RescheduleTriggerType);

/// Suggestion lifecycle status. Terminal statuses carry `decided_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuggestionStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
}

impl SuggestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionStatus::Pending => "PENDING",
            SuggestionStatus::Accepted => "ACCEPTED",
            SuggestionStatus::Rejected => "REJECTED",
            SuggestionStatus::Expired => "EXPIRED",
        }
    }
}

impl TryFrom<String> for SuggestionStatus {
    type Error = InvalidEnumValue;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "PENDING" => Ok(SuggestionStatus::Pending),
            "ACCEPTED" => Ok(SuggestionStatus::Accepted),
            "REJECTED" => Ok(SuggestionStatus::Rejected),
            "EXPIRED" => Ok(SuggestionStatus::Expired),
            _ => Err(InvalidEnumValue::new("status", value)),
        }
    }
}

impl_pg_text_enum!(SuggestionStatus);

/// Kind of change in a schedule diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Pushed,
    Added,
    Removed,
    Reordered,
}

/// One entry in a schedule diff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleDiffItem {
    pub task_id: Uuid,
    pub task_title: String,
    pub change_type: ChangeType,
    pub original_slot_index: Option<usize>,
    pub new_slot_index: Option<usize>,
    pub reason: String,
}

/// Typed diff between the original and proposed day plans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleDiff {
    pub pushed: Vec<ScheduleDiffItem>,
    pub added: Vec<ScheduleDiffItem>,
    pub removed: Vec<ScheduleDiffItem>,
    pub reordered: Vec<ScheduleDiffItem>,
    pub total_changes: usize,
    pub has_significant_changes: bool,
}

impl ScheduleDiff {
    pub fn from_parts(
        pushed: Vec<ScheduleDiffItem>,
        added: Vec<ScheduleDiffItem>,
        removed: Vec<ScheduleDiffItem>,
        reordered: Vec<ScheduleDiffItem>,
    ) -> Self {
        let total_changes = pushed.len() + added.len() + removed.len() + reordered.len();
        Self {
            pushed,
            added,
            removed,
            reordered,
            total_changes,
            has_significant_changes: total_changes > 0,
        }
    }
}

/// Persisted reschedule suggestion.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RescheduleSuggestion {
    pub id: Uuid,
    pub user_id: Uuid,
    pub work_session_id: Uuid,
    pub trigger_type: RescheduleTriggerType,
    pub trigger_decision: String,
    pub original_plan: Value,
    pub proposed_plan: Value,
    pub diff: Value,
    pub status: SuggestionStatus,
    pub expires_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Audit row written whenever a suggestion is accepted or rejected.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RescheduleDecision {
    pub id: i64,
    pub suggestion_id: Uuid,
    pub user_id: Uuid,
    pub accepted: bool,
    pub reason: Option<String>,
    pub context: Value,
    pub created_at: DateTime<Utc>,
}

/// Accept/reject request body.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct DecideSuggestionRequest {
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

/// Filter for the suggestion listing.
#[derive(Debug, Deserialize)]
pub struct SuggestionQuery {
    pub status: Option<SuggestionStatus>,
}
