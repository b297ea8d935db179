//! Domain types for the Cadence planning server.

pub mod errors;
pub mod notifications;
pub mod planning;
pub mod reschedule;
pub mod scheduling;
pub mod sessions;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use errors::*;
pub use notifications::*;
pub use planning::*;
pub use reschedule::*;
pub use scheduling::*;
pub use sessions::*;

/// Maps a domain enum onto a Postgres TEXT column using its `as_str` /
/// `TryFrom<String>` pair.
macro_rules! impl_pg_text_enum {
    ($ty:ty) => {
        impl sqlx::Type<sqlx::Postgres> for $ty {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                <&str as sqlx::Type<sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
                <&str as sqlx::Type<sqlx::Postgres>>::compatible(ty)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Postgres> for $ty {
            fn decode(
                value: sqlx::postgres::PgValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let raw = <String as sqlx::Decode<'r, sqlx::Postgres>>::decode(value)?;
                Ok(<$ty>::try_from(raw)?)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Postgres> for $ty {
            fn encode_by_ref(
                &self,
                buf: &mut sqlx::postgres::PgArgumentBuffer,
            ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
                <&str as sqlx::Encode<'q, sqlx::Postgres>>::encode_by_ref(&self.as_str(), buf)
            }
        }
    };
}

pub(crate) use impl_pg_text_enum;

/// Work type shared by tasks and time slots. Matching a task's kind with a
/// slot's kind improves packing quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkKind {
    LightWork,
    FocusedWork,
    Study,
}

impl WorkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkKind::LightWork => "light_work",
            WorkKind::FocusedWork => "focused_work",
            WorkKind::Study => "study",
        }
    }
}

impl TryFrom<String> for WorkKind {
    type Error = InvalidEnumValue;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "light_work" => Ok(WorkKind::LightWork),
            "focused_work" => Ok(WorkKind::FocusedWork),
            "study" => Ok(WorkKind::Study),
            _ => Err(InvalidEnumValue::new("work_kind", value)),
        }
    }
}

impl_pg_text_enum!(WorkKind);

/// Task and goal lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl TryFrom<String> for TaskStatus {
    type Error = InvalidEnumValue;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            _ => Err(InvalidEnumValue::new("status", value)),
        }
    }
}

impl_pg_text_enum!(TaskStatus);

/// User entity.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub weekly_capacity_hours: f64,
    pub created_at: DateTime<Utc>,
}

/// Project entity. Projects contain goals; goals contain tasks.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// Goal entity.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Goal {
    pub id: Uuid,
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
}

/// Task entity.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    pub id: Uuid,
    pub goal_id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub estimate_hours: f64,
    pub work_kind: WorkKind,
    /// 1 = highest, 5 = lowest.
    pub priority: i16,
    pub due_at: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Hours still to be worked: estimate minus logged actuals, floored at 0.
    pub fn remaining_hours(&self, actual_hours: f64) -> f64 {
        (self.estimate_hours - actual_hours).max(0.0)
    }
}

/// Work log entry. Append-only during planning reads.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkLog {
    pub id: Uuid,
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub actual_minutes: i32,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Weekly recurring task. Soft-deleted; always schedulable (no dependencies).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WeeklyRecurringTask {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub estimate_hours: f64,
    pub category: Option<String>,
    pub active: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

/// Ready check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub database: String,
}

/// JWT claims for bearer authentication.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: u64,
    pub iat: u64,
}
