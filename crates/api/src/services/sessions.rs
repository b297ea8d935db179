//! Work-session engine: guarded state machine for start, pause/resume,
//! snooze and checkout.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use cadence_domain::{
    CheckoutRequest, DomainError, ResumeSessionRequest, SessionDecision, SnoozeRequest,
    StartSessionRequest, UpdateKptRequest, WorkLog, WorkSession,
};
use cadence_storage::{
    LogRepository, SessionCheckout, SessionRepository, StorageError, TaskRepository,
};

/// Maximum number of snoozes per session.
pub const MAX_SNOOZE_COUNT: i16 = 2;
/// Upper bound on `task.estimate_hours` after a checkout adjustment.
pub const MAX_ESTIMATE_HOURS: f64 = 999.99;

#[derive(Clone)]
pub struct SessionEngine {
    sessions: SessionRepository,
    tasks: TaskRepository,
    logs: LogRepository,
}

impl SessionEngine {
    pub fn new(sessions: SessionRepository, tasks: TaskRepository, logs: LogRepository) -> Self {
        Self {
            sessions,
            tasks,
            logs,
        }
    }

    pub async fn current(&self, user_id: Uuid) -> Result<Option<WorkSession>, DomainError> {
        self.sessions
            .current(user_id)
            .await
            .map_err(storage_error)
    }

    pub async fn start(
        &self,
        user_id: Uuid,
        request: &StartSessionRequest,
    ) -> Result<WorkSession, DomainError> {
        if self
            .sessions
            .current(user_id)
            .await
            .map_err(storage_error)?
            .is_some()
        {
            return Err(DomainError::Conflict(
                "An active session already exists. Please end it first.".to_string(),
            ));
        }

        self.tasks
            .get_task(user_id, request.task_id)
            .await
            .map_err(storage_error)?
            .ok_or_else(|| DomainError::NotFound("Task not found".to_string()))?;

        match self
            .sessions
            .start(
                user_id,
                request.task_id,
                request.planned_checkout_at,
                request.planned_outcome.as_deref(),
            )
            .await
        {
            Ok(session) => {
                tracing::info!(user_id = %user_id, session_id = %session.id, "work session started");
                Ok(session)
            }
            // The partial unique index catches a racing start.
            Err(StorageError::UniqueViolation(_)) => Err(DomainError::Conflict(
                "An active session already exists. Please end it first.".to_string(),
            )),
            Err(e) => Err(storage_error(e)),
        }
    }

    pub async fn pause(&self, user_id: Uuid) -> Result<WorkSession, DomainError> {
        let session = self.require_active(user_id).await?;
        if session.is_paused() {
            return Err(DomainError::Validation(
                "Session is already paused".to_string(),
            ));
        }
        self.sessions
            .set_paused(session.id, Utc::now())
            .await
            .map_err(storage_error)
    }

    pub async fn resume(
        &self,
        user_id: Uuid,
        request: &ResumeSessionRequest,
    ) -> Result<WorkSession, DomainError> {
        let session = self.require_active(user_id).await?;
        let Some(paused_at) = session.paused_at else {
            return Err(DomainError::Validation("Session is not paused".to_string()));
        };

        let now = Utc::now();
        let pause_seconds = (now - paused_at).num_seconds().max(0);
        let total_paused = session.total_paused_seconds + pause_seconds;
        let planned_checkout = if request.extend_checkout {
            session.planned_checkout_at + chrono::Duration::seconds(pause_seconds)
        } else {
            session.planned_checkout_at
        };

        self.sessions
            .apply_resume(session.id, total_paused, planned_checkout, now)
            .await
            .map_err(storage_error)
    }

    pub async fn snooze(
        &self,
        user_id: Uuid,
        request: &SnoozeRequest,
    ) -> Result<WorkSession, DomainError> {
        let session = self.require_active(user_id).await?;
        if session.marked_unresponsive_at.is_some() {
            return Err(DomainError::Validation(
                "Cannot snooze an unresponsive session".to_string(),
            ));
        }
        if session.snooze_count >= MAX_SNOOZE_COUNT {
            return Err(DomainError::Validation(format!(
                "Maximum snooze count ({}) reached",
                MAX_SNOOZE_COUNT
            )));
        }

        let now = Utc::now();
        let new_checkout =
            session.planned_checkout_at + chrono::Duration::minutes(request.snooze_minutes);
        let updated = self
            .sessions
            .apply_snooze(session.id, new_checkout, session.snooze_count + 1, now)
            .await
            .map_err(storage_error)?;

        tracing::info!(
            session_id = %updated.id,
            snooze_count = updated.snooze_count,
            new_checkout = %new_checkout,
            "session snoozed"
        );
        Ok(updated)
    }

    pub async fn checkout(
        &self,
        user_id: Uuid,
        request: &CheckoutRequest,
    ) -> Result<(WorkSession, WorkLog), DomainError> {
        let session = self.require_active(user_id).await?;

        if request.decision == SessionDecision::Continue && !has_kpt(request) {
            return Err(DomainError::Validation(
                "At least one KPT field is required when continuing".to_string(),
            ));
        }

        let ended_at = Utc::now();
        // A checkout while paused folds the open pause into the total.
        let mut total_paused = session.total_paused_seconds;
        if let Some(paused_at) = session.paused_at {
            total_paused += (ended_at - paused_at).num_seconds().max(0);
        }

        let actual_minutes = actual_minutes(session.started_at, ended_at, total_paused);

        let new_estimate_hours = match request.remaining_estimate_hours {
            Some(remaining) => {
                let logged = self
                    .logs
                    .total_minutes_for_task(session.task_id)
                    .await
                    .map_err(storage_error)?;
                Some(adjusted_estimate(logged + actual_minutes as i64, remaining)?)
            }
            None => None,
        };

        let checkout = SessionCheckout {
            session_id: session.id,
            user_id,
            task_id: session.task_id,
            ended_at,
            total_paused_seconds: total_paused,
            checkout_type: request.checkout_type,
            decision: request.decision,
            continue_reason: request.continue_reason.clone(),
            kpt_keep: request.kpt_keep.clone(),
            kpt_problem: request.kpt_problem.clone(),
            kpt_try: request.kpt_try.clone(),
            remaining_estimate_hours: request.remaining_estimate_hours,
            actual_minutes,
            kpt_summary: kpt_summary(
                request.kpt_keep.as_deref(),
                request.kpt_problem.as_deref(),
                request.kpt_try.as_deref(),
            ),
            new_estimate_hours,
        };

        let (session, log) = self
            .sessions
            .finish_checkout(&checkout)
            .await
            .map_err(storage_error)?;

        tracing::info!(
            session_id = %session.id,
            actual_minutes,
            decision = request.decision.as_str(),
            "work session checked out"
        );
        Ok((session, log))
    }

    /// Post-checkout KPT edit: `Some("")` clears, `None` keeps the stored
    /// value. Everything else is immutable after checkout.
    pub async fn update_kpt(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        request: &UpdateKptRequest,
    ) -> Result<WorkSession, DomainError> {
        let session = self
            .sessions
            .get(user_id, session_id)
            .await
            .map_err(storage_error)?
            .ok_or_else(|| DomainError::NotFound("Session not found".to_string()))?;

        if session.is_active() {
            return Err(DomainError::Validation(
                "KPT can only be edited after checkout".to_string(),
            ));
        }

        let keep = merge_kpt(&session.kpt_keep, &request.kpt_keep);
        let problem = merge_kpt(&session.kpt_problem, &request.kpt_problem);
        let tried = merge_kpt(&session.kpt_try, &request.kpt_try);

        self.sessions
            .update_kpt(
                session.id,
                keep.as_deref(),
                problem.as_deref(),
                tried.as_deref(),
                Utc::now(),
            )
            .await
            .map_err(storage_error)
    }

    pub async fn history(
        &self,
        user_id: Uuid,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<WorkSession>, DomainError> {
        self.sessions
            .history(user_id, skip, limit)
            .await
            .map_err(storage_error)
    }

    async fn require_active(&self, user_id: Uuid) -> Result<WorkSession, DomainError> {
        self.sessions
            .current(user_id)
            .await
            .map_err(storage_error)?
            .ok_or_else(|| DomainError::NotFound("No active session found".to_string()))
    }
}

fn storage_error(e: StorageError) -> DomainError {
    DomainError::Database(e.to_string())
}

fn has_kpt(request: &CheckoutRequest) -> bool {
    let filled = |field: &Option<String>| field.as_deref().is_some_and(|s| !s.trim().is_empty());
    filled(&request.kpt_keep) || filled(&request.kpt_problem) || filled(&request.kpt_try)
}

/// Wall-clock elapsed minus paused time, floored to whole minutes, minimum 1.
fn actual_minutes(
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    total_paused_seconds: i64,
) -> i32 {
    let actual_seconds = (ended_at - started_at).num_seconds() - total_paused_seconds;
    (actual_seconds / 60).max(1) as i32
}

/// `"K: … | P: … | T: …"`, each field capped at 100 chars, whole summary at
/// 500.
fn kpt_summary(keep: Option<&str>, problem: Option<&str>, tried: Option<&str>) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(keep) = keep.filter(|s| !s.is_empty()) {
        parts.push(format!("K: {}", truncate_chars(keep, 100)));
    }
    if let Some(problem) = problem.filter(|s| !s.is_empty()) {
        parts.push(format!("P: {}", truncate_chars(problem, 100)));
    }
    if let Some(tried) = tried.filter(|s| !s.is_empty()) {
        parts.push(format!("T: {}", truncate_chars(tried, 100)));
    }
    if parts.is_empty() {
        return None;
    }
    Some(truncate_chars(&parts.join(" | "), 500))
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// New `task.estimate_hours` so that estimate − actual ≈ remaining, rounded
/// to 0.01 half-up. Must stay in (0, 999.99].
fn adjusted_estimate(total_minutes_logged: i64, remaining_hours: f64) -> Result<f64, DomainError> {
    let remaining = round2(remaining_hours);
    let new_estimate = round2(total_minutes_logged as f64 / 60.0 + remaining);

    if new_estimate > MAX_ESTIMATE_HOURS {
        return Err(DomainError::Validation(format!(
            "Updated estimate_hours ({:.2}h) exceeds maximum ({}h)",
            new_estimate, MAX_ESTIMATE_HOURS
        )));
    }
    if new_estimate <= 0.0 {
        return Err(DomainError::Validation(
            "Updated estimate_hours must be greater than 0".to_string(),
        ));
    }
    Ok(new_estimate)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn merge_kpt(current: &Option<String>, update: &Option<String>) -> Option<String> {
    match update {
        None => current.clone(),
        Some(s) if s.is_empty() => None,
        Some(s) => Some(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn actual_minutes_subtracts_pauses_and_floors() {
        let started = Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap();
        let ended = Utc.with_ymd_and_hms(2025, 3, 3, 10, 30, 45).unwrap();

        // 90m45s elapsed minus 20m paused = 70m45s → 70 minutes.
        assert_eq!(actual_minutes(started, ended, 20 * 60), 70);
    }

    #[test]
    fn actual_minutes_is_at_least_one() {
        let started = Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap();
        let ended = started + chrono::Duration::seconds(30);

        assert_eq!(actual_minutes(started, ended, 0), 1);
        assert_eq!(actual_minutes(started, ended, 3600), 1);
    }

    #[test]
    fn kpt_summary_joins_and_truncates() {
        let summary = kpt_summary(Some("kept"), None, Some("try next")).unwrap();
        assert_eq!(summary, "K: kept | T: try next");

        let long = "x".repeat(250);
        let summary = kpt_summary(Some(&long), Some(&long), Some(&long)).unwrap();
        assert!(summary.starts_with("K: "));
        assert!(summary.chars().count() <= 500);
    }

    #[test]
    fn kpt_summary_empty_fields_yield_none() {
        assert!(kpt_summary(None, None, None).is_none());
        assert!(kpt_summary(Some(""), Some(""), Some("")).is_none());
    }

    #[test]
    fn adjusted_estimate_rounds_half_up() {
        // 90 minutes logged + 2.005 remaining → 1.5 + 2.01 = 3.51.
        let estimate = adjusted_estimate(90, 2.005).unwrap();
        assert!((estimate - 3.51).abs() < 1e-9);
    }

    #[test]
    fn adjusted_estimate_rejects_out_of_range() {
        assert!(adjusted_estimate(0, 0.0).is_err());
        assert!(adjusted_estimate(60_000_000, 1.0).is_err());
    }

    #[test]
    fn continue_requires_a_non_empty_kpt_field() {
        let request = CheckoutRequest {
            checkout_type: cadence_domain::CheckoutType::Scheduled,
            decision: SessionDecision::Continue,
            continue_reason: None,
            kpt_keep: Some("   ".to_string()),
            kpt_problem: None,
            kpt_try: None,
            remaining_estimate_hours: None,
            next_task_id: None,
        };
        assert!(!has_kpt(&request));

        let request = CheckoutRequest {
            kpt_problem: Some("got stuck on the parser".to_string()),
            ..request
        };
        assert!(has_kpt(&request));
    }

    #[test]
    fn merge_kpt_clears_on_empty_and_keeps_on_none() {
        let current = Some("old".to_string());
        assert_eq!(merge_kpt(&current, &None), Some("old".to_string()));
        assert_eq!(merge_kpt(&current, &Some(String::new())), None);
        assert_eq!(
            merge_kpt(&current, &Some("new".to_string())),
            Some("new".to_string())
        );
    }
}
