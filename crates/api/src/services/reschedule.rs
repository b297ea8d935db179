//! Reschedule engine: recompute the rest of the day after a checkout, diff it
//! against the saved plan, and apply the proposal on acceptance.
//!
//! Plan blobs are handled as loose JSON: a slot the engine cannot interpret
//! passes through unchanged rather than failing the whole operation.

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Value, json};
use uuid::Uuid;

use cadence_domain::{
    ChangeType, DomainError, RescheduleDecision, RescheduleSuggestion, RescheduleTriggerType,
    ScheduleDiff, ScheduleDiffItem, SessionDecision, WorkSession, parse_hh_mm,
};
use cadence_storage::{
    DecisionOutcome, NewSuggestion, ScheduleRepository, StorageError, SuggestionRepository,
    TaskRepository,
};

fn storage_error(e: StorageError) -> DomainError {
    DomainError::Database(e.to_string())
}

fn slot_task_id(slot: &Value) -> Option<&str> {
    slot.get("task_id").and_then(Value::as_str)
}

fn slot_time(slot: &Value, key: &str, date: NaiveDate) -> Option<NaiveDateTime> {
    let raw = slot.get(key).and_then(Value::as_str)?;
    parse_hh_mm(raw).map(|t| date.and_time(t))
}

/// Proposed plan after a normal checkout (the session's task is on today's
/// plan). COMPLETE drops the slot, CONTINUE keeps it with the updated
/// remainder, SWITCH and BREAK keep it as-is.
pub fn propose_after_checkout(
    slots: &[Value],
    ended_task_id: &str,
    remaining_estimate_hours: Option<f64>,
    decision: SessionDecision,
) -> Vec<Value> {
    let mut proposed = Vec::with_capacity(slots.len());
    for slot in slots {
        if slot_task_id(slot) == Some(ended_task_id) {
            match decision {
                SessionDecision::Complete => continue,
                SessionDecision::Continue => {
                    let mut updated = slot.clone();
                    if let (Some(remaining), Some(map)) =
                        (remaining_estimate_hours, updated.as_object_mut())
                    {
                        map.insert("remaining_hours".to_string(), json!(remaining));
                    }
                    proposed.push(updated);
                }
                SessionDecision::Switch | SessionDecision::Break => proposed.push(slot.clone()),
            }
        } else {
            proposed.push(slot.clone());
        }
    }
    proposed
}

/// Proposed plan after an off-plan (manual) execution: walk the day's slots
/// with a cursor starting at the execution end, shifting everything the
/// execution window displaced. Slots with unparseable times pass through.
pub fn propose_after_manual_execution(
    slots: &[Value],
    execution_start: DateTime<Utc>,
    execution_end: DateTime<Utc>,
) -> Vec<Value> {
    if execution_end <= execution_start {
        return slots.to_vec();
    }

    let day = execution_start.date_naive();
    let exec_start = execution_start.naive_utc();
    let exec_end = execution_end.naive_utc();

    let mut proposed = Vec::with_capacity(slots.len());
    let mut next_available = exec_end;

    for slot in slots {
        let (Some(slot_start), Some(slot_end)) = (
            slot_time(slot, "start_time", day),
            slot_time(slot, "slot_end", day),
        ) else {
            tracing::warn!("slot with unparseable times passed through unchanged");
            proposed.push(slot.clone());
            continue;
        };
        let slot_duration = slot_end - slot_start;

        if slot_end <= exec_start {
            // Finished before the execution began.
            proposed.push(slot.clone());
        } else if slot_start >= exec_end {
            if next_available > slot_start {
                // Cascade: an earlier displaced slot claimed this time.
                let delay = next_available - slot_start;
                proposed.push(shifted_slot(slot, slot_start + delay, slot_end + delay));
                next_available = slot_end + delay;
            } else {
                proposed.push(slot.clone());
                next_available = next_available.max(slot_end);
            }
        } else {
            // Overlaps the execution window: restart after it.
            let new_start = exec_end.max(next_available);
            let new_end = new_start + slot_duration;
            proposed.push(shifted_slot(slot, new_start, new_end));
            next_available = new_end;
        }
    }
    proposed
}

fn shifted_slot(slot: &Value, start: NaiveDateTime, end: NaiveDateTime) -> Value {
    let mut updated = slot.clone();
    if let Some(map) = updated.as_object_mut() {
        map.insert(
            "start_time".to_string(),
            json!(start.format("%H:%M").to_string()),
        );
        map.insert(
            "slot_end".to_string(),
            json!(end.format("%H:%M").to_string()),
        );
    }
    updated
}

/// Diff two slot timelines keyed by task id. A task is `pushed` when it moved
/// to a later list position or a later start time, `reordered` when it moved
/// earlier, `removed`/`added` when it only appears on one side.
pub fn compute_diff(
    original: &[Value],
    proposed: &[Value],
    task_titles: &HashMap<String, String>,
) -> ScheduleDiff {
    let index_map = |slots: &[Value]| -> HashMap<String, usize> {
        slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot_task_id(slot).map(|id| (id.to_string(), idx)))
            .collect()
    };
    let original_index = index_map(original);
    let proposed_index = index_map(proposed);

    let start_of = |slots: &[Value], idx: usize| -> Option<chrono::NaiveTime> {
        slots
            .get(idx)
            .and_then(|slot| slot.get("start_time"))
            .and_then(Value::as_str)
            .and_then(parse_hh_mm)
    };

    let mut pushed = Vec::new();
    let mut added = Vec::new();
    let mut removed = Vec::new();
    let mut reordered = Vec::new();

    let item = |task_id: &str,
                change_type: ChangeType,
                original_slot: Option<usize>,
                new_slot: Option<usize>,
                reason: &str|
     -> Option<ScheduleDiffItem> {
        let parsed = Uuid::parse_str(task_id).ok()?;
        Some(ScheduleDiffItem {
            task_id: parsed,
            task_title: task_titles
                .get(task_id)
                .cloned()
                .unwrap_or_else(|| task_id.to_string()),
            change_type,
            original_slot_index: original_slot,
            new_slot_index: new_slot,
            reason: reason.to_string(),
        })
    };

    for (task_id, &orig_idx) in &original_index {
        match proposed_index.get(task_id) {
            None => {
                removed.extend(item(
                    task_id,
                    ChangeType::Removed,
                    Some(orig_idx),
                    None,
                    "Time exceeded - deferred to later",
                ));
            }
            Some(&new_idx) => {
                let original_start = start_of(original, orig_idx);
                let proposed_start = start_of(proposed, new_idx);
                let moved_later = new_idx > orig_idx
                    || (new_idx == orig_idx && proposed_start > original_start);
                let moved_earlier = new_idx < orig_idx
                    || (new_idx == orig_idx
                        && proposed_start.is_some()
                        && proposed_start < original_start);

                if moved_later {
                    pushed.extend(item(
                        task_id,
                        ChangeType::Pushed,
                        Some(orig_idx),
                        Some(new_idx),
                        "Pushed back due to earlier task overrun",
                    ));
                } else if moved_earlier {
                    reordered.extend(item(
                        task_id,
                        ChangeType::Reordered,
                        Some(orig_idx),
                        Some(new_idx),
                        "Moved earlier in schedule",
                    ));
                }
            }
        }
    }

    for (task_id, &new_idx) in &proposed_index {
        if !original_index.contains_key(task_id) {
            added.extend(item(
                task_id,
                ChangeType::Added,
                None,
                Some(new_idx),
                "Added to fill available time",
            ));
        }
    }

    // Deterministic output regardless of map iteration order.
    for list in [&mut pushed, &mut added, &mut removed, &mut reordered] {
        list.sort_by_key(|i| {
            (
                i.original_slot_index.unwrap_or(usize::MAX),
                i.new_slot_index.unwrap_or(usize::MAX),
            )
        });
    }

    ScheduleDiff::from_parts(pushed, added, removed, reordered)
}

#[derive(Clone)]
pub struct RescheduleEngine {
    schedules: ScheduleRepository,
    suggestions: SuggestionRepository,
    tasks: TaskRepository,
}

impl RescheduleEngine {
    pub fn new(
        schedules: ScheduleRepository,
        suggestions: SuggestionRepository,
        tasks: TaskRepository,
    ) -> Self {
        Self {
            schedules,
            suggestions,
            tasks,
        }
    }

    /// On checkout: if today's saved plan is affected, persist a PENDING
    /// suggestion and return it. No suggestion when the day is unchanged.
    pub async fn maybe_suggest(
        &self,
        session: &WorkSession,
    ) -> Result<Option<RescheduleSuggestion>, DomainError> {
        let ended_at = session
            .ended_at
            .ok_or_else(|| DomainError::Validation("Session has not ended".to_string()))?;
        let decision = session
            .decision
            .ok_or_else(|| DomainError::Validation("Session has no decision".to_string()))?;
        let today = ended_at.date_naive();

        let Some(schedule) = self
            .schedules
            .get_daily(session.user_id, today)
            .await
            .map_err(storage_error)?
        else {
            return Ok(None);
        };
        let Some(assignments) = schedule
            .plan_json
            .get("assignments")
            .and_then(Value::as_array)
            .cloned()
        else {
            return Ok(None);
        };
        if assignments.is_empty() {
            return Ok(None);
        }

        let ended_task_id = session.task_id.to_string();
        let on_plan = assignments
            .iter()
            .any(|slot| slot_task_id(slot) == Some(ended_task_id.as_str()));

        let proposed = if on_plan {
            propose_after_checkout(
                &assignments,
                &ended_task_id,
                session.remaining_estimate_hours,
                decision,
            )
        } else {
            // Off-plan session: wall-clock displacement is what matters, so
            // the raw elapsed window drives the shift, not net work time.
            propose_after_manual_execution(&assignments, session.started_at, ended_at)
        };

        let task_titles = self.task_title_lookup(session, &assignments).await?;
        let diff = compute_diff(&assignments, &proposed, &task_titles);
        if !diff.has_significant_changes {
            return Ok(None);
        }

        let trigger_type = if on_plan {
            RescheduleTriggerType::Checkout
        } else {
            RescheduleTriggerType::ManualCheckout
        };
        let expires_at = end_of_day(today);

        let suggestion = self
            .suggestions
            .insert(&NewSuggestion {
                user_id: session.user_id,
                work_session_id: session.id,
                trigger_type,
                trigger_decision: decision.as_str().to_string(),
                original_plan: json!({ "assignments": assignments }),
                proposed_plan: json!({ "assignments": proposed }),
                diff: serde_json::to_value(&diff)
                    .map_err(|e| DomainError::Internal(e.into()))?,
                expires_at,
            })
            .await
            .map_err(storage_error)?;

        tracing::info!(
            suggestion_id = %suggestion.id,
            trigger = trigger_type.as_str(),
            changes = diff.total_changes,
            "reschedule suggestion created"
        );
        Ok(Some(suggestion))
    }

    async fn task_title_lookup(
        &self,
        session: &WorkSession,
        assignments: &[Value],
    ) -> Result<HashMap<String, String>, DomainError> {
        let mut ids: Vec<Uuid> = assignments
            .iter()
            .filter_map(slot_task_id)
            .filter_map(|id| Uuid::parse_str(id).ok())
            .collect();
        ids.push(session.task_id);

        let tasks = self
            .tasks
            .tasks_by_ids(session.user_id, &ids)
            .await
            .map_err(storage_error)?;
        Ok(tasks
            .into_iter()
            .map(|t| (t.id.to_string(), t.title))
            .collect())
    }

    pub async fn pending(&self, user_id: Uuid) -> Result<Vec<RescheduleSuggestion>, DomainError> {
        self.suggestions
            .pending_for_user(user_id)
            .await
            .map_err(storage_error)
    }

    pub async fn get(
        &self,
        user_id: Uuid,
        suggestion_id: Uuid,
    ) -> Result<RescheduleSuggestion, DomainError> {
        self.suggestions
            .get(user_id, suggestion_id)
            .await
            .map_err(storage_error)?
            .ok_or_else(|| DomainError::NotFound("Reschedule suggestion not found".to_string()))
    }

    /// Accept: audit, flip to ACCEPTED and swap the day's plan atomically.
    pub async fn accept(
        &self,
        user_id: Uuid,
        suggestion_id: Uuid,
        reason: Option<&str>,
    ) -> Result<RescheduleSuggestion, DomainError> {
        let suggestion = self.get(user_id, suggestion_id).await?;
        let plan_date = suggestion.expires_at.date_naive();

        let outcome = self
            .suggestions
            .accept(user_id, suggestion_id, reason, plan_date, Utc::now())
            .await
            .map_err(storage_error)?;
        decided(outcome)
    }

    pub async fn reject(
        &self,
        user_id: Uuid,
        suggestion_id: Uuid,
        reason: Option<&str>,
    ) -> Result<RescheduleSuggestion, DomainError> {
        let outcome = self
            .suggestions
            .reject(user_id, suggestion_id, reason, Utc::now())
            .await
            .map_err(storage_error)?;
        decided(outcome)
    }

    /// Periodic sweep: every PENDING suggestion past its expiry flips to
    /// EXPIRED.
    pub async fn expire_old(&self) -> Result<u64, DomainError> {
        let expired = self
            .suggestions
            .expire_old(Utc::now())
            .await
            .map_err(storage_error)?;
        if expired > 0 {
            tracing::info!(expired, "expired stale reschedule suggestions");
        }
        Ok(expired)
    }

    pub async fn decision_history(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<RescheduleDecision>, DomainError> {
        self.suggestions
            .decision_history(user_id, limit)
            .await
            .map_err(storage_error)
    }
}

fn decided(outcome: DecisionOutcome) -> Result<RescheduleSuggestion, DomainError> {
    match outcome {
        DecisionOutcome::Decided(suggestion) => Ok(suggestion),
        DecisionOutcome::NotPending(suggestion) => Err(DomainError::Validation(format!(
            "Suggestion is already {}",
            suggestion.status.as_str()
        ))),
        DecisionOutcome::NotFound => Err(DomainError::NotFound(
            "Reschedule suggestion not found".to_string(),
        )),
    }
}

fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0)
        .map(|start| start.and_utc() + Duration::days(1) - Duration::microseconds(1))
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn slot(task_id: &str, start: &str, end: &str) -> Value {
        json!({
            "task_id": task_id,
            "task_title": task_id,
            "slot_index": 0,
            "start_time": start,
            "slot_end": end,
            "duration_hours": 1.0,
        })
    }

    fn uuid(n: u8) -> String {
        Uuid::from_bytes([n; 16]).to_string()
    }

    #[test]
    fn complete_drops_the_finished_slot() {
        let x = uuid(1);
        let y = uuid(2);
        let slots = vec![slot(&x, "09:00", "10:00"), slot(&y, "10:00", "11:00")];

        let proposed = propose_after_checkout(&slots, &x, None, SessionDecision::Complete);

        assert_eq!(proposed.len(), 1);
        assert_eq!(slot_task_id(&proposed[0]), Some(y.as_str()));

        let diff = compute_diff(&slots, &proposed, &HashMap::new());
        assert_eq!(diff.removed.len(), 1);
        // Y moved from index 1 to index 0.
        assert_eq!(diff.reordered.len(), 1);
        assert!(diff.has_significant_changes);
    }

    #[test]
    fn continue_keeps_the_slot_with_updated_remainder() {
        let x = uuid(1);
        let slots = vec![slot(&x, "09:00", "10:00")];

        let proposed = propose_after_checkout(&slots, &x, Some(1.5), SessionDecision::Continue);

        assert_eq!(proposed.len(), 1);
        assert_eq!(proposed[0]["remaining_hours"], json!(1.5));

        // Same position, same time: no significant change.
        let diff = compute_diff(&slots, &proposed, &HashMap::new());
        assert_eq!(diff.total_changes, 0);
    }

    #[test]
    fn switch_keeps_the_timeline_untouched() {
        let x = uuid(1);
        let y = uuid(2);
        let slots = vec![slot(&x, "09:00", "10:00"), slot(&y, "10:00", "11:00")];

        let proposed = propose_after_checkout(&slots, &x, None, SessionDecision::Switch);
        let diff = compute_diff(&slots, &proposed, &HashMap::new());

        assert_eq!(diff.total_changes, 0);
    }

    #[test]
    fn manual_execution_cascades_overlapping_slots() {
        // Plan: X 09:00-10:00, Y 10:00-11:00. Off-plan session 09:30-10:20.
        let x = uuid(1);
        let y = uuid(2);
        let slots = vec![slot(&x, "09:00", "10:00"), slot(&y, "10:00", "11:00")];

        let start = Utc.with_ymd_and_hms(2025, 3, 3, 9, 30, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 3, 3, 10, 20, 0).unwrap();
        let proposed = propose_after_manual_execution(&slots, start, end);

        assert_eq!(proposed[0]["start_time"], json!("10:20"));
        assert_eq!(proposed[0]["slot_end"], json!("11:20"));
        assert_eq!(proposed[1]["start_time"], json!("11:20"));
        assert_eq!(proposed[1]["slot_end"], json!("12:20"));

        let diff = compute_diff(&slots, &proposed, &HashMap::new());
        assert_eq!(diff.pushed.len(), 2);
        assert!(diff.has_significant_changes);
    }

    #[test]
    fn manual_execution_leaves_earlier_and_later_slots_alone() {
        let x = uuid(1);
        let y = uuid(2);
        let slots = vec![slot(&x, "08:00", "09:00"), slot(&y, "14:00", "15:00")];

        let start = Utc.with_ymd_and_hms(2025, 3, 3, 9, 30, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 3, 3, 10, 0, 0).unwrap();
        let proposed = propose_after_manual_execution(&slots, start, end);

        let diff = compute_diff(&slots, &proposed, &HashMap::new());
        assert_eq!(diff.total_changes, 0);
    }

    #[test]
    fn unparseable_slot_times_pass_through() {
        let x = uuid(1);
        let mut bad = slot(&x, "9am", "10am");
        bad["start_time"] = json!("9am");
        let slots = vec![bad.clone()];

        let start = Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 3, 3, 10, 0, 0).unwrap();
        let proposed = propose_after_manual_execution(&slots, start, end);

        assert_eq!(proposed[0], bad);
    }

    #[test]
    fn diff_categorizes_added_tasks() {
        let x = uuid(1);
        let y = uuid(2);
        let original = vec![slot(&x, "09:00", "10:00")];
        let proposed = vec![slot(&x, "09:00", "10:00"), slot(&y, "10:00", "11:00")];

        let diff = compute_diff(&original, &proposed, &HashMap::new());

        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.added[0].reason, "Added to fill available time");
        assert_eq!(diff.total_changes, 1);
    }

    #[test]
    fn accepted_plan_rediffs_to_zero_changes() {
        // R1: applying the proposal and re-diffing yields no changes.
        let x = uuid(1);
        let y = uuid(2);
        let original = vec![slot(&x, "09:00", "10:00"), slot(&y, "10:00", "11:00")];
        let start = Utc.with_ymd_and_hms(2025, 3, 3, 9, 30, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 3, 3, 10, 20, 0).unwrap();
        let proposed = propose_after_manual_execution(&original, start, end);

        let rediff = compute_diff(&proposed, &proposed, &HashMap::new());
        assert_eq!(rediff.total_changes, 0);
        assert!(!rediff.has_significant_changes);
    }

    #[test]
    fn diff_uses_task_titles_when_available() {
        let x = uuid(1);
        let original = vec![slot(&x, "09:00", "10:00")];
        let proposed: Vec<Value> = Vec::new();
        let titles = HashMap::from([(x.clone(), "Write report".to_string())]);

        let diff = compute_diff(&original, &proposed, &titles);
        assert_eq!(diff.removed[0].task_title, "Write report");
    }

    #[test]
    fn end_of_day_is_the_last_instant() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        let eod = end_of_day(date);
        assert_eq!(eod.date_naive(), date);
        assert!(eod > date.and_hms_opt(23, 59, 58).unwrap().and_utc());
    }
}
