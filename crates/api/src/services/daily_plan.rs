//! Single-day planning: resolve candidate tasks from the requested source,
//! apply the relaxed dependency check, and run the daily packer.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use cadence_domain::{
    DailyScheduleRequest, DailyScheduleResponse, DomainError, ScheduleAssignment, Task,
    TaskSourceType, WeeklyRecurringTask, WeeklyScheduleBlob,
};
use cadence_solver::{DailySolverConfig, FixedAssignment, SchedulerTask, pack_daily_schedule};

use crate::AppState;
use crate::services::dependencies::{DependencyMaps, partition_schedulable};
use crate::services::pipeline::build_slots;
use crate::services::{recurring_scheduler_task, scheduler_task};

pub async fn plan_daily(
    state: &AppState,
    user_id: Uuid,
    request: &DailyScheduleRequest,
) -> Result<DailyScheduleResponse, DomainError> {
    let date = NaiveDate::parse_from_str(&request.date, "%Y-%m-%d")
        .map_err(|_| DomainError::Validation("date must be YYYY-MM-DD".to_string()))?;

    let (candidates, recurring) = resolve_candidates(state, user_id, request).await?;

    let ids: Vec<Uuid> = candidates.iter().map(|t| t.id).collect();
    let actuals = state.logs.actual_hours(&ids).await;
    let goal_projects = state
        .tasks
        .goal_project_map(user_id)
        .await
        .map_err(|e| DomainError::Database(e.to_string()))?;

    let mut open: Vec<(Task, f64)> = Vec::new();
    for task in candidates {
        let remaining = task.remaining_hours(actuals.get(&task.id).copied().unwrap_or(0.0));
        if remaining <= 0.0 {
            tracing::debug!(task_id = %task.id, "excluding task with no remaining hours");
            continue;
        }
        open.push((task, remaining));
    }

    let tasks_only: Vec<Task> = open.iter().map(|(t, _)| t.clone()).collect();
    let maps = DependencyMaps::load(&state.tasks, &tasks_only)
        .await
        .map_err(|e| DomainError::Database(e.to_string()))?;
    let (schedulable, blocked) = partition_schedulable(tasks_only, &maps);
    let schedulable_ids: HashSet<Uuid> = schedulable.iter().map(|t| t.id).collect();

    let mut solver_tasks: Vec<SchedulerTask> = open
        .iter()
        .filter(|(task, _)| schedulable_ids.contains(&task.id))
        .map(|(task, remaining)| {
            scheduler_task(task, *remaining, goal_projects.get(&task.goal_id).copied())
        })
        .collect();
    let mut titles: HashMap<String, String> = solver_tasks
        .iter()
        .map(|t| (t.id.clone(), t.title.clone()))
        .collect();
    for task in &recurring {
        let solver_task = recurring_scheduler_task(task);
        titles.insert(solver_task.id.clone(), solver_task.title.clone());
        solver_tasks.push(solver_task);
    }

    let task_deps: HashMap<String, Vec<String>> = maps
        .task_deps
        .iter()
        .map(|(k, v)| (k.to_string(), v.iter().map(|d| d.to_string()).collect()))
        .collect();
    let goal_deps: HashMap<String, Vec<String>> = maps
        .goal_deps
        .iter()
        .map(|(k, v)| (k.to_string(), v.iter().map(|d| d.to_string()).collect()))
        .collect();

    let slots = build_slots(&request.time_slots).map_err(DomainError::Validation)?;
    let fixed: Vec<FixedAssignment> = request
        .fixed_assignments
        .iter()
        .map(|f| FixedAssignment {
            task_id: f.task_id.to_string(),
            slot_index: f.slot_index,
            duration_hours: f.duration_hours,
        })
        .collect();

    let config = DailySolverConfig {
        max_solve_time: Duration::from_secs(state.config.daily_solver_timeout_seconds),
        ..DailySolverConfig::default()
    };
    let solve_slots = slots.clone();
    let result = tokio::task::spawn_blocking(move || {
        pack_daily_schedule(
            &solver_tasks,
            &solve_slots,
            Some(date),
            &task_deps,
            &goal_deps,
            &fixed,
            &config,
        )
    })
    .await
    .map_err(|e| DomainError::Internal(anyhow::anyhow!("daily solver task failed: {e}")))?;

    let assignments: Vec<ScheduleAssignment> = result
        .assignments
        .iter()
        .filter_map(|assignment| {
            let task_id = Uuid::parse_str(&assignment.task_id).ok()?;
            let slot = request.time_slots.get(assignment.slot_index)?;
            Some(ScheduleAssignment {
                task_id,
                task_title: titles.get(&assignment.task_id).cloned().unwrap_or_default(),
                slot_index: assignment.slot_index,
                slot_start: slot.start.clone(),
                slot_end: slot.end.clone(),
                slot_kind: slot.kind,
                duration_hours: assignment.duration_hours,
                is_fixed: assignment.is_fixed,
            })
        })
        .collect();

    let mut unscheduled: Vec<Uuid> = blocked.iter().map(|(id, _)| *id).collect();
    for id in &result.unscheduled_task_ids {
        if let Ok(parsed) = Uuid::parse_str(id) {
            if !unscheduled.contains(&parsed) {
                unscheduled.push(parsed);
            }
        }
    }

    tracing::info!(
        user_id = %user_id,
        date = %request.date,
        status = result.status.as_str(),
        assigned = assignments.len(),
        unscheduled = unscheduled.len(),
        "daily schedule computed"
    );

    Ok(DailyScheduleResponse {
        success: result.success,
        date: request.date.clone(),
        assignments,
        unscheduled_task_ids: unscheduled,
        total_scheduled_hours: result.total_scheduled_hours,
        optimization_status: result.status.as_str().to_string(),
        solve_time_seconds: result.solve_time_seconds,
        objective_value: result.objective_value,
        generated_at: Utc::now(),
    })
}

/// Resolve the candidate task set for the requested source.
async fn resolve_candidates(
    state: &AppState,
    user_id: Uuid,
    request: &DailyScheduleRequest,
) -> Result<(Vec<Task>, Vec<WeeklyRecurringTask>), DomainError> {
    match request.task_source.source_type {
        TaskSourceType::AllTasks => {
            let tasks = state
                .tasks
                .list_schedulable(user_id, None)
                .await
                .map_err(|e| DomainError::Database(e.to_string()))?;
            Ok((tasks, Vec::new()))
        }
        TaskSourceType::Project => {
            let project_id = request.task_source.project_id.ok_or_else(|| {
                DomainError::Validation(
                    "project_id is required for the project task source".to_string(),
                )
            })?;
            let tasks = state
                .tasks
                .list_schedulable(user_id, Some(&[project_id]))
                .await
                .map_err(|e| DomainError::Database(e.to_string()))?;
            Ok((tasks, Vec::new()))
        }
        TaskSourceType::WeeklySchedule => {
            let raw_date = request
                .task_source
                .weekly_schedule_date
                .as_deref()
                .ok_or_else(|| {
                    DomainError::Validation(
                        "weekly_schedule_date is required for the weekly-schedule task source"
                            .to_string(),
                    )
                })?;
            let week_start = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d").map_err(|_| {
                DomainError::Validation("weekly_schedule_date must be YYYY-MM-DD".to_string())
            })?;

            let row = state
                .schedules
                .get_weekly(user_id, week_start)
                .await
                .map_err(|e| DomainError::Database(e.to_string()))?
                .ok_or_else(|| {
                    DomainError::NotFound(format!("No weekly schedule found for {raw_date}"))
                })?;
            let blob: WeeklyScheduleBlob =
                serde_json::from_value(row.schedule_json).map_err(|e| {
                    DomainError::Database(format!("stored weekly schedule is unreadable: {e}"))
                })?;

            let task_ids: Vec<Uuid> = blob.selected_tasks.iter().map(|t| t.task_id).collect();
            let tasks = state
                .tasks
                .tasks_by_ids(user_id, &task_ids)
                .await
                .map_err(|e| DomainError::Database(e.to_string()))?;
            let recurring = state
                .tasks
                .recurring_by_ids(user_id, &blob.selected_recurring_task_ids)
                .await
                .map_err(|e| DomainError::Database(e.to_string()))?;
            Ok((tasks, recurring))
        }
    }
}
