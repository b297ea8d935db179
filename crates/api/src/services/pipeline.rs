//! Weekly optimization pipeline: INIT → PRIORITIES → SELECT → PACK×7 →
//! INTEGRATE, each stage reporting its own result, the whole run bounded by
//! an umbrella deadline.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use cadence_domain::{
    DailyOptimizationReport, OptimizationRequest, OptimizationResponse, OptimizationStatus,
    PipelineMetrics, PipelineStage, PlanAssignment, SelectedTaskSummary, StageReport, Task,
    TimeSlotInput, WeeklyScheduleBlob, WeeklySelectionReport, parse_hh_mm,
};
use cadence_solver::{
    DailySolverConfig, ProjectAllocationSpec, SchedulerTask, TimeSlot, WeeklySolverConfig,
    WeeklyTaskSpec, pack_daily_schedule, select_weekly_tasks,
};

use crate::AppState;
use crate::services::dependencies::{DependencyMaps, partition_schedulable};
use crate::services::priority::{
    PriorityContext, PriorityTaskContext, fallback_priorities, oracle_failure_insights,
};
use crate::services::{recurring_scheduler_task, scheduler_task, solver_kind};

/// Per-user, per-week cache of oracle priorities and the weekly selection.
/// Backing is in-process; invalidation on domain mutation belongs to the
/// write surface, which is outside this core.
#[derive(Default)]
pub struct PlanCache {
    priorities: DashMap<(Uuid, NaiveDate), HashMap<Uuid, f64>>,
    selections: DashMap<(Uuid, NaiveDate), WeeklySelectionReport>,
}

impl PlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn cached_priorities(&self, user: Uuid, week: NaiveDate) -> Option<HashMap<Uuid, f64>> {
        self.priorities.get(&(user, week)).map(|e| e.clone())
    }

    fn cached_selection(&self, user: Uuid, week: NaiveDate) -> Option<WeeklySelectionReport> {
        self.selections.get(&(user, week)).map(|e| e.clone())
    }

    pub fn invalidate_user(&self, user: Uuid) {
        self.priorities.retain(|(u, _), _| *u != user);
        self.selections.retain(|(u, _), _| *u != user);
    }
}

struct PipelineRun<'a> {
    state: &'a AppState,
    user_id: Uuid,
    request: &'a OptimizationRequest,
    started: Instant,
    deadline: Instant,
    stage_results: Vec<StageReport>,
}

/// Execute the full pipeline for one user and week.
pub async fn execute(
    state: &AppState,
    user_id: Uuid,
    request: &OptimizationRequest,
) -> OptimizationResponse {
    let started = Instant::now();
    let deadline = started + Duration::from_secs(request.optimization_timeout_seconds.max(1));
    tracing::info!(user_id = %user_id, week = %request.week_start_date, "starting weekly optimization pipeline");

    let mut run = PipelineRun {
        state,
        user_id,
        request,
        started,
        deadline,
        stage_results: Vec::new(),
    };
    run.execute().await
}

impl PipelineRun<'_> {
    async fn execute(&mut self) -> OptimizationResponse {
        // INIT
        let Some(week_start) = self.stage_initialization() else {
            return self.failed_response(None, Vec::new());
        };

        // PRIORITIES
        let (priorities, candidates) = match self.stage_priorities(week_start).await {
            Ok(output) => output,
            Err(report) => {
                self.stage_results.push(report);
                return self.failed_response(None, Vec::new());
            }
        };

        // SELECT
        let (selection, schedulable) = match self.stage_selection(week_start, priorities, candidates).await
        {
            Ok(output) => output,
            Err(()) => {
                return self.failed_response(None, Vec::new());
            }
        };

        // PACK × 7
        let daily = self.stage_packing(week_start, &selection, &schedulable).await;

        // INTEGRATE
        self.stage_integration(week_start, selection, daily).await
    }

    fn remaining_time(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    fn stage_initialization(&mut self) -> Option<NaiveDate> {
        let stage_start = Instant::now();
        let mut report = StageReport::ok(PipelineStage::Initialization, 0.0);

        let week_start = match NaiveDate::parse_from_str(&self.request.week_start_date, "%Y-%m-%d")
        {
            Ok(date) => date,
            Err(_) => {
                report = StageReport::failed(
                    PipelineStage::Initialization,
                    stage_start.elapsed().as_secs_f64(),
                    vec!["week_start_date must be YYYY-MM-DD".to_string()],
                );
                self.stage_results.push(report);
                return None;
            }
        };

        let today = Utc::now().date_naive();
        let mut errors = Vec::new();
        if week_start < today && (today - week_start).num_days() > 7 {
            errors.push("Cannot optimize for weeks more than 7 days in the past".to_string());
        }
        if self.request.daily_time_slots.is_empty() {
            errors.push("At least one daily time slot is required".to_string());
        }
        if self.request.constraints.total_capacity_hours <= 0.0 {
            errors.push("Weekly capacity must be positive".to_string());
        }

        if !errors.is_empty() {
            if self.request.fallback_on_failure {
                report.warnings = errors;
            } else {
                report = StageReport::failed(
                    PipelineStage::Initialization,
                    stage_start.elapsed().as_secs_f64(),
                    errors,
                );
                self.stage_results.push(report);
                return None;
            }
        }

        report.duration_seconds = stage_start.elapsed().as_secs_f64();
        self.stage_results.push(report);
        Some(week_start)
    }

    /// Collect planning context and score every candidate. Oracle failure is
    /// recovered locally with the deterministic fallback; the stage always
    /// succeeds.
    async fn stage_priorities(
        &mut self,
        week_start: NaiveDate,
    ) -> Result<(HashMap<Uuid, f64>, Vec<(Task, f64, Option<Uuid>)>), StageReport> {
        let stage_start = Instant::now();
        let mut warnings = Vec::new();

        let tasks = self
            .state
            .tasks
            .list_schedulable(self.user_id, self.request.project_filter.as_deref())
            .await
            .map_err(|e| {
                StageReport::failed(
                    PipelineStage::Priorities,
                    stage_start.elapsed().as_secs_f64(),
                    vec![format!("failed to load tasks: {e}")],
                )
            })?;

        let goal_projects = self
            .state
            .tasks
            .goal_project_map(self.user_id)
            .await
            .map_err(|e| {
                StageReport::failed(
                    PipelineStage::Priorities,
                    stage_start.elapsed().as_secs_f64(),
                    vec![format!("failed to load goals: {e}")],
                )
            })?;

        let ids: Vec<Uuid> = tasks.iter().map(|t| t.id).collect();
        let actuals = self.state.logs.actual_hours(&ids).await;

        // Tasks with nothing left are out of the horizon.
        let mut candidates: Vec<(Task, f64, Option<Uuid>)> = Vec::new();
        for task in tasks {
            let actual = actuals.get(&task.id).copied().unwrap_or(0.0);
            let remaining = task.remaining_hours(actual);
            if remaining <= 0.0 {
                tracing::debug!(task_id = %task.id, "excluding task with no remaining hours");
                continue;
            }
            let project = goal_projects.get(&task.goal_id).copied();
            candidates.push((task, remaining, project));
        }

        let allocations: HashMap<Uuid, _> = self
            .request
            .constraints
            .project_allocations
            .iter()
            .map(|a| (a.project_id, a.clone()))
            .collect();

        let cached = if self.request.enable_caching {
            self.state.plan_cache.cached_priorities(self.user_id, week_start)
        } else {
            None
        };

        let priorities = if let Some(cached) = cached {
            tracing::debug!("priorities served from cache");
            cached
        } else {
            let context = PriorityContext {
                week_start,
                tasks: candidates
                    .iter()
                    .map(|(task, remaining, project)| PriorityTaskContext {
                        id: task.id,
                        title: task.title.clone(),
                        remaining_hours: *remaining,
                        user_priority: task.priority,
                        due_at: task.due_at,
                        project_id: *project,
                        project_title: None,
                    })
                    .collect(),
                allocations: allocations.clone(),
            };

            let scored = match (&self.state.oracle, self.request.use_ai_priority) {
                (Some(oracle), true) => {
                    match oracle
                        .priorities(&context, self.request.user_prompt.as_deref())
                        .await
                    {
                        Ok(scores) => scores,
                        Err(e) => {
                            tracing::warn!("priority oracle failed, using fallback: {}", e);
                            warnings.extend(oracle_failure_insights(&e));
                            fallback_priorities(&context)
                        }
                    }
                }
                _ => fallback_priorities(&context),
            };
            // The oracle may omit tasks; the fallback fills every gap so the
            // pipeline always sees a complete map.
            let mut complete = fallback_priorities(&context);
            complete.extend(scored);

            if self.request.enable_caching {
                self.state
                    .plan_cache
                    .priorities
                    .insert((self.user_id, week_start), complete.clone());
            }
            complete
        };

        let mut report = StageReport::ok(
            PipelineStage::Priorities,
            stage_start.elapsed().as_secs_f64(),
        );
        report.warnings = warnings;
        self.stage_results.push(report);
        Ok((priorities, candidates))
    }

    async fn stage_selection(
        &mut self,
        week_start: NaiveDate,
        priorities: HashMap<Uuid, f64>,
        candidates: Vec<(Task, f64, Option<Uuid>)>,
    ) -> Result<(WeeklySelectionReport, Vec<(Task, f64, Option<Uuid>)>), ()> {
        let stage_start = Instant::now();
        let mut warnings = Vec::new();

        let tasks_only: Vec<Task> = candidates.iter().map(|(t, _, _)| t.clone()).collect();
        let maps = match DependencyMaps::load(&self.state.tasks, &tasks_only).await {
            Ok(maps) => maps,
            Err(e) => {
                self.stage_results.push(StageReport::failed(
                    PipelineStage::Selection,
                    stage_start.elapsed().as_secs_f64(),
                    vec![format!("failed to load dependencies: {e}")],
                ));
                return Err(());
            }
        };
        let (schedulable_tasks, blocked) = partition_schedulable(tasks_only, &maps);
        for (task_id, reason) in &blocked {
            warnings.push(format!("task {task_id} excluded: {reason}"));
        }
        let schedulable_ids: std::collections::HashSet<Uuid> =
            schedulable_tasks.iter().map(|t| t.id).collect();
        let schedulable: Vec<(Task, f64, Option<Uuid>)> = candidates
            .into_iter()
            .filter(|(t, _, _)| schedulable_ids.contains(&t.id))
            .collect();

        if let Some(cached) = self
            .request
            .enable_caching
            .then(|| self.state.plan_cache.cached_selection(self.user_id, week_start))
            .flatten()
        {
            tracing::debug!("weekly selection served from cache");
            let mut report = StageReport::ok(
                PipelineStage::Selection,
                stage_start.elapsed().as_secs_f64(),
            );
            report.warnings = warnings;
            self.stage_results.push(report);
            return Ok((cached, schedulable));
        }

        let recurring = match self
            .state
            .tasks
            .recurring_by_ids(self.user_id, &self.request.selected_recurring_task_ids)
            .await
        {
            Ok(recurring) => recurring,
            Err(e) => {
                self.stage_results.push(StageReport::failed(
                    PipelineStage::Selection,
                    stage_start.elapsed().as_secs_f64(),
                    vec![format!("failed to load recurring tasks: {e}")],
                ));
                return Err(());
            }
        };

        let task_specs: Vec<WeeklyTaskSpec> = schedulable
            .iter()
            .map(|(task, remaining, project)| WeeklyTaskSpec {
                id: task.id.to_string(),
                title: task.title.clone(),
                hours: *remaining,
                priority_score: priorities.get(&task.id).copied().unwrap_or(0.0),
                project_id: project.map(|p| p.to_string()),
            })
            .collect();
        // Recurring tasks are scored by effort: small commitments first.
        let recurring_specs: Vec<WeeklyTaskSpec> = recurring
            .iter()
            .map(|task| WeeklyTaskSpec {
                id: task.id.to_string(),
                title: task.title.clone(),
                hours: task.estimate_hours,
                priority_score: (10.0 - task.estimate_hours.min(10.0)).max(0.0),
                project_id: None,
            })
            .collect();
        let allocation_specs: Vec<ProjectAllocationSpec> = self
            .request
            .constraints
            .project_allocations
            .iter()
            .map(|a| ProjectAllocationSpec {
                project_id: a.project_id.to_string(),
                target_hours: a.target_hours,
                max_hours: a.max_hours,
                priority_weight: a.priority_weight,
            })
            .collect();

        let config = WeeklySolverConfig {
            max_solve_time: Duration::from_secs(self.state.config.weekly_solver_timeout_seconds)
                .min(self.remaining_time()),
            ..WeeklySolverConfig::default()
        };
        let capacity = self.request.constraints.total_capacity_hours;
        let selection = tokio::task::spawn_blocking(move || {
            select_weekly_tasks(&task_specs, &recurring_specs, &allocation_specs, capacity, &config)
        })
        .await
        .unwrap_or_else(|e| {
            tracing::error!("weekly solver task panicked: {}", e);
            cadence_solver::WeeklySelection {
                success: false,
                status: cadence_solver::SolveStatus::Unknown,
                selected_task_ids: Vec::new(),
                selected_recurring_task_ids: Vec::new(),
                selected_hours: 0.0,
                selected_hours_by_project: HashMap::new(),
                solve_time_seconds: 0.0,
                objective_value: 0.0,
            }
        });

        let report = WeeklySelectionReport {
            success: selection.success,
            status: selection.status.as_str().to_string(),
            selected_task_ids: parse_ids(&selection.selected_task_ids),
            selected_recurring_task_ids: parse_ids(&selection.selected_recurring_task_ids),
            selected_hours: selection.selected_hours,
            hours_by_project: selection
                .selected_hours_by_project
                .iter()
                .filter_map(|(k, v)| Uuid::parse_str(k).ok().map(|k| (k, *v)))
                .collect(),
            solve_time_seconds: selection.solve_time_seconds,
            objective_value: selection.objective_value,
        };

        if !report.success && !self.request.fallback_on_failure {
            self.stage_results.push(StageReport::failed(
                PipelineStage::Selection,
                stage_start.elapsed().as_secs_f64(),
                vec![format!("weekly selection failed: {}", report.status)],
            ));
            return Err(());
        }

        if report.selected_task_ids.is_empty() && report.selected_recurring_task_ids.is_empty() {
            warnings.push("No tasks selected".to_string());
        }
        if self.request.enable_caching && report.success {
            self.state
                .plan_cache
                .selections
                .insert((self.user_id, week_start), report.clone());
        }

        let mut stage = StageReport::ok(
            PipelineStage::Selection,
            stage_start.elapsed().as_secs_f64(),
        );
        stage.success = report.success || self.request.fallback_on_failure;
        stage.warnings = warnings;
        if !report.success {
            stage
                .warnings
                .push(format!("weekly selection fell back empty: {}", report.status));
        }
        self.stage_results.push(stage);
        Ok((report, schedulable))
    }

    async fn stage_packing(
        &mut self,
        week_start: NaiveDate,
        selection: &WeeklySelectionReport,
        schedulable: &[(Task, f64, Option<Uuid>)],
    ) -> Vec<DailyOptimizationReport> {
        let stage_start = Instant::now();
        let mut errors = Vec::new();
        let mut daily_reports = Vec::new();

        // Resolve the selection back to solver tasks.
        let selected: std::collections::HashSet<Uuid> =
            selection.selected_task_ids.iter().copied().collect();
        let mut solver_tasks: Vec<SchedulerTask> = schedulable
            .iter()
            .filter(|(task, _, _)| selected.contains(&task.id))
            .map(|(task, remaining, project)| scheduler_task(task, *remaining, *project))
            .collect();
        let mut title_by_id: HashMap<String, String> = solver_tasks
            .iter()
            .map(|t| (t.id.clone(), t.title.clone()))
            .collect();

        let recurring = self
            .state
            .tasks
            .recurring_by_ids(self.user_id, &selection.selected_recurring_task_ids)
            .await
            .unwrap_or_default();
        for task in &recurring {
            let solver_task = recurring_scheduler_task(task);
            title_by_id.insert(solver_task.id.clone(), solver_task.title.clone());
            solver_tasks.push(solver_task);
        }

        let selected_tasks: Vec<&Task> = schedulable
            .iter()
            .filter(|(task, _, _)| selected.contains(&task.id))
            .map(|(task, _, _)| task)
            .collect();
        let (task_deps, goal_deps) = self.dependency_string_maps(&selected_tasks).await;

        let slots = match build_slots(&self.request.daily_time_slots) {
            Ok(slots) => slots,
            Err(message) => {
                errors.push(message);
                Vec::new()
            }
        };

        let mut solver_seconds = 0.0;
        for day_offset in 0..7 {
            let date = week_start + chrono::Duration::days(day_offset);
            let date_str = date.format("%Y-%m-%d").to_string();

            if solver_tasks.is_empty() || slots.is_empty() {
                daily_reports.push(DailyOptimizationReport {
                    date: date_str,
                    total_scheduled_hours: 0.0,
                    assignments: Vec::new(),
                    unscheduled_task_ids: Vec::new(),
                    optimization_status: "NO_TASKS".to_string(),
                    solve_time_seconds: 0.0,
                });
                continue;
            }

            let remaining = self.remaining_time();
            if remaining.is_zero() {
                errors.push(format!(
                    "pipeline deadline reached before packing {date_str}"
                ));
                break;
            }

            let config = DailySolverConfig {
                max_solve_time: Duration::from_secs(
                    self.state.config.daily_solver_timeout_seconds,
                )
                .min(remaining),
                ..DailySolverConfig::default()
            };
            let tasks = solver_tasks.clone();
            let day_slots = slots.clone();
            let deps = task_deps.clone();
            let goal_dep_map = goal_deps.clone();
            let result = tokio::task::spawn_blocking(move || {
                pack_daily_schedule(
                    &tasks,
                    &day_slots,
                    Some(date),
                    &deps,
                    &goal_dep_map,
                    &[],
                    &config,
                )
            })
            .await;

            let result = match result {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!("daily solver task panicked: {}", e);
                    errors.push(format!("packing failed for {date_str}"));
                    continue;
                }
            };

            solver_seconds += result.solve_time_seconds;
            daily_reports.push(daily_report(
                &date_str,
                &result,
                &self.request.daily_time_slots,
                &title_by_id,
            ));
        }

        let mut report = StageReport::ok(PipelineStage::Packing, stage_start.elapsed().as_secs_f64());
        if !errors.is_empty() {
            report.success = false;
            report.errors = errors;
        }
        tracing::info!(
            days = daily_reports.len(),
            solver_seconds,
            "packing stage completed"
        );
        self.stage_results.push(report);
        daily_reports
    }

    async fn dependency_string_maps(
        &self,
        selected_tasks: &[&Task],
    ) -> (HashMap<String, Vec<String>>, HashMap<String, Vec<String>>) {
        let owned: Vec<Task> = selected_tasks.iter().map(|t| (*t).clone()).collect();
        let maps = match DependencyMaps::load(&self.state.tasks, &owned).await {
            Ok(maps) => maps,
            Err(e) => {
                tracing::error!("failed to reload dependencies for packing: {}", e);
                return (HashMap::new(), HashMap::new());
            }
        };
        let task_deps = maps
            .task_deps
            .iter()
            .map(|(k, v)| {
                (
                    k.to_string(),
                    v.iter().map(|d| d.to_string()).collect::<Vec<_>>(),
                )
            })
            .collect();
        let goal_deps = maps
            .goal_deps
            .iter()
            .map(|(k, v)| {
                (
                    k.to_string(),
                    v.iter().map(|d| d.to_string()).collect::<Vec<_>>(),
                )
            })
            .collect();
        (task_deps, goal_deps)
    }

    async fn stage_integration(
        &mut self,
        week_start: NaiveDate,
        selection: WeeklySelectionReport,
        daily: Vec<DailyOptimizationReport>,
    ) -> OptimizationResponse {
        let stage_start = Instant::now();

        let total_optimized_hours: f64 = daily.iter().map(|d| d.total_scheduled_hours).sum();
        let capacity = self.request.constraints.total_capacity_hours;
        let capacity_utilization = if capacity > 0.0 {
            total_optimized_hours / capacity
        } else {
            0.0
        };
        let consistency_score = if selection.selected_hours > 0.0 {
            (total_optimized_hours / selection.selected_hours).clamp(0.0, 1.0)
        } else if total_optimized_hours == 0.0 {
            1.0
        } else {
            0.0
        };

        let insights = integration_insights(&daily, capacity_utilization, consistency_score);
        self.stage_results.push(StageReport::ok(
            PipelineStage::Integration,
            stage_start.elapsed().as_secs_f64(),
        ));

        let status = overall_status(&self.stage_results);
        let success = matches!(
            status,
            OptimizationStatus::Success | OptimizationStatus::PartialSuccess
        );

        let solver_seconds: f64 = daily.iter().map(|d| d.solve_time_seconds).sum::<f64>()
            + selection.solve_time_seconds;
        let metrics = PipelineMetrics {
            total_duration_seconds: self.started.elapsed().as_secs_f64(),
            solver_time_seconds: solver_seconds,
            tasks_processed: selection.selected_task_ids.len()
                + selection.selected_recurring_task_ids.len(),
            optimization_efficiency: capacity_utilization.clamp(0.0, 1.0),
        };

        // Persist the aggregated weekly schedule blob on success.
        if success {
            self.persist_weekly(week_start, &selection, &daily, &insights)
                .await;
        }

        OptimizationResponse {
            success,
            status,
            week_start_date: self.request.week_start_date.clone(),
            weekly_selection: Some(selection),
            daily_optimizations: daily,
            total_optimized_hours,
            capacity_utilization,
            consistency_score,
            optimization_insights: insights,
            pipeline_metrics: metrics,
            stage_results: std::mem::take(&mut self.stage_results),
            generated_at: Utc::now(),
        }
    }

    async fn persist_weekly(
        &self,
        week_start: NaiveDate,
        selection: &WeeklySelectionReport,
        daily: &[DailyOptimizationReport],
        insights: &[String],
    ) {
        let tasks = self
            .state
            .tasks
            .tasks_by_ids(self.user_id, &selection.selected_task_ids)
            .await
            .unwrap_or_default();
        let actuals = self
            .state
            .logs
            .actual_hours(&selection.selected_task_ids)
            .await;

        let blob = WeeklyScheduleBlob {
            week_start_date: week_start.format("%Y-%m-%d").to_string(),
            selected_tasks: tasks
                .iter()
                .map(|task| SelectedTaskSummary {
                    task_id: task.id,
                    title: task.title.clone(),
                    remaining_hours: task
                        .remaining_hours(actuals.get(&task.id).copied().unwrap_or(0.0)),
                    priority: task.priority,
                })
                .collect(),
            selected_recurring_task_ids: selection.selected_recurring_task_ids.clone(),
            project_allocations: self.request.constraints.project_allocations.clone(),
            daily_optimizations: daily.to_vec(),
            insights: insights.to_vec(),
            generated_at: Utc::now(),
        };

        match serde_json::to_value(&blob) {
            Ok(value) => {
                if let Err(e) = self
                    .state
                    .schedules
                    .upsert_weekly(self.user_id, week_start, &value)
                    .await
                {
                    tracing::error!("failed to persist weekly schedule: {}", e);
                }
            }
            Err(e) => tracing::error!("failed to serialize weekly schedule: {}", e),
        }
    }

    fn failed_response(
        &mut self,
        selection: Option<WeeklySelectionReport>,
        daily: Vec<DailyOptimizationReport>,
    ) -> OptimizationResponse {
        let errors: Vec<String> = self
            .stage_results
            .iter()
            .flat_map(|s| s.errors.iter().cloned())
            .collect();
        OptimizationResponse {
            success: false,
            status: OptimizationStatus::Failed,
            week_start_date: self.request.week_start_date.clone(),
            weekly_selection: selection,
            daily_optimizations: daily,
            total_optimized_hours: 0.0,
            capacity_utilization: 0.0,
            consistency_score: 0.0,
            optimization_insights: errors.iter().map(|e| format!("Error: {e}")).collect(),
            pipeline_metrics: PipelineMetrics {
                total_duration_seconds: self.started.elapsed().as_secs_f64(),
                ..PipelineMetrics::default()
            },
            stage_results: std::mem::take(&mut self.stage_results),
            generated_at: Utc::now(),
        }
    }
}

fn parse_ids(ids: &[String]) -> Vec<Uuid> {
    ids.iter()
        .filter_map(|id| Uuid::parse_str(id).ok())
        .collect()
}

pub(crate) fn build_slots(inputs: &[TimeSlotInput]) -> Result<Vec<TimeSlot>, String> {
    inputs
        .iter()
        .map(|input| {
            let start = parse_hh_mm(&input.start)
                .ok_or_else(|| format!("invalid slot start time: {}", input.start))?;
            let end = parse_hh_mm(&input.end)
                .ok_or_else(|| format!("invalid slot end time: {}", input.end))?;
            if end <= start {
                return Err(format!("slot end {} must be after start {}", input.end, input.start));
            }
            Ok(TimeSlot {
                start,
                end,
                kind: solver_kind(input.kind),
                capacity_hours: input.capacity_hours,
                pinned_project_id: input.pinned_project_id.map(|p| p.to_string()),
            })
        })
        .collect()
}

fn daily_report(
    date: &str,
    result: &cadence_solver::ScheduleResult,
    slot_inputs: &[TimeSlotInput],
    titles: &HashMap<String, String>,
) -> DailyOptimizationReport {
    let assignments = result
        .assignments
        .iter()
        .filter_map(|assignment| {
            let task_id = Uuid::parse_str(&assignment.task_id).ok()?;
            let slot = slot_inputs.get(assignment.slot_index)?;
            Some(PlanAssignment {
                task_id,
                task_title: titles
                    .get(&assignment.task_id)
                    .cloned()
                    .unwrap_or_default(),
                slot_index: assignment.slot_index,
                start_time: slot.start.clone(),
                slot_end: slot.end.clone(),
                slot_kind: slot.kind,
                duration_hours: assignment.duration_hours,
                is_fixed: assignment.is_fixed,
                remaining_hours: None,
            })
        })
        .collect();

    DailyOptimizationReport {
        date: date.to_string(),
        total_scheduled_hours: result.total_scheduled_hours,
        assignments,
        unscheduled_task_ids: parse_ids(&result.unscheduled_task_ids),
        optimization_status: result.status.as_str().to_string(),
        solve_time_seconds: result.solve_time_seconds,
    }
}

fn integration_insights(
    daily: &[DailyOptimizationReport],
    capacity_utilization: f64,
    consistency_score: f64,
) -> Vec<String> {
    let mut insights = Vec::new();

    if capacity_utilization > 0.9 {
        insights.push(
            "High capacity utilization (over 90%): the weekly plan uses your hours efficiently."
                .to_string(),
        );
    } else if capacity_utilization < 0.6 {
        insights.push(
            "Low capacity utilization (under 60%): there is room to plan more work this week."
                .to_string(),
        );
    }

    if consistency_score > 0.9 {
        insights.push(
            "High consistency: the weekly selection and daily packing agree well.".to_string(),
        );
    } else if consistency_score < 0.7 {
        insights.push(
            "Consistency warning: the weekly selection and daily constraints disagree."
                .to_string(),
        );
    }

    let failed_days = daily
        .iter()
        .filter(|d| matches!(d.optimization_status.as_str(), "INFEASIBLE" | "UNKNOWN"))
        .count();
    if failed_days > 0 {
        insights.push(format!(
            "{failed_days} day(s) could not be packed; consider relaxing the time slots."
        ));
    }

    let total_solve: f64 = daily.iter().map(|d| d.solve_time_seconds).sum();
    if total_solve < 1.0 {
        insights.push("Fast optimization: all constraints resolved quickly.".to_string());
    } else if total_solve > 5.0 {
        insights.push(
            "Optimization took a while; consider simplifying the constraints.".to_string(),
        );
    }

    insights
}

fn overall_status(stages: &[StageReport]) -> OptimizationStatus {
    let stage_ok = |stage: PipelineStage| {
        stages
            .iter()
            .find(|s| s.stage == stage)
            .map(|s| s.success)
            .unwrap_or(false)
    };
    let selection_ok = stage_ok(PipelineStage::Selection);
    let packing_ok = stage_ok(PipelineStage::Packing);

    if stages.iter().all(|s| s.success) {
        OptimizationStatus::Success
    } else if selection_ok || packing_ok {
        OptimizationStatus::PartialSuccess
    } else {
        OptimizationStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_domain::WorkKind;

    fn stage(stage: PipelineStage, success: bool) -> StageReport {
        StageReport {
            stage,
            success,
            duration_seconds: 0.1,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    #[test]
    fn all_stages_ok_is_success() {
        let stages = vec![
            stage(PipelineStage::Initialization, true),
            stage(PipelineStage::Priorities, true),
            stage(PipelineStage::Selection, true),
            stage(PipelineStage::Packing, true),
            stage(PipelineStage::Integration, true),
        ];
        assert_eq!(overall_status(&stages), OptimizationStatus::Success);
    }

    #[test]
    fn failed_packing_with_ok_selection_is_partial() {
        let stages = vec![
            stage(PipelineStage::Initialization, true),
            stage(PipelineStage::Selection, true),
            stage(PipelineStage::Packing, false),
        ];
        assert_eq!(overall_status(&stages), OptimizationStatus::PartialSuccess);
    }

    #[test]
    fn everything_failed_is_failed() {
        let stages = vec![
            stage(PipelineStage::Initialization, true),
            stage(PipelineStage::Selection, false),
            stage(PipelineStage::Packing, false),
        ];
        assert_eq!(overall_status(&stages), OptimizationStatus::Failed);
    }

    #[test]
    fn build_slots_rejects_inverted_ranges() {
        let slots = vec![TimeSlotInput {
            start: "10:00".to_string(),
            end: "09:00".to_string(),
            kind: WorkKind::LightWork,
            capacity_hours: None,
            pinned_project_id: None,
        }];
        assert!(build_slots(&slots).is_err());
    }

    #[test]
    fn build_slots_parses_valid_input() {
        let slots = vec![TimeSlotInput {
            start: "09:00".to_string(),
            end: "12:00".to_string(),
            kind: WorkKind::FocusedWork,
            capacity_hours: Some(2.5),
            pinned_project_id: None,
        }];
        let built = build_slots(&slots).unwrap();
        assert_eq!(built.len(), 1);
        assert_eq!(built[0].capacity_hours, Some(2.5));
    }

    #[test]
    fn insights_flag_infeasible_days() {
        let daily = vec![DailyOptimizationReport {
            date: "2025-03-03".to_string(),
            total_scheduled_hours: 0.0,
            assignments: Vec::new(),
            unscheduled_task_ids: Vec::new(),
            optimization_status: "INFEASIBLE".to_string(),
            solve_time_seconds: 0.2,
        }];
        let insights = integration_insights(&daily, 0.8, 0.8);
        assert!(insights.iter().any(|i| i.contains("could not be packed")));
    }
}
