//! Application services: the optimization pipeline, the session engine, the
//! notification escalator, the delivery fabric and the reschedule engine.

pub mod daily_plan;
pub mod delivery;
pub mod dependencies;
pub mod escalator;
pub mod pipeline;
pub mod priority;
pub mod reschedule;
pub mod sessions;

use cadence_domain::{Task, WeeklyRecurringTask, WorkKind};
use uuid::Uuid;

pub(crate) fn solver_kind(kind: WorkKind) -> cadence_solver::WorkKind {
    match kind {
        WorkKind::LightWork => cadence_solver::WorkKind::LightWork,
        WorkKind::FocusedWork => cadence_solver::WorkKind::FocusedWork,
        WorkKind::Study => cadence_solver::WorkKind::Study,
    }
}

/// Solver-side view of a task. `remaining` becomes the whole estimate; the
/// packer then sees exactly the hours still owed.
pub(crate) fn scheduler_task(
    task: &Task,
    remaining_hours: f64,
    project_id: Option<Uuid>,
) -> cadence_solver::SchedulerTask {
    cadence_solver::SchedulerTask {
        id: task.id.to_string(),
        title: task.title.clone(),
        estimate_hours: remaining_hours,
        priority: task.priority as i64,
        due_date: task.due_at.map(|d| d.date_naive()),
        kind: solver_kind(task.work_kind),
        goal_id: Some(task.goal_id.to_string()),
        is_weekly_recurring: false,
        actual_hours: 0.0,
        project_id: project_id.map(|p| p.to_string()),
    }
}

/// Recurring tasks carry no goal, project or dependencies. The category tag
/// doubles as the work kind when it matches one.
pub(crate) fn recurring_scheduler_task(
    task: &WeeklyRecurringTask,
) -> cadence_solver::SchedulerTask {
    let kind = task
        .category
        .clone()
        .and_then(|c| WorkKind::try_from(c).ok())
        .map(solver_kind)
        .unwrap_or(cadence_solver::WorkKind::LightWork);
    cadence_solver::SchedulerTask {
        id: task.id.to_string(),
        title: task.title.clone(),
        estimate_hours: task.estimate_hours,
        priority: 3,
        due_date: None,
        kind,
        goal_id: None,
        is_weekly_recurring: true,
        actual_hours: 0.0,
        project_id: None,
    }
}
