//! Pure constraint optimizer for weekly task selection and daily packing.
//!
//! Both models are integer-scaled exact searches with wall-clock deadlines:
//! the weekly selector is a 0/1 selection under capacity and per-project
//! band constraints, the daily packer assigns tasks to time slots under
//! capacity, ordering and pinning constraints. On deadline expiry the best
//! incumbent found so far is returned.

pub mod daily;
pub mod weekly;

pub use daily::{
    Assignment, DailySolverConfig, FixedAssignment, ScheduleResult, SchedulerTask, TimeSlot,
    pack_daily_schedule,
};
pub use weekly::{
    ProjectAllocationSpec, WeeklySelection, WeeklySolverConfig, WeeklyTaskSpec,
    select_weekly_tasks,
};

/// Work type tag shared by tasks and slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkKind {
    LightWork,
    FocusedWork,
    Study,
}

/// Solver outcome vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// Search space exhausted; incumbent is provably optimal.
    Optimal,
    /// Deadline expired with a valid incumbent.
    Feasible,
    /// Constraints admit no solution.
    Infeasible,
    /// Deadline expired before any solution was found.
    Unknown,
    /// Daily packer received no tasks or no slots.
    NoTasksOrSlots,
}

impl SolveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SolveStatus::Optimal => "OPTIMAL",
            SolveStatus::Feasible => "FEASIBLE",
            SolveStatus::Infeasible => "INFEASIBLE",
            SolveStatus::Unknown => "UNKNOWN",
            SolveStatus::NoTasksOrSlots => "NO_TASKS_OR_SLOTS",
        }
    }

    /// Whether the status carries a usable solution.
    pub fn is_solution(&self) -> bool {
        matches!(
            self,
            SolveStatus::Optimal | SolveStatus::Feasible | SolveStatus::NoTasksOrSlots
        )
    }
}
