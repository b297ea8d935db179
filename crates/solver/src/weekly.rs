//! Weekly task selection.
//!
//! Selects tasks and recurring tasks within the weekly capacity, holding each
//! project inside its allocation band, maximizing priority-weighted value.
//! Hours are scaled ×10, priorities ×100, project bonuses ×1000 so the whole
//! model is integral.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::SolveStatus;

/// Candidate task for weekly selection. `hours` is the remaining effort.
#[derive(Debug, Clone)]
pub struct WeeklyTaskSpec {
    pub id: String,
    pub title: String,
    pub hours: f64,
    /// Priority score in [0, 10], higher is better.
    pub priority_score: f64,
    pub project_id: Option<String>,
}

/// Weekly allocation band input for one project.
#[derive(Debug, Clone)]
pub struct ProjectAllocationSpec {
    pub project_id: String,
    pub target_hours: f64,
    pub max_hours: f64,
    pub priority_weight: f64,
}

#[derive(Debug, Clone)]
pub struct WeeklySolverConfig {
    pub max_solve_time: Duration,
    pub hours_scale: i64,
    pub priority_scale: i64,
    pub project_bonus_scale: i64,
    pub zero_allocation_epsilon: f64,
    pub ideal_min_factor: f64,
    pub ideal_max_factor: f64,
}

impl Default for WeeklySolverConfig {
    fn default() -> Self {
        Self {
            max_solve_time: Duration::from_secs(30),
            hours_scale: 10,
            priority_scale: 100,
            project_bonus_scale: 1000,
            zero_allocation_epsilon: 0.001,
            ideal_min_factor: 0.95,
            ideal_max_factor: 1.05,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WeeklySelection {
    pub success: bool,
    pub status: SolveStatus,
    pub selected_task_ids: Vec<String>,
    pub selected_recurring_task_ids: Vec<String>,
    pub selected_hours: f64,
    pub selected_hours_by_project: HashMap<String, f64>,
    pub solve_time_seconds: f64,
    pub objective_value: f64,
}

impl WeeklySelection {
    fn empty(status: SolveStatus, solve_time_seconds: f64) -> Self {
        Self {
            success: false,
            status,
            selected_task_ids: Vec::new(),
            selected_recurring_task_ids: Vec::new(),
            selected_hours: 0.0,
            selected_hours_by_project: HashMap::new(),
            solve_time_seconds,
            objective_value: 0.0,
        }
    }
}

/// Per-project `[min, max]` bound on scaled selected hours.
#[derive(Debug, Clone, Copy)]
struct Band {
    min: i64,
    max: i64,
}

#[derive(Debug, Clone)]
struct Candidate {
    /// Index into the original task/recurring slice.
    source: usize,
    recurring: bool,
    hours_scaled: i64,
    value: i64,
    band: Option<usize>,
}

struct Search<'a> {
    candidates: &'a [Candidate],
    capacity: i64,
    bands: Vec<Band>,
    /// Scaled hours already included per band.
    included: Vec<i64>,
    /// Scaled hours of still-undecided candidates per band.
    remaining: Vec<i64>,
    chosen: Vec<bool>,
    best: Option<(i64, Vec<bool>)>,
    deadline: Instant,
    nodes: u64,
    timed_out: bool,
}

const DEADLINE_CHECK_MASK: u64 = 0xFFF;

impl Search<'_> {
    fn dfs(&mut self, idx: usize, value: i64, cap_left: i64) {
        self.nodes += 1;
        if self.nodes & DEADLINE_CHECK_MASK == 0 && Instant::now() >= self.deadline {
            self.timed_out = true;
        }
        if self.timed_out {
            return;
        }

        if idx == self.candidates.len() {
            if self.best.as_ref().is_none_or(|(best, _)| value > *best) {
                self.best = Some((value, self.chosen.clone()));
            }
            return;
        }

        if let Some((best, _)) = &self.best {
            if value + self.fractional_bound(idx, cap_left) <= *best {
                return;
            }
        }

        let cand = &self.candidates[idx];
        let hours = cand.hours_scaled;
        let band = cand.band;
        if let Some(b) = band {
            self.remaining[b] -= hours;
        }

        // Include branch first: candidates are in density order, so this
        // tends to reach strong incumbents early.
        let band_max_ok = band.is_none_or(|b| self.included[b] + hours <= self.bands[b].max);
        if hours <= cap_left && band_max_ok {
            if let Some(b) = band {
                self.included[b] += hours;
            }
            self.chosen[idx] = true;
            self.dfs(idx + 1, value + cand.value, cap_left - hours);
            self.chosen[idx] = false;
            if let Some(b) = band {
                self.included[b] -= hours;
            }
        }

        // Exclude branch: only this candidate's band can newly lose its
        // minimum, so that is the only feasibility re-check needed.
        let band_min_ok =
            band.is_none_or(|b| self.included[b] + self.remaining[b] >= self.bands[b].min);
        if band_min_ok {
            self.dfs(idx + 1, value, cap_left);
        }

        if let Some(b) = band {
            self.remaining[b] += hours;
        }
    }

    /// Fractional knapsack bound over the undecided suffix, ignoring bands.
    /// Candidates are pre-sorted by value density, so the greedy fill is a
    /// valid upper bound.
    fn fractional_bound(&self, idx: usize, cap_left: i64) -> i64 {
        let mut cap = cap_left;
        let mut bound = 0.0f64;
        for cand in &self.candidates[idx..] {
            if cap <= 0 {
                break;
            }
            if cand.hours_scaled <= cap {
                bound += cand.value as f64;
                cap -= cand.hours_scaled;
            } else {
                bound += cand.value as f64 * cap as f64 / cand.hours_scaled as f64;
                break;
            }
        }
        bound.ceil() as i64
    }
}

/// Select the weekly task set.
///
/// `tasks` are band-constrained via `project_allocations`; `recurring_tasks`
/// count against capacity only. Returns the best incumbent on deadline
/// expiry; an empty result with the solver status when no solution exists.
pub fn select_weekly_tasks(
    tasks: &[WeeklyTaskSpec],
    recurring_tasks: &[WeeklyTaskSpec],
    project_allocations: &[ProjectAllocationSpec],
    total_capacity_hours: f64,
    config: &WeeklySolverConfig,
) -> WeeklySelection {
    let started = Instant::now();
    let capacity = (total_capacity_hours * config.hours_scale as f64) as i64;

    let allocation_by_project: HashMap<&str, &ProjectAllocationSpec> = project_allocations
        .iter()
        .map(|a| (a.project_id.as_str(), a))
        .collect();

    // Scaled availability per allocated project, over non-recurring tasks.
    let mut availability: HashMap<&str, i64> = HashMap::new();
    for task in tasks {
        if let Some(project_id) = task.project_id.as_deref() {
            if allocation_by_project.contains_key(project_id) {
                *availability.entry(project_id).or_insert(0) +=
                    (task.hours * config.hours_scale as f64) as i64;
            }
        }
    }

    // Band construction mirrors the allocation rules: zero targets pin the
    // project to zero hours; short availability collapses the band to
    // exactly what is available (feasibility first).
    let mut bands: Vec<Band> = Vec::new();
    let mut band_index: HashMap<&str, usize> = HashMap::new();
    for allocation in project_allocations {
        let Some(&avail) = availability.get(allocation.project_id.as_str()) else {
            continue;
        };
        let band = if allocation.target_hours <= config.zero_allocation_epsilon {
            Band { min: 0, max: 0 }
        } else {
            let ideal_min = (allocation.target_hours
                * config.ideal_min_factor
                * config.hours_scale as f64) as i64;
            let ideal_max = (allocation.target_hours
                * config.ideal_max_factor
                * config.hours_scale as f64) as i64;
            let (min, max) = if avail < ideal_min {
                (avail, avail)
            } else {
                (ideal_min, ideal_max.min(avail))
            };
            if max <= 0 {
                continue; // Nothing to constrain.
            }
            Band { min, max }
        };
        band_index.insert(allocation.project_id.as_str(), bands.len());
        bands.push(band);
    }

    let mut candidates: Vec<Candidate> = Vec::with_capacity(tasks.len() + recurring_tasks.len());
    for (i, task) in tasks.iter().enumerate() {
        let mut value = (task.priority_score * config.priority_scale as f64) as i64;
        let mut band = None;
        if let Some(project_id) = task.project_id.as_deref() {
            if let Some(allocation) = allocation_by_project.get(project_id) {
                value += (allocation.priority_weight * config.project_bonus_scale as f64) as i64;
            }
            band = band_index.get(project_id).copied();
        }
        candidates.push(Candidate {
            source: i,
            recurring: false,
            hours_scaled: (task.hours * config.hours_scale as f64) as i64,
            value,
            band,
        });
    }
    for (i, task) in recurring_tasks.iter().enumerate() {
        candidates.push(Candidate {
            source: i,
            recurring: true,
            hours_scaled: (task.hours * config.hours_scale as f64) as i64,
            value: (task.priority_score * config.priority_scale as f64) as i64,
            band: None,
        });
    }

    // Density order for the fractional bound and good first incumbents.
    candidates.sort_by(|a, b| {
        let da = a.value as f64 / a.hours_scaled.max(1) as f64;
        let db = b.value as f64 / b.hours_scaled.max(1) as f64;
        db.partial_cmp(&da).unwrap_or(std::cmp::Ordering::Equal)
    });

    let remaining: Vec<i64> = {
        let mut totals = vec![0i64; bands.len()];
        for cand in &candidates {
            if let Some(b) = cand.band {
                totals[b] += cand.hours_scaled;
            }
        }
        totals
    };

    let count = candidates.len();
    let mut search = Search {
        candidates: &candidates,
        capacity,
        bands,
        included: vec![0; band_index.len()],
        remaining,
        chosen: vec![false; count],
        best: None,
        deadline: started + config.max_solve_time,
        nodes: 0,
        timed_out: false,
    };
    search.dfs(0, 0, search.capacity);

    let solve_time = started.elapsed().as_secs_f64();
    let status = match (&search.best, search.timed_out) {
        (Some(_), false) => SolveStatus::Optimal,
        (Some(_), true) => SolveStatus::Feasible,
        (None, false) => SolveStatus::Infeasible,
        (None, true) => SolveStatus::Unknown,
    };

    let Some((objective, chosen)) = search.best else {
        tracing::warn!(status = status.as_str(), "weekly selection found no solution");
        return WeeklySelection::empty(status, solve_time);
    };

    let mut selected_task_ids = Vec::new();
    let mut selected_recurring_task_ids = Vec::new();
    let mut selected_hours = 0.0;
    let mut selected_hours_by_project: HashMap<String, f64> = HashMap::new();

    for (cand, &picked) in candidates.iter().zip(chosen.iter()) {
        if !picked {
            continue;
        }
        if cand.recurring {
            let task = &recurring_tasks[cand.source];
            selected_recurring_task_ids.push(task.id.clone());
            selected_hours += task.hours;
        } else {
            let task = &tasks[cand.source];
            selected_task_ids.push(task.id.clone());
            selected_hours += task.hours;
            if let Some(project_id) = &task.project_id {
                *selected_hours_by_project
                    .entry(project_id.clone())
                    .or_insert(0.0) += task.hours;
            }
        }
    }

    tracing::debug!(
        status = status.as_str(),
        selected = selected_task_ids.len(),
        recurring = selected_recurring_task_ids.len(),
        hours = selected_hours,
        "weekly selection solved"
    );

    WeeklySelection {
        success: true,
        status,
        selected_task_ids,
        selected_recurring_task_ids,
        selected_hours,
        selected_hours_by_project,
        solve_time_seconds: solve_time,
        objective_value: objective as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, hours: f64, priority: f64, project: Option<&str>) -> WeeklyTaskSpec {
        WeeklyTaskSpec {
            id: id.to_string(),
            title: id.to_string(),
            hours,
            priority_score: priority,
            project_id: project.map(|p| p.to_string()),
        }
    }

    fn allocation(project: &str, target: f64, weight: f64) -> ProjectAllocationSpec {
        ProjectAllocationSpec {
            project_id: project.to_string(),
            target_hours: target,
            max_hours: target * 1.5,
            priority_weight: weight,
        }
    }

    #[test]
    fn selects_highest_priority_within_capacity() {
        let tasks = vec![
            task("a", 5.0, 9.0, None),
            task("b", 5.0, 5.0, None),
            task("c", 5.0, 1.0, None),
        ];
        let result = select_weekly_tasks(&tasks, &[], &[], 10.0, &WeeklySolverConfig::default());

        assert!(result.success);
        assert_eq!(result.status, SolveStatus::Optimal);
        assert_eq!(result.selected_task_ids, vec!["a", "b"]);
        assert!((result.selected_hours - 10.0).abs() < 1e-9);
    }

    #[test]
    fn capacity_is_never_exceeded() {
        let tasks: Vec<_> = (0..12)
            .map(|i| task(&format!("t{i}"), 3.0, (i % 10) as f64, None))
            .collect();
        let result = select_weekly_tasks(&tasks, &[], &[], 20.0, &WeeklySolverConfig::default());

        assert!(result.success);
        assert!(result.selected_hours <= 20.0 + 1e-9);
    }

    #[test]
    fn zero_target_allocation_excludes_project() {
        let tasks = vec![
            task("a", 2.0, 10.0, Some("p1")),
            task("b", 2.0, 1.0, Some("p2")),
        ];
        let allocations = vec![allocation("p1", 0.0, 0.9), allocation("p2", 2.0, 0.1)];
        let result =
            select_weekly_tasks(&tasks, &[], &allocations, 10.0, &WeeklySolverConfig::default());

        assert!(result.success);
        assert!(!result.selected_task_ids.contains(&"a".to_string()));
        assert!(result.selected_task_ids.contains(&"b".to_string()));
    }

    #[test]
    fn band_collapses_to_availability_when_short() {
        // Target 10h but only 4h of work exists: the band becomes [4, 4]
        // and the whole project is selected.
        let tasks = vec![
            task("a", 2.5, 3.0, Some("p1")),
            task("b", 1.5, 2.0, Some("p1")),
        ];
        let allocations = vec![allocation("p1", 10.0, 0.5)];
        let result =
            select_weekly_tasks(&tasks, &[], &allocations, 40.0, &WeeklySolverConfig::default());

        assert!(result.success);
        assert_eq!(result.selected_task_ids.len(), 2);
        let project_hours = result.selected_hours_by_project["p1"];
        assert!((project_hours - 4.0).abs() < 1e-9);
    }

    #[test]
    fn band_holds_project_near_target() {
        let tasks = vec![
            task("a", 5.0, 5.0, Some("p1")),
            task("b", 5.0, 5.0, Some("p1")),
            task("c", 5.0, 5.0, Some("p1")),
            task("d", 5.0, 9.0, None),
        ];
        let allocations = vec![allocation("p1", 10.0, 0.2)];
        let result =
            select_weekly_tasks(&tasks, &[], &allocations, 40.0, &WeeklySolverConfig::default());

        assert!(result.success);
        let project_hours = result.selected_hours_by_project["p1"];
        // Ideal band is [9.5, 10.5]; with 5h tasks only 10h fits.
        assert!((project_hours - 10.0).abs() < 1e-9);
        assert!(result.selected_task_ids.contains(&"d".to_string()));
    }

    #[test]
    fn infeasible_when_band_minimum_exceeds_capacity() {
        let tasks = vec![task("a", 10.0, 5.0, Some("p1"))];
        let allocations = vec![allocation("p1", 10.0, 0.5)];
        let result =
            select_weekly_tasks(&tasks, &[], &allocations, 5.0, &WeeklySolverConfig::default());

        assert!(!result.success);
        assert_eq!(result.status, SolveStatus::Infeasible);
        assert!(result.selected_task_ids.is_empty());
    }

    #[test]
    fn recurring_tasks_count_against_capacity_but_not_bands() {
        let tasks = vec![task("a", 6.0, 5.0, Some("p1"))];
        let recurring = vec![task("r1", 6.0, 9.0, None)];
        let allocations = vec![allocation("p1", 6.0, 0.5)];
        // Capacity fits both the band minimum and the recurring task.
        let result = select_weekly_tasks(
            &tasks,
            &recurring,
            &allocations,
            12.0,
            &WeeklySolverConfig::default(),
        );

        assert!(result.success);
        assert_eq!(result.selected_task_ids, vec!["a"]);
        assert_eq!(result.selected_recurring_task_ids, vec!["r1"]);
        assert!(!result.selected_hours_by_project.contains_key("r1"));
    }

    #[test]
    fn project_bonus_breaks_priority_ties() {
        let tasks = vec![
            task("a", 4.0, 5.0, Some("heavy")),
            task("b", 4.0, 5.0, Some("light")),
        ];
        let allocations = vec![
            ProjectAllocationSpec {
                project_id: "heavy".to_string(),
                target_hours: 4.0,
                max_hours: 8.0,
                priority_weight: 0.9,
            },
            ProjectAllocationSpec {
                project_id: "light".to_string(),
                target_hours: 0.0,
                max_hours: 0.0,
                priority_weight: 0.1,
            },
        ];
        let result =
            select_weekly_tasks(&tasks, &[], &allocations, 4.0, &WeeklySolverConfig::default());

        assert!(result.success);
        assert_eq!(result.selected_task_ids, vec!["a"]);
    }

    #[test]
    fn empty_input_is_trivially_optimal() {
        let result = select_weekly_tasks(&[], &[], &[], 10.0, &WeeklySolverConfig::default());

        assert!(result.success);
        assert_eq!(result.status, SolveStatus::Optimal);
        assert!(result.selected_task_ids.is_empty());
        assert_eq!(result.selected_hours, 0.0);
    }

    #[test]
    fn deterministic_for_identical_input() {
        let tasks: Vec<_> = (0..10)
            .map(|i| task(&format!("t{i}"), 1.0 + (i % 3) as f64, (10 - i) as f64, None))
            .collect();
        let first = select_weekly_tasks(&tasks, &[], &[], 12.0, &WeeklySolverConfig::default());
        let second = select_weekly_tasks(&tasks, &[], &[], 12.0, &WeeklySolverConfig::default());

        assert_eq!(first.selected_task_ids, second.selected_task_ids);
        assert_eq!(first.objective_value, second.objective_value);
    }
}
