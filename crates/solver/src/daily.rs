//! Daily packing.
//!
//! Assigns the weekly-selected tasks to one day's time slots: at most one
//! slot per task, slot capacity in minutes, dependency ordering across slot
//! indices, slot-project pinning, and user-fixed assignments that the search
//! must honor. The objective rewards assigned minutes weighted by priority,
//! kind affinity and deadline proximity.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, NaiveTime};

use crate::{SolveStatus, WorkKind};

/// Task as seen by the packer. `remaining_hours` drives the duration.
#[derive(Debug, Clone)]
pub struct SchedulerTask {
    pub id: String,
    pub title: String,
    pub estimate_hours: f64,
    /// 1 = highest, 5 = lowest.
    pub priority: i64,
    pub due_date: Option<NaiveDate>,
    pub kind: WorkKind,
    pub goal_id: Option<String>,
    pub is_weekly_recurring: bool,
    pub actual_hours: f64,
    pub project_id: Option<String>,
}

impl SchedulerTask {
    pub fn remaining_hours(&self) -> f64 {
        (self.estimate_hours - self.actual_hours).max(0.0)
    }
}

#[derive(Debug, Clone)]
pub struct TimeSlot {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub kind: WorkKind,
    pub capacity_hours: Option<f64>,
    pub pinned_project_id: Option<String>,
}

/// User-pinned (task, slot) pair. `duration_hours = None` uses the task's
/// remaining hours; durations are clamped to the slot's free capacity.
#[derive(Debug, Clone)]
pub struct FixedAssignment {
    pub task_id: String,
    pub slot_index: usize,
    pub duration_hours: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Assignment {
    pub task_id: String,
    pub slot_index: usize,
    pub start_time: NaiveTime,
    pub duration_hours: f64,
    pub is_fixed: bool,
}

#[derive(Debug, Clone)]
pub struct ScheduleResult {
    pub success: bool,
    pub assignments: Vec<Assignment>,
    pub unscheduled_task_ids: Vec<String>,
    pub total_scheduled_hours: f64,
    pub status: SolveStatus,
    pub solve_time_seconds: f64,
    pub objective_value: f64,
}

#[derive(Debug, Clone)]
pub struct DailySolverConfig {
    pub max_solve_time: Duration,
    pub kind_match_score: i64,
    pub kind_mismatch_score: i64,
    pub priority_score_base: i64,
    pub deadline_score_base: i64,
    pub min_score: i64,
}

impl Default for DailySolverConfig {
    fn default() -> Self {
        Self {
            max_solve_time: Duration::from_secs(5),
            kind_match_score: 10,
            kind_mismatch_score: 1,
            priority_score_base: 10,
            deadline_score_base: 10,
            min_score: 1,
        }
    }
}

/// Ordering pair: `dependent` must not land in an earlier slot than
/// `prerequisite`. Equal slot indices are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Precedence {
    dependent: usize,
    prerequisite: usize,
}

struct Model<'a> {
    tasks: Vec<&'a SchedulerTask>,
    durations: Vec<i64>,
    slot_caps: Vec<i64>,
    weights: Vec<Vec<i64>>,
    allowed: Vec<Vec<usize>>,
    pinned: HashMap<usize, (usize, i64)>,
    reserved: Vec<i64>,
    precedence: Vec<Precedence>,
}

struct Search<'m, 'a> {
    model: &'m Model<'a>,
    /// Non-pinned task indices in branch order.
    order: Vec<usize>,
    /// Optimistic objective available from `order[pos..]`.
    suffix_bound: Vec<i64>,
    assignment: Vec<Option<usize>>,
    slot_members: Vec<Vec<usize>>,
    min_units: Vec<i64>,
    pinned_objective: i64,
    best: Option<(i64, Vec<Option<usize>>, Vec<i64>)>,
    deadline: Instant,
    nodes: u64,
    timed_out: bool,
}

const DEADLINE_CHECK_MASK: u64 = 0x3FF;

impl Search<'_, '_> {
    fn dfs(&mut self, pos: usize, optimistic: i64) {
        self.nodes += 1;
        if self.nodes & DEADLINE_CHECK_MASK == 0 && Instant::now() >= self.deadline {
            self.timed_out = true;
        }
        if self.timed_out {
            return;
        }

        if pos == self.order.len() {
            self.evaluate_leaf();
            return;
        }

        if let Some((best, _, _)) = &self.best {
            if optimistic + self.suffix_bound[pos] <= *best {
                return;
            }
        }

        let task = self.order[pos];
        let model = self.model;

        for &j in &model.allowed[task] {
            if self.min_units[j] + 1 > model.slot_caps[j] {
                continue;
            }
            if !self.ordering_allows(task, j) {
                continue;
            }
            let gain = model.durations[task].min(model.slot_caps[j]) * model.weights[task][j];
            self.assignment[task] = Some(j);
            self.slot_members[j].push(task);
            self.min_units[j] += 1;
            self.dfs(pos + 1, optimistic + gain);
            self.min_units[j] -= 1;
            self.slot_members[j].pop();
            self.assignment[task] = None;
        }

        // Leave the task unscheduled.
        self.dfs(pos + 1, optimistic);
    }

    fn ordering_allows(&self, task: usize, slot: usize) -> bool {
        for pair in &self.model.precedence {
            if pair.dependent == task {
                if let Some(k) = self.assignment[pair.prerequisite] {
                    if slot < k {
                        return false;
                    }
                }
            }
            if pair.prerequisite == task {
                if let Some(k) = self.assignment[pair.dependent] {
                    if k < slot {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Exact objective for the current complete assignment: per slot, every
    /// task gets one baseline minute, the rest of the capacity goes to tasks
    /// in descending weight order.
    fn evaluate_leaf(&mut self) {
        let mut objective = self.pinned_objective;
        let mut durations = vec![0i64; self.model.tasks.len()];

        for (&task, &(_, duration)) in &self.model.pinned {
            durations[task] = duration;
        }

        for (j, members) in self.slot_members.iter().enumerate() {
            if members.is_empty() {
                continue;
            }
            let mut ordered = members.clone();
            ordered.sort_by_key(|&i| std::cmp::Reverse(self.model.weights[i][j]));

            let mut extra_cap =
                self.model.slot_caps[j] - self.model.reserved[j] - members.len() as i64;
            for &i in &ordered {
                let extra = (self.model.durations[i] - 1).min(extra_cap).max(0);
                let d = 1 + extra;
                extra_cap -= extra;
                durations[i] = d;
                objective += d * self.model.weights[i][j];
            }
        }

        if self
            .best
            .as_ref()
            .is_none_or(|(best, _, _)| objective > *best)
        {
            self.best = Some((objective, self.assignment.clone(), durations));
        }
    }
}

fn no_tasks_or_slots(tasks: &[SchedulerTask], started: Instant) -> ScheduleResult {
    ScheduleResult {
        success: true,
        assignments: Vec::new(),
        unscheduled_task_ids: tasks.iter().map(|t| t.id.clone()).collect(),
        total_scheduled_hours: 0.0,
        status: SolveStatus::NoTasksOrSlots,
        solve_time_seconds: started.elapsed().as_secs_f64(),
        objective_value: 0.0,
    }
}

fn infeasible(tasks: &[SchedulerTask], started: Instant) -> ScheduleResult {
    ScheduleResult {
        success: false,
        assignments: Vec::new(),
        unscheduled_task_ids: tasks.iter().map(|t| t.id.clone()).collect(),
        total_scheduled_hours: 0.0,
        status: SolveStatus::Infeasible,
        solve_time_seconds: started.elapsed().as_secs_f64(),
        objective_value: 0.0,
    }
}

/// Pack one day.
///
/// `task_dependencies` maps task id to its prerequisite task ids;
/// `goal_dependencies` maps goal id to prerequisite goal ids. Both only
/// constrain pairs present in `tasks` (co-scheduled ordering).
pub fn pack_daily_schedule(
    tasks: &[SchedulerTask],
    slots: &[TimeSlot],
    date: Option<NaiveDate>,
    task_dependencies: &HashMap<String, Vec<String>>,
    goal_dependencies: &HashMap<String, Vec<String>>,
    fixed_assignments: &[FixedAssignment],
    config: &DailySolverConfig,
) -> ScheduleResult {
    let started = Instant::now();

    if tasks.is_empty() || slots.is_empty() {
        return no_tasks_or_slots(tasks, started);
    }

    let slot_caps: Vec<i64> = slots
        .iter()
        .map(|slot| {
            let duration = (slot.end - slot.start).num_minutes().max(0);
            match slot.capacity_hours {
                Some(hours) => duration.min((hours * 60.0) as i64),
                None => duration,
            }
        })
        .collect();

    // Zero-remaining non-recurring tasks have nothing left to schedule.
    let mut model_tasks: Vec<&SchedulerTask> = Vec::new();
    let mut skipped: Vec<String> = Vec::new();
    for task in tasks {
        let duration = (task.remaining_hours() * 60.0).ceil() as i64;
        if duration <= 0 {
            tracing::debug!(task_id = %task.id, "skipping task with no remaining hours");
            skipped.push(task.id.clone());
        } else {
            model_tasks.push(task);
        }
    }

    if model_tasks.is_empty() {
        let mut result = no_tasks_or_slots(tasks, started);
        result.status = SolveStatus::Optimal;
        return result;
    }

    let durations: Vec<i64> = model_tasks
        .iter()
        .map(|t| (t.remaining_hours() * 60.0).ceil() as i64)
        .collect();

    let index_by_id: HashMap<&str, usize> = model_tasks
        .iter()
        .enumerate()
        .map(|(i, t)| (t.id.as_str(), i))
        .collect();

    // Fixed pins: clamp to the slot's free capacity, reserve it, force the
    // (task, slot, duration) triple.
    let mut pinned: HashMap<usize, (usize, i64)> = HashMap::new();
    let mut reserved = vec![0i64; slots.len()];
    for fixed in fixed_assignments {
        let Some(&task_idx) = index_by_id.get(fixed.task_id.as_str()) else {
            tracing::warn!(task_id = %fixed.task_id, "fixed assignment references unknown task");
            continue;
        };
        if fixed.slot_index >= slots.len() {
            tracing::warn!(
                task_id = %fixed.task_id,
                slot_index = fixed.slot_index,
                "fixed assignment references invalid slot"
            );
            continue;
        }
        if pinned.contains_key(&task_idx) {
            continue;
        }
        let requested = match fixed.duration_hours {
            Some(hours) => (hours * 60.0) as i64,
            None => durations[task_idx],
        };
        let available = slot_caps[fixed.slot_index] - reserved[fixed.slot_index];
        let duration = requested.min(available);
        if duration > 0 {
            pinned.insert(task_idx, (fixed.slot_index, duration));
            reserved[fixed.slot_index] += duration;
        }
    }

    let weights: Vec<Vec<i64>> = model_tasks
        .iter()
        .map(|task| {
            let priority_weight = config
                .min_score
                .max(config.priority_score_base - task.priority);
            let deadline_bonus = match (date, task.due_date) {
                (Some(schedule_date), Some(due)) => {
                    let days_until_due = (due - schedule_date).num_days();
                    if days_until_due >= 0 {
                        config
                            .min_score
                            .max(config.deadline_score_base - days_until_due)
                    } else {
                        config.min_score
                    }
                }
                _ => config.min_score,
            };
            slots
                .iter()
                .map(|slot| {
                    let kind_bonus = if task.kind == slot.kind {
                        config.kind_match_score
                    } else {
                        config.kind_mismatch_score
                    };
                    priority_weight * kind_bonus * deadline_bonus
                })
                .collect()
        })
        .collect();

    // Slot-project pinning: a pinned slot only hosts that project's tasks;
    // recurring tasks are exempt.
    let slot_admits = |task: &SchedulerTask, slot: &TimeSlot| -> bool {
        match &slot.pinned_project_id {
            Some(project) if !task.is_weekly_recurring => task.project_id.as_ref() == Some(project),
            _ => true,
        }
    };
    let allowed: Vec<Vec<usize>> = model_tasks
        .iter()
        .enumerate()
        .map(|(i, task)| {
            if pinned.contains_key(&i) {
                Vec::new() // Pinned tasks are not branch choices.
            } else {
                let mut candidate_slots: Vec<usize> = slots
                    .iter()
                    .enumerate()
                    .filter(|(_, slot)| slot_admits(task, slot))
                    .map(|(j, _)| j)
                    .collect();
                // Descending weight so strong incumbents appear early.
                candidate_slots.sort_by_key(|&j| std::cmp::Reverse(weights[i][j]));
                candidate_slots
            }
        })
        .collect();

    // A pin that contradicts the slot's project pinning makes the model
    // unsatisfiable, as does a pinned pair that breaks ordering.
    for (&task_idx, &(slot_idx, _)) in &pinned {
        if !slot_admits(model_tasks[task_idx], &slots[slot_idx]) {
            tracing::warn!(
                task_id = %model_tasks[task_idx].id,
                slot_index = slot_idx,
                "fixed assignment conflicts with slot project pinning"
            );
            return infeasible(tasks, started);
        }
    }

    let mut precedence: Vec<Precedence> = Vec::new();
    for (task_id, prerequisites) in task_dependencies {
        let Some(&dependent) = index_by_id.get(task_id.as_str()) else {
            continue;
        };
        for prerequisite_id in prerequisites {
            if let Some(&prerequisite) = index_by_id.get(prerequisite_id.as_str()) {
                precedence.push(Precedence {
                    dependent,
                    prerequisite,
                });
            }
        }
    }
    let mut tasks_by_goal: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, task) in model_tasks.iter().enumerate() {
        if let (Some(goal_id), false) = (&task.goal_id, task.is_weekly_recurring) {
            tasks_by_goal.entry(goal_id.as_str()).or_default().push(i);
        }
    }
    for (goal_id, prerequisite_goals) in goal_dependencies {
        let Some(dependents) = tasks_by_goal.get(goal_id.as_str()) else {
            continue;
        };
        for prerequisite_goal in prerequisite_goals {
            let Some(prerequisites) = tasks_by_goal.get(prerequisite_goal.as_str()) else {
                continue;
            };
            for &dependent in dependents {
                for &prerequisite in prerequisites {
                    precedence.push(Precedence {
                        dependent,
                        prerequisite,
                    });
                }
            }
        }
    }

    for pair in &precedence {
        if let (Some(&(dep_slot, _)), Some(&(pre_slot, _))) =
            (pinned.get(&pair.dependent), pinned.get(&pair.prerequisite))
        {
            if dep_slot < pre_slot {
                tracing::warn!("fixed assignments violate dependency ordering");
                return infeasible(tasks, started);
            }
        }
    }

    let pinned_objective: i64 = pinned
        .iter()
        .map(|(&task_idx, &(slot_idx, duration))| duration * weights[task_idx][slot_idx])
        .sum();

    let model = Model {
        tasks: model_tasks,
        durations,
        slot_caps,
        weights,
        allowed,
        pinned,
        reserved,
        precedence,
    };

    // Branch on the tasks with the biggest potential contribution first.
    let best_possible: Vec<i64> = (0..model.tasks.len())
        .map(|i| {
            model.allowed[i]
                .iter()
                .map(|&j| model.durations[i].min(model.slot_caps[j]) * model.weights[i][j])
                .max()
                .unwrap_or(0)
        })
        .collect();
    let mut order: Vec<usize> = (0..model.tasks.len())
        .filter(|i| !model.pinned.contains_key(i))
        .collect();
    order.sort_by_key(|&i| std::cmp::Reverse(best_possible[i]));

    let mut suffix_bound = vec![0i64; order.len() + 1];
    for (pos, &i) in order.iter().enumerate().rev() {
        suffix_bound[pos] = suffix_bound[pos + 1] + best_possible[i];
    }

    let mut assignment: Vec<Option<usize>> = vec![None; model.tasks.len()];
    // Reserved capacity already accounts for the pinned durations.
    let min_units = model.reserved.clone();
    for (&task_idx, &(slot_idx, _)) in &model.pinned {
        assignment[task_idx] = Some(slot_idx);
    }

    let mut search = Search {
        model: &model,
        order,
        suffix_bound,
        assignment,
        slot_members: vec![Vec::new(); slots.len()],
        min_units,
        pinned_objective,
        best: None,
        deadline: started + config.max_solve_time,
        nodes: 0,
        timed_out: false,
    };
    search.dfs(0, pinned_objective);

    let solve_time = started.elapsed().as_secs_f64();
    let Some((objective, best_assignment, best_durations)) = search.best else {
        let status = if search.timed_out {
            SolveStatus::Unknown
        } else {
            SolveStatus::Infeasible
        };
        let mut result = infeasible(tasks, started);
        result.status = status;
        result.solve_time_seconds = solve_time;
        return result;
    };
    let status = if search.timed_out {
        SolveStatus::Feasible
    } else {
        SolveStatus::Optimal
    };

    let mut assignments = Vec::new();
    let mut unscheduled_task_ids = skipped;
    let mut total_minutes = 0i64;
    for (i, task) in model.tasks.iter().enumerate() {
        match best_assignment[i] {
            Some(j) => {
                let duration = best_durations[i];
                total_minutes += duration;
                assignments.push(Assignment {
                    task_id: task.id.clone(),
                    slot_index: j,
                    start_time: slots[j].start,
                    duration_hours: duration as f64 / 60.0,
                    is_fixed: model.pinned.contains_key(&i),
                });
            }
            None => unscheduled_task_ids.push(task.id.clone()),
        }
    }

    tracing::debug!(
        status = status.as_str(),
        assigned = assignments.len(),
        unscheduled = unscheduled_task_ids.len(),
        nodes = search.nodes,
        "daily packing solved"
    );

    ScheduleResult {
        success: true,
        assignments,
        unscheduled_task_ids,
        total_scheduled_hours: total_minutes as f64 / 60.0,
        status,
        solve_time_seconds: solve_time,
        objective_value: objective as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn task(id: &str, hours: f64, kind: WorkKind) -> SchedulerTask {
        SchedulerTask {
            id: id.to_string(),
            title: id.to_string(),
            estimate_hours: hours,
            priority: 3,
            due_date: None,
            kind,
            goal_id: None,
            is_weekly_recurring: false,
            actual_hours: 0.0,
            project_id: None,
        }
    }

    fn slot(start: NaiveTime, end: NaiveTime, kind: WorkKind) -> TimeSlot {
        TimeSlot {
            start,
            end,
            kind,
            capacity_hours: None,
            pinned_project_id: None,
        }
    }

    fn pack(
        tasks: &[SchedulerTask],
        slots: &[TimeSlot],
        fixed: &[FixedAssignment],
    ) -> ScheduleResult {
        pack_daily_schedule(
            tasks,
            slots,
            None,
            &HashMap::new(),
            &HashMap::new(),
            fixed,
            &DailySolverConfig::default(),
        )
    }

    fn slot_of(result: &ScheduleResult, task_id: &str) -> usize {
        result
            .assignments
            .iter()
            .find(|a| a.task_id == task_id)
            .map(|a| a.slot_index)
            .unwrap()
    }

    #[test]
    fn kind_affinity_places_tasks_in_matching_slots() {
        let tasks = vec![
            task("t1", 1.0, WorkKind::FocusedWork),
            task("t2", 1.0, WorkKind::LightWork),
        ];
        let slots = vec![
            slot(t(9, 0), t(10, 0), WorkKind::FocusedWork),
            slot(t(10, 0), t(11, 0), WorkKind::LightWork),
        ];
        let result = pack(&tasks, &slots, &[]);

        assert!(result.success);
        assert_eq!(result.status, SolveStatus::Optimal);
        assert_eq!(slot_of(&result, "t1"), 0);
        assert_eq!(slot_of(&result, "t2"), 1);
        assert!((result.total_scheduled_hours - 2.0).abs() < 1e-9);
    }

    #[test]
    fn pinned_slot_only_hosts_its_project() {
        let mut ta = task("ta", 1.0, WorkKind::LightWork);
        ta.project_id = Some("p".to_string());
        let mut tb = task("tb", 1.0, WorkKind::LightWork);
        tb.project_id = Some("q".to_string());

        let mut s0 = slot(t(9, 0), t(10, 0), WorkKind::LightWork);
        s0.pinned_project_id = Some("p".to_string());

        let result = pack(&[ta, tb], &[s0], &[]);

        assert!(result.success);
        assert_eq!(slot_of(&result, "ta"), 0);
        assert_eq!(result.unscheduled_task_ids, vec!["tb".to_string()]);
    }

    #[test]
    fn recurring_tasks_ignore_slot_project_pinning() {
        let mut recurring = task("r", 1.0, WorkKind::LightWork);
        recurring.is_weekly_recurring = true;

        let mut s0 = slot(t(9, 0), t(10, 0), WorkKind::LightWork);
        s0.pinned_project_id = Some("p".to_string());

        let result = pack(&[recurring], &[s0], &[]);

        assert!(result.success);
        assert_eq!(slot_of(&result, "r"), 0);
    }

    #[test]
    fn dependency_order_is_respected() {
        let tasks = vec![
            task("a", 1.0, WorkKind::LightWork),
            task("b", 1.0, WorkKind::LightWork),
        ];
        let slots = vec![
            slot(t(9, 0), t(10, 0), WorkKind::LightWork),
            slot(t(10, 0), t(11, 0), WorkKind::LightWork),
        ];
        let deps = HashMap::from([("b".to_string(), vec!["a".to_string()])]);
        let result = pack_daily_schedule(
            &tasks,
            &slots,
            None,
            &deps,
            &HashMap::new(),
            &[],
            &DailySolverConfig::default(),
        );

        assert!(result.success);
        assert!(slot_of(&result, "a") <= slot_of(&result, "b"));
    }

    #[test]
    fn goal_dependency_orders_tasks_across_goals() {
        let mut a = task("a", 1.0, WorkKind::LightWork);
        a.goal_id = Some("g1".to_string());
        let mut b = task("b", 1.0, WorkKind::LightWork);
        b.goal_id = Some("g2".to_string());

        let slots = vec![
            slot(t(9, 0), t(10, 0), WorkKind::LightWork),
            slot(t(10, 0), t(11, 0), WorkKind::LightWork),
        ];
        // g2 depends on g1, so b must not precede a.
        let goal_deps = HashMap::from([("g2".to_string(), vec!["g1".to_string()])]);
        let result = pack_daily_schedule(
            &[a, b],
            &slots,
            None,
            &HashMap::new(),
            &goal_deps,
            &[],
            &DailySolverConfig::default(),
        );

        assert!(result.success);
        assert!(slot_of(&result, "a") <= slot_of(&result, "b"));
    }

    #[test]
    fn empty_input_reports_no_tasks_or_slots() {
        let result = pack(&[], &[], &[]);

        assert!(result.success);
        assert_eq!(result.status, SolveStatus::NoTasksOrSlots);
        assert!(result.assignments.is_empty());
    }

    #[test]
    fn zero_remaining_task_is_skipped() {
        let mut done = task("done", 2.0, WorkKind::LightWork);
        done.actual_hours = 2.0;
        let open = task("open", 1.0, WorkKind::LightWork);

        let slots = vec![slot(t(9, 0), t(10, 0), WorkKind::LightWork)];
        let result = pack(&[done, open], &slots, &[]);

        assert!(result.success);
        assert_eq!(result.assignments.len(), 1);
        assert_eq!(result.assignments[0].task_id, "open");
        assert!(result.unscheduled_task_ids.contains(&"done".to_string()));
    }

    #[test]
    fn slot_capacity_is_never_exceeded() {
        let tasks = vec![
            task("a", 2.0, WorkKind::LightWork),
            task("b", 2.0, WorkKind::LightWork),
            task("c", 2.0, WorkKind::LightWork),
        ];
        let slots = vec![
            slot(t(9, 0), t(12, 0), WorkKind::LightWork),
            slot(t(13, 0), t(14, 0), WorkKind::LightWork),
        ];
        let result = pack(&tasks, &slots, &[]);

        assert!(result.success);
        for (j, cap_minutes) in [(0usize, 180i64), (1, 60)] {
            let used: f64 = result
                .assignments
                .iter()
                .filter(|a| a.slot_index == j)
                .map(|a| a.duration_hours)
                .sum();
            assert!(used * 60.0 <= cap_minutes as f64 + 1e-9);
        }
    }

    #[test]
    fn capacity_hours_caps_below_slot_duration() {
        let tasks = vec![task("a", 3.0, WorkKind::LightWork)];
        let mut s0 = slot(t(9, 0), t(12, 0), WorkKind::LightWork);
        s0.capacity_hours = Some(1.5);
        let result = pack(&tasks, &[s0], &[]);

        assert!(result.success);
        assert!((result.assignments[0].duration_hours - 1.5).abs() < 1e-9);
    }

    #[test]
    fn fixed_assignment_is_honored_and_clamped() {
        let tasks = vec![
            task("pinned", 3.0, WorkKind::LightWork),
            task("other", 1.0, WorkKind::LightWork),
        ];
        let slots = vec![
            slot(t(9, 0), t(10, 0), WorkKind::LightWork),
            slot(t(10, 0), t(12, 0), WorkKind::LightWork),
        ];
        // Requests 3h in a 1h slot: clamped to the slot's capacity.
        let fixed = vec![FixedAssignment {
            task_id: "pinned".to_string(),
            slot_index: 0,
            duration_hours: Some(3.0),
        }];
        let result = pack(&tasks, &slots, &fixed);

        assert!(result.success);
        let pinned = result
            .assignments
            .iter()
            .find(|a| a.task_id == "pinned")
            .unwrap();
        assert!(pinned.is_fixed);
        assert_eq!(pinned.slot_index, 0);
        assert!((pinned.duration_hours - 1.0).abs() < 1e-9);
    }

    #[test]
    fn conflicting_pins_are_infeasible() {
        let mut a = task("a", 1.0, WorkKind::LightWork);
        a.project_id = Some("p".to_string());
        let mut s0 = slot(t(9, 0), t(10, 0), WorkKind::LightWork);
        s0.pinned_project_id = Some("q".to_string());

        let fixed = vec![FixedAssignment {
            task_id: "a".to_string(),
            slot_index: 0,
            duration_hours: None,
        }];
        let result = pack(&[a], &[s0], &fixed);

        assert!(!result.success);
        assert_eq!(result.status, SolveStatus::Infeasible);
    }

    #[test]
    fn deadline_bonus_prefers_urgent_tasks_under_contention() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        let mut urgent = task("urgent", 1.0, WorkKind::LightWork);
        urgent.due_date = Some(date);
        let mut relaxed = task("relaxed", 1.0, WorkKind::LightWork);
        relaxed.due_date = date.succ_opt().map(|d| d.succ_opt().unwrap());

        // One 90-minute slot: both fit at minimum, but the urgent task
        // should take the larger share.
        let slots = vec![slot(t(9, 0), t(10, 30), WorkKind::LightWork)];
        let result = pack_daily_schedule(
            &[urgent, relaxed],
            &slots,
            Some(date),
            &HashMap::new(),
            &HashMap::new(),
            &[],
            &DailySolverConfig::default(),
        );

        assert!(result.success);
        let urgent_hours = result
            .assignments
            .iter()
            .find(|a| a.task_id == "urgent")
            .map(|a| a.duration_hours)
            .unwrap();
        assert!((urgent_hours - 1.0).abs() < 1e-9);
    }
}
