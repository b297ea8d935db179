//! Relaxed dependency resolution.
//!
//! A prerequisite counts as satisfied when it is already completed or when it
//! is co-schedulable in the same horizon; the daily packer then enforces
//! temporal ordering among co-scheduled pairs. Completion status is
//! batch-resolved: one read per kind, answered per task in memory.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use cadence_domain::Task;
use cadence_storage::{StorageError, TaskRepository};

/// Everything needed to answer satisfiability and ordering questions for one
/// candidate set, loaded in a fixed number of batch reads.
#[derive(Debug, Default)]
pub struct DependencyMaps {
    /// Dependent task → prerequisite task ids.
    pub task_deps: HashMap<Uuid, Vec<Uuid>>,
    /// Dependent goal → prerequisite goal ids.
    pub goal_deps: HashMap<Uuid, Vec<Uuid>>,
    task_completed: HashMap<Uuid, bool>,
    goal_completed: HashMap<Uuid, bool>,
}

impl DependencyMaps {
    pub async fn load(
        repo: &TaskRepository,
        candidates: &[Task],
    ) -> Result<Self, StorageError> {
        let task_ids: Vec<Uuid> = candidates.iter().map(|t| t.id).collect();
        let goal_ids: Vec<Uuid> = candidates
            .iter()
            .map(|t| t.goal_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let mut task_deps: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for (task_id, prerequisite) in repo.task_dependencies(&task_ids).await? {
            task_deps.entry(task_id).or_default().push(prerequisite);
        }

        let mut goal_deps: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for (goal_id, prerequisite) in repo.goal_dependencies(&goal_ids).await? {
            goal_deps.entry(goal_id).or_default().push(prerequisite);
        }

        // One completion read per kind covers every prerequisite.
        let prerequisite_tasks: Vec<Uuid> = task_deps
            .values()
            .flatten()
            .copied()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let prerequisite_goals: Vec<Uuid> = goal_deps
            .values()
            .flatten()
            .copied()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let task_completed = repo.task_completion_map(&prerequisite_tasks).await?;
        let goal_completed = repo.goal_completion_map(&prerequisite_goals).await?;

        Ok(Self {
            task_deps,
            goal_deps,
            task_completed,
            goal_completed,
        })
    }

    fn task_dep_satisfied(&self, prerequisite: Uuid, in_horizon: &HashSet<Uuid>) -> bool {
        in_horizon.contains(&prerequisite)
            || self.task_completed.get(&prerequisite).copied().unwrap_or(false)
    }

    fn goal_dep_satisfied(&self, prerequisite: Uuid, goals_in_horizon: &HashSet<Uuid>) -> bool {
        goals_in_horizon.contains(&prerequisite)
            || self.goal_completed.get(&prerequisite).copied().unwrap_or(false)
    }
}

/// Split candidates into schedulable tasks and blocked `(task_id, reason)`
/// pairs under the relaxed constraint.
pub fn partition_schedulable(
    candidates: Vec<Task>,
    maps: &DependencyMaps,
) -> (Vec<Task>, Vec<(Uuid, String)>) {
    let in_horizon: HashSet<Uuid> = candidates.iter().map(|t| t.id).collect();
    let goals_in_horizon: HashSet<Uuid> = candidates.iter().map(|t| t.goal_id).collect();

    let mut schedulable = Vec::with_capacity(candidates.len());
    let mut blocked = Vec::new();

    for task in candidates {
        let unsatisfied_task_dep = maps
            .task_deps
            .get(&task.id)
            .into_iter()
            .flatten()
            .find(|&&dep| !maps.task_dep_satisfied(dep, &in_horizon));
        if let Some(dep) = unsatisfied_task_dep {
            tracing::info!(
                task_id = %task.id,
                prerequisite = %dep,
                "task blocked by unsatisfied task dependency"
            );
            blocked.push((task.id, format!("prerequisite task {} not satisfiable", dep)));
            continue;
        }

        let unsatisfied_goal_dep = maps
            .goal_deps
            .get(&task.goal_id)
            .into_iter()
            .flatten()
            .find(|&&dep| !maps.goal_dep_satisfied(dep, &goals_in_horizon));
        if let Some(dep) = unsatisfied_goal_dep {
            tracing::info!(
                task_id = %task.id,
                prerequisite_goal = %dep,
                "task blocked by unsatisfied goal dependency"
            );
            blocked.push((task.id, format!("prerequisite goal {} not satisfiable", dep)));
            continue;
        }

        schedulable.push(task);
    }

    (schedulable, blocked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use cadence_domain::{TaskStatus, WorkKind};

    fn task(id: Uuid, goal_id: Uuid) -> Task {
        Task {
            id,
            goal_id,
            user_id: Uuid::new_v4(),
            title: "t".to_string(),
            estimate_hours: 2.0,
            work_kind: WorkKind::LightWork,
            priority: 3,
            due_at: None,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn co_scheduled_prerequisite_counts_as_satisfied() {
        let goal = Uuid::new_v4();
        let a = task(Uuid::new_v4(), goal);
        let b = task(Uuid::new_v4(), goal);

        let maps = DependencyMaps {
            task_deps: HashMap::from([(b.id, vec![a.id])]),
            ..Default::default()
        };
        let (schedulable, blocked) = partition_schedulable(vec![a, b], &maps);

        assert_eq!(schedulable.len(), 2);
        assert!(blocked.is_empty());
    }

    #[test]
    fn completed_prerequisite_outside_horizon_is_satisfied() {
        let goal = Uuid::new_v4();
        let done = Uuid::new_v4();
        let b = task(Uuid::new_v4(), goal);
        let b_id = b.id;

        let maps = DependencyMaps {
            task_deps: HashMap::from([(b_id, vec![done])]),
            task_completed: HashMap::from([(done, true)]),
            ..Default::default()
        };
        let (schedulable, blocked) = partition_schedulable(vec![b], &maps);

        assert_eq!(schedulable.len(), 1);
        assert!(blocked.is_empty());
    }

    #[test]
    fn open_prerequisite_outside_horizon_blocks() {
        let goal = Uuid::new_v4();
        let open = Uuid::new_v4();
        let b = task(Uuid::new_v4(), goal);
        let b_id = b.id;

        let maps = DependencyMaps {
            task_deps: HashMap::from([(b_id, vec![open])]),
            task_completed: HashMap::from([(open, false)]),
            ..Default::default()
        };
        let (schedulable, blocked) = partition_schedulable(vec![b], &maps);

        assert!(schedulable.is_empty());
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].0, b_id);
    }

    #[test]
    fn goal_dependency_satisfied_by_co_scheduled_goal_task() {
        let goal_a = Uuid::new_v4();
        let goal_b = Uuid::new_v4();
        let a = task(Uuid::new_v4(), goal_a);
        let b = task(Uuid::new_v4(), goal_b);

        // goal_b depends on goal_a; goal_a has a task in the horizon.
        let maps = DependencyMaps {
            goal_deps: HashMap::from([(goal_b, vec![goal_a])]),
            ..Default::default()
        };
        let (schedulable, blocked) = partition_schedulable(vec![a, b], &maps);

        assert_eq!(schedulable.len(), 2);
        assert!(blocked.is_empty());
    }

    #[test]
    fn incomplete_goal_dependency_blocks() {
        let goal_a = Uuid::new_v4();
        let goal_b = Uuid::new_v4();
        let b = task(Uuid::new_v4(), goal_b);
        let b_id = b.id;

        let maps = DependencyMaps {
            goal_deps: HashMap::from([(goal_b, vec![goal_a])]),
            goal_completed: HashMap::from([(goal_a, false)]),
            ..Default::default()
        };
        let (schedulable, blocked) = partition_schedulable(vec![b], &maps);

        assert!(schedulable.is_empty());
        assert_eq!(blocked[0].0, b_id);
    }
}
