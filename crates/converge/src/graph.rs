//! Dependency graph - validates task relations and orders them

use crate::error::BuildError;
use crate::task::{TaskEntry, TaskSet};
use crate::types::TaskId;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Directed acyclic graph over one build's task set
///
/// Edges point from a task to the tasks it must run after. Hard
/// dependencies must resolve; ordering hints and inferred relations only
/// produce an edge when their target is present.
#[derive(Debug)]
pub struct DependencyGraph {
    tasks: TaskSet,
    prerequisites: BTreeMap<TaskId, BTreeSet<TaskId>>,
}

impl DependencyGraph {
    /// Materialize edges and validate that every hard dependency exists
    pub fn build(tasks: TaskSet) -> Result<Self, BuildError> {
        let mut prerequisites: BTreeMap<TaskId, BTreeSet<TaskId>> = BTreeMap::new();
        let mut dropped = 0usize;

        for (id, task) in tasks.iter() {
            let mut edges = BTreeSet::new();

            for dep in task.dependencies() {
                if !tasks.contains(&dep) {
                    return Err(BuildError::DanglingDependency {
                        task: id.clone(),
                        missing: dep,
                    });
                }
                edges.insert(dep);
            }

            let conditional = task
                .ordering_hints()
                .into_iter()
                .chain(task.infer_ordering(&tasks));
            for hint in conditional {
                if &hint == id {
                    continue;
                }
                if tasks.contains(&hint) {
                    edges.insert(hint);
                } else {
                    dropped += 1;
                }
            }

            prerequisites.insert(id.clone(), edges);
        }

        if dropped > 0 {
            log::trace!("dropped {} ordering hints naming absent tasks", dropped);
        }

        Ok(Self {
            tasks,
            prerequisites,
        })
    }

    /// The tasks in this graph
    pub fn tasks(&self) -> &TaskSet {
        &self.tasks
    }

    /// Tasks `id` must run after
    pub fn prerequisites(&self, id: &TaskId) -> impl Iterator<Item = &TaskId> {
        self.prerequisites.get(id).into_iter().flatten()
    }

    /// Every materialized edge as (task, prerequisite)
    pub fn edges(&self) -> impl Iterator<Item = (&TaskId, &TaskId)> {
        self.prerequisites
            .iter()
            .flat_map(|(id, deps)| deps.iter().map(move |d| (id, d)))
    }

    pub fn edge_count(&self) -> usize {
        self.prerequisites.values().map(BTreeSet::len).sum()
    }

    /// Produce a topological order
    ///
    /// Ties are broken by identity, so the order is stable for a given task
    /// set. A cycle is reported with its member identities.
    pub fn topological_order(&self) -> Result<Vec<TaskId>, BuildError> {
        let mut remaining: BTreeMap<&TaskId, usize> = self
            .prerequisites
            .iter()
            .map(|(id, deps)| (id, deps.len()))
            .collect();

        let mut dependents: HashMap<&TaskId, Vec<&TaskId>> = HashMap::new();
        for (id, dep) in self.edges() {
            dependents.entry(dep).or_default().push(id);
        }

        let mut ready: BTreeSet<&TaskId> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut order = Vec::with_capacity(remaining.len());
        while let Some(id) = ready.pop_first() {
            order.push(id.clone());
            remaining.remove(id);
            for dependent in dependents.get(id).into_iter().flatten() {
                if let Some(count) = remaining.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(*dependent);
                    }
                }
            }
        }

        if remaining.is_empty() {
            return Ok(order);
        }

        let leftover: BTreeSet<&TaskId> = remaining.keys().copied().collect();
        Err(BuildError::Cycle {
            members: self.find_cycle(&leftover),
        })
    }

    /// Walk prerequisites among the tasks Kahn's algorithm could not order
    ///
    /// Every such task has an unordered prerequisite, so the walk must
    /// eventually revisit a task; the path from that task onward is a cycle.
    fn find_cycle(&self, leftover: &BTreeSet<&TaskId>) -> Vec<TaskId> {
        let Some(mut current) = leftover.first().copied() else {
            return Vec::new();
        };
        let mut path: Vec<&TaskId> = Vec::new();
        let mut seen: HashMap<&TaskId, usize> = HashMap::new();

        loop {
            if let Some(&start) = seen.get(current) {
                return path[start..].iter().map(|id| (*id).clone()).collect();
            }
            seen.insert(current, path.len());
            path.push(current);

            let next = self
                .prerequisites(current)
                .find(|dep| leftover.contains(dep));
            match next {
                Some(next) => current = next,
                None => return path.into_iter().cloned().collect(),
            }
        }
    }

    pub(crate) fn into_parts(self) -> (BTreeMap<TaskId, TaskEntry>, BTreeMap<TaskId, BTreeSet<TaskId>>) {
        (self.tasks.into_entries(), self.prerequisites)
    }
}
