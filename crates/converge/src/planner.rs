//! Execution planner - turns a validated graph into an ordered plan

use crate::error::BuildError;
use crate::graph::DependencyGraph;
use crate::task::{BoxedTask, Task};
use crate::types::TaskId;
use std::collections::HashMap;

/// One task in plan order, with its edges resolved to plan positions
#[derive(Debug)]
pub struct PlanNode {
    pub id: TaskId,
    pub task: BoxedTask,
    /// Builder that contributed the task
    pub builder: String,
    /// Positions of the tasks this one runs after (all earlier in the plan)
    pub prerequisites: Vec<usize>,
    /// Positions of the tasks that run after this one
    pub dependents: Vec<usize>,
}

/// A topologically ordered task list
///
/// Every node appears after all of its prerequisites. Targets consume the
/// plan either in order (rendering) or as a DAG (the mutating scheduler).
#[derive(Debug, Default)]
pub struct ExecutionPlan {
    nodes: Vec<PlanNode>,
}

impl ExecutionPlan {
    /// Order a validated graph
    pub fn from_graph(graph: DependencyGraph) -> Result<Self, BuildError> {
        let order = graph.topological_order()?;
        let (mut entries, mut prerequisites) = graph.into_parts();

        let positions: HashMap<TaskId, usize> = order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();

        let mut nodes = Vec::with_capacity(order.len());
        for id in order {
            let Some(entry) = entries.remove(&id) else {
                continue;
            };
            let prereqs = prerequisites
                .remove(&id)
                .unwrap_or_default()
                .iter()
                .filter_map(|dep| positions.get(dep).copied())
                .collect();
            nodes.push(PlanNode {
                id,
                task: entry.task,
                builder: entry.builder,
                prerequisites: prereqs,
                dependents: Vec::new(),
            });
        }

        for i in 0..nodes.len() {
            for p in nodes[i].prerequisites.clone() {
                nodes[p].dependents.push(i);
            }
        }

        Ok(Self { nodes })
    }

    /// Nodes in execution order
    pub fn nodes(&self) -> &[PlanNode] {
        &self.nodes
    }

    /// Tasks in execution order
    pub fn tasks(&self) -> impl Iterator<Item = &dyn Task> {
        self.nodes.iter().map(|n| n.task.as_ref())
    }

    /// Identities in execution order
    pub fn order(&self) -> Vec<&TaskId> {
        self.nodes.iter().map(|n| &n.id).collect()
    }

    /// Position of a task in the plan
    pub fn position(&self, id: &TaskId) -> Option<usize> {
        self.nodes.iter().position(|n| &n.id == id)
    }

    /// Nodes matching a target filter
    ///
    /// Filter format: "Kind" or "Kind/name-fragment", kind compared
    /// case-insensitively.
    pub fn matching<'a>(&'a self, filter: Option<&'a str>) -> impl Iterator<Item = &'a PlanNode> + 'a {
        let parsed = filter.map(parse_filter);
        self.nodes.iter().filter(move |n| match &parsed {
            None => true,
            Some((kind, name)) => matches_filter(&n.id, kind, name.as_deref()),
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

fn parse_filter(filter: &str) -> (String, Option<String>) {
    match filter.split_once('/') {
        Some((kind, name)) => (kind.to_string(), Some(name.to_string())),
        None => (filter.to_string(), None),
    }
}

fn matches_filter(id: &TaskId, kind: &str, name: Option<&str>) -> bool {
    if !id.kind.eq_ignore_ascii_case(kind) {
        return false;
    }
    if let Some(n) = name
        && !id.name.contains(n)
    {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildContext;
    use crate::build::tests::Stub;

    fn plan(tasks: Vec<Stub>) -> ExecutionPlan {
        let mut ctx = BuildContext::new(&());
        for task in tasks {
            ctx.register("test", Box::new(task)).unwrap();
        }
        let graph = DependencyGraph::build(ctx.finish()).unwrap();
        ExecutionPlan::from_graph(graph).unwrap()
    }

    #[test]
    fn test_prerequisites_precede_dependents() {
        let p = plan(vec![
            Stub::new("service").depends_on("pkg").after("conf"),
            Stub::new("conf"),
            Stub::new("pkg"),
        ]);

        let svc = p.position(&TaskId::new("Stub", "service")).unwrap();
        assert_eq!(svc, 2);
        for (i, node) in p.nodes().iter().enumerate() {
            for &pre in &node.prerequisites {
                assert!(pre < i);
                assert!(p.nodes()[pre].dependents.contains(&i));
            }
        }
    }

    #[test]
    fn test_cycle_fails_before_plan() {
        let mut ctx = BuildContext::new(&());
        ctx.register("t", Box::new(Stub::new("a").depends_on("b"))).unwrap();
        ctx.register("t", Box::new(Stub::new("b").depends_on("a"))).unwrap();
        let graph = DependencyGraph::build(ctx.finish()).unwrap();
        assert!(matches!(
            ExecutionPlan::from_graph(graph),
            Err(BuildError::Cycle { .. })
        ));
    }

    #[test]
    fn test_parse_filter() {
        assert_eq!(parse_filter("File"), ("File".to_string(), None));
        assert_eq!(
            parse_filter("File//etc/containerd"),
            ("File".to_string(), Some("/etc/containerd".to_string()))
        );
    }

    #[test]
    fn test_matching_filters_kind_case_insensitively() {
        let p = plan(vec![Stub::new("a"), Stub::new("b")]);
        assert_eq!(p.matching(Some("stub/b")).count(), 1);
        assert_eq!(p.matching(Some("file")).count(), 0);
        assert_eq!(p.matching(None).count(), 2);
    }
}
