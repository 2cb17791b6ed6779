//! Task trait for declarative state convergence
//!
//! A Task is one idempotent unit of desired state: it has an identity,
//! knows how to observe the live environment, and knows how to correct it.

use crate::context::ApplyContext;
use crate::error::RenderError;
use crate::render::{RenderValue, RenderedResource};
use crate::types::{ApplyResult, TaskId, TaskState};
use anyhow::Result;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

/// Upcast to [`Any`] so tasks can inspect each other's concrete kinds
/// when inferring ordering.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Core trait for convergence tasks
///
/// Every task provides:
/// - Identity ([`Task::id`]), unique within one build
/// - A serialized desired state ([`Task::payload`]) used to merge duplicate
///   emissions and to render the task declaratively
/// - Ordering relations: hard [`Task::dependencies`], conditional
///   [`Task::ordering_hints`], and relations inferred from the rest of the set
/// - State detection ([`Task::current_state`] vs [`Task::desired_state`])
/// - State convergence ([`Task::apply`]) and commands to run after a change
///
/// # Example
///
/// ```ignore
/// use converge::{ApplyContext, ApplyResult, Task, TaskId, TaskState};
///
/// #[derive(Debug, serde::Serialize)]
/// struct Marker { path: String }
///
/// impl Task for Marker {
///     fn id(&self) -> TaskId { TaskId::new("Marker", &self.path) }
///     fn description(&self) -> String { format!("Touch {}", self.path) }
///     fn payload(&self) -> serde_json::Result<serde_json::Value> { serde_json::to_value(self) }
///
///     fn current_state(&self, ctx: &ApplyContext) -> anyhow::Result<TaskState> {
///         if ctx.host_path(&self.path).exists() {
///             Ok(TaskState::Present { details: None })
///         } else {
///             Ok(TaskState::Absent)
///         }
///     }
///
///     fn desired_state(&self) -> TaskState { TaskState::Present { details: None } }
///
///     fn apply(&self, ctx: &ApplyContext) -> anyhow::Result<ApplyResult> {
///         std::fs::write(ctx.host_path(&self.path), "")?;
///         Ok(ApplyResult::Created)
///     }
/// }
/// ```
pub trait Task: AsAny + Send + Sync + fmt::Debug {
    /// Unique identity of this task
    fn id(&self) -> TaskId;

    /// Human-readable description of what this task does
    fn description(&self) -> String;

    /// Full desired state as a JSON value
    ///
    /// Two tasks with the same identity are interchangeable exactly when
    /// their payloads are equal.
    fn payload(&self) -> serde_json::Result<serde_json::Value>;

    /// Tasks that must be applied before this one
    ///
    /// Every entry must exist in the final task set.
    fn dependencies(&self) -> Vec<TaskId> {
        Vec::new()
    }

    /// Tasks this one runs after, if they are present
    ///
    /// Entries naming absent tasks are dropped.
    fn ordering_hints(&self) -> Vec<TaskId> {
        Vec::new()
    }

    /// Ordering relations derived from the other tasks in the set
    ///
    /// Treated like ordering hints: only present tasks produce edges.
    fn infer_ordering(&self, _tasks: &TaskSet) -> Vec<TaskId> {
        Vec::new()
    }

    /// Commands to run, in order, after an apply that changed state
    fn on_change(&self) -> Vec<Vec<String>> {
        Vec::new()
    }

    /// Observe the live environment
    fn current_state(&self, ctx: &ApplyContext) -> Result<TaskState>;

    /// The state `current_state` reports once the task has converged
    fn desired_state(&self) -> TaskState;

    /// Perform the minimal corrective action
    fn apply(&self, ctx: &ApplyContext) -> Result<ApplyResult>;

    /// Declarative representation of this task
    ///
    /// The default exposes every non-null top-level payload field as a
    /// literal property.
    fn render(&self) -> Result<RenderedResource, RenderError> {
        let id = self.id();
        let payload = self.payload().map_err(|e| RenderError::Unrenderable {
            id: id.clone(),
            reason: e.to_string(),
        })?;
        let serde_json::Value::Object(fields) = payload else {
            return Err(RenderError::Unrenderable {
                id,
                reason: "desired state is not an object".to_string(),
            });
        };

        let properties: BTreeMap<String, RenderValue> = fields
            .into_iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k, RenderValue::Literal(v)))
            .collect();

        Ok(RenderedResource {
            kind: id.kind,
            properties,
        })
    }
}

/// A boxed task for type-erased storage
pub type BoxedTask = Box<dyn Task>;

/// A registered task and the builder that contributed it
#[derive(Debug)]
pub struct TaskEntry {
    pub task: BoxedTask,
    pub builder: String,
}

/// The complete, deduplicated set of tasks produced by one build
///
/// Iteration is ordered by identity so that everything derived from the
/// set is deterministic.
#[derive(Debug, Default)]
pub struct TaskSet {
    entries: BTreeMap<TaskId, TaskEntry>,
}

impl TaskSet {
    pub(crate) fn from_entries(entries: BTreeMap<TaskId, TaskEntry>) -> Self {
        Self { entries }
    }

    pub(crate) fn into_entries(self) -> BTreeMap<TaskId, TaskEntry> {
        self.entries
    }

    /// Look up a task by identity
    pub fn get(&self, id: &TaskId) -> Option<&dyn Task> {
        self.entries.get(id).map(|e| e.task.as_ref())
    }

    /// Whether a task with this identity is present
    pub fn contains(&self, id: &TaskId) -> bool {
        self.entries.contains_key(id)
    }

    /// Iterate tasks in identity order
    pub fn iter(&self) -> impl Iterator<Item = (&TaskId, &dyn Task)> {
        self.entries.iter().map(|(id, e)| (id, e.task.as_ref()))
    }

    /// Identities of all tasks of one kind
    pub fn ids_of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a TaskId> + 'a {
        self.entries.keys().filter(move |id| id.kind == kind)
    }

    /// Concrete tasks of type `T`
    pub fn of_type<T: Task + 'static>(&self) -> impl Iterator<Item = (&TaskId, &T)> {
        self.entries
            .iter()
            .filter_map(|(id, e)| e.task.as_ref().as_any().downcast_ref::<T>().map(|t| (id, t)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
