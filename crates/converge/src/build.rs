//! Task collection - builders emit tasks, the build context merges them

use crate::error::BuildError;
use crate::task::{BoxedTask, Task, TaskEntry, TaskSet};
use crate::types::TaskId;
use rayon::prelude::*;
use std::collections::BTreeMap;

/// A producer of tasks
///
/// Builders inspect the node model and emit zero or more tasks. They never
/// see what other builders emitted, so any set of builders can be composed
/// in any order.
pub trait ModelBuilder<M: ?Sized>: Send + Sync {
    /// Stable builder name, used in conflict diagnostics
    fn name(&self) -> &'static str;

    /// Emit tasks for this model
    ///
    /// An error here is a configuration error and aborts the run.
    fn build(&self, model: &M, out: &mut Emitter) -> anyhow::Result<()>;
}

/// Write-only sink handed to a single builder
#[derive(Debug)]
pub struct Emitter {
    builder: String,
    tasks: Vec<BoxedTask>,
}

impl Emitter {
    pub fn new(builder: impl Into<String>) -> Self {
        Self {
            builder: builder.into(),
            tasks: Vec::new(),
        }
    }

    /// Emit a task
    pub fn add<T: Task + 'static>(&mut self, task: T) {
        self.tasks.push(Box::new(task));
    }

    /// Name of the builder this emitter belongs to
    pub fn builder(&self) -> &str {
        &self.builder
    }

    /// Tasks emitted so far, in emission order
    pub fn tasks(&self) -> &[BoxedTask] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn into_tasks(self) -> Vec<BoxedTask> {
        self.tasks
    }
}

/// Accumulator for one convergence run
///
/// Holds a read-only view of the node model and the identity to task mapping.
/// Discarded once the task set has been handed to the graph stage.
pub struct BuildContext<'m, M: ?Sized> {
    model: &'m M,
    entries: BTreeMap<TaskId, TaskEntry>,
    payloads: BTreeMap<TaskId, serde_json::Value>,
}

impl<'m, M: ?Sized + Sync> BuildContext<'m, M> {
    pub fn new(model: &'m M) -> Self {
        Self {
            model,
            entries: BTreeMap::new(),
            payloads: BTreeMap::new(),
        }
    }

    /// The node model builders run against
    pub fn model(&self) -> &'m M {
        self.model
    }

    /// Register one task on behalf of a builder
    ///
    /// Returns `true` when the task was inserted and `false` when an equal
    /// task with the same identity was already present. A task with the same
    /// identity but a different payload is a conflict.
    pub fn register(&mut self, builder: &str, task: BoxedTask) -> Result<bool, BuildError> {
        let id = task.id();
        let payload = task.payload().map_err(|source| BuildError::Payload {
            id: id.clone(),
            source,
        })?;

        if let Some(existing) = self.payloads.get(&id) {
            if *existing == payload {
                log::trace!("{} re-emitted {}, merged", builder, id);
                return Ok(false);
            }
            let first_builder = self
                .entries
                .get(&id)
                .map(|e| e.builder.clone())
                .unwrap_or_default();
            return Err(BuildError::DuplicateTask {
                id,
                first_builder,
                first_payload: existing.to_string(),
                second_builder: builder.to_string(),
                second_payload: payload.to_string(),
            });
        }

        self.payloads.insert(id.clone(), payload);
        self.entries.insert(
            id,
            TaskEntry {
                task,
                builder: builder.to_string(),
            },
        );
        Ok(true)
    }

    /// Register everything an emitter collected
    pub fn absorb(&mut self, emitter: Emitter) -> Result<usize, BuildError> {
        let builder = emitter.builder.clone();
        let mut inserted = 0;
        for task in emitter.into_tasks() {
            if self.register(&builder, task)? {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    /// Run every builder against the model and register what they emit
    ///
    /// Builders run in parallel, each with its own emitter. Registration
    /// happens afterwards in builder order, so the first conflict or builder
    /// error reported is the same on every run.
    pub fn run_builders(&mut self, builders: &[Box<dyn ModelBuilder<M>>]) -> Result<(), BuildError> {
        let model = self.model;
        let emitted: Vec<Result<Emitter, BuildError>> = builders
            .par_iter()
            .map(|builder| {
                let mut out = Emitter::new(builder.name());
                builder
                    .build(model, &mut out)
                    .map_err(|source| BuildError::Builder {
                        builder: builder.name().to_string(),
                        source,
                    })?;
                Ok(out)
            })
            .collect();

        for result in emitted {
            let emitter = result?;
            let name = emitter.builder().to_string();
            let count = emitter.len();
            let inserted = self.absorb(emitter)?;
            log::debug!("{} emitted {} tasks ({} new)", name, count, inserted);
        }
        Ok(())
    }

    /// Number of distinct tasks registered
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.entries.contains_key(id)
    }

    /// Hand the complete task set to the graph stage
    pub fn finish(self) -> TaskSet {
        TaskSet::from_entries(self.entries)
    }
}
