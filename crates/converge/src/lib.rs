//! # Converge
//!
//! A task-graph engine for declarative node configuration.
//!
//! Independent builders inspect a model and emit tasks. The tasks are
//! merged into one set, validated and ordered as a DAG, and handed to a
//! target that either converges the live environment or renders the plan
//! into a declarative document.
//!
//! ## Core Concepts
//!
//! - **Task**: one idempotent unit of desired state with an identity
//! - **ModelBuilder**: a producer of tasks; builders never see each other's output
//! - **BuildContext**: merges emitted tasks, rejecting conflicting duplicates
//! - **DependencyGraph**: materializes ordering relations, detects cycles
//! - **ExecutionPlan**: the ordered task list
//! - **Target**: [`MutatingTarget`] applies, [`RenderTarget`] serializes
//! - **Convergence**: drives one run through its phases
//!
//! ## Example
//!
//! ```ignore
//! use converge::{Convergence, ModelBuilder, RenderTarget};
//!
//! let builders: Vec<Box<dyn ModelBuilder<NodeModel>>> = vec![Box::new(MyBuilder)];
//! let mut run = Convergence::new(&model);
//! let plan = run.prepare(&builders)?;
//! let doc = run.finish(&plan, &mut RenderTarget)?;
//! print!("{}", doc.to_json()?);
//! ```
//!
//! ## Provider Traits
//!
//! - [`CommandRunner`]: runs host commands for tasks and on-change actions
//! - [`ProgressCallback`]: receives progress updates
//! - [`ConfirmCallback`]: handles user confirmations

pub mod build;
pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod graph;
pub mod planner;
pub mod render;
pub mod run;
pub mod task;
pub mod types;

// Re-export main types at crate root
pub use build::{BuildContext, Emitter, ModelBuilder};
pub use context::{
    ApplyContext, AutoConfirm, CommandRunner, ConfirmCallback, NoProgress,
    ProgressCallback,
};
pub use diff::{DiffSummary, TaskDiff, compute_diffs, group_by_kind};
pub use error::{BuildError, RenderError};
pub use executor::{ExecuteReport, MutatingTarget, converge_task, execute};
pub use graph::DependencyGraph;
pub use planner::{ExecutionPlan, PlanNode};
pub use render::{
    RenderTarget, RenderValue, RenderedDocument, RenderedResource, render, resource_address,
    resource_identifier, resource_type,
};
pub use run::{Convergence, RunPhase, Target};
pub use task::{AsAny, BoxedTask, Task, TaskSet};
pub use types::{
    ApplyResult, CommandOutput, ExecuteOptions, ExecuteSummary, TaskId, TaskOutcome, TaskState,
};
