//! Build and render errors
//!
//! Everything here is fatal for a convergence run: it stops the run before
//! any task touches the live environment (or before a render is emitted).
//! Per-task apply failures are not errors at this level; they are reported
//! as [`crate::ApplyResult::Failed`] outcomes.

use crate::types::TaskId;

/// Errors raised while collecting, validating, or ordering tasks
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// A builder failed, typically on invalid or missing configuration
    #[error("builder {builder} failed: {source:#}")]
    Builder {
        builder: String,
        #[source]
        source: anyhow::Error,
    },

    /// Two builders registered the same identity with different desired state
    #[error(
        "conflicting definitions for {id}: {first_builder} wants {first_payload}, {second_builder} wants {second_payload}"
    )]
    DuplicateTask {
        id: TaskId,
        first_builder: String,
        first_payload: String,
        second_builder: String,
        second_payload: String,
    },

    /// A task's desired state could not be serialized for comparison
    #[error("cannot serialize desired state of {id}: {source}")]
    Payload {
        id: TaskId,
        #[source]
        source: serde_json::Error,
    },

    /// A required dependency names a task that is not in the final set
    #[error("{task} depends on {missing}, which no builder produced")]
    DanglingDependency { task: TaskId, missing: TaskId },

    /// The task graph is not acyclic
    #[error("dependency cycle: {}", format_cycle(.members))]
    Cycle { members: Vec<TaskId> },

    /// A run was asked to move to a phase it cannot reach from where it is
    #[error("invalid run transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// The worker pool for the mutating target could not be created
    #[error("failed to start executor: {0}")]
    Executor(String),

    /// Rendering failed
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Errors raised while rendering a plan to a declarative document
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The task has no declarative representation
    #[error("cannot render {id}: {reason}")]
    Unrenderable { id: TaskId, reason: String },

    /// Two identities sanitize to the same resource identifier
    #[error("resource identifier {identifier} derived from both {first} and {second}")]
    IdentifierCollision {
        identifier: String,
        first: TaskId,
        second: TaskId,
    },

    /// A symbolic reference points at a task outside the plan
    #[error("{id} references {target}, which is not part of the plan")]
    UnresolvedReference { id: TaskId, target: TaskId },

    /// Final document serialization failed
    #[error("failed to serialize rendered document: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn format_cycle(members: &[TaskId]) -> String {
    let mut parts: Vec<String> = members.iter().map(ToString::to_string).collect();
    if let Some(first) = members.first() {
        parts.push(first.to_string());
    }
    parts.join(" -> ")
}
