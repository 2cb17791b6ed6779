//! Convergence run - drives builders, graph, and a target through one pass

use crate::build::{BuildContext, ModelBuilder};
use crate::error::BuildError;
use crate::graph::DependencyGraph;
use crate::planner::ExecutionPlan;
use serde::Serialize;
use std::fmt;

/// Lifecycle of one convergence run
///
/// Runs only move forward. A failed run is discarded; retrying starts a new
/// run from `Collecting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunPhase {
    Collecting,
    Validated,
    Ordered,
    Applying,
    Rendering,
    Done,
    Failed,
}

impl RunPhase {
    /// Whether a run in this phase may move to `next`
    pub fn can_transition_to(self, next: RunPhase) -> bool {
        use RunPhase::*;
        match (self, next) {
            (Done | Failed, _) => false,
            (_, Failed) => true,
            (Collecting, Validated) => true,
            (Validated, Ordered) => true,
            (Ordered, Applying | Rendering) => true,
            (Applying | Rendering, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Collecting => "collecting",
            Self::Validated => "validated",
            Self::Ordered => "ordered",
            Self::Applying => "applying",
            Self::Rendering => "rendering",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A consumer of an ordered plan
pub trait Target {
    type Output;

    /// Phase the run is in while this target works
    fn phase(&self) -> RunPhase;

    /// Consume the plan
    fn run(&mut self, plan: &ExecutionPlan) -> Result<Self::Output, BuildError>;

    /// Whether the output counts as a successful run
    fn succeeded(&self, _output: &Self::Output) -> bool {
        true
    }
}

/// One full pass from task collection to apply or render
pub struct Convergence<'m, M: ?Sized> {
    model: &'m M,
    phase: RunPhase,
}

impl<'m, M: ?Sized + Sync> Convergence<'m, M> {
    pub fn new(model: &'m M) -> Self {
        Self {
            model,
            phase: RunPhase::Collecting,
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    fn advance(&mut self, next: RunPhase) -> Result<(), BuildError> {
        if !self.phase.can_transition_to(next) {
            return Err(BuildError::InvalidTransition {
                from: self.phase.to_string(),
                to: next.to_string(),
            });
        }
        log::debug!("run phase {} -> {}", self.phase, next);
        self.phase = next;
        Ok(())
    }

    fn fail<T>(&mut self, err: BuildError) -> Result<T, BuildError> {
        if self.phase.can_transition_to(RunPhase::Failed) {
            log::debug!("run phase {} -> {}", self.phase, RunPhase::Failed);
            self.phase = RunPhase::Failed;
        }
        Err(err)
    }

    /// Collect, validate, and order
    ///
    /// Nothing touches the live environment here; every error is fatal.
    pub fn prepare(&mut self, builders: &[Box<dyn ModelBuilder<M>>]) -> Result<ExecutionPlan, BuildError> {
        if self.phase != RunPhase::Collecting {
            return Err(BuildError::InvalidTransition {
                from: self.phase.to_string(),
                to: RunPhase::Validated.to_string(),
            });
        }

        let mut ctx = BuildContext::new(self.model);
        if let Err(e) = ctx.run_builders(builders) {
            return self.fail(e);
        }
        log::info!("collected {} tasks from {} builders", ctx.len(), builders.len());

        let graph = match DependencyGraph::build(ctx.finish()) {
            Ok(graph) => graph,
            Err(e) => return self.fail(e),
        };
        self.advance(RunPhase::Validated)?;

        let plan = match ExecutionPlan::from_graph(graph) {
            Ok(plan) => plan,
            Err(e) => return self.fail(e),
        };
        self.advance(RunPhase::Ordered)?;
        Ok(plan)
    }

    /// Hand the ordered plan to a target
    pub fn finish<T: Target>(&mut self, plan: &ExecutionPlan, target: &mut T) -> Result<T::Output, BuildError> {
        self.advance(target.phase())?;
        match target.run(plan) {
            Ok(output) => {
                if target.succeeded(&output) {
                    self.advance(RunPhase::Done)?;
                } else {
                    self.advance(RunPhase::Failed)?;
                }
                Ok(output)
            }
            Err(e) => self.fail(e),
        }
    }
}
