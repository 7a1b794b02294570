//! Executor: drives a compiled graph over a per-run state
//!
//! One step at a time: invoke the current step with a state snapshot,
//! merge its delta, resolve the outgoing edge on the post-merge state,
//! repeat until an edge resolves to the terminal sentinel. When a
//! finalizer is configured it runs exactly once before the run ends.
//!
//! The executor imposes no cycle detection or step cap of its own —
//! loop termination is the contract of whichever dispatcher bounds it.

use super::{Edge, Graph, Target};
use crate::error::AgentError;
use crate::state::{AgentState, StateDelta};
use crate::Result;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// One step's contribution to a run, in execution order.
#[derive(Debug, Clone, Serialize)]
pub struct StepUpdate {
    pub step: String,
    pub delta: StateDelta,
}

impl Graph {
    /// Run to completion and return the final state.
    pub async fn run(&self, initial: AgentState) -> Result<AgentState> {
        let mut state = initial;
        let mut current = self.entry.clone();

        loop {
            let delta = self.execute_step(&current, &state).await?;
            state.apply(&delta);

            match self.resolve_next(&current, &state)? {
                Some(next) => current = next,
                None => return Ok(state),
            }
        }
    }

    /// Run in the background, yielding every `(step, delta)` pair in
    /// execution order. A step failure is sent down the channel and ends
    /// the run. Dropping the receiver cancels the run at the next step
    /// boundary; an in-flight step is awaited, never preempted.
    pub fn stream(self: &Arc<Self>, initial: AgentState) -> mpsc::Receiver<Result<StepUpdate>> {
        let (tx, rx) = mpsc::channel(16);
        let graph = Arc::clone(self);

        tokio::spawn(async move {
            let mut state = initial;
            let mut current = graph.entry.clone();

            loop {
                let delta = match graph.execute_step(&current, &state).await {
                    Ok(delta) => delta,
                    Err(e) => {
                        warn!(step = %current, error = %e, "Step failed, ending run");
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                };
                state.apply(&delta);

                let update = StepUpdate {
                    step: current.clone(),
                    delta,
                };
                if tx.send(Ok(update)).await.is_err() {
                    debug!(step = %current, "Consumer gone, cancelling run");
                    return;
                }

                match graph.resolve_next(&current, &state) {
                    Ok(Some(next)) => current = next,
                    Ok(None) => return,
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }
        });

        rx
    }

    async fn execute_step(&self, name: &str, state: &AgentState) -> Result<StateDelta> {
        let step = self
            .steps
            .get(name)
            .ok_or_else(|| AgentError::UnknownStep(name.to_string()))?;

        debug!(step = name, revision = state.revision_number, "Executing step");
        step.run(state).await
    }

    /// Resolve the step after `current` against the post-merge state.
    /// `None` means the run is over. An edge resolving to the terminal
    /// sentinel is redirected through the finalizer first, once.
    fn resolve_next(&self, current: &str, state: &AgentState) -> Result<Option<String>> {
        let target = match self.edges.get(current) {
            Some(Edge::Fixed(target)) => target.clone(),
            Some(Edge::Conditional { decide, branches }) => {
                let key = decide(state);
                match branches.get(&key) {
                    Some(target) => target.clone(),
                    None => {
                        return Err(AgentError::UnmappedBranch(format!(
                            "dispatcher at '{}' returned undeclared key '{}'",
                            current, key
                        )))
                    }
                }
            }
            // Only the finalizer compiles without an edge.
            None => Target::End,
        };

        Ok(match target {
            Target::Step(next) => Some(next),
            Target::End => match &self.finalizer {
                Some(fin) if fin != current => Some(fin.clone()),
                _ => None,
            },
        })
    }
}
