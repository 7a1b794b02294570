//! Workflow graph: steps, edges, builder and compile-time validation
//!
//! A workflow is a directed graph of named steps. Each step reads a state
//! snapshot and returns the fields it changed. Routing is declared up
//! front: one fixed successor, or one conditional dispatcher with a
//! declared branch map. The graph is validated once at `compile()` and is
//! immutable afterwards, so it can be shared across concurrent runs.

pub mod executor;

use crate::error::AgentError;
use crate::state::{AgentState, StateDelta};
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;

/// A single named unit of work in a workflow.
#[async_trait::async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> &'static str;

    /// Transform a state snapshot into a partial update. The executor owns
    /// the merge; steps never mutate shared state directly.
    async fn run(&self, state: &AgentState) -> Result<StateDelta>;
}

/// Where an edge leads: another registered step, or the end of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Step(String),
    End,
}

impl Target {
    pub fn step(name: impl Into<String>) -> Self {
        Target::Step(name.into())
    }
}

/// Picks a branch key from the post-merge state at a conditional node.
pub type Dispatcher = Box<dyn Fn(&AgentState) -> String + Send + Sync>;

/// Outgoing routing for one step. At most one per step.
pub(crate) enum Edge {
    Fixed(Target),
    Conditional {
        decide: Dispatcher,
        branches: HashMap<String, Target>,
    },
}

/// Builder for a workflow graph. All referential-integrity checks that
/// need the full step set run at `compile()`; cheap ones (duplicate names,
/// double edges) fail at registration.
pub struct GraphBuilder {
    steps: HashMap<String, Arc<dyn Step>>,
    edges: HashMap<String, Edge>,
    entry: Option<String>,
    finalizer: Option<String>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            steps: HashMap::new(),
            edges: HashMap::new(),
            entry: None,
            finalizer: None,
        }
    }

    /// Register a step under its unique name.
    pub fn add_step(&mut self, step: Arc<dyn Step>) -> Result<()> {
        let name = step.name();
        if self.steps.contains_key(name) {
            return Err(AgentError::DuplicateStep(name.to_string()));
        }
        self.steps.insert(name.to_string(), step);
        Ok(())
    }

    /// Declare the single fixed successor of `from`.
    pub fn add_edge(&mut self, from: &str, to: Target) -> Result<()> {
        if self.edges.contains_key(from) {
            return Err(AgentError::ConflictingEdge(format!(
                "step '{}' already has an outgoing edge",
                from
            )));
        }
        self.edges.insert(from.to_string(), Edge::Fixed(to));
        Ok(())
    }

    /// Declare conditional routing for `from`: the dispatcher inspects the
    /// post-merge state and returns a key looked up in `branches`.
    pub fn add_conditional_edge(
        &mut self,
        from: &str,
        decide: impl Fn(&AgentState) -> String + Send + Sync + 'static,
        branches: HashMap<String, Target>,
    ) -> Result<()> {
        if self.edges.contains_key(from) {
            return Err(AgentError::ConflictingEdge(format!(
                "step '{}' already has an outgoing edge",
                from
            )));
        }
        self.edges.insert(
            from.to_string(),
            Edge::Conditional {
                decide: Box::new(decide),
                branches,
            },
        );
        Ok(())
    }

    /// Set the step the executor starts from. Exactly one per graph.
    pub fn set_entry(&mut self, name: &str) -> Result<()> {
        if let Some(existing) = &self.entry {
            return Err(AgentError::DuplicateEntryPoint(format!(
                "entry already set to '{}', cannot set '{}'",
                existing, name
            )));
        }
        self.entry = Some(name.to_string());
        Ok(())
    }

    /// Designate the step that always runs once immediately before the run
    /// truly ends, whenever any edge resolves to [`Target::End`]. The
    /// finalizer carries no outgoing edge of its own.
    pub fn set_finalizer(&mut self, name: &str) -> Result<()> {
        self.finalizer = Some(name.to_string());
        Ok(())
    }

    fn check_target(&self, from: &str, target: &Target) -> Result<()> {
        match target {
            Target::End => Ok(()),
            Target::Step(to) if self.steps.contains_key(to) => Ok(()),
            Target::Step(to) => Err(AgentError::UnknownStep(format!(
                "edge from '{}' references unregistered step '{}'",
                from, to
            ))),
        }
    }

    /// Validate and freeze the graph.
    pub fn compile(self) -> Result<Graph> {
        let entry = self.entry.clone().ok_or(AgentError::NoEntryPoint)?;
        if !self.steps.contains_key(&entry) {
            return Err(AgentError::UnknownStep(format!(
                "entry point '{}' is not a registered step",
                entry
            )));
        }

        for (from, edge) in &self.edges {
            if !self.steps.contains_key(from) {
                return Err(AgentError::UnknownStep(format!(
                    "edge declared for unregistered step '{}'",
                    from
                )));
            }
            match edge {
                Edge::Fixed(target) => self.check_target(from, target)?,
                Edge::Conditional { branches, .. } => {
                    for target in branches.values() {
                        self.check_target(from, target)?;
                    }
                }
            }
        }

        if let Some(fin) = &self.finalizer {
            if !self.steps.contains_key(fin) {
                return Err(AgentError::UnknownStep(format!(
                    "finalizer '{}' is not a registered step",
                    fin
                )));
            }
            if self.edges.contains_key(fin) {
                return Err(AgentError::ConflictingEdge(format!(
                    "finalizer '{}' must not have an outgoing edge",
                    fin
                )));
            }
        }

        // Every non-finalizer step needs routing, otherwise a run would
        // dead-end in a step the graph never declared as terminal.
        for name in self.steps.keys() {
            if self.finalizer.as_deref() == Some(name.as_str()) {
                continue;
            }
            if !self.edges.contains_key(name) {
                return Err(AgentError::MissingEdge(format!(
                    "step '{}' has no outgoing edge",
                    name
                )));
            }
        }

        Ok(Graph {
            steps: self.steps,
            edges: self.edges,
            entry,
            finalizer: self.finalizer,
        })
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A compiled, immutable workflow graph. Shared read-only across runs;
/// each run owns its own [`AgentState`].
pub struct Graph {
    pub(crate) steps: HashMap<String, Arc<dyn Step>>,
    pub(crate) edges: HashMap<String, Edge>,
    pub(crate) entry: String,
    pub(crate) finalizer: Option<String>,
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("steps", &self.steps.keys().collect::<Vec<_>>())
            .field("edges", &self.edges.keys().collect::<Vec<_>>())
            .field("entry", &self.entry)
            .field("finalizer", &self.finalizer)
            .finish()
    }
}

impl Graph {
    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.keys().map(|s| s.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop(&'static str);

    #[async_trait::async_trait]
    impl Step for Noop {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn run(&self, _state: &AgentState) -> Result<StateDelta> {
            Ok(StateDelta::default())
        }
    }

    #[test]
    fn duplicate_step_rejected() {
        let mut builder = GraphBuilder::new();
        builder.add_step(Arc::new(Noop("a"))).unwrap();
        let err = builder.add_step(Arc::new(Noop("a"))).unwrap_err();
        assert!(matches!(err, AgentError::DuplicateStep(_)));
    }

    #[test]
    fn edge_to_unregistered_step_fails_compile() {
        let mut builder = GraphBuilder::new();
        builder.add_step(Arc::new(Noop("a"))).unwrap();
        builder.add_edge("a", Target::step("ghost")).unwrap();
        builder.set_entry("a").unwrap();
        let err = builder.compile().unwrap_err();
        assert!(matches!(err, AgentError::UnknownStep(_)));
    }

    #[test]
    fn conditional_branch_to_unregistered_step_fails_compile() {
        let mut builder = GraphBuilder::new();
        builder.add_step(Arc::new(Noop("a"))).unwrap();
        builder
            .add_conditional_edge(
                "a",
                |_| "x".to_string(),
                HashMap::from([
                    ("x".to_string(), Target::step("ghost")),
                    ("y".to_string(), Target::End),
                ]),
            )
            .unwrap();
        builder.set_entry("a").unwrap();
        let err = builder.compile().unwrap_err();
        assert!(matches!(err, AgentError::UnknownStep(_)));
    }

    #[test]
    fn compile_without_entry_fails() {
        let mut builder = GraphBuilder::new();
        builder.add_step(Arc::new(Noop("a"))).unwrap();
        builder.add_edge("a", Target::End).unwrap();
        let err = builder.compile().unwrap_err();
        assert!(matches!(err, AgentError::NoEntryPoint));
    }

    #[test]
    fn second_entry_point_rejected() {
        let mut builder = GraphBuilder::new();
        builder.add_step(Arc::new(Noop("a"))).unwrap();
        builder.set_entry("a").unwrap();
        let err = builder.set_entry("a").unwrap_err();
        assert!(matches!(err, AgentError::DuplicateEntryPoint(_)));
    }

    #[test]
    fn second_edge_for_same_step_rejected() {
        let mut builder = GraphBuilder::new();
        builder.add_step(Arc::new(Noop("a"))).unwrap();
        builder.add_edge("a", Target::End).unwrap();

        let err = builder.add_edge("a", Target::End).unwrap_err();
        assert!(matches!(err, AgentError::ConflictingEdge(_)));

        let err = builder
            .add_conditional_edge("a", |_| "x".to_string(), HashMap::new())
            .unwrap_err();
        assert!(matches!(err, AgentError::ConflictingEdge(_)));
    }

    #[test]
    fn finalizer_with_edge_fails_compile() {
        let mut builder = GraphBuilder::new();
        builder.add_step(Arc::new(Noop("a"))).unwrap();
        builder.add_step(Arc::new(Noop("fin"))).unwrap();
        builder.add_edge("a", Target::End).unwrap();
        builder.add_edge("fin", Target::End).unwrap();
        builder.set_entry("a").unwrap();
        builder.set_finalizer("fin").unwrap();
        let err = builder.compile().unwrap_err();
        assert!(matches!(err, AgentError::ConflictingEdge(_)));
    }

    #[test]
    fn step_without_edge_fails_compile() {
        let mut builder = GraphBuilder::new();
        builder.add_step(Arc::new(Noop("a"))).unwrap();
        builder.add_step(Arc::new(Noop("b"))).unwrap();
        builder.add_edge("a", Target::step("b")).unwrap();
        builder.set_entry("a").unwrap();
        let err = builder.compile().unwrap_err();
        assert!(matches!(err, AgentError::MissingEdge(_)));
    }

    #[test]
    fn valid_graph_compiles() {
        let mut builder = GraphBuilder::new();
        builder.add_step(Arc::new(Noop("a"))).unwrap();
        builder.add_step(Arc::new(Noop("fin"))).unwrap();
        builder.add_edge("a", Target::End).unwrap();
        builder.set_entry("a").unwrap();
        builder.set_finalizer("fin").unwrap();

        let graph = builder.compile().unwrap();
        assert_eq!(graph.entry(), "a");
        assert_eq!(graph.step_names().len(), 2);
    }
}
