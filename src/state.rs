//! Shared workflow state and partial-update merging
//!
//! Each run owns exactly one `AgentState`. Steps receive a read snapshot
//! and return a `StateDelta` with only the fields they changed; the
//! executor applies the merge (last writer wins, field by field).

use serde::{Deserialize, Serialize};

/// Accumulating state for one analysis run.
///
/// `task`, `competitors`, `source_document` and `max_revisions` are set
/// once when the run starts and have no slot in `StateDelta`, so no step
/// can rewrite them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub task: String,
    pub competitors: Vec<String>,
    pub source_document: String,
    pub max_revisions: u32,
    pub revision_number: u32,
    pub extracted_facts: String,
    pub analysis: String,
    pub research_notes: Vec<String>,
    pub comparison: String,
    pub feedback: String,
    pub report: String,
}

impl AgentState {
    /// Initial state: immutable inputs set, everything else empty,
    /// revision counter at 1.
    pub fn new(
        task: impl Into<String>,
        competitors: Vec<String>,
        source_document: impl Into<String>,
        max_revisions: u32,
    ) -> Self {
        Self {
            task: task.into(),
            competitors,
            source_document: source_document.into(),
            max_revisions,
            revision_number: 1,
            extracted_facts: String::new(),
            analysis: String::new(),
            research_notes: Vec::new(),
            comparison: String::new(),
            feedback: String::new(),
            report: String::new(),
        }
    }

    /// Merge a partial update. Every `Some` field overwrite-replaces the
    /// corresponding field; `None` fields are untouched. `research_notes`
    /// is a full replacement list — appending steps read the snapshot,
    /// extend their own copy and return the whole list.
    pub fn apply(&mut self, delta: &StateDelta) {
        if let Some(v) = &delta.revision_number {
            self.revision_number = *v;
        }
        if let Some(v) = &delta.extracted_facts {
            self.extracted_facts = v.clone();
        }
        if let Some(v) = &delta.analysis {
            self.analysis = v.clone();
        }
        if let Some(v) = &delta.research_notes {
            self.research_notes = v.clone();
        }
        if let Some(v) = &delta.comparison {
            self.comparison = v.clone();
        }
        if let Some(v) = &delta.feedback {
            self.feedback = v.clone();
        }
        if let Some(v) = &delta.report {
            self.report = v.clone();
        }
    }
}

/// The subset of fields a single step changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDelta {
    pub revision_number: Option<u32>,
    pub extracted_facts: Option<String>,
    pub analysis: Option<String>,
    pub research_notes: Option<Vec<String>>,
    pub comparison: Option<String>,
    pub feedback: Option<String>,
    pub report: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_overwrites_only_present_fields() {
        let mut state = AgentState::new("task", vec!["Acme".into()], "a,b\n1,2", 2);
        state.analysis = "old analysis".to_string();
        state.research_notes = vec!["note one".to_string()];

        let delta = StateDelta {
            comparison: Some("fresh comparison".to_string()),
            ..StateDelta::default()
        };
        state.apply(&delta);

        assert_eq!(state.comparison, "fresh comparison");
        // everything else untouched
        assert_eq!(state.analysis, "old analysis");
        assert_eq!(state.research_notes, vec!["note one".to_string()]);
        assert_eq!(state.revision_number, 1);
        assert_eq!(state.task, "task");
    }

    #[test]
    fn notes_delta_replaces_whole_list() {
        let mut state = AgentState::new("task", vec![], "", 1);
        state.research_notes = vec!["a".to_string()];

        let mut grown = state.research_notes.clone();
        grown.push("b".to_string());
        state.apply(&StateDelta {
            research_notes: Some(grown),
            ..StateDelta::default()
        });

        assert_eq!(state.research_notes, vec!["a".to_string(), "b".to_string()]);
    }
}
