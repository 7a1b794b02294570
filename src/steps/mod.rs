//! Concrete pipeline steps and workflow wiring
//!
//! The report pipeline:
//!
//! gather_financials → analyze_data → research_competitors →
//! compare_performance ⇄ (collect_feedback → research_critique) → write_report
//!
//! compare_performance owns the revision counter; its dispatcher ends the
//! loop once `revision_number > max_revisions`, and write_report is the
//! finalizer that always runs before the run ends.

use crate::config::ResearchLimits;
use crate::error::AgentError;
use crate::graph::{Graph, GraphBuilder, Step, Target};
use crate::llm::LanguageModel;
use crate::prompts;
use crate::search::SearchProvider;
use crate::state::{AgentState, StateDelta};
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Render raw CSV text as a plain-text table for the LLM.
fn render_table(raw: &str) -> Result<String> {
    if raw.trim().is_empty() {
        return Err(AgentError::Data(
            "financial data document is empty".to_string(),
        ));
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(raw.as_bytes());

    let headers = reader.headers()?.clone();
    let mut lines = vec![headers.iter().collect::<Vec<_>>().join(" | ")];
    for record in reader.records() {
        let record = record?;
        lines.push(record.iter().collect::<Vec<_>>().join(" | "));
    }

    if lines.len() < 2 {
        return Err(AgentError::Data(
            "financial data document has no rows".to_string(),
        ));
    }
    Ok(lines.join("\n"))
}

/// Bounded research fan-out: ask the LLM for queries about `subject`,
/// run each through the search provider, append every snippet. At most
/// `queries_per_item` × `results_per_query` notes per subject, no dedup,
/// order = call order.
async fn research_into(
    llm: &Arc<dyn LanguageModel>,
    search: &Arc<dyn SearchProvider>,
    limits: ResearchLimits,
    prompt: &str,
    subject: &str,
    notes: &mut Vec<String>,
) -> Result<()> {
    let queries = llm.queries(prompt, subject, limits.queries_per_item).await?;
    debug!(subject, count = queries.len(), "Running research queries");

    for query in queries {
        let results = search.search(&query, limits.results_per_query).await?;
        notes.extend(results.into_iter().map(|r| r.content));
    }
    Ok(())
}

/// Parses the uploaded CSV and extracts the key financial facts.
pub struct GatherFinancials {
    llm: Arc<dyn LanguageModel>,
}

impl GatherFinancials {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Step for GatherFinancials {
    fn name(&self) -> &'static str {
        "gather_financials"
    }

    async fn run(&self, state: &AgentState) -> Result<StateDelta> {
        let table = render_table(&state.source_document)?;
        let combined = format!(
            "{}\n\nHere is the financial data:\n\n{}",
            state.task, table
        );
        let facts = self.llm.complete(prompts::GATHER_FINANCIALS, &combined).await?;

        Ok(StateDelta {
            extracted_facts: Some(facts),
            ..StateDelta::default()
        })
    }
}

/// Turns the extracted facts into an analysis.
pub struct AnalyzeData {
    llm: Arc<dyn LanguageModel>,
}

impl AnalyzeData {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Step for AnalyzeData {
    fn name(&self) -> &'static str {
        "analyze_data"
    }

    async fn run(&self, state: &AgentState) -> Result<StateDelta> {
        let analysis = self
            .llm
            .complete(prompts::ANALYZE_DATA, &state.extracted_facts)
            .await?;

        Ok(StateDelta {
            analysis: Some(analysis),
            ..StateDelta::default()
        })
    }
}

/// Researches every competitor, appending snippets to the notes list.
pub struct ResearchCompetitors {
    llm: Arc<dyn LanguageModel>,
    search: Arc<dyn SearchProvider>,
    limits: ResearchLimits,
}

impl ResearchCompetitors {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        search: Arc<dyn SearchProvider>,
        limits: ResearchLimits,
    ) -> Self {
        Self { llm, search, limits }
    }
}

#[async_trait]
impl Step for ResearchCompetitors {
    fn name(&self) -> &'static str {
        "research_competitors"
    }

    async fn run(&self, state: &AgentState) -> Result<StateDelta> {
        let mut notes = state.research_notes.clone();
        for competitor in &state.competitors {
            research_into(
                &self.llm,
                &self.search,
                self.limits,
                prompts::RESEARCH_COMPETITORS,
                competitor,
                &mut notes,
            )
            .await?;
        }

        Ok(StateDelta {
            research_notes: Some(notes),
            ..StateDelta::default()
        })
    }
}

/// Compares the company against its competitors and bumps the revision
/// counter — the only step that ever writes it.
pub struct ComparePerformance {
    llm: Arc<dyn LanguageModel>,
}

impl ComparePerformance {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Step for ComparePerformance {
    fn name(&self) -> &'static str {
        "compare_performance"
    }

    async fn run(&self, state: &AgentState) -> Result<StateDelta> {
        let system = format!(
            "{}\n\nResearch notes:\n\n{}",
            prompts::COMPARE_PERFORMANCE,
            state.research_notes.join("\n\n")
        );
        let user = format!(
            "{}\n\nHere is the financial analysis:\n\n{}",
            state.task, state.analysis
        );
        let comparison = self.llm.complete(&system, &user).await?;

        Ok(StateDelta {
            comparison: Some(comparison),
            revision_number: Some(state.revision_number + 1),
            ..StateDelta::default()
        })
    }
}

/// Critiques the current comparison.
pub struct CollectFeedback {
    llm: Arc<dyn LanguageModel>,
}

impl CollectFeedback {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Step for CollectFeedback {
    fn name(&self) -> &'static str {
        "collect_feedback"
    }

    async fn run(&self, state: &AgentState) -> Result<StateDelta> {
        let feedback = self
            .llm
            .complete(prompts::COLLECT_FEEDBACK, &state.comparison)
            .await?;

        Ok(StateDelta {
            feedback: Some(feedback),
            ..StateDelta::default()
        })
    }
}

/// Researches the reviewer's feedback, growing the same notes list.
pub struct ResearchCritique {
    llm: Arc<dyn LanguageModel>,
    search: Arc<dyn SearchProvider>,
    limits: ResearchLimits,
}

impl ResearchCritique {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        search: Arc<dyn SearchProvider>,
        limits: ResearchLimits,
    ) -> Self {
        Self { llm, search, limits }
    }
}

#[async_trait]
impl Step for ResearchCritique {
    fn name(&self) -> &'static str {
        "research_critique"
    }

    async fn run(&self, state: &AgentState) -> Result<StateDelta> {
        let mut notes = state.research_notes.clone();
        research_into(
            &self.llm,
            &self.search,
            self.limits,
            prompts::RESEARCH_CRITIQUE,
            &state.feedback,
            &mut notes,
        )
        .await?;

        Ok(StateDelta {
            research_notes: Some(notes),
            ..StateDelta::default()
        })
    }
}

/// Finalizer: writes the user-facing report from the last comparison.
pub struct WriteReport {
    llm: Arc<dyn LanguageModel>,
}

impl WriteReport {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Step for WriteReport {
    fn name(&self) -> &'static str {
        "write_report"
    }

    async fn run(&self, state: &AgentState) -> Result<StateDelta> {
        let report = self
            .llm
            .complete(prompts::WRITE_REPORT, &state.comparison)
            .await?;

        Ok(StateDelta {
            report: Some(report),
            ..StateDelta::default()
        })
    }
}

/// Wire the report pipeline into a compiled graph. Built once at process
/// start and shared across runs.
pub fn build_workflow(
    llm: Arc<dyn LanguageModel>,
    search: Arc<dyn SearchProvider>,
    limits: ResearchLimits,
) -> Result<Graph> {
    let mut builder = GraphBuilder::new();

    builder.add_step(Arc::new(GatherFinancials::new(llm.clone())))?;
    builder.add_step(Arc::new(AnalyzeData::new(llm.clone())))?;
    builder.add_step(Arc::new(ResearchCompetitors::new(
        llm.clone(),
        search.clone(),
        limits,
    )))?;
    builder.add_step(Arc::new(ComparePerformance::new(llm.clone())))?;
    builder.add_step(Arc::new(CollectFeedback::new(llm.clone())))?;
    builder.add_step(Arc::new(ResearchCritique::new(
        llm.clone(),
        search,
        limits,
    )))?;
    builder.add_step(Arc::new(WriteReport::new(llm)))?;

    builder.set_entry("gather_financials")?;
    builder.add_edge("gather_financials", Target::step("analyze_data"))?;
    builder.add_edge("analyze_data", Target::step("research_competitors"))?;
    builder.add_edge("research_competitors", Target::step("compare_performance"))?;
    builder.add_conditional_edge(
        "compare_performance",
        |state| {
            if state.revision_number > state.max_revisions {
                "done".to_string()
            } else {
                "revise".to_string()
            }
        },
        HashMap::from([
            ("done".to_string(), Target::End),
            ("revise".to_string(), Target::step("collect_feedback")),
        ]),
    )?;
    builder.add_edge("collect_feedback", Target::step("research_critique"))?;
    builder.add_edge("research_critique", Target::step("compare_performance"))?;
    builder.set_finalizer("write_report")?;

    builder.compile()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockModel;
    use crate::search::{MockSearch, SearchResult};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SAMPLE_CSV: &str = "quarter,revenue,costs\nQ1,120,80\nQ2,140,90";

    /// Counts lookups, delegating to the plain mock.
    struct CountingSearch {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SearchProvider for CountingSearch {
        async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            MockSearch.search(query, max_results).await
        }
    }

    fn limits(queries: usize, results: usize) -> ResearchLimits {
        ResearchLimits {
            queries_per_item: queries,
            results_per_query: results,
        }
    }

    #[test]
    fn render_table_joins_columns() {
        let table = render_table(SAMPLE_CSV).unwrap();
        assert_eq!(
            table,
            "quarter | revenue | costs\nQ1 | 120 | 80\nQ2 | 140 | 90"
        );
    }

    #[test]
    fn malformed_and_empty_documents_are_data_errors() {
        assert!(matches!(
            render_table("   "),
            Err(AgentError::Data(_))
        ));
        assert!(matches!(
            render_table("quarter,revenue"),
            Err(AgentError::Data(_))
        ));
        // ragged row
        assert!(matches!(
            render_table("quarter,revenue\nQ1"),
            Err(AgentError::Csv(_))
        ));
    }

    #[tokio::test]
    async fn gather_surfaces_bad_csv_as_step_error() {
        let step = GatherFinancials::new(Arc::new(MockModel));
        let state = AgentState::new("task", vec![], "quarter,revenue\nQ1", 1);
        assert!(step.run(&state).await.is_err());
    }

    #[tokio::test]
    async fn research_fan_out_is_bounded_by_queries_times_results() {
        let calls = Arc::new(AtomicUsize::new(0));
        let step = ResearchCompetitors::new(
            Arc::new(MockModel),
            Arc::new(CountingSearch { calls: calls.clone() }),
            limits(3, 2),
        );

        let state = AgentState::new(
            "task",
            vec!["Acme".to_string(), "Globex".to_string()],
            SAMPLE_CSV,
            1,
        );
        let delta = step.run(&state).await.unwrap();

        // 2 competitors × 3 queries × 2 results
        assert_eq!(delta.research_notes.unwrap().len(), 12);
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn no_competitors_means_no_lookups() {
        let calls = Arc::new(AtomicUsize::new(0));
        let step = ResearchCompetitors::new(
            Arc::new(MockModel),
            Arc::new(CountingSearch { calls: calls.clone() }),
            limits(3, 2),
        );

        let mut state = AgentState::new("task", vec![], SAMPLE_CSV, 1);
        state.research_notes = vec!["existing note".to_string()];
        let delta = step.run(&state).await.unwrap();

        assert_eq!(
            delta.research_notes.unwrap(),
            vec!["existing note".to_string()]
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn critique_research_grows_the_same_notes_list() {
        let step = ResearchCritique::new(Arc::new(MockModel), Arc::new(MockSearch), limits(2, 2));

        let mut state = AgentState::new("task", vec![], SAMPLE_CSV, 1);
        state.feedback = "needs margin data".to_string();
        state.research_notes = vec!["earlier".to_string()];

        let notes = step.run(&state).await.unwrap().research_notes.unwrap();
        assert_eq!(notes.len(), 1 + 2 * 2);
        assert_eq!(notes[0], "earlier");
    }

    #[tokio::test]
    async fn full_pipeline_visits_expected_trace() {
        let graph = Arc::new(
            build_workflow(Arc::new(MockModel), Arc::new(MockSearch), limits(2, 2)).unwrap(),
        );

        let initial = AgentState::new(
            "Analyze our financial performance against competitors",
            vec!["Acme".to_string()],
            SAMPLE_CSV,
            2,
        );

        let mut rx = graph.stream(initial.clone());
        let mut visited = Vec::new();
        let mut folded = initial;
        while let Some(update) = rx.recv().await {
            let update = update.unwrap();
            folded.apply(&update.delta);
            visited.push(update.step);
        }

        assert_eq!(
            visited,
            vec![
                "gather_financials",
                "analyze_data",
                "research_competitors",
                "compare_performance",
                "collect_feedback",
                "research_critique",
                "compare_performance",
                "write_report",
            ]
        );
        // second compare saw revision_number 2 and left it at 3 > max_revisions
        assert_eq!(folded.revision_number, 3);
        assert!(!folded.report.is_empty());
        assert!(!folded.comparison.is_empty());
    }

    #[tokio::test]
    async fn run_and_stream_agree_on_the_pipeline() {
        let graph = Arc::new(
            build_workflow(Arc::new(MockModel), Arc::new(MockSearch), limits(1, 1)).unwrap(),
        );
        let initial = AgentState::new("task", vec!["Acme".to_string()], SAMPLE_CSV, 1);

        let from_run = graph.run(initial.clone()).await.unwrap();

        let mut folded = initial;
        let mut rx = graph.stream(folded.clone());
        while let Some(update) = rx.recv().await {
            folded.apply(&update.unwrap().delta);
        }

        assert_eq!(folded, from_run);
    }
}
