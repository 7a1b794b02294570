use financial_report_agent::{
    build_workflow,
    config::AgentConfig,
    llm::{GeminiModel, LanguageModel, MockModel},
    search::{MockSearch, SearchProvider, TavilySearch},
    state::AgentState,
    StateDelta,
};
use std::sync::Arc;
use tracing::info;

const SAMPLE_CSV: &str = "\
quarter,revenue,costs,net_income
Q1,1200,800,400
Q2,1350,860,490
Q3,1280,900,380
Q4,1500,950,550";

fn changed_fields(delta: &StateDelta) -> String {
    let mut fields = Vec::new();
    if delta.extracted_facts.is_some() {
        fields.push("extracted_facts");
    }
    if delta.analysis.is_some() {
        fields.push("analysis");
    }
    if delta.research_notes.is_some() {
        fields.push("research_notes");
    }
    if delta.comparison.is_some() {
        fields.push("comparison");
    }
    if delta.feedback.is_some() {
        fields.push("feedback");
    }
    if delta.report.is_some() {
        fields.push("report");
    }
    if delta.revision_number.is_some() {
        fields.push("revision_number");
    }
    fields.join(", ")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Load environment variables
    dotenv::dotenv().ok();
    let config = AgentConfig::from_env();

    info!("Financial Report Agent starting");

    let llm: Arc<dyn LanguageModel> = match &config.gemini_api_key {
        Some(key) => Arc::new(GeminiModel::new(key.clone())?),
        None => {
            eprintln!("GEMINI_API_KEY not set, using mock model");
            Arc::new(MockModel)
        }
    };
    let search: Arc<dyn SearchProvider> = match &config.tavily_api_key {
        Some(key) => Arc::new(TavilySearch::new(key.clone())?),
        None => {
            eprintln!("TAVILY_API_KEY not set, using mock search");
            Arc::new(MockSearch)
        }
    };

    let graph = Arc::new(build_workflow(llm, search, config.research)?);

    let initial = AgentState::new(
        "Analyze the financial performance of our company (MyAICo.AI) compared to competitors",
        vec!["Acme Analytics".to_string(), "Globex AI".to_string()],
        SAMPLE_CSV,
        2,
    );

    info!(
        task = %initial.task,
        competitors = initial.competitors.len(),
        max_revisions = initial.max_revisions,
        "Running analysis"
    );

    let mut folded = initial.clone();
    let mut rx = graph.stream(initial);
    while let Some(update) = rx.recv().await {
        match update {
            Ok(update) => {
                println!("→ {} ({})", update.step, changed_fields(&update.delta));
                folded.apply(&update.delta);
            }
            Err(e) => {
                eprintln!("Analysis failed: {}", e);
                return Err(Box::new(e) as Box<dyn std::error::Error>);
            }
        }
    }

    println!("\n=== FINAL REPORT ===\n");
    println!("{}", folded.report);
    println!("\n(revisions: {})", folded.revision_number.saturating_sub(1));

    Ok(())
}
