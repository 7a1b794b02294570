use financial_report_agent::{
    api::start_server,
    build_workflow,
    config::AgentConfig,
    history::RunHistory,
    llm::{GeminiModel, LanguageModel, MockModel},
    search::{MockSearch, SearchProvider, TavilySearch},
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Load environment variables
    dotenv::dotenv().ok();
    let config = AgentConfig::from_env();

    info!("Financial Report Agent - API server");
    info!("Port: {}", config.port);

    let llm: Arc<dyn LanguageModel> = match &config.gemini_api_key {
        Some(key) => Arc::new(GeminiModel::new(key.clone())?),
        None => {
            eprintln!("GEMINI_API_KEY not set in .env, using mock model");
            Arc::new(MockModel)
        }
    };
    let search: Arc<dyn SearchProvider> = match &config.tavily_api_key {
        Some(key) => Arc::new(TavilySearch::new(key.clone())?),
        None => {
            eprintln!("TAVILY_API_KEY not set in .env, using mock search");
            Arc::new(MockSearch)
        }
    };

    // The graph is compiled once and shared read-only across requests;
    // each request owns its own run state.
    let graph = Arc::new(build_workflow(llm, search, config.research)?);
    let history = Arc::new(RunHistory::new());

    info!("Workflow compiled, starting API server");

    start_server(graph, history, config.port).await?;

    Ok(())
}
