//! Error types for the financial report agent

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Error, Debug)]
pub enum AgentError {

    // =============================
    // Graph Construction Errors
    // =============================
    //
    // Raised while building or compiling a workflow graph.
    // Fatal to process startup, never recovered at runtime.

    #[error("Duplicate step: {0}")]
    DuplicateStep(String),

    #[error("Unknown step: {0}")]
    UnknownStep(String),

    #[error("No entry point set")]
    NoEntryPoint,

    #[error("Duplicate entry point: {0}")]
    DuplicateEntryPoint(String),

    #[error("Conflicting edge: {0}")]
    ConflictingEdge(String),

    #[error("Missing edge: {0}")]
    MissingEdge(String),

    // =============================
    // Run-time Errors
    // =============================

    #[error("Unmapped branch: {0}")]
    UnmappedBranch(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Data error: {0}")]
    Data(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
