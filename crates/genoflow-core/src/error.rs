use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenoflowError {
    // Oracle errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    // Planning errors
    #[error("Planning failed: {0}")]
    Planning(String),

    #[error("Duplicate step id: {0}")]
    DuplicateStepId(String),

    #[error("Step {step} depends on unknown step {dependency}")]
    UnknownDependency { step: String, dependency: String },

    #[error("Unknown step type: {0}")]
    UnknownStepType(String),

    #[error("Step {step} is missing required parameter '{parameter}'")]
    MissingParameter { step: String, parameter: String },

    #[error("Unresolved reference: {0}")]
    UnresolvedReference(String),

    // Capability errors
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool execution failed: {tool}: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Tool timeout after {timeout_secs}s: {tool}")]
    ToolTimeout { tool: String, timeout_secs: u64 },

    #[error("Tool input validation failed: {0}")]
    ToolValidation(String),

    // Parser errors
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to parse {path}: {message}")]
    FileParse { path: String, message: String },

    // Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    // Knowledge base errors
    #[error("Knowledge query failed: {database}: {message}")]
    KnowledgeQuery { database: String, message: String },

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GenoflowError>;
