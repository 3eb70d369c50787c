use thiserror::Error;

/// Errors raised by the browser layer and the extraction pipeline
#[derive(Debug, Error)]
pub enum HarvestError {
    /// Browser could not be started
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    /// Could not attach to an already running browser
    #[error("Failed to connect to browser: {0}")]
    ConnectionFailed(String),

    #[error("Tab operation failed: {0}")]
    TabOperationFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    /// No candidate query matched, or an element handle went stale
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Script evaluation failed: {0}")]
    EvaluationFailed(String),

    /// A page script ran but reported an error of its own
    #[error("Page script reported an error: {0}")]
    ScriptReply(String),

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, HarvestError>;
