//! Router candidate validation and selection errors.

/// Errors that can occur while selecting the active router
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("No valid router found among {candidates} candidates")]
    NoRouterAvailable { candidates: usize },

    #[error("Router candidate {name} uses the zero address")]
    ZeroAddress { name: String },

    #[error("Router candidate {name} has a malformed address: {input}")]
    MalformedAddress { name: String, input: String },

    #[error("Bytecode probe failed for candidate {name}: {reason}")]
    ProbeFailed { name: String, reason: String },
}
