//! Error types for the aotc backend

use thiserror::Error;

/// Backend errors
///
/// Only conditions that stop a compilation unit surface as `Err`. Problems
/// with an individual graph node are reported through the
/// [`CompilationContext`](crate::compiler::CompilationContext) and lowering
/// carries on, so one run reports every such problem.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // Internal consistency
    /// An earlier phase broke an invariant the backend relies on
    ///
    /// **Triggered by:** mapping an integer type whose size is not 1, 2, 4
    /// or 8 bytes, a float that is not 4 or 8 bytes, or a class type that
    /// was never lowered to a reference.
    #[error("Internal consistency failure in {context}: {message}")]
    InternalConsistency {
        /// Function or phase where the violation was found
        context: String,
        /// What went wrong
        message: String,
    },

    /// A block id that is not part of the function body
    #[error("Unknown block {block} in function {function}")]
    UnknownBlock {
        /// Function name
        function: String,
        /// Raw block index
        block: u32,
    },

    /// A node id that is not part of the function body
    #[error("Unknown node {node} in function {function}")]
    UnknownNode {
        /// Function name
        function: String,
        /// Raw node index
        node: u32,
    },

    /// The graph handed to the builder or the scheduler is not well formed
    #[error("Malformed graph: {0}")]
    MalformedGraph(String),

    // Fence analysis
    /// A function exceeded the fence analysis size ceiling
    ///
    /// **Recovery:** the function keeps its original orderings; other
    /// functions are still optimized.
    #[error("Function {function} is too big for fence analysis ({nodes} nodes, limit {limit})")]
    FunctionTooBig {
        /// Function name
        function: String,
        /// Observed size
        nodes: usize,
        /// Configured ceiling
        limit: usize,
    },

    // Driver
    /// The compilation context recorded errors
    #[error("Compilation failed with {errors} error(s)")]
    CompilationFailed {
        /// Number of errors reported
        errors: usize,
    },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Worker pool could not be created
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

/// Error severity classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Fatal to the current compilation unit
    Fatal,
    /// The affected step is skipped, the run continues
    Recoverable,
    /// Only a missed optimization
    Warning,
}

impl Error {
    /// Create an internal consistency error
    pub fn internal(context: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InternalConsistency {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Create a malformed graph error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedGraph(msg.into())
    }

    /// Classify error severity
    pub fn classify(&self) -> ErrorSeverity {
        match self {
            Error::InternalConsistency { .. } => ErrorSeverity::Fatal,
            Error::UnknownBlock { .. } => ErrorSeverity::Fatal,
            Error::UnknownNode { .. } => ErrorSeverity::Fatal,
            Error::MalformedGraph(_) => ErrorSeverity::Fatal,
            Error::CompilationFailed { .. } => ErrorSeverity::Fatal,
            Error::Config(_) => ErrorSeverity::Fatal,

            Error::FunctionTooBig { .. } => ErrorSeverity::Warning,

            Error::ThreadPool(_) => ErrorSeverity::Recoverable,
        }
    }
}

/// Result type for backend operations
pub type Result<T> = std::result::Result<T, Error>;
