use std::fmt;
use thiserror::Error;

/// A convenience `Result` alias using [`ScholarError`].
pub type ScholarResult<T> = Result<T, ScholarError>;

/// The kind of capability a backend can advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    /// A callable tool.
    Tool,
    /// A parameterized prompt template.
    Prompt,
    /// An addressable resource.
    Resource,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Tool => "Tool",
            Self::Prompt => "Prompt",
            Self::Resource => "Resource",
        };
        f.write_str(label)
    }
}

/// Top-level error type for Scholar.
///
/// None of these variants is fatal to the process on its own; callers decide
/// whether a failure aborts a single call, a single turn, or setup of a single
/// backend.
#[derive(Error, Debug)]
pub enum ScholarError {
    /// A backend could not be reached or failed its handshake.
    #[error("Failed to connect to {server} server: {reason}")]
    ConnectionFailed {
        /// Configured name of the backend.
        server: String,
        /// Underlying cause.
        reason: String,
    },

    /// The backend does not implement the requested capability listing.
    #[error("Capability not supported: {0}")]
    CapabilityUnsupported(String),

    /// No registered backend owns the requested identifier.
    #[error("{kind} '{name}' not found")]
    CapabilityNotFound {
        /// Which namespace was searched.
        kind: CapabilityKind,
        /// The identifier that failed to resolve.
        name: String,
    },

    /// A resolved call to a backend raised a fault.
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// The model endpoint call faulted.
    #[error("Generation error: {0}")]
    GenerationFailed(String),

    /// A malformed or unexpected protocol message.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An error from an outbound HTTP request.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScholarError {
    /// Shorthand for [`ScholarError::CapabilityNotFound`].
    pub fn not_found(kind: CapabilityKind, name: impl Into<String>) -> Self {
        Self::CapabilityNotFound {
            kind,
            name: name.into(),
        }
    }

    /// Whether this is the structured "capability not supported" signal.
    ///
    /// Listing calls that fail this way are treated as empty listings; every
    /// other failure is a genuine fault.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::CapabilityUnsupported(_))
    }
}
