//! Core types and error definitions for Scholar.
//!
//! This crate provides the foundational types shared across all Scholar crates:
//! the error taxonomy used by every layer and the conversation data model that
//! is replayed to the model endpoint on each turn.
//!
//! # Main types
//!
//! - [`ScholarError`]: Unified error enum for all Scholar subsystems.
//! - [`ScholarResult`]: Convenience alias for `Result<T, ScholarError>`.
//! - [`Role`]: Message role (user or model).
//! - [`Part`]: One piece of a message: text, a function call, or a function result.
//! - [`Message`]: One conversation turn.
//! - [`ToolDeclaration`]: A tool as advertised to the model endpoint.

/// Error taxonomy.
pub mod error;
/// Conversation data model.
pub mod message;

pub use error::{CapabilityKind, ScholarError, ScholarResult};
pub use message::{Message, Part, Role, ToolDeclaration};
