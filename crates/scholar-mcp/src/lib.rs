//! Model Context Protocol plumbing for Scholar.
//!
//! Connects to capability servers over stdio, records what each one
//! advertises in a [`CapabilityRegistry`], and routes tool calls back to the
//! owning server through the [`ToolDispatcher`].

pub mod backend;
pub mod client;
pub mod dispatcher;
pub mod manager;
pub mod protocol;
pub mod registry;
pub mod schema;

pub use backend::{Backend, BackendId, BackendRef};
pub use client::McpClient;
pub use dispatcher::{normalize, NormalizedContent, ToolDispatcher, ToolError};
pub use manager::{
    parse_server_definitions, BackendConnector, McpServerConfig, McpServerManager,
    ServerDefinition, SetupReport, StdioConnector,
};
pub use registry::{CapabilityDetail, CapabilityRecord, CapabilityRegistry};
pub use schema::SchemaSanitizer;
