//! MCP bridge error types.

use thiserror::Error;

/// Errors from a single MCP exchange or tool call.
#[derive(Debug, Error)]
pub enum McpError {
    /// The server process could not be started.
    #[error("failed to spawn MCP server '{command}': {source}")]
    SpawnFailed {
        command: String,
        source: std::io::Error,
    },

    /// Reading from or writing to the child failed.
    #[error("MCP I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No response line arrived in time.
    #[error("MCP server did not respond within {secs}s")]
    Timeout { secs: u64 },

    /// The response line was not valid JSON.
    #[error("Invalid JSON response: {message}")]
    InvalidJson { message: String },

    /// The server answered with a JSON-RPC `error`.
    #[error("MCP server error: {message}")]
    Server { message: String },

    /// The child exited before writing a response.
    #[error("MCP server closed without a response")]
    NoResponse,
}

impl McpError {
    /// The `{"error": "..."}` object handed to callers that expect a value.
    pub fn to_error_object(&self) -> serde_json::Value {
        serde_json::json!({ "error": self.to_string() })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, McpError::Timeout { .. })
    }
}
