// MCP surface: JSON-RPC types, request handling and the stdio transport
pub mod handler;
pub mod protocol;
pub mod stdio;
