// MCP (Model Context Protocol) over stdio: both ends of a provider session.
// The server side hosts a tool registry; the client side drives a spawned
// provider process and exposes it as a `ToolProvider`.

pub mod client;
pub mod protocol;
pub mod server;
pub mod tools;
pub mod transport;

pub use client::{ProviderConnection, StdioConnector};
pub use server::McpServer;
