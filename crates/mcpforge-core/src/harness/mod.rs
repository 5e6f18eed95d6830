//! Protocol compliance testing of deployed MCP endpoints.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator
//!     |
//!     v
//! dyn TestHarness --run_tests(url, budget)--> TestResult { passed, failures }
//!     |
//! ProtocolHarness
//!     |  liveness, handshake, tools_list, tool_schema:*, invoke:*, error_path
//!     v
//! dyn McpTransport (HttpTransport: JSON or SSE replies, Mcp-Session-Id)
//! ```

pub mod args;
pub mod checks;
pub mod protocol;
pub mod trait_def;
pub mod transport;

pub use args::minimal_args;
pub use checks::{HarnessConfig, ProtocolHarness};
pub use trait_def::TestHarness;
pub use transport::{HttpTransport, McpTransport, RpcReply, TransportError};
