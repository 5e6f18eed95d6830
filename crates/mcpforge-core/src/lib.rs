//! Core of mcpforge: the generation state model, the stage adapters and
//! the orchestrator that drives a request from input to a deployed,
//! protocol-compliant MCP server.

pub mod bundle;
pub mod classify;
pub mod deployer;
pub mod error;
pub mod generator;
pub mod harness;
pub mod llm;
pub mod orchestrator;
pub mod persist;
pub mod refiner;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;
