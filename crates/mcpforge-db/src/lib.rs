//! PostgreSQL persistence for mcpforge: connection config, pooling,
//! embedded migrations, row models and per-table query helpers.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
