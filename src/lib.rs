//! Agentflow — job orchestration and event streaming for long-running
//! generation workflows.

pub mod admission;
pub mod config;
pub mod error;
pub mod executor;
pub mod job;
pub mod retrieval;
pub mod store;
pub mod stream;
pub mod workflow;
