//! Orchestrator assembly and the request pipeline

mod builder;
mod orchestrator;

pub use builder::{Muninn, MuninnBuilder};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
