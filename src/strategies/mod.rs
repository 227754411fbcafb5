pub mod orchestrator;
pub mod targeting;
