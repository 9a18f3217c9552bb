//! Agent 层：各阶段 prompt 与单阶段执行器

pub mod prompts;
pub mod runner;

pub use prompts::StageContext;
pub use runner::AgentRunner;
