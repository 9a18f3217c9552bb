//! 模型输出恢复：多策略结构化解析 + schema 校验 / 修正 / 兜底

pub mod pipeline;
pub mod strategies;

pub use pipeline::RecoveryPipeline;
