//! GapLens - 容错的多 Agent 编排引擎
//!
//! 模块划分：
//! - **agents**: 各阶段 prompt 与单阶段执行器（AgentRunner）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类
//! - **data**: 领域数据源（HTTP / 内存）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **memory**: 只追加的会话日志与持久化
//! - **observability**: tracing 初始化
//! - **recovery**: 模型输出恢复管线
//! - **schema**: 各 agent 的输出 schema、注册表与兜底记录
//! - **workflow**: 状态机与工作流驱动

pub mod agents;
pub mod config;
pub mod core;
pub mod data;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod recovery;
pub mod schema;
pub mod workflow;

pub use core::EngineError;
pub use workflow::{RunOutcome, RunRequest, WorkflowDriver};
