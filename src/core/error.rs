//! 引擎错误类型
//!
//! 只有 Deserialization 与 Configuration 会作为真正的失败向上传播；
//! Transport / Parse / Validation 在 Agent Runner 与恢复管线内部就地消化，
//! 体现为 RecoveredRecord 的 status 与 MemoryEntry 的 confidence。

use thiserror::Error;

use crate::llm::LlmError;

/// 编排引擎的错误分类
#[derive(Error, Debug)]
pub enum EngineError {
    /// 模型客户端或数据源不可达 / 超时
    #[error("Transport error: {0}")]
    Transport(#[from] LlmError),

    /// 所有恢复策略都没能得到结构合法的文档
    #[error("Parse error: {0}")]
    Parse(String),

    /// 结构合法但不符合 schema
    #[error("Validation error: {0}")]
    Validation(String),

    /// 持久化的会话损坏或格式不受支持（不自动恢复：审计数据不能伪造）
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// 阶段执行次数超限、agent 类型未注册 schema 等配置性错误
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    /// 运行在 save() 之前被取消
    #[error("Run cancelled")]
    Cancelled,
}

impl EngineError {
    /// 是否属于可在本地恢复的错误（Transport / Parse / Validation）
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::Transport(_) | EngineError::Parse(_) | EngineError::Validation(_)
        )
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Deserialization(err.to_string())
    }
}
