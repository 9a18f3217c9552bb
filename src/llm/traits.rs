//! 模型客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient::invoke。
//! 超时在传输边界由 TimeoutLlmClient 统一施加，超时同样属于传输错误。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::message::Message;

/// 模型原始输出：正文 + 可选推理步骤。只用于恢复，不直接持久化
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelResponse {
    pub content: String,
    pub reasoning_steps: Vec<String>,
}

impl ModelResponse {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            reasoning_steps: Vec::new(),
        }
    }

    pub fn with_steps(mut self, steps: Vec<String>) -> Self {
        self.reasoning_steps = steps;
        self
    }
}

/// 模型调用的传输层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("rate limited (retry after {retry_after_ms:?} ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// 模型客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn invoke(&self, messages: &[Message]) -> Result<ModelResponse, LlmError>;

    /// 用于日志的后端名称
    fn name(&self) -> &str {
        "llm"
    }
}

/// 为任意客户端加上单次调用超时
pub struct TimeoutLlmClient {
    inner: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl TimeoutLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl LlmClient for TimeoutLlmClient {
    async fn invoke(&self, messages: &[Message]) -> Result<ModelResponse, LlmError> {
        match tokio::time::timeout(self.timeout, self.inner.invoke(messages)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    client = self.inner.name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "model call timed out"
                );
                Err(LlmError::Timeout)
            }
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowClient;

    #[async_trait]
    impl LlmClient for SlowClient {
        async fn invoke(&self, _messages: &[Message]) -> Result<ModelResponse, LlmError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ModelResponse::new("late"))
        }
    }

    struct FastClient;

    #[async_trait]
    impl LlmClient for FastClient {
        async fn invoke(&self, _messages: &[Message]) -> Result<ModelResponse, LlmError> {
            Ok(ModelResponse::new("{}").with_steps(vec!["Reason: quick".into()]))
        }
    }

    #[tokio::test]
    async fn test_timeout_is_transport_error() {
        let client = TimeoutLlmClient::new(Arc::new(SlowClient), Duration::from_millis(20));
        let err = client.invoke(&[Message::user("hi")]).await.unwrap_err();
        assert_eq!(err, LlmError::Timeout);
    }

    #[tokio::test]
    async fn test_fast_call_passes_through() {
        let client = TimeoutLlmClient::new(Arc::new(FastClient), Duration::from_secs(1));
        let resp = client.invoke(&[Message::user("hi")]).await.unwrap();
        assert_eq!(resp.content, "{}");
        assert_eq!(resp.reasoning_steps.len(), 1);
    }
}
