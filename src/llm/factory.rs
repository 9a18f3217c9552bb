//! 按配置创建模型客户端
//!
//! provider = mock 时总是用 Mock；否则根据 API Key 选择 DeepSeek 或 OpenAI 兼容端点，
//! 都没有时退回 Mock。返回的客户端统一套上 TimeoutLlmClient。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::llm::mock::MockLlmClient;
use crate::llm::openai::OpenAiClient;
use crate::llm::traits::{LlmClient, TimeoutLlmClient};

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";
pub const DEEPSEEK_REASONER: &str = "deepseek-reasoner";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    DeepSeek,
    OpenAi,
    Mock,
}

fn has_env(key: &str) -> bool {
    std::env::var(key).map(|v| !v.trim().is_empty()).unwrap_or(false)
}

fn pick_backend(provider: &str, has_deepseek_key: bool, has_openai_key: bool) -> Backend {
    match provider {
        "mock" => Backend::Mock,
        // 配置为 deepseek 且只有 OpenAI Key 时也走 DeepSeek 兼容端点
        "deepseek" if has_deepseek_key || has_openai_key => Backend::DeepSeek,
        _ if has_openai_key => Backend::OpenAi,
        _ if has_deepseek_key => Backend::DeepSeek,
        _ => Backend::Mock,
    }
}

fn deepseek_client(model: &str) -> OpenAiClient {
    let api_key = std::env::var("DEEPSEEK_API_KEY")
        .ok()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok());
    OpenAiClient::new(Some(DEEPSEEK_BASE_URL), model, api_key.as_deref())
}

fn with_timeout(cfg: &AppConfig, client: Arc<dyn LlmClient>) -> Arc<dyn LlmClient> {
    Arc::new(TimeoutLlmClient::new(client, cfg.llm.timeouts.request_timeout()))
}

/// 默认客户端（感知 / 分析 / 路由共用）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let client: Arc<dyn LlmClient> =
        match pick_backend(&provider, has_env("DEEPSEEK_API_KEY"), has_env("OPENAI_API_KEY")) {
            Backend::DeepSeek => {
                let model = cfg
                    .llm
                    .deepseek
                    .model
                    .clone()
                    .unwrap_or_else(|| cfg.llm.model.clone());
                tracing::info!("Using DeepSeek LLM ({})", model);
                Arc::new(deepseek_client(&model))
            }
            Backend::OpenAi => {
                let model = cfg
                    .llm
                    .openai
                    .model
                    .clone()
                    .unwrap_or_else(|| "gpt-4o-mini".to_string());
                tracing::info!("Using OpenAI LLM ({})", model);
                Arc::new(OpenAiClient::new(
                    cfg.llm.base_url.as_deref(),
                    &model,
                    std::env::var("OPENAI_API_KEY").ok().as_deref(),
                ))
            }
            Backend::Mock => {
                if provider != "mock" {
                    tracing::warn!("No API key set or provider unknown, using Mock LLM");
                }
                Arc::new(MockLlmClient)
            }
        };
    with_timeout(cfg, client)
}

/// 决策阶段的推理模型；只有走 DeepSeek 且配置了 reasoner_model 时才单独创建
pub fn create_reasoner_from_config(cfg: &AppConfig) -> Option<Arc<dyn LlmClient>> {
    let provider = cfg.llm.provider.to_lowercase();
    let backend = pick_backend(&provider, has_env("DEEPSEEK_API_KEY"), has_env("OPENAI_API_KEY"));
    let model = cfg.llm.deepseek.reasoner_model.as_deref()?;
    if backend != Backend::DeepSeek {
        return None;
    }
    tracing::info!("Using DeepSeek reasoner for decisions ({})", model);
    Some(with_timeout(cfg, Arc::new(deepseek_client(model))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_backend() {
        assert_eq!(pick_backend("mock", true, true), Backend::Mock);
        assert_eq!(pick_backend("deepseek", true, false), Backend::DeepSeek);
        assert_eq!(pick_backend("deepseek", false, true), Backend::DeepSeek);
        assert_eq!(pick_backend("openai", false, true), Backend::OpenAi);
        assert_eq!(pick_backend("openai", true, false), Backend::DeepSeek);
        assert_eq!(pick_backend("deepseek", false, false), Backend::Mock);
    }

    #[tokio::test]
    async fn test_mock_provider_builds_mock_client() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".to_string();
        let client = create_llm_from_config(&cfg);
        assert_eq!(client.name(), "mock");
        assert!(create_reasoner_from_config(&cfg).is_none());
    }
}
