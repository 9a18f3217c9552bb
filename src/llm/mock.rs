//! 测试用模型客户端（无需 API）
//!
//! - MockLlmClient：按 system prompt 判断是哪个 agent，返回符合 schema 的固定 JSON 与对应推理步骤
//! - ScriptedLlmClient：按顺序吐出预设的响应 / 错误
//! - FailingLlmClient：每次调用都返回传输错误

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use crate::llm::message::{last_user_content, system_content, Message};
use crate::llm::traits::{LlmClient, LlmError, ModelResponse};
use crate::memory::ReasoningPattern;

const SKILL_KEYWORDS: &[&str] = &[
    "python",
    "java",
    "react",
    "aws",
    "docker",
    "kubernetes",
    "terraform",
    "rust",
    "machine learning",
    "ai",
];

/// 从问题中按关键字找技能（整词匹配）
fn mentioned_skills(question: &str) -> Vec<String> {
    let lower = question.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    SKILL_KEYWORDS
        .iter()
        .filter(|kw| {
            let parts: Vec<&str> = kw.split(' ').collect();
            words.windows(parts.len()).any(|w| w == parts.as_slice())
        })
        .map(|kw| kw.to_string())
        .collect()
}

/// 固定响应的 Mock 客户端
#[derive(Debug, Default)]
pub struct MockLlmClient;

impl MockLlmClient {
    fn perception(user: &str) -> String {
        let question = user
            .lines()
            .find_map(|l| l.trim().strip_prefix("User Input:"))
            .unwrap_or(user)
            .trim();
        let skills = mentioned_skills(question);
        let lower = question.to_lowercase();
        let intent = if lower.contains("team") {
            "team_optimization"
        } else if lower.contains("ready") || lower.contains("readiness") {
            "project_readiness"
        } else if lower.contains("upskill") || lower.contains("train") {
            "upskilling_plan"
        } else {
            "skill_gap_analysis"
        };
        json!({
            "intent": intent,
            "entities": {
                "skills": skills,
                "projects": [],
                "teams": [],
                "people": [],
                "timelines": []
            },
            "normalized_question": question,
            "context": {"constraints": [], "urgency": "medium", "scope": "company"},
            "analysis_focus": "skill gaps and staffing options"
        })
        .to_string()
    }

    fn analysis() -> String {
        let body = json!({
            "skill_gaps": ["AWS"],
            "upskilling": [{
                "employee": "John",
                "skill_to_learn": "AWS",
                "timeline_weeks": 2,
                "confidence": "high",
                "reason": "Strong Python background and existing cloud exposure"
            }],
            "internal_transfers": [{
                "employee": "Sarah",
                "current_team": "DevOps",
                "skills_brought": ["AWS", "Terraform"],
                "availability": "2_weeks",
                "reason": "Hands-on AWS experience"
            }],
            "hiring": [],
            "timeline_assessment": "Gap can be closed within two weeks",
            "risk_factors": ["Upskilling depends on John's current workload"],
            "success_probability": "high"
        });
        // 模拟真实模型：先写说明再给 JSON 代码块
        format!("Here is the analysis:\n```json\n{body:#}\n```")
    }

    fn decision() -> String {
        json!({
            "natural_language_summary": "Upskill John in AWS over two weeks; transfer Sarah from DevOps if the timeline slips.",
            "selected_strategy": {
                "strategy_name": "Upskill John in AWS",
                "strategy_type": "upskill",
                "confidence": "high",
                "rationale": "Lowest cost option that fits the timeline",
                "specific_people": ["John"],
                "specific_skills": ["AWS"]
            },
            "strategy_details": {
                "primary_action": "Enroll John in an AWS associate track",
                "target_skill": "AWS",
                "timeline_weeks": 2,
                "success_probability": "high",
                "cost_estimate": "low",
                "risk_level": "low"
            },
            "alternative_strategies": [{
                "strategy_name": "Transfer Sarah",
                "approach": "Move Sarah from DevOps for the project duration",
                "selection_reason": "Kept as fallback; DevOps capacity would drop",
                "confidence_score": 0.6
            }]
        })
        .to_string()
    }

    /// 路由：user 消息里带 `completed: a,b`，返回第一个尚未完成的阶段
    fn route(user: &str) -> String {
        let completed: Vec<&str> = user
            .lines()
            .find_map(|l| l.trim().strip_prefix("completed:"))
            .map(|rest| rest.split(',').map(str::trim).collect())
            .unwrap_or_default();
        ["analysis", "decision"]
            .into_iter()
            .find(|stage| !completed.contains(stage))
            .unwrap_or("done")
            .to_string()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn invoke(&self, messages: &[Message]) -> Result<ModelResponse, LlmError> {
        let system = system_content(messages).unwrap_or_default().to_lowercase();
        let user = last_user_content(messages).unwrap_or("(no input)");

        let (content, pattern) = if system.contains("orchestrator") {
            (Self::route(user), ReasoningPattern::Agent)
        } else if system.contains("perception agent") {
            (Self::perception(user), ReasoningPattern::React)
        } else if system.contains("analysis agent") {
            (Self::analysis(), ReasoningPattern::React)
        } else if system.contains("decision agent") {
            (Self::decision(), ReasoningPattern::Tot)
        } else {
            ("Mock response for testing purposes".to_string(), ReasoningPattern::Cot)
        };

        Ok(ModelResponse::new(content).with_steps(pattern.generic_steps()))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// 按顺序返回预设结果；用完后返回 InvalidResponse
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<ModelResponse, LlmError>>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlmClient {
    pub fn new(script: impl IntoIterator<Item = Result<ModelResponse, LlmError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 只含正文的成功响应序列
    pub fn from_texts<S: Into<String>>(texts: impl IntoIterator<Item = S>) -> Self {
        Self::new(texts.into_iter().map(|t| Ok(ModelResponse::new(t))))
    }

    pub fn push(&self, item: Result<ModelResponse, LlmError>) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(item);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// 每次调用收到的消息
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn invoke(&self, messages: &[Message]) -> Result<ModelResponse, LlmError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(messages.to_vec());
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::InvalidResponse("script exhausted".to_string())))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// 永远失败的客户端
#[derive(Debug)]
pub struct FailingLlmClient {
    error: LlmError,
    calls: AtomicUsize,
}

impl Default for FailingLlmClient {
    fn default() -> Self {
        Self::new(LlmError::Network("connection refused".to_string()))
    }
}

impl FailingLlmClient {
    pub fn new(error: LlmError) -> Self {
        Self {
            error,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for FailingLlmClient {
    async fn invoke(&self, _messages: &[Message]) -> Result<ModelResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }

    fn name(&self) -> &str {
        "failing"
    }
}
