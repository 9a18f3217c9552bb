//! Agent Runner：执行单个阶段
//!
//! 拉取数据 → 构造 prompt → 调用模型 → 恢复输出 → 追加会话日志 → 写回状态。
//! 传输错误在这里就地消化：按空输出走恢复管线，结果必然是 Fallback。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use crate::agents::prompts::{self, StageContext};
use crate::core::EngineError;
use crate::data::{project_key, project_skill_gaps_key, soft_error, DataSource, ANALYSIS_RESOURCES};
use crate::llm::LlmClient;
use crate::memory::{log_agent_reasoning, NewEntry, SessionMemory};
use crate::recovery::RecoveryPipeline;
use crate::schema::AgentPayload;
use crate::workflow::types::{Stage, StepMarker, WorkflowState};

pub struct AgentRunner {
    llm: Arc<dyn LlmClient>,
    /// 按阶段覆盖的客户端（如决策阶段使用推理模型）
    stage_clients: HashMap<Stage, Arc<dyn LlmClient>>,
    data: Arc<dyn DataSource>,
    pipeline: RecoveryPipeline,
    verbose: bool,
}

impl AgentRunner {
    pub fn new(llm: Arc<dyn LlmClient>, data: Arc<dyn DataSource>, pipeline: RecoveryPipeline) -> Self {
        Self {
            llm,
            stage_clients: HashMap::new(),
            data,
            pipeline,
            verbose: false,
        }
    }

    pub fn with_stage_client(mut self, stage: Stage, llm: Arc<dyn LlmClient>) -> Self {
        self.stage_clients.insert(stage, llm);
        self
    }

    /// 打开后每个阶段的推理步骤都会打到日志
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn client_for(&self, stage: Stage) -> &Arc<dyn LlmClient> {
        self.stage_clients.get(&stage).unwrap_or(&self.llm)
    }

    pub fn pipeline(&self) -> &RecoveryPipeline {
        &self.pipeline
    }

    fn resources_for(stage: Stage, state: &WorkflowState) -> Vec<String> {
        match (stage, state.project_id.as_deref()) {
            (Stage::Perception, _) => Vec::new(),
            (Stage::Analysis, project_id) => {
                let mut keys: Vec<String> = ANALYSIS_RESOURCES.iter().map(|k| k.to_string()).collect();
                if let Some(id) = project_id {
                    keys.push(project_skill_gaps_key(id));
                }
                keys
            }
            (Stage::Decision, Some(id)) => vec![project_key(id)],
            (Stage::Decision, None) => Vec::new(),
        }
    }

    /// 软失败的数据照样放进上下文，模型能看到哪些数据缺失
    async fn gather_context(&self, stage: Stage, state: &WorkflowState) -> StageContext {
        let mut context = StageContext::new();
        for key in Self::resources_for(stage, state) {
            let value = self.data.fetch(&key).await;
            if let Some(err) = soft_error(&value) {
                tracing::warn!(stage = %stage, resource = %key, error = err, "domain data unavailable");
            }
            context.insert(key, value);
        }
        context
    }

    pub async fn run(
        &self,
        stage: Stage,
        mut state: WorkflowState,
        memory: &mut SessionMemory,
    ) -> Result<WorkflowState, EngineError> {
        let started = Instant::now();
        let client = self.client_for(stage);
        tracing::info!(stage = %stage, client = client.name(), "stage started");

        let context = self.gather_context(stage, &state).await;
        let messages = prompts::stage_messages(stage, &state, &context);

        let (raw, steps, transport_error) = match client.invoke(&messages).await {
            Ok(response) => (response.content, response.reasoning_steps, None),
            Err(err) => {
                tracing::warn!(stage = %stage, error = %err, "model call failed");
                (String::new(), Vec::new(), Some(err.to_string()))
            }
        };

        let record = self.pipeline.recover_payload(&raw, stage.agent())?;
        let pattern = stage.reasoning_pattern();
        let steps = if steps.is_empty() {
            pattern.generic_steps()
        } else {
            steps
        };
        let content = record.payload.to_value();
        let strategy = match record.strategy {
            Some(s) => Value::from(s.as_str()),
            None => Value::Null,
        };

        let mut entry = NewEntry::new(stage.as_str(), content.clone(), pattern)
            .steps(steps.clone())
            .confidence(record.status.confidence())
            .meta("status", record.status.as_str())
            .meta("strategy", strategy)
            .meta("stage", stage.as_str());
        if let Some(err) = transport_error {
            entry = entry.meta("transport_error", err);
        }
        memory.append(entry);

        if self.verbose {
            log_agent_reasoning(stage.as_str(), pattern, &steps);
        }

        let is_fallback = record.is_fallback();
        let marker = if is_fallback {
            StepMarker::error(stage)
        } else {
            StepMarker::complete(stage)
        };

        match record.payload {
            AgentPayload::Perception(out) => {
                // 兜底记录里的问题是占位符，下游 prompt 改用用户原话
                let normalized = if is_fallback || out.normalized_question.trim().is_empty() {
                    state.question.clone()
                } else {
                    out.normalized_question
                };
                memory.update("intent", content.get("intent").cloned().unwrap_or(Value::Null));
                memory.update("entities", content.get("entities").cloned().unwrap_or(Value::Null));
                memory.update("normalized_question", normalized.clone());
                state.intent = Some(out.intent);
                state.entities = Some(out.entities);
                state.normalized_question = Some(normalized);
                state.perception_context = Some(out.context);
                state.analysis_focus = Some(out.analysis_focus);
            }
            AgentPayload::Analysis(out) => {
                memory.update("analysis", content);
                state.analysis = Some(out);
            }
            AgentPayload::Decision(out) => {
                memory.update("decision", content);
                state.decision = Some(out);
            }
        }
        memory.update("current_step", marker.to_string());
        state.step = Some(marker);
        state.stage_status.insert(stage, record.status);

        tracing::info!(
            stage = %stage,
            status = %record.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "stage finished"
        );
        Ok(state)
    }
}
