//! 恢复管线：原始模型输出 → 强类型记录
//!
//! 结构解析成功后先做严格校验（Validated），不通过则尝试字段修正（Cleaned），
//! 仍然失败就返回注册表中的兜底记录（Fallback）。唯一会向上传播的错误是 schema 未注册。

use std::sync::Arc;

use serde_json::Value;

use crate::core::EngineError;
use crate::recovery::strategies;
use crate::schema::{
    AgentPayload, AgentSchema, AgentType, AnalysisOutput, DecisionOutput, PerceptionOutput,
    RecoveredRecord, RecoveryStatus, RecoveryStrategy, SchemaRegistry, SchemaSpec,
};

/// 无内部可变状态，可在多个运行之间共享
#[derive(Debug, Clone)]
pub struct RecoveryPipeline {
    registry: Arc<SchemaRegistry>,
}

impl RecoveryPipeline {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn recover<T: AgentSchema>(&self, raw: &str) -> Result<RecoveredRecord<T>, EngineError> {
        let spec = self.registry.describe(T::AGENT)?;

        // 与 schema 无关的对象（如前缀被当成 YAML 键）不终止策略搜索
        if let Some((strategy, candidate)) = strategies::extract_matching(raw, |v| spec.recognizes(v)) {
            match settle::<T>(spec, strategy, candidate) {
                Ok(record) => return Ok(record),
                Err(err) => tracing::warn!(
                    agent = %T::AGENT,
                    strategy = %strategy,
                    error = %err,
                    "structured output rejected by schema"
                ),
            }
        } else {
            tracing::warn!(
                agent = %T::AGENT,
                raw_len = raw.len(),
                "no structured document found in model output"
            );
        }

        tracing::warn!(agent = %T::AGENT, "using fallback record");
        self.registry.fallback_for::<T>()
    }

    /// 按 agent 类型分派到强类型 recover
    pub fn recover_payload(
        &self,
        raw: &str,
        agent: AgentType,
    ) -> Result<RecoveredRecord<AgentPayload>, EngineError> {
        Ok(match agent {
            AgentType::Perception => self.recover::<PerceptionOutput>(raw)?.map(AgentSchema::into_payload),
            AgentType::Analysis => self.recover::<AnalysisOutput>(raw)?.map(AgentSchema::into_payload),
            AgentType::Decision => self.recover::<DecisionOutput>(raw)?.map(AgentSchema::into_payload),
        })
    }
}

/// 对结构解析得到的候选做校验与修正
fn settle<T: AgentSchema>(
    spec: &SchemaSpec,
    strategy: RecoveryStrategy,
    candidate: Value,
) -> Result<RecoveredRecord<T>, EngineError> {
    let violations = spec.check(&candidate);
    if violations.is_empty() {
        if let Ok(payload) = serde_json::from_value::<T>(candidate.clone()) {
            return Ok(RecoveredRecord {
                status: RecoveryStatus::Validated,
                strategy: Some(strategy),
                payload,
            });
        }
    } else {
        tracing::debug!(
            agent = %T::AGENT,
            violations = violations.len(),
            first = %violations[0],
            "candidate failed strict validation, coercing"
        );
    }

    let coerced = spec
        .coerce(candidate)
        .map_err(|v| EngineError::Parse(v.to_string()))?;
    let remaining = spec.check(&coerced);
    if let Some(first) = remaining.first() {
        return Err(EngineError::Validation(first.to_string()));
    }
    let payload = serde_json::from_value::<T>(coerced)
        .map_err(|e| EngineError::Validation(e.to_string()))?;
    Ok(RecoveredRecord {
        status: RecoveryStatus::Cleaned,
        strategy: Some(strategy),
        payload,
    })
}
