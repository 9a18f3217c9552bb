//! Schema 注册表：按 agent 类型查 schema，并给出确定的兜底记录

use std::collections::HashMap;

use crate::core::EngineError;
use crate::schema::definitions::{analysis_spec, decision_spec, perception_spec};
use crate::schema::record::RecoveredRecord;
use crate::schema::spec::SchemaSpec;
use crate::schema::types::{AgentPayload, AgentSchema, AgentType};

/// 构造后只读，可通过 Arc 在多个运行之间共享
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    specs: HashMap<AgentType, SchemaSpec>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRegistry {
    /// 注册全部三个 agent 的 schema
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(perception_spec());
        registry.register(analysis_spec());
        registry.register(decision_spec());
        registry
    }

    pub fn empty() -> Self {
        Self {
            specs: HashMap::new(),
        }
    }

    /// 同一 agent 重复注册时后者覆盖前者
    pub fn register(&mut self, spec: SchemaSpec) {
        self.specs.insert(spec.agent, spec);
    }

    pub fn contains(&self, agent: AgentType) -> bool {
        self.specs.contains_key(&agent)
    }

    pub fn describe(&self, agent: AgentType) -> Result<&SchemaSpec, EngineError> {
        self.specs
            .get(&agent)
            .ok_or_else(|| EngineError::Configuration(format!("no schema registered for agent '{agent}'")))
    }

    /// 兜底记录：只由字段默认值构成，多次调用结果相同
    pub fn fallback(&self, agent: AgentType) -> Result<RecoveredRecord<AgentPayload>, EngineError> {
        let spec = self.describe(agent)?;
        let payload = AgentPayload::from_value(agent, spec.default_record()).map_err(|e| {
            EngineError::Configuration(format!("fallback record for '{agent}' is not deserializable: {e}"))
        })?;
        Ok(RecoveredRecord::fallback(payload))
    }

    /// 强类型版本的 fallback
    pub fn fallback_for<T: AgentSchema>(&self) -> Result<RecoveredRecord<T>, EngineError> {
        let spec = self.describe(T::AGENT)?;
        let payload: T = serde_json::from_value(spec.default_record()).map_err(|e| {
            EngineError::Configuration(format!("fallback record for '{}' is not deserializable: {e}", T::AGENT))
        })?;
        Ok(RecoveredRecord::fallback(payload))
    }
}
