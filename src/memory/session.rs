//! 会话记忆：只追加的有序日志 + 可写的会话数据（scratchpad）
//!
//! 每次运行一个 SessionMemory，由 WorkflowDriver 独占；结束时整体交给 SessionStore 持久化一次。

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::memory::entry::{MemoryEntry, NewEntry, ReasoningPattern};

/// 会话数据中预置的键
pub const SESSION_DATA_KEYS: [&str; 7] = [
    "intent",
    "entities",
    "normalized_question",
    "research_facts",
    "analysis",
    "decision",
    "current_step",
];

fn initial_session_data() -> Map<String, Value> {
    let mut data = Map::new();
    for key in SESSION_DATA_KEYS {
        let empty = match key {
            "entities" | "research_facts" => json!([]),
            _ => Value::Null,
        };
        data.insert(key.to_string(), empty);
    }
    data
}

/// `session_<YYYYmmdd_HHMMSS>_<uuid 前 8 位>`，并发运行不会撞 id
pub fn new_session_id(now: DateTime<Utc>) -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("session_{}_{}", now.format("%Y%m%d_%H%M%S"), &uuid[..8])
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMemory {
    session_id: String,
    created_at: DateTime<Utc>,
    last_updated: DateTime<Utc>,
    entries: Vec<MemoryEntry>,
    session_data: Map<String, Value>,
}

impl Default for SessionMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMemory {
    pub fn new() -> Self {
        let now = Utc::now();
        Self::with_id(new_session_id(now))
    }

    pub fn with_id(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            created_at: now,
            last_updated: now,
            entries: Vec::new(),
            session_data: initial_session_data(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn entries(&self) -> &[MemoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn session_data(&self) -> &Map<String, Value> {
        &self.session_data
    }

    /// 追加一条日志并返回它；已有条目不会被修改或移除
    pub fn append(&mut self, entry: NewEntry) -> &MemoryEntry {
        let now = Utc::now();
        let id = format!("{}_{}_{}", entry.agent, self.entries.len(), now.format("%H%M%S"));
        self.entries.push(MemoryEntry {
            id,
            timestamp: now,
            agent: entry.agent,
            content: entry.content,
            reasoning_pattern: entry.reasoning_pattern,
            reasoning_steps: entry.reasoning_steps,
            confidence: entry.confidence,
            metadata: entry.metadata,
        });
        self.last_updated = now;
        &self.entries[self.entries.len() - 1]
    }

    /// 写入会话数据
    pub fn update(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.session_data.insert(key.into(), value.into());
        self.last_updated = Utc::now();
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.session_data.get(key).filter(|v| !v.is_null())
    }

    pub fn entries_for<'a>(&'a self, agent: &'a str) -> impl Iterator<Item = &'a MemoryEntry> + 'a {
        self.entries.iter().filter(move |e| e.agent == agent)
    }

    pub fn summary(&self) -> SessionSummary {
        let agents_used: BTreeSet<String> = self.entries.iter().map(|e| e.agent.clone()).collect();
        let patterns: BTreeSet<ReasoningPattern> =
            self.entries.iter().map(|e| e.reasoning_pattern).collect();
        let average_confidence = if self.entries.is_empty() {
            None
        } else {
            let sum: f64 = self.entries.iter().map(|e| e.confidence).sum();
            Some(sum / self.entries.len() as f64)
        };

        SessionSummary {
            session_id: self.session_id.clone(),
            created_at: self.created_at,
            last_updated: self.last_updated,
            total_entries: self.entries.len(),
            agents_used: agents_used.into_iter().collect(),
            reasoning_patterns: patterns.into_iter().collect(),
            average_confidence,
            session_data: self.session_data.clone(),
        }
    }
}

/// 会话统计
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub total_entries: usize,
    pub agents_used: Vec<String>,
    pub reasoning_patterns: Vec<ReasoningPattern>,
    pub average_confidence: Option<f64>,
    pub session_data: Map<String, Value>,
}

/// 逐条打印 agent 的推理步骤
pub fn log_agent_reasoning(agent: &str, pattern: ReasoningPattern, steps: &[String]) {
    tracing::info!(agent, pattern = %pattern, steps = steps.len(), "agent reasoning");
    for (i, step) in steps.iter().enumerate() {
        tracing::info!(agent, "  step {}: {}", i + 1, step);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_format() {
        let memory = SessionMemory::new();
        let id = memory.session_id();
        assert!(id.starts_with("session_"));
        // session_ + 8 位日期 + _ + 6 位时间 + _ + 8 位 uuid
        assert_eq!(id.len(), "session_".len() + 8 + 1 + 6 + 1 + 8);
        assert_ne!(SessionMemory::new().session_id(), id);
    }

    #[test]
    fn test_append_preserves_order_and_ids() {
        let mut memory = SessionMemory::with_id("s1");
        memory.append(NewEntry::new("perception", json!({"a": 1}), ReasoningPattern::React));
        let second = memory
            .append(NewEntry::new("analysis", json!({"b": 2}), ReasoningPattern::React).confidence(0.6))
            .clone();

        assert_eq!(memory.len(), 2);
        assert!(second.id.starts_with("analysis_1_"));
        assert_eq!(memory.entries()[0].agent, "perception");
        assert_eq!(memory.entries()[1], second);
        assert!(memory.entries()[0].timestamp <= memory.entries()[1].timestamp);
    }

    #[test]
    fn test_session_data_defaults_and_update() {
        let mut memory = SessionMemory::with_id("s2");
        assert_eq!(memory.session_data().len(), SESSION_DATA_KEYS.len());
        assert!(memory.get("intent").is_none());
        assert_eq!(memory.session_data()["entities"], json!([]));

        memory.update("intent", "skill_gap_analysis");
        memory.update("current_step", "perception_complete");
        assert_eq!(memory.get("intent"), Some(&json!("skill_gap_analysis")));
        assert_eq!(memory.get("current_step"), Some(&json!("perception_complete")));
    }

    #[test]
    fn test_summary() {
        let mut memory = SessionMemory::with_id("s3");
        memory.append(NewEntry::new("perception", json!({}), ReasoningPattern::React).confidence(1.0));
        memory.append(NewEntry::new("analysis", json!({}), ReasoningPattern::React).confidence(0.6));
        memory.append(NewEntry::new("decision", json!({}), ReasoningPattern::Tot).confidence(0.1));

        let summary = memory.summary();
        assert_eq!(summary.total_entries, 3);
        assert_eq!(summary.agents_used, vec!["analysis", "decision", "perception"]);
        assert_eq!(
            summary.reasoning_patterns,
            vec![ReasoningPattern::React, ReasoningPattern::Tot]
        );
        let avg = summary.average_confidence.unwrap();
        assert!((avg - 1.7 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_serde_round_trip() {
        let mut memory = SessionMemory::with_id("s4");
        memory.append(
            NewEntry::new("decision", json!({"x": [1, 2]}), ReasoningPattern::Tot)
                .steps(vec!["Root: start".into()])
                .confidence(0.6)
                .meta("status", "cleaned"),
        );
        memory.update("decision", json!({"x": [1, 2]}));

        let text = serde_json::to_string(&memory).unwrap();
        let back: SessionMemory = serde_json::from_str(&text).unwrap();
        assert_eq!(back, memory);
    }
}
