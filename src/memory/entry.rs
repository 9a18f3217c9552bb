//! 会话日志条目与推理模式

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Agent 使用的推理模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningPattern {
    /// Reason, Evaluate, Work, Observe, Optimize
    Rewoo,
    /// Reason, Evaluate, Act, Check, Think
    React,
    /// Chain of Thought
    Cot,
    /// Tree of Thoughts
    Tot,
    /// 多 agent 协作
    Agent,
}

impl ReasoningPattern {
    pub const ALL: [ReasoningPattern; 5] = [
        ReasoningPattern::Rewoo,
        ReasoningPattern::React,
        ReasoningPattern::Cot,
        ReasoningPattern::Tot,
        ReasoningPattern::Agent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningPattern::Rewoo => "rewoo",
            ReasoningPattern::React => "react",
            ReasoningPattern::Cot => "cot",
            ReasoningPattern::Tot => "tot",
            ReasoningPattern::Agent => "agent",
        }
    }

    /// 模型未返回推理步骤时使用的通用步骤
    pub fn generic_steps(&self) -> Vec<String> {
        let steps: &[&str] = match self {
            ReasoningPattern::Rewoo => &[
                "Reason: Analyzing the input to understand requirements",
                "Evaluate: Assessing available information and constraints",
                "Work: Processing the data systematically",
                "Observe: Identifying patterns and insights",
                "Optimize: Finding the best possible solution",
            ],
            ReasoningPattern::React => &[
                "Reason: Understanding the problem context",
                "Evaluate: Assessing the current situation",
                "Act: Taking action based on analysis",
                "Check: Verifying the action's effectiveness",
                "Think: Reflecting on the outcome",
            ],
            ReasoningPattern::Cot => &[
                "Step 1: Understanding the input",
                "Step 2: Breaking down the problem",
                "Step 3: Analyzing each component",
                "Step 4: Synthesizing the solution",
                "Step 5: Providing the final answer",
            ],
            ReasoningPattern::Tot => &[
                "Root: Starting with the main question",
                "Branch 1: Exploring first approach",
                "Branch 2: Considering alternative approach",
                "Evaluate: Comparing approaches",
                "Select: Choosing the best path",
            ],
            ReasoningPattern::Agent => &[
                "Agent 1: Specialized analysis",
                "Agent 2: Cross-validation",
                "Agent 3: Synthesis and integration",
                "Coordinator: Final decision making",
            ],
        };
        steps.iter().map(|s| s.to_string()).collect()
    }
}

impl fmt::Display for ReasoningPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReasoningPattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown reasoning pattern '{s}'"))
    }
}

/// 单条日志；追加后不可修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub agent: String,
    pub content: Value,
    pub reasoning_pattern: ReasoningPattern,
    #[serde(default)]
    pub reasoning_steps: Vec<String>,
    pub confidence: f64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// 追加条目时的输入；id 与时间戳由 SessionMemory 生成
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub agent: String,
    pub content: Value,
    pub reasoning_pattern: ReasoningPattern,
    pub reasoning_steps: Vec<String>,
    pub confidence: f64,
    pub metadata: Map<String, Value>,
}

impl NewEntry {
    pub fn new(agent: impl Into<String>, content: Value, reasoning_pattern: ReasoningPattern) -> Self {
        Self {
            agent: agent.into(),
            content,
            reasoning_pattern,
            reasoning_steps: Vec::new(),
            confidence: 1.0,
            metadata: Map::new(),
        }
    }

    pub fn steps(mut self, steps: Vec<String>) -> Self {
        self.reasoning_steps = steps;
        self
    }

    /// 夹到 [0, 1]；NaN 记为 0
    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pattern_wire_names() {
        assert_eq!(serde_json::to_value(ReasoningPattern::Tot).unwrap(), json!("tot"));
        let p: ReasoningPattern = serde_json::from_value(json!("rewoo")).unwrap();
        assert_eq!(p, ReasoningPattern::Rewoo);
        assert!(serde_json::from_value::<ReasoningPattern>(json!("magic")).is_err());
        assert_eq!("react".parse::<ReasoningPattern>().unwrap(), ReasoningPattern::React);
    }

    #[test]
    fn test_generic_steps() {
        assert_eq!(ReasoningPattern::React.generic_steps().len(), 5);
        assert_eq!(ReasoningPattern::Agent.generic_steps().len(), 4);
        assert!(ReasoningPattern::Tot.generic_steps()[0].starts_with("Root:"));
    }

    #[test]
    fn test_new_entry_clamps_confidence() {
        let e = NewEntry::new("analysis", json!({}), ReasoningPattern::React).confidence(3.0);
        assert_eq!(e.confidence, 1.0);
        let e = e.confidence(f64::NAN);
        assert_eq!(e.confidence, 0.0);
    }
}
