//! Agent 输出的强类型定义
//!
//! 每个 agent（Perception / Analysis / Decision）对应一个封闭的结构体，字段可选性显式声明；
//! 未知字段在反序列化时直接丢弃。

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Agent 类型：每种类型在 SchemaRegistry 中注册一份 SchemaSpec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Perception,
    Analysis,
    Decision,
}

impl AgentType {
    pub const ALL: [AgentType; 3] = [AgentType::Perception, AgentType::Analysis, AgentType::Decision];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Perception => "perception",
            AgentType::Analysis => "analysis",
            AgentType::Decision => "decision",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 与具体 agent 绑定的 schema 类型
pub trait AgentSchema: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const AGENT: AgentType;

    fn into_payload(self) -> AgentPayload;
}

// ---------------------------------------------------------------------------
// 枚举值集合
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    SkillGapAnalysis,
    TeamOptimization,
    UpskillingPlan,
    ProjectReadiness,
    /// 识别失败时的兜底意图
    Unknown,
}

/// high / medium / low 三档，用于紧急度、置信度、成功概率、成本与风险
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Department,
    Team,
    Company,
    Project,
}

impl Default for Scope {
    fn default() -> Self {
        Scope::Company
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Availability {
    #[serde(rename = "immediate")]
    Immediate,
    #[serde(rename = "2_weeks")]
    TwoWeeks,
    #[serde(rename = "1_month")]
    OneMonth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HiringUrgency {
    Critical,
    High,
    Medium,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyType {
    Upskill,
    Transfer,
    Hire,
    Mixed,
}

// ---------------------------------------------------------------------------
// Perception
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerceptionEntities {
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub projects: Vec<String>,
    #[serde(default)]
    pub teams: Vec<String>,
    #[serde(default)]
    pub people: Vec<String>,
    #[serde(default)]
    pub timelines: Vec<String>,
}

impl PerceptionEntities {
    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
            && self.projects.is_empty()
            && self.teams.is_empty()
            && self.people.is_empty()
            && self.timelines.is_empty()
    }
}

fn default_urgency() -> Level {
    Level::Medium
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerceptionContext {
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default = "default_urgency")]
    pub urgency: Level,
    #[serde(default)]
    pub scope: Scope,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerceptionOutput {
    pub intent: Intent,
    pub entities: PerceptionEntities,
    pub normalized_question: String,
    pub context: PerceptionContext,
    pub analysis_focus: String,
}

impl AgentSchema for PerceptionOutput {
    const AGENT: AgentType = AgentType::Perception;

    fn into_payload(self) -> AgentPayload {
        AgentPayload::Perception(self)
    }
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpskillingRecommendation {
    pub employee: String,
    pub skill_to_learn: String,
    pub timeline_weeks: u32,
    pub confidence: Level,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalTransferRecommendation {
    pub employee: String,
    pub current_team: String,
    pub skills_brought: Vec<String>,
    pub availability: Availability,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HiringRecommendation {
    pub role: String,
    pub required_skills: Vec<String>,
    pub urgency: HiringUrgency,
    pub estimated_cost: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutput {
    #[serde(default)]
    pub skill_gaps: Vec<String>,
    #[serde(default)]
    pub upskilling: Vec<UpskillingRecommendation>,
    #[serde(default)]
    pub internal_transfers: Vec<InternalTransferRecommendation>,
    #[serde(default)]
    pub hiring: Vec<HiringRecommendation>,
    pub timeline_assessment: String,
    #[serde(default)]
    pub risk_factors: Vec<String>,
    pub success_probability: Level,
}

impl AgentSchema for AnalysisOutput {
    const AGENT: AgentType = AgentType::Analysis;

    fn into_payload(self) -> AgentPayload {
        AgentPayload::Analysis(self)
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedStrategy {
    pub strategy_name: String,
    pub strategy_type: StrategyType,
    pub confidence: Level,
    pub rationale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specific_people: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specific_skills: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison_details: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyDetails {
    pub primary_action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_skill: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline_weeks: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_probability: Option<Level>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_estimate: Option<Level>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<Level>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specific_recommendations: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub why_not_alternatives: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub immediate_actions: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImplementationPlan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support_team: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline_weeks: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_milestones: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_metrics: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_estimate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_requirements: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskMitigation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_risks: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mitigation_strategies: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contingency_plan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitoring_points: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewSchedule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_review_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_frequency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_criteria: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativeStrategy {
    pub strategy_name: String,
    pub approach: String,
    pub selection_reason: String,
    pub confidence_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionOutput {
    pub natural_language_summary: String,
    pub selected_strategy: SelectedStrategy,
    pub strategy_details: StrategyDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation_plan: Option<ImplementationPlan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_mitigation: Option<RiskMitigation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_schedule: Option<ReviewSchedule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternative_strategies: Option<Vec<AlternativeStrategy>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specific_people_recommendations: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline_breakdown: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_factors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub potential_obstacles: Option<Vec<String>>,
}

impl AgentSchema for DecisionOutput {
    const AGENT: AgentType = AgentType::Decision;

    fn into_payload(self) -> AgentPayload {
        AgentPayload::Decision(self)
    }
}

// ---------------------------------------------------------------------------
// 统一负载
// ---------------------------------------------------------------------------

/// 三种 agent 输出的和类型；序列化时不带标签，直接输出内部记录
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AgentPayload {
    Perception(PerceptionOutput),
    Analysis(AnalysisOutput),
    Decision(DecisionOutput),
}

impl AgentPayload {
    pub fn agent(&self) -> AgentType {
        match self {
            AgentPayload::Perception(_) => AgentType::Perception,
            AgentPayload::Analysis(_) => AgentType::Analysis,
            AgentPayload::Decision(_) => AgentType::Decision,
        }
    }

    /// 按 agent 类型把 JSON 还原为对应记录
    pub fn from_value(agent: AgentType, value: serde_json::Value) -> serde_json::Result<Self> {
        Ok(match agent {
            AgentType::Perception => AgentPayload::Perception(serde_json::from_value(value)?),
            AgentType::Analysis => AgentPayload::Analysis(serde_json::from_value(value)?),
            AgentType::Decision => AgentPayload::Decision(serde_json::from_value(value)?),
        })
    }

    pub fn to_value(&self) -> serde_json::Value {
        // 这些类型只含字符串键与基础类型，序列化不会失败
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_fields_are_dropped() {
        let out: PerceptionEntities =
            serde_json::from_value(json!({"skills": ["AWS"], "mood": "happy"})).unwrap();
        assert_eq!(out.skills, vec!["AWS".to_string()]);
        let back = serde_json::to_value(&out).unwrap();
        assert!(back.get("mood").is_none());
    }

    #[test]
    fn test_availability_wire_names() {
        let v: Availability = serde_json::from_value(json!("2_weeks")).unwrap();
        assert_eq!(v, Availability::TwoWeeks);
        assert_eq!(serde_json::to_value(Availability::OneMonth).unwrap(), json!("1_month"));
    }

    #[test]
    fn test_context_defaults() {
        let ctx: PerceptionContext = serde_json::from_value(json!({})).unwrap();
        assert_eq!(ctx.urgency, Level::Medium);
        assert_eq!(ctx.scope, Scope::Company);
        assert!(ctx.constraints.is_empty());
    }

    #[test]
    fn test_payload_from_value_matches_agent() {
        let payload = AgentPayload::from_value(
            AgentType::Analysis,
            json!({
                "timeline_assessment": "tight",
                "success_probability": "medium"
            }),
        )
        .unwrap();
        assert_eq!(payload.agent(), AgentType::Analysis);
        assert_eq!(payload.to_value()["skill_gaps"], json!([]));
    }
}
