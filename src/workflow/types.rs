//! 工作流类型定义
//!
//! 阶段（Stage）、相位（Phase）、步骤标记与贯穿整个运行的 WorkflowState。

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::memory::{ReasoningPattern, SessionMemory};
use crate::schema::types::{PerceptionContext, PerceptionEntities};
use crate::schema::{AgentType, AnalysisOutput, DecisionOutput, Intent, RecoveryStatus, Scope};

/// 需要调用模型的三个阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Perception,
    Analysis,
    Decision,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Perception, Stage::Analysis, Stage::Decision];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Perception => "perception",
            Stage::Analysis => "analysis",
            Stage::Decision => "decision",
        }
    }

    pub fn agent(&self) -> AgentType {
        match self {
            Stage::Perception => AgentType::Perception,
            Stage::Analysis => AgentType::Analysis,
            Stage::Decision => AgentType::Decision,
        }
    }

    /// 决策阶段用树状推理，其余用 ReAct
    pub fn reasoning_pattern(&self) -> ReasoningPattern {
        match self {
            Stage::Perception | Stage::Analysis => ReasoningPattern::React,
            Stage::Decision => ReasoningPattern::Tot,
        }
    }

    /// 进入本阶段前必须已完成的阶段
    pub fn prerequisites(&self) -> &'static [Stage] {
        match self {
            Stage::Perception => &[],
            Stage::Analysis => &[Stage::Perception],
            Stage::Decision => &[Stage::Perception, Stage::Analysis],
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| format!("unknown stage '{s}'"))
    }
}

/// 状态机相位：Start → Perception → Analysis → Decision → Done
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// 驱动循环的初始相位，不对应任何阶段
    Start,
    Perception,
    Analysis,
    Decision,
    Done,
}

impl Phase {
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Phase::Perception => Some(Stage::Perception),
            Phase::Analysis => Some(Stage::Analysis),
            Phase::Decision => Some(Stage::Decision),
            Phase::Start | Phase::Done => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        *self == Phase::Done
    }
}

impl From<Stage> for Phase {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Perception => Phase::Perception,
            Stage::Analysis => Phase::Analysis,
            Stage::Decision => Phase::Decision,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepOutcome {
    Complete,
    Error,
}

/// 最近一次执行的阶段及结果，显示为 `<stage>_complete` / `<stage>_error`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct StepMarker {
    pub stage: Stage,
    pub outcome: StepOutcome,
}

impl StepMarker {
    pub fn complete(stage: Stage) -> Self {
        Self {
            stage,
            outcome: StepOutcome::Complete,
        }
    }

    pub fn error(stage: Stage) -> Self {
        Self {
            stage,
            outcome: StepOutcome::Error,
        }
    }

    pub fn is_error(&self) -> bool {
        self.outcome == StepOutcome::Error
    }
}

impl fmt::Display for StepMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suffix = match self.outcome {
            StepOutcome::Complete => "complete",
            StepOutcome::Error => "error",
        };
        write!(f, "{}_{}", self.stage, suffix)
    }
}

impl FromStr for StepMarker {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (stage, outcome) = s
            .rsplit_once('_')
            .ok_or_else(|| format!("malformed step marker '{s}'"))?;
        let outcome = match outcome {
            "complete" => StepOutcome::Complete,
            "error" => StepOutcome::Error,
            other => return Err(format!("unknown step outcome '{other}'")),
        };
        Ok(Self {
            stage: stage.parse()?,
            outcome,
        })
    }
}

impl From<StepMarker> for String {
    fn from(marker: StepMarker) -> Self {
        marker.to_string()
    }
}

impl TryFrom<String> for StepMarker {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// 一次运行的全部状态，由各阶段依次写入
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub question: String,
    pub intent: Option<Intent>,
    pub entities: Option<PerceptionEntities>,
    pub normalized_question: Option<String>,
    pub perception_context: Option<PerceptionContext>,
    pub analysis_focus: Option<String>,
    pub analysis: Option<AnalysisOutput>,
    pub decision: Option<DecisionOutput>,
    pub step: Option<StepMarker>,
    pub project_id: Option<String>,
    pub scope: Option<Scope>,
    /// 每个已执行阶段的恢复状态
    #[serde(default)]
    pub stage_status: BTreeMap<Stage, RecoveryStatus>,
}

impl WorkflowState {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Self::default()
        }
    }

    pub fn from_request(request: &RunRequest) -> Self {
        Self {
            project_id: request.project_id.clone(),
            scope: request.scope,
            ..Self::new(request.question.clone())
        }
    }

    /// 该阶段的输出是否已写入
    pub fn is_populated(&self, stage: Stage) -> bool {
        match stage {
            Stage::Perception => self.intent.is_some() && self.normalized_question.is_some(),
            Stage::Analysis => self.analysis.is_some(),
            Stage::Decision => self.decision.is_some(),
        }
    }

    pub fn completed_stages(&self) -> Vec<Stage> {
        Stage::ALL
            .into_iter()
            .filter(|s| self.is_populated(*s))
            .collect()
    }

    /// 下游 prompt 使用的问题：优先规范化后的问题
    pub fn effective_question(&self) -> &str {
        self.normalized_question
            .as_deref()
            .filter(|q| !q.trim().is_empty())
            .unwrap_or(self.question.as_str())
    }

    /// 运行范围：请求显式指定优先，其次感知阶段识别的范围
    pub fn effective_scope(&self) -> Scope {
        self.scope
            .or_else(|| self.perception_context.as_ref().map(|c| c.scope))
            .unwrap_or_default()
    }
}

/// 一次运行的输入
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub question: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub scope: Option<Scope>,
}

impl RunRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Self::default()
        }
    }

    pub fn project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }
}

/// 一次运行的结果
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub state: WorkflowState,
    pub session: SessionMemory,
    /// 持久化位置；保存失败时为 None
    pub location: Option<String>,
    pub stages_executed: usize,
}
