//! 工作流状态机
//!
//! 默认按字段是否已写入确定下一阶段；模型路由是可选的，答案不合法时退回确定性规则。

use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::prompts;
use crate::llm::LlmClient;
use crate::workflow::types::{Phase, Stage, WorkflowState};

#[derive(Clone, Default)]
pub enum RoutingMode {
    #[default]
    Deterministic,
    /// 询问模型 analysis|decision|done
    ///
    /// 被接受的答案总是等于确定性顺序给出的相位，模型只能确认顺序或被拒绝，
    /// 不能跳过或重排阶段。
    Model(Arc<dyn LlmClient>),
}

impl std::fmt::Debug for RoutingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoutingMode::Deterministic => f.write_str("Deterministic"),
            RoutingMode::Model(llm) => write!(f, "Model({})", llm.name()),
        }
    }
}

/// 驱动循环的相位来源
#[async_trait]
pub trait PhaseRouter: Send + Sync {
    async fn next_phase(&self, state: &WorkflowState) -> Phase;
}

#[derive(Debug, Clone, Default)]
pub struct StateMachine {
    mode: RoutingMode,
}

impl StateMachine {
    pub fn new(mode: RoutingMode) -> Self {
        Self { mode }
    }

    pub fn deterministic() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> &RoutingMode {
        &self.mode
    }

    /// 第一个尚未写入输出的阶段；全部写入则为 Done
    pub fn next_deterministic(state: &WorkflowState) -> Phase {
        Stage::ALL
            .into_iter()
            .find(|stage| !state.is_populated(*stage))
            .map(Phase::from)
            .unwrap_or(Phase::Done)
    }

    pub async fn next(&self, state: &WorkflowState) -> Phase {
        let fallback = Self::next_deterministic(state);
        let llm = match &self.mode {
            RoutingMode::Deterministic => return fallback,
            // 感知阶段总是第一个执行
            RoutingMode::Model(_) if !state.is_populated(Stage::Perception) => return fallback,
            RoutingMode::Model(llm) => llm,
        };

        let answer = match llm.invoke(&prompts::routing_messages(state)).await {
            Ok(response) => response.content,
            Err(err) => {
                tracing::warn!(error = %err, "routing call failed, using deterministic order");
                return fallback;
            }
        };

        match accept(state, &answer) {
            Some(phase) => {
                tracing::debug!(next = ?phase, "model routing confirmed");
                phase
            }
            None => {
                tracing::warn!(answer = %answer.trim(), next = ?fallback, "rejected routing answer");
                fallback
            }
        }
    }
}

#[async_trait]
impl PhaseRouter for StateMachine {
    async fn next_phase(&self, state: &WorkflowState) -> Phase {
        self.next(state).await
    }
}

/// 取答案的第一个词；只接受尚未执行且前置阶段已完成的阶段
///
/// 阶段前置关系是线性的，满足这些条件的阶段只有第一个未写入的那个，
/// 因此返回值要么是 None，要么等于 `next_deterministic(state)`。
fn accept(state: &WorkflowState, answer: &str) -> Option<Phase> {
    let word = answer
        .split(|c: char| !c.is_ascii_alphabetic())
        .find(|w| !w.is_empty())?
        .to_ascii_lowercase();

    if word == "done" {
        // 还有阶段没执行时不能提前结束
        return (StateMachine::next_deterministic(state) == Phase::Done).then_some(Phase::Done);
    }

    let stage: Stage = word.parse().ok()?;
    if stage == Stage::Perception || state.is_populated(stage) {
        return None;
    }
    stage
        .prerequisites()
        .iter()
        .all(|pre| state.is_populated(*pre))
        .then_some(Phase::from(stage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{FailingLlmClient, ScriptedLlmClient};
    use crate::schema::{AnalysisOutput, DecisionOutput, Intent, SchemaRegistry};

    fn perceived() -> WorkflowState {
        let mut state = WorkflowState::new("q");
        state.intent = Some(Intent::SkillGapAnalysis);
        state.normalized_question = Some("q".into());
        state
    }

    fn analysis() -> AnalysisOutput {
        SchemaRegistry::new()
            .fallback_for::<AnalysisOutput>()
            .unwrap()
            .payload
    }

    fn decision() -> DecisionOutput {
        SchemaRegistry::new()
            .fallback_for::<DecisionOutput>()
            .unwrap()
            .payload
    }

    #[test]
    fn test_deterministic_order() {
        let mut state = WorkflowState::new("q");
        assert_eq!(StateMachine::next_deterministic(&state), Phase::Perception);
        state = perceived();
        assert_eq!(StateMachine::next_deterministic(&state), Phase::Analysis);
        state.analysis = Some(analysis());
        assert_eq!(StateMachine::next_deterministic(&state), Phase::Decision);
        state.decision = Some(decision());
        assert_eq!(StateMachine::next_deterministic(&state), Phase::Done);
    }

    #[test]
    fn test_accept_rules() {
        let state = perceived();
        assert_eq!(accept(&state, "analysis"), Some(Phase::Analysis));
        assert_eq!(accept(&state, "  Analysis.\n"), Some(Phase::Analysis));
        // 前置阶段 analysis 尚未完成
        assert_eq!(accept(&state, "decision"), None);
        assert_eq!(accept(&state, "done"), None);
        assert_eq!(accept(&state, "perception"), None);
        assert_eq!(accept(&state, "research"), None);
        assert_eq!(accept(&state, ""), None);

        let mut state = perceived();
        state.analysis = Some(analysis());
        assert_eq!(accept(&state, "analysis"), None);
        assert_eq!(accept(&state, "decision"), Some(Phase::Decision));

        state.decision = Some(decision());
        assert_eq!(accept(&state, "DONE"), Some(Phase::Done));
    }

    #[test]
    fn test_accept_never_diverges_from_default_order() {
        let mut analysed = perceived();
        analysed.analysis = Some(analysis());
        let mut decided = analysed.clone();
        decided.decision = Some(decision());
        // 决策已写入但分析缺失
        let mut skipped = perceived();
        skipped.decision = Some(decision());

        let states = [WorkflowState::new("q"), perceived(), analysed, decided, skipped];
        let answers = ["perception", "analysis", "decision", "done", "Decision!", "nonsense", ""];
        for state in &states {
            let expected = StateMachine::next_deterministic(state);
            for answer in answers {
                if let Some(phase) = accept(state, answer) {
                    assert_eq!(phase, expected, "answer {answer:?}");
                }
            }
        }
    }

    #[tokio::test]
    async fn test_model_routing_falls_back() {
        let llm = Arc::new(ScriptedLlmClient::from_texts(["decision", "analysis"]));
        let machine = StateMachine::new(RoutingMode::Model(llm.clone()));

        // 感知阶段不询问模型
        assert_eq!(machine.next(&WorkflowState::new("q")).await, Phase::Perception);
        assert_eq!(llm.call_count(), 0);

        let state = perceived();
        // "decision" 被拒绝，退回 analysis
        assert_eq!(machine.next(&state).await, Phase::Analysis);
        assert_eq!(machine.next(&state).await, Phase::Analysis);
        assert_eq!(llm.call_count(), 2);
    }

    #[tokio::test]
    async fn test_routing_transport_error_uses_default() {
        let machine = StateMachine::new(RoutingMode::Model(Arc::new(FailingLlmClient::default())));
        assert_eq!(machine.next(&perceived()).await, Phase::Analysis);
    }
}
