//! 各阶段的 prompt 构造
//!
//! 全部是 (state, context) 的纯函数，便于单测与替换措辞。

use std::collections::BTreeMap;

use serde_json::Value;

use crate::llm::Message;
use crate::workflow::types::{Stage, WorkflowState};

/// 阶段执行前拉取的外部数据：资源 key → JSON（可能是 `{"error": ..}`）
pub type StageContext = BTreeMap<String, Value>;

const PERCEPTION_SYSTEM: &str = r#"You are the Perception Agent for the GapLens skills analysis system.

Understand the user's request: intent, key entities (skills, projects, teams, people, timelines),
constraints and implicit requirements.

Return ONLY a JSON object with this structure:
{
  "intent": "skill_gap_analysis|team_optimization|upskilling_plan|project_readiness|unknown",
  "entities": {"skills": [], "projects": [], "teams": [], "people": [], "timelines": []},
  "normalized_question": "<the request restated as one clear question>",
  "context": {"constraints": [], "urgency": "high|medium|low", "scope": "department|team|company|project"},
  "analysis_focus": "<what the analysis should concentrate on>"
}"#;

const ANALYSIS_SYSTEM: &str = r#"You are the Analysis Agent for the GapLens skills analysis system.

CRITICAL: return ONLY a valid JSON object, no additional text.

{
  "skill_gaps": ["<skill>"],
  "upskilling": [{"employee": "<full name>", "skill_to_learn": "<skill>", "timeline_weeks": <1-104>, "confidence": "high|medium|low", "reason": "<brief reason>"}],
  "internal_transfers": [{"employee": "<full name>", "current_team": "<team>", "skills_brought": ["<skill>"], "availability": "immediate|2_weeks|1_month", "reason": "<brief reason>"}],
  "hiring": [{"role": "<job title>", "required_skills": ["<skill>"], "urgency": "critical|high|medium", "estimated_cost": "<salary range>"}],
  "timeline_assessment": "<brief timeline analysis>",
  "risk_factors": ["<risk>"],
  "success_probability": "high|medium|low"
}

Rules:
- Use full employee names from the data.
- Keep text fields brief.
- Use empty arrays when a section has no data."#;

const DECISION_SYSTEM: &str = r#"You are the Decision Agent for the GapLens skills analysis system.

Turn the skill gap findings into one final, actionable recommendation. Compare upskilling,
internal transfer and hiring, pick one strategy, name the people involved and the timeline.

Return ONLY a JSON object with this structure:
{
  "natural_language_summary": "<2-3 sentences for a manager>",
  "selected_strategy": {"strategy_name": "", "strategy_type": "upskill|transfer|hire|mixed", "confidence": "high|medium|low", "rationale": "", "specific_people": [], "specific_skills": []},
  "strategy_details": {"primary_action": "", "target_skill": "", "timeline_weeks": 4, "success_probability": "high|medium|low", "cost_estimate": "high|medium|low", "risk_level": "high|medium|low", "immediate_actions": []},
  "implementation_plan": {"primary_owner": "", "support_team": [], "timeline_weeks": 4, "key_milestones": [], "success_metrics": []},
  "risk_mitigation": {"primary_risks": [], "mitigation_strategies": [], "contingency_plan": ""},
  "alternative_strategies": [{"strategy_name": "", "approach": "", "selection_reason": "", "confidence_score": 0.5}]
}"#;

const ROUTING_SYSTEM: &str = r#"You are the Orchestrator for the GapLens skills analysis system.

Given the current state, determine the next step:
- analysis: analyze skill gaps and generate recommendations
- decision: make the final actionable recommendation
- done: workflow complete

Consider the flow: perception -> analysis -> decision -> done

Output ONLY one word: analysis|decision|done."#;

fn to_json(value: &impl serde::Serialize) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
}

pub fn perception_messages(state: &WorkflowState) -> Vec<Message> {
    let mut user = format!("User Input: {}", state.question.trim());
    if let Some(project_id) = &state.project_id {
        user.push_str(&format!("\nProject ID: {project_id}"));
    }
    if let Some(scope) = state.scope {
        user.push_str(&format!("\nRequested scope: {}", to_json(&scope).trim_matches('"')));
    }
    vec![Message::system(PERCEPTION_SYSTEM), Message::user(user)]
}

fn heading(key: &str) -> String {
    let mut words: Vec<String> = key
        .split(['_', '/'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect();
    if words.is_empty() {
        words.push(key.to_string());
    }
    words.join(" ")
}

pub fn analysis_messages(state: &WorkflowState, context: &StageContext) -> Vec<Message> {
    let question = match &state.project_id {
        Some(project_id) => format!(
            "Analyze ONLY the skill gaps for the specific project (ID: {project_id}) and recommend the best way to fill them. Focus on this project only, not all projects."
        ),
        None => "Consider all employees and their skills, the project requirements, the team composition and the skill market data, and recommend the best way to fill the skill gaps.".to_string(),
    };

    let mut user = format!("Question: {}\n{question}\n", state.effective_question());
    if let Some(focus) = &state.analysis_focus {
        user.push_str(&format!("Analysis focus: {focus}\n"));
    }
    if let Some(entities) = &state.entities {
        user.push_str(&format!("Entities: {}\n", to_json(entities)));
    }
    for (key, value) in context {
        user.push_str(&format!("\n### {}\n{}\n", heading(key), to_json(value)));
    }
    vec![Message::system(ANALYSIS_SYSTEM), Message::user(user)]
}

pub fn decision_messages(state: &WorkflowState, context: &StageContext) -> Vec<Message> {
    let analysis = state
        .analysis
        .as_ref()
        .map(to_json)
        .unwrap_or_else(|| "null".to_string());
    let mut user = format!(
        "Project Context: {}\nScope: {}\n",
        state.effective_question(),
        to_json(&state.effective_scope()).trim_matches('"')
    );
    if let Some(project_id) = &state.project_id {
        user.push_str(&format!("Project ID: {project_id}\n"));
    }
    user.push_str(&format!("Analysis: {analysis}"));
    for (key, value) in context {
        user.push_str(&format!("\n\n### {}\n{}", heading(key), to_json(value)));
    }
    vec![Message::system(DECISION_SYSTEM), Message::user(user)]
}

/// 路由 prompt；`completed:` 行列出已完成的阶段
pub fn routing_messages(state: &WorkflowState) -> Vec<Message> {
    let completed: Vec<&str> = state
        .completed_stages()
        .iter()
        .map(Stage::as_str)
        .collect();
    let user = format!(
        "completed: {}\nintent={}\nentities={}\nanalysis={}\ndecision={}",
        completed.join(","),
        state.intent.map(|i| to_json(&i)).unwrap_or_else(|| "null".into()),
        state.entities.as_ref().map(to_json).unwrap_or_else(|| "null".into()),
        if state.analysis.is_some() { "present" } else { "missing" },
        if state.decision.is_some() { "present" } else { "missing" },
    );
    vec![Message::system(ROUTING_SYSTEM), Message::user(user)]
}

/// 按阶段分派
pub fn stage_messages(stage: Stage, state: &WorkflowState, context: &StageContext) -> Vec<Message> {
    match stage {
        Stage::Perception => perception_messages(state),
        Stage::Analysis => analysis_messages(state, context),
        Stage::Decision => decision_messages(state, context),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use crate::schema::Intent;
    use serde_json::json;

    #[test]
    fn test_perception_prompt() {
        let mut state = WorkflowState::new("  Who can learn AWS?  ");
        state.project_id = Some("P-7".into());
        let msgs = perception_messages(&state);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, Role::System);
        assert!(msgs[1].content.contains("User Input: Who can learn AWS?"));
        assert!(msgs[1].content.contains("Project ID: P-7"));
    }

    #[test]
    fn test_analysis_prompt_includes_context_and_project_focus() {
        let mut state = WorkflowState::new("q");
        state.normalized_question = Some("Which skills are missing?".into());
        let mut context = StageContext::new();
        context.insert("team_composition".into(), json!({"teams": ["Platform"]}));
        context.insert("skill_market_data".into(), json!({"error": "Failed to fetch data: 500"}));

        let general = analysis_messages(&state, &context);
        assert!(general[1].content.contains("Which skills are missing?"));
        assert!(general[1].content.contains("### Team Composition"));
        assert!(general[1].content.contains("Failed to fetch data: 500"));
        assert!(general[1].content.contains("Consider all employees"));

        state.project_id = Some("42".into());
        let scoped = analysis_messages(&state, &context);
        assert!(scoped[1].content.contains("(ID: 42)"));
    }

    #[test]
    fn test_prompts_are_pure() {
        let state = WorkflowState::new("same");
        let context = StageContext::new();
        assert_eq!(decision_messages(&state, &context), decision_messages(&state, &context));
        assert_eq!(routing_messages(&state), routing_messages(&state));
    }

    #[test]
    fn test_routing_prompt_lists_completed() {
        let mut state = WorkflowState::new("q");
        state.intent = Some(Intent::SkillGapAnalysis);
        state.normalized_question = Some("q".into());
        let msgs = routing_messages(&state);
        assert!(msgs[0].content.contains("analysis|decision|done"));
        assert!(msgs[1].content.starts_with("completed: perception\n"));
        assert!(msgs[1].content.contains("analysis=missing"));
    }

    #[test]
    fn test_heading() {
        assert_eq!(heading("employee_skills"), "Employee Skills");
        assert_eq!(heading("project_skill_gaps/42"), "Project Skill Gaps 42");
    }
}
