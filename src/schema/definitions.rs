//! 三个 agent 的字段声明与兜底默认值
//!
//! 枚举取值与 types.rs 中的 serde 名称保持一致；兜底值只在这里定义一次。

use serde_json::json;

use crate::schema::spec::{FieldSpec, FieldType, SchemaSpec};
use crate::schema::types::AgentType;

pub const INTENTS: &[&str] = &[
    "skill_gap_analysis",
    "team_optimization",
    "upskilling_plan",
    "project_readiness",
    "unknown",
];
pub const LEVELS: &[&str] = &["high", "medium", "low"];
pub const SCOPES: &[&str] = &["department", "team", "company", "project"];
pub const AVAILABILITIES: &[&str] = &["immediate", "2_weeks", "1_month"];
pub const HIRING_URGENCIES: &[&str] = &["critical", "high", "medium"];
pub const STRATEGY_TYPES: &[&str] = &["upskill", "transfer", "hire", "mixed"];

const MAX_ENTITIES: usize = 20;
const MAX_SKILL_GAPS: usize = 20;
const MAX_RECOMMENDATIONS: usize = 10;
const MAX_ALTERNATIVES: usize = 5;

const WEEKS: FieldType = FieldType::Integer { min: 1, max: 104 };

fn text() -> FieldType {
    FieldType::Text { non_empty: true }
}

fn loose_text() -> FieldType {
    FieldType::Text { non_empty: false }
}

fn list(max_items: usize) -> FieldType {
    FieldType::TextList { max_items }
}

fn entity_list(name: &'static str) -> FieldSpec {
    FieldSpec::optional_with_default(name, list(MAX_ENTITIES), json!([]))
}

pub fn perception_spec() -> SchemaSpec {
    SchemaSpec::new(
        AgentType::Perception,
        vec![
            FieldSpec::required("intent", FieldType::Enum(INTENTS), json!("unknown")),
            FieldSpec::required(
                "entities",
                FieldType::Object(vec![
                    entity_list("skills"),
                    entity_list("projects"),
                    entity_list("teams"),
                    entity_list("people"),
                    entity_list("timelines"),
                ]),
                serde_json::Value::Null,
            ),
            FieldSpec::required("normalized_question", text(), json!("unknown")),
            FieldSpec::required(
                "context",
                FieldType::Object(vec![
                    FieldSpec::optional_with_default("constraints", list(MAX_RECOMMENDATIONS), json!([])),
                    FieldSpec::optional_with_default("urgency", FieldType::Enum(LEVELS), json!("medium")),
                    FieldSpec::optional_with_default("scope", FieldType::Enum(SCOPES), json!("company")),
                ]),
                serde_json::Value::Null,
            ),
            FieldSpec::required("analysis_focus", text(), json!("general")),
        ],
    )
}

pub fn analysis_spec() -> SchemaSpec {
    SchemaSpec::new(
        AgentType::Analysis,
        vec![
            FieldSpec::optional_with_default("skill_gaps", list(MAX_SKILL_GAPS), json!([])),
            FieldSpec::optional_with_default(
                "upskilling",
                FieldType::RecordList {
                    max_items: MAX_RECOMMENDATIONS,
                    fields: vec![
                        FieldSpec::required_no_default("employee", text()),
                        FieldSpec::required_no_default("skill_to_learn", text()),
                        FieldSpec::required("timeline_weeks", WEEKS, json!(4)),
                        FieldSpec::required("confidence", FieldType::Enum(LEVELS), json!("low")),
                        FieldSpec::optional_with_default("reason", loose_text(), json!("")),
                    ],
                },
                json!([]),
            ),
            FieldSpec::optional_with_default(
                "internal_transfers",
                FieldType::RecordList {
                    max_items: MAX_RECOMMENDATIONS,
                    fields: vec![
                        FieldSpec::required_no_default("employee", text()),
                        FieldSpec::required_no_default("current_team", text()),
                        FieldSpec::required("skills_brought", list(MAX_ENTITIES), json!([])),
                        FieldSpec::required(
                            "availability",
                            FieldType::Enum(AVAILABILITIES),
                            json!("1_month"),
                        ),
                        FieldSpec::optional_with_default("reason", loose_text(), json!("")),
                    ],
                },
                json!([]),
            ),
            FieldSpec::optional_with_default(
                "hiring",
                FieldType::RecordList {
                    max_items: MAX_RECOMMENDATIONS,
                    fields: vec![
                        FieldSpec::required_no_default("role", text()),
                        FieldSpec::required("required_skills", list(MAX_ENTITIES), json!([])),
                        FieldSpec::required("urgency", FieldType::Enum(HIRING_URGENCIES), json!("medium")),
                        FieldSpec::required("estimated_cost", text(), json!("unknown")),
                    ],
                },
                json!([]),
            ),
            FieldSpec::required(
                "timeline_assessment",
                text(),
                json!("Timeline could not be assessed."),
            ),
            FieldSpec::optional_with_default("risk_factors", list(MAX_RECOMMENDATIONS), json!([])),
            FieldSpec::required("success_probability", FieldType::Enum(LEVELS), json!("low")),
        ],
    )
}

pub fn decision_spec() -> SchemaSpec {
    let opt_list = |name| FieldSpec::optional(name, list(MAX_RECOMMENDATIONS));
    let opt_text = |name| FieldSpec::optional(name, text());

    SchemaSpec::new(
        AgentType::Decision,
        vec![
            FieldSpec::required(
                "natural_language_summary",
                text(),
                json!("No recommendation could be produced from the model output; review the analysis manually."),
            ),
            FieldSpec::required(
                "selected_strategy",
                FieldType::Object(vec![
                    FieldSpec::required("strategy_name", text(), json!("undetermined")),
                    FieldSpec::required("strategy_type", FieldType::Enum(STRATEGY_TYPES), json!("mixed")),
                    FieldSpec::required("confidence", FieldType::Enum(LEVELS), json!("low")),
                    FieldSpec::required("rationale", text(), json!("Model output could not be recovered.")),
                    opt_list("specific_people"),
                    opt_list("specific_skills"),
                    opt_text("comparison_details"),
                ]),
                serde_json::Value::Null,
            ),
            FieldSpec::required(
                "strategy_details",
                FieldType::Object(vec![
                    FieldSpec::required(
                        "primary_action",
                        text(),
                        json!("Review the skill gap analysis manually."),
                    ),
                    opt_text("target_skill"),
                    FieldSpec::optional("timeline_weeks", WEEKS),
                    FieldSpec::optional("success_probability", FieldType::Enum(LEVELS)),
                    FieldSpec::optional("cost_estimate", FieldType::Enum(LEVELS)),
                    FieldSpec::optional("risk_level", FieldType::Enum(LEVELS)),
                    opt_list("specific_recommendations"),
                    opt_list("why_not_alternatives"),
                    opt_list("immediate_actions"),
                ]),
                serde_json::Value::Null,
            ),
            FieldSpec::optional(
                "implementation_plan",
                FieldType::Object(vec![
                    opt_text("primary_owner"),
                    opt_list("support_team"),
                    FieldSpec::optional("timeline_weeks", WEEKS),
                    opt_list("key_milestones"),
                    opt_list("success_metrics"),
                    opt_text("budget_estimate"),
                    opt_list("resource_requirements"),
                ]),
            ),
            FieldSpec::optional(
                "risk_mitigation",
                FieldType::Object(vec![
                    opt_list("primary_risks"),
                    opt_list("mitigation_strategies"),
                    opt_text("contingency_plan"),
                    opt_list("monitoring_points"),
                ]),
            ),
            FieldSpec::optional(
                "review_schedule",
                FieldType::Object(vec![
                    opt_text("next_review_date"),
                    opt_text("review_frequency"),
                    opt_list("success_criteria"),
                ]),
            ),
            FieldSpec::optional(
                "alternative_strategies",
                FieldType::RecordList {
                    max_items: MAX_ALTERNATIVES,
                    fields: vec![
                        FieldSpec::required_no_default("strategy_name", text()),
                        FieldSpec::required_no_default("approach", text()),
                        FieldSpec::required_no_default("selection_reason", text()),
                        FieldSpec::required(
                            "confidence_score",
                            FieldType::Number { min: 0.0, max: 1.0 },
                            json!(0.0),
                        ),
                    ],
                },
            ),
            FieldSpec::optional("specific_people_recommendations", FieldType::TextMap),
            FieldSpec::optional("timeline_breakdown", FieldType::TextMap),
            opt_list("success_factors"),
            opt_list("potential_obstacles"),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::{
        AnalysisOutput, Availability, DecisionOutput, HiringUrgency, Intent, Level, PerceptionOutput,
        Scope, StrategyType,
    };

    fn all_parse<T: serde::de::DeserializeOwned>(values: &[&str]) {
        for v in values {
            assert!(serde_json::from_value::<T>(json!(v)).is_ok(), "'{v}' does not deserialize");
        }
    }

    #[test]
    fn test_enum_tables_match_types() {
        all_parse::<Intent>(INTENTS);
        all_parse::<Level>(LEVELS);
        all_parse::<Scope>(SCOPES);
        all_parse::<Availability>(AVAILABILITIES);
        all_parse::<HiringUrgency>(HIRING_URGENCIES);
        all_parse::<StrategyType>(STRATEGY_TYPES);
    }

    #[test]
    fn test_default_records_deserialize_and_validate() {
        let p = perception_spec();
        let a = analysis_spec();
        let d = decision_spec();

        assert!(p.check(&p.default_record()).is_empty());
        assert!(a.check(&a.default_record()).is_empty());
        assert!(d.check(&d.default_record()).is_empty());

        let perception: PerceptionOutput = serde_json::from_value(p.default_record()).unwrap();
        assert_eq!(perception.intent, Intent::Unknown);
        assert!(perception.entities.is_empty());

        let analysis: AnalysisOutput = serde_json::from_value(a.default_record()).unwrap();
        assert!(analysis.skill_gaps.is_empty());
        assert_eq!(analysis.success_probability, Level::Low);

        let decision: DecisionOutput = serde_json::from_value(d.default_record()).unwrap();
        assert_eq!(decision.selected_strategy.confidence, Level::Low);
        assert!(decision.implementation_plan.is_none());
    }
}
