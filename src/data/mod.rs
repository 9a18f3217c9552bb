//! 领域数据源：员工技能、项目需求、团队构成、技能市场数据
//!
//! fetch 永不返回 Err：请求失败时返回 `{"error": "..."}`，由调用方当作软失败处理。

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::DataSection;
use crate::core::EngineError;

pub const EMPLOYEE_SKILLS: &str = "employee_skills";
pub const PROJECT_REQUIREMENTS: &str = "project_requirements";
pub const TEAM_COMPOSITION: &str = "team_composition";
pub const SKILL_MARKET_DATA: &str = "skill_market_data";

/// 分析阶段默认拉取的资源
pub const ANALYSIS_RESOURCES: [&str; 4] = [
    EMPLOYEE_SKILLS,
    PROJECT_REQUIREMENTS,
    TEAM_COMPOSITION,
    SKILL_MARKET_DATA,
];

/// 单个项目：`project/<id>`
pub fn project_key(project_id: &str) -> String {
    format!("project/{project_id}")
}

/// 单个项目的技能缺口：`project_skill_gaps/<id>`
pub fn project_skill_gaps_key(project_id: &str) -> String {
    format!("project_skill_gaps/{project_id}")
}

/// 软失败：返回 error 字段内容
pub fn soft_error(value: &Value) -> Option<&str> {
    value.get("error").map(|e| e.as_str().unwrap_or("unspecified error"))
}

fn error_value(message: impl Into<String>) -> Value {
    json!({ "error": message.into() })
}

#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch(&self, resource_key: &str) -> Value;
}

/// 通过 HTTP 访问数据服务
pub struct HttpDataSource {
    client: reqwest::Client,
    base_url: String,
    endpoints: BTreeMap<String, String>,
}

impl HttpDataSource {
    pub fn new(section: &DataSection) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(section.timeout_secs.max(1)))
            .build()
            .map_err(|e| EngineError::Configuration(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: section.base_url.trim_end_matches('/').to_string(),
            endpoints: section.endpoints.clone(),
        })
    }

    /// 资源 key → 请求路径
    pub fn path_for(&self, resource_key: &str) -> Option<String> {
        if let Some(path) = self.endpoints.get(resource_key) {
            return Some(path.clone());
        }
        if let Some(id) = resource_key.strip_prefix("project_skill_gaps/") {
            return Some(format!("/api/analysis/project/{id}/skill-gaps"));
        }
        resource_key
            .strip_prefix("project/")
            .map(|id| format!("/api/projects/{id}"))
    }
}

#[async_trait]
impl DataSource for HttpDataSource {
    async fn fetch(&self, resource_key: &str) -> Value {
        let Some(path) = self.path_for(resource_key) else {
            return error_value(format!("Unknown resource: {resource_key}"));
        };
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(resource = resource_key, %url, "fetching domain data");

        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => return error_value(format!("Connection error: {e}")),
        };
        let status = response.status();
        if !status.is_success() {
            return error_value(format!("Failed to fetch data: {}", status.as_u16()));
        }
        match response.json::<Value>().await {
            Ok(v) => v,
            Err(e) => error_value(format!("Invalid response body: {e}")),
        }
    }
}

/// 内存数据源：未登记的 key 返回软失败
#[derive(Debug, Clone, Default)]
pub struct StaticDataSource {
    resources: HashMap<String, Value>,
}

impl StaticDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.resources.insert(key.into(), value);
        self
    }

    /// 一份小型示例数据集
    pub fn sample() -> Self {
        Self::new()
            .with(
                EMPLOYEE_SKILLS,
                json!({"employees": [
                    {"name": "John", "team": "Platform", "skills": [{"name": "Python", "level": "expert"}]},
                    {"name": "Sarah", "team": "DevOps", "skills": [{"name": "AWS", "level": "advanced"}, {"name": "Terraform", "level": "advanced"}]}
                ]}),
            )
            .with(
                PROJECT_REQUIREMENTS,
                json!({"projects": [{"id": "P-100", "name": "Cloud Migration", "required_skills": ["Python", "AWS"]}]}),
            )
            .with(
                TEAM_COMPOSITION,
                json!({"teams": [{"name": "Platform", "members": ["John"]}, {"name": "DevOps", "members": ["Sarah"]}]}),
            )
            .with(SKILL_MARKET_DATA, json!({"AWS": {"demand": "high", "avg_salary": 150000}}))
    }
}

#[async_trait]
impl DataSource for StaticDataSource {
    async fn fetch(&self, resource_key: &str) -> Value {
        self.resources
            .get(resource_key)
            .cloned()
            .unwrap_or_else(|| error_value(format!("No data available for resource: {resource_key}")))
    }
}
