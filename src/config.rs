//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `GAPLENS__*` 覆盖（双下划线表示嵌套，如 `GAPLENS__LLM__PROVIDER=openai`）。

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub data: DataSection,
    pub memory: MemorySection,
    pub workflow: WorkflowSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    #[serde(default = "default_app_name")]
    pub name: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: default_app_name(),
        }
    }
}

fn default_app_name() -> String {
    "GapLens".to_string()
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：deepseek / openai / mock；实际选择还取决于有没有 API Key
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default)]
    pub deepseek: LlmDeepSeekSection,
    #[serde(default)]
    pub openai: LlmOpenAiSection,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            deepseek: LlmDeepSeekSection::default(),
            openai: LlmOpenAiSection::default(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "deepseek".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmDeepSeekSection {
    pub model: Option<String>,
    /// 决策阶段使用的推理模型（如 deepseek-reasoner）；未设置时与其他阶段共用
    pub reasoner_model: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmOpenAiSection {
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    /// 单次模型调用超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

impl LlmTimeoutsSection {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request.max(1))
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [data] 段：领域数据服务
#[derive(Debug, Clone, Deserialize)]
pub struct DataSection {
    #[serde(default = "default_data_base_url")]
    pub base_url: String,
    #[serde(default = "default_data_timeout")]
    pub timeout_secs: u64,
    /// 资源 key → 路径
    #[serde(default = "default_endpoints")]
    pub endpoints: BTreeMap<String, String>,
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            base_url: default_data_base_url(),
            timeout_secs: default_data_timeout(),
            endpoints: default_endpoints(),
        }
    }
}

fn default_data_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_data_timeout() -> u64 {
    10
}

fn default_endpoints() -> BTreeMap<String, String> {
    [
        ("employee_skills", "/api/employees/skills"),
        ("project_requirements", "/api/projects"),
        ("team_composition", "/api/teams/composition"),
        ("skill_market_data", "/api/skills/market-data"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// [memory] 段：会话存储
#[derive(Debug, Clone, Deserialize)]
pub struct MemorySection {
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default = "default_auto_cleanup")]
    pub auto_cleanup: bool,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            retention_days: default_retention_days(),
            auto_cleanup: default_auto_cleanup(),
        }
    }
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("infrastructure/memory")
}

fn default_retention_days() -> u32 {
    30
}

fn default_auto_cleanup() -> bool {
    true
}

/// [workflow] 段
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkflowSection {
    /// deterministic（默认）或 model
    #[serde(default)]
    pub routing: RoutingSetting,
    /// 是否在日志中逐条打印推理步骤
    #[serde(default)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingSetting {
    #[default]
    Deterministic,
    Model,
}

/// 从 config 目录加载配置，环境变量 GAPLENS__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 GAPLENS__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default", "default"] {
        if std::path::Path::new(&format!("{name}.toml")).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("GAPLENS")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.app.name, "GapLens");
        assert_eq!(cfg.llm.timeouts.request, 60);
        assert_eq!(cfg.data.base_url, "http://localhost:8000");
        assert_eq!(cfg.data.timeout_secs, 10);
        assert_eq!(cfg.data.endpoints["team_composition"], "/api/teams/composition");
        assert_eq!(cfg.memory.retention_days, 30);
        assert!(cfg.memory.auto_cleanup);
        assert_eq!(cfg.workflow.routing, RoutingSetting::Deterministic);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gaplens.toml");
        std::fs::write(
            &path,
            r#"
[llm]
provider = "mock"

[llm.timeouts]
request = 5

[memory]
storage_dir = "/tmp/gaplens"
retention_days = 7

[workflow]
routing = "model"
"#,
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.llm.provider, "mock");
        assert_eq!(cfg.llm.timeouts.request_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.memory.retention_days, 7);
        assert_eq!(cfg.workflow.routing, RoutingSetting::Model);
        // 未出现的段保持默认
        assert_eq!(cfg.data.endpoints.len(), 4);
    }
}
