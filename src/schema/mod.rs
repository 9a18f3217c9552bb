//! Agent 输出 schema：强类型记录、字段描述、注册表与恢复状态

pub mod definitions;
pub mod record;
pub mod registry;
pub mod spec;
pub mod types;

pub use record::{RecoveredRecord, RecoveryStatus, RecoveryStrategy};
pub use registry::SchemaRegistry;
pub use spec::{FieldSpec, FieldType, SchemaSpec, Violation};
pub use types::{
    AgentPayload, AgentSchema, AgentType, AnalysisOutput, DecisionOutput, Intent, Level,
    PerceptionOutput, Scope,
};
