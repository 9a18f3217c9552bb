//! 工作流：类型、状态机与驱动

pub mod driver;
pub mod machine;
pub mod types;

pub use driver::WorkflowDriver;
pub use machine::{PhaseRouter, RoutingMode, StateMachine};
pub use types::{Phase, RunOutcome, RunRequest, Stage, StepMarker, StepOutcome, WorkflowState};
