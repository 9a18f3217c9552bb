//! 恢复后的记录：状态 + 命中的策略 + 强类型负载

use std::fmt;

use serde::{Deserialize, Serialize};

/// 恢复结果状态，始终随记录向下游传递
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStatus {
    /// 解析后直接通过 schema 校验
    Validated,
    /// 经过字段级修正后通过校验
    Cleaned,
    /// 恢复失败，使用了规范兜底记录
    Fallback,
}

impl RecoveryStatus {
    /// 写入 MemoryEntry 的置信度
    pub fn confidence(&self) -> f64 {
        match self {
            RecoveryStatus::Validated => 1.0,
            RecoveryStatus::Cleaned => 0.6,
            RecoveryStatus::Fallback => 0.1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryStatus::Validated => "validated",
            RecoveryStatus::Cleaned => "cleaned",
            RecoveryStatus::Fallback => "fallback",
        }
    }
}

impl fmt::Display for RecoveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 恢复管线中按顺序尝试的结构化解析策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    DirectParse,
    FenceStrip,
    BraceExtraction,
    RegexScan,
    AlternateSyntax,
    PunctuationRepair,
}

impl RecoveryStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryStrategy::DirectParse => "direct_parse",
            RecoveryStrategy::FenceStrip => "fence_strip",
            RecoveryStrategy::BraceExtraction => "brace_extraction",
            RecoveryStrategy::RegexScan => "regex_scan",
            RecoveryStrategy::AlternateSyntax => "alternate_syntax",
            RecoveryStrategy::PunctuationRepair => "punctuation_repair",
        }
    }
}

impl fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 恢复管线的输出；Fallback 时 strategy 为 None
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveredRecord<T> {
    pub status: RecoveryStatus,
    pub strategy: Option<RecoveryStrategy>,
    pub payload: T,
}

impl<T> RecoveredRecord<T> {
    pub fn fallback(payload: T) -> Self {
        Self {
            status: RecoveryStatus::Fallback,
            strategy: None,
            payload,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.status == RecoveryStatus::Fallback
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> RecoveredRecord<U> {
        RecoveredRecord {
            status: self.status,
            strategy: self.strategy,
            payload: f(self.payload),
        }
    }
}
