//! 错误类型 (Error taxonomy)
//!
//! 核心中没有致命错误: 检测失败只丢弃一批结果, 非法配置保留旧值。

use thiserror::Error;

/// 检测器调用失败 (批次被丢弃, 追踪器状态不变)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectionError {
    #[error("detector failed: {0}")]
    Failed(String),

    #[error("detector returned no usable result")]
    NoResult,
}

/// 运行时配置被拒绝 (保留之前的有效值)
#[derive(Debug, Clone, PartialEq, Error)]
#[error("rejected {parameter} = {value}: {reason}")]
pub struct ConfigRejected {
    pub parameter: &'static str,
    pub value: String,
    pub reason: &'static str,
}

impl ConfigRejected {
    pub fn new(parameter: &'static str, value: impl ToString, reason: &'static str) -> Self {
        Self {
            parameter,
            value: value.to_string(),
            reason,
        }
    }
}
