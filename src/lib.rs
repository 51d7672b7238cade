// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 追踪配置参数
pub mod detection; // 检测调度与质心追踪
pub mod error; // 错误类型
pub mod input; // 演示用帧源与检测器
pub mod pipeline; // 速率控制、会话与追踪线程

pub use crate::config::TrackingConfig;
pub use crate::detection::{
    CentroidTracker, DetectionCandidate, Detector, NormalizedRect, Track, TrackId, TrackState,
};
pub use crate::error::{ConfigRejected, DetectionError};
pub use crate::pipeline::{ControlMessage, PipelineHandle, SessionReport, TrackingSnapshot};
