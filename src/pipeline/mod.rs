/// 追踪流水线 (Tracking Pipeline)
///
/// 线程架构,通过crossbeam通道通信:
/// - 帧源线程:   推送帧 (外部, 可丢帧)
/// - 检测线程:   单飞调用检测器 → DetectionBatch
/// - 追踪线程:   唯一持有 SessionController 的消费者
pub mod rate;
pub mod runtime;
pub mod session;

pub use rate::RateController;
pub use runtime::{spawn, PipelineHandle};
pub use session::{FrameDecision, SessionController};

use serde::Serialize;

use crate::detection::{NormalizedRect, Track, TrackId};

// ========== 通道消息类型定义 ==========

/// 配置与控制消息 (展示层 → 追踪线程)
#[derive(Clone, Debug, PartialEq)]
pub enum ControlMessage {
    Start,
    Stop,
    SetTargetFrequency(f64),
    SetMaxDisappearedFrameCount(i64),
    SetMaxNormalizedDistance(f32),
    SetConfidenceThreshold(f32),
    Shutdown,
}

/// 单个轨迹的展示数据
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrackView {
    pub id: TrackId,
    /// 不可见时为空
    pub bbox: Option<NormalizedRect>,
    pub color: (u8, u8, u8),
}

/// 追踪快照 (追踪线程 → 展示层)
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrackingSnapshot {
    pub epoch: u64,
    pub is_tracking: bool,
    pub tracks: Vec<TrackView>,
    /// 本次更新中被淘汰的ID
    pub newly_evicted: Vec<TrackId>,
    pub active_count: usize,
    pub evicted_count: usize,
    pub average_tracked_seconds: f64,
}

/// 会话报告 (追踪线程退出时返回)
#[derive(Clone, Debug, Default, Serialize)]
pub struct SessionReport {
    pub active: Vec<Track>,
    pub history: Vec<Track>,
    pub average_tracked_seconds: f64,
    pub frames_seen: u64,
    pub frames_submitted: u64,
    pub frames_dropped_busy: u64,
    pub detection_failures: u64,
    pub batches_applied: u64,
    pub batches_discarded: u64,
}
