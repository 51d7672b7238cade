/// 检测系统 (Detection System)
///
/// - Detector:  外部检测器接口 + 单飞调度 (独立工作线程)
/// - Tracker:   质心多目标跟踪
/// - Types:     归一化几何与轨迹数据结构
pub mod detector;
pub mod tracker;
pub mod types;

pub use detector::{DetectionBatch, DetectionScheduler, Detector, Submission};
pub use tracker::{id_to_color, CentroidTracker, Tracker, TrackerParams, TrackerUpdate};
pub use types::{
    Centroid, DetectionCandidate, ImageRect, NormalizedRect, Origin, Track, TrackId, TrackState,
    MAX_NORMALIZED_DISTANCE,
};
