//! 会话控制 (Session Controller)
//!
//! 持有追踪器、速率控制和检测调度; 负责开始/停止生命周期。
//! 每次开始都会递增会话代数 (epoch), 旧代数的检测结果到达时直接丢弃。

use tracing::{debug, info, warn};

use super::rate::RateController;
use super::{ControlMessage, SessionReport, TrackView, TrackingSnapshot};
use crate::config::TrackingConfig;
use crate::detection::{
    id_to_color, CentroidTracker, DetectionBatch, DetectionScheduler, Submission, Tracker,
    TrackerParams, TrackerUpdate,
};
use crate::error::ConfigRejected;

/// 一帧的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDecision {
    /// 未在追踪
    Inactive,
    /// 没有许可
    NoPermit,
    Submitted,
    /// 检测器忙, 帧被丢弃
    DetectorBusy,
}

pub struct SessionController<F> {
    tracker: CentroidTracker,
    rate: RateController,
    scheduler: DetectionScheduler<F>,
    confidence_threshold: f32,
    active: bool,
    epoch: u64,

    // 统计
    frames_seen: u64,
    batches_applied: u64,
    batches_discarded: u64,
    last_evicted: Vec<u64>,
}

impl<F: Send + 'static> SessionController<F> {
    pub fn new(config: &TrackingConfig, scheduler: DetectionScheduler<F>) -> Self {
        let mut session = Self {
            tracker: CentroidTracker::new(TrackerParams::default()),
            rate: RateController::new(config.max_frequency_hz),
            scheduler,
            confidence_threshold: 0.0,
            active: false,
            epoch: 0,
            frames_seen: 0,
            batches_applied: 0,
            batches_discarded: 0,
            last_evicted: Vec::new(),
        };
        // 配置文件中的值走运行时同样的截断/拒绝规则
        for message in config.control_messages() {
            session.apply_control(message);
        }
        session
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn tracker(&self) -> &CentroidTracker {
        &self.tracker
    }

    pub fn rate(&self) -> &RateController {
        &self.rate
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    /// 开始追踪: 清空活跃轨迹 (淘汰历史保留), 启动速率控制
    pub fn start(&mut self) {
        if self.active {
            return;
        }
        self.epoch += 1;
        self.tracker.reset();
        self.last_evicted.clear();
        self.rate.start();
        self.active = true;
        info!("🚀 追踪会话 #{} 开始", self.epoch);
    }

    /// 停止追踪: 在途检测允许完成, 但结果会被丢弃
    pub fn stop(&mut self) {
        if !self.active {
            return;
        }
        self.rate.stop();
        self.active = false;
        info!(
            "⏹️ 追踪会话 #{} 停止 | 活跃{} | 已淘汰{}",
            self.epoch,
            self.tracker.active_count(),
            self.tracker.evicted_count()
        );
    }

    /// 帧源 → 速率控制 → 检测调度
    pub fn offer_frame(&mut self, frame: F) -> FrameDecision {
        self.frames_seen += 1;
        if !self.active {
            return FrameDecision::Inactive;
        }
        if !self.rate.try_admit() {
            return FrameDecision::NoPermit;
        }
        match self.scheduler.submit(frame, self.epoch) {
            Submission::Accepted => FrameDecision::Submitted,
            Submission::DroppedBusy => FrameDecision::DetectorBusy,
        }
    }

    /// 应用一个检测批次; 会话已停止或批次过期时返回 None
    pub fn apply_batch(&mut self, batch: DetectionBatch) -> Option<TrackerUpdate> {
        if !self.active || batch.epoch != self.epoch {
            self.batches_discarded += 1;
            debug!(
                "🗑️ 丢弃过期批次 #{} (epoch {} / 当前 {})",
                batch.sequence, batch.epoch, self.epoch
            );
            return None;
        }

        let update = self.tracker.update(&batch.candidates, self.confidence_threshold);
        self.batches_applied += 1;
        self.last_evicted.clone_from(&update.evicted);
        Some(update)
    }

    /// 路由运行时配置; 非法值记录警告并保留旧值
    pub fn apply_control(&mut self, message: ControlMessage) {
        let result: Result<(), ConfigRejected> = match message {
            ControlMessage::Start => {
                self.start();
                Ok(())
            }
            ControlMessage::Stop | ControlMessage::Shutdown => {
                self.stop();
                Ok(())
            }
            ControlMessage::SetTargetFrequency(hz) => self.rate.set_target_frequency(hz).map(|hz| {
                info!("⏱️ 检测频率: {:.2}Hz", hz);
            }),
            ControlMessage::SetMaxDisappearedFrameCount(count) => {
                self.tracker.set_max_disappeared_frame_count(count).map(|count| {
                    info!("👻 遮挡容忍帧数: {}", count);
                })
            }
            ControlMessage::SetMaxNormalizedDistance(distance) => {
                self.tracker.set_max_normalized_distance(distance).map(|distance| {
                    info!("📏 最大匹配距离: {:.3}", distance);
                })
            }
            ControlMessage::SetConfidenceThreshold(threshold) => {
                self.set_confidence_threshold(threshold).map(|threshold| {
                    info!("🎚️ 置信度阈值: {:.2}", threshold);
                })
            }
        };

        if let Err(e) = result {
            warn!("⚠️ 配置被拒绝, 保留原值: {}", e);
        }
    }

    /// 置信度阈值截断到 [0, 1]
    pub fn set_confidence_threshold(&mut self, threshold: f32) -> Result<f32, ConfigRejected> {
        if threshold.is_nan() {
            return Err(ConfigRejected::new("confidence_threshold", threshold, "not a number"));
        }
        self.confidence_threshold = threshold.clamp(0.0, 1.0);
        Ok(self.confidence_threshold)
    }

    /// 展示层快照
    pub fn snapshot(&self) -> TrackingSnapshot {
        let tracks = self
            .tracker
            .active()
            .map(|track| TrackView {
                id: track.id,
                bbox: track.current_box,
                color: id_to_color(track.id),
            })
            .collect();

        TrackingSnapshot {
            epoch: self.epoch,
            is_tracking: self.active,
            tracks,
            newly_evicted: self.last_evicted.clone(),
            active_count: self.tracker.active_count(),
            evicted_count: self.tracker.evicted_count(),
            average_tracked_seconds: self.tracker.average_tracked_seconds(),
        }
    }

    pub fn into_report(self) -> SessionReport {
        SessionReport {
            active: self.tracker.active().cloned().collect(),
            history: self.tracker.eviction_history().to_vec(),
            average_tracked_seconds: self.tracker.average_tracked_seconds(),
            frames_seen: self.frames_seen,
            frames_submitted: self.scheduler.submitted(),
            frames_dropped_busy: self.scheduler.dropped_busy(),
            detection_failures: self.scheduler.failures(),
            batches_applied: self.batches_applied,
            batches_discarded: self.batches_discarded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{DetectionCandidate, NormalizedRect};
    use crate::error::DetectionError;
    use std::time::Duration;

    fn batch(epoch: u64, centers: &[(f32, f32)]) -> DetectionBatch {
        DetectionBatch {
            epoch,
            sequence: 0,
            candidates: centers
                .iter()
                .map(|&(x, y)| DetectionCandidate::new(NormalizedRect::from_center(x, y, 0.1, 0.1), 0.9))
                .collect(),
            latency: Duration::ZERO,
        }
    }

    fn session(config: &TrackingConfig) -> SessionController<u32> {
        let (batch_tx, _batch_rx) = crossbeam_channel::unbounded();
        let detector = |_: &u32| -> Result<Vec<DetectionCandidate>, DetectionError> { Ok(Vec::new()) };
        let scheduler = DetectionScheduler::new(detector, batch_tx).unwrap();
        SessionController::new(config, scheduler)
    }

    #[test]
    fn test_inactive_session_ignores_frames_and_batches() {
        let mut s = session(&TrackingConfig::default());
        assert_eq!(s.offer_frame(1), FrameDecision::Inactive);
        assert!(s.apply_batch(batch(0, &[(0.5, 0.5)])).is_none());
        assert_eq!(s.tracker().active_count(), 0);
    }

    #[test]
    fn test_restart_clears_active_keeps_history() {
        let config = TrackingConfig {
            max_disappeared_frame_count: 1,
            ..TrackingConfig::default()
        };
        let mut s = session(&config);
        s.start();
        let epoch = s.epoch();
        s.apply_batch(batch(epoch, &[(0.2, 0.2), (0.8, 0.8)]));
        s.apply_batch(batch(epoch, &[(0.2, 0.2)]));
        let update = s.apply_batch(batch(epoch, &[(0.2, 0.2)]));
        assert_eq!(update.map(|u| u.evicted), Some(vec![1]));
        assert_eq!(s.snapshot().newly_evicted, vec![1]);

        s.stop();
        s.start();
        assert_eq!(s.epoch(), epoch + 1);
        assert_eq!(s.tracker().active_count(), 0);
        assert_eq!(s.tracker().evicted_count(), 1);

        // ID在重启后继续递增
        let update = s.apply_batch(batch(s.epoch(), &[(0.5, 0.5)]));
        assert_eq!(update.map(|u| u.registered), Some(vec![2]));
    }

    #[test]
    fn test_stale_batch_is_discarded() {
        let mut s = session(&TrackingConfig::default());
        s.start();
        let old = s.epoch();
        s.stop();
        assert!(s.apply_batch(batch(old, &[(0.5, 0.5)])).is_none());
        s.start();
        assert!(s.apply_batch(batch(old, &[(0.5, 0.5)])).is_none());
        assert_eq!(s.tracker().active_count(), 0);
        assert!(s.apply_batch(batch(s.epoch(), &[(0.5, 0.5)])).is_some());
        assert_eq!(s.into_report().batches_discarded, 2);
    }

    #[test]
    fn test_control_messages_apply_policies() {
        let mut s = session(&TrackingConfig::default());
        s.apply_control(ControlMessage::SetTargetFrequency(-5.0));
        assert_eq!(s.rate().target_frequency_hz(), 0.0);

        s.apply_control(ControlMessage::SetMaxDisappearedFrameCount(4));
        s.apply_control(ControlMessage::SetMaxDisappearedFrameCount(0));
        s.apply_control(ControlMessage::SetMaxDisappearedFrameCount(-1));
        assert_eq!(s.tracker().params().max_disappeared_frame_count, 4);

        s.apply_control(ControlMessage::SetMaxNormalizedDistance(2.0));
        assert_eq!(
            s.tracker().params().max_normalized_distance,
            crate::detection::MAX_NORMALIZED_DISTANCE
        );

        s.apply_control(ControlMessage::SetConfidenceThreshold(1.5));
        assert_eq!(s.confidence_threshold(), 1.0);
        s.apply_control(ControlMessage::SetConfidenceThreshold(f32::NAN));
        assert_eq!(s.confidence_threshold(), 1.0);
    }

    #[test]
    fn test_confidence_threshold_filters_batches() {
        let config = TrackingConfig {
            confidence_threshold: 0.95,
            ..TrackingConfig::default()
        };
        let mut s = session(&config);
        s.start();
        let update = s.apply_batch(batch(s.epoch(), &[(0.5, 0.5)]));
        assert_eq!(update.map(|u| u.registered.len()), Some(0));
    }
}
