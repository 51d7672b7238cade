// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 质心多目标跟踪
//! Centroid-based multi-object tracking
//!
//! 贪心最近邻匹配 + 有限遮挡容忍。无运动模型, 重新出现的目标
//! 与最后一次匹配的质心比较。

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use tracing::{debug, trace, warn};

use super::types::{Centroid, DetectionCandidate, Track, TrackId, TrackState, MAX_NORMALIZED_DISTANCE};
use crate::error::ConfigRejected;

// ========== 跟踪器统一接口 ==========

/// 多目标跟踪器 Trait
pub trait Tracker {
    /// 更新跟踪器 (每个检测批次调用一次, 不可重入)
    ///
    /// # 参数
    /// - `candidates`: 本批次的检测候选框
    /// - `confidence_threshold`: 置信度严格大于该值的候选框才参与跟踪
    fn update(&mut self, candidates: &[DetectionCandidate], confidence_threshold: f32) -> TrackerUpdate;

    /// 重置跟踪器 (清除所有活跃轨迹)
    fn reset(&mut self);

    /// 获取当前跟踪数量
    fn track_count(&self) -> usize;
}

/// 单次更新的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackerUpdate {
    /// 本帧可见的ID (匹配 + 新注册)
    pub visible: Vec<TrackId>,
    /// 本帧新注册的ID
    pub registered: Vec<TrackId>,
    /// 本帧被淘汰的ID (大多数时候为空)
    pub evicted: Vec<TrackId>,
}

// ========== 参数 ==========

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerParams {
    /// 遮挡容忍帧数 (超过即淘汰)
    pub max_disappeared_frame_count: u32,
    /// 匹配最大归一化距离 (含边界)
    pub max_normalized_distance: f32,
}

impl Default for TrackerParams {
    fn default() -> Self {
        Self {
            max_disappeared_frame_count: 10,
            max_normalized_distance: 0.2,
        }
    }
}

// ========== 质心跟踪器 ==========

pub struct CentroidTracker {
    params: TrackerParams,
    next_id: TrackId,
    active: BTreeMap<TrackId, Track>,
    visible: BTreeSet<TrackId>,
    history: Vec<Track>,
}

impl Default for CentroidTracker {
    fn default() -> Self {
        Self::new(TrackerParams::default())
    }
}

impl CentroidTracker {
    pub fn new(params: TrackerParams) -> Self {
        let mut tracker = Self {
            params: TrackerParams::default(),
            next_id: 0,
            active: BTreeMap::new(),
            visible: BTreeSet::new(),
            history: Vec::new(),
        };
        // 构造时的参数走同样的校验, 非法值保留默认值
        if let Err(e) = tracker.set_max_disappeared_frame_count(i64::from(params.max_disappeared_frame_count)) {
            warn!("⚠️ 跟踪参数被拒绝, 使用默认值: {}", e);
        }
        if let Err(e) = tracker.set_max_normalized_distance(params.max_normalized_distance) {
            warn!("⚠️ 跟踪参数被拒绝, 使用默认值: {}", e);
        }
        tracker
    }

    pub fn params(&self) -> TrackerParams {
        self.params
    }

    /// 设置遮挡容忍帧数, 非正数被拒绝
    ///
    /// 低于现有轨迹丢失帧数的新值在下一次更新时生效。
    pub fn set_max_disappeared_frame_count(&mut self, count: i64) -> Result<u32, ConfigRejected> {
        if count <= 0 {
            return Err(ConfigRejected::new(
                "max_disappeared_frame_count",
                count,
                "must be a positive integer",
            ));
        }
        let count = u32::try_from(count).unwrap_or(u32::MAX);
        self.params.max_disappeared_frame_count = count;
        Ok(count)
    }

    /// 设置最大匹配距离, 截断到 [0, √2]
    pub fn set_max_normalized_distance(&mut self, distance: f32) -> Result<f32, ConfigRejected> {
        if distance.is_nan() {
            return Err(ConfigRejected::new("max_normalized_distance", distance, "not a number"));
        }
        let distance = distance.clamp(0.0, MAX_NORMALIZED_DISTANCE);
        self.params.max_normalized_distance = distance;
        Ok(distance)
    }

    /// 带显式时钟的更新
    pub fn update_at(
        &mut self,
        candidates: &[DetectionCandidate],
        confidence_threshold: f32,
        now: DateTime<Utc>,
    ) -> TrackerUpdate {
        // 1. 置信度过滤 + 质心
        let candidates: Vec<(&DetectionCandidate, Centroid)> = candidates
            .iter()
            .filter(|c| c.confidence > confidence_threshold)
            .map(|c| (c, c.bbox.centroid()))
            .collect();

        self.visible.clear();
        let mut outcome = TrackerUpdate::default();

        // 2-3. 全局贪心最近邻: 按 (距离, TrackID, 候选序号) 排序后依次绑定
        let max_distance = self.params.max_normalized_distance;
        let mut pairs: Vec<(f32, TrackId, usize)> = Vec::new();
        for (id, track) in &self.active {
            for (ci, (_, centroid)) in candidates.iter().enumerate() {
                let distance = track.last_centroid.distance(centroid);
                if distance <= max_distance {
                    pairs.push((distance, *id, ci));
                }
            }
        }
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

        let mut candidate_bound = vec![false; candidates.len()];
        let mut track_bound: BTreeSet<TrackId> = BTreeSet::new();

        // 4. 匹配成功的轨迹
        for (distance, id, ci) in pairs {
            if candidate_bound[ci] || track_bound.contains(&id) {
                continue;
            }
            candidate_bound[ci] = true;
            track_bound.insert(id);

            let (candidate, centroid) = candidates[ci];
            if let Some(track) = self.active.get_mut(&id) {
                track.current_box = Some(candidate.bbox);
                track.last_centroid = centroid;
                track.last_seen_at = now;
                track.missed_frame_count = 0;
                track.state = TrackState::Tracked;
                trace!("🔗 T{} ↔ det#{} (dist={:.3})", id, ci, distance);
            }
            self.visible.insert(id);
        }

        // 5. 未匹配的候选框 → 新轨迹
        for (ci, (candidate, _)) in candidates.iter().enumerate() {
            if candidate_bound[ci] {
                continue;
            }
            let id = self.next_id;
            self.next_id += 1;
            self.active.insert(id, Track::new(id, candidate.bbox, now));
            self.visible.insert(id);
            outcome.registered.push(id);
            debug!("🆕 新轨迹 T{} (conf={:.2})", id, candidate.confidence);
        }

        // 6. 未匹配的轨迹 → 遮挡计数, 超限淘汰
        let max_missed = self.params.max_disappeared_frame_count;
        let unmatched: Vec<TrackId> = self
            .active
            .keys()
            .copied()
            .filter(|id| !self.visible.contains(id))
            .collect();
        for id in unmatched {
            let Some(track) = self.active.get_mut(&id) else {
                continue;
            };
            track.missed_frame_count = track.missed_frame_count.saturating_add(1);
            track.current_box = None;
            track.state = TrackState::TemporarilyOccluded;

            if track.missed_frame_count > max_missed {
                if let Some(mut track) = self.active.remove(&id) {
                    track.state = TrackState::Evicted;
                    debug!(
                        "👋 淘汰轨迹 T{} (丢失{}帧, 跟踪{:.2}s)",
                        id,
                        track.missed_frame_count,
                        track.tracked_seconds()
                    );
                    self.history.push(track);
                    outcome.evicted.push(id);
                }
            }
        }

        outcome.visible = self.visible.iter().copied().collect();
        outcome
    }

    /// 清空活跃轨迹 (淘汰历史保留, ID计数器不重置)
    pub fn clear_active(&mut self) {
        self.active.clear();
        self.visible.clear();
    }

    // ========== 只读快照 ==========

    pub fn active(&self) -> impl Iterator<Item = &Track> {
        self.active.values()
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.active.get(&id)
    }

    pub fn visible(&self) -> &BTreeSet<TrackId> {
        &self.visible
    }

    /// 淘汰历史 (按淘汰顺序, 只追加)
    pub fn eviction_history(&self) -> &[Track] {
        &self.history
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn evicted_count(&self) -> usize {
        self.history.len()
    }

    /// 所有轨迹 (活跃 + 已淘汰) 的平均跟踪时长, 无轨迹时为0
    pub fn average_tracked_seconds(&self) -> f64 {
        let count = self.active.len() + self.history.len();
        if count == 0 {
            return 0.0;
        }
        let total: f64 = self
            .active
            .values()
            .chain(self.history.iter())
            .map(Track::tracked_seconds)
            .sum();
        total / count as f64
    }
}

impl Tracker for CentroidTracker {
    fn update(&mut self, candidates: &[DetectionCandidate], confidence_threshold: f32) -> TrackerUpdate {
        self.update_at(candidates, confidence_threshold, Utc::now())
    }

    fn reset(&mut self) {
        self.clear_active();
    }

    fn track_count(&self) -> usize {
        self.active.len()
    }
}

// ========== 工具函数 ==========

/// 根据ID生成不同颜色
pub fn id_to_color(id: TrackId) -> (u8, u8, u8) {
    let hue = (id as f32 * 137.508) % 360.0; // 黄金角度采样
    hsv_to_rgb(hue, 0.8, 0.9)
}

/// HSV转RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (u8, u8, u8) {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = match h {
        h if h < 60.0 => (c, x, 0.0),
        h if h < 120.0 => (x, c, 0.0),
        h if h < 180.0 => (0.0, c, x),
        h if h < 240.0 => (0.0, x, c),
        h if h < 300.0 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };

    (
        ((r + m) * 255.0) as u8,
        ((g + m) * 255.0) as u8,
        ((b + m) * 255.0) as u8,
    )
}
