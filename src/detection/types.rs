/// 追踪系统数据结构定义
/// Data structures for the tracking core
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ========== 公共常量 ==========

/// 归一化空间中两点的最大距离 (对角线长度)
pub const MAX_NORMALIZED_DISTANCE: f32 = std::f32::consts::SQRT_2;

/// 跟踪ID (会话内单调分配, 永不复用)
pub type TrackId = u64;

// ========== 几何 ==========

/// 归一化矩形 (Normalized rectangle in [0,1]x[0,1])
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizedRect {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

impl NormalizedRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// 以中心点和尺寸构造
    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self::new(cx - width / 2., cy - height / 2., width, height)
    }

    pub fn x(&self) -> f32 {
        self.x
    }

    pub fn y(&self) -> f32 {
        self.y
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn ymax(&self) -> f32 {
        self.y + self.height
    }

    pub fn centroid(&self) -> Centroid {
        Centroid::new(self.x + self.width / 2., self.y + self.height / 2.)
    }

    /// 转换为像素坐标
    ///
    /// 归一化矩形的原点在左下角 (检测器坐标系)。
    /// `Origin::UpperLeft` 翻转y轴, 得到屏幕坐标系下的矩形。
    pub fn to_image_coordinates(&self, image_width: f32, image_height: f32, origin: Origin) -> ImageRect {
        let y = match origin {
            Origin::UpperLeft => 1.0 - self.ymax(),
            Origin::LowerLeft => self.y,
        };
        ImageRect {
            x: self.x * image_width,
            y: y * image_height,
            width: self.width * image_width,
            height: self.height * image_height,
        }
    }
}

/// 像素坐标系原点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    UpperLeft,
    LowerLeft,
}

/// 像素矩形 (渲染用)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ImageRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// 质心 (归一化坐标)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Centroid {
    pub x: f32,
    pub y: f32,
}

impl Centroid {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// 欧氏距离, 归一化空间中范围 0 … √2
    pub fn distance(&self, other: &Centroid) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

// ========== 检测 ==========

/// 检测候选框 (检测器 → 追踪器)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionCandidate {
    pub bbox: NormalizedRect,
    pub confidence: f32,
}

impl DetectionCandidate {
    pub fn new(bbox: NormalizedRect, confidence: f32) -> Self {
        Self { bbox, confidence }
    }
}

// ========== 跟踪 ==========

/// 轨迹状态: Tracked ⇄ TemporarilyOccluded → Evicted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackState {
    Tracked,
    TemporarilyOccluded,
    /// 终态, 只出现在淘汰历史中
    Evicted,
}

/// 跟踪对象
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub state: TrackState,

    /// 最后一次匹配的质心 (遮挡期间保留, 用于重新匹配)
    pub last_centroid: Centroid,

    /// 本帧边界框 (不可见时为空)
    pub current_box: Option<NormalizedRect>,

    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,

    /// 连续丢失帧数
    pub missed_frame_count: u32,
}

impl Track {
    pub(crate) fn new(id: TrackId, bbox: NormalizedRect, now: DateTime<Utc>) -> Self {
        Self {
            id,
            state: TrackState::Tracked,
            last_centroid: bbox.centroid(),
            current_box: Some(bbox),
            first_seen_at: now,
            last_seen_at: now,
            missed_frame_count: 0,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.current_box.is_some()
    }

    pub fn tracked_duration(&self) -> chrono::Duration {
        self.last_seen_at - self.first_seen_at
    }

    /// 被跟踪时长 (秒)
    pub fn tracked_seconds(&self) -> f64 {
        self.tracked_duration().num_milliseconds() as f64 / 1000.0
    }
}
