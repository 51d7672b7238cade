/// 视频输入系统 (Video Input System)
///
/// 演示用的帧源与检测器:
/// - SyntheticScene:    合成场景, 行人在归一化空间中移动并随机被遮挡
/// - SimulatedDetector: 带随机延迟、噪声和失败的检测器
pub mod simulated;
pub mod synthetic;

pub use simulated::SimulatedDetector;
pub use synthetic::{run_frame_source, SceneFrame, SyntheticScene};
