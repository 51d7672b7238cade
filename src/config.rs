//! 追踪配置 - 通过JSON文件调整参数

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::pipeline::rate::DEFAULT_MAX_FREQUENCY_HZ;
use crate::pipeline::ControlMessage;

/// 追踪参数配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    // === 速率控制 ===
    pub target_frequency_hz: f64, // 检测频率 (0 = 连续模式)
    pub max_frequency_hz: f64,    // 最大检测频率

    // === 质心跟踪 ===
    pub max_disappeared_frame_count: i64, // 遮挡容忍帧数
    pub max_normalized_distance: f32,     // 最大匹配距离 (归一化)
    pub confidence_threshold: f32,        // 置信度阈值
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            target_frequency_hz: 0.0,
            max_frequency_hz: DEFAULT_MAX_FREQUENCY_HZ,

            max_disappeared_frame_count: 10,
            max_normalized_distance: 0.2,
            confidence_threshold: 0.0,
        }
    }
}

impl TrackingConfig {
    /// 从JSON文件加载配置, 失败时使用默认值
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            info!("📝 配置文件不存在,创建默认配置...");
            let config = Self::default();
            if let Err(e) = config.save(path) {
                warn!("❌ 保存配置失败: {:#}", e);
            }
            return config;
        }

        match Self::try_load(path) {
            Ok(config) => {
                info!("✅ 配置已从 {} 加载", path.display());
                config
            }
            Err(e) => {
                warn!("⚠️  配置文件解析失败: {:#}, 使用默认值", e);
                Self::default()
            }
        }
    }

    pub fn try_load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).with_context(|| format!("读取 {} 失败", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("解析 {} 失败", path.display()))
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).context("序列化配置失败")?;
        fs::write(path, json).with_context(|| format!("写入 {} 失败", path.display()))?;
        info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    /// 可调参数以运行时消息的形式下发, 走同样的截断/拒绝规则
    pub fn control_messages(&self) -> Vec<ControlMessage> {
        vec![
            ControlMessage::SetTargetFrequency(self.target_frequency_hz),
            ControlMessage::SetMaxDisappearedFrameCount(self.max_disappeared_frame_count),
            ControlMessage::SetMaxNormalizedDistance(self.max_normalized_distance),
            ControlMessage::SetConfidenceThreshold(self.confidence_threshold),
        ]
    }

    /// 打印当前配置
    pub fn log_summary(&self) {
        info!("🎛️  当前追踪配置:");
        if self.target_frequency_hz > 0.0 {
            info!(
                "  检测频率: {:.2}Hz (最大 {:.0}Hz)",
                self.target_frequency_hz, self.max_frequency_hz
            );
        } else {
            info!("  检测频率: 连续模式 (最大 {:.0}Hz)", self.max_frequency_hz);
        }
        info!("  遮挡容忍帧数: {}", self.max_disappeared_frame_count);
        info!("  最大匹配距离: {:.3}", self.max_normalized_distance);
        info!("  置信度阈值: {:.2}", self.confidence_threshold);
    }
}
