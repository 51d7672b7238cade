//! 模拟检测器: 延迟可变, 会失败, 位置带噪声

use std::ops::Range;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::synthetic::SceneFrame;
use crate::detection::{DetectionCandidate, Detector, NormalizedRect};
use crate::error::DetectionError;

pub struct SimulatedDetector {
    rng: StdRng,
    latency_ms: Range<u64>,
    failure_rate: f64,
    noise: f32,
}

impl SimulatedDetector {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            latency_ms: 20..80,
            failure_rate: 0.05,
            noise: 0.005,
        }
    }

    pub fn with_latency(mut self, latency_ms: Range<u64>) -> Self {
        if !latency_ms.is_empty() {
            self.latency_ms = latency_ms;
        }
        self
    }

    pub fn with_failure_rate(mut self, failure_rate: f64) -> Self {
        self.failure_rate = failure_rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_noise(mut self, noise: f32) -> Self {
        self.noise = noise.max(0.0);
        self
    }

    fn jitter(&mut self) -> f32 {
        if self.noise == 0.0 {
            return 0.0;
        }
        self.rng.gen_range(-self.noise..self.noise)
    }
}

impl Detector<SceneFrame> for SimulatedDetector {
    fn detect(&mut self, frame: &SceneFrame) -> Result<Vec<DetectionCandidate>, DetectionError> {
        let latency = self.rng.gen_range(self.latency_ms.clone());
        std::thread::sleep(Duration::from_millis(latency));

        if self.rng.gen_bool(self.failure_rate) {
            // 一半是调用失败, 一半是没有结果
            if self.rng.gen_bool(0.5) {
                return Err(DetectionError::Failed(format!("simulated failure on frame {}", frame.frame_id)));
            }
            return Err(DetectionError::NoResult);
        }

        let candidates = frame
            .objects
            .iter()
            .map(|rect| {
                let c = rect.centroid();
                let (dx, dy) = (self.jitter(), self.jitter());
                let bbox = NormalizedRect::from_center(c.x + dx, c.y + dy, rect.width(), rect.height());
                DetectionCandidate::new(bbox, self.rng.gen_range(0.3..1.0))
            })
            .collect();

        Ok(candidates)
    }
}
