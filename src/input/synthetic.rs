//! 合成帧源
//!
//! 没有背压: 下游跟不上时帧直接丢弃。

use std::time::{Duration, Instant};

use crossbeam_channel::{select, Receiver, Sender, TrySendError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::detection::NormalizedRect;

/// 合成帧 (帧源 → 追踪线程)
#[derive(Clone, Debug)]
pub struct SceneFrame {
    pub frame_id: u64,
    /// 本帧可见目标的真实边界框
    pub objects: Vec<NormalizedRect>,
}

struct Walker {
    cx: f32,
    cy: f32,
    vx: f32,
    vy: f32,
    width: f32,
    height: f32,
    hidden_frames: u32,
}

pub struct SyntheticScene {
    walkers: Vec<Walker>,
    rng: StdRng,
    occlusion_probability: f64,
    frame_id: u64,
}

impl SyntheticScene {
    pub fn new(object_count: usize, occlusion_probability: f64, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let walkers = (0..object_count)
            .map(|_| Walker {
                cx: rng.gen_range(0.1..0.9),
                cy: rng.gen_range(0.1..0.9),
                vx: rng.gen_range(-0.01..0.01),
                vy: rng.gen_range(-0.006..0.006),
                width: rng.gen_range(0.06..0.12),
                height: rng.gen_range(0.2..0.35),
                hidden_frames: 0,
            })
            .collect();

        Self {
            walkers,
            rng,
            occlusion_probability: occlusion_probability.clamp(0.0, 1.0),
            frame_id: 0,
        }
    }

    /// 推进一帧, 返回可见目标
    pub fn next_frame(&mut self) -> SceneFrame {
        let mut objects = Vec::with_capacity(self.walkers.len());

        for walker in &mut self.walkers {
            walker.cx += walker.vx;
            walker.cy += walker.vy;

            // 碰到边缘反弹
            let half_w = walker.width / 2.;
            let half_h = walker.height / 2.;
            if walker.cx < half_w || walker.cx > 1.0 - half_w {
                walker.vx = -walker.vx;
                walker.cx = walker.cx.clamp(half_w, 1.0 - half_w);
            }
            if walker.cy < half_h || walker.cy > 1.0 - half_h {
                walker.vy = -walker.vy;
                walker.cy = walker.cy.clamp(half_h, 1.0 - half_h);
            }

            if walker.hidden_frames > 0 {
                walker.hidden_frames -= 1;
                continue;
            }
            if self.rng.gen_bool(self.occlusion_probability) {
                walker.hidden_frames = self.rng.gen_range(1..=8);
                continue;
            }

            objects.push(NormalizedRect::from_center(walker.cx, walker.cy, walker.width, walker.height));
        }

        let frame = SceneFrame {
            frame_id: self.frame_id,
            objects,
        };
        self.frame_id += 1;
        frame
    }
}

/// 帧源线程: 按固定帧率推送, 收到停止信号或达到时长后退出
pub fn run_frame_source(
    mut scene: SyntheticScene,
    fps: f64,
    duration: Duration,
    tx: Sender<SceneFrame>,
    stop: Receiver<()>,
) -> u64 {
    let fps = if fps.is_finite() && fps > 0.0 { fps } else { 30.0 };
    let ticker = crossbeam_channel::tick(Duration::from_secs_f64(1.0 / fps));
    let deadline = Instant::now() + duration;
    let mut dropped = 0u64;

    info!("🎥 合成帧源启动 ({:.0}fps)", fps);

    loop {
        select! {
            recv(stop) -> _ => break,
            recv(ticker) -> _ => {
                if Instant::now() >= deadline {
                    break;
                }
                match tx.try_send(scene.next_frame()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => dropped += 1,
                    Err(TrySendError::Disconnected(_)) => break,
                }
            }
        }
    }

    debug!("丢弃帧: {}", dropped);
    info!("🎬 合成帧源退出 (共{}帧)", scene.frame_id);
    dropped
}
