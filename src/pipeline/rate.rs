//! 速率控制 (Rate Controller)
//!
//! 目标频率为0时连续模式, 每帧都可提交; 大于0时每个周期发放一个许可,
//! 许可不累积。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{select, Sender};
use tracing::{debug, info, warn};

use crate::error::ConfigRejected;

/// 默认最大频率 (Hz)
pub const DEFAULT_MAX_FREQUENCY_HZ: f64 = 20.0;

/// 周期性许可定时器, 可取消
struct PermitTimer {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

impl PermitTimer {
    fn spawn(period: Duration, permit: Arc<AtomicBool>) -> Option<Self> {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let handle = std::thread::Builder::new()
            .name("permit-timer".into())
            .spawn(move || {
                let ticker = crossbeam_channel::tick(period);
                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => permit.store(true, Ordering::Release),
                    }
                }
            });

        match handle {
            Ok(handle) => Some(Self { stop_tx, handle }),
            Err(e) => {
                warn!("❌ 启动许可定时器失败: {}", e);
                None
            }
        }
    }

    /// 取消并等待线程退出, 返回后不会再发放许可
    fn cancel(self) {
        let _ = self.stop_tx.send(());
        if self.handle.join().is_err() {
            warn!("❌ 许可定时器线程异常退出");
        }
    }
}

pub struct RateController {
    target_frequency_hz: f64,
    max_frequency_hz: f64,
    /// 许可周期 (连续模式为空)
    period: Option<Duration>,
    permit: Arc<AtomicBool>,
    timer: Option<PermitTimer>,
    running: bool,
}

impl Default for RateController {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FREQUENCY_HZ)
    }
}

impl RateController {
    pub fn new(max_frequency_hz: f64) -> Self {
        let max_frequency_hz = if max_frequency_hz.is_finite() && max_frequency_hz > 0.0 {
            max_frequency_hz
        } else {
            warn!("⚠️ 最大频率 {} 无效, 使用默认值 {}", max_frequency_hz, DEFAULT_MAX_FREQUENCY_HZ);
            DEFAULT_MAX_FREQUENCY_HZ
        };
        Self {
            target_frequency_hz: 0.0,
            max_frequency_hz,
            period: None,
            permit: Arc::new(AtomicBool::new(false)),
            timer: None,
            running: false,
        }
    }

    pub fn target_frequency_hz(&self) -> f64 {
        self.target_frequency_hz
    }

    pub fn is_continuous(&self) -> bool {
        self.target_frequency_hz == 0.0
    }

    /// 设置目标频率, 截断到 [0, max]; 运行中则替换定时器
    pub fn set_target_frequency(&mut self, hz: f64) -> Result<f64, ConfigRejected> {
        if hz.is_nan() {
            return Err(ConfigRejected::new("target_frequency_hz", hz, "not a number"));
        }
        let hz = hz.clamp(0.0, self.max_frequency_hz);
        if hz == self.target_frequency_hz {
            return Ok(hz);
        }
        let period = if hz > 0.0 {
            match Duration::try_from_secs_f64(1.0 / hz) {
                Ok(period) => Some(period),
                Err(_) => {
                    return Err(ConfigRejected::new("target_frequency_hz", hz, "period out of range"));
                }
            }
        } else {
            None
        };
        self.target_frequency_hz = hz;
        self.period = period;

        if self.running {
            self.rearm();
        }
        debug!("⏱️ 目标频率: {:.2}Hz", hz);
        Ok(hz)
    }

    /// 启动: 发放一个初始许可, 让启动后的第一帧立即通过
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        self.permit.store(true, Ordering::Release);
        self.rearm();
        info!("▶️ 速率控制启动 ({})", self.describe());
    }

    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        self.permit.store(false, Ordering::Release);
        info!("⏹️ 速率控制停止");
    }

    /// 当前帧是否可以提交检测 (会消耗许可)
    pub fn try_admit(&self) -> bool {
        if !self.running {
            return false;
        }
        if self.is_continuous() {
            return true;
        }
        self.permit.swap(false, Ordering::AcqRel)
    }

    /// 先取消并等待旧定时器, 再启动新定时器; 两个定时器不会同时存在
    fn rearm(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        if let Some(period) = self.period {
            self.timer = PermitTimer::spawn(period, Arc::clone(&self.permit));
        }
    }

    fn describe(&self) -> String {
        if self.is_continuous() {
            "连续模式".to_string()
        } else {
            format!("{:.2}Hz", self.target_frequency_hz)
        }
    }
}

impl Drop for RateController {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }
}
