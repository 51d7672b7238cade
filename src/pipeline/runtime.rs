//! 追踪线程 (Tracking thread)
//! 职责: 多路复用 帧 / 检测结果 / 控制消息 → 唯一修改追踪状态的消费者

use std::thread::JoinHandle;

use anyhow::{anyhow, Context};
use crossbeam_channel::{never, select, Receiver, Sender};
use tracing::{debug, info, warn};

use super::session::{FrameDecision, SessionController};
use super::{ControlMessage, SessionReport, TrackingSnapshot};
use crate::config::TrackingConfig;
use crate::detection::{DetectionBatch, DetectionScheduler, Detector};

/// 快照通道容量 (展示层跟不上时丢弃快照)
const SNAPSHOT_CAPACITY: usize = 64;

/// 流水线句柄 (展示层持有)
pub struct PipelineHandle {
    control_tx: Sender<ControlMessage>,
    snapshots: Receiver<TrackingSnapshot>,
    worker: Option<JoinHandle<SessionReport>>,
}

impl PipelineHandle {
    pub fn send(&self, message: ControlMessage) -> anyhow::Result<()> {
        self.control_tx
            .send(message)
            .map_err(|_| anyhow!("追踪线程已退出"))
    }

    pub fn start(&self) -> anyhow::Result<()> {
        self.send(ControlMessage::Start)
    }

    pub fn stop(&self) -> anyhow::Result<()> {
        self.send(ControlMessage::Stop)
    }

    pub fn snapshots(&self) -> &Receiver<TrackingSnapshot> {
        &self.snapshots
    }

    /// 停止并等待追踪线程, 返回会话报告
    pub fn shutdown(mut self) -> anyhow::Result<SessionReport> {
        let _ = self.control_tx.send(ControlMessage::Shutdown);
        let worker = self.worker.take().ok_or_else(|| anyhow!("追踪线程已被回收"))?;
        worker.join().map_err(|_| anyhow!("追踪线程异常退出"))
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = self.control_tx.send(ControlMessage::Shutdown);
            let _ = worker.join();
        }
    }
}

/// 启动检测线程和追踪线程
///
/// `frames` 为帧源; 帧源断开后流水线仍处理控制消息和在途结果。
pub fn spawn<F, D>(config: TrackingConfig, detector: D, frames: Receiver<F>) -> anyhow::Result<PipelineHandle>
where
    F: Send + 'static,
    D: Detector<F>,
{
    let (batch_tx, batch_rx) = crossbeam_channel::unbounded::<DetectionBatch>();
    let (control_tx, control_rx) = crossbeam_channel::unbounded::<ControlMessage>();
    let (snapshot_tx, snapshots) = crossbeam_channel::bounded::<TrackingSnapshot>(SNAPSHOT_CAPACITY);

    let scheduler = DetectionScheduler::new(detector, batch_tx)?;
    config.log_summary();

    let worker = std::thread::Builder::new()
        .name("tracking".into())
        .spawn(move || {
            let session = SessionController::new(&config, scheduler);
            tracking_loop(session, frames, batch_rx, control_rx, snapshot_tx)
        })
        .context("启动追踪线程失败")?;

    Ok(PipelineHandle {
        control_tx,
        snapshots,
        worker: Some(worker),
    })
}

fn tracking_loop<F: Send + 'static>(
    mut session: SessionController<F>,
    frames: Receiver<F>,
    batches: Receiver<DetectionBatch>,
    control: Receiver<ControlMessage>,
    snapshot_tx: Sender<TrackingSnapshot>,
) -> SessionReport {
    info!("🎯 追踪线程启动");

    let publish = |session: &SessionController<F>| {
        // 展示层跟不上时丢弃快照
        let _ = snapshot_tx.try_send(session.snapshot());
    };

    // 断开的通道换成 never(), 避免 select! 空转
    let idle_frames = never::<F>();
    let idle_batches = never::<DetectionBatch>();
    let mut frames = Some(frames);
    let mut batches = Some(batches);

    loop {
        let mut frames_closed = false;
        let mut batches_closed = false;

        select! {
            recv(frames.as_ref().unwrap_or(&idle_frames)) -> frame => match frame {
                Ok(frame) => {
                    if session.offer_frame(frame) == FrameDecision::DetectorBusy {
                        debug!("⏭️ 检测器忙, 跳过帧");
                    }
                }
                Err(_) => frames_closed = true,
            },
            recv(batches.as_ref().unwrap_or(&idle_batches)) -> batch => match batch {
                Ok(batch) => {
                    if let Some(update) = session.apply_batch(batch) {
                        debug!(
                            "📦 可见{} | 新增{} | 淘汰{}",
                            update.visible.len(),
                            update.registered.len(),
                            update.evicted.len()
                        );
                        publish(&session);
                    }
                }
                Err(_) => batches_closed = true,
            },
            recv(control) -> message => match message {
                Ok(ControlMessage::Shutdown) | Err(_) => {
                    session.stop();
                    break;
                }
                Ok(message) => {
                    let lifecycle = matches!(message, ControlMessage::Start | ControlMessage::Stop);
                    session.apply_control(message);
                    if lifecycle {
                        publish(&session);
                    }
                }
            },
        }

        if frames_closed {
            info!("📴 帧源已断开");
            frames = None;
        }
        if batches_closed {
            warn!("⚠️ 检测线程已退出");
            batches = None;
        }
    }

    let report = session.into_report();
    info!(
        "🛑 追踪线程退出 | 帧{} | 提交{} | 忙丢弃{} | 批次{}",
        report.frames_seen, report.frames_submitted, report.frames_dropped_busy, report.batches_applied
    );
    report
}
