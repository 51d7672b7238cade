//! 检测调度器 (Detection Scheduler)
//! 职责: 单飞提交帧 → 检测线程调用Detector → 按完成顺序发送DetectionBatch

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::Context;
use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

use super::types::DetectionCandidate;
use crate::error::DetectionError;

/// 外部检测器接口
///
/// 可能很慢, 也可能失败; 调度器保证同一时刻最多一次调用在进行。
pub trait Detector<F>: Send + 'static {
    fn detect(&mut self, frame: &F) -> Result<Vec<DetectionCandidate>, DetectionError>;
}

impl<F, T> Detector<F> for T
where
    T: FnMut(&F) -> Result<Vec<DetectionCandidate>, DetectionError> + Send + 'static,
{
    fn detect(&mut self, frame: &F) -> Result<Vec<DetectionCandidate>, DetectionError> {
        self(frame)
    }
}

/// 检测结果批次 (检测线程 → 追踪线程)
#[derive(Clone, Debug)]
pub struct DetectionBatch {
    /// 提交时的会话代数
    pub epoch: u64,
    /// 提交序号
    pub sequence: u64,
    pub candidates: Vec<DetectionCandidate>,
    pub latency: Duration,
}

/// 提交结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Accepted,
    /// 上一次检测尚未完成, 帧被丢弃
    DroppedBusy,
}

struct DetectionJob<F> {
    frame: F,
    epoch: u64,
    sequence: u64,
    submitted_at: Instant,
}

pub struct DetectionScheduler<F> {
    job_tx: Option<Sender<DetectionJob<F>>>,
    in_flight: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,

    // 统计
    submitted: u64,
    dropped_busy: u64,
    failures: Arc<AtomicU64>,
}

impl<F: Send + 'static> DetectionScheduler<F> {
    /// 启动检测线程, 成功的批次发送到 `batch_tx`
    pub fn new<D>(detector: D, batch_tx: Sender<DetectionBatch>) -> anyhow::Result<Self>
    where
        D: Detector<F>,
    {
        // 单飞: 最多一个任务在途, 容量1足够
        let (job_tx, job_rx) = crossbeam_channel::bounded::<DetectionJob<F>>(1);
        let in_flight = Arc::new(AtomicBool::new(false));
        let failures = Arc::new(AtomicU64::new(0));

        let worker = {
            let in_flight = Arc::clone(&in_flight);
            let failures = Arc::clone(&failures);
            std::thread::Builder::new()
                .name("detector".into())
                .spawn(move || detection_worker(detector, job_rx, batch_tx, in_flight, failures))
                .context("启动检测线程失败")?
        };

        Ok(Self {
            job_tx: Some(job_tx),
            in_flight,
            worker: Some(worker),
            submitted: 0,
            dropped_busy: 0,
            failures,
        })
    }

    /// 提交一帧; 忙时直接丢弃, 不排队
    pub fn submit(&mut self, frame: F, epoch: u64) -> Submission {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.dropped_busy += 1;
            return Submission::DroppedBusy;
        }

        let job = DetectionJob {
            frame,
            epoch,
            sequence: self.submitted,
            submitted_at: Instant::now(),
        };

        let sent = match &self.job_tx {
            Some(tx) => tx.try_send(job).is_ok(),
            None => false,
        };
        if !sent {
            // 检测线程已退出
            self.in_flight.store(false, Ordering::Release);
            self.dropped_busy += 1;
            warn!("⚠️ 检测线程不可用, 帧被丢弃");
            return Submission::DroppedBusy;
        }

        self.submitted += 1;
        Submission::Accepted
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    pub fn dropped_busy(&self) -> u64 {
        self.dropped_busy
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

impl<F> Drop for DetectionScheduler<F> {
    fn drop(&mut self) {
        // 关闭任务通道, 检测线程在空闲时退出
        self.job_tx.take();
        if let Some(worker) = self.worker.take() {
            if self.in_flight.load(Ordering::Acquire) {
                warn!("⚠️ 检测任务仍在进行, 检测线程将在完成后自行退出");
            } else if worker.join().is_err() {
                warn!("❌ 检测线程异常退出");
            }
        }
    }
}

/// 检测线程: 每次取一个任务, 完成后先清除在途标志再发布结果
fn detection_worker<F, D>(
    mut detector: D,
    job_rx: Receiver<DetectionJob<F>>,
    batch_tx: Sender<DetectionBatch>,
    in_flight: Arc<AtomicBool>,
    failures: Arc<AtomicU64>,
) where
    D: Detector<F>,
{
    info!("🔍 检测线程启动");

    while let Ok(job) = job_rx.recv() {
        let result = detector.detect(&job.frame);
        let latency = job.submitted_at.elapsed();
        drop(job.frame);
        if result.is_err() {
            failures.fetch_add(1, Ordering::Relaxed);
        }

        in_flight.store(false, Ordering::Release);

        match result {
            Ok(candidates) => {
                debug!(
                    "🎯 检测完成 #{}: {}个候选框 | {:.1}ms",
                    job.sequence,
                    candidates.len(),
                    latency.as_secs_f64() * 1000.0
                );
                let batch = DetectionBatch {
                    epoch: job.epoch,
                    sequence: job.sequence,
                    candidates,
                    latency,
                };
                if batch_tx.send(batch).is_err() {
                    debug!("结果通道已关闭");
                    break;
                }
            }
            Err(e) => {
                warn!("⚠️ 检测失败 #{}: {}", job.sequence, e);
            }
        }
    }

    info!("🛑 检测线程退出");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::types::NormalizedRect;
    use std::sync::atomic::AtomicUsize;

    const WAIT: Duration = Duration::from_secs(5);

    /// 受闸门控制的检测器: 每次调用阻塞, 直到测试放行
    fn gated_detector(
        calls: Arc<AtomicUsize>,
        gate: Receiver<()>,
    ) -> impl FnMut(&u32) -> Result<Vec<DetectionCandidate>, DetectionError> + Send + 'static {
        move |frame: &u32| {
            calls.fetch_add(1, Ordering::SeqCst);
            let _ = gate.recv_timeout(WAIT);
            Ok(vec![DetectionCandidate::new(
                NormalizedRect::new(0.0, 0.0, 0.25, 0.25),
                *frame as f32 / 10.0,
            )])
        }
    }

    #[test]
    fn test_single_flight_drops_while_busy() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (gate_tx, gate_rx) = crossbeam_channel::unbounded();
        let (batch_tx, batch_rx) = crossbeam_channel::unbounded();
        let mut scheduler: DetectionScheduler<u32> =
            DetectionScheduler::new(gated_detector(Arc::clone(&calls), gate_rx), batch_tx).unwrap();

        assert_eq!(scheduler.submit(1, 0), Submission::Accepted);
        assert_eq!(scheduler.submit(2, 0), Submission::DroppedBusy);
        assert!(scheduler.is_busy());

        gate_tx.send(()).unwrap();
        let batch = batch_rx.recv_timeout(WAIT).unwrap();
        assert_eq!(batch.sequence, 0);
        assert_eq!(batch.candidates[0].confidence, 0.1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.dropped_busy(), 1);

        // 结果发布前在途标志已清除, 下一帧立即可提交
        assert!(!scheduler.is_busy());
        assert_eq!(scheduler.submit(3, 0), Submission::Accepted);
        gate_tx.send(()).unwrap();
        let batch = batch_rx.recv_timeout(WAIT).unwrap();
        assert_eq!(batch.sequence, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.submitted(), 2);
    }

    #[test]
    fn test_failure_emits_nothing() {
        let (batch_tx, batch_rx) = crossbeam_channel::unbounded();
        let (done_tx, done_rx) = crossbeam_channel::unbounded();
        let detector = move |frame: &u32| {
            let result = if *frame == 0 {
                Err(DetectionError::Failed("boom".into()))
            } else {
                Ok(Vec::new())
            };
            let _ = done_tx.send(());
            result
        };
        let mut scheduler: DetectionScheduler<u32> = DetectionScheduler::new(detector, batch_tx).unwrap();

        assert_eq!(scheduler.submit(0, 7), Submission::Accepted);
        done_rx.recv_timeout(WAIT).unwrap();
        assert!(batch_rx.recv_timeout(Duration::from_millis(100)).is_err());

        // 失败后不重试, 但下一帧可以再次提交
        let deadline = Instant::now() + WAIT;
        while scheduler.is_busy() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(scheduler.failures(), 1);
        assert_eq!(scheduler.submit(1, 7), Submission::Accepted);
        let batch = batch_rx.recv_timeout(WAIT).unwrap();
        assert_eq!(batch.epoch, 7);
        assert!(batch.candidates.is_empty());
    }
}
