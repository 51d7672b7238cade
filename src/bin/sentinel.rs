/// 数字卫兵 (Digital Sentinel)
///
/// 多目标质心追踪演示
///
/// 系统架构:
/// 1. 帧源线程: 合成场景, 固定帧率推帧 (可丢帧)
/// 2. 检测线程: 模拟检测器, 单飞执行
/// 3. 追踪线程: 速率控制 + 质心追踪
/// 4. 主线程:   每秒打印追踪概览
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use crossbeam_channel::{select, tick};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use sentinel_tracker::config::TrackingConfig;
use sentinel_tracker::detection::Origin;
use sentinel_tracker::input::{run_frame_source, SceneFrame, SimulatedDetector, SyntheticScene};
use sentinel_tracker::pipeline::{self, ControlMessage, TrackingSnapshot};

/// 展示分辨率 (像素)
const DISPLAY_WIDTH: f32 = 1280.0;
const DISPLAY_HEIGHT: f32 = 720.0;

/// 数字卫兵参数
#[derive(Parser, Debug)]
#[command(author, version, about = "数字卫兵 - 多目标质心追踪", long_about = None)]
struct Args {
    /// 追踪配置文件
    #[arg(short, long, default_value = "tracking_config.json")]
    config: PathBuf,

    /// 帧源帧率
    #[arg(long, default_value_t = 30.0)]
    source_fps: f64,

    /// 检测频率 (覆盖配置文件, 0 = 连续模式)
    #[arg(short, long)]
    frequency: Option<f64>,

    /// 场景中的目标数
    #[arg(short, long, default_value_t = 4)]
    objects: usize,

    /// 运行时长 (秒)
    #[arg(short, long, default_value_t = 10)]
    seconds: u64,

    /// 随机种子
    #[arg(long, default_value_t = 2024)]
    seed: u64,

    /// 退出时写出淘汰历史 (JSON)
    #[arg(long)]
    history_out: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sentinel_tracker=info,sentinel=info")))
        .init();

    let args = Args::parse();
    let config = TrackingConfig::load(&args.config);

    info!("🚀 数字卫兵系统启动");
    info!("👥 目标数: {} | 帧源: {:.0}fps | 时长: {}s", args.objects, args.source_fps, args.seconds);

    // ========== 启动帧源线程 ==========
    let (frame_tx, frame_rx) = crossbeam_channel::bounded::<SceneFrame>(2);
    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
    let scene = SyntheticScene::new(args.objects, 0.02, args.seed);
    let duration = Duration::from_secs(args.seconds);
    let source_fps = args.source_fps;
    let source = std::thread::Builder::new()
        .name("frame-source".into())
        .spawn(move || run_frame_source(scene, source_fps, duration, frame_tx, stop_rx))
        .context("启动帧源线程失败")?;

    // ========== 启动追踪流水线 ==========
    let detector = SimulatedDetector::new(args.seed.wrapping_add(1));
    let handle = pipeline::spawn(config, detector, frame_rx)?;
    if let Some(hz) = args.frequency {
        handle.send(ControlMessage::SetTargetFrequency(hz))?;
    }
    handle.start()?;

    info!("✅ 系统就绪,开始追踪...");

    // ========== 主线程: 每秒打印概览 ==========
    let deadline = Instant::now() + duration;
    let ticker = tick(Duration::from_secs(1));
    let mut latest: Option<TrackingSnapshot> = None;

    while Instant::now() < deadline {
        select! {
            recv(handle.snapshots()) -> snapshot => match snapshot {
                Ok(snapshot) => latest = Some(snapshot),
                Err(_) => break,
            },
            recv(ticker) -> _ => {
                if let Some(snapshot) = &latest {
                    print_overview(snapshot);
                }
            }
        }
    }

    let _ = stop_tx.send(());
    handle.stop()?;
    let report = handle.shutdown()?;
    let dropped = source.join().map_err(|_| anyhow::anyhow!("帧源线程异常退出"))?;

    println!();
    println!("📊 会话统计:");
    println!("  帧:       {} (帧源丢弃 {})", report.frames_seen, dropped);
    println!("  提交检测: {} (检测器忙 {})", report.frames_submitted, report.frames_dropped_busy);
    println!("  检测失败: {}", report.detection_failures);
    println!("  应用批次: {} (过期 {})", report.batches_applied, report.batches_discarded);
    println!("  活跃轨迹: {} | 已淘汰: {}", report.active.len(), report.history.len());
    println!("  平均追踪时长: {:.2}s", report.average_tracked_seconds);

    if let Some(path) = &args.history_out {
        let json = serde_json::to_string_pretty(&report).context("序列化会话报告失败")?;
        std::fs::write(path, json).with_context(|| format!("写入 {} 失败", path.display()))?;
        info!("💾 会话报告已写入 {}", path.display());
    }

    Ok(())
}

fn print_overview(snapshot: &TrackingSnapshot) {
    println!(
        "🎯 Currently Tracking: {} | Disappeared: {} | Average Tracked Time: {:.2}s",
        snapshot.active_count, snapshot.evicted_count, snapshot.average_tracked_seconds
    );
    for track in &snapshot.tracks {
        match &track.bbox {
            Some(bbox) => {
                let rect = bbox.to_image_coordinates(DISPLAY_WIDTH, DISPLAY_HEIGHT, Origin::UpperLeft);
                let (r, g, b) = track.color;
                println!(
                    "  #{:<3} [{:>4.0},{:>4.0} {:>4.0}x{:>4.0}] rgb({},{},{})",
                    track.id, rect.x, rect.y, rect.width, rect.height, r, g, b
                );
            }
            None => println!("  #{:<3} (遮挡中)", track.id),
        }
    }
}
