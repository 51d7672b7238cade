use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use sentinel_tracker::pipeline::{self, TrackingSnapshot};
use sentinel_tracker::{DetectionCandidate, DetectionError, NormalizedRect, TrackingConfig};

fn candidate(cx: f32, cy: f32) -> DetectionCandidate {
    DetectionCandidate::new(NormalizedRect::from_center(cx, cy, 0.1, 0.2), 0.9)
}

fn wait_for(
    snapshots: &Receiver<TrackingSnapshot>,
    predicate: impl Fn(&TrackingSnapshot) -> bool,
) -> Option<TrackingSnapshot> {
    let deadline = Instant::now() + Duration::from_secs(5);
    while let Some(left) = deadline.checked_duration_since(Instant::now()) {
        match snapshots.recv_timeout(left) {
            Ok(snapshot) if predicate(&snapshot) => return Some(snapshot),
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
    None
}

#[test]
fn test_frames_produce_tracks() {
    let (frame_tx, frame_rx) = crossbeam_channel::unbounded::<u32>();
    let detector = |_: &u32| -> Result<Vec<DetectionCandidate>, DetectionError> {
        Ok(vec![candidate(0.3, 0.5), candidate(0.7, 0.5)])
    };
    let handle = pipeline::spawn(TrackingConfig::default(), detector, frame_rx).unwrap();
    handle.start().unwrap();

    let feeder = std::thread::spawn(move || {
        for i in 0..200 {
            if frame_tx.send(i).is_err() {
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    });

    let snapshot = wait_for(handle.snapshots(), |s| s.active_count == 2).expect("no tracking snapshot");
    assert!(snapshot.is_tracking);
    let ids: Vec<_> = snapshot.tracks.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![0, 1]);
    assert!(snapshot.tracks.iter().all(|t| t.bbox.is_some()));

    let report = handle.shutdown().unwrap();
    feeder.join().unwrap();
    assert_eq!(report.active.len(), 2);
    assert!(report.history.is_empty());
    assert!(report.batches_applied >= 1);
    assert_eq!(report.detection_failures, 0);
}

#[test]
fn test_stop_discards_in_flight_result() {
    let (frame_tx, frame_rx) = crossbeam_channel::unbounded::<u32>();
    let (entered_tx, entered_rx) = crossbeam_channel::bounded::<()>(1);
    let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(1);

    // 第一次调用被闸门挡住; 闸门关闭后的调用立即返回
    let detector = move |_: &u32| -> Result<Vec<DetectionCandidate>, DetectionError> {
        let _ = entered_tx.try_send(());
        let _ = gate_rx.recv();
        Ok(vec![candidate(0.5, 0.5)])
    };
    let handle = pipeline::spawn(TrackingConfig::default(), detector, frame_rx).unwrap();
    handle.start().unwrap();
    let first = wait_for(handle.snapshots(), |s| s.is_tracking).expect("no start snapshot");

    frame_tx.send(1).unwrap();
    entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    handle.stop().unwrap();
    assert!(wait_for(handle.snapshots(), |s| !s.is_tracking).is_some());
    gate_tx.send(()).unwrap();
    drop(gate_tx);

    // 新会话的批次排在旧批次之后, 看到它说明旧批次已处理
    handle.start().unwrap();
    let feeder = std::thread::spawn(move || {
        for i in 2..2000 {
            if frame_tx.send(i).is_err() {
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    });
    let snapshot = wait_for(handle.snapshots(), |s| s.epoch > first.epoch && s.active_count == 1)
        .expect("no snapshot from the restarted session");
    assert_eq!(snapshot.tracks[0].id, 0);

    let report = handle.shutdown().unwrap();
    feeder.join().unwrap();
    assert_eq!(report.batches_discarded, 1);
    assert!(report.batches_applied >= 1);
    assert!(report.history.is_empty());
}

#[test]
fn test_single_flight_under_frame_flood() {
    let (frame_tx, frame_rx) = crossbeam_channel::unbounded::<u32>();
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let detector = {
        let running = Arc::clone(&running);
        let peak = Arc::clone(&peak);
        move |_: &u32| -> Result<Vec<DetectionCandidate>, DetectionError> {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            running.fetch_sub(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    };
    let handle = pipeline::spawn(TrackingConfig::default(), detector, frame_rx).unwrap();
    handle.start().unwrap();

    for i in 0..300 {
        frame_tx.send(i).unwrap();
        if i % 10 == 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
    }
    std::thread::sleep(Duration::from_millis(100));

    let report = handle.shutdown().unwrap();
    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert!(report.frames_submitted >= 1);
    assert!(report.frames_dropped_busy > 0);
    assert!(report.frames_submitted + report.frames_dropped_busy <= report.frames_seen);
}

#[test]
fn test_target_frequency_limits_submissions() {
    let (frame_tx, frame_rx) = crossbeam_channel::unbounded::<u32>();
    let detector = |_: &u32| -> Result<Vec<DetectionCandidate>, DetectionError> { Ok(Vec::new()) };
    let config = TrackingConfig {
        target_frequency_hz: 5.0,
        ..TrackingConfig::default()
    };
    let handle = pipeline::spawn(config, detector, frame_rx).unwrap();
    handle.start().unwrap();

    let started = Instant::now();
    let mut i = 0;
    while started.elapsed() < Duration::from_millis(450) {
        frame_tx.send(i).unwrap();
        i += 1;
        std::thread::sleep(Duration::from_millis(5));
    }

    let report = handle.shutdown().unwrap();
    // 初始许可 + 每200ms一个
    assert!(report.frames_submitted >= 1);
    assert!(report.frames_submitted <= 4, "submitted {}", report.frames_submitted);
    assert!(report.frames_seen > 20);
}

#[test]
fn test_failed_detection_is_counted_not_applied() {
    let (frame_tx, frame_rx) = crossbeam_channel::unbounded::<u32>();
    let detector = |frame: &u32| -> Result<Vec<DetectionCandidate>, DetectionError> {
        Err(DetectionError::Failed(format!("frame {}", frame)))
    };
    let handle = pipeline::spawn(TrackingConfig::default(), detector, frame_rx).unwrap();
    handle.start().unwrap();

    for i in 0..5 {
        frame_tx.send(i).unwrap();
        std::thread::sleep(Duration::from_millis(20));
    }
    drop(frame_tx);
    std::thread::sleep(Duration::from_millis(50));

    let report = handle.shutdown().unwrap();
    assert!(report.detection_failures >= 1);
    assert_eq!(report.batches_applied, 0);
    assert!(report.active.is_empty());
}
