/// 视频处理流水线 (Video Processing Pipeline)
///
/// 单生产者线程: 采集 → 镜像 → 姿态估计 → 判定 → 打码标注 → 告警/状态 → 发布
/// - FrameBus:    标注帧 (生产者 → 观看者)
/// - StatusBoard: 状态快照 (生产者 → 看板轮询)
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Local};
use crossbeam_channel::Receiver;
use image::RgbImage;

use crate::alert::{AlertDebouncer, ConfidencePolicy};
use crate::annotate::{AnnotationInput, AnnotationReport, Annotator};
use crate::config::TuningConfig;
use crate::control::StopFlag;
use crate::detection::{classify, GeometryThresholds, PoseSource, Skeleton, SmokingVerdict};
use crate::frame_bus::FrameBus;
use crate::input::FrameSource;
use crate::notify::Notifier;
use crate::status::{PipelineState, StatusBoard};
use crate::violation::{Command, ViolationKind, ViolationState};
use crate::{Error, Result};

/// 单帧处理结果
#[derive(Debug, Clone, Default)]
pub struct FrameOutcome {
    pub offender: Option<usize>,
    pub active: Option<ViolationKind>,
    /// 本帧生成的告警记录 id
    pub record: Option<u64>,
    pub confidence: u8,
    pub report: AnnotationReport,
}

/// 嫌疑人: 手动违规时取第一个人,否则取吸烟者
pub fn resolve_offender(verdict: &SmokingVerdict, state: &ViolationState, skeletons: usize) -> Option<usize> {
    if state.has_manual() {
        (skeletons > 0).then_some(0)
    } else {
        verdict.offender
    }
}

/// 单帧判定与标注 (不含 I/O)
pub struct Pipeline {
    thresholds: GeometryThresholds,
    violations: ViolationState,
    debouncer: AlertDebouncer,
    state: PipelineState,
    annotator: Annotator,
    confidence: Box<dyn ConfidencePolicy>,
    notifier: Arc<dyn Notifier>,
}

impl Pipeline {
    pub fn new(
        tuning: &TuningConfig,
        state: PipelineState,
        annotator: Annotator,
        confidence: Box<dyn ConfidencePolicy>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            thresholds: tuning.thresholds(),
            violations: ViolationState::new(),
            debouncer: AlertDebouncer::new(tuning.cooldown_secs, tuning.log_smoking),
            state,
            annotator,
            confidence,
            notifier,
        }
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut PipelineState {
        &mut self.state
    }

    pub fn violations(&self) -> &ViolationState {
        &self.violations
    }

    /// 应用操作员指令并播报
    pub fn apply_command(&mut self, cmd: Command) {
        let scenario = self.violations.apply(cmd);
        tracing::info!("🎛️ 指令 {:?} → 状态 {:?}", cmd, self.violations.manual());
        self.notifier.notify(scenario);
    }

    pub fn process(
        &mut self,
        mut frame: RgbImage,
        skeletons: &[Skeleton],
        now: DateTime<Local>,
    ) -> (RgbImage, FrameOutcome) {
        let verdict = classify(skeletons, &self.thresholds);
        self.violations.set_smoking(verdict.is_smoking());

        let offender = resolve_offender(&verdict, &self.violations, skeletons.len());
        let active = self.violations.active_kind();
        // 每帧一次采样,标注与状态共用
        let confidence = if active.is_some() {
            self.confidence.sample()
        } else {
            0
        };

        let report = self.annotator.annotate(
            &mut frame,
            &AnnotationInput {
                skeletons,
                offender,
                state: &self.violations,
                lead_ins: &verdict.lead_ins,
                confidence,
                millis: now.timestamp_millis(),
            },
        );

        let decision = self.debouncer.evaluate(active, now);
        if let Some(scenario) = decision.announce {
            self.notifier.notify(scenario);
        }
        let record = decision
            .record
            .map(|kind| self.state.record(kind, confidence, now));
        self.state.update_monitor(active, confidence, now);

        (
            frame,
            FrameOutcome {
                offender,
                active,
                record,
                confidence,
                report,
            },
        )
    }
}

/// 生产者线程
pub struct Producer {
    pipeline: Pipeline,
    source: Box<dyn FrameSource>,
    pose: Box<dyn PoseSource>,
    bus: Arc<FrameBus>,
    board: Arc<StatusBoard>,
    commands: Receiver<Command>,
    stop: StopFlag,
    tuning: TuningConfig,
}

impl Producer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pipeline: Pipeline,
        source: Box<dyn FrameSource>,
        pose: Box<dyn PoseSource>,
        bus: Arc<FrameBus>,
        board: Arc<StatusBoard>,
        commands: Receiver<Command>,
        stop: StopFlag,
        tuning: TuningConfig,
    ) -> Self {
        Self {
            pipeline,
            source,
            pose,
            bus,
            board,
            commands,
            stop,
            tuning,
        }
    }

    fn publish_status(&self) {
        self.board.publish(self.pipeline.state().export());
    }

    /// 可被停止信号打断的休眠
    fn sleep(&self, total: Duration) {
        let step = Duration::from_millis(50);
        let mut left = total;
        while !left.is_zero() && !self.stop.is_stopped() {
            let d = left.min(step);
            thread::sleep(d);
            left -= d;
        }
    }

    /// 打开帧源,失败时指数退避重试
    fn open_with_retry(&mut self) -> Result<()> {
        let mut attempt = 0;
        loop {
            match self.source.open() {
                Ok(()) => {
                    tracing::info!("✅ 帧源已打开: {}", self.source.describe());
                    return Ok(());
                }
                Err(e) => {
                    self.pipeline.state_mut().mark_camera_unavailable(Local::now());
                    self.publish_status();
                    if attempt >= self.tuning.open_retries || self.stop.is_stopped() {
                        tracing::error!("❌ 帧源打开失败 (重试{}次): {}", attempt, e);
                        return Err(match e {
                            Error::CameraUnavailable(_) => e,
                            other => Error::CameraUnavailable(other.to_string()),
                        });
                    }
                    let backoff = self.tuning.backoff(attempt);
                    tracing::warn!(
                        "⚠️ 帧源打开失败: {}, {:?} 后重试 ({}/{})",
                        e,
                        backoff,
                        attempt + 1,
                        self.tuning.open_retries
                    );
                    self.sleep(backoff);
                    attempt += 1;
                }
            }
        }
    }

    /// 主循环,直到停止信号、帧源结束或连续读帧失败
    pub fn run(mut self) -> Result<()> {
        tracing::info!("🚀 生产者启动 (姿态: {})", self.pose.name());
        self.publish_status();
        self.open_with_retry()?;

        let result = self.frame_loop();
        self.source.close();
        tracing::info!("🛑 生产者退出, 共发布 {} 帧", self.bus.published());
        result
    }

    fn frame_loop(&mut self) -> Result<()> {
        let mut failures = 0u32;
        while !self.stop.is_stopped() {
            for cmd in self.commands.try_iter() {
                self.pipeline.apply_command(cmd);
            }

            let mut frame = match self.source.read() {
                Ok(Some(frame)) => {
                    failures = 0;
                    frame
                }
                Ok(None) => {
                    tracing::info!("📹 帧源已结束");
                    return Ok(());
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!(
                        "⚠️ 读帧失败 ({}/{}): {}",
                        failures,
                        self.tuning.max_read_failures,
                        e
                    );
                    if failures >= self.tuning.max_read_failures {
                        self.pipeline.state_mut().mark_camera_unavailable(Local::now());
                        self.publish_status();
                        return Err(e);
                    }
                    continue;
                }
            };

            if self.tuning.mirror {
                image::imageops::flip_horizontal_in_place(&mut frame);
            }

            let skeletons = self.pose.detect(&frame).unwrap_or_else(|e| {
                tracing::warn!("⚠️ 姿态估计失败,本帧按无人处理: {}", e);
                Vec::new()
            });

            let (annotated, outcome) = self.pipeline.process(frame, &skeletons, Local::now());
            let seq = self.bus.publish(annotated);
            self.publish_status();
            if outcome.record.is_some() || seq % 300 == 0 {
                tracing::debug!("帧 #{} 状态 {:?} 嫌疑人 {:?}", seq, outcome.active, outcome.offender);
            }

            self.sleep(self.tuning.frame_sleep());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::FixedConfidence;
    use crate::annotate::HeadMargins;
    use crate::detection::geometry::tests::person;
    use crate::detection::{KeypointReplay, NoPose};
    use crate::notify::tests::Recorder;
    use crate::notify::Scenario;
    use crate::status::{Severity, DEFAULT_LIVE_LOCATION};
    use chrono::TimeZone;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    fn t0() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn at_ms(ms: i64) -> DateTime<Local> {
        t0() + chrono::Duration::milliseconds(ms)
    }

    fn pipeline_with(tuning: &TuningConfig, notifier: Arc<dyn Notifier>) -> Pipeline {
        Pipeline::new(
            tuning,
            PipelineState::new(DEFAULT_LIVE_LOCATION),
            Annotator::new(None, HeadMargins::default(), 30.0),
            Box::new(FixedConfidence(98)),
            notifier,
        )
    }

    fn pipeline() -> (Pipeline, Arc<Recorder>) {
        let rec = Arc::new(Recorder::default());
        (pipeline_with(&TuningConfig::default(), rec.clone()), rec)
    }

    #[test]
    fn test_littering_at_30fps_respects_cooldown() {
        let (mut p, rec) = pipeline();
        p.apply_command(Command::SetLittering);
        assert_eq!(rec.0.lock().unwrap().as_slice(), &[Scenario::Littering]);

        let mut records = Vec::new();
        for i in 0..300i64 {
            let now = at_ms(i * 100 / 3);
            let (_, outcome) = p.process(RgbImage::new(64, 48), &[], now);
            let monitor = p.state().monitor();
            assert_eq!(monitor.severity, Severity::Warning);
            assert_eq!(monitor.kind, Some(ViolationKind::Littering));
            if outcome.record.is_some() {
                records.push(i * 100 / 3);
            }
        }
        assert_eq!(records, vec![0, 3000, 6000, 9000]);
        assert!(p.state().logs().iter().all(|r| r.kind == ViolationKind::Littering));
    }

    #[test]
    fn test_no_people_no_state_is_normal() {
        let (mut p, rec) = pipeline();
        for i in 0..30 {
            let (_, outcome) = p.process(RgbImage::new(32, 32), &[], at_ms(i * 33));
            assert!(outcome.active.is_none());
            let m = p.state().monitor();
            assert_eq!(m.severity, Severity::Normal);
            assert_eq!(m.kind, None);
            assert_eq!(m.confidence, 0);
        }
        assert!(rec.0.lock().unwrap().is_empty());
        assert!(p.state().logs().is_empty());
    }

    #[test]
    fn test_manual_state_offender_is_first() {
        let (mut p, _) = pipeline();
        p.apply_command(Command::SetPosting);
        let people = vec![
            person(150.0, 200.0, None, None),
            person(450.0, 200.0, Some((450.0, 220.0)), None),
        ];
        let (_, outcome) = p.process(RgbImage::new(640, 480), &people, t0());
        assert_eq!(outcome.offender, Some(0));
        assert_eq!(outcome.active, Some(ViolationKind::UnauthorizedPosting));
        assert_eq!(outcome.report.blurred, vec![1]);
        assert_eq!(outcome.confidence, 98);
    }

    #[test]
    fn test_smoking_announces_under_cooldown_without_records() {
        let (mut p, rec) = pipeline();
        let smoker = vec![person(300.0, 200.0, Some((300.0, 260.0)), None)];
        let mut offenders = Vec::new();
        for i in 0..120i64 {
            let (_, outcome) = p.process(RgbImage::new(640, 480), &smoker, at_ms(i * 50));
            offenders.push(outcome.offender);
        }
        // 6 秒内: t=0 与 t=3s 各播报一次
        assert_eq!(rec.0.lock().unwrap().len(), 2);
        assert!(offenders.iter().all(|o| *o == Some(0)));
        assert!(p.state().logs().is_empty());
        assert_eq!(p.state().monitor().kind, Some(ViolationKind::Smoking));
    }

    #[test]
    fn test_second_person_smoking_blurs_first() {
        let (mut p, _) = pipeline();
        let people = vec![
            person(150.0, 200.0, None, None),
            person(450.0, 200.0, Some((450.0, 260.0)), None),
        ];
        let frame = RgbImage::from_fn(640, 480, |x, y| {
            let v = if (x + y) % 2 == 0 { 0 } else { 255 };
            image::Rgb([v, v, v])
        });
        let (out, outcome) = p.process(frame.clone(), &people, t0());

        assert!(p.violations().smoking());
        assert_eq!(outcome.active, Some(ViolationKind::Smoking));
        assert_eq!(outcome.offender, Some(1));
        assert_eq!(outcome.report.blurred, vec![0]);
        assert_eq!(outcome.report.boxed, vec![1]);
        // 旁观者头部被模糊,吸烟者头部内部保持原样
        assert_ne!(out.get_pixel(150, 180), frame.get_pixel(150, 180));
        assert_eq!(out.get_pixel(450, 180), frame.get_pixel(450, 180));
    }

    #[test]
    fn test_ids_increase_across_commands() {
        let (mut p, _) = pipeline();
        let cmds = [
            Command::SetLittering,
            Command::SetParking,
            Command::Reset,
            Command::SetPosting,
        ];
        let mut ms = 0;
        for cmd in cmds {
            p.apply_command(cmd);
            for _ in 0..40 {
                p.process(RgbImage::new(16, 16), &[], at_ms(ms));
                ms += 100;
            }
        }
        let ids: Vec<u64> = p.state().logs().iter().rev().map(|r| r.id).collect();
        assert!(!ids.is_empty());
        assert!(ids.windows(2).all(|w| w[1] == w[0] + 1));
        assert_eq!(ids[0], 1);
    }

    #[test]
    fn test_resolve_offender_without_people() {
        let mut state = ViolationState::new();
        state.apply(Command::SetLittering);
        assert_eq!(resolve_offender(&SmokingVerdict::default(), &state, 0), None);
    }

    // ========== 生产者 ==========

    struct ScriptedSource {
        script: VecDeque<Result<Option<RgbImage>>>,
        open_failures: u32,
        closed: Arc<AtomicBool>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<Option<RgbImage>>>, open_failures: u32) -> (Self, Arc<AtomicBool>) {
            let closed = Arc::new(AtomicBool::new(false));
            (
                Self {
                    script: script.into(),
                    open_failures,
                    closed: closed.clone(),
                },
                closed,
            )
        }
    }

    impl FrameSource for ScriptedSource {
        fn open(&mut self) -> Result<()> {
            if self.open_failures > 0 {
                self.open_failures -= 1;
                return Err(Error::CameraUnavailable("busy".to_string()));
            }
            Ok(())
        }

        fn read(&mut self) -> Result<Option<RgbImage>> {
            self.script.pop_front().unwrap_or(Ok(None))
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    fn fast_tuning() -> TuningConfig {
        TuningConfig {
            frame_sleep_ms: 0,
            open_backoff_ms: 1,
            open_backoff_max_ms: 2,
            ..TuningConfig::default()
        }
    }

    fn build_producer(
        source: ScriptedSource,
        pose: Box<dyn PoseSource>,
        tuning: TuningConfig,
    ) -> (Producer, Arc<FrameBus>, Arc<StatusBoard>, crossbeam_channel::Sender<Command>) {
        let bus = Arc::new(FrameBus::new());
        let p = pipeline_with(&tuning, Arc::new(crate::notify::Silent));
        let board = Arc::new(StatusBoard::new(p.state().export()));
        let (tx, rx) = crate::control::command_channel();
        let producer = Producer::new(
            p,
            Box::new(source),
            pose,
            Arc::clone(&bus),
            Arc::clone(&board),
            rx,
            StopFlag::new(),
            tuning,
        );
        (producer, bus, board, tx)
    }

    fn frames(n: usize) -> Vec<Result<Option<RgbImage>>> {
        (0..n).map(|_| Ok(Some(RgbImage::new(64, 48)))).collect()
    }

    #[test]
    fn test_producer_publishes_until_exhausted() {
        let (source, closed) = ScriptedSource::new(frames(5), 0);
        let (producer, bus, board, tx) = build_producer(source, Box::new(NoPose), fast_tuning());
        tx.send(Command::SetParking).unwrap();
        producer.run().unwrap();
        assert_eq!(bus.published(), 5);
        assert!(closed.load(Ordering::SeqCst));
        let export = board.snapshot();
        assert_eq!(export.monitor.kind, Some(ViolationKind::ImproperParking));
        assert_eq!(export.logs.len(), 1);
    }

    #[test]
    fn test_producer_tolerates_sporadic_read_failures() {
        let mut script = frames(2);
        script.insert(1, Err(Error::Source("glitch".to_string())));
        script.insert(2, Err(Error::Source("glitch".to_string())));
        let (source, _) = ScriptedSource::new(script, 0);
        let (producer, bus, _, _tx) = build_producer(source, Box::new(NoPose), fast_tuning());
        producer.run().unwrap();
        assert_eq!(bus.published(), 2);
    }

    #[test]
    fn test_producer_gives_up_after_consecutive_failures() {
        let script = (0..3).map(|_| Err(Error::Source("gone".to_string()))).collect();
        let (source, closed) = ScriptedSource::new(script, 0);
        let (producer, _, board, _tx) = build_producer(source, Box::new(NoPose), fast_tuning());
        assert!(matches!(producer.run(), Err(Error::Source(_))));
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(board.snapshot().monitor.action, crate::status::ACTION_CAMERA_UNAVAILABLE);
    }

    #[test]
    fn test_producer_retries_open() {
        let (source, _) = ScriptedSource::new(frames(1), 2);
        let (producer, bus, _, _tx) = build_producer(source, Box::new(NoPose), fast_tuning());
        producer.run().unwrap();
        assert_eq!(bus.published(), 1);

        let (source, _) = ScriptedSource::new(frames(1), 10);
        let (producer, bus, board, _tx) = build_producer(source, Box::new(NoPose), fast_tuning());
        assert!(matches!(producer.run(), Err(Error::CameraUnavailable(_))));
        assert_eq!(bus.published(), 0);
        assert_eq!(board.snapshot().monitor.action, crate::status::ACTION_CAMERA_UNAVAILABLE);
    }

    #[test]
    fn test_producer_mirrors_before_detection() {
        struct SeenPose(Arc<Mutex<Vec<u8>>>);
        impl PoseSource for SeenPose {
            fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Skeleton>> {
                self.0.lock().unwrap().push(frame.get_pixel(0, 0).0[0]);
                Ok(Vec::new())
            }
            fn name(&self) -> &str {
                "seen"
            }
        }

        let mut img = RgbImage::new(4, 4);
        img.put_pixel(3, 0, image::Rgb([200, 0, 0]));
        let (source, _) = ScriptedSource::new(vec![Ok(Some(img))], 0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (producer, _, _, _tx) = build_producer(source, Box::new(SeenPose(seen.clone())), fast_tuning());
        producer.run().unwrap();
        assert_eq!(seen.lock().unwrap().as_slice(), &[200]);
    }

    #[test]
    fn test_pose_errors_count_as_empty() {
        struct Broken;
        impl PoseSource for Broken {
            fn detect(&mut self, _frame: &RgbImage) -> Result<Vec<Skeleton>> {
                Err(Error::Pose("model crashed".to_string()))
            }
            fn name(&self) -> &str {
                "broken"
            }
        }
        let (source, _) = ScriptedSource::new(frames(3), 0);
        let (producer, bus, board, _tx) = build_producer(source, Box::new(Broken), fast_tuning());
        producer.run().unwrap();
        assert_eq!(bus.published(), 3);
        assert_eq!(board.snapshot().monitor.severity, Severity::Normal);
    }

    #[test]
    fn test_replay_drives_smoking_status() {
        let replay = KeypointReplay::new(vec![vec![person(300.0, 200.0, Some((300.0, 250.0)), None)]]);
        let (source, _) = ScriptedSource::new(
            (0..2).map(|_| Ok(Some(RgbImage::new(640, 480)))).collect(),
            0,
        );
        let tuning = TuningConfig {
            mirror: false,
            ..fast_tuning()
        };
        let (producer, _, board, _tx) = build_producer(source, Box::new(replay), tuning);
        producer.run().unwrap();
        let export = board.snapshot();
        assert_eq!(export.monitor.kind, Some(ViolationKind::Smoking));
        assert_eq!(export.monitor.severity, Severity::Warning);
    }
}
