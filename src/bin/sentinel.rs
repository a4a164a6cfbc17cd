/// 城市之眼 (CityEye Sentinel)
///
/// 单摄像头违规监控服务
///
/// 系统架构:
/// 1. 生产者线程: 采集 → 姿态估计 → 判定 → 打码 → 发布
/// 2. 键盘线程:   操作员指令 (L/K/J/U/Q)
/// 3. 播报线程:   语音提示 (fire-and-forget)
/// 4. Tokio运行时: HTTP 视频流 / 状态查询 / 指令
use std::sync::Arc;
use std::thread;

use anyhow::Context;
use clap::Parser;
use mimalloc::MiMalloc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cityeye_rs::alert::SyntheticConfidence;
use cityeye_rs::annotate::Annotator;
use cityeye_rs::control::{self, StopFlag};
use cityeye_rs::detection::{KeypointReplay, NoPose, PoseSource};
use cityeye_rs::notify::{AnnounceBackend, Announcer, CommandBackend, LogBackend, Notifier};
use cityeye_rs::web_api::{self, AppState};
use cityeye_rs::{input, Args, FrameBus, Pipeline, PipelineState, Producer, StatusBoard, TuningConfig};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const ANNOUNCE_QUEUE: usize = 4;

fn build_pose(args: &Args) -> anyhow::Result<Box<dyn PoseSource>> {
    if let Some(model) = &args.pose_model {
        #[cfg(feature = "onnx")]
        {
            let pose = cityeye_rs::detection::YoloV8Pose::new(model, args.kconf)?;
            return Ok(Box::new(pose));
        }
        #[cfg(not(feature = "onnx"))]
        {
            anyhow::bail!(
                "--pose-model {} requires the `onnx` feature",
                model.display()
            );
        }
    }
    if let Some(path) = &args.keypoints {
        return Ok(Box::new(KeypointReplay::load(path)?));
    }
    tracing::warn!("⚠️ 未指定姿态来源,仅手动违规状态可用");
    Ok(Box::new(NoPose))
}

fn build_notifier(args: &Args) -> Arc<dyn Notifier> {
    let backend: Box<dyn AnnounceBackend> = match args.tts_command.as_deref().and_then(CommandBackend::parse) {
        Some(cmd) => Box::new(cmd),
        None => Box::new(LogBackend),
    };
    Arc::new(Announcer::spawn(backend, ANNOUNCE_QUEUE))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cityeye_rs=info,sentinel=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("🚀 城市之眼启动 v{}", env!("CARGO_PKG_VERSION"));

    let tuning = TuningConfig::load(&args.tuning);
    tuning.log_summary();

    // 字体缺失时只绘制几何图形
    let font = match &args.font {
        Some(path) => match Annotator::load_font(path) {
            Ok(font) => Some(font),
            Err(e) => {
                tracing::warn!("⚠️ 字体加载失败,文字标注关闭: {}", e);
                None
            }
        },
        None => None,
    };
    let annotator = Annotator::new(font, tuning.margins(), tuning.blur_sigma);

    let mut confidence = SyntheticConfidence::new(tuning.confidence_min, tuning.confidence_max, args.seed);
    let mut state = PipelineState::new(&tuning.live_location);
    if args.demo_history {
        state.seed_demo_history(&mut confidence, chrono::Local::now().date_naive());
    }

    let source = input::open_source(&args.source, args.loop_frames)?;
    let pose = build_pose(&args)?;
    let notifier = build_notifier(&args);

    let bus = Arc::new(FrameBus::new());
    let board = Arc::new(StatusBoard::new(state.export()));
    let stop = StopFlag::new();
    let (cmd_tx, cmd_rx) = control::command_channel();

    let pipeline = Pipeline::new(&tuning, state, annotator, Box::new(confidence), notifier);
    let producer = Producer::new(
        pipeline,
        source,
        pose,
        Arc::clone(&bus),
        Arc::clone(&board),
        cmd_rx,
        stop.clone(),
        tuning.clone(),
    );

    let producer_handle = {
        let stop = stop.clone();
        thread::Builder::new()
            .name("producer".to_string())
            .spawn(move || {
                let result = producer.run();
                if let Err(e) = &result {
                    tracing::error!("❌ 生产者异常退出: {}", e);
                }
                stop.stop();
                result
            })
            .context("spawn producer thread")?
    };

    if !args.no_keyboard {
        control::spawn_keyboard(cmd_tx.clone(), stop.clone()).context("spawn keyboard thread")?;
    }

    let app_state = AppState {
        bus,
        board,
        commands: cmd_tx,
        stop: stop.clone(),
        stream: tuning.stream_settings(),
    };
    let addr = format!("{}:{}", args.host, args.port);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;
    let served = runtime.block_on(web_api::serve(app_state, &addr));
    stop.stop();

    let produced = producer_handle
        .join()
        .map_err(|_| anyhow::anyhow!("producer thread panicked"))?;

    served.with_context(|| format!("http server on {}", addr))?;
    produced?;
    tracing::info!("👋 城市之眼已退出");
    Ok(())
}
