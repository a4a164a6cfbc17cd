//! 播报通知 (Notification sink)
//!
//! 生产者只投递,不等待: 队列满时直接丢弃,播报失败只记日志。

use std::process::Command as ProcessCommand;
use std::thread;

use crossbeam_channel::{bounded, Sender, TrySendError};

/// 播报场景
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scenario {
    Smoking,
    Littering,
    PmViolation,
    Flyer,
    Undo,
}

impl Scenario {
    /// 播报语句
    pub fn announcement(self) -> &'static str {
        match self {
            Scenario::Smoking => {
                "Smoking detected. This is a no-smoking zone. Please put out your cigarette."
            }
            Scenario::Littering => "Illegal dumping detected. Please take your trash with you.",
            Scenario::PmViolation => {
                "Improper parking of a personal mobility device. Please park in the designated area."
            }
            Scenario::Flyer => "Unauthorized posting detected. Please remove the flyer.",
            Scenario::Undo => "The alert has been cleared. Thank you for your cooperation.",
        }
    }
}

/// 通知接口 (fire-and-forget)
pub trait Notifier: Send + Sync {
    fn notify(&self, scenario: Scenario);
}

/// 实际执行播报的后端 (运行在播报线程)
pub trait AnnounceBackend: Send {
    fn announce(&mut self, scenario: Scenario) -> anyhow::Result<()>;
}

/// 仅写日志
#[derive(Debug, Default)]
pub struct LogBackend;

impl AnnounceBackend for LogBackend {
    fn announce(&mut self, scenario: Scenario) -> anyhow::Result<()> {
        tracing::info!("🔊 {:?}: {}", scenario, scenario.announcement());
        Ok(())
    }
}

/// 调用外部 TTS 程序,播报语句作为最后一个参数
#[derive(Debug, Clone)]
pub struct CommandBackend {
    program: String,
    args: Vec<String>,
}

impl CommandBackend {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// 从命令行字符串解析 (空格分隔)
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }
}

impl AnnounceBackend for CommandBackend {
    fn announce(&mut self, scenario: Scenario) -> anyhow::Result<()> {
        let status = ProcessCommand::new(&self.program)
            .args(&self.args)
            .arg(scenario.announcement())
            .status()?;
        if !status.success() {
            anyhow::bail!("{} exited with {}", self.program, status);
        }
        Ok(())
    }
}

/// 播报器: 有界队列 + 独立播报线程
pub struct Announcer {
    tx: Sender<Scenario>,
}

impl Announcer {
    pub fn spawn(mut backend: Box<dyn AnnounceBackend>, capacity: usize) -> Self {
        let (tx, rx) = bounded::<Scenario>(capacity.max(1));

        thread::Builder::new()
            .name("announcer".to_string())
            .spawn(move || {
                tracing::debug!("🔊 播报线程启动");
                for scenario in rx.iter() {
                    if let Err(e) = backend.announce(scenario) {
                        tracing::warn!("⚠️ 播报失败 {:?}: {}", scenario, e);
                    }
                }
                tracing::debug!("🔊 播报线程退出");
            })
            .map_err(|e| tracing::error!("❌ 播报线程创建失败: {}", e))
            .ok();

        Self { tx }
    }
}

impl Notifier for Announcer {
    fn notify(&self, scenario: Scenario) {
        match self.tx.try_send(scenario) {
            Ok(()) => {}
            Err(TrySendError::Full(s)) => tracing::debug!("播报队列已满,丢弃 {:?}", s),
            Err(TrySendError::Disconnected(s)) => tracing::warn!("⚠️ 播报线程已退出,丢弃 {:?}", s),
        }
    }
}

/// 静音
#[derive(Debug, Default)]
pub struct Silent;

impl Notifier for Silent {
    fn notify(&self, _scenario: Scenario) {}
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// 记录所有通知 (测试用)
    #[derive(Default)]
    pub(crate) struct Recorder(pub Mutex<Vec<Scenario>>);

    impl Notifier for Recorder {
        fn notify(&self, scenario: Scenario) {
            self.0.lock().unwrap().push(scenario);
        }
    }

    struct ChannelBackend(crossbeam_channel::Sender<Scenario>);

    impl AnnounceBackend for ChannelBackend {
        fn announce(&mut self, scenario: Scenario) -> anyhow::Result<()> {
            self.0.send(scenario)?;
            Ok(())
        }
    }

    struct Failing;

    impl AnnounceBackend for Failing {
        fn announce(&mut self, _scenario: Scenario) -> anyhow::Result<()> {
            anyhow::bail!("speaker unplugged")
        }
    }

    #[test]
    fn test_announcer_delivers() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let announcer = Announcer::spawn(Box::new(ChannelBackend(tx)), 4);
        announcer.notify(Scenario::Flyer);
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), Scenario::Flyer);
    }

    #[test]
    fn test_backend_failure_is_swallowed() {
        let announcer = Announcer::spawn(Box::new(Failing), 1);
        for _ in 0..10 {
            announcer.notify(Scenario::Smoking);
        }
    }

    #[test]
    fn test_recorder_is_shareable() {
        let rec = Arc::new(Recorder::default());
        let n: Arc<dyn Notifier> = rec.clone();
        n.notify(Scenario::Undo);
        assert_eq!(rec.0.lock().unwrap().as_slice(), &[Scenario::Undo]);
    }

    #[test]
    fn test_parse_command_backend() {
        let b = CommandBackend::parse("espeak -s 150").unwrap();
        assert_eq!(b.program, "espeak");
        assert_eq!(b.args, vec!["-s", "150"]);
        assert!(CommandBackend::parse("   ").is_none());
    }
}
