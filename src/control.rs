//! 操作员指令 & 停止信号

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::violation::Command;

/// 全局停止标志 (生产者、观看者每轮检查一次)
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn command_channel() -> (Sender<Command>, Receiver<Command>) {
    unbounded()
}

/// 键盘按键
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Command(Command),
    Quit,
}

pub fn parse_key(line: &str) -> Option<Key> {
    match line.trim().to_ascii_lowercase().as_str() {
        "q" | "quit" => Some(Key::Quit),
        "l" => Some(Key::Command(Command::SetLittering)),
        "k" => Some(Key::Command(Command::SetParking)),
        "j" => Some(Key::Command(Command::SetPosting)),
        "u" => Some(Key::Command(Command::Reset)),
        _ => None,
    }
}

/// 读取输入行并转发为指令,`q` 或输入结束时返回
pub fn read_keys(input: impl BufRead, commands: &Sender<Command>, stop: &StopFlag) {
    for line in input.lines() {
        if stop.is_stopped() {
            break;
        }
        let Ok(line) = line else { break };
        match parse_key(&line) {
            Some(Key::Quit) => {
                tracing::info!("⏹️ 键盘退出");
                stop.stop();
                break;
            }
            Some(Key::Command(cmd)) => {
                tracing::info!("⌨️ 指令: {:?}", cmd);
                if commands.send(cmd).is_err() {
                    break;
                }
            }
            None if line.trim().is_empty() => {}
            None => tracing::debug!("未知按键: {}", line.trim()),
        }
    }
}

/// 键盘线程 (stdin,逐行读取)
pub fn spawn_keyboard(commands: Sender<Command>, stop: StopFlag) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new().name("keyboard".to_string()).spawn(move || {
        tracing::info!("⌨️ 键盘控制: L(Trash) K(PM) J(Flyer) U(Reset) Q(Quit) + Enter");
        let stdin = std::io::stdin();
        read_keys(stdin.lock(), &commands, &stop);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_key() {
        assert_eq!(parse_key("L"), Some(Key::Command(Command::SetLittering)));
        assert_eq!(parse_key(" u\n"), Some(Key::Command(Command::Reset)));
        assert_eq!(parse_key("q"), Some(Key::Quit));
        assert_eq!(parse_key("x"), None);
    }

    #[test]
    fn test_read_keys_forwards_until_quit() {
        let (tx, rx) = command_channel();
        let stop = StopFlag::new();
        read_keys(Cursor::new("l\n\nk\nq\nj\n"), &tx, &stop);
        let got: Vec<Command> = rx.try_iter().collect();
        assert_eq!(got, vec![Command::SetLittering, Command::SetParking]);
        assert!(stop.is_stopped());
    }

    #[test]
    fn test_stop_flag_shared() {
        let a = StopFlag::new();
        let b = a.clone();
        b.stop();
        assert!(a.is_stopped());
    }
}
