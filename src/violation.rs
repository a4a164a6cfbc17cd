//! 违规状态机 (Violation State Machine)
//!
//! 手动状态由操作员指令切换 (同一时刻最多一个),
//! 吸烟状态每帧由几何判定重新计算。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::notify::Scenario;
use crate::Error;

/// 操作员触发的演示状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManualState {
    #[default]
    Idle,
    Littering,
    ImproperParking,
    UnauthorizedPosting,
}

impl ManualState {
    fn kind(self) -> Option<ViolationKind> {
        match self {
            ManualState::Idle => None,
            ManualState::Littering => Some(ViolationKind::Littering),
            ManualState::ImproperParking => Some(ViolationKind::ImproperParking),
            ManualState::UnauthorizedPosting => Some(ViolationKind::UnauthorizedPosting),
        }
    }
}

/// 违规类型 (序列化为看板使用的标签)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ViolationKind {
    Smoking,
    Littering,
    #[serde(rename = "Improper Parking")]
    ImproperParking,
    #[serde(rename = "Unauthorized Posting")]
    UnauthorizedPosting,
}

impl ViolationKind {
    pub fn label(self) -> &'static str {
        match self {
            ViolationKind::Smoking => "Smoking",
            ViolationKind::Littering => "Littering",
            ViolationKind::ImproperParking => "Improper Parking",
            ViolationKind::UnauthorizedPosting => "Unauthorized Posting",
        }
    }

    /// 状态栏文字
    pub fn status_text(self) -> &'static str {
        match self {
            ViolationKind::UnauthorizedPosting => "VIOLATION: ILLEGAL POSTING",
            ViolationKind::ImproperParking => "WARNING: PM VIOLATION",
            ViolationKind::Littering => "ALERT: ILLEGAL DUMPING",
            ViolationKind::Smoking => "WARNING: SMOKING DETECTED",
        }
    }

    /// 状态栏颜色 (RGB)
    pub fn color(self) -> [u8; 3] {
        match self {
            ViolationKind::UnauthorizedPosting => [255, 0, 0],
            ViolationKind::ImproperParking => [255, 255, 0],
            ViolationKind::Littering => [255, 165, 0],
            ViolationKind::Smoking => [255, 0, 200],
        }
    }

    pub fn is_manual(self) -> bool {
        !matches!(self, ViolationKind::Smoking)
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 操作员指令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Reset,
    SetLittering,
    SetParking,
    SetPosting,
}

impl Command {
    /// 指令对应的播报场景
    pub fn scenario(self) -> Scenario {
        match self {
            Command::Reset => Scenario::Undo,
            Command::SetLittering => Scenario::Littering,
            Command::SetParking => Scenario::PmViolation,
            Command::SetPosting => Scenario::Flyer,
        }
    }

    fn target(self) -> ManualState {
        match self {
            Command::Reset => ManualState::Idle,
            Command::SetLittering => ManualState::Littering,
            Command::SetParking => ManualState::ImproperParking,
            Command::SetPosting => ManualState::UnauthorizedPosting,
        }
    }
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reset" | "u" => Ok(Command::Reset),
            "littering" | "l" => Ok(Command::SetLittering),
            "parking" | "k" => Ok(Command::SetParking),
            "posting" | "j" => Ok(Command::SetPosting),
            other => Err(Error::InvalidCommand(other.to_string())),
        }
    }
}

/// 当前帧的违规状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViolationState {
    manual: ManualState,
    smoking: bool,
}

impl ViolationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 应用指令 (单次赋值,不影响吸烟状态)
    pub fn apply(&mut self, cmd: Command) -> Scenario {
        self.manual = cmd.target();
        cmd.scenario()
    }

    pub fn set_smoking(&mut self, smoking: bool) {
        self.smoking = smoking;
    }

    pub fn manual(&self) -> ManualState {
        self.manual
    }

    pub fn smoking(&self) -> bool {
        self.smoking
    }

    pub fn has_manual(&self) -> bool {
        self.manual != ManualState::Idle
    }

    pub fn is_active(&self) -> bool {
        self.has_manual() || self.smoking
    }

    /// 按优先级解析: 张贴 > 停放 > 乱扔 > 吸烟
    pub fn active_kind(&self) -> Option<ViolationKind> {
        self.manual
            .kind()
            .or(if self.smoking { Some(ViolationKind::Smoking) } else { None })
    }
}
