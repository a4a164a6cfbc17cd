//! 状态发布 (PipelineState & StatusBoard)
//!
//! `PipelineState` 归生产者线程独占;每帧结束后生成完整的
//! `StatusExport` 快照换入 `StatusBoard`,读者只拿到只读的 `Arc`。

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Local, NaiveDate, NaiveTime, Timelike};
use serde::Serialize;

use crate::alert::ConfidencePolicy;
use crate::violation::ViolationKind;

// ========== 公共常量 ==========

/// 园区监控点
pub const LOCATIONS: [&str; 5] = [
    "Main Gate",
    "Engineering Hall",
    "Student Union",
    "Library",
    "Dormitory",
];
pub const DEFAULT_LIVE_LOCATION: &str = "Engineering Hall";

/// 实时告警记录的位置与区域
pub const LIVE_LOG_LOCATION: &str = "AI Detection Zone";
pub const LIVE_ZONE: &str = "Live";
pub const RECORD_ZONE: &str = "Record";

pub const ACTION_MONITORING: &str = "Monitoring";
pub const ACTION_CAMERA_UNAVAILABLE: &str = "Camera unavailable";

/// 演示历史: (类型, 地点, 条数)
const DEMO_HISTORY: [(ViolationKind, &str, usize); 4] = [
    (ViolationKind::Smoking, "Engineering Hall", 35),
    (ViolationKind::Littering, "Student Union", 30),
    (ViolationKind::ImproperParking, "Dormitory", 15),
    (ViolationKind::UnauthorizedPosting, "Main Gate", 20),
];

// ========== 数据结构 ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Normal,
    Warning,
}

/// 当前帧状态 (每帧覆盖)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub location: String,
    pub severity: Severity,
    #[serde(rename = "type")]
    pub kind: Option<ViolationKind>,
    pub action: String,
    pub timestamp: String,
    pub confidence: u8,
}

impl StatusSnapshot {
    pub fn normal(location: &str) -> Self {
        Self {
            location: location.to_string(),
            severity: Severity::Normal,
            kind: None,
            action: ACTION_MONITORING.to_string(),
            timestamp: "-".to_string(),
            confidence: 0,
        }
    }
}

/// 告警记录 (只追加,不修改)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRecord {
    pub id: u64,
    pub timestamp: String,
    pub date: String,
    #[serde(rename = "type")]
    pub kind: ViolationKind,
    pub location: String,
    pub zone: String,
    pub confidence: u8,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationStatus {
    pub status: Severity,
    pub last_action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Insights {
    pub total: u64,
    pub peak_time: String,
    pub most_place: String,
    pub most_type: String,
}

/// 对外只读的完整状态
#[derive(Debug, Clone, Serialize)]
pub struct StatusExport {
    pub locations: BTreeMap<String, LocationStatus>,
    pub monitor: StatusSnapshot,
    pub logs: Arc<VecDeque<AlertRecord>>,
    pub insights: Insights,
}

// ========== PipelineState ==========

pub struct PipelineState {
    live_location: String,
    monitor: StatusSnapshot,
    locations: BTreeMap<String, LocationStatus>,
    logs: Arc<VecDeque<AlertRecord>>,
    next_id: u64,
    total: u64,
    per_place: BTreeMap<String, u64>,
    per_kind: BTreeMap<ViolationKind, u64>,
    per_hour: [u64; 24],
}

impl PipelineState {
    pub fn new(live_location: &str) -> Self {
        let mut locations: BTreeMap<String, LocationStatus> = LOCATIONS
            .iter()
            .map(|name| {
                (
                    name.to_string(),
                    LocationStatus {
                        status: Severity::Normal,
                        last_action: "-".to_string(),
                    },
                )
            })
            .collect();
        locations
            .entry(live_location.to_string())
            .or_insert_with(|| LocationStatus {
                status: Severity::Normal,
                last_action: "-".to_string(),
            });

        Self {
            live_location: live_location.to_string(),
            monitor: StatusSnapshot::normal(live_location),
            locations,
            logs: Arc::new(VecDeque::new()),
            next_id: 1,
            total: 0,
            per_place: BTreeMap::new(),
            per_kind: BTreeMap::new(),
            per_hour: [0; 24],
        }
    }

    /// 预置 100 条演示历史记录 (区域 Record,10:00)
    pub fn seed_demo_history(&mut self, policy: &mut dyn ConfidencePolicy, date: NaiveDate) {
        let time = NaiveTime::from_hms_opt(10, 0, 0).unwrap_or_default();
        for (kind, place, count) in DEMO_HISTORY {
            for _ in 0..count {
                let confidence = policy.sample();
                self.append(kind, place, RECORD_ZONE, confidence, date, time);
            }
        }
        tracing::info!("📚 已加载演示历史记录 {} 条", self.total);
    }

    pub fn monitor(&self) -> &StatusSnapshot {
        &self.monitor
    }

    pub fn logs(&self) -> &VecDeque<AlertRecord> {
        &self.logs
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// 每帧更新监控状态 (与冷却无关)
    pub fn update_monitor(&mut self, kind: Option<ViolationKind>, confidence: u8, now: DateTime<Local>) {
        match kind {
            Some(kind) => self.mark_warning(kind, confidence, now),
            None => self.mark_normal(now),
        }
    }

    pub fn mark_warning(&mut self, kind: ViolationKind, confidence: u8, now: DateTime<Local>) {
        self.set_monitor(
            Severity::Warning,
            Some(kind),
            format!("{} detected", kind.label()),
            confidence,
            now,
        );
    }

    pub fn mark_normal(&mut self, now: DateTime<Local>) {
        self.set_monitor(Severity::Normal, None, ACTION_MONITORING.to_string(), 0, now);
    }

    pub fn mark_camera_unavailable(&mut self, now: DateTime<Local>) {
        self.set_monitor(
            Severity::Normal,
            None,
            ACTION_CAMERA_UNAVAILABLE.to_string(),
            0,
            now,
        );
    }

    fn set_monitor(
        &mut self,
        severity: Severity,
        kind: Option<ViolationKind>,
        action: String,
        confidence: u8,
        now: DateTime<Local>,
    ) {
        self.monitor = StatusSnapshot {
            location: self.live_location.clone(),
            severity,
            kind,
            action,
            timestamp: now.format("%H:%M:%S").to_string(),
            confidence,
        };
        if let Some(loc) = self.locations.get_mut(&self.live_location) {
            loc.status = severity;
            loc.last_action = self.monitor.action.clone();
        }
    }

    /// 生成一条实时告警记录,返回其 id
    pub fn record(&mut self, kind: ViolationKind, confidence: u8, now: DateTime<Local>) -> u64 {
        let id = self.append(
            kind,
            LIVE_LOG_LOCATION,
            LIVE_ZONE,
            confidence,
            now.date_naive(),
            now.time(),
        );
        tracing::info!("🚨 告警 #{} {} (置信度 {}%)", id, kind, confidence);
        id
    }

    fn append(
        &mut self,
        kind: ViolationKind,
        place: &str,
        zone: &str,
        confidence: u8,
        date: NaiveDate,
        time: NaiveTime,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        let record = AlertRecord {
            id,
            timestamp: time.format("%H:%M").to_string(),
            date: date.format("%Y-%m-%d").to_string(),
            kind,
            location: place.to_string(),
            zone: zone.to_string(),
            confidence,
            severity: Severity::Warning,
        };
        // 读者持有旧快照时才会复制
        Arc::make_mut(&mut self.logs).push_front(record);

        self.total += 1;
        *self.per_place.entry(place.to_string()).or_insert(0) += 1;
        *self.per_kind.entry(kind).or_insert(0) += 1;
        self.per_hour[time.hour() as usize % 24] += 1;
        id
    }

    pub fn insights(&self) -> Insights {
        let most_place = most_frequent(self.per_place.iter().map(|(k, v)| (k.as_str(), *v)));
        let most_type = most_frequent(self.per_kind.iter().map(|(k, v)| (k.label(), *v)));
        Insights {
            total: self.total,
            peak_time: peak_window(&self.per_hour),
            most_place,
            most_type,
        }
    }

    pub fn export(&self) -> StatusExport {
        StatusExport {
            locations: self.locations.clone(),
            monitor: self.monitor.clone(),
            logs: Arc::clone(&self.logs),
            insights: self.insights(),
        }
    }
}

/// 计数最多者,并列时取名字排序靠前者
fn most_frequent<'a>(counts: impl Iterator<Item = (&'a str, u64)>) -> String {
    let mut best: Option<(&str, u64)> = None;
    for (name, count) in counts {
        if count == 0 {
            continue;
        }
        best = match best {
            Some((b, c)) if c > count || (c == count && b <= name) => Some((b, c)),
            _ => Some((name, count)),
        };
    }
    best.map_or_else(|| "-".to_string(), |(name, _)| name.to_string())
}

/// 告警最集中的两小时窗口 (并列时取起始小时更忙者)
fn peak_window(per_hour: &[u64; 24]) -> String {
    let mut best: Option<(usize, (u64, u64))> = None;
    for h in 0..23 {
        let key = (per_hour[h] + per_hour[h + 1], per_hour[h]);
        if key.0 > 0 && best.map_or(true, |(_, k)| key > k) {
            best = Some((h, key));
        }
    }
    best.map_or_else(
        || "-".to_string(),
        |(h, _)| format!("{:02}:00-{:02}:00", h, h + 2),
    )
}

// ========== StatusBoard ==========

/// 状态看板: 单锁保护的完整快照
pub struct StatusBoard {
    slot: Mutex<Arc<StatusExport>>,
}

impl StatusBoard {
    pub fn new(initial: StatusExport) -> Self {
        Self {
            slot: Mutex::new(Arc::new(initial)),
        }
    }

    pub fn publish(&self, export: StatusExport) {
        let export = Arc::new(export);
        let old = {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *slot, export)
        };
        // 旧快照在锁外释放
        drop(old);
    }

    pub fn snapshot(&self) -> Arc<StatusExport> {
        Arc::clone(&self.slot.lock().unwrap_or_else(PoisonError::into_inner))
    }
}
