//! 告警去抖 & 置信度策略 (Alert Debouncer & confidence policy)

use chrono::{DateTime, Duration, Local};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::notify::Scenario;
use crate::violation::ViolationKind;

// ========== 置信度 ==========

/// 每帧的违规置信度 (百分比)
pub trait ConfidencePolicy: Send {
    fn sample(&mut self) -> u8;
}

/// 演示用占位策略: 在给定区间内均匀取值,
/// 接入真实模型后应替换为检测置信度
pub struct SyntheticConfidence {
    rng: StdRng,
    low: u8,
    high: u8,
}

impl SyntheticConfidence {
    pub fn new(low: u8, high: u8, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (low, high) = if low <= high { (low, high) } else { (high, low) };
        Self {
            rng,
            low: low.min(100),
            high: high.min(100),
        }
    }
}

impl Default for SyntheticConfidence {
    fn default() -> Self {
        Self::new(97, 99, None)
    }
}

impl ConfidencePolicy for SyntheticConfidence {
    fn sample(&mut self) -> u8 {
        self.rng.gen_range(self.low..=self.high)
    }
}

/// 固定置信度
#[derive(Debug, Clone, Copy)]
pub struct FixedConfidence(pub u8);

impl ConfidencePolicy for FixedConfidence {
    fn sample(&mut self) -> u8 {
        self.0
    }
}

// ========== 去抖 ==========

/// 本帧需要执行的告警动作
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertDecision {
    /// 生成一条告警记录
    pub record: Option<ViolationKind>,
    /// 播报场景
    pub announce: Option<Scenario>,
}

/// 所有违规类型共享一个冷却时间
#[derive(Debug, Clone)]
pub struct AlertDebouncer {
    cooldown: Duration,
    last: Option<DateTime<Local>>,
    log_smoking: bool,
}

impl AlertDebouncer {
    pub fn new(cooldown_secs: f64, log_smoking: bool) -> Self {
        let millis = (cooldown_secs.max(0.0) * 1000.0).round() as i64;
        Self {
            cooldown: Duration::milliseconds(millis),
            last: None,
            log_smoking,
        }
    }

    pub fn last(&self) -> Option<DateTime<Local>> {
        self.last
    }

    pub fn ready(&self, now: DateTime<Local>) -> bool {
        match self.last {
            None => true,
            Some(last) => now - last >= self.cooldown,
        }
    }

    pub fn mark(&mut self, now: DateTime<Local>) {
        self.last = Some(now);
    }

    /// 根据当前违规类型决定是否告警,告警时刷新冷却起点
    pub fn evaluate(&mut self, kind: Option<ViolationKind>, now: DateTime<Local>) -> AlertDecision {
        let Some(kind) = kind else {
            return AlertDecision::default();
        };
        if !self.ready(now) {
            return AlertDecision::default();
        }
        self.mark(now);

        if kind.is_manual() {
            AlertDecision {
                record: Some(kind),
                announce: None,
            }
        } else {
            AlertDecision {
                record: self.log_smoking.then_some(kind),
                announce: Some(Scenario::Smoking),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_synthetic_range() {
        let mut policy = SyntheticConfidence::new(97, 99, Some(7));
        for _ in 0..500 {
            let c = policy.sample();
            assert!((97..=99).contains(&c));
        }
    }

    #[test]
    fn test_synthetic_seed_is_reproducible() {
        let mut a = SyntheticConfidence::new(10, 90, Some(42));
        let mut b = SyntheticConfidence::new(10, 90, Some(42));
        let xs: Vec<u8> = (0..20).map(|_| a.sample()).collect();
        let ys: Vec<u8> = (0..20).map(|_| b.sample()).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn test_cooldown_boundary_is_inclusive() {
        let mut d = AlertDebouncer::new(3.0, false);
        assert!(d.ready(t0()));
        d.mark(t0());
        assert!(!d.ready(t0() + Duration::milliseconds(2999)));
        assert!(d.ready(t0() + Duration::seconds(3)));
    }

    #[test]
    fn test_manual_records_without_announce() {
        let mut d = AlertDebouncer::new(3.0, false);
        let decision = d.evaluate(Some(ViolationKind::Littering), t0());
        assert_eq!(decision.record, Some(ViolationKind::Littering));
        assert_eq!(decision.announce, None);
        assert_eq!(d.evaluate(Some(ViolationKind::Littering), t0()), AlertDecision::default());
    }

    #[test]
    fn test_smoking_announces_only() {
        let mut d = AlertDebouncer::new(3.0, false);
        let decision = d.evaluate(Some(ViolationKind::Smoking), t0());
        assert_eq!(decision.announce, Some(Scenario::Smoking));
        assert_eq!(decision.record, None);

        let mut logging = AlertDebouncer::new(3.0, true);
        let decision = logging.evaluate(Some(ViolationKind::Smoking), t0());
        assert_eq!(decision.record, Some(ViolationKind::Smoking));
    }

    #[test]
    fn test_cooldown_shared_across_kinds() {
        let mut d = AlertDebouncer::new(3.0, false);
        d.evaluate(Some(ViolationKind::Smoking), t0());
        let decision = d.evaluate(Some(ViolationKind::Littering), t0() + Duration::seconds(1));
        assert_eq!(decision.record, None);
    }

    #[test]
    fn test_idle_does_not_mark() {
        let mut d = AlertDebouncer::new(3.0, false);
        d.evaluate(None, t0());
        assert!(d.last().is_none());
    }
}
