//! 帧总线 (Frame Bus)
//!
//! 单槽缓冲: 生产者覆盖最新帧,不等待任何读者;
//! 读者在条件变量上等待新序号,不自旋。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use image::RgbImage;

/// 已发布的标注帧
#[derive(Debug, Clone)]
pub struct PublishedFrame {
    pub seq: u64,
    pub image: Arc<RgbImage>,
}

#[derive(Default)]
pub struct FrameBus {
    slot: Mutex<Option<PublishedFrame>>,
    fresh: Condvar,
    viewers: AtomicUsize,
}

impl FrameBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 发布一帧,返回其序号 (从 1 开始)
    pub fn publish(&self, image: RgbImage) -> u64 {
        let image = Arc::new(image);
        let (seq, old) = {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            let seq = slot.as_ref().map_or(1, |f| f.seq + 1);
            (seq, slot.replace(PublishedFrame { seq, image }))
        };
        self.fresh.notify_all();
        drop(old);
        seq
    }

    pub fn latest(&self) -> Option<PublishedFrame> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 已发布帧数
    pub fn published(&self) -> u64 {
        self.latest().map_or(0, |f| f.seq)
    }

    /// 等待序号大于 `after` 的帧,超时返回 None
    pub fn wait_newer(&self, after: u64, timeout: Duration) -> Option<PublishedFrame> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        let (slot, _) = self
            .fresh
            .wait_timeout_while(slot, timeout, |s| s.as_ref().map_or(true, |f| f.seq <= after))
            .unwrap_or_else(PoisonError::into_inner);
        slot.as_ref().filter(|f| f.seq > after).cloned()
    }

    // ========== 观看者计数 ==========

    pub fn viewer_joined(&self) -> usize {
        self.viewers.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn viewer_left(&self) -> usize {
        self.viewers.fetch_sub(1, Ordering::SeqCst).saturating_sub(1)
    }

    pub fn viewers(&self) -> usize {
        self.viewers.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    /// 整帧填充为序号的低 8 位,便于检测撕裂
    fn frame_for(seq: u64) -> RgbImage {
        let v = (seq % 251) as u8;
        RgbImage::from_pixel(64, 48, image::Rgb([v, v, v]))
    }

    #[test]
    fn test_publish_assigns_sequence() {
        let bus = FrameBus::new();
        assert!(bus.latest().is_none());
        assert_eq!(bus.publish(frame_for(1)), 1);
        assert_eq!(bus.publish(frame_for(2)), 2);
        assert_eq!(bus.published(), 2);
    }

    #[test]
    fn test_wait_newer_times_out() {
        let bus = FrameBus::new();
        bus.publish(frame_for(1));
        assert!(bus.wait_newer(1, Duration::from_millis(20)).is_none());
        assert_eq!(bus.wait_newer(0, Duration::from_millis(20)).unwrap().seq, 1);
    }

    #[test]
    fn test_concurrent_readers_see_whole_frames_in_order() {
        const FRAMES: u64 = 300;
        let bus = Arc::new(FrameBus::new());

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let bus = Arc::clone(&bus);
                thread::spawn(move || {
                    let mut last = 0;
                    let mut seen = 0;
                    while last < FRAMES {
                        let Some(frame) = bus.wait_newer(last, Duration::from_secs(2)) else {
                            break;
                        };
                        assert!(frame.seq > last);
                        let expected = (frame.seq % 251) as u8;
                        assert!(frame.image.pixels().all(|p| p.0 == [expected; 3]));
                        last = frame.seq;
                        seen += 1;
                    }
                    (last, seen)
                })
            })
            .collect();

        for seq in 1..=FRAMES {
            bus.publish(frame_for(seq));
            if seq % 50 == 0 {
                thread::sleep(Duration::from_millis(1));
            }
        }

        for r in readers {
            let (last, seen) = r.join().unwrap();
            assert_eq!(last, FRAMES);
            assert!(seen >= 1);
        }
    }

    #[test]
    fn test_viewer_gauge() {
        let bus = FrameBus::new();
        assert_eq!(bus.viewer_joined(), 1);
        assert_eq!(bus.viewer_joined(), 2);
        assert_eq!(bus.viewer_left(), 1);
        assert_eq!(bus.viewers(), 1);
    }
}
