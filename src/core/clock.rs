use crossbeam::atomic::AtomicCell;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// 时钟记录：最近一次 (pts, 墙上时间) 对
#[derive(Debug, Clone, Copy)]
struct ClockPoint {
    pts: f64,               // 基准 PTS（秒）
    last_updated: Instant,  // 基准时刻
    speed: f64,             // 播放速率（1.0 = 正常）
    serial: u32,            // 该时钟基于哪个 serial 的数据
    paused: bool,
}

impl ClockPoint {
    /// 按记录外推 `now` 时刻的读数（不检查 serial）
    fn extrapolate(&self, now: Instant) -> f64 {
        if self.paused {
            self.pts
        } else {
            let elapsed = now.saturating_duration_since(self.last_updated).as_secs_f64();
            self.pts + elapsed * self.speed
        }
    }
}

// compare_exchange 需要 Eq：浮点按位比较，NaN 与自身相等
impl PartialEq for ClockPoint {
    fn eq(&self, other: &Self) -> bool {
        self.pts.to_bits() == other.pts.to_bits()
            && self.last_updated == other.last_updated
            && self.speed.to_bits() == other.speed.to_bits()
            && self.serial == other.serial
            && self.paused == other.paused
    }
}

impl Eq for ClockPoint {}

/// 媒体时钟 - 用于音视频同步
///
/// 读是对原子记录的整体加载，写是基于最新记录的比较交换重试，
/// 并发的 set_clock / set_speed / set_paused 不会互相覆盖。
/// 绑定包队列的 serial 后，数据过期（发生过 seek）时读数为 `None`。
pub struct MediaClock {
    point: AtomicCell<ClockPoint>,
    queue_serial: Option<Arc<AtomicU32>>,
}

impl MediaClock {
    /// 独立时钟（外部时钟），serial 只跟随自身
    pub fn new() -> Self {
        Self::with_queue_serial(None)
    }

    /// 绑定某个包队列 serial 的时钟
    pub fn with_queue_serial(queue_serial: Option<Arc<AtomicU32>>) -> Self {
        Self {
            point: AtomicCell::new(ClockPoint {
                pts: f64::NAN,
                last_updated: Instant::now(),
                speed: 1.0,
                serial: 0,
                paused: false,
            }),
            queue_serial,
        }
    }

    fn current_queue_serial(&self, own: u32) -> u32 {
        self.queue_serial
            .as_ref()
            .map(|s| s.load(Ordering::Acquire))
            .unwrap_or(own)
    }

    /// 获取当前播放时间（秒）
    ///
    /// 暂停时返回冻结的 pts；否则按速率从最近的 (pts, 墙上时间) 对外推。
    pub fn get_clock(&self) -> Option<f64> {
        self.get_clock_at(Instant::now())
    }

    pub fn get_clock_at(&self, now: Instant) -> Option<f64> {
        self.read(&self.point.load(), now)
    }

    fn read(&self, p: &ClockPoint, now: Instant) -> Option<f64> {
        if self.current_queue_serial(p.serial) != p.serial || p.pts.is_nan() {
            return None;
        }
        Some(p.extrapolate(now))
    }

    /// 基于最新记录原子地修改；`f` 返回 `None` 表示不修改
    fn update(&self, mut f: impl FnMut(ClockPoint) -> Option<ClockPoint>) -> bool {
        self.point.fetch_update(|p| f(p)).is_ok()
    }

    /// 设置时钟；serial 比包队列当前 serial 旧的调用被丢弃，返回是否生效
    pub fn set_clock(&self, pts: f64, serial: u32) -> bool {
        self.set_clock_at(pts, serial, Instant::now())
    }

    pub fn set_clock_at(&self, pts: f64, serial: u32, time: Instant) -> bool {
        if let Some(queue_serial) = &self.queue_serial {
            if serial < queue_serial.load(Ordering::Acquire) {
                return false;
            }
        }
        self.update(|mut p| {
            p.pts = pts;
            p.last_updated = time;
            p.serial = serial;
            Some(p)
        })
    }

    /// 设置播放速率（先把当前位置固化，再改速率）
    pub fn set_speed(&self, speed: f64) {
        let now = Instant::now();
        self.update(|mut p| {
            if let Some(current) = self.read(&p, now) {
                p.pts = current;
            }
            p.last_updated = now;
            p.speed = speed;
            Some(p)
        });
    }

    pub fn speed(&self) -> f64 {
        self.point.load().speed
    }

    /// 暂停/恢复
    pub fn set_paused(&self, paused: bool) {
        let now = Instant::now();
        self.update(|mut p| {
            if p.paused == paused {
                return None;
            }
            if paused {
                if let Some(current) = self.read(&p, now) {
                    p.pts = current;
                }
            }
            // 恢复时从冻结的位置重新开始计时
            p.last_updated = now;
            p.paused = paused;
            Some(p)
        });
    }

    /// 是否暂停
    pub fn is_paused(&self) -> bool {
        self.point.load().paused
    }

    pub fn serial(&self) -> u32 {
        self.point.load().serial
    }

    pub fn last_updated(&self) -> Instant {
        self.point.load().last_updated
    }

    /// 重置为未知值（seek 或重新加载时）
    pub fn reset(&self, serial: u32) {
        let now = Instant::now();
        self.update(|mut p| {
            p.pts = f64::NAN;
            p.last_updated = now;
            p.serial = serial;
            Some(p)
        });
    }

    /// 当本时钟无效或与 slave 偏差超过阈值时，直接对齐到 slave
    pub fn sync_to_slave(&self, slave: &MediaClock, no_sync_threshold: f64) {
        let slave_point = slave.point.load();
        let Some(slave_clock) = slave.get_clock() else {
            return;
        };
        let need_sync = match self.get_clock() {
            None => true,
            Some(clock) => (clock - slave_clock).abs() > no_sync_threshold,
        };
        if need_sync {
            self.set_clock(slave_clock, slave_point.serial);
        }
    }
}

impl Default for MediaClock {
    fn default() -> Self {
        Self::new()
    }
}
