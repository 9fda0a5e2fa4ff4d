use crate::core::{Frame, FrameDrop, MediaClock, PlayerConfig, PlayerError, Result, SyncType};
use crate::player::demuxer_source::VideoSurface;
use crate::player::frame_queue::FrameQueue;
use crate::player::log_ctx;
use crate::player::packet_queue::PacketQueue;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use log::{debug, info};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// 视频输出轨道：帧队列 + 对应的包队列（用于判断 serial 是否过期）
#[derive(Clone)]
pub struct VideoTrack {
    pub frames: Arc<FrameQueue>,
    pub packets: Arc<PacketQueue>,
}

/// 同步阈值
#[derive(Debug, Clone, Copy)]
struct Thresholds {
    min: f64,
    max: f64,
    framedup: f64,
    nosync: f64,
}

struct RefreshState {
    /// 上一帧应当开始显示的时刻（相对 epoch 的秒数）
    frame_timer: f64,
    force_refresh: bool,
}

/// 媒体同步器
///
/// 选择主时钟（音频 / 视频 / 外部），并驱动视频显示节奏：
/// 以上一帧的时长为基础，按视频时钟与主时钟的偏差修正下一帧的延时，
/// 修正量限制在自适应阈值窗口内；落后超过阈值的帧直接丢弃而不是继续延后。
pub struct MediaSync {
    epoch: Instant,
    sync_type: SyncType,
    frame_drop: FrameDrop,
    has_audio: bool,
    has_video: bool,
    max_frame_duration: f64,
    thresholds: Thresholds,
    refresh_interval: Duration,

    audio_clock: Arc<MediaClock>,
    video_clock: Arc<MediaClock>,
    external_clock: Arc<MediaClock>,

    video: Option<VideoTrack>,
    surface: Option<Arc<dyn VideoSurface>>,

    paused: AtomicBool,
    refresh: Mutex<RefreshState>,
    frame_drops_early: AtomicU64,
    frame_drops_late: AtomicU64,
    frames_displayed: AtomicU64,
    refresh_thread: Mutex<Option<(Sender<()>, JoinHandle<()>)>>,
}

impl MediaSync {
    pub fn new(
        config: &PlayerConfig,
        sync_type: SyncType,
        frame_drop: FrameDrop,
        max_frame_duration: f64,
        audio_serial: Option<Arc<AtomicU32>>,
        video: Option<VideoTrack>,
        surface: Option<Arc<dyn VideoSurface>>,
    ) -> Self {
        let has_audio = audio_serial.is_some();
        let video_serial = video.as_ref().map(|v| v.packets.serial_handle());
        Self {
            epoch: Instant::now(),
            sync_type,
            frame_drop,
            has_audio,
            has_video: video.is_some(),
            max_frame_duration,
            thresholds: Thresholds {
                min: config.sync_threshold_min,
                max: config.sync_threshold_max,
                framedup: config.framedup_threshold,
                nosync: config.nosync_threshold,
            },
            refresh_interval: config.refresh_interval(),
            audio_clock: Arc::new(MediaClock::with_queue_serial(audio_serial)),
            video_clock: Arc::new(MediaClock::with_queue_serial(video_serial)),
            external_clock: Arc::new(MediaClock::new()),
            video,
            surface,
            paused: AtomicBool::new(false),
            refresh: Mutex::new(RefreshState {
                // 首帧立即显示
                frame_timer: f64::NEG_INFINITY,
                force_refresh: false,
            }),
            frame_drops_early: AtomicU64::new(0),
            frame_drops_late: AtomicU64::new(0),
            frames_displayed: AtomicU64::new(0),
            refresh_thread: Mutex::new(None),
        }
    }

    fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    pub fn audio_clock(&self) -> &Arc<MediaClock> {
        &self.audio_clock
    }

    pub fn video_clock(&self) -> &Arc<MediaClock> {
        &self.video_clock
    }

    pub fn external_clock(&self) -> &Arc<MediaClock> {
        &self.external_clock
    }

    /// 实际生效的主时钟类型（所选的流不存在时回退）
    pub fn master_sync_type(&self) -> SyncType {
        match self.sync_type {
            SyncType::Video if self.has_video => SyncType::Video,
            SyncType::Video if self.has_audio => SyncType::Audio,
            SyncType::Video => SyncType::External,
            SyncType::Audio if self.has_audio => SyncType::Audio,
            SyncType::Audio => SyncType::External,
            SyncType::External => SyncType::External,
        }
    }

    fn master(&self) -> &MediaClock {
        match self.master_sync_type() {
            SyncType::Video => &self.video_clock,
            SyncType::Audio => &self.audio_clock,
            SyncType::External => &self.external_clock,
        }
    }

    /// 主时钟读数（秒）
    pub fn master_clock(&self) -> Option<f64> {
        self.master().get_clock()
    }

    pub fn frame_drop(&self) -> FrameDrop {
        self.frame_drop
    }

    pub fn nosync_threshold(&self) -> f64 {
        self.thresholds.nosync
    }

    /// 根据视频时钟与主时钟的偏差修正下一帧延时
    pub fn compute_target_delay(&self, delay: f64) -> f64 {
        let mut delay = delay;
        if self.master_sync_type() != SyncType::Video {
            let diff = match (self.video_clock.get_clock(), self.master_clock()) {
                (Some(video), Some(master)) => Some(video - master),
                _ => None,
            };
            // 阈值随帧时长自适应，但限制在 [min, max] 内
            let sync_threshold = delay.min(self.thresholds.max).max(self.thresholds.min);
            if let Some(diff) = diff {
                if diff.abs() < self.max_frame_duration {
                    if diff <= -sync_threshold {
                        delay = (delay + diff).max(0.0);
                    } else if diff >= sync_threshold && delay > self.thresholds.framedup {
                        delay += diff;
                    } else if diff >= sync_threshold {
                        delay *= 2.0;
                    }
                }
            }
            debug!("video: delay={:.3} A-V={:?}", delay, diff.map(|d| -d));
        }
        delay
    }

    /// 由相邻两帧的时间戳估计显示时长
    pub fn frame_duration(&self, current: &Frame, next: &Frame) -> f64 {
        if current.serial != next.serial {
            return 0.0;
        }
        let duration = next.pts - current.pts;
        if duration.is_nan() || duration <= 0.0 || duration > self.max_frame_duration {
            current.duration
        } else {
            duration
        }
    }

    /// 显示一帧后更新视频时钟，并让外部时钟跟随
    pub fn update_video_pts(&self, pts: f64, serial: u32) {
        self.video_clock.set_clock(pts, serial);
        self.external_clock
            .sync_to_slave(&self.video_clock, self.thresholds.nosync);
    }

    /// 音频写入设备后更新音频时钟
    pub fn update_audio_clock(&self, pts: f64, serial: u32, time: Instant) {
        if self.audio_clock.set_clock_at(pts, serial, time) {
            self.external_clock
                .sync_to_slave(&self.audio_clock, self.thresholds.nosync);
        }
    }

    /// 解码端丢弃了一帧
    pub fn count_early_drop(&self) {
        self.frame_drops_early.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_drops_early(&self) -> u64 {
        self.frame_drops_early.load(Ordering::Relaxed)
    }

    pub fn frame_drops_late(&self) -> u64 {
        self.frame_drops_late.load(Ordering::Relaxed)
    }

    pub fn frames_displayed(&self) -> u64 {
        self.frames_displayed.load(Ordering::Relaxed)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// 暂停/恢复所有时钟
    pub fn set_paused(&self, paused: bool) {
        if self.paused.swap(paused, Ordering::SeqCst) == paused {
            return;
        }
        if !paused {
            // 恢复时把暂停期间流逝的时间补到 frame_timer 上
            let mut refresh = self.refresh.lock();
            let paused_for = self.video_clock.last_updated().elapsed().as_secs_f64();
            refresh.frame_timer += paused_for;
        }
        self.audio_clock.set_paused(paused);
        self.video_clock.set_paused(paused);
        self.external_clock.set_paused(paused);
    }

    pub fn set_speed(&self, speed: f64) {
        self.audio_clock.set_speed(speed);
        self.video_clock.set_speed(speed);
        self.external_clock.set_speed(speed);
    }

    /// Seek 后外部时钟直接对齐到目标位置
    pub fn reset_for_seek(&self, target_secs: f64) {
        self.external_clock.set_clock(target_secs, 0);
        self.refresh.lock().force_refresh = true;
    }

    /// 一次视频刷新；`remaining` 为距离下次刷新的时间（秒），可能被缩短
    pub fn refresh_video(&self, remaining: &mut f64) {
        let Some(track) = &self.video else {
            return;
        };

        loop {
            if track.frames.nb_remaining() == 0 {
                break;
            }
            let (Some(last), Some(current)) = (track.frames.peek_last(), track.frames.peek()) else {
                break;
            };

            // 过期 serial 的帧直接跳过
            if current.serial != track.packets.serial() {
                track.frames.next();
                continue;
            }

            let mut refresh = self.refresh.lock();
            if last.serial != current.serial {
                refresh.frame_timer = self.now();
            }
            if self.is_paused() {
                break;
            }

            let last_duration = self.frame_duration(&last, &current);
            let delay = self.compute_target_delay(last_duration);

            let time = self.now();
            if time < refresh.frame_timer + delay {
                *remaining = (refresh.frame_timer + delay - time).min(*remaining);
                break;
            }

            refresh.frame_timer += delay;
            if !refresh.frame_timer.is_finite()
                || (delay > 0.0 && time - refresh.frame_timer > self.thresholds.max)
            {
                refresh.frame_timer = time;
            }

            if !current.pts.is_nan() {
                self.update_video_pts(current.pts, current.serial);
            }

            if track.frames.nb_remaining() > 1 {
                if let Some(next) = track.frames.peek_next() {
                    let duration = self.frame_duration(&current, &next);
                    if self.frame_drop.allows(self.master_sync_type())
                        && time > refresh.frame_timer + duration
                    {
                        // 已经晚于下一帧的显示时刻，丢掉当前帧追赶
                        self.frame_drops_late.fetch_add(1, Ordering::Relaxed);
                        track.frames.next();
                        continue;
                    }
                }
            }

            track.frames.next();
            refresh.force_refresh = true;
            break;
        }

        self.display(track);
    }

    fn display(&self, track: &VideoTrack) {
        let shown = {
            let mut refresh = self.refresh.lock();
            if !refresh.force_refresh || !track.frames.rindex_shown() {
                return;
            }
            refresh.force_refresh = false;
            track.frames.peek_last()
        };
        if let Some(frame) = shown {
            self.frames_displayed.fetch_add(1, Ordering::Relaxed);
            if let Some(surface) = &self.surface {
                surface.render(&frame);
            }
        }
    }

    /// 启动视频刷新线程
    pub fn start_refresh(self: &Arc<Self>) -> Result<()> {
        if self.video.is_none() {
            return Ok(());
        }
        let mut slot = self.refresh_thread.lock();
        if slot.is_some() {
            return Ok(());
        }
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let sync = self.clone();
        let handle = thread::Builder::new()
            .name("splayer-video-refresh".to_string())
            .spawn(move || {
                info!("{} 🎬 视频刷新线程启动", log_ctx());
                loop {
                    let mut remaining = sync.refresh_interval.as_secs_f64();
                    let force = sync.refresh.lock().force_refresh;
                    if !sync.is_paused() || force {
                        sync.refresh_video(&mut remaining);
                    }
                    match stop_rx.recv_timeout(Duration::from_secs_f64(remaining.max(0.0))) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        _ => break,
                    }
                }
                info!("{} 🎬 视频刷新线程结束", log_ctx());
            })
            .map_err(|e| PlayerError::Other(format!("无法启动视频刷新线程: {}", e)))?;
        *slot = Some((stop_tx, handle));
        Ok(())
    }

    /// 停止视频刷新线程并等待退出
    pub fn stop_refresh(&self) {
        let taken = self.refresh_thread.lock().take();
        if let Some((stop_tx, handle)) = taken {
            let _ = stop_tx.send(());
            let _ = handle.join();
        }
    }
}
