use crate::core::{
    CodecError, DecodedFrame, Frame, FrameFormat, MediaType, Packet, PlayerConfig, PlayerError,
    Result, StreamInfo, TimeBase,
};
use crate::player::demuxer_source::Codec;
use crate::player::frame_queue::FrameQueue;
use crate::player::log_ctx;
use crate::player::packet_queue::PacketQueue;
use crate::player::sync::MediaSync;
use crossbeam_channel::Sender;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// 解码器能力集
///
/// 音频、视频两种解码器都组合同一个 `DecoderCore`（队列排空、serial 追踪、
/// send/receive 重试），只在帧时间戳换算和丢帧策略上不同。
pub trait MediaDecoder: Send + Sync {
    fn core(&self) -> &DecoderCore;

    /// 解码线程主循环，直到队列中止
    fn decode_loop(&self) -> Result<()>;

    /// 包队列是否已足够，解封装线程据此暂停读取
    fn has_enough_packets(&self) -> bool {
        self.core().has_enough_packets()
    }

    /// 已经解码到最后一个 serial 的末尾，且没有剩余帧
    fn is_finished(&self) -> bool {
        self.core().is_finished()
    }

    /// 清空包队列和帧队列
    fn flush(&self) {
        self.core().flush();
    }

    /// 中止队列并等待解码线程退出
    fn stop(&self) {
        self.core().stop();
    }
}

/// 解码线程私有的状态
#[derive(Default)]
struct DecodeState {
    /// send 与 receive 同时返回 EAGAIN 时暂存的包，下一轮重新送入
    pending: Option<Packet>,
    /// 正在解码的包所属 serial
    pkt_serial: u32,
    /// 音频：下一帧的预测 pts（采样数）
    next_pts: Option<i64>,
    frames: u64,
}

/// 解码器公共部分
pub struct DecoderCore {
    stream: StreamInfo,
    packets: Arc<PacketQueue>,
    frames: Arc<FrameQueue>,
    codec: Mutex<Box<dyn Codec>>,
    /// 与解封装线程共享：seek 时的 清空队列 + 重新定位 与解码器 flush 互斥
    seek_lock: Arc<Mutex<()>>,
    /// 包队列空了时唤醒解封装线程
    read_wake: Option<Sender<()>>,
    /// 已经排空到 EOF 的 serial，0 表示未结束
    finished: AtomicU32,
    min_frames: usize,
    enough_duration_secs: f64,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl DecoderCore {
    pub fn new(
        stream: StreamInfo,
        codec: Box<dyn Codec>,
        frame_queue_size: usize,
        config: &PlayerConfig,
        seek_lock: Arc<Mutex<()>>,
        read_wake: Option<Sender<()>>,
    ) -> Self {
        // 视频帧队列保留上一帧用于重绘和时长估计
        let keep_last = stream.media_type == MediaType::Video;
        Self {
            stream,
            packets: Arc::new(PacketQueue::new()),
            frames: Arc::new(FrameQueue::new(frame_queue_size, keep_last)),
            codec: Mutex::new(codec),
            seek_lock,
            read_wake,
            finished: AtomicU32::new(0),
            min_frames: config.min_frames,
            enough_duration_secs: config.enough_duration_secs,
            thread: Mutex::new(None),
        }
    }

    pub fn stream(&self) -> &StreamInfo {
        &self.stream
    }

    pub fn stream_index(&self) -> i32 {
        self.stream.index
    }

    pub fn media_type(&self) -> MediaType {
        self.stream.media_type
    }

    pub fn packets(&self) -> &Arc<PacketQueue> {
        &self.packets
    }

    pub fn frames(&self) -> &Arc<FrameQueue> {
        &self.frames
    }

    /// 开始接收数据：清除中止标志并压入第一个刷新哨兵
    pub fn start(&self) {
        self.finished.store(0, Ordering::SeqCst);
        self.frames.start();
        self.packets.start();
    }

    pub fn has_enough_packets(&self) -> bool {
        if self.stream.index < 0 || self.packets.is_aborted() || self.stream.attached_pic {
            return true;
        }
        let duration = self.packets.duration();
        self.packets.nb_packets() > self.min_frames
            && (duration == 0 || self.stream.time_base.to_seconds(duration) > self.enough_duration_secs)
    }

    pub fn is_finished(&self) -> bool {
        let finished = self.finished.load(Ordering::SeqCst);
        finished != 0
            && finished == self.packets.serial()
            && self.packets.nb_packets() == 0
            && self.frames.nb_remaining() == 0
    }

    pub fn flush(&self) {
        self.packets.flush();
        self.frames.flush();
    }

    pub fn stop(&self) {
        self.packets.abort();
        self.frames.abort();
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }

    fn wake_reader(&self) {
        if let Some(wake) = &self.read_wake {
            let _ = wake.try_send(());
        }
    }

    /// 解码出下一帧
    ///
    /// - `Ok(Some(frame))`: 得到一帧
    /// - `Ok(None)`: 当前 serial 已排空到 EOF
    /// - `Err(Aborted)`: 队列被中止
    fn decode_frame(&self, state: &mut DecodeState) -> Result<Option<DecodedFrame>> {
        loop {
            if self.packets.serial() == state.pkt_serial {
                loop {
                    if self.packets.is_aborted() {
                        return Err(PlayerError::Aborted);
                    }
                    let received = self.codec.lock().receive_frame();
                    match received {
                        Ok(frame) => return Ok(Some(frame)),
                        Err(CodecError::Eof) => {
                            self.finished.store(state.pkt_serial, Ordering::SeqCst);
                            self.codec.lock().flush_buffers();
                            return Ok(None);
                        }
                        Err(CodecError::Again) => break,
                        Err(CodecError::Other(e)) => {
                            warn!("{} {:?} 解码错误（已跳过）: {}", log_ctx(), self.media_type(), e);
                            break;
                        }
                    }
                }
            }

            let packet = loop {
                if self.packets.nb_packets() == 0 {
                    self.wake_reader();
                }
                let packet = match state.pending.take() {
                    Some(packet) => packet,
                    None => match self.packets.pop(true)? {
                        Some(packet) => packet,
                        None => continue,
                    },
                };
                if packet.serial != state.pkt_serial {
                    state.pkt_serial = packet.serial;
                    self.reset_codec(state);
                }
                if packet.is_flush() {
                    continue;
                }
                // 过期 serial 的包直接丢弃
                if packet.serial == self.packets.serial() {
                    break packet;
                }
            };

            let sent = self.codec.lock().send_packet(&packet);
            match sent {
                Ok(()) | Err(CodecError::Eof) => {}
                Err(CodecError::Again) => {
                    debug!(
                        "{} {:?} send_packet 与 receive_frame 同时返回 EAGAIN，暂存该包",
                        log_ctx(),
                        self.media_type()
                    );
                    state.pending = Some(packet);
                }
                Err(CodecError::Other(e)) => {
                    warn!("{} {:?} 送包失败（已跳过）: {}", log_ctx(), self.media_type(), e);
                }
            }
        }
    }

    /// 进入新 serial：在 seek 锁内清空解码器缓存
    fn reset_codec(&self, state: &mut DecodeState) {
        let _guard = self.seek_lock.lock();
        self.codec.lock().flush_buffers();
        self.finished.store(0, Ordering::SeqCst);
        state.next_pts = None;
        debug!(
            "{} {:?} 解码器进入 serial {}",
            log_ctx(),
            self.media_type(),
            state.pkt_serial
        );
    }

    /// 把填好的帧写入帧队列
    fn queue_frame(&self, frame: Frame) -> Result<()> {
        match self.frames.peek_writable() {
            Some(mut slot) => {
                *slot = frame;
                slot.push();
                Ok(())
            }
            None if self.packets.is_aborted() => Err(PlayerError::Aborted),
            None => Err(PlayerError::FrameQueueNotWritable),
        }
    }
}

/// 启动解码线程；线程异常退出时通过 `on_error` 上报
pub fn start_decoder(
    decoder: Arc<dyn MediaDecoder>,
    on_error: impl FnOnce(PlayerError) + Send + 'static,
) -> Result<()> {
    let name = match decoder.core().media_type() {
        MediaType::Video => "splayer-video-decoder",
        MediaType::Audio => "splayer-audio-decoder",
    };
    decoder.core().start();
    let worker = decoder.clone();
    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            info!("{} 🎞️ 解码线程启动: {:?}", log_ctx(), worker.core().media_type());
            match worker.decode_loop() {
                Ok(()) | Err(PlayerError::Aborted) => {
                    info!("{} 解码线程结束: {:?}", log_ctx(), worker.core().media_type());
                }
                Err(e) => {
                    error!("{} ❌ 解码线程异常退出: {}", log_ctx(), e);
                    on_error(e);
                }
            }
        })
        .map_err(|e| PlayerError::Other(format!("无法启动解码线程: {}", e)))?;
    *decoder.core().thread.lock() = Some(handle);
    Ok(())
}

/// 视频解码器
pub struct VideoDecoder {
    core: DecoderCore,
    sync: Arc<MediaSync>,
}

impl VideoDecoder {
    pub fn new(core: DecoderCore, sync: Arc<MediaSync>) -> Self {
        Self { core, sync }
    }

    /// 由帧率估计的单帧时长（秒）
    fn frame_duration(&self) -> f64 {
        match self.core.stream.frame_rate {
            Some(rate) if rate.num > 0 && rate.den > 0 => rate.den as f64 / rate.num as f64,
            _ => 0.0,
        }
    }

    /// 落后主时钟的帧在进入帧队列前丢弃
    fn should_drop(&self, pts: f64, pkt_serial: u32) -> bool {
        if pts.is_nan() || !self.sync.frame_drop().allows(self.sync.master_sync_type()) {
            return false;
        }
        let Some(master) = self.sync.master_clock() else {
            return false;
        };
        let diff = pts - master;
        diff.abs() < self.sync.nosync_threshold()
            && diff < 0.0
            && pkt_serial == self.sync.video_clock().serial()
            && self.core.packets.nb_packets() > 0
    }
}

impl MediaDecoder for VideoDecoder {
    fn core(&self) -> &DecoderCore {
        &self.core
    }

    fn decode_loop(&self) -> Result<()> {
        let mut state = DecodeState::default();
        let time_base = self.core.stream.time_base;
        let duration = self.frame_duration();
        loop {
            let Some(decoded) = self.core.decode_frame(&mut state)? else {
                continue;
            };
            let pts = decoded
                .pts
                .map(|pts| time_base.to_seconds(pts))
                .unwrap_or(f64::NAN);

            if self.should_drop(pts, state.pkt_serial) {
                self.sync.count_early_drop();
                continue;
            }

            state.frames += 1;
            if state.frames <= 3 || state.frames % 300 == 0 {
                debug!(
                    "{} 视频帧 #{}: pts={:.3}s serial={}",
                    log_ctx(),
                    state.frames,
                    pts,
                    state.pkt_serial
                );
            }
            self.core.queue_frame(Frame {
                data: decoded.data,
                format: decoded.format,
                pts,
                duration,
                pos: decoded.pkt_pos,
                serial: state.pkt_serial,
            })?;
        }
    }
}

/// 音频解码器
pub struct AudioDecoder {
    core: DecoderCore,
}

impl AudioDecoder {
    pub fn new(core: DecoderCore) -> Self {
        Self { core }
    }
}

impl MediaDecoder for AudioDecoder {
    fn core(&self) -> &DecoderCore {
        &self.core
    }

    fn decode_loop(&self) -> Result<()> {
        let mut state = DecodeState::default();
        let stream_tb = self.core.stream.time_base;
        loop {
            let Some(decoded) = self.core.decode_frame(&mut state)? else {
                continue;
            };
            let (sample_rate, nb_samples) = match decoded.format {
                FrameFormat::Audio {
                    sample_rate,
                    nb_samples,
                    ..
                } => (sample_rate, nb_samples),
                _ => (self.core.stream.sample_rate, 0),
            };
            if sample_rate == 0 {
                warn!("{} 音频帧缺少采样率，已丢弃", log_ctx());
                continue;
            }

            // 时间戳换算到 1/sample_rate，缺失时沿用上一帧推算的值
            let sample_tb = TimeBase::new(1, sample_rate as i32);
            let pts = decoded
                .pts
                .map(|pts| (stream_tb.to_seconds(pts) * sample_rate as f64).round() as i64)
                .or(state.next_pts);
            if let Some(pts) = pts {
                state.next_pts = Some(pts + nb_samples as i64);
            }

            state.frames += 1;
            if state.frames <= 3 || state.frames % 500 == 0 {
                debug!(
                    "{} 音频帧 #{}: pts={:?} samples={} serial={}",
                    log_ctx(),
                    state.frames,
                    pts,
                    nb_samples,
                    state.pkt_serial
                );
            }
            self.core.queue_frame(Frame {
                data: decoded.data,
                format: decoded.format,
                pts: pts.map(|p| sample_tb.to_seconds(p)).unwrap_or(f64::NAN),
                duration: nb_samples as f64 / sample_rate as f64,
                pos: decoded.pkt_pos,
                serial: state.pkt_serial,
            })?;
        }
    }
}
