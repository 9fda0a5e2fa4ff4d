use crate::core::{Packet, PlayerConfig, PlayerError, Result};
use crate::player::decoder::MediaDecoder;
use crate::player::demuxer_source::{MediaSource, ReadOutcome};
use crate::player::log_ctx;
use crate::player::sync::MediaSync;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Demuxer 线程命令
pub enum DemuxerCommand {
    /// Seek 到指定位置（毫秒），完成后通过 `done` 回复实际位置
    Seek {
        position_ms: i64,
        done: Sender<Result<i64>>,
    },
    Stop,
}

/// Demuxer 线程对外的回调
pub struct DemuxerHooks {
    /// 读包错误（错误码 ReadPacket）
    pub on_error: Box<dyn Fn(PlayerError) + Send>,
    /// 所有解码器都播放完毕且不再循环；返回 false 表示当前状态不能完成（例如暂停中），稍后重试
    pub on_complete: Box<dyn Fn() -> bool + Send>,
}

/// Demuxer 线程运行所需的上下文
pub struct DemuxerContext {
    pub decoders: Vec<Arc<dyn MediaDecoder>>,
    pub sync: Arc<MediaSync>,
    /// 与解码器共享的 seek 锁
    pub seek_lock: Arc<Mutex<()>>,
    /// 解码器包队列见底时的唤醒信号
    pub read_wake: Receiver<()>,
    pub config: PlayerConfig,
    /// 网络流读包卡顿时不判定为结束，持续重试
    pub retry_forever: bool,
    pub hooks: DemuxerHooks,
}

/// Demuxer 线程管理器
///
/// 单个读包线程：读包、按流索引分发到解码器的包队列、缓冲足够时短暂等待；
/// Seek 通过命令通道串行执行，保证 "清空队列 + 压入刷新哨兵 + 重新定位" 的原子性。
pub struct DemuxerThread {
    thread_handle: Mutex<Option<JoinHandle<()>>>,
    command_tx: Sender<DemuxerCommand>,
}

impl DemuxerThread {
    /// 启动 Demuxer 线程
    pub fn start(source: Box<dyn MediaSource>, context: DemuxerContext) -> Result<Self> {
        let (command_tx, command_rx) = unbounded::<DemuxerCommand>();
        let thread_handle = thread::Builder::new()
            .name("splayer-demux".to_string())
            .spawn(move || {
                let mut demux = DemuxLoop::new(source, context, command_rx);
                demux.run();
            })
            .map_err(|e| PlayerError::Other(format!("无法启动 Demuxer 线程: {}", e)))?;

        Ok(Self {
            thread_handle: Mutex::new(Some(thread_handle)),
            command_tx,
        })
    }

    /// 发送 Seek 命令并等待确认，返回实际定位的位置（毫秒）
    pub fn seek(&self, position_ms: i64, timeout: Duration) -> Result<i64> {
        let (done_tx, done_rx) = bounded(1);
        self.command_tx
            .send(DemuxerCommand::Seek {
                position_ms,
                done: done_tx,
            })
            .map_err(|e| PlayerError::SeekError(format!("发送 Seek 命令失败: {}", e)))?;
        match done_rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(PlayerError::SeekError(format!(
                "等待 Seek 确认超时 ({}ms)",
                timeout.as_millis()
            ))),
            Err(RecvTimeoutError::Disconnected) => {
                Err(PlayerError::SeekError("Demuxer 线程已退出".to_string()))
            }
        }
    }

    /// 停止线程并等待退出
    pub fn stop(&self) {
        let _ = self.command_tx.send(DemuxerCommand::Stop);
        let handle = self.thread_handle.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            let _ = handle.join();
            info!("{} 🛑 Demuxer 线程已停止", log_ctx());
        }
    }
}

impl Drop for DemuxerThread {
    fn drop(&mut self) {
        if self.thread_handle.lock().is_some() {
            warn!("{} ⚠ DemuxerThread 被 drop，但未调用 stop()，正在尝试优雅停止", log_ctx());
            self.stop();
        }
    }
}

/// 读包线程的私有状态
struct DemuxLoop {
    source: Box<dyn MediaSource>,
    ctx: DemuxerContext,
    command_rx: Receiver<DemuxerCommand>,
    eof: bool,
    completed: bool,
    /// 完成回调被拒绝过，等待重试
    complete_deferred: bool,
    /// 循环 seek 失败后不再循环
    loop_broken: bool,
    /// 已经完整播放的次数
    plays: u32,
    /// 连续 "暂不可用" 的次数
    stalls: u32,
    /// 本轮卡顿已经上报过错误
    stall_reported: bool,
    packet_count: usize,
}

impl DemuxLoop {
    fn new(
        source: Box<dyn MediaSource>,
        ctx: DemuxerContext,
        command_rx: Receiver<DemuxerCommand>,
    ) -> Self {
        Self {
            source,
            ctx,
            command_rx,
            eof: false,
            completed: false,
            complete_deferred: false,
            loop_broken: false,
            plays: 0,
            stalls: 0,
            stall_reported: false,
            packet_count: 0,
        }
    }

    fn run(&mut self) {
        info!("{} 🎬 Demuxer 线程启动: {}", log_ctx(), self.source.description());

        loop {
            // 优先处理所有命令（非阻塞）
            let mut stopping = false;
            while let Ok(command) = self.command_rx.try_recv() {
                match command {
                    DemuxerCommand::Seek { position_ms, done } => {
                        info!("{} ⏩ Demuxer 线程收到 Seek 命令: {}ms", log_ctx(), position_ms);
                        let result = self.seek(position_ms);
                        if let Err(e) = &result {
                            error!("{} ❌ Seek 失败: {}", log_ctx(), e);
                        }
                        let _ = done.send(result);
                    }
                    DemuxerCommand::Stop => {
                        info!("{} ⏹ Demuxer 线程收到停止命令", log_ctx());
                        stopping = true;
                        break;
                    }
                }
            }
            if stopping {
                break;
            }

            if self.buffers_full() {
                self.wait(self.ctx.config.demux_wait());
                continue;
            }

            if self.eof {
                if self.all_finished() {
                    self.on_playback_finished();
                }
                self.wait(self.ctx.config.demux_wait());
                continue;
            }

            self.read_once();
        }

        info!(
            "{} 🛑 Demuxer 线程退出（共读取 {} 个包）",
            log_ctx(),
            self.packet_count
        );
    }

    /// 所有队列都有足够数据，或总字节数超过上限
    fn buffers_full(&self) -> bool {
        let queued: usize = self
            .ctx
            .decoders
            .iter()
            .map(|d| d.core().packets().size())
            .sum();
        queued > self.ctx.config.max_queue_bytes
            || self.ctx.decoders.iter().all(|d| d.has_enough_packets())
    }

    fn all_finished(&self) -> bool {
        self.ctx.decoders.iter().all(|d| d.is_finished())
    }

    /// 短暂等待：解码器队列见底时会提前唤醒
    fn wait(&self, timeout: Duration) {
        let _ = self.ctx.read_wake.recv_timeout(timeout);
    }

    fn read_once(&mut self) {
        match self.source.read_packet() {
            Ok(ReadOutcome::Packet(packet)) => {
                self.reset_stalls();
                self.route(packet);
            }
            Ok(ReadOutcome::Eof) => {
                self.reset_stalls();
                self.enter_eof();
            }
            Ok(ReadOutcome::WouldBlock) => {
                self.stall(None);
            }
            Err(e) => {
                warn!("{} ⚠️ 读取包失败: {}", log_ctx(), e);
                self.stall(Some(e));
            }
        }
    }

    fn reset_stalls(&mut self) {
        self.stalls = 0;
        self.stall_reported = false;
    }

    /// 读包暂时失败：短暂等待后重试，超过上限后本地文件判定为结束；
    /// 网络流每轮卡顿只上报一次错误，并继续重试
    fn stall(&mut self, error: Option<PlayerError>) {
        self.stalls += 1;
        if self.stalls >= self.ctx.config.read_retry_limit {
            let error = error.unwrap_or_else(|| {
                PlayerError::ReadError(format!("连续 {} 次读取不到数据", self.stalls))
            });
            self.stalls = 0;
            if !self.ctx.retry_forever {
                (self.ctx.hooks.on_error)(PlayerError::ReadError(error.to_string()));
                warn!("{} 📄 读取重试耗尽，按文件末尾处理", log_ctx());
                self.enter_eof();
                return;
            }
            if !self.stall_reported {
                self.stall_reported = true;
                (self.ctx.hooks.on_error)(PlayerError::ReadError(error.to_string()));
                warn!("{} 🌐 网络流读取卡顿，继续重试", log_ctx());
            }
        }
        self.wait(self.ctx.config.read_retry_interval());
    }

    fn route(&mut self, packet: Packet) {
        let Some(decoder) = self
            .ctx
            .decoders
            .iter()
            .find(|d| d.core().stream_index() == packet.stream_index)
        else {
            return;
        };
        self.packet_count += 1;
        if self.packet_count <= 5 || self.packet_count % 500 == 0 {
            debug!(
                "{} 📦 Demuxer 读取包 #{} (stream {}, pts {:?})",
                log_ctx(),
                self.packet_count,
                packet.stream_index,
                packet.pts
            );
        }
        if decoder.core().packets().push(packet).is_err() {
            debug!("{} 包队列已中止，丢弃数据包", log_ctx());
        }
    }

    /// 到达文件末尾：给每个解码器压入空包让其排空
    fn enter_eof(&mut self) {
        if self.eof {
            return;
        }
        info!("{} 📄 Demuxer 到达文件末尾，等待解码器排空", log_ctx());
        for decoder in &self.ctx.decoders {
            let core = decoder.core();
            let _ = core.packets().push_eof(core.stream_index());
        }
        self.eof = true;
    }

    fn on_playback_finished(&mut self) {
        if self.completed {
            return;
        }
        let loop_count = self.ctx.config.loop_count;
        if !self.loop_broken && (loop_count == 0 || self.plays + 1 < loop_count) {
            self.plays += 1;
            info!("{} 🔁 循环播放，第 {} 次结束", log_ctx(), self.plays);
            match self.seek(0) {
                Ok(_) => return,
                Err(e) => {
                    error!("{} ❌ 循环播放 Seek 失败: {}", log_ctx(), e);
                    self.loop_broken = true;
                }
            }
        }
        if (self.ctx.hooks.on_complete)() {
            info!("{} ✅ 播放完成", log_ctx());
            self.plays += 1;
            self.completed = true;
            self.complete_deferred = false;
        } else if !self.complete_deferred {
            debug!("{} 当前状态不能完成播放，稍后重试", log_ctx());
            self.complete_deferred = true;
        }
    }

    /// 清空队列、压入刷新哨兵、重新定位；与解码器的 flush 互斥
    fn seek(&mut self, position_ms: i64) -> Result<i64> {
        if !self.source.is_seekable() {
            return Err(PlayerError::SeekError("媒体源不支持 Seek".to_string()));
        }
        let duration = self.source.media_info().duration;
        let target = if duration > 0 {
            position_ms.clamp(0, duration)
        } else {
            position_ms.max(0)
        };

        let result = {
            let _guard = self.ctx.seek_lock.lock();
            for decoder in &self.ctx.decoders {
                decoder.flush();
                let _ = decoder.core().packets().push(Packet::flush());
            }
            self.source.seek_to(target)
        };
        result?;

        self.ctx.sync.reset_for_seek(target as f64 / 1000.0);
        self.eof = false;
        self.completed = false;
        self.complete_deferred = false;
        self.reset_stalls();
        info!("{} 🧹 Seek 完成: {}ms", log_ctx(), target);
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FrameDrop, SyncType};
    use crate::player::decoder::{AudioDecoder, DecoderCore};
    use crate::player::synthetic::{SyntheticConfig, SyntheticSource};
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    struct Fixture {
        demux: DemuxLoop,
        decoder: Arc<AudioDecoder>,
        errors: Arc<AtomicU32>,
        completions: Arc<AtomicU32>,
        accept_complete: Arc<AtomicBool>,
        _wake: Sender<()>,
        _commands: Sender<DemuxerCommand>,
    }

    fn test_config() -> PlayerConfig {
        PlayerConfig {
            read_retry_limit: 3,
            read_retry_interval_ms: 1,
            demux_wait_ms: 1,
            ..PlayerConfig::default()
        }
    }

    fn fixture(media: SyntheticConfig, config: PlayerConfig, retry_forever: bool) -> Fixture {
        let mut source = SyntheticSource::new(SyntheticConfig {
            video: false,
            ..media
        });
        let stream = source.media_info().audio_stream().cloned().unwrap();
        let codec = source.open_codec(stream.index).unwrap();
        let seek_lock = Arc::new(Mutex::new(()));
        let decoder = Arc::new(AudioDecoder::new(DecoderCore::new(
            stream,
            codec,
            4,
            &config,
            seek_lock.clone(),
            None,
        )));
        decoder.core().start();
        let sync = Arc::new(MediaSync::new(
            &config,
            SyncType::External,
            FrameDrop::Auto,
            3600.0,
            None,
            None,
            None,
        ));

        let errors = Arc::new(AtomicU32::new(0));
        let completions = Arc::new(AtomicU32::new(0));
        let accept_complete = Arc::new(AtomicBool::new(true));
        let hooks = {
            let errors = errors.clone();
            let completions = completions.clone();
            let accept = accept_complete.clone();
            DemuxerHooks {
                on_error: Box::new(move |e: PlayerError| {
                    assert!(matches!(e, PlayerError::ReadError(_)));
                    errors.fetch_add(1, Ordering::SeqCst);
                }),
                on_complete: Box::new(move || {
                    completions.fetch_add(1, Ordering::SeqCst);
                    accept.load(Ordering::SeqCst)
                }),
            }
        };

        let (wake_tx, wake_rx) = bounded(1);
        let (command_tx, command_rx) = unbounded();
        let context = DemuxerContext {
            decoders: vec![decoder.clone() as Arc<dyn MediaDecoder>],
            sync,
            seek_lock,
            read_wake: wake_rx,
            config,
            retry_forever,
            hooks,
        };
        Fixture {
            demux: DemuxLoop::new(Box::new(source), context, command_rx),
            decoder,
            errors,
            completions,
            accept_complete,
            _wake: wake_tx,
            _commands: command_tx,
        }
    }

    fn stalling(stall_length: u32) -> SyntheticConfig {
        SyntheticConfig {
            stall_every: 1,
            stall_length,
            ..SyntheticConfig::default()
        }
    }

    #[test]
    fn test_local_stall_becomes_eof_after_retry_limit() {
        let mut f = fixture(stalling(100), test_config(), false);
        f.demux.read_once();
        assert_eq!(f.demux.packet_count, 1);

        f.demux.read_once();
        f.demux.read_once();
        assert!(!f.demux.eof);
        assert_eq!(f.errors.load(Ordering::SeqCst), 0);

        f.demux.read_once();
        assert!(f.demux.eof);
        assert_eq!(f.errors.load(Ordering::SeqCst), 1);
        // flush 哨兵 + 数据包 + EOF 空包
        assert_eq!(f.decoder.core().packets().nb_packets(), 3);
    }

    #[test]
    fn test_network_stall_retries_and_reports_once_per_episode() {
        let mut f = fixture(stalling(10), test_config(), true);
        f.demux.read_once();
        for _ in 0..10 {
            f.demux.read_once();
        }
        // 10 次卡顿跨过 3 次重试上限，但只上报一次，也不判定为结束
        assert_eq!(f.errors.load(Ordering::SeqCst), 1);
        assert!(!f.demux.eof);

        // 数据恢复后，下一轮卡顿重新上报
        f.demux.read_once();
        assert_eq!(f.demux.packet_count, 2);
        for _ in 0..3 {
            f.demux.read_once();
        }
        assert_eq!(f.errors.load(Ordering::SeqCst), 2);
        assert!(!f.demux.eof);
    }

    #[test]
    fn test_backlog_over_byte_cap_pauses_reading() {
        let config = PlayerConfig {
            max_queue_bytes: 16,
            ..test_config()
        };
        let mut f = fixture(SyntheticConfig::default(), config, false);
        assert!(!f.demux.buffers_full());
        for _ in 0..3 {
            f.demux.read_once();
        }
        assert!(f.decoder.core().packets().size() > 16);
        assert!(f.demux.buffers_full());
    }

    #[test]
    fn test_backlog_when_every_decoder_has_enough() {
        let f = fixture(SyntheticConfig::default(), test_config(), false);
        assert!(!f.demux.buffers_full());
        // 中止的队列视为 "已足够"
        f.decoder.core().packets().abort();
        assert!(f.decoder.has_enough_packets());
        assert!(f.demux.buffers_full());
    }

    #[test]
    fn test_seek_on_unseekable_source_fails() {
        let media = SyntheticConfig {
            seekable: false,
            ..SyntheticConfig::default()
        };
        let mut f = fixture(media, test_config(), false);
        let serial = f.decoder.core().packets().serial();
        assert!(matches!(f.demux.seek(1000), Err(PlayerError::SeekError(_))));
        assert_eq!(f.decoder.core().packets().serial(), serial);
    }

    #[test]
    fn test_seek_clamps_and_bumps_serial() {
        let mut f = fixture(SyntheticConfig::default(), test_config(), false);
        let serial = f.decoder.core().packets().serial();
        f.demux.enter_eof();
        assert_eq!(f.demux.seek(99_999).unwrap(), 10_000);
        assert_eq!(f.decoder.core().packets().serial(), serial + 1);
        assert!(!f.demux.eof);
    }

    #[test]
    fn test_rejected_completion_is_retried() {
        let mut f = fixture(SyntheticConfig::default(), test_config(), false);
        f.accept_complete.store(false, Ordering::SeqCst);
        f.demux.on_playback_finished();
        f.demux.on_playback_finished();
        assert!(!f.demux.completed);
        assert_eq!(f.completions.load(Ordering::SeqCst), 2);

        f.accept_complete.store(true, Ordering::SeqCst);
        f.demux.on_playback_finished();
        assert!(f.demux.completed);
        f.demux.on_playback_finished();
        assert_eq!(f.completions.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_loop_is_not_repeated_while_completion_waits() {
        let config = PlayerConfig {
            loop_count: 2,
            ..test_config()
        };
        let mut f = fixture(SyntheticConfig::default(), config, false);
        let serial = f.decoder.core().packets().serial();

        f.demux.on_playback_finished();
        assert_eq!(f.decoder.core().packets().serial(), serial + 1);
        assert_eq!(f.completions.load(Ordering::SeqCst), 0);

        f.accept_complete.store(false, Ordering::SeqCst);
        f.demux.on_playback_finished();
        f.demux.on_playback_finished();
        assert_eq!(f.decoder.core().packets().serial(), serial + 1);

        f.accept_complete.store(true, Ordering::SeqCst);
        f.demux.on_playback_finished();
        assert!(f.demux.completed);
        assert_eq!(f.demux.plays, 2);
    }
}
