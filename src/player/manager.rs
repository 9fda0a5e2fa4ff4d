use crate::core::{
    BufferStatus, FrameDrop, MediaInfo, PlayerConfig, PlayerError, PlayerSnapshot, Result,
    SourceLocation, State, SyncType,
};
use crate::player::audio_output::AudioOutput;
use crate::player::decoder::{start_decoder, AudioDecoder, DecoderCore, MediaDecoder, VideoDecoder};
use crate::player::demuxer_source::{AudioDevice, AudioSpec, MediaSource, SourceOpener, VideoSurface};
use crate::player::demuxer_thread::{DemuxerContext, DemuxerHooks, DemuxerThread};
use crate::player::log_ctx;
use crate::player::notify::{MessageCenter, PlayerEvent, PlayerListener};
use crate::player::state::PlayerState;
use crate::player::sync::{MediaSync, VideoTrack};
use crate::player::synthetic::{NullAudioDevice, SyntheticConfig, SyntheticSource};
use crossbeam_channel::{bounded, Receiver};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// 每次 start 打开一个新的音频设备
pub type AudioDeviceFactory = Arc<dyn Fn() -> Box<dyn AudioDevice> + Send + Sync>;

/// 音量、静音、速率、音调：不随会话重置
#[derive(Debug, Clone, Copy)]
struct Controls {
    volume: u8,
    muted: bool,
    speed: f64,
    pitch: f64,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            volume: 100,
            muted: false,
            speed: 1.0,
            pitch: 1.0,
        }
    }
}

/// 一次 start 到 stop 之间的播放会话
struct Session {
    info: MediaInfo,
    video: Option<Arc<VideoDecoder>>,
    audio: Option<Arc<AudioDecoder>>,
    sync: Arc<MediaSync>,
    audio_output: Option<AudioOutput>,
    demuxer: Mutex<Option<DemuxerThread>>,
}

impl Session {
    fn decoders(&self) -> Vec<Arc<dyn MediaDecoder>> {
        let mut decoders: Vec<Arc<dyn MediaDecoder>> = Vec::new();
        if let Some(video) = &self.video {
            decoders.push(video.clone());
        }
        if let Some(audio) = &self.audio {
            decoders.push(audio.clone());
        }
        decoders
    }

    fn apply_controls(&self, controls: Controls) {
        if let Some(output) = &self.audio_output {
            output.set_volume(controls.volume as f32 / 100.0);
            output.set_mute(controls.muted);
            output.set_tempo(controls.speed);
            output.set_pitch(controls.pitch);
        }
        self.sync.set_speed(controls.speed);
    }

    fn resume(&self) -> Result<()> {
        self.sync.set_paused(false);
        if let Some(output) = &self.audio_output {
            output.resume();
        }
        self.sync.start_refresh()
    }

    fn pause(&self) {
        if let Some(output) = &self.audio_output {
            output.pause();
        }
        self.sync.set_paused(true);
    }

    /// 停止所有线程：读包线程 → 解码线程（中止队列） → 输出线程
    fn teardown(&self) {
        info!("{} 🧹 清理播放会话", log_ctx());
        let demuxer = self.demuxer.lock().take();
        if let Some(demuxer) = demuxer {
            demuxer.stop();
        }
        for decoder in self.decoders() {
            decoder.stop();
        }
        if let Some(output) = &self.audio_output {
            output.stop();
        }
        self.sync.stop_refresh();
        info!(
            "{} ✅ 会话已清理（提前丢帧 {}，延迟丢帧 {}，显示 {} 帧）",
            log_ctx(),
            self.sync.frame_drops_early(),
            self.sync.frame_drops_late(),
            self.sync.frames_displayed()
        );
    }
}

/// 读包线程启动所需、由 `open_session` 准备好的部分
struct ThreadSetup {
    source: Box<dyn MediaSource>,
    seek_lock: Arc<Mutex<()>>,
    read_wake: Receiver<()>,
    retry_forever: bool,
}

struct PlayerInner {
    config: PlayerConfig,
    opener: Arc<dyn SourceOpener>,
    audio_factory: AudioDeviceFactory,
    surface: Option<Arc<dyn VideoSurface>>,
    listener: Option<Arc<dyn PlayerListener>>,

    state: PlayerState,
    messages: MessageCenter,
    url: Mutex<Option<String>>,
    session: Mutex<Option<Arc<Session>>>,
    media_info: Mutex<Option<MediaInfo>>,
    controls: Mutex<Controls>,
    last_position_ms: AtomicI64,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl PlayerInner {
    fn post(&self, event: PlayerEvent) {
        self.messages.post(event);
    }

    fn current_session(&self) -> Option<Arc<Session>> {
        self.session.lock().clone()
    }

    /// 在工作线程中执行 `job`，结束后递减计数并按需提交状态
    fn spawn_worker<F>(self: &Arc<Self>, name: &str, job: F)
    where
        F: FnOnce(&Arc<PlayerInner>) -> Result<()> + Send + 'static,
    {
        let inner = self.clone();
        let spawned = thread::Builder::new()
            .name(format!("splayer-worker-{}", name))
            .spawn(move || {
                let outcome = job(&inner);
                inner.finish_worker(outcome);
            });
        match spawned {
            Ok(handle) => {
                let mut workers = self.workers.lock();
                workers.retain(|h| !h.is_finished());
                workers.push(handle);
            }
            Err(e) => {
                error!("{} ❌ 无法启动工作线程 {}: {}", log_ctx(), name, e);
                self.finish_worker(Err(PlayerError::Other(format!("无法启动工作线程: {}", e))));
            }
        }
    }

    fn finish_worker(self: &Arc<Self>, outcome: Result<()>) {
        let done = self.state.complete_worker(outcome);
        if let Some(e) = &done.failure {
            error!("{} ❌ {} (错误码 {})", log_ctx(), e, e.code().code());
            self.post(PlayerEvent::error(e));
        }
        if done.teardown {
            // 清理线程已经在状态机中占位
            self.spawn_worker("teardown", |inner| {
                inner.teardown_session();
                Ok(())
            });
        }
        match done.committed {
            Some(State::Start) => self.post(PlayerEvent::Start),
            Some(State::Play) => self.post(PlayerEvent::Play),
            Some(State::Stop) => self.post(PlayerEvent::Stop),
            Some(State::Complete) => self.post(PlayerEvent::Complete),
            _ => {}
        }
    }

    fn teardown_session(&self) {
        let session = self.session.lock().take();
        if let Some(session) = session {
            if let Some(position) = session.sync.master_clock() {
                self.last_position_ms
                    .store((position * 1000.0) as i64, Ordering::SeqCst);
            }
            session.teardown();
        }
    }

    /// 运行期的致命错误：上报并停止
    fn fail(self: &Arc<Self>, err: PlayerError) {
        error!("{} ❌ 播放错误: {}", log_ctx(), err);
        self.post(PlayerEvent::error(&err));
        if self.state.transition(State::PreStop, 1).is_some() {
            self.spawn_worker("teardown", |inner| {
                inner.teardown_session();
                Ok(())
            });
        }
    }

    /// 所有解码器播放完毕；只有 Play 状态能进入完成流程
    fn complete_playback(self: &Arc<Self>) -> bool {
        if self.state.transition(State::PreComplete, 1).is_none() {
            return false;
        }
        self.spawn_worker("complete", |inner| {
            inner.teardown_session();
            let duration = inner.media_info.lock().as_ref().map(|i| i.duration);
            if let Some(duration) = duration.filter(|d| *d > 0) {
                inner.last_position_ms.store(duration, Ordering::SeqCst);
            }
            Ok(())
        });
        true
    }

    /// 打开媒体源、解码器、音频输出并启动所有线程（PreStart 工作线程）
    fn open_session(self: &Arc<Self>, url: &str) -> Result<Arc<Session>> {
        let location = SourceLocation::from_url(url);
        let mut source = self.opener.open(url).map_err(|e| match e {
            PlayerError::OpenError(_) => e,
            other => PlayerError::OpenError(other.to_string()),
        })?;
        let info = source.media_info().clone();
        info!(
            "{} 📂 媒体源已打开: {} (时长 {}ms，{} 路流)",
            log_ctx(),
            source.description(),
            info.duration,
            info.streams.len()
        );
        if let Some(protocol) = location.protocol() {
            info!(
                "{} 🌐 网络流 ({})，读包卡顿时持续重试",
                log_ctx(),
                protocol.as_str()
            );
        }

        let video_stream = info.video_stream().cloned();
        let audio_stream = info.audio_stream().cloned();
        if video_stream.is_none() && audio_stream.is_none() {
            return Err(PlayerError::NoPlayableStream);
        }

        let config = &self.config;
        let seek_lock = Arc::new(Mutex::new(()));
        let (wake_tx, wake_rx) = bounded::<()>(1);

        let video_core = match video_stream {
            Some(stream) => {
                let codec = source.open_codec(stream.index)?;
                Some(DecoderCore::new(
                    stream,
                    codec,
                    config.video_queue_size,
                    config,
                    seek_lock.clone(),
                    Some(wake_tx.clone()),
                ))
            }
            None => None,
        };
        let audio_core = match audio_stream {
            Some(stream) => {
                let codec = source.open_codec(stream.index)?;
                Some(DecoderCore::new(
                    stream,
                    codec,
                    config.audio_queue_size,
                    config,
                    seek_lock.clone(),
                    Some(wake_tx),
                ))
            }
            None => None,
        };

        let (sync_type, frame_drop) = {
            let fields = self.state.lock();
            (fields.sync_type, fields.frame_drop)
        };
        let sync = Arc::new(MediaSync::new(
            config,
            sync_type,
            frame_drop,
            info.max_frame_duration(),
            audio_core.as_ref().map(|c| c.packets().serial_handle()),
            video_core.as_ref().map(|c| VideoTrack {
                frames: c.frames().clone(),
                packets: c.packets().clone(),
            }),
            self.surface.clone(),
        ));
        sync.set_paused(true);
        info!("{} ⏱ 主时钟: {:?}", log_ctx(), sync.master_sync_type());

        let audio_output = match &audio_core {
            Some(core) => {
                let stream = core.stream();
                let spec = AudioSpec {
                    sample_rate: stream.sample_rate,
                    channels: stream.channels,
                };
                Some(AudioOutput::open((self.audio_factory)(), spec)?)
            }
            None => None,
        };

        let session = Arc::new(Session {
            info: info.clone(),
            video: video_core.map(|core| Arc::new(VideoDecoder::new(core, sync.clone()))),
            audio: audio_core.map(|core| Arc::new(AudioDecoder::new(core))),
            sync: sync.clone(),
            audio_output,
            demuxer: Mutex::new(None),
        });
        session.apply_controls(*self.controls.lock());

        let threads = ThreadSetup {
            source,
            seek_lock,
            read_wake: wake_rx,
            retry_forever: location.is_network_stream(),
        };
        if let Err(e) = self.start_threads(&session, threads) {
            session.teardown();
            return Err(e);
        }
        *self.media_info.lock() = Some(info);
        Ok(session)
    }

    fn start_threads(self: &Arc<Self>, session: &Arc<Session>, threads: ThreadSetup) -> Result<()> {
        let weak = Arc::downgrade(self);
        for decoder in session.decoders() {
            let weak = weak.clone();
            start_decoder(decoder, move |e| {
                if let Some(inner) = weak.upgrade() {
                    inner.fail(e);
                }
            })?;
        }

        if let (Some(output), Some(audio)) = (&session.audio_output, &session.audio) {
            let weak = weak.clone();
            output.start(
                audio.core().frames().clone(),
                audio.core().packets().clone(),
                session.sync.clone(),
                move |e| {
                    // 写入失败不中断播放，只上报
                    if let Some(inner) = weak.upgrade() {
                        inner.post(PlayerEvent::error(&e));
                    }
                },
            )?;
        }

        let on_error = {
            let weak = weak.clone();
            move |e: PlayerError| {
                if let Some(inner) = weak.upgrade() {
                    inner.post(PlayerEvent::error(&e));
                }
            }
        };
        let on_complete = {
            let weak: Weak<PlayerInner> = weak;
            move || match weak.upgrade() {
                Some(inner) => inner.complete_playback(),
                None => true,
            }
        };
        let demuxer = DemuxerThread::start(
            threads.source,
            DemuxerContext {
                decoders: session.decoders(),
                sync: session.sync.clone(),
                seek_lock: threads.seek_lock,
                read_wake: threads.read_wake,
                config: self.config.clone(),
                retry_forever: threads.retry_forever,
                hooks: DemuxerHooks {
                    on_error: Box::new(on_error),
                    on_complete: Box::new(on_complete),
                },
            },
        )?;
        *session.demuxer.lock() = Some(demuxer);
        Ok(())
    }
}

/// 播放管理器构建器
pub struct PlaybackManagerBuilder {
    config: PlayerConfig,
    opener: Option<Arc<dyn SourceOpener>>,
    audio_factory: Option<AudioDeviceFactory>,
    surface: Option<Arc<dyn VideoSurface>>,
    listener: Option<Arc<dyn PlayerListener>>,
}

impl PlaybackManagerBuilder {
    pub fn config(mut self, config: PlayerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn opener(mut self, opener: impl SourceOpener + 'static) -> Self {
        self.opener = Some(Arc::new(opener));
        self
    }

    pub fn audio_device<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn AudioDevice> + Send + Sync + 'static,
    {
        self.audio_factory = Some(Arc::new(factory));
        self
    }

    pub fn surface(mut self, surface: Arc<dyn VideoSurface>) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn listener(mut self, listener: Arc<dyn PlayerListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn build(self) -> PlaybackManager {
        let config = self.config.sanitized();
        info!("{} 🎮 创建播放管理器...", log_ctx());
        let state = PlayerState::new(config.sync_type, config.frame_drop);
        let inner = PlayerInner {
            opener: self
                .opener
                .unwrap_or_else(|| {
                    Arc::new(SyntheticSource::opener(SyntheticConfig::default())) as Arc<dyn SourceOpener>
                }),
            audio_factory: self
                .audio_factory
                .unwrap_or_else(|| {
                    Arc::new(|| Box::new(NullAudioDevice::new()) as Box<dyn AudioDevice>) as AudioDeviceFactory
                }),
            surface: self.surface,
            listener: self.listener,
            state,
            messages: MessageCenter::new(),
            url: Mutex::new(None),
            session: Mutex::new(None),
            media_info: Mutex::new(None),
            controls: Mutex::new(Controls::default()),
            last_position_ms: AtomicI64::new(0),
            workers: Mutex::new(Vec::new()),
            config,
        };
        PlaybackManager {
            inner: Arc::new(inner),
        }
    }
}

/// 播放管理器 - 整体控制播放流程
///
/// 所有公开操作都先经过状态机校验，非法调用被静默忽略；耗时操作在工作线程中完成，
/// 结果通过 `PlayerListener` 回调通知。
pub struct PlaybackManager {
    inner: Arc<PlayerInner>,
}

impl PlaybackManager {
    pub fn builder() -> PlaybackManagerBuilder {
        PlaybackManagerBuilder {
            config: PlayerConfig::default(),
            opener: None,
            audio_factory: None,
            surface: None,
            listener: None,
        }
    }

    pub fn new(config: PlayerConfig) -> Self {
        Self::builder().config(config).build()
    }

    /// Idle → PreCreate → Create：启动通知线程
    pub fn create(&self) {
        if self.inner.state.transition(State::PreCreate, 1).is_none() {
            return;
        }
        self.inner.spawn_worker("create", |inner| {
            inner.messages.start(inner.listener.clone())
        });
    }

    /// 设置媒体源（Create/Stop/Source/Complete 时有效）
    pub fn set_source(&self, url: &str) {
        if self.inner.state.transition(State::Source, 0).is_none() {
            warn!("{} ⚠️ 当前状态不能设置媒体源，忽略: {}", log_ctx(), url);
            return;
        }
        info!("{} 📂 设置媒体源: {}", log_ctx(), url);
        *self.inner.url.lock() = Some(url.to_string());
        *self.inner.media_info.lock() = None;
        self.inner.last_position_ms.store(0, Ordering::SeqCst);
        self.inner.state.reset_session();
    }

    /// 打开媒体并开始预缓冲（Source/Stop/Complete 时有效）
    pub fn start(&self) {
        let Some(url) = self.inner.url.lock().clone() else {
            warn!("{} ⚠️ 没有设置媒体源，忽略 start", log_ctx());
            return;
        };
        if self.inner.state.transition(State::PreStart, 1).is_none() {
            return;
        }
        self.inner.last_position_ms.store(0, Ordering::SeqCst);
        self.inner.spawn_worker("start", move |inner| {
            let session = inner.open_session(&url)?;
            // 打开期间可能已经 stop/destroy，此时由本线程释放自己的资源
            let fields = inner.state.lock();
            if fields.state == State::PreStart {
                *inner.session.lock() = Some(session);
            } else {
                drop(fields);
                info!("{} 打开完成时状态已改变，释放会话", log_ctx());
                session.teardown();
            }
            Ok(())
        });
    }

    /// 开始播放（Start 时异步提交，Pause 时立即恢复）
    pub fn play(&self) {
        if self.inner.state.transition_from(State::Pause, State::Play, 0) {
            if let Some(session) = self.inner.current_session() {
                if let Err(e) = session.resume() {
                    self.inner.fail(e);
                    return;
                }
            }
            self.inner.post(PlayerEvent::Play);
            return;
        }
        if self.inner.state.transition(State::PrePlay, 1).is_none() {
            return;
        }
        self.inner.spawn_worker("play", |inner| {
            let session = inner.current_session();
            let fields = inner.state.lock();
            if fields.state != State::PrePlay {
                return Ok(());
            }
            drop(fields);
            match session {
                Some(session) => session.resume(),
                None => Err(PlayerError::Other("没有可播放的会话".to_string())),
            }
        });
    }

    /// 暂停（Play 时有效）
    pub fn pause(&self) {
        if self.inner.state.transition(State::Pause, 0).is_none() {
            return;
        }
        if let Some(session) = self.inner.current_session() {
            session.pause();
        }
        self.inner.post(PlayerEvent::Pause);
    }

    /// 停止：所有工作线程完成后提交 Stop
    pub fn stop(&self) {
        if self.inner.state.transition(State::PreStop, 1).is_none() {
            return;
        }
        self.inner.spawn_worker("stop", |inner| {
            inner.teardown_session();
            Ok(())
        });
    }

    /// 跳转（Play 时有效）
    pub fn seek(&self, position_ms: i64) {
        if !self.inner.state.begin_seek() {
            debug!("{} 当前状态不能 seek 或已有 seek 进行中，忽略", log_ctx());
            return;
        }
        info!("{} 🎯 Seek 到: {} ms", log_ctx(), position_ms);
        self.inner.spawn_worker("seek", move |inner| {
            let timeout = inner.config.seek_timeout();
            let demuxer_result = inner.current_session().map(|session| {
                let demuxer = session.demuxer.lock();
                let result = match demuxer.as_ref() {
                    Some(demuxer) => demuxer.seek(position_ms, timeout),
                    None => Err(PlayerError::SeekError("Demuxer 未启动".to_string())),
                };
                result
            });
            match demuxer_result {
                Some(Ok(position)) => {
                    inner.last_position_ms.store(position, Ordering::SeqCst);
                    inner.post(PlayerEvent::SeekComplete {
                        position_ms: position,
                    });
                }
                Some(Err(e)) => {
                    warn!("{} ⚠️ Seek 失败: {}", log_ctx(), e);
                    inner.post(PlayerEvent::error(&e));
                }
                None => debug!("{} 会话已释放，放弃 seek", log_ctx()),
            }
            inner.state.end_seek();
            Ok(())
        });
    }

    /// 音量 0 - 100
    pub fn volume(&self, percent: u8) {
        let percent = percent.min(100);
        self.inner.controls.lock().volume = percent;
        if let Some(session) = self.audio_output_session() {
            if let Some(output) = &session.audio_output {
                output.set_volume(percent as f32 / 100.0);
            }
        }
    }

    pub fn mute(&self, mute: bool) {
        self.inner.controls.lock().muted = mute;
        if let Some(session) = self.audio_output_session() {
            if let Some(output) = &session.audio_output {
                output.set_mute(mute);
            }
        }
    }

    /// 播放速率（0.25 - 4.0）
    pub fn set_speed(&self, rate: f64) {
        if !rate.is_finite() || rate <= 0.0 {
            warn!("{} ⚠️ 无效的播放速率: {}", log_ctx(), rate);
            return;
        }
        let rate = rate.clamp(0.25, 4.0);
        self.inner.controls.lock().speed = rate;
        if let Some(session) = self.inner.current_session() {
            if let Some(output) = &session.audio_output {
                output.set_tempo(rate);
            }
            session.sync.set_speed(rate);
        }
    }

    pub fn set_pitch(&self, pitch: f64) {
        if !pitch.is_finite() || pitch <= 0.0 {
            warn!("{} ⚠️ 无效的音调: {}", log_ctx(), pitch);
            return;
        }
        self.inner.controls.lock().pitch = pitch;
        if let Some(session) = self.audio_output_session() {
            if let Some(output) = &session.audio_output {
                output.set_pitch(pitch);
            }
        }
    }

    fn audio_output_session(&self) -> Option<Arc<Session>> {
        self.inner
            .current_session()
            .filter(|s| s.audio_output.is_some())
    }

    /// 主时钟类型，下次 start 时生效
    pub fn set_sync_type(&self, sync_type: SyncType) {
        self.inner.state.set_sync_type(sync_type);
    }

    /// 丢帧策略，下次 start 时生效
    pub fn set_frame_drop(&self, frame_drop: FrameDrop) {
        self.inner.state.set_frame_drop(frame_drop);
    }

    /// 销毁：同步释放所有资源，之后所有操作都被忽略
    pub fn destroy(&self) {
        if self.inner.state.transition(State::Destroy, 0).is_none() {
            return;
        }
        info!("{} 💥 销毁播放器", log_ctx());
        self.inner.teardown_session();

        let workers: Vec<JoinHandle<()>> = self.inner.workers.lock().drain(..).collect();
        for handle in workers {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
        // 工作线程可能在退出前安装了新的会话
        self.inner.teardown_session();

        self.inner.post(PlayerEvent::Destroy);
        self.inner.messages.shutdown();
        info!("{} ✅ 播放器已销毁", log_ctx());
    }

    pub fn state(&self) -> State {
        self.inner.state.state()
    }

    /// 等待进入指定状态
    pub fn wait_for_state(&self, state: State, timeout: Duration) -> bool {
        self.inner.state.wait_for(state, timeout)
    }

    pub fn is_seeking(&self) -> bool {
        self.inner.state.is_seeking()
    }

    /// 尚未完成的工作线程数
    pub fn outstanding_workers(&self) -> usize {
        self.inner.state.outstanding()
    }

    /// 当前位置（毫秒）
    pub fn position_ms(&self) -> i64 {
        let live = self
            .inner
            .current_session()
            .and_then(|session| session.sync.master_clock());
        match live {
            Some(seconds) => {
                let position = (seconds * 1000.0).max(0.0) as i64;
                match self.duration_ms() {
                    duration if duration > 0 => position.min(duration),
                    _ => position,
                }
            }
            None => self.inner.last_position_ms.load(Ordering::SeqCst),
        }
    }

    /// 总时长（毫秒），未知为 0
    pub fn duration_ms(&self) -> i64 {
        self.inner
            .media_info
            .lock()
            .as_ref()
            .map(|info| info.duration)
            .unwrap_or(0)
    }

    pub fn media_info(&self) -> Option<MediaInfo> {
        self.inner.media_info.lock().clone()
    }

    /// 当前会话各队列的缓冲情况
    pub fn buffer_status(&self) -> BufferStatus {
        let Some(session) = self.inner.current_session() else {
            return BufferStatus::default();
        };
        let mut status = BufferStatus::default();
        if let Some(video) = &session.video {
            status.video_packets = video.core().packets().nb_packets();
            status.video_frames = video.core().frames().nb_remaining();
            status.queued_bytes += video.core().packets().size();
        }
        if let Some(audio) = &session.audio {
            status.audio_packets = audio.core().packets().nb_packets();
            status.audio_frames = audio.core().frames().nb_remaining();
            status.queued_bytes += audio.core().packets().size();
        }
        status
    }

    /// 状态快照（可序列化，供宿主展示）
    pub fn snapshot(&self) -> PlayerSnapshot {
        let controls = *self.inner.controls.lock();
        let media_info = self
            .inner
            .current_session()
            .map(|session| session.info.clone())
            .or_else(|| self.media_info());
        PlayerSnapshot {
            state: self.state(),
            position: self.position_ms(),
            duration: self.duration_ms(),
            volume: controls.volume,
            muted: controls.muted,
            speed: controls.speed,
            pitch: controls.pitch,
            media_info,
        }
    }
}

impl Default for PlaybackManager {
    fn default() -> Self {
        Self::new(PlayerConfig::default())
    }
}

impl Drop for PlaybackManager {
    fn drop(&mut self) {
        self.destroy();
    }
}
