//! 内置的确定性媒体后端
//!
//! 不依赖任何真实的编解码库：`SyntheticSource` 按时间戳交错产生一路视频、一路音频的包，
//! `SyntheticCodec` 把包 "解码" 成帧，`NullAudioDevice` 按实时节奏吞掉采样，
//! `RecordingSurface` 记录渲染过的帧。用于无界面运行和测试。

use crate::core::{
    CodecError, CodecResult, DecodedFrame, Frame, FrameData, FrameFormat, MediaInfo, MediaType,
    Packet, PixelFormat, PlayerError, Result, SampleFormat, StreamInfo, TimeBase,
};
use crate::player::demuxer_source::{
    AudioDevice, AudioSpec, Codec, MediaSource, ReadOutcome, SourceOpener, VideoSurface,
};
use crate::player::log_ctx;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const URL_SCHEME: &str = "synthetic:";

const VIDEO_STREAM: i32 = 0;
const AUDIO_STREAM: i32 = 1;
/// 每个音频包的时长（毫秒）
const AUDIO_PACKET_MS: i64 = 20;

/// 合成媒体的参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub duration_ms: i64,
    pub video: bool,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    pub audio: bool,
    pub sample_rate: u32,
    pub channels: u16,
    pub seekable: bool,
    /// 每读多少个包插入一次 "暂不可用"，0 表示不插入
    pub stall_every: u32,
    /// 每次连续返回 "暂不可用" 的次数
    pub stall_length: u32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            duration_ms: 10_000,
            video: true,
            fps: 25,
            width: 32,
            height: 18,
            audio: true,
            sample_rate: 8000,
            channels: 2,
            seekable: true,
            stall_every: 0,
            stall_length: 0,
        }
    }
}

impl SyntheticConfig {
    /// 用 url 查询串覆盖参数，如 `synthetic:clip?duration_ms=3000&video=0`
    pub fn with_url(mut self, url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix(URL_SCHEME)
            .ok_or_else(|| PlayerError::OpenError(format!("不支持的媒体源: {}", url)))?;
        let Some((_, query)) = rest.split_once('?') else {
            return Ok(self);
        };
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let bad = || PlayerError::OpenError(format!("参数格式错误: {}={}", key, value));
            let flag = |v: &str| matches!(v, "1" | "true" | "yes");
            match key {
                "duration_ms" => self.duration_ms = value.parse().map_err(|_| bad())?,
                "video" => self.video = flag(value),
                "audio" => self.audio = flag(value),
                "fps" => self.fps = value.parse().map_err(|_| bad())?,
                "sample_rate" => self.sample_rate = value.parse().map_err(|_| bad())?,
                "channels" => self.channels = value.parse().map_err(|_| bad())?,
                "seekable" => self.seekable = flag(value),
                "stall_every" => self.stall_every = value.parse().map_err(|_| bad())?,
                "stall_length" => self.stall_length = value.parse().map_err(|_| bad())?,
                _ => warn!("{} 忽略未知参数: {}", log_ctx(), key),
            }
        }
        Ok(self)
    }

    fn frame_ms(&self) -> i64 {
        (1000 / self.fps.max(1)) as i64
    }

    fn samples_per_packet(&self) -> usize {
        (self.sample_rate as i64 * AUDIO_PACKET_MS / 1000) as usize
    }
}

/// 合成媒体源
pub struct SyntheticSource {
    config: SyntheticConfig,
    info: MediaInfo,
    next_video_ms: i64,
    next_audio_ms: i64,
    reads: u64,
    stall_left: u32,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        let mut streams = Vec::new();
        if config.video {
            streams.push(StreamInfo {
                index: VIDEO_STREAM,
                media_type: MediaType::Video,
                time_base: TimeBase::MILLIS,
                codec_name: "synthetic-video".to_string(),
                attached_pic: false,
                frame_rate: Some(TimeBase::new(config.fps.max(1) as i32, 1)),
                width: config.width,
                height: config.height,
                sample_rate: 0,
                channels: 0,
            });
        }
        if config.audio {
            streams.push(StreamInfo {
                index: AUDIO_STREAM,
                media_type: MediaType::Audio,
                time_base: TimeBase::MILLIS,
                codec_name: "synthetic-audio".to_string(),
                attached_pic: false,
                frame_rate: None,
                width: 0,
                height: 0,
                sample_rate: config.sample_rate,
                channels: config.channels,
            });
        }
        let info = MediaInfo {
            duration: config.duration_ms,
            streams,
            discontinuous_timestamps: false,
            seekable: config.seekable,
        };
        Self {
            config,
            info,
            next_video_ms: 0,
            next_audio_ms: 0,
            reads: 0,
            stall_left: 0,
        }
    }

    /// 只接受 `synthetic:` 开头 url 的打开器
    pub fn opener(config: SyntheticConfig) -> impl SourceOpener {
        move |url: &str| -> Result<Box<dyn MediaSource>> {
            let config = config.clone().with_url(url)?;
            info!("{} 打开合成媒体源: {}", log_ctx(), url);
            Ok(Box::new(SyntheticSource::new(config)) as Box<dyn MediaSource>)
        }
    }

    fn video_packet(&mut self) -> Packet {
        let pts = self.next_video_ms;
        let frame_ms = self.config.frame_ms();
        self.next_video_ms += frame_ms;
        Packet::new(VIDEO_STREAM, pts.to_le_bytes().to_vec())
            .with_timing(pts, frame_ms)
            .with_pos(pts)
    }

    fn audio_packet(&mut self) -> Packet {
        let pts = self.next_audio_ms;
        self.next_audio_ms += AUDIO_PACKET_MS;
        Packet::new(AUDIO_STREAM, pts.to_le_bytes().to_vec())
            .with_timing(pts, AUDIO_PACKET_MS)
            .with_pos(pts)
    }
}

impl MediaSource for SyntheticSource {
    fn media_info(&self) -> &MediaInfo {
        &self.info
    }

    fn read_packet(&mut self) -> Result<ReadOutcome> {
        if self.stall_left > 0 {
            self.stall_left -= 1;
            return Ok(ReadOutcome::WouldBlock);
        }
        self.reads += 1;
        if self.config.stall_every > 0 && self.reads % self.config.stall_every as u64 == 0 {
            self.stall_left = self.config.stall_length;
        }

        let duration = self.config.duration_ms;
        let video_left = self.config.video && self.next_video_ms < duration;
        let audio_left = self.config.audio && self.next_audio_ms < duration;
        let packet = match (video_left, audio_left) {
            (false, false) => return Ok(ReadOutcome::Eof),
            (true, false) => self.video_packet(),
            (false, true) => self.audio_packet(),
            (true, true) if self.next_video_ms <= self.next_audio_ms => self.video_packet(),
            (true, true) => self.audio_packet(),
        };
        Ok(ReadOutcome::Packet(packet))
    }

    fn seek_to(&mut self, timestamp_ms: i64) -> Result<()> {
        if !self.config.seekable {
            return Err(PlayerError::SeekError("合成媒体源不支持 Seek".to_string()));
        }
        // 对齐到不晚于目标的包边界
        let frame_ms = self.config.frame_ms();
        self.next_video_ms = timestamp_ms / frame_ms * frame_ms;
        self.next_audio_ms = timestamp_ms / AUDIO_PACKET_MS * AUDIO_PACKET_MS;
        self.stall_left = 0;
        debug!("{} 合成媒体源定位到 {}ms", log_ctx(), timestamp_ms);
        Ok(())
    }

    fn open_codec(&mut self, stream_index: i32) -> Result<Box<dyn Codec>> {
        let stream = self
            .info
            .streams
            .iter()
            .find(|s| s.index == stream_index)
            .ok_or_else(|| PlayerError::CodecOpenError(format!("没有索引为 {} 的流", stream_index)))?;
        let format = match stream.media_type {
            MediaType::Video => FrameFormat::Video {
                width: stream.width,
                height: stream.height,
                pixel_format: PixelFormat::RGBA,
            },
            MediaType::Audio => FrameFormat::Audio {
                sample_rate: stream.sample_rate,
                channels: stream.channels,
                sample_format: SampleFormat::F32,
                nb_samples: self.config.samples_per_packet(),
            },
        };
        Ok(Box::new(SyntheticCodec::new(format)))
    }

    fn description(&self) -> String {
        format!(
            "synthetic ({}ms, video={}, audio={})",
            self.config.duration_ms, self.config.video, self.config.audio
        )
    }
}

/// 合成解码器：只缓存一个包，帧被取走之前拒绝新包
pub struct SyntheticCodec {
    format: FrameFormat,
    held: Option<Packet>,
    draining: bool,
}

impl SyntheticCodec {
    pub fn new(format: FrameFormat) -> Self {
        Self {
            format,
            held: None,
            draining: false,
        }
    }

    fn render(&self, packet: &Packet) -> FrameData {
        let shade = (packet.pts.unwrap_or(0) / 40 % 256) as u8;
        match self.format {
            FrameFormat::Video { width, height, .. } => {
                FrameData::Pixels(Arc::from(vec![shade; (width * height * 4) as usize]))
            }
            FrameFormat::Audio {
                channels,
                nb_samples,
                ..
            } => FrameData::Samples(Arc::from(vec![0.0f32; nb_samples * channels as usize])),
            FrameFormat::None => FrameData::Empty,
        }
    }
}

impl Codec for SyntheticCodec {
    fn send_packet(&mut self, packet: &Packet) -> CodecResult<()> {
        if packet.is_eof() {
            self.draining = true;
            return Ok(());
        }
        if self.held.is_some() {
            return Err(CodecError::Again);
        }
        self.held = Some(packet.clone());
        Ok(())
    }

    fn receive_frame(&mut self) -> CodecResult<DecodedFrame> {
        match self.held.take() {
            Some(packet) => Ok(DecodedFrame {
                pts: packet.pts,
                pkt_pos: packet.pos,
                format: self.format,
                data: self.render(&packet),
            }),
            None if self.draining => Err(CodecError::Eof),
            None => Err(CodecError::Again),
        }
    }

    fn flush_buffers(&mut self) {
        self.held = None;
        self.draining = false;
    }
}

/// 无声音频设备的统计信息
#[derive(Debug)]
pub struct NullAudioStats {
    samples: AtomicU64,
    writes: AtomicU64,
    muted: AtomicBool,
    paused: AtomicBool,
    volume: Mutex<f32>,
    tempo: Mutex<f64>,
    pitch: Mutex<f64>,
}

impl NullAudioStats {
    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn volume(&self) -> f32 {
        *self.volume.lock()
    }

    pub fn tempo(&self) -> f64 {
        *self.tempo.lock()
    }

    pub fn pitch(&self) -> f64 {
        *self.pitch.lock()
    }
}

impl Default for NullAudioStats {
    fn default() -> Self {
        Self {
            samples: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            muted: AtomicBool::new(false),
            paused: AtomicBool::new(true),
            volume: Mutex::new(1.0),
            tempo: Mutex::new(1.0),
            pitch: Mutex::new(1.0),
        }
    }
}

/// 无声音频设备：按实时节奏（除以速率）消耗采样
pub struct NullAudioDevice {
    spec: Option<AudioSpec>,
    stats: Arc<NullAudioStats>,
    fail_open: bool,
}

impl NullAudioDevice {
    pub fn new() -> Self {
        Self {
            spec: None,
            stats: Arc::new(NullAudioStats::default()),
            fail_open: false,
        }
    }

    /// 打开时总是失败的设备
    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::new()
        }
    }

    /// 共享统计信息，便于在设备被播放器接管后继续观察
    pub fn with_stats(stats: Arc<NullAudioStats>) -> Self {
        Self {
            stats,
            ..Self::new()
        }
    }

    pub fn stats(&self) -> Arc<NullAudioStats> {
        self.stats.clone()
    }
}

impl Default for NullAudioDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioDevice for NullAudioDevice {
    fn open(&mut self, wanted: AudioSpec) -> Result<AudioSpec> {
        if self.fail_open {
            return Err(PlayerError::AudioError("无法打开音频设备".to_string()));
        }
        self.spec = Some(wanted);
        Ok(wanted)
    }

    fn write(&mut self, samples: &[f32]) -> Result<()> {
        let Some(spec) = self.spec else {
            return Err(PlayerError::AudioWriteError("音频设备未打开".to_string()));
        };
        self.stats.writes.fetch_add(1, Ordering::SeqCst);
        self.stats.samples.fetch_add(samples.len() as u64, Ordering::SeqCst);
        let frames = samples.len() as f64 / spec.channels.max(1) as f64;
        let tempo = self.stats.tempo().max(0.01);
        let secs = frames / spec.sample_rate.max(1) as f64 / tempo;
        std::thread::sleep(Duration::from_secs_f64(secs));
        Ok(())
    }

    fn pause(&mut self) {
        self.stats.paused.store(true, Ordering::SeqCst);
    }

    fn resume(&mut self) {
        self.stats.paused.store(false, Ordering::SeqCst);
    }

    fn stop(&mut self) {
        self.stats.paused.store(true, Ordering::SeqCst);
        self.spec = None;
    }

    fn set_volume(&mut self, volume: f32) {
        *self.stats.volume.lock() = volume;
    }

    fn set_mute(&mut self, mute: bool) {
        self.stats.muted.store(mute, Ordering::SeqCst);
    }

    fn set_tempo(&mut self, tempo: f64) {
        *self.stats.tempo.lock() = tempo;
    }

    fn set_pitch(&mut self, pitch: f64) {
        *self.stats.pitch.lock() = pitch;
    }
}

/// 渲染记录
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderedFrame {
    pub pts: f64,
    pub serial: u32,
}

/// 记录每一帧渲染的视频表面
#[derive(Debug, Default)]
pub struct RecordingSurface {
    frames: Mutex<Vec<RenderedFrame>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rendered(&self) -> Vec<RenderedFrame> {
        self.frames.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn last(&self) -> Option<RenderedFrame> {
        self.frames.lock().last().copied()
    }
}

impl VideoSurface for RecordingSurface {
    fn render(&self, frame: &Frame) {
        self.frames.lock().push(RenderedFrame {
            pts: frame.pts,
            serial: frame.serial,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(source: &mut SyntheticSource) -> Vec<Packet> {
        let mut packets = Vec::new();
        loop {
            match source.read_packet().unwrap() {
                ReadOutcome::Packet(p) => packets.push(p),
                ReadOutcome::WouldBlock => continue,
                ReadOutcome::Eof => break,
            }
        }
        packets
    }

    #[test]
    fn test_packets_are_interleaved_by_pts() {
        let mut source = SyntheticSource::new(SyntheticConfig {
            duration_ms: 200,
            ..SyntheticConfig::default()
        });
        let packets = read_all(&mut source);
        let video = packets.iter().filter(|p| p.stream_index == VIDEO_STREAM).count();
        let audio = packets.iter().filter(|p| p.stream_index == AUDIO_STREAM).count();
        assert_eq!(video, 5);
        assert_eq!(audio, 10);
        let pts: Vec<i64> = packets.iter().filter_map(|p| p.pts).collect();
        assert!(pts.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_seek_realigns_both_streams() {
        let mut source = SyntheticSource::new(SyntheticConfig::default());
        source.seek_to(5010).unwrap();
        let first: Vec<i64> = (0..2)
            .filter_map(|_| match source.read_packet().unwrap() {
                ReadOutcome::Packet(p) => p.pts,
                _ => None,
            })
            .collect();
        assert!(first.iter().all(|&pts| (5000..=5010).contains(&pts)));
    }

    #[test]
    fn test_url_overrides() {
        let config = SyntheticConfig::default()
            .with_url("synthetic:clip?duration_ms=3000&video=0")
            .unwrap();
        assert_eq!(config.duration_ms, 3000);
        assert!(!config.video);
        assert!(config.audio);

        assert!(SyntheticConfig::default().with_url("file:///a.mp4").is_err());
        assert!(SyntheticConfig::default()
            .with_url("synthetic:?duration_ms=abc")
            .is_err());
    }

    #[test]
    fn test_stalls_are_injected() {
        let mut source = SyntheticSource::new(SyntheticConfig {
            stall_every: 2,
            stall_length: 3,
            ..SyntheticConfig::default()
        });
        let outcomes: Vec<bool> = (0..6)
            .map(|_| matches!(source.read_packet().unwrap(), ReadOutcome::WouldBlock))
            .collect();
        assert_eq!(outcomes, vec![false, false, true, true, true, false]);
    }

    #[test]
    fn test_codec_rejects_second_packet_until_drained() {
        let mut source = SyntheticSource::new(SyntheticConfig::default());
        let mut codec = source.open_codec(AUDIO_STREAM).unwrap();
        let packet = Packet::new(AUDIO_STREAM, vec![0]).with_timing(0, 20);
        codec.send_packet(&packet).unwrap();
        assert_eq!(codec.send_packet(&packet), Err(CodecError::Again));
        let frame = codec.receive_frame().unwrap();
        assert_eq!(frame.pts, Some(0));
        assert_eq!(codec.receive_frame().unwrap_err(), CodecError::Again);

        codec.send_packet(&Packet::eof(AUDIO_STREAM)).unwrap();
        assert_eq!(codec.receive_frame().unwrap_err(), CodecError::Eof);
        assert!(source.open_codec(7).is_err());
    }

    #[test]
    fn test_opener_accepts_only_synthetic_urls() {
        let opener = SyntheticSource::opener(SyntheticConfig::default());
        assert!(opener.open("synthetic:demo").is_ok());
        assert!(matches!(
            opener.open("/tmp/movie.mp4"),
            Err(PlayerError::OpenError(_))
        ));
    }
}
