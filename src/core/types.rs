use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 媒体源位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceLocation {
    /// 本地文件（包括内置的合成源）
    LocalFile,

    /// 网络流
    NetworkStream(StreamProtocol),
}

impl SourceLocation {
    /// 按 url 的协议头和路径特征分类
    pub fn from_url(url: &str) -> Self {
        let protocol = if url.starts_with("rtsp://") {
            StreamProtocol::Rtsp
        } else if url.starts_with("rtmp://") {
            StreamProtocol::Rtmp
        } else if url.ends_with(".m3u8") || url.contains("/hls/") {
            StreamProtocol::Hls
        } else if url.starts_with("http://") || url.starts_with("https://") {
            StreamProtocol::Http
        } else {
            return SourceLocation::LocalFile;
        };
        SourceLocation::NetworkStream(protocol)
    }

    /// 网络流读包卡顿时允许无限重试
    pub fn is_network_stream(&self) -> bool {
        self.protocol().is_some()
    }

    pub fn protocol(&self) -> Option<StreamProtocol> {
        match self {
            SourceLocation::NetworkStream(protocol) => Some(*protocol),
            SourceLocation::LocalFile => None,
        }
    }
}

/// 流媒体协议
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamProtocol {
    Rtsp,
    Rtmp,
    Hls,
    Http,
}

impl StreamProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamProtocol::Rtsp => "rtsp",
            StreamProtocol::Rtmp => "rtmp",
            StreamProtocol::Hls => "hls",
            StreamProtocol::Http => "http",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Audio,
    Video,
}

/// 时间基（分数），pts * num / den = 秒
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBase {
    pub num: i32,
    pub den: i32,
}

impl TimeBase {
    pub const MILLIS: TimeBase = TimeBase { num: 1, den: 1000 };

    pub fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    pub fn as_f64(&self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }

    /// 时间戳转换为秒
    pub fn to_seconds(&self, ts: i64) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        ts as f64 * self.num as f64 / self.den as f64
    }
}

/// 数据包类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// 普通压缩数据
    Data,
    /// 刷新哨兵：其后入队的包属于新的 serial
    Flush,
    /// 空包：通知解码器排空缓存（文件末尾）
    Eof,
}

/// 压缩数据包
#[derive(Debug, Clone)]
pub struct Packet {
    pub kind: PacketKind,
    pub stream_index: i32,
    pub data: Vec<u8>,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    /// 时长（流时间基）
    pub duration: i64,
    /// 在文件中的字节位置，未知为 -1
    pub pos: i64,
    /// 入队时由 PacketQueue 打上的 serial
    pub serial: u32,
}

impl Packet {
    pub fn new(stream_index: i32, data: Vec<u8>) -> Self {
        Self {
            kind: PacketKind::Data,
            stream_index,
            data,
            pts: None,
            dts: None,
            duration: 0,
            pos: -1,
            serial: 0,
        }
    }

    pub fn with_timing(mut self, pts: i64, duration: i64) -> Self {
        self.pts = Some(pts);
        self.dts = Some(pts);
        self.duration = duration;
        self
    }

    pub fn with_pos(mut self, pos: i64) -> Self {
        self.pos = pos;
        self
    }

    /// 刷新哨兵
    pub fn flush() -> Self {
        Self {
            kind: PacketKind::Flush,
            ..Self::new(-1, Vec::new())
        }
    }

    /// 排空用的空包
    pub fn eof(stream_index: i32) -> Self {
        Self {
            kind: PacketKind::Eof,
            ..Self::new(stream_index, Vec::new())
        }
    }

    pub fn is_flush(&self) -> bool {
        self.kind == PacketKind::Flush
    }

    pub fn is_eof(&self) -> bool {
        self.kind == PacketKind::Eof
    }

    /// 计入队列的字节数
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// 单路流的描述
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamInfo {
    pub index: i32,
    pub media_type: MediaType,
    pub time_base: TimeBase,
    pub codec_name: String,
    /// 封面图（只有一帧的视频流）
    #[serde(default)]
    pub attached_pic: bool,
    /// 视频帧率
    #[serde(default)]
    pub frame_rate: Option<TimeBase>,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub sample_rate: u32,
    #[serde(default)]
    pub channels: u16,
}

/// 媒体信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaInfo {
    pub duration: i64, // 总时长（毫秒），未知为 0
    pub streams: Vec<StreamInfo>,
    /// 时间戳是否可能不连续（如 TS 流），影响最大帧时长判断
    #[serde(default)]
    pub discontinuous_timestamps: bool,
    #[serde(default)]
    pub seekable: bool,
}

impl MediaInfo {
    pub fn video_stream(&self) -> Option<&StreamInfo> {
        self.streams.iter().find(|s| s.media_type == MediaType::Video)
    }

    pub fn audio_stream(&self) -> Option<&StreamInfo> {
        self.streams.iter().find(|s| s.media_type == MediaType::Audio)
    }

    /// 两帧之间允许的最大时长（秒），超过认为时间戳跳变
    pub fn max_frame_duration(&self) -> f64 {
        if self.discontinuous_timestamps {
            10.0
        } else {
            3600.0
        }
    }
}

/// 像素格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    RGBA,
}

/// 音频采样格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleFormat {
    F32,
}

/// 帧格式元数据
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameFormat {
    None,
    Video {
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
    },
    Audio {
        sample_rate: u32,
        channels: u16,
        sample_format: SampleFormat,
        nb_samples: usize,
    },
}

/// 解码后的数据；使用 Arc 共享，拷贝帧只增加引用计数
#[derive(Debug, Clone, Default)]
pub enum FrameData {
    #[default]
    Empty,
    Pixels(Arc<[u8]>),
    Samples(Arc<[f32]>),
}

/// 编解码能力输出的原始帧
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    /// 流时间基下的 pts
    pub pts: Option<i64>,
    pub pkt_pos: i64,
    pub format: FrameFormat,
    pub data: FrameData,
}

/// 帧队列中的帧
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: FrameData,
    pub format: FrameFormat,
    /// 显示时间戳（秒），未知为 NaN
    pub pts: f64,
    /// 估计的帧时长（秒）
    pub duration: f64,
    /// 在文件中的字节位置
    pub pos: i64,
    pub serial: u32,
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            data: FrameData::Empty,
            format: FrameFormat::None,
            pts: f64::NAN,
            duration: 0.0,
            pos: -1,
            serial: 0,
        }
    }
}

impl Frame {
    /// 释放数据引用，槽位可以复用
    pub fn unref(&mut self) {
        *self = Frame::default();
    }

    pub fn nb_samples(&self) -> usize {
        match self.format {
            FrameFormat::Audio { nb_samples, .. } => nb_samples,
            _ => 0,
        }
    }

    pub fn samples(&self) -> &[f32] {
        match &self.data {
            FrameData::Samples(samples) => samples,
            _ => &[],
        }
    }
}

/// 主时钟来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncType {
    Audio,
    Video,
    External,
}

/// 视频丢帧策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameDrop {
    /// 从不丢帧
    Off,
    /// 主时钟不是视频时才丢帧
    Auto,
    /// 总是允许丢帧
    Always,
}

impl FrameDrop {
    /// 当前主时钟下是否允许丢帧
    pub fn allows(&self, master: SyncType) -> bool {
        match self {
            FrameDrop::Off => false,
            FrameDrop::Auto => master != SyncType::Video,
            FrameDrop::Always => true,
        }
    }
}

/// 缓冲状态信息（用于监控和调试）
#[derive(Debug, Clone, Default, Serialize)]
pub struct BufferStatus {
    /// 视频数据包队列长度
    pub video_packets: usize,

    /// 音频数据包队列长度
    pub audio_packets: usize,

    /// 视频帧队列长度
    pub video_frames: usize,

    /// 音频帧队列长度
    pub audio_frames: usize,

    /// 包队列总字节数
    pub queued_bytes: usize,
}

/// 播放器状态
///
/// `Pre*` 是异步提交屏障：调用线程同步进入，真正的工作在工作线程中完成后才提交目标状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    Idle,
    PreCreate,
    Create,
    Source,
    PreStart,
    Start,
    PrePlay,
    Play,
    Pause,
    PreStop,
    PreComplete,
    Complete,
    Stop,
    Destroy,
}

/// 播放器状态快照
#[derive(Debug, Clone, Serialize)]
pub struct PlayerSnapshot {
    pub state: State,
    pub position: i64, // 当前位置（毫秒）
    pub duration: i64, // 总时长（毫秒）
    pub volume: u8,    // 音量 0 - 100
    pub muted: bool,
    pub speed: f64,
    pub pitch: f64,
    pub media_info: Option<MediaInfo>,
}
