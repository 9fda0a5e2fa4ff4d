use crate::core::{CodecResult, DecodedFrame, Frame, MediaInfo, Packet, Result};

/// 读包结果
#[derive(Debug)]
pub enum ReadOutcome {
    /// 成功读取一个包
    Packet(Packet),
    /// 到达文件末尾
    Eof,
    /// 暂时没有数据（网络抖动等），稍后重试
    WouldBlock,
}

/// Demuxer 数据源抽象接口
///
/// 这个 trait 定义了解封装能力必须提供的方法，具体容器格式由外部实现。
/// 不同的媒体源（本地文件、网络流、内存流等）可以实现这个接口
pub trait MediaSource: Send {
    /// 获取媒体信息
    fn media_info(&self) -> &MediaInfo;

    /// 读取下一个媒体包
    ///
    /// 返回：
    /// - Ok(ReadOutcome::Packet): 成功读取一个包
    /// - Ok(ReadOutcome::Eof): 到达文件末尾
    /// - Ok(ReadOutcome::WouldBlock): 暂时无数据
    /// - Err(e): 读取错误
    fn read_packet(&mut self) -> Result<ReadOutcome>;

    /// Seek 到指定位置（毫秒）
    fn seek_to(&mut self, timestamp_ms: i64) -> Result<()>;

    /// 为指定流打开解码器
    fn open_codec(&mut self, stream_index: i32) -> Result<Box<dyn Codec>>;

    /// 是否支持 seek
    fn is_seekable(&self) -> bool {
        self.media_info().seekable
    }

    /// 获取描述信息（用于调试）
    fn description(&self) -> String;
}

/// 根据 URL 打开媒体源（耗时操作，在工作线程中调用）
pub trait SourceOpener: Send + Sync {
    fn open(&self, url: &str) -> Result<Box<dyn MediaSource>>;
}

impl<F> SourceOpener for F
where
    F: Fn(&str) -> Result<Box<dyn MediaSource>> + Send + Sync,
{
    fn open(&self, url: &str) -> Result<Box<dyn MediaSource>> {
        self(url)
    }
}

/// 编解码能力：两段式 send/receive
///
/// `send_packet` 与 `receive_frame` 都可能返回 `CodecError::Again`：
/// 前者表示需要先取走输出帧，后者表示需要送入新的包。
pub trait Codec: Send {
    fn send_packet(&mut self, packet: &Packet) -> CodecResult<()>;

    fn receive_frame(&mut self) -> CodecResult<DecodedFrame>;

    /// 清空解码器内部缓存（seek 后调用）
    fn flush_buffers(&mut self);
}

/// 音频输出参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpec {
    pub sample_rate: u32,
    pub channels: u16,
}

/// 音频输出设备
pub trait AudioDevice: Send {
    /// 打开设备，返回设备实际接受的参数
    fn open(&mut self, wanted: AudioSpec) -> Result<AudioSpec>;

    /// 写入交错的 f32 采样；设备缓冲满时可以阻塞以控制节奏
    fn write(&mut self, samples: &[f32]) -> Result<()>;

    fn pause(&mut self);

    fn resume(&mut self);

    /// 停止并关闭设备
    fn stop(&mut self);

    /// 音量 0.0 - 1.0
    fn set_volume(&mut self, volume: f32);

    fn set_mute(&mut self, mute: bool);

    /// 变速不变调
    fn set_tempo(&mut self, tempo: f64);

    fn set_pitch(&mut self, pitch: f64);

    /// 已写入但尚未播放的数据时长（秒）
    fn latency(&self) -> f64 {
        0.0
    }
}

/// 视频渲染表面
pub trait VideoSurface: Send + Sync {
    fn render(&self, frame: &Frame);
}
