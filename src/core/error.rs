use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 对外通知使用的稳定错误码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    OpenSource,
    NoPlayableStream,
    OpenCodec,
    OpenAudioOutput,
    ReadPacket,
    FrameQueueNotWritable,
    Seek,
    AudioWrite,
    Unknown,
}

impl ErrorCode {
    /// 数值错误码（宿主侧按数值匹配，不能随意改动）
    pub fn code(&self) -> i32 {
        match self {
            ErrorCode::OpenSource => 1001,
            ErrorCode::NoPlayableStream => 1002,
            ErrorCode::OpenCodec => 1003,
            ErrorCode::OpenAudioOutput => 1004,
            ErrorCode::ReadPacket => 1005,
            ErrorCode::FrameQueueNotWritable => 1006,
            ErrorCode::Seek => 1007,
            ErrorCode::AudioWrite => 1008,
            ErrorCode::Unknown => 1999,
        }
    }
}

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("配置解析错误: {0}")]
    ConfigError(#[from] serde_json::Error),

    #[error("无法打开媒体源: {0}")]
    OpenError(String),

    #[error("没有可播放的音视频流")]
    NoPlayableStream,

    #[error("无法打开解码器: {0}")]
    CodecOpenError(String),

    #[error("读取数据包失败: {0}")]
    ReadError(String),

    #[error("Seek 失败: {0}")]
    SeekError(String),

    #[error("音频输出错误: {0}")]
    AudioError(String),

    #[error("音频写入失败: {0}")]
    AudioWriteError(String),

    #[error("帧队列不可写")]
    FrameQueueNotWritable,

    #[error("队列已中止")]
    Aborted,

    #[error("其他错误: {0}")]
    Other(String),

    #[error("Anyhow 错误: {0}")]
    AnyhowError(#[from] anyhow::Error),
}

impl PlayerError {
    pub fn code(&self) -> ErrorCode {
        match self {
            PlayerError::OpenError(_) => ErrorCode::OpenSource,
            PlayerError::NoPlayableStream => ErrorCode::NoPlayableStream,
            PlayerError::CodecOpenError(_) => ErrorCode::OpenCodec,
            PlayerError::ReadError(_) => ErrorCode::ReadPacket,
            PlayerError::SeekError(_) => ErrorCode::Seek,
            PlayerError::AudioError(_) => ErrorCode::OpenAudioOutput,
            PlayerError::AudioWriteError(_) => ErrorCode::AudioWrite,
            PlayerError::FrameQueueNotWritable => ErrorCode::FrameQueueNotWritable,
            _ => ErrorCode::Unknown,
        }
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;

/// 编解码能力返回的状态
///
/// `Again` 对应 "暂时无法处理，需要先读出/送入数据"，调用方需重试而不是报错。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("资源暂不可用 (EAGAIN)")]
    Again,

    #[error("已到达流末尾")]
    Eof,

    #[error("编解码错误: {0}")]
    Other(String),
}

pub type CodecResult<T> = std::result::Result<T, CodecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_values_are_stable() {
        assert_eq!(ErrorCode::OpenSource.code(), 1001);
        assert_eq!(ErrorCode::OpenAudioOutput.code(), 1004);
        assert_eq!(ErrorCode::FrameQueueNotWritable.code(), 1006);
    }

    #[test]
    fn test_player_error_maps_to_code() {
        assert_eq!(PlayerError::OpenError("x".into()).code(), ErrorCode::OpenSource);
        assert_eq!(PlayerError::AudioError("x".into()).code(), ErrorCode::OpenAudioOutput);
        assert_eq!(PlayerError::Aborted.code(), ErrorCode::Unknown);
    }
}
