// 播放器核心模块

pub mod packet_queue;
pub mod frame_queue;
pub mod demuxer_source; // 媒体源、解码、音频设备与渲染面的抽象接口
pub mod demuxer_thread; // Demuxer 线程管理
pub mod decoder;
pub mod sync;
pub mod audio_output;
pub mod state;
pub mod notify;
pub mod manager;
pub mod synthetic; // 无需外部依赖的内置后端（测试和无头运行）

use std::process;
use std::thread;

pub use audio_output::AudioOutput;
pub use decoder::{AudioDecoder, DecoderCore, MediaDecoder, VideoDecoder};
pub use demuxer_source::{AudioDevice, AudioSpec, Codec, MediaSource, ReadOutcome, SourceOpener, VideoSurface};
pub use demuxer_thread::DemuxerThread;
pub use frame_queue::FrameQueue;
pub use manager::{PlaybackManager, PlaybackManagerBuilder};
pub use notify::{ChannelListener, MessageCenter, PlayerEvent, PlayerListener};
pub use packet_queue::PacketQueue;
pub use state::PlayerState;
pub use sync::MediaSync;

/// 日志前缀：进程号 + 线程号，用于区分交错的多线程输出
pub(crate) fn log_ctx() -> String {
    format!("[pid:{} tid:{:?}]", process::id(), thread::current().id())
}
