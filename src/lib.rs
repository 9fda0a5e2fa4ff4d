//! 播放引擎：包队列、帧队列、解码线程、音视频同步与播放状态机

pub mod core;
pub mod player;

pub use crate::core::{ErrorCode, PlayerConfig, PlayerError, Result, State};
pub use crate::player::{PlaybackManager, PlayerEvent, PlayerListener};
