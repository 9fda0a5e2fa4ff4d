use crate::core::{ErrorCode, PlayerError};
use crate::player::log_ctx;
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// 宿主侧回调
///
/// 所有回调都在通知线程上执行，不会阻塞解码或解封装线程。
pub trait PlayerListener: Send + Sync {
    fn on_start(&self) {}

    fn on_play(&self) {}

    fn on_pause(&self) {}

    fn on_stop(&self) {}

    fn on_complete(&self) {}

    fn on_error(&self, _code: i32, _message: &str) {}

    fn on_seek_complete(&self, _position_ms: i64) {}

    fn on_destroy(&self) {}
}

/// 播放器事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlayerEvent {
    Start,
    Play,
    Pause,
    Stop,
    Complete,
    Error { code: i32, message: String },
    SeekComplete { position_ms: i64 },
    Destroy,
}

impl PlayerEvent {
    pub fn error(err: &PlayerError) -> Self {
        PlayerEvent::Error {
            code: err.code().code(),
            message: err.to_string(),
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            PlayerEvent::Error { code, .. } => [
                ErrorCode::OpenSource,
                ErrorCode::NoPlayableStream,
                ErrorCode::OpenCodec,
                ErrorCode::OpenAudioOutput,
                ErrorCode::ReadPacket,
                ErrorCode::FrameQueueNotWritable,
                ErrorCode::Seek,
                ErrorCode::AudioWrite,
            ]
            .into_iter()
            .find(|c| c.code() == *code)
            .or(Some(ErrorCode::Unknown)),
            _ => None,
        }
    }

    fn dispatch(&self, listener: &dyn PlayerListener) {
        match self {
            PlayerEvent::Start => listener.on_start(),
            PlayerEvent::Play => listener.on_play(),
            PlayerEvent::Pause => listener.on_pause(),
            PlayerEvent::Stop => listener.on_stop(),
            PlayerEvent::Complete => listener.on_complete(),
            PlayerEvent::Error { code, message } => listener.on_error(*code, message),
            PlayerEvent::SeekComplete { position_ms } => listener.on_seek_complete(*position_ms),
            PlayerEvent::Destroy => listener.on_destroy(),
        }
    }
}

/// 消息中心：事件经无界通道投递到专用的通知线程
pub struct MessageCenter {
    sender: Mutex<Option<Sender<PlayerEvent>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl MessageCenter {
    pub fn new() -> Self {
        Self {
            sender: Mutex::new(None),
            thread: Mutex::new(None),
        }
    }

    /// 启动通知线程；重复调用无副作用
    pub fn start(&self, listener: Option<Arc<dyn PlayerListener>>) -> crate::core::Result<()> {
        let mut sender = self.sender.lock();
        if sender.is_some() {
            return Ok(());
        }
        let (tx, rx) = unbounded::<PlayerEvent>();
        let handle = thread::Builder::new()
            .name("splayer-notify".to_string())
            .spawn(move || {
                debug!("{} 📨 通知线程启动", log_ctx());
                for event in rx {
                    debug!("{} 📨 {:?}", log_ctx(), event);
                    if let Some(listener) = &listener {
                        event.dispatch(listener.as_ref());
                    }
                }
                debug!("{} 📨 通知线程结束", log_ctx());
            })
            .map_err(|e| PlayerError::Other(format!("无法启动通知线程: {}", e)))?;
        *sender = Some(tx);
        *self.thread.lock() = Some(handle);
        Ok(())
    }

    /// 投递事件，从不阻塞
    pub fn post(&self, event: PlayerEvent) {
        match self.sender.lock().as_ref() {
            Some(tx) => {
                if tx.send(event).is_err() {
                    warn!("{} 通知线程已退出，事件被丢弃", log_ctx());
                }
            }
            None => debug!("{} 消息中心未启动，丢弃事件 {:?}", log_ctx(), event),
        }
    }

    /// 关闭通道，等待已投递的事件全部派发完
    pub fn shutdown(&self) {
        let sender = self.sender.lock().take();
        drop(sender);
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
            info!("{} 消息中心已关闭", log_ctx());
        }
    }
}

impl Default for MessageCenter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MessageCenter {
    fn drop(&mut self) {
        self.sender.lock().take();
    }
}

/// 把回调转成通道消息，适合轮询式宿主
pub struct ChannelListener {
    tx: Sender<PlayerEvent>,
}

impl ChannelListener {
    pub fn new() -> (Self, Receiver<PlayerEvent>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }

    fn forward(&self, event: PlayerEvent) {
        let _ = self.tx.send(event);
    }
}

impl PlayerListener for ChannelListener {
    fn on_start(&self) {
        self.forward(PlayerEvent::Start);
    }

    fn on_play(&self) {
        self.forward(PlayerEvent::Play);
    }

    fn on_pause(&self) {
        self.forward(PlayerEvent::Pause);
    }

    fn on_stop(&self) {
        self.forward(PlayerEvent::Stop);
    }

    fn on_complete(&self) {
        self.forward(PlayerEvent::Complete);
    }

    fn on_error(&self, code: i32, message: &str) {
        self.forward(PlayerEvent::Error {
            code,
            message: message.to_string(),
        });
    }

    fn on_seek_complete(&self, position_ms: i64) {
        self.forward(PlayerEvent::SeekComplete { position_ms });
    }

    fn on_destroy(&self) {
        self.forward(PlayerEvent::Destroy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_events_are_delivered_in_order() {
        let (listener, rx) = ChannelListener::new();
        let center = MessageCenter::new();
        center.start(Some(Arc::new(listener))).unwrap();
        center.post(PlayerEvent::Start);
        center.post(PlayerEvent::error(&PlayerError::NoPlayableStream));
        center.post(PlayerEvent::Stop);
        center.shutdown();

        let events: Vec<PlayerEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], PlayerEvent::Start);
        assert_eq!(events[1].error_code(), Some(ErrorCode::NoPlayableStream));
        assert_eq!(events[2], PlayerEvent::Stop);
    }

    #[test]
    fn test_post_never_blocks_on_slow_listener() {
        struct Slow;
        impl PlayerListener for Slow {
            fn on_play(&self) {
                thread::sleep(Duration::from_millis(100));
            }
        }
        let center = MessageCenter::new();
        center.start(Some(Arc::new(Slow))).unwrap();
        let start = std::time::Instant::now();
        for _ in 0..5 {
            center.post(PlayerEvent::Play);
        }
        assert!(start.elapsed() < Duration::from_millis(50));
        center.shutdown();
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let json = serde_json::to_string(&PlayerEvent::SeekComplete { position_ms: 5000 }).unwrap();
        assert_eq!(json, r#"{"event":"seek_complete","position_ms":5000}"#);
        let json = serde_json::to_value(PlayerEvent::Error {
            code: 1001,
            message: "x".into(),
        })
        .unwrap();
        assert_eq!(json["code"], 1001);
    }

    #[test]
    fn test_post_before_start_is_dropped() {
        let center = MessageCenter::new();
        center.post(PlayerEvent::Start);
        center.shutdown();
    }
}
