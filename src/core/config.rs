use super::types::{FrameDrop, SyncType};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 播放策略配置
///
/// 队列容量、同步阈值、重试上限都是策略常量而非结构性约束，全部放在这里。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// 视频帧队列容量（帧大且对同步敏感，保持很小）
    pub video_queue_size: usize,
    /// 音频帧队列容量
    pub audio_queue_size: usize,
    /// 所有包队列的总字节上限
    pub max_queue_bytes: usize,
    /// 包队列至少要有多少个包才算 "足够"
    pub min_frames: usize,
    /// 包队列累计时长超过多少秒才算 "足够"
    pub enough_duration_secs: f64,

    /// 主时钟来源
    pub sync_type: SyncType,
    /// 丢帧策略
    pub frame_drop: FrameDrop,
    /// 同步阈值下限（秒）
    pub sync_threshold_min: f64,
    /// 同步阈值上限（秒）
    pub sync_threshold_max: f64,
    /// 帧时长超过该值时不做重复显示补偿（秒）
    pub framedup_threshold: f64,
    /// 偏差超过该值认为不可同步（秒）
    pub nosync_threshold: f64,

    /// 视频刷新间隔（毫秒）
    pub refresh_interval_ms: u64,
    /// 解封装线程在缓冲足够时的等待时长（毫秒）
    pub demux_wait_ms: u64,
    /// 读包返回 "暂不可用" 时的最大重试次数
    pub read_retry_limit: u32,
    /// 读包重试间隔（毫秒）
    pub read_retry_interval_ms: u64,
    /// Seek 等待解封装线程确认的超时（毫秒）
    pub seek_timeout_ms: u64,
    /// 循环播放次数，1 表示只播放一次，0 表示无限循环
    pub loop_count: u32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            video_queue_size: 3,
            audio_queue_size: 9,
            max_queue_bytes: 15 * 1024 * 1024,
            min_frames: 25,
            enough_duration_secs: 1.0,
            sync_type: SyncType::Audio,
            frame_drop: FrameDrop::Auto,
            sync_threshold_min: 0.04,
            sync_threshold_max: 0.1,
            framedup_threshold: 0.1,
            nosync_threshold: 10.0,
            refresh_interval_ms: 10,
            demux_wait_ms: 10,
            read_retry_limit: 50,
            read_retry_interval_ms: 10,
            seek_timeout_ms: 2000,
            loop_count: 1,
        }
    }
}

impl PlayerConfig {
    /// 从 JSON 文本解析，缺省字段使用默认值
    pub fn from_json_str(text: &str) -> crate::core::Result<Self> {
        let config: PlayerConfig = serde_json::from_str(text)?;
        Ok(config.sanitized())
    }

    /// 从 JSON 文件加载
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件: {}", path.display()))?;
        let config: PlayerConfig = serde_json::from_str(&text)
            .with_context(|| format!("配置文件格式错误: {}", path.display()))?;
        Ok(config.sanitized())
    }

    /// 修正明显不合理的值（视频队列要保留上一帧，容量至少 2；阈值上下限有序）
    pub fn sanitized(mut self) -> Self {
        self.video_queue_size = self.video_queue_size.clamp(2, 16);
        self.audio_queue_size = self.audio_queue_size.max(1);
        if self.sync_threshold_max < self.sync_threshold_min {
            std::mem::swap(&mut self.sync_threshold_min, &mut self.sync_threshold_max);
        }
        self
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn demux_wait(&self) -> Duration {
        Duration::from_millis(self.demux_wait_ms)
    }

    pub fn read_retry_interval(&self) -> Duration {
        Duration::from_millis(self.read_retry_interval_ms)
    }

    pub fn seek_timeout(&self) -> Duration {
        Duration::from_millis(self.seek_timeout_ms)
    }
}
