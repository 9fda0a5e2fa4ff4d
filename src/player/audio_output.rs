use crate::core::{PlayerError, Result};
use crate::player::demuxer_source::{AudioDevice, AudioSpec};
use crate::player::frame_queue::FrameQueue;
use crate::player::log_ctx;
use crate::player::packet_queue::PacketQueue;
use crate::player::sync::MediaSync;
use log::{debug, error, info, warn};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// 设备不接受流的原始参数时依次尝试的标准配置
const FALLBACK_SPECS: [(u32, u16); 4] = [
    (48000, 2), // 最常见
    (44100, 2), // CD 音质
    (48000, 1),
    (44100, 1),
];

struct GateState {
    paused: bool,
    stopping: bool,
}

/// 暂停闸门：暂停期间输出线程阻塞在这里，不再消费帧
struct PauseGate {
    state: Mutex<GateState>,
    cond: Condvar,
}

impl PauseGate {
    fn new() -> Self {
        Self {
            state: Mutex::new(GateState {
                paused: true,
                stopping: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// 等待直到未暂停；返回 false 表示正在停止
    fn wait_open(&self) -> bool {
        let mut state = self.state.lock();
        while state.paused && !state.stopping {
            self.cond.wait(&mut state);
        }
        !state.stopping
    }

    fn set_paused(&self, paused: bool) {
        self.state.lock().paused = paused;
        self.cond.notify_all();
    }

    fn stop(&self) {
        self.state.lock().stopping = true;
        self.cond.notify_all();
    }
}

/// 音频输出：持有设备，输出线程按设备节奏从帧队列取帧写入并驱动音频时钟
pub struct AudioOutput {
    device: Arc<Mutex<Box<dyn AudioDevice>>>,
    spec: AudioSpec,
    gate: Arc<PauseGate>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl AudioOutput {
    /// 打开音频设备（不支持原始参数时自动回退到标准配置）
    pub fn open(mut device: Box<dyn AudioDevice>, wanted: AudioSpec) -> Result<Self> {
        info!(
            "{} 初始化音频输出: {} Hz, {} 声道",
            log_ctx(),
            wanted.sample_rate,
            wanted.channels
        );

        let spec = match device.open(wanted) {
            Ok(spec) => spec,
            Err(e) => {
                warn!(
                    "{} ⚠️ 音频设备不支持 {} Hz, {} 声道配置 ({}), 回退到标准配置",
                    log_ctx(),
                    wanted.sample_rate,
                    wanted.channels,
                    e
                );
                FALLBACK_SPECS
                    .iter()
                    .find_map(|&(sample_rate, channels)| {
                        device.open(AudioSpec { sample_rate, channels }).ok()
                    })
                    .ok_or_else(|| {
                        PlayerError::AudioError(format!(
                            "音频设备不支持任何标准配置 (原请求: {} Hz, {} 声道)",
                            wanted.sample_rate, wanted.channels
                        ))
                    })?
            }
        };
        if spec != wanted {
            info!("{} ✅ 使用音频配置: {} Hz, {} 声道", log_ctx(), spec.sample_rate, spec.channels);
        }

        Ok(Self {
            device: Arc::new(Mutex::new(device)),
            spec,
            gate: Arc::new(PauseGate::new()),
            thread: Mutex::new(None),
        })
    }

    /// 实际使用的音频参数
    pub fn spec(&self) -> AudioSpec {
        self.spec
    }

    /// 启动输出线程（初始为暂停状态，`resume()` 后开始消费）
    pub fn start(
        &self,
        frames: Arc<FrameQueue>,
        packets: Arc<PacketQueue>,
        sync: Arc<MediaSync>,
        on_error: impl Fn(PlayerError) + Send + 'static,
    ) -> Result<()> {
        let mut slot = self.thread.lock();
        if slot.is_some() {
            return Ok(());
        }
        let device = self.device.clone();
        let gate = self.gate.clone();
        let handle = thread::Builder::new()
            .name("splayer-audio-out".to_string())
            .spawn(move || {
                info!("{} 🔊 音频输出线程启动", log_ctx());
                let mut written: u64 = 0;
                let mut write_failed = false;
                while gate.wait_open() {
                    let Some(frame) = frames.peek_readable() else {
                        break;
                    };
                    frames.next();
                    // seek 之前解码出的帧直接丢弃
                    if frame.serial != packets.serial() {
                        continue;
                    }

                    let (result, latency) = {
                        let mut device = device.lock();
                        let result = device.write(frame.samples());
                        (result, device.latency())
                    };
                    if let Err(e) = result {
                        // 同一次会话只上报一次，之后继续尝试写入
                        if !write_failed {
                            error!("{} ❌ 音频写入失败: {}", log_ctx(), e);
                            on_error(PlayerError::AudioWriteError(e.to_string()));
                            write_failed = true;
                        }
                        continue;
                    }

                    if !frame.pts.is_nan() {
                        sync.update_audio_clock(
                            frame.pts + frame.duration - latency,
                            frame.serial,
                            Instant::now(),
                        );
                    }
                    written += 1;
                    if written <= 3 || written % 500 == 0 {
                        debug!(
                            "{} 音频写入 #{}: pts={:.3}s samples={}",
                            log_ctx(),
                            written,
                            frame.pts,
                            frame.nb_samples()
                        );
                    }
                }
                info!("{} 🔊 音频输出线程结束，共写入 {} 帧", log_ctx(), written);
            })
            .map_err(|e| PlayerError::AudioError(format!("无法启动音频输出线程: {}", e)))?;
        *slot = Some(handle);
        Ok(())
    }

    pub fn pause(&self) {
        self.gate.set_paused(true);
        self.device.lock().pause();
    }

    pub fn resume(&self) {
        self.device.lock().resume();
        self.gate.set_paused(false);
    }

    /// 停止输出线程并关闭设备
    ///
    /// 帧队列需要先被中止，否则阻塞在 `peek_readable` 的线程无法退出。
    pub fn stop(&self) {
        self.gate.stop();
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
        self.device.lock().stop();
        info!("{} 音频输出已停止", log_ctx());
    }

    /// 设置音量 (0.0 - 1.0)
    pub fn set_volume(&self, volume: f32) {
        self.device.lock().set_volume(volume.clamp(0.0, 1.0));
    }

    pub fn set_mute(&self, mute: bool) {
        self.device.lock().set_mute(mute);
    }

    pub fn set_tempo(&self, tempo: f64) {
        self.device.lock().set_tempo(tempo);
    }

    pub fn set_pitch(&self, pitch: f64) {
        self.device.lock().set_pitch(pitch);
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.gate.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Frame, FrameData, FrameDrop, PlayerConfig, SyncType};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Probe {
        writes: AtomicUsize,
        opened: Mutex<Vec<AudioSpec>>,
        volume: Mutex<f32>,
    }

    /// 只接受 48000 Hz 双声道的测试设备
    struct PickyDevice {
        probe: Arc<Probe>,
    }

    impl AudioDevice for PickyDevice {
        fn open(&mut self, wanted: AudioSpec) -> Result<AudioSpec> {
            self.probe.opened.lock().push(wanted);
            if wanted.sample_rate == 48000 && wanted.channels == 2 {
                Ok(wanted)
            } else {
                Err(PlayerError::AudioError("unsupported".into()))
            }
        }

        fn write(&mut self, _samples: &[f32]) -> Result<()> {
            self.probe.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn pause(&mut self) {}

        fn resume(&mut self) {}

        fn stop(&mut self) {}

        fn set_volume(&mut self, volume: f32) {
            *self.probe.volume.lock() = volume;
        }

        fn set_mute(&mut self, _mute: bool) {}

        fn set_tempo(&mut self, _tempo: f64) {}

        fn set_pitch(&mut self, _pitch: f64) {}
    }

    fn picky(probe: &Arc<Probe>) -> Box<dyn AudioDevice> {
        Box::new(PickyDevice {
            probe: probe.clone(),
        })
    }

    #[test]
    fn test_open_falls_back_to_standard_spec() {
        let probe = Arc::new(Probe::default());
        let output = AudioOutput::open(
            picky(&probe),
            AudioSpec {
                sample_rate: 22050,
                channels: 1,
            },
        )
        .unwrap();
        assert_eq!(output.spec().sample_rate, 48000);
        assert_eq!(probe.opened.lock().len(), 2);

        output.set_volume(3.0);
        assert_eq!(*probe.volume.lock(), 1.0);
    }

    #[test]
    fn test_output_writes_current_serial_and_drives_clock() {
        let probe = Arc::new(Probe::default());
        let output = AudioOutput::open(
            picky(&probe),
            AudioSpec {
                sample_rate: 48000,
                channels: 2,
            },
        )
        .unwrap();

        let packets = Arc::new(PacketQueue::new());
        packets.start();
        let frames = Arc::new(FrameQueue::new(4, false));
        let sync = Arc::new(MediaSync::new(
            &PlayerConfig::default(),
            SyncType::Audio,
            FrameDrop::Auto,
            3600.0,
            Some(packets.serial_handle()),
            None,
            None,
        ));

        let stale = packets.serial();
        packets.push(crate::core::Packet::flush()).unwrap();
        let current = packets.serial();
        for (pts, serial) in [(0.0, stale), (7.0, current)] {
            let mut slot = frames.peek_writable().unwrap();
            *slot = Frame {
                data: FrameData::Samples(Arc::from(vec![0.0f32; 4])),
                pts,
                duration: 0.5,
                serial,
                ..Frame::default()
            };
            slot.push();
        }

        output
            .start(frames.clone(), packets.clone(), sync.clone(), |_| {})
            .unwrap();
        // 暂停状态下不消费
        thread::sleep(Duration::from_millis(30));
        assert_eq!(probe.writes.load(Ordering::SeqCst), 0);

        output.resume();
        let deadline = Instant::now() + Duration::from_secs(2);
        while frames.nb_remaining() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        thread::sleep(Duration::from_millis(20));
        assert_eq!(probe.writes.load(Ordering::SeqCst), 1);
        let clock = sync.audio_clock().get_clock().unwrap();
        assert!(clock >= 7.5 && clock < 8.0, "clock = {}", clock);

        frames.abort();
        output.stop();
    }
}
