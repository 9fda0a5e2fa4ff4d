use crossbeam_channel::Receiver;
use splayer::core::{ErrorCode, PlayerConfig, State};
use splayer::player::synthetic::{NullAudioDevice, NullAudioStats, RecordingSurface};
use splayer::player::{AudioDevice, ChannelListener, PlaybackManager, PlayerEvent};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(5);

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct Harness {
    player: PlaybackManager,
    events: Receiver<PlayerEvent>,
    surface: Arc<RecordingSurface>,
    audio: Arc<NullAudioStats>,
}

impl Harness {
    fn new(config: PlayerConfig) -> Self {
        Self::with_device(config, false)
    }

    fn with_device(config: PlayerConfig, failing_audio: bool) -> Self {
        init_logger();
        let (listener, events) = ChannelListener::new();
        let surface = Arc::new(RecordingSurface::new());
        let audio = Arc::new(NullAudioStats::default());
        let stats = audio.clone();
        let player = PlaybackManager::builder()
            .config(config)
            .surface(surface.clone())
            .listener(Arc::new(listener))
            .audio_device(move || -> Box<dyn AudioDevice> {
                if failing_audio {
                    Box::new(NullAudioDevice::failing())
                } else {
                    Box::new(NullAudioDevice::with_stats(stats.clone()))
                }
            })
            .build();
        player.create();
        assert!(player.wait_for_state(State::Create, TIMEOUT));
        Self {
            player,
            events,
            surface,
            audio,
        }
    }

    /// 等待满足条件的事件，返回途中收到的所有事件
    fn wait_event(&self, pred: impl Fn(&PlayerEvent) -> bool) -> Vec<PlayerEvent> {
        let deadline = Instant::now() + TIMEOUT;
        let mut seen = Vec::new();
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(left) {
                Ok(event) => {
                    let hit = pred(&event);
                    seen.push(event);
                    if hit {
                        return seen;
                    }
                }
                Err(_) => panic!("timed out waiting for event, got {:?}", seen),
            }
        }
    }

    fn start(&self, url: &str) {
        self.player.set_source(url);
        assert_eq!(self.player.state(), State::Source);
        self.player.start();
        self.wait_event(|e| *e == PlayerEvent::Start);
        assert_eq!(self.player.state(), State::Start);
    }

    fn play(&self) {
        self.player.play();
        self.wait_event(|e| *e == PlayerEvent::Play);
        assert_eq!(self.player.state(), State::Play);
    }
}

fn wait_until(cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    cond()
}

#[test]
fn test_start_play_seek_stop() {
    let h = Harness::new(PlayerConfig::default());
    h.start("synthetic:");
    assert_eq!(h.player.duration_ms(), 10_000);

    h.play();
    assert!(wait_until(|| h.surface.count() > 0), "no frame rendered");
    assert!(wait_until(|| h.audio.writes() > 0), "no audio written");

    let before = h.surface.last().map(|f| f.serial).unwrap_or(0);
    h.player.seek(5000);
    let events = h.wait_event(|e| matches!(e, PlayerEvent::SeekComplete { .. }));
    assert_eq!(
        events.last(),
        Some(&PlayerEvent::SeekComplete { position_ms: 5000 })
    );
    assert!(
        wait_until(|| h
            .surface
            .last()
            .map(|f| f.serial > before && f.pts >= 4.9)
            .unwrap_or(false)),
        "decoding did not resume at the new position: {:?}",
        h.surface.last()
    );
    // 新 serial 之后不再出现旧位置的帧
    let rendered = h.surface.rendered();
    let first_new = rendered.iter().position(|f| f.serial > before).unwrap();
    assert!(rendered[first_new..].iter().all(|f| f.pts >= 4.9));
    assert!(wait_until(|| h.player.position_ms() >= 5000));

    h.player.stop();
    let events = h.wait_event(|e| *e == PlayerEvent::Stop);
    assert_eq!(h.player.state(), State::Stop);
    assert_eq!(h.player.outstanding_workers(), 0);
    assert!(h.player.buffer_status().queued_bytes == 0);

    h.player.destroy();
    let rest: Vec<PlayerEvent> = h.events.try_iter().collect();
    let stops = events
        .iter()
        .chain(rest.iter())
        .filter(|e| **e == PlayerEvent::Stop)
        .count();
    assert_eq!(stops, 1);
    assert!(rest.contains(&PlayerEvent::Destroy));
}

#[test]
fn test_calls_outside_guards_are_ignored() {
    let h = Harness::new(PlayerConfig::default());
    // Create 状态下 play/seek/start 都不生效
    h.player.play();
    h.player.seek(1000);
    h.player.start();
    h.player.pause();
    assert_eq!(h.player.state(), State::Create);
    assert_eq!(h.player.outstanding_workers(), 0);

    h.start("synthetic:");
    // Start 状态下不能 seek，也不能再次 start
    h.player.seek(1000);
    h.player.start();
    assert_eq!(h.player.state(), State::Start);
    assert!(!h.player.is_seeking());
}

#[test]
fn test_pause_freezes_position() {
    let h = Harness::new(PlayerConfig::default());
    h.start("synthetic:");
    h.play();
    assert!(wait_until(|| h.player.position_ms() > 100));

    h.player.pause();
    h.wait_event(|e| *e == PlayerEvent::Pause);
    assert_eq!(h.player.state(), State::Pause);
    let frozen = h.player.position_ms();
    thread::sleep(Duration::from_millis(200));
    assert!((h.player.position_ms() - frozen).abs() <= 30);
    assert!(h.audio.is_paused());

    h.player.play();
    h.wait_event(|e| *e == PlayerEvent::Play);
    assert!(wait_until(|| h.player.position_ms() > frozen + 100));
}

#[test]
fn test_audio_controls_reach_device() {
    let h = Harness::new(PlayerConfig::default());
    h.player.volume(150);
    h.player.mute(true);
    h.start("synthetic:");
    // 打开会话时应用之前设置的控制项
    assert!((h.audio.volume() - 1.0).abs() < 1e-6);
    assert!(h.audio.is_muted());

    h.player.volume(50);
    h.player.mute(false);
    h.player.set_speed(2.0);
    h.player.set_pitch(1.5);
    assert!((h.audio.volume() - 0.5).abs() < 1e-6);
    assert!(!h.audio.is_muted());
    assert!((h.audio.tempo() - 2.0).abs() < 1e-9);
    assert!((h.audio.pitch() - 1.5).abs() < 1e-9);

    let snapshot = h.player.snapshot();
    assert_eq!(snapshot.state, State::Start);
    assert_eq!(snapshot.volume, 50);
    assert_eq!(snapshot.speed, 2.0);
    assert!(snapshot.media_info.is_some());
}

#[test]
fn test_audio_open_failure_reports_and_stops() {
    let h = Harness::with_device(PlayerConfig::default(), true);
    h.player.set_source("synthetic:");
    h.player.start();
    let events = h.wait_event(|e| *e == PlayerEvent::Stop);
    let error = events
        .iter()
        .find_map(|e| e.error_code())
        .expect("an error event before Stop");
    assert_eq!(error, ErrorCode::OpenAudioOutput);
    assert!(!events.contains(&PlayerEvent::Start));
    assert_eq!(h.player.state(), State::Stop);
    assert_eq!(h.player.outstanding_workers(), 0);
}

#[test]
fn test_no_playable_stream() {
    let h = Harness::new(PlayerConfig::default());
    h.player.set_source("synthetic:?video=0&audio=0");
    h.player.start();
    let events = h.wait_event(|e| *e == PlayerEvent::Stop);
    assert_eq!(
        events.iter().find_map(|e| e.error_code()),
        Some(ErrorCode::NoPlayableStream)
    );

    // Stop 之后可以重新设置媒体源
    h.start("synthetic:?duration_ms=2000");
    assert_eq!(h.player.duration_ms(), 2000);
}

#[test]
fn test_unknown_source_fails_to_open() {
    let h = Harness::new(PlayerConfig::default());
    h.player.set_source("rtsp://example.invalid/live");
    h.player.start();
    let events = h.wait_event(|e| *e == PlayerEvent::Stop);
    assert_eq!(
        events.iter().find_map(|e| e.error_code()),
        Some(ErrorCode::OpenSource)
    );
}

#[test]
fn test_playback_completes() {
    let h = Harness::new(PlayerConfig::default());
    h.start("synthetic:?duration_ms=600");
    h.play();
    h.wait_event(|e| *e == PlayerEvent::Complete);
    assert_eq!(h.player.state(), State::Complete);
    assert_eq!(h.player.position_ms(), 600);
    assert_eq!(h.player.outstanding_workers(), 0);

    // 完成后可以直接重新开始
    h.player.start();
    h.wait_event(|e| *e == PlayerEvent::Start);
}

#[test]
fn test_loop_restarts_from_beginning() {
    let config = PlayerConfig {
        loop_count: 2,
        ..PlayerConfig::default()
    };
    let h = Harness::new(config);
    h.start("synthetic:?duration_ms=400&audio=0");
    h.play();
    h.wait_event(|e| *e == PlayerEvent::Complete);

    let rendered = h.surface.rendered();
    let first = rendered.first().map(|f| f.serial).unwrap();
    let last = rendered.last().map(|f| f.serial).unwrap();
    // 循环通过 seek(0) 实现：第二轮的帧带新的 serial，并从头开始
    assert!(last > first);
    let second = rendered.iter().find(|f| f.serial == last).unwrap();
    assert!(second.pts < 0.2);
}

#[test]
fn test_destroy_while_starting() {
    let h = Harness::new(PlayerConfig::default());
    h.player.set_source("synthetic:");
    h.player.start();
    h.player.destroy();
    assert_eq!(h.player.state(), State::Destroy);
    assert_eq!(h.player.buffer_status().queued_bytes, 0);
    // 销毁之后所有操作都被忽略
    h.player.set_source("synthetic:");
    h.player.play();
    assert_eq!(h.player.state(), State::Destroy);
}
