use crate::core::{FrameDrop, PlayerError, Result, State, SyncType};
use crate::player::log_ctx;
use log::{debug, info};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// 状态迁移是否合法
///
/// `Pre*` 状态只能由对应的工作线程提交到目标状态，不允许跳过。
pub fn is_legal(from: State, to: State) -> bool {
    use State::*;
    if to == Destroy {
        return from != Destroy;
    }
    matches!(
        (from, to),
        (Idle, PreCreate)
            | (PreCreate, Create)
            | (PreCreate, Idle)
            | (Create | Stop | Source | Complete, Source)
            | (Source | Stop | Complete, PreStart)
            | (PreStart, Start)
            | (Start, PrePlay)
            | (PrePlay, Play)
            | (Play, Pause)
            | (Pause, Play)
            | (Play, PreComplete)
            | (PreComplete, Complete)
            | (PreStart | Start | PrePlay | Play | Pause | PreComplete, PreStop)
            | (PreStop, Stop)
    )
}

/// `Pre*` 屏障在所有工作线程完成后提交的目标状态
pub fn commit_target(state: State) -> Option<State> {
    match state {
        State::PreCreate => Some(State::Create),
        State::PreStart => Some(State::Start),
        State::PrePlay => Some(State::Play),
        State::PreStop => Some(State::Stop),
        State::PreComplete => Some(State::Complete),
        _ => None,
    }
}

/// 受状态锁保护的字段
#[derive(Debug)]
pub struct StateFields {
    pub state: State,
    pub seeking: bool,
    pub sync_type: SyncType,
    pub frame_drop: FrameDrop,
    /// 尚未完成的工作线程数
    pub outstanding: usize,
}

/// 工作线程完成后的结果
#[derive(Debug, Default)]
pub struct WorkerDone {
    /// 本次完成触发的提交
    pub committed: Option<State>,
    /// 本工作线程的错误（需要上报）
    pub failure: Option<PlayerError>,
    /// 需要调用方启动一个清理线程（已计入 outstanding）
    pub teardown: bool,
}

/// 播放器状态机
///
/// 所有字段由一把锁保护。进入 `Pre*` 时登记工作线程数，每个工作线程结束时递减，
/// 最后一个完成者负责提交目标状态；任何一个失败都会把状态转到 `PreStop`。
pub struct PlayerState {
    fields: Mutex<StateFields>,
    changed: Condvar,
}

impl PlayerState {
    pub fn new(sync_type: SyncType, frame_drop: FrameDrop) -> Self {
        Self {
            fields: Mutex::new(StateFields {
                state: State::Idle,
                seeking: false,
                sync_type,
                frame_drop,
                outstanding: 0,
            }),
            changed: Condvar::new(),
        }
    }

    pub fn state(&self) -> State {
        self.fields.lock().state
    }

    /// 在状态锁内执行，用于 "检查状态后再安装资源" 这类需要原子性的操作
    pub fn lock(&self) -> MutexGuard<'_, StateFields> {
        self.fields.lock()
    }

    /// 按迁移表尝试进入 `to`，同时登记 `workers` 个工作线程；非法迁移返回 `None`
    pub fn transition(&self, to: State, workers: usize) -> Option<State> {
        let mut fields = self.fields.lock();
        let from = fields.state;
        if !is_legal(from, to) {
            debug!("{} 忽略非法状态迁移: {:?} -> {:?}", log_ctx(), from, to);
            return None;
        }
        fields.state = to;
        fields.outstanding += workers;
        self.changed.notify_all();
        info!(
            "{} 🔁 状态 {:?} -> {:?} (outstanding={})",
            log_ctx(),
            from,
            to,
            fields.outstanding
        );
        Some(from)
    }

    /// 仅当当前状态为 `from` 时迁移，用于区分同一目标的不同入口（例如 Pause -> Play）
    pub fn transition_from(&self, from: State, to: State, workers: usize) -> bool {
        let mut fields = self.fields.lock();
        if fields.state != from || !is_legal(from, to) {
            return false;
        }
        fields.state = to;
        fields.outstanding += workers;
        self.changed.notify_all();
        info!("{} 🔁 状态 {:?} -> {:?}", log_ctx(), from, to);
        true
    }

    /// 仅在 Play 且没有进行中的 seek 时开始 seek，并登记一个工作线程
    pub fn begin_seek(&self) -> bool {
        let mut fields = self.fields.lock();
        if fields.state != State::Play || fields.seeking {
            return false;
        }
        fields.seeking = true;
        fields.outstanding += 1;
        true
    }

    pub fn end_seek(&self) {
        self.fields.lock().seeking = false;
    }

    pub fn is_seeking(&self) -> bool {
        self.fields.lock().seeking
    }

    pub fn outstanding(&self) -> usize {
        self.fields.lock().outstanding
    }

    pub fn sync_type(&self) -> SyncType {
        self.fields.lock().sync_type
    }

    pub fn set_sync_type(&self, sync_type: SyncType) {
        self.fields.lock().sync_type = sync_type;
    }

    pub fn frame_drop(&self) -> FrameDrop {
        self.fields.lock().frame_drop
    }

    pub fn set_frame_drop(&self, frame_drop: FrameDrop) {
        self.fields.lock().frame_drop = frame_drop;
    }

    /// 重新设置媒体源时清理会话相关的字段
    pub fn reset_session(&self) {
        self.fields.lock().seeking = false;
    }

    /// 工作线程结束
    pub fn complete_worker(&self, outcome: Result<()>) -> WorkerDone {
        let mut fields = self.fields.lock();
        let mut done = WorkerDone::default();

        if let Err(e) = outcome {
            match fields.state {
                State::PreCreate => fields.state = State::Idle,
                state if is_legal(state, State::PreStop) => {
                    info!("{} 🔁 工作线程失败，状态 {:?} -> PreStop", log_ctx(), state);
                    fields.state = State::PreStop;
                    // 先为清理线程占位，保证在它完成之前不会提交 Stop
                    fields.outstanding += 1;
                    done.teardown = true;
                }
                _ => {}
            }
            done.failure = Some(e);
        }

        fields.outstanding = fields.outstanding.saturating_sub(1);
        if fields.outstanding == 0 {
            if let Some(target) = commit_target(fields.state) {
                info!("{} ✅ 提交状态 {:?} -> {:?}", log_ctx(), fields.state, target);
                fields.state = target;
                done.committed = Some(target);
            }
        }
        self.changed.notify_all();
        done
    }

    /// 等待进入指定状态，超时返回 false
    pub fn wait_for(&self, target: State, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut fields = self.fields.lock();
        while fields.state != target {
            if self.changed.wait_until(&mut fields, deadline).timed_out() {
                return fields.state == target;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_at(target: &[State]) -> PlayerState {
        let state = PlayerState::new(SyncType::Audio, FrameDrop::Auto);
        for &s in target {
            assert!(state.transition(s, 0).is_some(), "cannot enter {:?}", s);
        }
        state
    }

    #[test]
    fn test_guards_reject_out_of_order_calls() {
        let state = PlayerState::new(SyncType::Audio, FrameDrop::Auto);
        // Idle 时 play/start/seek 都被忽略
        assert!(state.transition(State::PrePlay, 1).is_none());
        assert!(state.transition(State::PreStart, 1).is_none());
        assert!(!state.begin_seek());
        assert_eq!(state.state(), State::Idle);
        assert_eq!(state.outstanding(), 0);
    }

    #[test]
    fn test_pre_states_cannot_be_skipped() {
        assert!(!is_legal(State::Source, State::Start));
        assert!(!is_legal(State::Start, State::Play));
        assert!(!is_legal(State::Play, State::Stop));
        assert!(!is_legal(State::Play, State::Complete));
        assert!(is_legal(State::Pause, State::Play));
        assert!(is_legal(State::Stop, State::Destroy));
        assert!(!is_legal(State::Destroy, State::Destroy));
    }

    #[test]
    fn test_transition_from_requires_exact_state() {
        let state = state_at(&[State::PreCreate, State::Create, State::Source, State::PreStart]);
        state.complete_worker(Ok(()));
        state.transition(State::PrePlay, 1).unwrap();
        // PrePlay -> Play 只能由工作线程提交
        assert!(!state.transition_from(State::Pause, State::Play, 0));
        assert_eq!(state.state(), State::PrePlay);
        state.complete_worker(Ok(()));
        state.transition(State::Pause, 0).unwrap();
        assert!(state.transition_from(State::Pause, State::Play, 0));
        assert_eq!(state.state(), State::Play);
    }

    #[test]
    fn test_commit_waits_for_all_workers() {
        let state = state_at(&[State::PreCreate, State::Create, State::Source]);
        state.transition(State::PreStart, 2).unwrap();

        let first = state.complete_worker(Ok(()));
        assert!(first.committed.is_none());
        assert_eq!(state.state(), State::PreStart);

        let last = state.complete_worker(Ok(()));
        assert_eq!(last.committed, Some(State::Start));
        assert_eq!(state.state(), State::Start);
    }

    #[test]
    fn test_failure_moves_to_pre_stop_and_reserves_teardown() {
        let state = state_at(&[State::PreCreate, State::Create, State::Source]);
        state.transition(State::PreStart, 1).unwrap();

        let done = state.complete_worker(Err(PlayerError::NoPlayableStream));
        assert!(done.teardown);
        assert!(done.failure.is_some());
        assert!(done.committed.is_none());
        assert_eq!(state.state(), State::PreStop);
        assert_eq!(state.outstanding(), 1);

        let teardown = state.complete_worker(Ok(()));
        assert_eq!(teardown.committed, Some(State::Stop));
        assert!(!teardown.teardown);
    }

    #[test]
    fn test_stop_during_start_joins_both_workers() {
        let state = state_at(&[State::PreCreate, State::Create, State::Source]);
        state.transition(State::PreStart, 1).unwrap();
        // stop() 在打开流程尚未结束时到来
        state.transition(State::PreStop, 1).unwrap();
        assert_eq!(state.outstanding(), 2);

        assert!(state.complete_worker(Ok(())).committed.is_none());
        let done = state.complete_worker(Ok(()));
        assert_eq!(done.committed, Some(State::Stop));
    }

    #[test]
    fn test_wait_for_sees_commit_from_other_thread() {
        let state = std::sync::Arc::new(state_at(&[State::PreCreate, State::Create, State::Source]));
        state.transition(State::PreStart, 1).unwrap();
        let worker = state.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            worker.complete_worker(Ok(()))
        });
        assert!(state.wait_for(State::Start, Duration::from_secs(2)));
        assert_eq!(handle.join().unwrap().committed, Some(State::Start));
        assert!(!state.wait_for(State::Play, Duration::from_millis(10)));
    }

    #[test]
    fn test_seek_is_a_counted_worker() {
        let state = state_at(&[State::PreCreate, State::Create, State::Source]);
        state.transition(State::PreStart, 0).unwrap();
        state.complete_worker(Ok(()));
        state.transition(State::PrePlay, 0).unwrap();
        state.complete_worker(Ok(()));
        assert_eq!(state.state(), State::Play);

        assert!(state.begin_seek());
        assert!(!state.begin_seek());
        state.transition(State::PreStop, 1).unwrap();
        // seek 先完成时不能提交 Stop
        assert!(state.complete_worker(Ok(())).committed.is_none());
        state.end_seek();
        assert_eq!(state.complete_worker(Ok(())).committed, Some(State::Stop));
    }
}
