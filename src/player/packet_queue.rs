use crate::core::{Packet, PlayerError, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

struct Inner {
    packets: VecDeque<Packet>,
    size: usize,
    duration: i64,
    abort_request: bool,
    serial: u32,
}

/// 压缩数据包队列（线程安全 FIFO）
///
/// - 每个入队的包都被打上当前 serial，入队刷新哨兵会先把 serial 加一
/// - `pop(true)` 在队列为空时阻塞，直到有数据或被中止
/// - `abort()` 唤醒所有等待者，之后的操作立即失败，直到 `start()` 重新开始
pub struct PacketQueue {
    inner: Mutex<Inner>,
    cond: Condvar,
    /// serial 的无锁镜像，供时钟判断数据是否过期
    serial: Arc<AtomicU32>,
}

impl PacketQueue {
    /// 新建的队列处于中止状态，需要 `start()` 后才能使用
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                packets: VecDeque::new(),
                size: 0,
                duration: 0,
                abort_request: true,
                serial: 0,
            }),
            cond: Condvar::new(),
            serial: Arc::new(AtomicU32::new(0)),
        }
    }

    /// 开始（或重新开始）：清除中止标志并压入刷新哨兵
    pub fn start(&self) {
        let mut inner = self.inner.lock();
        inner.abort_request = false;
        self.put_locked(&mut inner, Packet::flush());
    }

    /// 中止：设置标志并广播唤醒所有等待者
    pub fn abort(&self) {
        let mut inner = self.inner.lock();
        inner.abort_request = true;
        self.cond.notify_all();
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.lock().abort_request
    }

    /// 入队；队列已中止时返回 `PlayerError::Aborted`
    pub fn push(&self, packet: Packet) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.abort_request {
            return Err(PlayerError::Aborted);
        }
        self.put_locked(&mut inner, packet);
        Ok(())
    }

    fn put_locked(&self, inner: &mut Inner, mut packet: Packet) {
        if packet.is_flush() {
            inner.serial = inner.serial.wrapping_add(1);
            self.serial.store(inner.serial, Ordering::Release);
        }
        packet.serial = inner.serial;
        inner.size += packet.size();
        inner.duration += packet.duration;
        inner.packets.push_back(packet);
        self.cond.notify_one();
    }

    /// 压入排空空包
    pub fn push_eof(&self, stream_index: i32) -> Result<()> {
        self.push(Packet::eof(stream_index))
    }

    /// 出队
    ///
    /// - `Ok(Some(packet))`: 取到数据
    /// - `Ok(None)`: 非阻塞模式下队列为空
    /// - `Err(Aborted)`: 队列已中止
    pub fn pop(&self, block: bool) -> Result<Option<Packet>> {
        let mut inner = self.inner.lock();
        loop {
            if inner.abort_request {
                return Err(PlayerError::Aborted);
            }
            if let Some(packet) = inner.packets.pop_front() {
                inner.size -= packet.size();
                inner.duration -= packet.duration;
                return Ok(Some(packet));
            }
            if !block {
                return Ok(None);
            }
            self.cond.wait(&mut inner);
        }
    }

    /// 清空所有包，size/duration 归零，serial 不变
    pub fn flush(&self) {
        let mut inner = self.inner.lock();
        inner.packets.clear();
        inner.size = 0;
        inner.duration = 0;
    }

    pub fn nb_packets(&self) -> usize {
        self.inner.lock().packets.len()
    }

    /// 队列中数据的总字节数
    pub fn size(&self) -> usize {
        self.inner.lock().size
    }

    /// 队列中数据的总时长（流时间基）
    pub fn duration(&self) -> i64 {
        self.inner.lock().duration
    }

    /// 当前 serial（最近一次刷新哨兵之后的代号）
    pub fn serial(&self) -> u32 {
        self.serial.load(Ordering::Acquire)
    }

    pub fn serial_handle(&self) -> Arc<AtomicU32> {
        self.serial.clone()
    }
}

impl Default for PacketQueue {
    fn default() -> Self {
        Self::new()
    }
}
