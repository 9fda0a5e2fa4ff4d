use crate::core::Frame;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::ops::{Deref, DerefMut};

struct Cursors {
    rindex: usize,
    windex: usize,
    size: usize,
    /// 读指针处的帧是否已经显示过（keep_last 模式下保留它作为 "上一帧"）
    rindex_shown: usize,
    abort_request: bool,
}

/// 解码帧环形队列
///
/// 容量固定，槽位预先分配。生产者通过 `peek_writable()` 拿到写槽原地填充，
/// `WriteSlot::push()` 提交；消费者用 `peek()/peek_next()` 查看，`next()` 释放槽位。
/// 锁顺序固定为 游标锁 → 槽位锁，写槽持有期间不持有游标锁。
pub struct FrameQueue {
    slots: Box<[Mutex<Frame>]>,
    cursors: Mutex<Cursors>,
    cond: Condvar,
    max_size: usize,
    keep_last: bool,
}

/// 可写槽位句柄
pub struct WriteSlot<'a> {
    queue: &'a FrameQueue,
    guard: MutexGuard<'a, Frame>,
}

impl<'a> WriteSlot<'a> {
    /// 提交已填充的槽位，推进写指针并唤醒消费者
    pub fn push(self) {
        let queue = self.queue;
        drop(self.guard);
        queue.commit_written();
    }
}

impl Deref for WriteSlot<'_> {
    type Target = Frame;

    fn deref(&self) -> &Frame {
        &self.guard
    }
}

impl DerefMut for WriteSlot<'_> {
    fn deref_mut(&mut self) -> &mut Frame {
        &mut self.guard
    }
}

impl FrameQueue {
    pub fn new(max_size: usize, keep_last: bool) -> Self {
        let max_size = max_size.max(1);
        let slots = (0..max_size)
            .map(|_| Mutex::new(Frame::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            cursors: Mutex::new(Cursors {
                rindex: 0,
                windex: 0,
                size: 0,
                rindex_shown: 0,
                abort_request: false,
            }),
            cond: Condvar::new(),
            max_size,
            keep_last,
        }
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    pub fn start(&self) {
        self.cursors.lock().abort_request = false;
    }

    /// 中止：唤醒所有阻塞在 `peek_writable/peek_readable` 的线程
    pub fn abort(&self) {
        let mut cursors = self.cursors.lock();
        cursors.abort_request = true;
        self.cond.notify_all();
    }

    pub fn is_aborted(&self) -> bool {
        self.cursors.lock().abort_request
    }

    /// 阻塞直到有空槽或被中止；中止时返回 `None`
    pub fn peek_writable(&self) -> Option<WriteSlot<'_>> {
        let index = {
            let mut cursors = self.cursors.lock();
            while cursors.size >= self.max_size && !cursors.abort_request {
                self.cond.wait(&mut cursors);
            }
            if cursors.abort_request {
                return None;
            }
            cursors.windex
        };
        Some(WriteSlot {
            queue: self,
            guard: self.slots[index].lock(),
        })
    }

    fn commit_written(&self) {
        let mut cursors = self.cursors.lock();
        cursors.windex = (cursors.windex + 1) % self.max_size;
        cursors.size += 1;
        self.cond.notify_all();
    }

    fn slot_clone(&self, index: usize) -> Frame {
        self.slots[index % self.max_size].lock().clone()
    }

    /// 当前待显示的帧
    pub fn peek(&self) -> Option<Frame> {
        let cursors = self.cursors.lock();
        if cursors.size <= cursors.rindex_shown {
            return None;
        }
        Some(self.slot_clone(cursors.rindex + cursors.rindex_shown))
    }

    /// 待显示帧的下一帧，用于根据相邻时间戳估计显示时长
    pub fn peek_next(&self) -> Option<Frame> {
        let cursors = self.cursors.lock();
        if cursors.size < cursors.rindex_shown + 2 {
            return None;
        }
        Some(self.slot_clone(cursors.rindex + cursors.rindex_shown + 1))
    }

    /// 上一次显示的帧（keep_last 模式）
    pub fn peek_last(&self) -> Option<Frame> {
        let cursors = self.cursors.lock();
        if cursors.size == 0 {
            return None;
        }
        Some(self.slot_clone(cursors.rindex))
    }

    /// 阻塞直到有可读帧或被中止
    pub fn peek_readable(&self) -> Option<Frame> {
        let mut cursors = self.cursors.lock();
        while cursors.size <= cursors.rindex_shown && !cursors.abort_request {
            self.cond.wait(&mut cursors);
        }
        if cursors.abort_request {
            return None;
        }
        Some(self.slot_clone(cursors.rindex + cursors.rindex_shown))
    }

    /// 推进读指针，回收槽位
    pub fn next(&self) {
        let mut cursors = self.cursors.lock();
        if cursors.size == 0 {
            return;
        }
        if self.keep_last && cursors.rindex_shown == 0 {
            cursors.rindex_shown = 1;
            return;
        }
        self.slots[cursors.rindex].lock().unref();
        cursors.rindex = (cursors.rindex + 1) % self.max_size;
        cursors.size -= 1;
        self.cond.notify_all();
    }

    /// 丢弃所有排队的帧；生产者正在填充的槽位不受影响
    pub fn flush(&self) {
        let mut cursors = self.cursors.lock();
        for offset in 0..cursors.size {
            self.slots[(cursors.rindex + offset) % self.max_size].lock().unref();
        }
        cursors.rindex = cursors.windex;
        cursors.size = 0;
        cursors.rindex_shown = 0;
        self.cond.notify_all();
    }

    /// 尚未显示的帧数
    pub fn nb_remaining(&self) -> usize {
        let cursors = self.cursors.lock();
        cursors.size - cursors.rindex_shown
    }

    /// 已占用的槽位数（含保留的上一帧）
    pub fn size(&self) -> usize {
        self.cursors.lock().size
    }

    pub fn is_full(&self) -> bool {
        self.cursors.lock().size >= self.max_size
    }

    pub fn rindex_shown(&self) -> bool {
        self.cursors.lock().rindex_shown > 0
    }
}
