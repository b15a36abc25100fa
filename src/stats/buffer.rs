//! 待刷盘计数缓冲区
//!
//! 周期键到累积增量的并发映射。drain 先对键做快照再逐个 remove，
//! 快照之后到达的增量会落在存活的 map 里，不会丢失。

use std::sync::atomic::AtomicBool;

use dashmap::DashMap;
use tokio::sync::Mutex;

/// 两次刷盘之间的内存状态
pub struct PendingBuffer {
    /// 周期键 -> 累积增量
    data: DashMap<String, u64>,
    /// 刷盘锁，保证同一时刻最多一个刷盘在执行
    pub(crate) flush_lock: Mutex<()>,
    /// 是否已有阈值触发的刷盘任务待执行（防止重复 spawn）
    pub(crate) flush_pending: AtomicBool,
}

impl PendingBuffer {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
            flush_lock: Mutex::new(()),
            flush_pending: AtomicBool::new(false),
        }
    }

    /// 累加一个周期键的增量，返回当前不同键的数量
    pub fn add(&self, key: String, by: u64) -> usize {
        *self.data.entry(key).or_insert(0) += by;
        self.data.len()
    }

    /// 取出当前全部累积增量并从缓冲区移除
    pub fn drain(&self) -> Vec<(String, u64)> {
        // 1. 先收集键快照
        let keys: Vec<String> = self.data.iter().map(|r| r.key().clone()).collect();

        // 2. 逐个 remove，快照之后新增的键留在缓冲区
        let mut updates = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some((k, v)) = self.data.remove(&key) {
                updates.push((k, v));
            }
        }

        updates
    }

    /// 把一次 drain 的快照合并回缓冲区（刷盘失败时恢复用）
    pub fn restore(&self, updates: Vec<(String, u64)>) {
        for (key, by) in updates {
            *self.data.entry(key).or_insert(0) += by;
        }
    }

    /// 当前不同周期键的数量
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for PendingBuffer {
    fn default() -> Self {
        Self::new()
    }
}
