use std::collections::{HashSet, VecDeque};

use crawler_core::TaskHash;
use tracing::debug;

/// 基于任务指纹的近似去重窗口
///
/// 容量满时按插入顺序丢弃最旧的一半，窗口因此是近似的，
/// 不是严格的 LRU。
#[derive(Debug)]
pub struct TaskDeduplicator {
    capacity: usize,
    seen: HashSet<TaskHash>,
    order: VecDeque<TaskHash>,
}

impl TaskDeduplicator {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            capacity,
            seen: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    /// 已存在返回 `true` 且不修改状态；否则记录并返回 `false`
    pub fn is_duplicate(&mut self, hash: &TaskHash) -> bool {
        if self.seen.contains(hash) {
            return true;
        }
        if self.seen.len() >= self.capacity {
            self.evict_oldest_half();
        }
        self.seen.insert(hash.clone());
        self.order.push_back(hash.clone());
        false
    }

    /// 移除指纹，允许同一任务再次准入
    pub fn remove(&mut self, hash: &TaskHash) -> bool {
        if !self.seen.remove(hash) {
            return false;
        }
        if let Some(index) = self.order.iter().position(|h| h == hash) {
            self.order.remove(index);
        }
        true
    }

    pub fn contains(&self, hash: &TaskHash) -> bool {
        self.seen.contains(hash)
    }

    pub fn clear(&mut self) {
        self.seen.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn evict_oldest_half(&mut self) {
        let evict = self.order.len() / 2;
        for hash in self.order.drain(..evict) {
            self.seen.remove(&hash);
        }
        debug!("去重窗口已满，淘汰最旧的 {} 条指纹", evict);
    }
}
