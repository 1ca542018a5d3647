//! 内存环形缓冲区
//!
//! 保存最近输出的日志记录，提供统计与订阅。容量满时丢弃最旧的记录。

use crate::core::emitter::LogRecord;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// 订阅标识，用于取消订阅
pub type SubscriptionId = u64;

/// 日志记录回调
pub type LogCallback = Arc<dyn Fn(&LogRecord) + Send + Sync>;

/// 日志统计
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogStats {
    /// 缓冲区创建（或清空）以来的记录总数
    pub total: u64,
    pub by_level: BTreeMap<String, u64>,
    pub by_component: BTreeMap<String, u64>,
    /// 当前仍在缓冲区中的记录数
    pub buffered: usize,
    /// 因容量不足被丢弃的记录数
    pub dropped: u64,
}

struct BufferState {
    records: VecDeque<LogRecord>,
    stats: LogStats,
    subscribers: Vec<(SubscriptionId, LogCallback)>,
    next_id: SubscriptionId,
}

/// 环形缓冲区
pub struct LogRingBuffer {
    state: Mutex<BufferState>,
    capacity: usize,
}

impl std::fmt::Debug for LogRingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogRingBuffer")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

impl LogRingBuffer {
    /// 创建指定容量的缓冲区，容量至少为 1
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(BufferState {
                records: VecDeque::new(),
                stats: LogStats::default(),
                subscribers: Vec::new(),
                next_id: 1,
            }),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 添加记录并通知订阅者
    ///
    /// 回调在锁外执行，回调内部可以安全地再次访问缓冲区。
    pub fn add(&self, record: LogRecord) {
        let subscribers: Vec<LogCallback> = {
            let mut state = self.lock();
            if state.records.len() >= self.capacity {
                state.records.pop_front();
                state.stats.dropped += 1;
            }
            state.stats.total += 1;
            *state
                .stats
                .by_level
                .entry(record.level.as_str().to_string())
                .or_insert(0) += 1;
            *state
                .stats
                .by_component
                .entry(record.component.clone())
                .or_insert(0) += 1;
            state.records.push_back(record.clone());
            state.subscribers.iter().map(|(_, cb)| cb.clone()).collect()
        };

        for callback in subscribers {
            callback(&record);
        }
    }

    pub fn get_stats(&self) -> LogStats {
        let state = self.lock();
        LogStats {
            buffered: state.records.len(),
            ..state.stats.clone()
        }
    }

    /// 最近的 `limit` 条记录，按时间顺序
    pub fn recent(&self, limit: usize) -> Vec<LogRecord> {
        let state = self.lock();
        let skip = state.records.len().saturating_sub(limit);
        state.records.iter().skip(skip).cloned().collect()
    }

    pub fn subscribe(&self, callback: LogCallback) -> SubscriptionId {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.subscribers.push((id, callback));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.lock();
        let before = state.subscribers.len();
        state.subscribers.retain(|(existing, _)| *existing != id);
        state.subscribers.len() != before
    }

    /// 清空记录与统计，保留订阅者
    pub fn clear(&self) {
        let mut state = self.lock();
        state.records.clear();
        state.stats = LogStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Level, TimestampMode};
    use chrono::Utc;
    use serde_json::Map;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn record(component: &str, level: Level) -> LogRecord {
        LogRecord {
            timestamp: Utc::now(),
            level,
            level_num: level.as_number(),
            component: component.to_string(),
            display_name: component.to_uppercase(),
            emoji: String::new(),
            color: String::new(),
            message: format!("{} message", component),
            context: Map::new(),
            timestamp_mode: TimestampMode::Absolute,
            display: Arc::new(BTreeMap::new()),
        }
    }

    #[test]
    fn test_buffer_creation() {
        let buffer = LogRingBuffer::new(100);
        assert_eq!(buffer.capacity(), 100);
        assert!(buffer.is_empty());
        assert_eq!(buffer.get_stats(), LogStats::default());
        assert_eq!(LogRingBuffer::new(0).capacity(), 1);
    }

    #[test]
    fn test_buffer_overflow() {
        let buffer = LogRingBuffer::new(2);
        for i in 0..5 {
            buffer.add(record(&format!("c{}", i), Level::Info));
        }
        assert_eq!(buffer.len(), 2);
        let stats = buffer.get_stats();
        assert_eq!(stats.total, 5);
        assert_eq!(stats.dropped, 3);
        assert_eq!(stats.buffered, 2);

        let recent = buffer.recent(10);
        assert_eq!(recent[0].component, "c3");
        assert_eq!(recent[1].component, "c4");
    }

    #[test]
    fn test_stats_by_level_and_component() {
        let buffer = LogRingBuffer::new(10);
        buffer.add(record("api", Level::Info));
        buffer.add(record("api", Level::Error));
        buffer.add(record("db", Level::Info));

        let stats = buffer.get_stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_level["info"], 2);
        assert_eq!(stats.by_level["error"], 1);
        assert_eq!(stats.by_component["api"], 2);
        assert_eq!(stats.by_component["db"], 1);
    }

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let buffer = LogRingBuffer::new(10);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let id = buffer.subscribe(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        buffer.add(record("api", Level::Info));
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        assert!(buffer.unsubscribe(id));
        assert!(!buffer.unsubscribe(id));
        buffer.add(record("api", Level::Info));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_may_reenter_buffer() {
        let buffer = Arc::new(LogRingBuffer::new(10));
        let inner = buffer.clone();
        let observed = Arc::new(AtomicUsize::new(0));
        let observed_clone = observed.clone();
        buffer.subscribe(Arc::new(move |_| {
            observed_clone.store(inner.len(), Ordering::SeqCst);
        }));
        buffer.add(record("api", Level::Info));
        assert_eq!(observed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clear_resets_records_and_stats() {
        let buffer = LogRingBuffer::new(10);
        buffer.add(record("api", Level::Warn));
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.get_stats().total, 0);
    }
}
