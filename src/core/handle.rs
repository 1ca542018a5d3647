//! 组件日志句柄
//!
//! 每个组件一个句柄，缓存解析后的组件配置与有效级别。配置变化后由
//! 注册表调用 [`LoggerHandle::refresh`] 更新，缓存绝不能在控制操作后过期。

use crate::config::{Level, TimestampMode};
use crate::core::args::LogArgs;
use crate::core::buffer::LogRingBuffer;
use crate::core::emitter::{LogEmitter, LogRecord};
use crate::core::resolver::{ConfigResolver, ResolvedComponent};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// 句柄缓存的派生状态
#[derive(Debug, Clone, PartialEq)]
pub struct HandleSnapshot {
    pub component: ResolvedComponent,
    pub timestamp_mode: TimestampMode,
    pub display: Arc<BTreeMap<String, bool>>,
}

impl HandleSnapshot {
    /// 从解析器重新推导
    pub fn resolve(resolver: &ConfigResolver, name: &str, path: Option<&str>) -> Self {
        Self {
            component: resolver.get_component_config(name, path),
            timestamp_mode: resolver.timestamp_mode(),
            display: Arc::new(resolver.get_display_config(path)),
        }
    }
}

/// 组件日志句柄
pub struct LoggerHandle {
    name: String,
    snapshot: RwLock<HandleSnapshot>,
    emitter: Arc<dyn LogEmitter>,
    buffer: Arc<LogRingBuffer>,
}

impl std::fmt::Debug for LoggerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggerHandle")
            .field("name", &self.name)
            .field("level", &self.level())
            .field("emitter", &self.emitter.name())
            .finish()
    }
}

impl LoggerHandle {
    pub fn new(
        name: impl Into<String>,
        snapshot: HandleSnapshot,
        emitter: Arc<dyn LogEmitter>,
        buffer: Arc<LogRingBuffer>,
    ) -> Self {
        Self {
            name: name.into(),
            snapshot: RwLock::new(snapshot),
            emitter,
            buffer,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn snapshot(&self) -> HandleSnapshot {
        self.snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// 缓存的有效级别
    pub fn level(&self) -> Level {
        self.snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .component
            .level
    }

    pub fn config(&self) -> ResolvedComponent {
        self.snapshot().component
    }

    /// 替换缓存的派生状态
    pub fn refresh(&self, snapshot: HandleSnapshot) {
        let mut current = self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = snapshot;
    }

    pub fn is_level_enabled(&self, level: Level) -> bool {
        let snapshot = self
            .snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        snapshot.component.enabled && level >= snapshot.component.level
    }

    /// 以指定级别输出
    pub fn log(&self, level: Level, args: impl Into<LogArgs>) {
        let snapshot = self.snapshot();
        if !snapshot.component.enabled || level < snapshot.component.level {
            return;
        }

        let normalized = args.into().normalize();
        let record = LogRecord {
            timestamp: Utc::now(),
            level,
            level_num: level.as_number(),
            component: self.name.clone(),
            display_name: snapshot.component.display_name,
            emoji: snapshot.component.emoji,
            color: snapshot.component.color,
            message: normalized.message,
            context: normalized.context,
            timestamp_mode: snapshot.timestamp_mode,
            display: snapshot.display,
        };
        self.emitter.emit(&record);
        self.buffer.add(record);
    }

    pub fn trace(&self, args: impl Into<LogArgs>) {
        self.log(Level::Trace, args)
    }

    pub fn debug(&self, args: impl Into<LogArgs>) {
        self.log(Level::Debug, args)
    }

    pub fn info(&self, args: impl Into<LogArgs>) {
        self.log(Level::Info, args)
    }

    pub fn warn(&self, args: impl Into<LogArgs>) {
        self.log(Level::Warn, args)
    }

    pub fn error(&self, args: impl Into<LogArgs>) {
        self.log(Level::Error, args)
    }

    pub fn fatal(&self, args: impl Into<LogArgs>) {
        self.log(Level::Fatal, args)
    }
}
