//! 运行时控制接口
//!
//! 面向控制面板或调试命令的操作集合。所有修改都经过解析器，随后立即刷新
//! 已创建的句柄，句柄缓存的级别永远不会落后于配置。

use crate::config::{Level, OverrideConfig, TimestampMode};
use crate::core::buffer::{LogCallback, LogStats, SubscriptionId};
use crate::core::emitter::LogRecord;
use crate::core::handle::LoggerHandle;
use crate::core::registry::ComponentCallback;
use crate::core::resolver::ConfigSummary;
use crate::manager::LoggerManager;
use std::collections::BTreeMap;
use std::sync::Arc;

/// 代表全局级别的组件名
const GLOBAL_TARGETS: [&str; 2] = ["*", "global"];

/// 控制接口，绑定到一个管理器
#[derive(Debug, Clone)]
pub struct LoggerControls {
    manager: Arc<LoggerManager>,
}

impl LoggerControls {
    pub fn new(manager: Arc<LoggerManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<LoggerManager> {
        &self.manager
    }

    /// 设置级别；`*` 或 `global` 表示全局级别
    pub fn set_level(&self, component: &str, level: Level) {
        self.manager.update_resolver(|resolver| {
            if GLOBAL_TARGETS.contains(&component) {
                resolver.set_global_level(level);
            } else {
                resolver.set_component_level(component, level);
            }
        });
    }

    /// 组件的有效级别，`None` 返回全局级别
    pub fn get_level(&self, component: Option<&str>) -> Level {
        self.manager.with_resolver(|resolver| match component {
            Some(name) if !GLOBAL_TARGETS.contains(&name) => {
                resolver.get_effective_level(name, None)
            }
            _ => resolver.global_level(),
        })
    }

    pub fn list_components(&self) -> Vec<String> {
        self.manager.list_components()
    }

    pub fn get_component(&self, name: &str) -> Arc<LoggerHandle> {
        self.manager.get_component(name)
    }

    /// 订阅组件列表变化，订阅时立即以当前列表回调一次
    pub fn subscribe_to_components(&self, callback: ComponentCallback) -> SubscriptionId {
        self.manager.subscribe_to_components(callback)
    }

    pub fn unsubscribe_from_components(&self, id: SubscriptionId) -> bool {
        self.manager.unsubscribe_from_components(id)
    }

    /// 全局与所有已配置组件切到 `debug`
    pub fn enable_debug_mode(&self) {
        self.set_all_levels(Level::Debug);
    }

    /// 全局与所有已配置组件切到 `trace`
    pub fn enable_trace_mode(&self) {
        self.set_all_levels(Level::Trace);
    }

    fn set_all_levels(&self, level: Level) {
        self.manager.update_resolver(|resolver| {
            resolver.set_global_level(level);
            for name in resolver.component_names() {
                resolver.set_component_level(&name, level);
            }
        });
        tracing::debug!(target: crate::META_TARGET, level = %level, "all components switched");
    }

    pub fn add_file_override(&self, pattern: &str, config: OverrideConfig) {
        self.manager
            .update_resolver(|resolver| resolver.add_file_override(pattern, config));
    }

    pub fn remove_file_override(&self, pattern: &str) -> bool {
        self.manager
            .update_resolver(|resolver| resolver.remove_file_override(pattern))
    }

    pub fn list_file_overrides(&self) -> Vec<(String, OverrideConfig)> {
        self.manager
            .with_resolver(|resolver| resolver.list_file_overrides())
    }

    /// 设置当前源文件路径，句柄按其重新解析文件覆盖
    pub fn set_current_file(&self, path: Option<&str>) {
        self.manager
            .update_resolver(|resolver| resolver.set_current_file(path));
    }

    pub fn set_timestamp_mode(&self, mode: TimestampMode) {
        self.manager
            .update_resolver(|resolver| resolver.set_timestamp_mode(mode));
    }

    pub fn get_timestamp_mode(&self) -> TimestampMode {
        self.manager.with_resolver(|resolver| resolver.timestamp_mode())
    }

    pub fn set_display_option(&self, option: &str, enabled: bool) {
        self.manager
            .update_resolver(|resolver| resolver.set_display_option(option, enabled));
    }

    pub fn get_display_config(&self) -> BTreeMap<String, bool> {
        self.manager
            .with_resolver(|resolver| resolver.get_display_config(None))
    }

    pub fn get_stats(&self) -> LogStats {
        self.manager.buffer().get_stats()
    }

    pub fn recent_logs(&self, limit: usize) -> Vec<LogRecord> {
        self.manager.buffer().recent(limit)
    }

    /// 订阅每一条输出的日志记录
    pub fn subscribe(&self, callback: LogCallback) -> SubscriptionId {
        self.manager.buffer().subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.manager.buffer().unsubscribe(id)
    }

    pub fn clear_logs(&self) {
        self.manager.buffer().clear();
    }

    pub fn get_config_summary(&self) -> ConfigSummary {
        self.manager.with_resolver(|resolver| resolver.summary())
    }

    pub fn reset(&self) {
        self.manager.reset();
    }

    /// 强制重新推导所有句柄
    pub fn refresh(&self) {
        self.manager.refresh();
    }
}
