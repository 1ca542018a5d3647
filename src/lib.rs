//! component_log - 按组件解析级别的运行时日志库
//!
//! 每个命名组件拥有独立的日志级别，有效级别按以下顺序确定：
//! 文件覆盖（路径或模式命中）> 组件级别 > 全局级别。
//! 整个进程共享一个日志管理器，首次初始化只发生一次，之后带选项的调用会
//! 完整重置并重新合并配置。
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use component_log::{get_instance, ConfigSource};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let logger = get_instance(Some(ConfigSource::Document(json!({
//!         "globalLevel": "warn",
//!         "components": {"api": {"level": "debug"}},
//!         "fileOverrides": {"routes/admin.js": {"level": "trace"}}
//!     }))))
//!     .await;
//!
//!     let api = logger.get_component("api");
//!     api.debug("request received");
//!     api.info(("user saved", json!({"id": 42})));
//! }
//! ```
//!
//! # 运行时控制
//!
//! ```rust,no_run
//! use component_log::{controls, Level};
//!
//! #[tokio::main]
//! async fn main() {
//!     let controls = controls().await;
//!     controls.set_level("database", Level::Trace);
//!     controls.set_level("*", Level::Warn);
//!     println!("{:?}", controls.get_config_summary());
//! }
//! ```

pub mod config;
pub mod controls;
pub mod core;
pub mod env_config;
pub mod error;
pub mod manager;

// 重新导出主要类型
pub use config::{
    load_config_from_file, load_config_from_str, reduce, ComponentConfig, ConfigDocument,
    ConfigLoader, ConfigSource, Environment, FileConfigLoader, Level, OverrideConfig,
    TimestampMode,
};
pub use controls::LoggerControls;
pub use crate::core::emitter::install_json_subscriber;
pub use crate::core::{LogArg, LogRecord, LogStats, LoggerHandle, SubscriptionId};
pub use env_config::EnvConfig;
pub use error::{ComponentLogError, Result};
pub use manager::{
    get_instance_in, get_instance_sync_in, get_instance_with_loader, global_slot, LifecycleState,
    LoggerManager, SharedSlot,
};

use std::sync::Arc;

/// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 库自身元日志使用的 `tracing` target
pub const META_TARGET: &str = "component_log::meta";

/// 获取进程级日志管理器
///
/// 未初始化时加载配置并发布实例；已初始化且 `options` 非空时完整重新初始化；
/// 否则直接返回已发布的实例。初始化失败时返回 no-op 管理器，绝不报错。
pub async fn get_instance(options: Option<ConfigSource>) -> Arc<LoggerManager> {
    manager::get_instance_in(global_slot(), options).await
}

/// [`get_instance`] 的同步版本
pub fn get_instance_sync(options: Option<ConfigSource>) -> Arc<LoggerManager> {
    manager::get_instance_sync_in(global_slot(), options)
}

/// 获取组件句柄，未知组件自动创建
pub fn get_component(name: &str) -> Arc<LoggerHandle> {
    get_instance_sync(None).get_component(name)
}

/// 获取进程级控制接口
pub async fn controls() -> Arc<LoggerControls> {
    if let Some(controls) = global_slot().controls() {
        return controls;
    }
    let manager = get_instance(None).await;
    global_slot()
        .controls()
        .unwrap_or_else(|| Arc::new(LoggerControls::new(manager)))
}

/// 进程级日志管理器是否已发布
pub fn is_initialized() -> bool {
    global_slot().instance().is_some()
}
