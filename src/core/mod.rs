//! 核心模块
//!
//! 模式匹配、配置解析、组件注册表、日志句柄，以及句柄依赖的输出与环形缓冲区。

pub mod args;
pub mod buffer;
pub mod emitter;
pub mod handle;
pub mod pattern;
pub mod registry;
pub mod resolver;

// 重新导出核心类型
pub use args::{normalize_args, LogArg, LogArgs, NormalizedArgs};
pub use buffer::{LogCallback, LogRingBuffer, LogStats, SubscriptionId};
pub use emitter::{ConsoleEmitter, LogEmitter, LogRecord, NoopEmitter, TracingEmitter};
pub use handle::{HandleSnapshot, LoggerHandle};
pub use pattern::{matches, normalize_path};
pub use registry::{ComponentCallback, ComponentRegistry, GetOrCreate};
pub use resolver::{format_component_name, format_timestamp, ConfigResolver, ConfigSummary, ResolvedComponent};
