//! 原始日志输出
//!
//! 句柄把规范化后的记录交给 [`LogEmitter`]。CLI 环境直接渲染彩色文本，
//! 服务端环境转发给 `tracing`，由外部订阅器负责结构化输出。

use crate::config::{Environment, Level, TimestampMode};
use crate::core::resolver::format_timestamp;
use crate::error::{ComponentLogError, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::io::{IsTerminal, Write};
use std::sync::Arc;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

/// 单条日志记录，上下文永远在消息之前确定
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub level_num: u8,
    pub component: String,
    pub display_name: String,
    pub emoji: String,
    pub color: String,
    pub message: String,
    pub context: Map<String, Value>,
    #[serde(skip)]
    pub timestamp_mode: TimestampMode,
    #[serde(skip)]
    pub display: Arc<BTreeMap<String, bool>>,
}

impl LogRecord {
    fn shows(&self, option: &str) -> bool {
        self.display.get(option).copied().unwrap_or(true)
    }
}

/// 底层输出接口
pub trait LogEmitter: Send + Sync + Debug {
    fn emit(&self, record: &LogRecord);

    /// 输出名称，用于配置摘要
    fn name(&self) -> &'static str;
}

/// 什么都不做的输出，用于初始化彻底失败时的兜底
#[derive(Debug, Default)]
pub struct NoopEmitter;

impl LogEmitter for NoopEmitter {
    fn emit(&self, _record: &LogRecord) {}

    fn name(&self) -> &'static str {
        "noop"
    }
}

/// 终端彩色输出
#[derive(Debug, Default)]
pub struct ConsoleEmitter;

fn parse_hex_color(color: &str) -> Option<(u8, u8, u8)> {
    let hex = color.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(hex.get(range)?, 16).ok();
    Some((channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

impl ConsoleEmitter {
    /// 渲染一行文本
    pub fn render(&self, record: &LogRecord) -> String {
        let mut parts: Vec<String> = Vec::new();

        if record.shows("timestamp") && record.timestamp_mode != TimestampMode::Disable {
            let stamp = format_timestamp(record.timestamp.timestamp_millis(), record.timestamp_mode);
            parts.push(format!("[{}]", stamp).dimmed().to_string());
        }
        if record.shows("emoji") && !record.emoji.is_empty() {
            parts.push(record.emoji.clone());
        }
        if record.shows("component") {
            let label = format!("[{}]", record.display_name);
            let label = match parse_hex_color(&record.color) {
                Some((r, g, b)) => label.truecolor(r, g, b).bold().to_string(),
                None => label.bold().to_string(),
            };
            parts.push(label);
        }
        if record.shows("level") {
            let level = record.level.as_str().to_uppercase();
            let level = match record.level {
                Level::Trace => level.white(),
                Level::Debug => level.cyan(),
                Level::Info => level.green(),
                Level::Warn => level.yellow(),
                Level::Error | Level::Fatal => level.red(),
            };
            parts.push(format!("{:>5}", level));
        }
        if record.shows("message") && !record.message.is_empty() {
            parts.push(record.message.clone());
        }
        if record.shows("jsonPayload") && !record.context.is_empty() {
            if let Ok(payload) = serde_json::to_string(&record.context) {
                parts.push(payload);
            }
        }

        parts.join(" ")
    }
}

impl LogEmitter for ConsoleEmitter {
    fn emit(&self, record: &LogRecord) {
        let line = self.render(record);
        // 写失败直接忽略，日志不能让宿主程序崩溃
        if record.level >= Level::Warn {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
        } else {
            let _ = writeln!(std::io::stdout().lock(), "{}", line);
        }
    }

    fn name(&self) -> &'static str {
        "console"
    }
}

/// 转发到 `tracing` 的结构化输出
#[derive(Debug, Default)]
pub struct TracingEmitter;

impl LogEmitter for TracingEmitter {
    fn emit(&self, record: &LogRecord) {
        let context = Value::Object(record.context.clone());
        let component = record.component.as_str();
        let level_num = record.level_num;
        let message = record.message.as_str();
        match record.level {
            Level::Trace => tracing::trace!(target: "component_log", component, level_num, %context, "{}", message),
            Level::Debug => tracing::debug!(target: "component_log", component, level_num, %context, "{}", message),
            Level::Info => tracing::info!(target: "component_log", component, level_num, %context, "{}", message),
            Level::Warn => tracing::warn!(target: "component_log", component, level_num, %context, "{}", message),
            Level::Error => tracing::error!(target: "component_log", component, level_num, %context, "{}", message),
            Level::Fatal => tracing::error!(target: "component_log", component, level_num, fatal = true, %context, "{}", message),
        }
    }

    fn name(&self) -> &'static str {
        "tracing"
    }
}

/// 未强制指定时根据标准输出是否为终端推断运行环境
pub fn detect_environment() -> Environment {
    if std::io::stdout().is_terminal() {
        Environment::Cli
    } else {
        Environment::Server
    }
}

/// 为运行环境选择输出
pub fn emitter_for(environment: Option<Environment>) -> Result<Arc<dyn LogEmitter>> {
    match environment.unwrap_or_else(detect_environment) {
        Environment::Cli => Ok(Arc::new(ConsoleEmitter)),
        Environment::Server => Ok(Arc::new(TracingEmitter)),
        Environment::Browser => Err(ComponentLogError::UnsupportedEnvironment(
            "browser console output is not available in a native process".to_string(),
        )),
    }
}

/// 转换为 `tracing` 的级别，`fatal` 映射为 `ERROR`
pub fn to_tracing_level(level: Level) -> tracing::Level {
    match level {
        Level::Trace => tracing::Level::TRACE,
        Level::Debug => tracing::Level::DEBUG,
        Level::Info => tracing::Level::INFO,
        Level::Warn => tracing::Level::WARN,
        Level::Error | Level::Fatal => tracing::Level::ERROR,
    }
}

/// 安装 JSON 格式的全局 `tracing` 订阅器，供服务端环境使用
///
/// `RUST_LOG` 存在时优先生效，否则以 `level` 作为默认过滤级别。
pub fn install_json_subscriber(level: Level) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(to_tracing_level(level)).into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| ComponentLogError::tracing(e.to_string()))
}
