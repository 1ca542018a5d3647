//! 环境变量配置模块
//!
//! 首次初始化时在默认配置之上叠加环境变量，再叠加调用方选项。
//!
//! | 变量 | 作用 |
//! |---|---|
//! | `COMPONENT_LOG_LEVEL` | 全局级别 |
//! | `COMPONENT_LOG_TIMESTAMP` | 时间戳模式 |
//! | `COMPONENT_LOG_ENV` | 强制运行环境（`cli`/`server`/`browser`） |
//! | `COMPONENT_LOG_CONFIG` | 配置文件路径 |

use crate::config::{Level, TimestampMode};
use serde_json::{Map, Value};
use std::env;
use std::path::PathBuf;

pub const LEVEL_VAR: &str = "COMPONENT_LOG_LEVEL";
pub const TIMESTAMP_VAR: &str = "COMPONENT_LOG_TIMESTAMP";
pub const ENVIRONMENT_VAR: &str = "COMPONENT_LOG_ENV";
pub const CONFIG_PATH_VAR: &str = "COMPONENT_LOG_CONFIG";

/// 从环境变量读取的配置
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvConfig {
    pub level: Option<Level>,
    pub timestamp_mode: Option<TimestampMode>,
    pub environment: Option<String>,
    pub config_path: Option<PathBuf>,
}

impl EnvConfig {
    /// 读取当前进程的环境变量
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 通过任意查找函数构造，空值视为未设置
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let level = read(LEVEL_VAR).and_then(|raw| match raw.parse::<Level>() {
            Ok(level) => Some(level),
            Err(e) => {
                tracing::warn!(target: crate::META_TARGET, "Ignoring {}: {}", LEVEL_VAR, e);
                None
            }
        });

        Self {
            level,
            timestamp_mode: read(TIMESTAMP_VAR).map(|raw| TimestampMode::from_name(&raw)),
            environment: read(ENVIRONMENT_VAR).map(|raw| raw.to_lowercase()),
            config_path: read(CONFIG_PATH_VAR).map(PathBuf::from),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.level.is_none()
            && self.timestamp_mode.is_none()
            && self.environment.is_none()
            && self.config_path.is_none()
    }

    /// 转换为可合并的配置片段（不含配置文件路径）
    pub fn overlay(&self) -> Value {
        let mut overlay = Map::new();
        if let Some(level) = self.level {
            overlay.insert("globalLevel".to_string(), Value::from(level.as_str()));
        }
        if let Some(mode) = self.timestamp_mode {
            overlay.insert("timestampMode".to_string(), Value::from(mode.as_str()));
        }
        if let Some(environment) = &self.environment {
            overlay.insert(
                "forceEnvironment".to_string(),
                Value::from(environment.as_str()),
            );
        }
        Value::Object(overlay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_env_config_reads_all_vars() {
        let config = EnvConfig::from_lookup(lookup(&[
            (LEVEL_VAR, "DEBUG"),
            (TIMESTAMP_VAR, "relative"),
            (ENVIRONMENT_VAR, "Server"),
            (CONFIG_PATH_VAR, "/etc/app/logging.toml"),
        ]));
        assert_eq!(config.level, Some(Level::Debug));
        assert_eq!(config.timestamp_mode, Some(TimestampMode::Relative));
        assert_eq!(config.environment.as_deref(), Some("server"));
        assert_eq!(
            config.config_path,
            Some(PathBuf::from("/etc/app/logging.toml"))
        );
        assert_eq!(
            config.overlay(),
            json!({
                "globalLevel": "debug",
                "timestampMode": "relative",
                "forceEnvironment": "server"
            })
        );
    }

    #[test]
    fn test_empty_and_invalid_values_are_ignored() {
        let config = EnvConfig::from_lookup(lookup(&[(LEVEL_VAR, "loud"), (TIMESTAMP_VAR, "  ")]));
        assert!(config.is_empty());
        assert_eq!(config.overlay(), json!({}));
    }
}
