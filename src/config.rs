//! 定义 component_log 的配置文档、合并规则以及配置源加载。
//!
//! 配置文档在任意时刻只有一个处于激活状态，由 [`crate::core::resolver::ConfigResolver`]
//! 独占持有。所有合并都以 JSON 结构进行：`components` 整体替换，其余键递归合并。

use crate::error::{ComponentLogError, Result};
use async_trait::async_trait;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// 未知组件使用的默认图标
pub const DEFAULT_EMOJI: &str = "📝";
/// 未知组件使用的默认颜色
pub const DEFAULT_COLOR: &str = "#95A5A6";

/// 常见组件名的内置配色方案：(名称, 图标, 颜色)
const BUILTIN_SCHEME: &[(&str, &str, &str)] = &[
    ("api", "🌐", "#4A90E2"),
    ("auth", "🔐", "#E74C3C"),
    ("cache", "⚡", "#F39C12"),
    ("database", "💾", "#27AE60"),
    ("router", "🧭", "#34495E"),
    ("ui", "🎨", "#9B59B6"),
    ("websocket", "🔌", "#1ABC9C"),
    ("worker", "⚙️", "#7F8C8D"),
];

// --- 辅助函数，用于提供配置项的默认值 ---
fn default_project_name() -> String {
    "component_log".to_string()
}
fn default_true() -> bool {
    true
}
fn default_buffer_size() -> usize {
    1000
}
fn default_display() -> BTreeMap<String, bool> {
    [
        ("timestamp", true),
        ("emoji", true),
        ("component", true),
        ("level", false),
        ("message", true),
        ("jsonPayload", true),
        ("stackTrace", true),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), value))
    .collect()
}
fn default_components() -> BTreeMap<String, ComponentConfig> {
    BUILTIN_SCHEME
        .iter()
        .map(|(name, emoji, color)| {
            (
                name.to_string(),
                ComponentConfig {
                    emoji: Some(emoji.to_string()),
                    color: Some(color.to_string()),
                    ..Default::default()
                },
            )
        })
        .collect()
}

/// 日志级别，按严重程度排序
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Level {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Fatal,
}

impl Level {
    /// 全部级别，从低到高
    pub const ALL: [Level; 6] = [
        Level::Trace,
        Level::Debug,
        Level::Info,
        Level::Warn,
        Level::Error,
        Level::Fatal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }

    /// 传递给底层输出的数值级别
    pub fn as_number(&self) -> u8 {
        match self {
            Level::Trace => 10,
            Level::Debug => 20,
            Level::Info => 30,
            Level::Warn => 40,
            Level::Error => 50,
            Level::Fatal => 60,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Level {
    type Err = ComponentLogError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(Level::Trace),
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            "fatal" => Ok(Level::Fatal),
            _ => Err(ComponentLogError::InvalidLogLevel(s.to_string())),
        }
    }
}

impl Serialize for Level {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// 时间戳显示模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampMode {
    /// 24 小时制，毫秒精度
    #[default]
    Absolute,
    /// 12 小时制，分钟精度
    Readable,
    /// 相对当前时间
    Relative,
    /// 不显示
    Disable,
}

impl TimestampMode {
    /// 未知模式回退为 `Absolute`
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "readable" => TimestampMode::Readable,
            "relative" => TimestampMode::Relative,
            "disable" | "disabled" => TimestampMode::Disable,
            _ => TimestampMode::Absolute,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimestampMode::Absolute => "absolute",
            TimestampMode::Readable => "readable",
            TimestampMode::Relative => "relative",
            TimestampMode::Disable => "disable",
        }
    }
}

impl fmt::Display for TimestampMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TimestampMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TimestampMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(TimestampMode::from_name(&raw))
    }
}

/// 运行环境，决定使用哪种输出
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Browser,
    Cli,
    Server,
}

/// 配置文档中的单个组件配置
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<Level>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for ComponentConfig {
    fn default() -> Self {
        Self {
            emoji: None,
            color: None,
            display_name: None,
            level: None,
            enabled: default_true(),
        }
    }
}

impl ComponentConfig {
    /// 仅设置级别的组件配置
    pub fn with_level(level: Level) -> Self {
        Self {
            level: Some(level),
            ..Default::default()
        }
    }
}

/// 按路径模式生效的覆盖配置，叠加在组件配置之上
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct OverrideConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<Level>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<BTreeMap<String, bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl OverrideConfig {
    pub fn with_level(level: Level) -> Self {
        Self {
            level: Some(level),
            ..Default::default()
        }
    }
}

/// 保持声明顺序的文件覆盖表
///
/// 多个通配模式同时匹配时，先声明者优先，所以这里不能用无序或排序的映射。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FileOverrides(Vec<(String, OverrideConfig)>);

impl FileOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入或替换；已存在的键保留原来的位置
    pub fn upsert(&mut self, pattern: impl Into<String>, config: OverrideConfig) {
        let pattern = pattern.into();
        match self.0.iter_mut().find(|(key, _)| *key == pattern) {
            Some((_, existing)) => *existing = config,
            None => self.0.push((pattern, config)),
        }
    }

    pub fn remove(&mut self, pattern: &str) -> Option<OverrideConfig> {
        let index = self.0.iter().position(|(key, _)| key == pattern)?;
        Some(self.0.remove(index).1)
    }

    pub fn get(&self, pattern: &str) -> Option<&OverrideConfig> {
        self.0
            .iter()
            .find(|(key, _)| key == pattern)
            .map(|(_, config)| config)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OverrideConfig)> {
        self.0.iter().map(|(key, config)| (key.as_str(), config))
    }

    pub fn patterns(&self) -> Vec<String> {
        self.0.iter().map(|(key, _)| key.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for FileOverrides {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (pattern, config) in &self.0 {
            map.serialize_entry(pattern, config)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FileOverrides {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct OverridesVisitor;

        impl<'de> Visitor<'de> for OverridesVisitor {
            type Value = FileOverrides;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of path patterns to override configs")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut overrides = FileOverrides::new();
                while let Some((pattern, config)) =
                    access.next_entry::<String, OverrideConfig>()?
                {
                    overrides.upsert(pattern, config);
                }
                Ok(overrides)
            }
        }

        deserializer.deserialize_map(OverridesVisitor)
    }
}

/// 当前生效的完整配置文档
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDocument {
    #[serde(default = "default_project_name")]
    pub project_name: String,
    #[serde(default)]
    pub global_level: Level,
    #[serde(default)]
    pub components: BTreeMap<String, ComponentConfig>,
    #[serde(default)]
    pub file_overrides: FileOverrides,
    #[serde(default = "default_display")]
    pub display: BTreeMap<String, bool>,
    #[serde(default)]
    pub timestamp_mode: TimestampMode,
    /// 三态：`None` 表示未设置
    #[serde(default)]
    pub meta_logging: Option<bool>,
    #[serde(default)]
    pub force_environment: Option<Environment>,
    /// 内存环形缓冲区容量
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for ConfigDocument {
    fn default() -> Self {
        Self {
            project_name: default_project_name(),
            global_level: Level::default(),
            components: default_components(),
            file_overrides: FileOverrides::default(),
            display: default_display(),
            timestamp_mode: TimestampMode::default(),
            meta_logging: None,
            force_environment: None,
            buffer_size: default_buffer_size(),
        }
    }
}

/// 查找常见组件名的内置配色
pub fn builtin_component(name: &str) -> Option<ComponentConfig> {
    BUILTIN_SCHEME
        .iter()
        .find(|(builtin, _, _)| builtin.eq_ignore_ascii_case(name))
        .map(|(_, emoji, color)| ComponentConfig {
            emoji: Some(emoji.to_string()),
            color: Some(color.to_string()),
            ..Default::default()
        })
}

// (别名, 规范名)
const TOP_LEVEL_ALIASES: &[(&str, &str)] = &[
    ("project_name", "projectName"),
    ("level", "globalLevel"),
    ("global_level", "globalLevel"),
    ("file_overrides", "fileOverrides"),
    ("overrides", "fileOverrides"),
    ("displayOptions", "display"),
    ("display_options", "display"),
    ("timestamp_mode", "timestampMode"),
    ("timestampFormat", "timestampMode"),
    ("meta_logging", "metaLogging"),
    ("force_environment", "forceEnvironment"),
    ("environment", "forceEnvironment"),
    ("buffer_size", "bufferSize"),
];

const ENTRY_ALIASES: &[(&str, &str)] = &[("display_name", "displayName"), ("name", "displayName")];

fn rename_keys(object: &mut Map<String, Value>, aliases: &[(&str, &str)]) {
    for (alias, canonical) in aliases {
        if let Some(value) = object.remove(*alias) {
            if !object.contains_key(*canonical) {
                object.insert(canonical.to_string(), value);
            }
        }
    }
}

/// 将结构别名规范化为标准文档形状
///
/// 非对象输入原样返回，由调用方决定是否报错。
pub fn normalize_aliases(source: Value) -> Value {
    let Value::Object(mut object) = source else {
        return source;
    };
    rename_keys(&mut object, TOP_LEVEL_ALIASES);

    for section in ["components", "fileOverrides"] {
        if let Some(Value::Object(entries)) = object.get_mut(section) {
            for entry in entries.values_mut() {
                if let Value::Object(fields) = entry {
                    rename_keys(fields, ENTRY_ALIASES);
                }
            }
        }
    }
    Value::Object(object)
}

/// 通用深度合并：对象递归，数组与原始值直接替换
fn deep_merge(base: &mut Value, overlay: &Value) {
    if let (Some(base_map), Some(overlay_map)) = (base.as_object_mut(), overlay.as_object()) {
        for (key, value) in overlay_map {
            merge_entry(base_map, key, value);
        }
        return;
    }
    *base = overlay.clone();
}

fn merge_entry(target: &mut Map<String, Value>, key: &str, value: &Value) {
    let nested = value.is_object() && target.get(key).is_some_and(Value::is_object);
    if nested {
        if let Some(existing) = target.get_mut(key) {
            deep_merge(existing, value);
        }
    } else {
        target.insert(key.to_string(), value.clone());
    }
}

/// 合并两个配置文档
///
/// 顶层 `components` 非空时整体替换（不与旧组件取并集），其余键按 [`deep_merge`] 处理。
pub fn merge_documents(base: &Value, overlay: &Value) -> Value {
    let Value::Object(overlay_map) = overlay else {
        return if overlay.is_null() {
            base.clone()
        } else {
            overlay.clone()
        };
    };
    let mut merged = base.clone();
    let Value::Object(merged_map) = &mut merged else {
        return overlay.clone();
    };

    for (key, value) in overlay_map {
        if key == "components" {
            if !matches!(value, Value::Object(components) if components.is_empty()) {
                merged_map.insert(key.clone(), value.clone());
            }
            continue;
        }
        merge_entry(merged_map, key, value);
    }
    merged
}

/// 纯状态转换：在 `prior` 之上合并 `options`，返回新文档
pub fn reduce(prior: &ConfigDocument, options: &Value) -> Result<ConfigDocument> {
    let overlay = normalize_aliases(options.clone());
    if !overlay.is_object() && !overlay.is_null() {
        return Err(ComponentLogError::config(format!(
            "configuration must be an object, got {}",
            overlay
        )));
    }
    let base = serde_json::to_value(prior)?;
    let merged = merge_documents(&base, &overlay);
    Ok(serde_json::from_value(merged)?)
}

/// 配置来源描述
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// 已解析的配置对象
    Document(Value),
    /// 配置文件路径（`.toml` 按 TOML 解析，其余按 JSON）
    Path(PathBuf),
    /// TOML 文本
    Toml(String),
    /// JSON 文本
    Json(String),
}

impl ConfigSource {
    /// 空来源不会触发重新初始化
    pub fn is_empty(&self) -> bool {
        match self {
            ConfigSource::Document(Value::Null) => true,
            ConfigSource::Document(Value::Object(map)) => map.is_empty(),
            ConfigSource::Document(_) => false,
            ConfigSource::Path(path) => path.as_os_str().is_empty(),
            ConfigSource::Toml(text) | ConfigSource::Json(text) => text.trim().is_empty(),
        }
    }
}

impl From<Value> for ConfigSource {
    fn from(value: Value) -> Self {
        ConfigSource::Document(value)
    }
}

impl From<PathBuf> for ConfigSource {
    fn from(path: PathBuf) -> Self {
        ConfigSource::Path(path)
    }
}

impl From<&Path> for ConfigSource {
    fn from(path: &Path) -> Self {
        ConfigSource::Path(path.to_path_buf())
    }
}

/// 配置源加载器
///
/// 负责把配置来源变成 JSON 对象；失败由解析器吞掉并保留旧配置。
#[async_trait]
pub trait ConfigLoader: Send + Sync + fmt::Debug {
    /// 异步加载，可能在文件读取处挂起
    async fn load(&self, source: &ConfigSource) -> Result<Value>;

    /// 同步加载
    fn load_sync(&self, source: &ConfigSource) -> Result<Value>;
}

/// 默认加载器：读取本地 TOML/JSON 文件或直接解析文本
#[derive(Debug, Default, Clone)]
pub struct FileConfigLoader;

impl FileConfigLoader {
    fn parse_text(path: &Path, text: &str) -> Result<Value> {
        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        if is_toml {
            parse_toml(text)
        } else {
            Ok(serde_json::from_str(text)?)
        }
    }

    fn parse_inline(source: &ConfigSource) -> Option<Result<Value>> {
        match source {
            ConfigSource::Document(value) => Some(Ok(value.clone())),
            ConfigSource::Toml(text) => Some(parse_toml(text)),
            ConfigSource::Json(text) => Some(serde_json::from_str(text).map_err(Into::into)),
            ConfigSource::Path(_) => None,
        }
    }
}

#[async_trait]
impl ConfigLoader for FileConfigLoader {
    async fn load(&self, source: &ConfigSource) -> Result<Value> {
        if let Some(parsed) = Self::parse_inline(source) {
            return parsed;
        }
        let ConfigSource::Path(path) = source else {
            return Err(ComponentLogError::internal("unexpected config source"));
        };
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(ComponentLogError::ConfigFileMissing(
                path.to_string_lossy().into_owned(),
            ));
        }
        let text = tokio::fs::read_to_string(path).await?;
        Self::parse_text(path, &text)
    }

    fn load_sync(&self, source: &ConfigSource) -> Result<Value> {
        if let Some(parsed) = Self::parse_inline(source) {
            return parsed;
        }
        let ConfigSource::Path(path) = source else {
            return Err(ComponentLogError::internal("unexpected config source"));
        };
        if !path.exists() {
            return Err(ComponentLogError::ConfigFileMissing(
                path.to_string_lossy().into_owned(),
            ));
        }
        let text = std::fs::read_to_string(path)?;
        Self::parse_text(path, &text)
    }
}

fn parse_toml(text: &str) -> Result<Value> {
    let table: toml::Table = toml::from_str(text)?;
    Ok(serde_json::to_value(table)?)
}

/// 从 TOML 或 JSON 文件加载配置，并合并到默认配置之上。
pub fn load_config_from_file(path: &Path) -> Result<ConfigDocument> {
    let value = FileConfigLoader.load_sync(&ConfigSource::Path(path.to_path_buf()))?;
    reduce(&ConfigDocument::default(), &value)
}

/// 从 TOML 字符串加载配置，并合并到默认配置之上。
pub fn load_config_from_str(config_str: &str) -> Result<ConfigDocument> {
    let value = parse_toml(config_str)?;
    reduce(&ConfigDocument::default(), &value)
}
