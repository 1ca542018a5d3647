//! 配置解析器
//!
//! 持有当前生效的 [`ConfigDocument`]，所有外部访问都经过这里，
//! 以保证"`components` 替换、其余合并"的规则不会被绕过。
//!
//! 有效级别的优先级严格为：文件覆盖（提供了路径且命中）> 组件级别 > 全局级别。

use crate::config::{
    builtin_component, reduce, ComponentConfig, ConfigDocument, ConfigLoader, ConfigSource,
    Environment, FileConfigLoader, Level, OverrideConfig, TimestampMode, DEFAULT_COLOR,
    DEFAULT_EMOJI,
};
use crate::core::pattern::{matches, normalize_path};
use crate::error::Result;
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// 解析后的组件配置，所有字段都已确定
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedComponent {
    pub name: String,
    pub emoji: String,
    pub color: String,
    pub display_name: String,
    pub level: Level,
    pub enabled: bool,
}

/// 配置摘要，供控制面板或 CLI 展示
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSummary {
    pub project_name: String,
    pub global_level: Level,
    pub timestamp_mode: TimestampMode,
    pub components: Vec<String>,
    pub file_overrides: Vec<String>,
    pub display: BTreeMap<String, bool>,
    pub meta_logging: Option<bool>,
    pub force_environment: Option<Environment>,
    pub current_file: Option<String>,
}

/// 组件名格式化：全大写保持不变，否则驼峰边界与下划线转为连字符后整体大写
pub fn format_component_name(name: &str) -> String {
    if name == name.to_uppercase() {
        return name.to_string();
    }
    let mut formatted = String::with_capacity(name.len() + 4);
    let mut previous: Option<char> = None;
    for ch in name.chars() {
        if ch == '_' {
            formatted.push('-');
        } else {
            if ch.is_uppercase()
                && previous.is_some_and(|p| p.is_lowercase() || p.is_ascii_digit())
            {
                formatted.push('-');
            }
            formatted.push(ch);
        }
        previous = Some(ch);
    }
    formatted.to_uppercase()
}

/// 以当前时间为基准格式化时间戳
pub fn format_timestamp(epoch_millis: i64, mode: TimestampMode) -> String {
    format_timestamp_at(epoch_millis, mode, Utc::now().timestamp_millis())
}

/// 以指定的 `now_millis` 为基准格式化时间戳
pub fn format_timestamp_at(epoch_millis: i64, mode: TimestampMode, now_millis: i64) -> String {
    if mode == TimestampMode::Disable {
        return String::new();
    }
    if mode == TimestampMode::Relative {
        let seconds = now_millis.saturating_sub(epoch_millis).max(0) / 1000;
        return match seconds {
            0 => "now".to_string(),
            1..=59 => format!("{}s ago", seconds),
            60..=3599 => format!("{}m ago", seconds / 60),
            _ => format!("{}h ago", seconds / 3600),
        };
    }
    let Some(timestamp) = DateTime::<Utc>::from_timestamp_millis(epoch_millis) else {
        return String::new();
    };
    let local = timestamp.with_timezone(&Local);
    match mode {
        TimestampMode::Readable => local.format("%-I:%M %p").to_string(),
        _ => local.format("%H:%M:%S%.3f").to_string(),
    }
}

/// 配置解析器
#[derive(Debug)]
pub struct ConfigResolver {
    document: ConfigDocument,
    /// `reset` 时恢复到的基础配置
    base: ConfigDocument,
    current_file: Option<String>,
    loader: Arc<dyn ConfigLoader>,
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::new(ConfigDocument::default())
    }
}

impl ConfigResolver {
    pub fn new(base: ConfigDocument) -> Self {
        Self::with_loader(base, Arc::new(FileConfigLoader))
    }

    pub fn with_loader(base: ConfigDocument, loader: Arc<dyn ConfigLoader>) -> Self {
        Self {
            document: base.clone(),
            base,
            current_file: None,
            loader,
        }
    }

    pub fn loader(&self) -> Arc<dyn ConfigLoader> {
        self.loader.clone()
    }

    /// 当前文档的副本
    pub fn snapshot(&self) -> ConfigDocument {
        self.document.clone()
    }

    pub fn base(&self) -> &ConfigDocument {
        &self.base
    }

    /// 在当前文档之上合并配置；失败时文档保持不变
    pub fn merge(&mut self, options: &Value) -> Result<()> {
        self.document = reduce(&self.document, options)?;
        Ok(())
    }

    /// 应用加载结果；任何失败都只记录警告并保留旧配置
    pub fn apply_loaded(&mut self, loaded: Result<Value>) -> bool {
        match loaded.and_then(|value| self.merge(&value)) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    target: crate::META_TARGET,
                    category = e.category(),
                    "Failed to load configuration, keeping previous config: {}",
                    e
                );
                false
            }
        }
    }

    /// 从配置源加载并合并，返回是否生效
    pub async fn load_config(&mut self, source: &ConfigSource) -> bool {
        let loaded = self.loader.load(source).await;
        self.apply_loaded(loaded)
    }

    pub fn load_config_sync(&mut self, source: &ConfigSource) -> bool {
        let loaded = self.loader.load_sync(source);
        self.apply_loaded(loaded)
    }

    /// 恢复基础配置，丢弃调用方提供的组件、覆盖与级别修改
    pub fn reset(&mut self) {
        self.document = self.base.clone();
        self.current_file = None;
    }

    /// 以 `options` 作为新的基础重新开始
    pub fn reinitialize(&mut self, options: &Value) -> Result<()> {
        let next = reduce(&self.base, options)?;
        self.document = next;
        self.current_file = None;
        Ok(())
    }

    pub fn set_current_file(&mut self, path: Option<&str>) {
        self.current_file = path.map(|p| normalize_path(p).to_string());
    }

    pub fn current_file(&self) -> Option<&str> {
        self.current_file.as_deref()
    }

    pub fn global_level(&self) -> Level {
        self.document.global_level
    }

    pub fn set_global_level(&mut self, level: Level) {
        self.document.global_level = level;
    }

    pub fn project_name(&self) -> &str {
        &self.document.project_name
    }

    pub fn buffer_size(&self) -> usize {
        self.document.buffer_size
    }

    pub fn force_environment(&self) -> Option<Environment> {
        self.document.force_environment
    }

    /// `metaLogging` 未设置时视为开启
    pub fn meta_logging_enabled(&self) -> bool {
        self.document.meta_logging != Some(false)
    }

    /// 查找命中路径的文件覆盖：先精确匹配，再按声明顺序匹配模式
    pub fn get_file_override(&self, path: &str) -> Option<OverrideConfig> {
        let path = normalize_path(path);
        let overrides = &self.document.file_overrides;
        overrides
            .iter()
            .find(|(pattern, _)| normalize_path(pattern) == path)
            .or_else(|| overrides.iter().find(|(pattern, _)| matches(path, pattern)))
            .map(|(_, config)| config.clone())
    }

    fn effective_path<'a>(&'a self, path: Option<&'a str>) -> Option<&'a str> {
        path.or(self.current_file.as_deref())
    }

    pub fn get_effective_level(&self, name: &str, path: Option<&str>) -> Level {
        if let Some(path) = self.effective_path(path) {
            if let Some(level) = self.get_file_override(path).and_then(|o| o.level) {
                return level;
            }
        }
        self.document
            .components
            .get(name)
            .and_then(|component| component.level)
            .unwrap_or(self.document.global_level)
    }

    /// 组件配置：已配置 > 内置方案 > 自动生成，然后叠加命中的文件覆盖
    pub fn get_component_config(&self, name: &str, path: Option<&str>) -> ResolvedComponent {
        let base = self
            .document
            .components
            .get(name)
            .cloned()
            .or_else(|| builtin_component(name))
            .unwrap_or_default();

        let mut resolved = ResolvedComponent {
            name: name.to_string(),
            emoji: base.emoji.unwrap_or_else(|| DEFAULT_EMOJI.to_string()),
            color: base.color.unwrap_or_else(|| DEFAULT_COLOR.to_string()),
            display_name: base
                .display_name
                .unwrap_or_else(|| format_component_name(name)),
            level: self.get_effective_level(name, path),
            enabled: base.enabled,
        };

        if let Some(file_override) = self
            .effective_path(path)
            .and_then(|p| self.get_file_override(p))
        {
            if let Some(emoji) = file_override.emoji {
                resolved.emoji = emoji;
            }
            if let Some(color) = file_override.color {
                resolved.color = color;
            }
            if let Some(display_name) = file_override.display_name {
                resolved.display_name = display_name;
            }
            if let Some(enabled) = file_override.enabled {
                resolved.enabled = enabled;
            }
        }
        resolved
    }

    /// 显示选项，命中的文件覆盖会逐项叠加
    pub fn get_display_config(&self, path: Option<&str>) -> BTreeMap<String, bool> {
        let mut display = self.document.display.clone();
        if let Some(overlay) = self
            .effective_path(path)
            .and_then(|p| self.get_file_override(p))
            .and_then(|o| o.display)
        {
            display.extend(overlay);
        }
        display
    }

    pub fn set_display_option(&mut self, option: &str, enabled: bool) {
        self.document.display.insert(option.to_string(), enabled);
    }

    pub fn timestamp_mode(&self) -> TimestampMode {
        self.document.timestamp_mode
    }

    pub fn set_timestamp_mode(&mut self, mode: TimestampMode) {
        self.document.timestamp_mode = mode;
    }

    pub fn format_timestamp(&self, epoch_millis: i64) -> String {
        format_timestamp(epoch_millis, self.document.timestamp_mode)
    }

    pub fn add_file_override(&mut self, pattern: &str, config: OverrideConfig) {
        self.document.file_overrides.upsert(pattern, config);
    }

    pub fn remove_file_override(&mut self, pattern: &str) -> bool {
        self.document.file_overrides.remove(pattern).is_some()
    }

    pub fn list_file_overrides(&self) -> Vec<(String, OverrideConfig)> {
        self.document
            .file_overrides
            .iter()
            .map(|(pattern, config)| (pattern.to_string(), config.clone()))
            .collect()
    }

    pub fn add_component(&mut self, name: &str, config: ComponentConfig) {
        self.document.components.insert(name.to_string(), config);
    }

    /// 设置单个组件的级别，未配置的组件以内置方案为基础创建
    pub fn set_component_level(&mut self, name: &str, level: Level) {
        self.document
            .components
            .entry(name.to_string())
            .or_insert_with(|| builtin_component(name).unwrap_or_default())
            .level = Some(level);
    }

    /// 已配置的组件名（不含自动创建的组件）
    pub fn component_names(&self) -> Vec<String> {
        self.document.components.keys().cloned().collect()
    }

    pub fn summary(&self) -> ConfigSummary {
        ConfigSummary {
            project_name: self.document.project_name.clone(),
            global_level: self.document.global_level,
            timestamp_mode: self.document.timestamp_mode,
            components: self.component_names(),
            file_overrides: self.document.file_overrides.patterns(),
            display: self.document.display.clone(),
            meta_logging: self.document.meta_logging,
            force_environment: self.document.force_environment,
            current_file: self.current_file.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn resolver_with(options: Value) -> ConfigResolver {
        let mut resolver = ConfigResolver::default();
        resolver.merge(&options).unwrap();
        resolver
    }

    fn scenario() -> ConfigResolver {
        resolver_with(json!({
            "globalLevel": "warn",
            "components": {"api": {"level": "debug"}},
            "fileOverrides": {"routes/admin.js": {"level": "trace"}}
        }))
    }

    #[test]
    fn test_effective_level_scenario() {
        let resolver = scenario();
        assert_eq!(resolver.get_effective_level("api", None), Level::Debug);
        assert_eq!(
            resolver.get_effective_level("api", Some("routes/admin.js")),
            Level::Trace
        );
        assert_eq!(resolver.get_effective_level("ui", None), Level::Warn);
    }

    #[test]
    fn test_current_file_is_ambient_path() {
        let mut resolver = scenario();
        resolver.set_current_file(Some("./routes/admin.js"));
        assert_eq!(resolver.get_effective_level("api", None), Level::Trace);
        assert_eq!(
            resolver.get_effective_level("api", Some("other.js")),
            Level::Debug
        );
        resolver.set_current_file(None);
        assert_eq!(resolver.get_effective_level("api", None), Level::Debug);
    }

    #[test]
    fn test_override_without_level_falls_through() {
        let resolver = resolver_with(json!({
            "globalLevel": "error",
            "components": {"api": {"level": "info"}},
            "fileOverrides": {"*.js": {"emoji": "🧪"}}
        }));
        assert_eq!(
            resolver.get_effective_level("api", Some("a.js")),
            Level::Info
        );
        assert_eq!(resolver.get_component_config("api", Some("a.js")).emoji, "🧪");
    }

    #[test]
    fn test_exact_match_beats_earlier_glob() {
        let resolver = resolver_with(json!({
            "fileOverrides": {
                "*.js": {"level": "error"},
                "src/app.js": {"level": "trace"}
            }
        }));
        assert_eq!(
            resolver.get_effective_level("x", Some("./src/app.js")),
            Level::Trace
        );
        assert_eq!(resolver.get_effective_level("x", Some("src/b.js")), Level::Error);
    }

    #[test]
    fn test_first_declared_glob_wins() {
        let resolver = resolver_with(json!({
            "fileOverrides": {
                "services/*.js": {"level": "debug"},
                "*.js": {"level": "error"}
            }
        }));
        assert_eq!(
            resolver.get_effective_level("x", Some("app/services/user.js")),
            Level::Debug
        );
    }

    #[test]
    fn test_component_config_precedence() {
        let resolver = resolver_with(json!({
            "components": {"billing": {"emoji": "💰", "color": "#00FF00"}}
        }));

        let configured = resolver.get_component_config("billing", None);
        assert_eq!(configured.emoji, "💰");
        assert_eq!(configured.display_name, "BILLING");

        let builtin = resolver.get_component_config("database", None);
        assert_eq!(builtin.emoji, "💾");

        let generated = resolver.get_component_config("myCustomComponent", None);
        assert_eq!(generated.emoji, DEFAULT_EMOJI);
        assert_eq!(generated.color, DEFAULT_COLOR);
        assert_eq!(generated.display_name, "MY-CUSTOM-COMPONENT");
        assert_eq!(generated.level, resolver.global_level());
        assert!(generated.enabled);
    }

    #[test]
    fn test_format_component_name() {
        assert_eq!(format_component_name("my_custom_component"), "MY-CUSTOM-COMPONENT");
        assert_eq!(format_component_name("myCustomComponent"), "MY-CUSTOM-COMPONENT");
        assert_eq!(format_component_name("ALREADY-UPPER"), "ALREADY-UPPER");
        assert_eq!(format_component_name("cache-manager"), "CACHE-MANAGER");
        assert_eq!(format_component_name("api2Gateway"), "API2-GATEWAY");
        assert_eq!(format_component_name(""), "");
    }

    #[test]
    fn test_format_timestamp_modes() {
        let now = 1_700_000_000_000;
        assert_eq!(format_timestamp_at(now, TimestampMode::Disable, now), "");
        assert_eq!(format_timestamp_at(now, TimestampMode::Relative, now), "now");
        assert_eq!(format_timestamp_at(now - 5_000, TimestampMode::Relative, now), "5s ago");
        assert_eq!(format_timestamp_at(now - 120_000, TimestampMode::Relative, now), "2m ago");
        assert_eq!(
            format_timestamp_at(now - 3 * 3_600_000, TimestampMode::Relative, now),
            "3h ago"
        );

        let absolute = format_timestamp_at(now, TimestampMode::Absolute, now);
        assert_eq!(absolute.len(), 12);
        assert_eq!(absolute.matches(':').count(), 2);
        assert!(absolute.contains('.'));

        let readable = format_timestamp_at(now, TimestampMode::Readable, now);
        assert!(readable.ends_with("AM") || readable.ends_with("PM"));
        assert_eq!(readable.matches(':').count(), 1);
    }

    #[test]
    fn test_format_timestamp_extreme_inputs() {
        assert_eq!(format_timestamp_at(i64::MIN, TimestampMode::Relative, 0), format!("{}h ago", i64::MAX / 1000 / 3600));
        assert_eq!(format_timestamp_at(i64::MAX, TimestampMode::Relative, i64::MIN), "now");
        assert_eq!(format_timestamp_at(i64::MIN, TimestampMode::Absolute, 0), "");
        assert_eq!(format_timestamp_at(i64::MAX, TimestampMode::Readable, 0), "");
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut resolver = scenario();
        resolver.add_file_override("*.rs", OverrideConfig::with_level(Level::Trace));
        resolver.reset();
        let once = resolver.snapshot();
        resolver.reset();
        assert_eq!(resolver.snapshot(), once);
        assert_eq!(once, ConfigDocument::default());
    }

    #[test]
    fn test_failed_load_keeps_previous_document() {
        let mut resolver = scenario();
        let before = resolver.snapshot();
        assert!(!resolver.load_config_sync(&ConfigSource::Json("{nope".into())));
        assert!(!resolver.load_config_sync(&ConfigSource::Path("/missing/cfg.json".into())));
        assert!(!resolver.load_config_sync(&ConfigSource::Document(json!({"globalLevel": "loud"}))));
        assert_eq!(resolver.snapshot(), before);
    }

    #[tokio::test]
    async fn test_async_load_merges() {
        let mut resolver = ConfigResolver::default();
        let applied = resolver
            .load_config(&ConfigSource::Toml("globalLevel = \"error\"".into()))
            .await;
        assert!(applied);
        assert_eq!(resolver.global_level(), Level::Error);
    }

    #[test]
    fn test_upserts_are_idempotent() {
        let mut resolver = ConfigResolver::default();
        resolver.add_file_override("a/*.js", OverrideConfig::with_level(Level::Debug));
        resolver.add_file_override("a/*.js", OverrideConfig::with_level(Level::Debug));
        assert_eq!(resolver.list_file_overrides().len(), 1);

        resolver.add_component("queue", ComponentConfig::with_level(Level::Trace));
        resolver.add_component("queue", ComponentConfig::with_level(Level::Trace));
        assert_eq!(
            resolver.component_names().iter().filter(|n| *n == "queue").count(),
            1
        );
        assert!(resolver.remove_file_override("a/*.js"));
        assert!(!resolver.remove_file_override("a/*.js"));
    }

    #[test]
    fn test_display_override_overlay() {
        let resolver = resolver_with(json!({
            "fileOverrides": {"*.test.js": {"display": {"emoji": false}}}
        }));
        assert_eq!(resolver.get_display_config(None).get("emoji"), Some(&true));
        assert_eq!(
            resolver.get_display_config(Some("a.test.js")).get("emoji"),
            Some(&false)
        );
    }

    #[test]
    fn test_set_component_level_uses_builtin_base() {
        let mut resolver = resolver_with(json!({"components": {"queue": {}}}));
        resolver.set_component_level("api", Level::Trace);
        let api = resolver.get_component_config("api", None);
        assert_eq!(api.level, Level::Trace);
        assert_eq!(api.emoji, "🌐");
    }

    proptest! {
        #[test]
        fn prop_file_override_wins(l1 in 0usize..6, l2 in 0usize..6, l3 in 0usize..6) {
            let (l1, l2, l3) = (Level::ALL[l1], Level::ALL[l2], Level::ALL[l3]);
            let resolver = resolver_with(json!({
                "globalLevel": l3.as_str(),
                "components": {"svc": {"level": l2.as_str()}},
                "fileOverrides": {"lib/*.js": {"level": l1.as_str()}}
            }));
            prop_assert_eq!(resolver.get_effective_level("svc", Some("src/lib/x.js")), l1);
            prop_assert_eq!(resolver.get_effective_level("svc", None), l2);
            prop_assert_eq!(resolver.get_effective_level("other", None), l3);
        }
    }
}
