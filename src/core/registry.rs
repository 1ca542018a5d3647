//! 组件注册表
//!
//! 按需创建并缓存组件句柄。每个名称同时可以通过其驼峰形式访问（连字符/下划线
//! 名称获得驼峰别名，反之不成立），两者指向同一个句柄。
//!
//! 重建时列表收缩为已配置的组件集合。被移出列表的句柄仍会随配置刷新，
//! 同名组件再次被请求时沿用原句柄，调用方持有的引用不会失效。
//!
//! 订阅者回调不在注册表内部执行：变更操作返回 [`Notification`]，
//! 由调用方在释放锁之后调用 [`Notification::deliver`]。

use crate::core::buffer::SubscriptionId;
use crate::core::handle::{HandleSnapshot, LoggerHandle};
use std::collections::HashMap;
use std::sync::Arc;

/// 组件列表变更回调，参数为完整的组件名列表
pub type ComponentCallback = Arc<dyn Fn(&[String]) + Send + Sync>;

/// `get_or_create` 的结果，`created` 驱动订阅通知
#[derive(Debug, Clone)]
pub struct GetOrCreate {
    pub handle: Arc<LoggerHandle>,
    pub created: bool,
}

/// 待投递的组件列表通知
#[must_use]
pub struct Notification {
    names: Vec<String>,
    callbacks: Vec<ComponentCallback>,
}

impl Notification {
    fn empty() -> Self {
        Self {
            names: Vec::new(),
            callbacks: Vec::new(),
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// 按订阅顺序同步调用回调
    pub fn deliver(self) {
        for callback in &self.callbacks {
            callback(&self.names);
        }
    }
}

/// 连字符或下划线名称的驼峰形式
pub fn to_camel_case(name: &str) -> String {
    let mut camel = String::with_capacity(name.len());
    let mut upper_next = false;
    for ch in name.chars() {
        if ch == '-' || ch == '_' {
            upper_next = !camel.is_empty();
            continue;
        }
        if upper_next {
            camel.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            camel.push(ch);
        }
    }
    camel
}

/// 组件注册表
#[derive(Default)]
pub struct ComponentRegistry {
    handles: HashMap<String, Arc<LoggerHandle>>,
    aliases: HashMap<String, String>,
    order: Vec<String>,
    /// 重建时移出列表的句柄
    detached: HashMap<String, Arc<LoggerHandle>>,
    subscribers: Vec<(SubscriptionId, ComponentCallback)>,
    next_id: SubscriptionId,
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("components", &self.order)
            .field("aliases", &self.aliases)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 查找已存在的句柄（含别名）
    pub fn get(&self, name: &str) -> Option<Arc<LoggerHandle>> {
        self.handles.get(name).cloned().or_else(|| {
            self.aliases
                .get(name)
                .and_then(|canonical| self.handles.get(canonical))
                .cloned()
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// 获取或创建句柄；`build` 只在名称未知时调用
    pub fn get_or_create<F>(&mut self, name: &str, build: F) -> GetOrCreate
    where
        F: FnOnce(&str) -> LoggerHandle,
    {
        if let Some(handle) = self.get(name) {
            return GetOrCreate {
                handle,
                created: false,
            };
        }

        let handle = match self.detached.remove(name) {
            Some(handle) => handle,
            None => Arc::new(build(name)),
        };
        self.register(name, handle.clone());

        GetOrCreate {
            handle,
            created: true,
        }
    }

    fn register(&mut self, name: &str, handle: Arc<LoggerHandle>) {
        self.handles.insert(name.to_string(), handle);
        self.order.push(name.to_string());

        let alias = to_camel_case(name);
        if alias != name && !self.handles.contains_key(&alias) && !self.aliases.contains_key(&alias)
        {
            self.aliases.insert(alias, name.to_string());
        }
    }

    /// 按创建顺序列出组件名（不含别名）
    pub fn list(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// 注册订阅者，返回的通知只包含该订阅者，用于立即回放当前列表
    pub fn subscribe(&mut self, callback: ComponentCallback) -> (SubscriptionId, Notification) {
        self.next_id += 1;
        let id = self.next_id;
        self.subscribers.push((id, callback.clone()));
        let replay = Notification {
            names: self.list(),
            callbacks: vec![callback],
        };
        (id, replay)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(existing, _)| *existing != id);
        self.subscribers.len() != before
    }

    /// 面向全部订阅者的通知
    pub fn notification(&self) -> Notification {
        if self.subscribers.is_empty() {
            return Notification::empty();
        }
        Notification {
            names: self.list(),
            callbacks: self.subscribers.iter().map(|(_, cb)| cb.clone()).collect(),
        }
    }

    /// 重新推导每个句柄的缓存状态
    pub fn refresh<F>(&self, mut resolve: F)
    where
        F: FnMut(&str) -> HandleSnapshot,
    {
        for name in &self.order {
            if let Some(handle) = self.handles.get(name) {
                handle.refresh(resolve(name));
            }
        }
        for (name, handle) in &self.detached {
            handle.refresh(resolve(name));
        }
    }

    /// 按新的组件集合重建：列表恰好等于 `configured`。
    /// 保留下来的名称沿用原句柄并原地刷新，其余句柄移出列表
    pub fn rebuild<R, B>(&mut self, configured: &[String], resolve: R, mut build: B) -> Notification
    where
        R: FnMut(&str) -> HandleSnapshot,
        B: FnMut(&str) -> LoggerHandle,
    {
        let previous = std::mem::take(&mut self.handles);
        self.detached.extend(previous);
        self.aliases.clear();
        self.order.clear();

        for name in configured {
            let _ = self.get_or_create(name, &mut build);
        }
        self.refresh(resolve);
        self.notification()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::buffer::LogRingBuffer;
    use crate::core::emitter::NoopEmitter;
    use crate::core::resolver::ConfigResolver;
    use std::sync::Mutex;

    fn builder(resolver: &ConfigResolver) -> impl FnMut(&str) -> LoggerHandle + '_ {
        let buffer = Arc::new(LogRingBuffer::new(8));
        move |name: &str| {
            LoggerHandle::new(
                name,
                HandleSnapshot::resolve(resolver, name, None),
                Arc::new(NoopEmitter),
                buffer.clone(),
            )
        }
    }

    #[test]
    fn test_to_camel_case() {
        assert_eq!(to_camel_case("cache-manager"), "cacheManager");
        assert_eq!(to_camel_case("my_custom_component"), "myCustomComponent");
        assert_eq!(to_camel_case("api"), "api");
        assert_eq!(to_camel_case("-leading"), "leading");
    }

    #[test]
    fn test_get_or_create_reports_creation() {
        let resolver = ConfigResolver::default();
        let mut registry = ComponentRegistry::new();
        let first = registry.get_or_create("payments", builder(&resolver));
        let second = registry.get_or_create("payments", builder(&resolver));
        assert!(first.created);
        assert!(!second.created);
        assert!(Arc::ptr_eq(&first.handle, &second.handle));
        assert_eq!(registry.list(), vec!["payments"]);
    }

    #[test]
    fn test_alias_resolves_to_same_handle() {
        let resolver = ConfigResolver::default();
        let mut registry = ComponentRegistry::new();
        let hyphen = registry.get_or_create("cache-manager", builder(&resolver));
        let camel = registry.get_or_create("cacheManager", builder(&resolver));
        assert!(!camel.created);
        assert!(Arc::ptr_eq(&hyphen.handle, &camel.handle));
        assert_eq!(registry.list(), vec!["cache-manager"]);
    }

    #[test]
    fn test_camel_name_gets_no_hyphen_alias() {
        let resolver = ConfigResolver::default();
        let mut registry = ComponentRegistry::new();
        registry.get_or_create("cacheManager", builder(&resolver));
        assert!(!registry.contains("cache-manager"));
        let created = registry.get_or_create("cache-manager", builder(&resolver));
        assert!(created.created);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_subscribe_replays_current_list() {
        let resolver = ConfigResolver::default();
        let mut registry = ComponentRegistry::new();
        registry.get_or_create("a", builder(&resolver));
        registry.get_or_create("b", builder(&resolver));

        let seen: Arc<Mutex<Vec<Vec<String>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let (_, replay) = registry.subscribe(Arc::new(move |names: &[String]| {
            sink.lock().unwrap().push(names.to_vec());
        }));
        replay.deliver();

        let created = registry.get_or_create("c", builder(&resolver));
        assert!(created.created);
        registry.notification().deliver();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], vec!["a", "b"]);
        assert_eq!(seen[1], vec!["a", "b", "c"]);
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let mut registry = ComponentRegistry::new();
        let (id, replay) = registry.subscribe(Arc::new(|_: &[String]| {}));
        replay.deliver();
        assert_eq!(registry.notification().callbacks.len(), 1);
        assert!(registry.unsubscribe(id));
        assert!(registry.notification().callbacks.is_empty());
    }

    #[test]
    fn test_rebuild_refreshes_existing_handles_in_place() {
        let mut resolver = ConfigResolver::default();
        let mut registry = ComponentRegistry::new();
        let held = registry.get_or_create("api", builder(&resolver)).handle;
        assert_eq!(held.level(), crate::config::Level::Info);

        resolver.set_component_level("api", crate::config::Level::Error);
        resolver.add_component("billing", Default::default());
        let configured = resolver.component_names();
        let buffer = Arc::new(LogRingBuffer::new(8));
        let notification = registry.rebuild(
            &configured,
            |name| HandleSnapshot::resolve(&resolver, name, None),
            |name| {
                LoggerHandle::new(
                    name,
                    HandleSnapshot::resolve(&resolver, name, None),
                    Arc::new(NoopEmitter),
                    buffer.clone(),
                )
            },
        );
        notification.deliver();

        assert_eq!(held.level(), crate::config::Level::Error);
        assert!(Arc::ptr_eq(&held, &registry.get("api").unwrap()));
        assert!(registry.contains("billing"));
    }

    #[test]
    fn test_rebuild_shrinks_to_configured_set() {
        let mut resolver = ConfigResolver::default();
        resolver
            .merge(&serde_json::json!({"components": {"api": {}, "job-runner": {}}}))
            .unwrap();
        let mut registry = ComponentRegistry::new();
        for name in resolver.component_names() {
            registry.get_or_create(&name, builder(&resolver));
        }
        let held = registry.get("jobRunner").unwrap();

        let seen: Arc<Mutex<Vec<Vec<String>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let (_, replay) = registry.subscribe(Arc::new(move |names: &[String]| {
            sink.lock().unwrap().push(names.to_vec());
        }));
        replay.deliver();

        resolver
            .merge(&serde_json::json!({"components": {"queue": {"level": "error"}}}))
            .unwrap();
        let configured = resolver.component_names();
        let buffer = Arc::new(LogRingBuffer::new(8));
        registry
            .rebuild(
                &configured,
                |name| HandleSnapshot::resolve(&resolver, name, None),
                |name| {
                    LoggerHandle::new(
                        name,
                        HandleSnapshot::resolve(&resolver, name, None),
                        Arc::new(NoopEmitter),
                        buffer.clone(),
                    )
                },
            )
            .deliver();

        assert_eq!(registry.list(), vec!["queue"]);
        assert!(!registry.contains("api"));
        assert!(!registry.contains("jobRunner"));
        assert_eq!(registry.get("queue").unwrap().level(), crate::config::Level::Error);
        assert_eq!(seen.lock().unwrap().last().unwrap(), &vec!["queue".to_string()]);

        // 再次请求被移出的组件时沿用原句柄
        let again = registry.get_or_create("job-runner", builder(&resolver));
        assert!(again.created);
        assert!(Arc::ptr_eq(&held, &again.handle));
        assert_eq!(registry.list(), vec!["queue", "job-runner"]);
    }
}
