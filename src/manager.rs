//! 单例生命周期管理
//!
//! 进程内所有调用点通过同一个 [`SharedSlot`] 汇合：槽位中已有实例且没有新选项时
//! 直接返回该实例；带选项时在原实例上完整重置并合并选项，然后重新发布。
//!
//! 首次初始化由 `init_lock` 串行化。配置加载是唯一的挂起点，输掉竞争的调用方
//! 在锁上等待，拿到锁后会看到已经发布的实例，因此 "initialized" 元日志只会输出一次。
//! 重新初始化过程（重置、合并、重建注册表）没有挂起点，不会交错。

use crate::config::{ConfigDocument, ConfigLoader, ConfigSource, FileConfigLoader, reduce};
use crate::controls::LoggerControls;
use crate::config::Level;
use crate::core::args::{LogArg, LogArgs};
use crate::core::buffer::{LogRingBuffer, SubscriptionId};
use crate::core::emitter::{emitter_for, LogEmitter, LogRecord, NoopEmitter};
use crate::core::handle::{HandleSnapshot, LoggerHandle};
use crate::core::registry::{ComponentCallback, ComponentRegistry, Notification};
use crate::core::resolver::ConfigResolver;
use crate::env_config::EnvConfig;
use crate::error::Result;
use crate::META_TARGET;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// 生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Initializing,
    Ready,
}

type PublishedInstance = Arc<RwLock<Option<Arc<LoggerManager>>>>;

/// 进程级共享槽位
///
/// 保存已发布的实例、对应的控制接口、初始化日志标记与初始化锁。
pub struct SharedSlot {
    instance: PublishedInstance,
    controls: RwLock<Option<Arc<LoggerControls>>>,
    state: Mutex<LifecycleState>,
    has_logged_init: AtomicBool,
    init_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for SharedSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSlot")
            .field("state", &self.state())
            .field("has_logged_init", &self.has_logged_init())
            .finish()
    }
}

impl Default for SharedSlot {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_SLOT: Lazy<SharedSlot> = Lazy::new(SharedSlot::new);

/// 进程全局槽位
pub fn global_slot() -> &'static SharedSlot {
    &GLOBAL_SLOT
}

impl SharedSlot {
    pub fn new() -> Self {
        Self {
            instance: Arc::new(RwLock::new(None)),
            controls: RwLock::new(None),
            state: Mutex::new(LifecycleState::Uninitialized),
            has_logged_init: AtomicBool::new(false),
            init_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// 当前发布的实例
    pub fn instance(&self) -> Option<Arc<LoggerManager>> {
        self.instance
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// 当前发布实例的控制接口
    pub fn controls(&self) -> Option<Arc<LoggerControls>> {
        self.controls
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn has_logged_init(&self) -> bool {
        self.has_logged_init.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: LifecycleState) {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
    }

    /// 发布实例；同一实例重复发布时保留已有的控制接口
    pub fn publish(&self, manager: Arc<LoggerManager>) {
        let mut instance = self
            .instance
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut controls = self
            .controls
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let same = instance
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &manager));
        if !same || controls.is_none() {
            *controls = Some(Arc::new(LoggerControls::new(manager.clone())));
        }
        *instance = Some(manager);
        drop(controls);
        drop(instance);
        self.set_state(LifecycleState::Ready);
    }

    /// 输出一次性的初始化元日志
    fn log_init_once(&self, manager: &LoggerManager) {
        if self
            .has_logged_init
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        if !manager.meta_logging_enabled() {
            return;
        }
        let summary = manager.with_resolver(|resolver| resolver.summary());
        tracing::info!(
            target: META_TARGET,
            project = %summary.project_name,
            global_level = %summary.global_level,
            components = summary.components.len(),
            emitter = manager.emitter_name(),
            "initialized"
        );
    }

    fn fail_initialization(&self, error: &crate::error::ComponentLogError) -> Arc<LoggerManager> {
        self.set_state(LifecycleState::Uninitialized);
        tracing::warn!(
            target: META_TARGET,
            category = error.category(),
            "Logger initialization failed, using no-op fallback: {}",
            error
        );
        Arc::new(LoggerManager::fallback())
    }
}

/// 初始化进行中交出的句柄所用的输出
///
/// 每条记录在输出时查找槽位中已发布的实例，并交给同名的真实句柄过滤和输出。
/// 实例发布之前的记录被丢弃。
#[derive(Debug)]
struct DeferredEmitter {
    instance: PublishedInstance,
}

impl LogEmitter for DeferredEmitter {
    fn emit(&self, record: &LogRecord) {
        let published = self
            .instance
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        let Some(manager) = published else {
            return;
        };
        let args = LogArgs(vec![
            LogArg::Message(record.message.clone()),
            LogArg::Context(record.context.clone()),
        ]);
        manager.get_component(&record.component).log(record.level, args);
    }

    fn name(&self) -> &'static str {
        "deferred"
    }
}

/// 日志管理器：持有解析器、注册表、环形缓冲区与底层输出
pub struct LoggerManager {
    resolver: RwLock<ConfigResolver>,
    registry: Mutex<ComponentRegistry>,
    buffer: Arc<LogRingBuffer>,
    emitter: Arc<dyn LogEmitter>,
    fallback: bool,
}

impl std::fmt::Debug for LoggerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggerManager")
            .field("emitter", &self.emitter.name())
            .field("fallback", &self.fallback)
            .field("buffer", &self.buffer)
            .finish()
    }
}

/// 环境变量与配置文件叠加到默认配置之上，作为 `reset` 的目标
fn base_document(env: &EnvConfig, file: Option<Result<Value>>) -> ConfigDocument {
    let defaults = ConfigDocument::default();
    let mut base = if env.is_empty() {
        defaults
    } else {
        tracing::debug!(target: META_TARGET, overrides = ?env, "Applying environment overrides");
        match reduce(&defaults, &env.overlay()) {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!(target: META_TARGET, "Ignoring environment overrides: {}", e);
                defaults
            }
        }
    };
    if let Some(loaded) = file {
        match loaded.and_then(|value| reduce(&base, &value)) {
            Ok(document) => base = document,
            Err(e) => {
                tracing::warn!(
                    target: META_TARGET,
                    category = e.category(),
                    "Failed to load configuration file, using defaults: {}",
                    e
                );
            }
        }
    }
    base
}

impl LoggerManager {
    /// 异步构建：加载配置文件与调用方选项
    pub async fn build(
        loader: Arc<dyn ConfigLoader>,
        env: &EnvConfig,
        options: Option<&ConfigSource>,
    ) -> Result<Self> {
        let file = match &env.config_path {
            Some(path) => Some(loader.load(&ConfigSource::Path(path.clone())).await),
            None => None,
        };
        let options = match options {
            Some(source) => Some(loader.load(source).await),
            None => None,
        };
        Self::assemble(loader, env, file, options)
    }

    /// 同步构建
    pub fn build_sync(
        loader: Arc<dyn ConfigLoader>,
        env: &EnvConfig,
        options: Option<&ConfigSource>,
    ) -> Result<Self> {
        let file = env
            .config_path
            .as_ref()
            .map(|path| loader.load_sync(&ConfigSource::Path(path.clone())));
        let options = options.map(|source| loader.load_sync(source));
        Self::assemble(loader, env, file, options)
    }

    fn assemble(
        loader: Arc<dyn ConfigLoader>,
        env: &EnvConfig,
        file: Option<Result<Value>>,
        options: Option<Result<Value>>,
    ) -> Result<Self> {
        let mut resolver = ConfigResolver::with_loader(base_document(env, file), loader);
        if let Some(loaded) = options {
            resolver.apply_loaded(loaded);
        }

        let emitter = emitter_for(resolver.force_environment())?;
        let buffer = Arc::new(LogRingBuffer::new(resolver.buffer_size()));

        let mut registry = ComponentRegistry::new();
        for name in resolver.component_names() {
            let _ = registry.get_or_create(&name, |name| {
                LoggerHandle::new(
                    name,
                    HandleSnapshot::resolve(&resolver, name, None),
                    emitter.clone(),
                    buffer.clone(),
                )
            });
        }

        Ok(Self {
            resolver: RwLock::new(resolver),
            registry: Mutex::new(registry),
            buffer,
            emitter,
            fallback: false,
        })
    }

    /// 最小的无输出管理器，接口完整但什么都不打印
    pub fn fallback() -> Self {
        let resolver = ConfigResolver::default();
        let buffer = Arc::new(LogRingBuffer::new(resolver.buffer_size()));
        Self {
            resolver: RwLock::new(resolver),
            registry: Mutex::new(ComponentRegistry::new()),
            buffer,
            emitter: Arc::new(NoopEmitter),
            fallback: true,
        }
    }

    /// 未发布的转发管理器：句柄不做过滤，输出时转交给槽位中已发布的实例
    fn deferred(instance: PublishedInstance) -> Self {
        let mut resolver = ConfigResolver::default();
        resolver.set_global_level(Level::Trace);
        for name in resolver.component_names() {
            resolver.set_component_level(&name, Level::Trace);
        }
        let buffer = Arc::new(LogRingBuffer::new(resolver.buffer_size()));
        Self {
            resolver: RwLock::new(resolver),
            registry: Mutex::new(ComponentRegistry::new()),
            buffer,
            emitter: Arc::new(DeferredEmitter { instance }),
            fallback: true,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    pub fn emitter_name(&self) -> &'static str {
        self.emitter.name()
    }

    pub fn buffer(&self) -> &Arc<LogRingBuffer> {
        &self.buffer
    }

    pub fn meta_logging_enabled(&self) -> bool {
        self.with_resolver(ConfigResolver::meta_logging_enabled)
    }

    fn read_resolver(&self) -> RwLockReadGuard<'_, ConfigResolver> {
        self.resolver
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_resolver(&self) -> RwLockWriteGuard<'_, ConfigResolver> {
        self.resolver
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn registry(&self) -> MutexGuard<'_, ComponentRegistry> {
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn handle_builder<'a>(&'a self, resolver: &'a ConfigResolver) -> impl FnMut(&str) -> LoggerHandle + 'a {
        move |name: &str| {
            LoggerHandle::new(
                name,
                HandleSnapshot::resolve(resolver, name, None),
                self.emitter.clone(),
                self.buffer.clone(),
            )
        }
    }

    /// 只读访问解析器
    pub fn with_resolver<T>(&self, f: impl FnOnce(&ConfigResolver) -> T) -> T {
        f(&self.read_resolver())
    }

    /// 修改解析器，然后刷新所有句柄的缓存
    pub fn update_resolver<T>(&self, f: impl FnOnce(&mut ConfigResolver) -> T) -> T {
        let result = f(&mut self.write_resolver());
        self.refresh();
        result
    }

    /// 按当前配置重新推导所有句柄
    pub fn refresh(&self) {
        let resolver = self.read_resolver();
        self.registry()
            .refresh(|name| HandleSnapshot::resolve(&resolver, name, None));
    }

    /// 获取组件句柄，未知名称按需创建
    pub fn get_component(&self, name: &str) -> Arc<LoggerHandle> {
        let (handle, notification) = {
            let resolver = self.read_resolver();
            let mut registry = self.registry();
            let outcome = registry.get_or_create(name, self.handle_builder(&resolver));
            let notification = outcome.created.then(|| registry.notification());
            (outcome.handle, notification)
        };
        if let Some(notification) = notification {
            notification.deliver();
        }
        handle
    }

    pub fn list_components(&self) -> Vec<String> {
        self.registry().list()
    }

    pub fn subscribe_to_components(&self, callback: ComponentCallback) -> SubscriptionId {
        let (id, replay) = self.registry().subscribe(callback);
        replay.deliver();
        id
    }

    pub fn unsubscribe_from_components(&self, id: SubscriptionId) -> bool {
        self.registry().unsubscribe(id)
    }

    fn rebuild(&self) -> Notification {
        let resolver = self.read_resolver();
        let configured = resolver.component_names();
        let mut registry = self.registry();
        registry.rebuild(
            &configured,
            |name| HandleSnapshot::resolve(&resolver, name, None),
            self.handle_builder(&resolver),
        )
    }

    /// 完整重新初始化：恢复基础配置，合并 `options`，重建注册表并通知订阅者。
    /// 合并失败时配置保持不变。
    pub fn reinitialize(&self, options: &Value) -> Result<()> {
        self.write_resolver().reinitialize(options)?;
        self.rebuild().deliver();
        tracing::debug!(target: META_TARGET, "reinitialized");
        Ok(())
    }

    async fn reinitialize_from(&self, source: &ConfigSource) {
        let loader = self.with_resolver(ConfigResolver::loader);
        let loaded = loader.load(source).await;
        self.apply_reinitialization(loaded);
    }

    fn reinitialize_from_sync(&self, source: &ConfigSource) {
        let loader = self.with_resolver(ConfigResolver::loader);
        self.apply_reinitialization(loader.load_sync(source));
    }

    fn apply_reinitialization(&self, loaded: Result<Value>) {
        if let Err(e) = loaded.and_then(|value| self.reinitialize(&value)) {
            tracing::warn!(
                target: META_TARGET,
                category = e.category(),
                "Reinitialization failed, keeping previous config: {}",
                e
            );
        }
    }

    /// 恢复基础配置并重建所有句柄
    pub fn reset(&self) {
        self.write_resolver().reset();
        self.rebuild().deliver();
    }

    /// 控制接口
    pub fn controls(self: &Arc<Self>) -> LoggerControls {
        LoggerControls::new(self.clone())
    }
}

fn non_empty(options: Option<ConfigSource>) -> Option<ConfigSource> {
    options.filter(|source| !source.is_empty())
}

/// 在指定槽位上获取实例，使用默认加载器
pub async fn get_instance_in(slot: &SharedSlot, options: Option<ConfigSource>) -> Arc<LoggerManager> {
    get_instance_with_loader(slot, Arc::new(FileConfigLoader), options).await
}

/// 在指定槽位上获取实例
///
/// 任何初始化失败都退化为未发布的 no-op 管理器，不会向调用方返回错误。
pub async fn get_instance_with_loader(
    slot: &SharedSlot,
    loader: Arc<dyn ConfigLoader>,
    options: Option<ConfigSource>,
) -> Arc<LoggerManager> {
    let options = non_empty(options);

    if let Some(instance) = slot.instance() {
        if let Some(source) = &options {
            instance.reinitialize_from(source).await;
            slot.publish(instance.clone());
        }
        return instance;
    }

    let _guard = slot.init_lock.lock().await;

    if let Some(instance) = slot.instance() {
        if let Some(source) = &options {
            instance.reinitialize_from(source).await;
            slot.publish(instance.clone());
        }
        return instance;
    }

    slot.set_state(LifecycleState::Initializing);
    let env = EnvConfig::from_env();
    match LoggerManager::build(loader, &env, options.as_ref()).await {
        Ok(manager) => {
            let manager = Arc::new(manager);
            slot.publish(manager.clone());
            slot.log_init_once(&manager);
            manager
        }
        Err(e) => slot.fail_initialization(&e),
    }
}

/// 同步获取实例
///
/// 若另一个调用方正在异步初始化，不会阻塞等待，而是返回未发布的转发管理器：
/// 从它取得的句柄在实例发布后把日志交给真实实例，发布前的日志被丢弃。
pub fn get_instance_sync_in(slot: &SharedSlot, options: Option<ConfigSource>) -> Arc<LoggerManager> {
    let options = non_empty(options);

    if let Some(instance) = slot.instance() {
        if let Some(source) = &options {
            instance.reinitialize_from_sync(source);
            slot.publish(instance.clone());
        }
        return instance;
    }

    let Ok(_guard) = slot.init_lock.try_lock() else {
        tracing::warn!(
            target: META_TARGET,
            "Initialization already in progress, returning deferred fallback"
        );
        return Arc::new(LoggerManager::deferred(slot.instance.clone()));
    };

    if let Some(instance) = slot.instance() {
        if let Some(source) = &options {
            instance.reinitialize_from_sync(source);
            slot.publish(instance.clone());
        }
        return instance;
    }

    slot.set_state(LifecycleState::Initializing);
    let env = EnvConfig::from_env();
    match LoggerManager::build_sync(Arc::new(FileConfigLoader), &env, options.as_ref()) {
        Ok(manager) => {
            let manager = Arc::new(manager);
            slot.publish(manager.clone());
            slot.log_init_once(&manager);
            manager
        }
        Err(e) => slot.fail_initialization(&e),
    }
}
