//! 测试准备与生命周期编排
//!
//! 每个测试类：一次性数据初始化（可选的数据源迁移在前）；
//! 每个测试实例：收集替身、注入、记录释放动作。
//! 单例依赖的释放动作属于测试准备器，在 [`TestSetup::shutdown`] 时执行。

use crate::class::TestClass;
use crate::instance::TestInstanceScope;
use crate::resolver::ScopedResolver;
use dashmap::DashMap;
use di_abstractions::{
    DataSourceMigrator, ReplacementPlugin, ResolutionEngine, ResolveOptions, ResourceLookup,
};
use di_impl::{
    global_bridge, global_registry, ComponentRegistry, InjectionChain, RegistryEngine,
    ReplacementManager, ReplacementSet, ResourceRegistry, SessionBridge,
};
use infrastructure_common::{
    CleanupError, ConfigResult, ContainerConfig, ContainerResult, DependencyResult, Instance,
    LifecycleError, ReleaseStack, ResourceResult, Scope, ScopeLevel,
};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 测试类准备阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassPhase {
    /// 尚未准备
    Uninitialized,
    /// 正在发现资源并执行数据初始化
    DiscoveringResources,
    /// 已就绪
    Ready,
}

struct ClassState {
    class: Arc<TestClass>,
    scope: Scope,
    resources: Arc<ResourceRegistry>,
    releases: Arc<ReleaseStack>,
    setup: OnceCell<()>,
    phase: Mutex<ClassPhase>,
}

impl ClassState {
    fn new(class: &Arc<TestClass>, parent: &Scope) -> Self {
        Self {
            class: class.clone(),
            scope: parent.child(class.name(), ScopeLevel::TestClass),
            resources: Arc::new(ResourceRegistry::new(
                class.info(),
                class.provider_factories(),
            )),
            releases: Arc::new(ReleaseStack::new()),
            setup: OnceCell::new(),
            phase: Mutex::new(ClassPhase::Uninitialized),
        }
    }

    fn set_phase(&self, phase: ClassPhase) {
        *self.phase.lock() = phase;
    }
}

/// 数据初始化上下文
///
/// 提供命名资源与托管组件的访问；测试类级别不使用替身。
pub struct SetupContext<'a> {
    class: &'a TestClass,
    resolver: &'a ScopedResolver,
}

impl<'a> SetupContext<'a> {
    /// 当前测试类
    pub fn class(&self) -> &'a TestClass {
        self.class
    }

    /// 按名称解析资源
    pub fn resource(&self, name: &str) -> DependencyResult<Option<Instance>> {
        self.resolver.resource(name)
    }

    /// 解析组件
    pub fn resolve<T: ?Sized + 'static>(&self) -> DependencyResult<Option<Arc<T>>> {
        self.resolver.resolve_as::<T>()
    }
}

impl ResourceLookup for SetupContext<'_> {
    fn lookup(&self, name: &str) -> ResourceResult<Option<Instance>> {
        match &self.resolver.resources {
            Some(resources) => resources.lookup(name),
            None => Ok(None),
        }
    }
}

/// 测试准备器
pub struct TestSetup {
    config: ContainerConfig,
    registry: Arc<ComponentRegistry>,
    engine: Arc<dyn ResolutionEngine>,
    bridge: Arc<SessionBridge>,
    migrator: Option<Arc<dyn DataSourceMigrator>>,
    plugins: Vec<Arc<dyn ReplacementPlugin>>,
    classes: DashMap<Uuid, Arc<ClassState>>,
    process: Arc<ScopedResolver>,
    scope: Scope,
}

impl TestSetup {
    /// 使用进程级注册表创建，配置从 `config/test-container` 与环境变量加载
    pub fn new() -> ConfigResult<Self> {
        Self::builder().config(ContainerConfig::load()?).build()
    }

    /// 创建构建器
    pub fn builder() -> TestSetupBuilder {
        TestSetupBuilder::default()
    }

    /// 容器配置
    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// 组件注册表
    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    /// 会话式组件桥接器
    pub fn bridge(&self) -> &Arc<SessionBridge> {
        &self.bridge
    }

    /// 单例依赖尚未执行的释放动作数量
    pub fn pending_singleton_releases(&self) -> usize {
        self.process.releases.as_ref().map_or(0, |releases| releases.len())
    }

    /// 测试类当前阶段
    pub fn class_phase(&self, class: &TestClass) -> ClassPhase {
        self.classes
            .get(&class.id())
            .map_or(ClassPhase::Uninitialized, |state| *state.phase.lock())
    }

    /// 测试类的资源注册表
    pub fn class_resources(&self, class: &Arc<TestClass>) -> Arc<ResourceRegistry> {
        self.class_state(class).resources.clone()
    }

    /// 准备测试类
    ///
    /// 发现资源提供者、执行数据源迁移和数据初始化方法，只执行一次；
    /// 失败时测试类保持未就绪，之后的调用会重试。
    pub fn prepare_class(&self, class: &Arc<TestClass>) -> ContainerResult<()> {
        self.prepare_state(&self.class_state(class))
    }

    fn prepare_state(&self, state: &ClassState) -> ContainerResult<()> {
        let class = &state.class;
        state
            .setup
            .get_or_try_init(|| {
                state.set_phase(ClassPhase::DiscoveringResources);
                match self.run_class_setup(state) {
                    Ok(()) => {
                        state.set_phase(ClassPhase::Ready);
                        info!("测试类已就绪: {}", class.name());
                        Ok(())
                    }
                    Err(e) => {
                        state.set_phase(ClassPhase::Uninitialized);
                        error!("测试类准备失败: {}, 原因: {}", class.name(), e);
                        Err(e)
                    }
                }
            })
            .map(|_| ())
    }

    /// 准备测试实例
    ///
    /// 成功时返回完成注入的作用域；失败时已记录的释放动作会先执行完毕再返回错误。
    /// 准备期间测试类被结束时重新准备；注入期间被结束时，已关闭的资源注册表
    /// 使注入失败而不是重新创建提供者。
    pub fn prepare_test_instance(
        &self,
        id: impl Into<String>,
        class: &Arc<TestClass>,
        test_instance: Instance,
    ) -> ContainerResult<TestInstanceScope> {
        let id = id.into();
        let state = loop {
            let state = self.class_state(class);
            self.prepare_state(&state)?;
            if self.is_current(class, &state) {
                break state;
            }
            debug!("测试类 {} 在准备期间已结束，重新准备", class.name());
        };

        let releases = Arc::new(ReleaseStack::new());

        match self.assemble(&id, &state, &test_instance, &releases) {
            Ok(resolver) => Ok(TestInstanceScope::new(
                id.clone(),
                state.scope.child(&id, ScopeLevel::TestInstance),
                class.clone(),
                test_instance,
                resolver,
                releases,
            )),
            Err(e) => {
                warn!("测试实例准备失败: {}, 原因: {}", id, e);
                if let Err(cleanup) = releases.drain() {
                    warn!("测试实例 {} 回滚释放失败: {}", id, cleanup);
                }
                Err(e)
            }
        }
    }

    /// 结束测试类：释放类级动作并清理资源提供者
    ///
    /// 之后再次准备该测试类会重新执行数据初始化。
    pub fn finish_class(&self, class: &TestClass) -> Result<(), CleanupError> {
        match self.classes.remove(&class.id()) {
            Some((_, state)) => Self::release_class(&state),
            None => Ok(()),
        }
    }

    /// 释放所有测试类的资源，之后执行单例依赖的释放动作
    pub fn shutdown(&self) -> Result<(), CleanupError> {
        let ids: Vec<Uuid> = self.classes.iter().map(|entry| *entry.key()).collect();
        info!("关闭测试准备器: {} 个测试类", ids.len());

        let classes = CleanupError::merge(ids.into_iter().map(|id| match self.classes.remove(&id) {
            Some((_, state)) => Self::release_class(&state),
            None => Ok(()),
        }));
        let singletons = match &self.process.releases {
            Some(releases) => releases.drain(),
            None => Ok(()),
        };
        CleanupError::merge([classes, singletons])
    }

    fn release_class(state: &ClassState) -> Result<(), CleanupError> {
        debug!("释放测试类: {}", state.class.name());
        let class_releases = state.releases.drain();
        let resources = state.resources.close();
        state.set_phase(ClassPhase::Uninitialized);
        CleanupError::merge([class_releases, resources])
    }

    fn class_state(&self, class: &Arc<TestClass>) -> Arc<ClassState> {
        self.classes
            .entry(class.id())
            .or_insert_with(|| Arc::new(ClassState::new(class, &self.scope)))
            .clone()
    }

    fn is_current(&self, class: &TestClass, state: &Arc<ClassState>) -> bool {
        self.classes
            .get(&class.id())
            .is_some_and(|current| Arc::ptr_eq(current.value(), state))
    }

    fn run_class_setup(&self, state: &ClassState) -> ContainerResult<()> {
        let class: &TestClass = &state.class;
        let setups = class.collect_data_setups()?;

        debug!("发现测试类资源提供者: {}", class.name());
        state.resources.initialize()?;

        let resolver = self.resolver(
            state,
            ReplacementManager::default(),
            state.releases.clone(),
        );
        let ctx = SetupContext {
            class,
            resolver: &resolver,
        };

        if let Some(migrator) = &self.migrator {
            info!("执行数据源迁移: {}", class.name());
            migrator
                .migrate(&class.info(), &ctx)
                .map_err(|source| LifecycleError::MigrationFailed {
                    class: class.name().to_string(),
                    source,
                })?;
        }

        for setup in setups {
            info!("执行数据初始化: {}.{}", setup.class, setup.name);
            (setup.run)(&ctx).map_err(|source| LifecycleError::SetupFailed {
                class: setup.class.clone(),
                step: setup.name.clone(),
                source,
            })?;
        }
        Ok(())
    }

    fn assemble(
        &self,
        id: &str,
        state: &ClassState,
        test_instance: &Instance,
        releases: &Arc<ReleaseStack>,
    ) -> ContainerResult<ScopedResolver> {
        let mut replacements = Vec::new();
        for plugin in &self.plugins {
            let provided = plugin.replacements(id, test_instance).map_err(|source| {
                LifecycleError::PluginFailed {
                    plugin: plugin.name().to_string(),
                    source,
                }
            })?;
            replacements.extend(provided);
        }
        if !replacements.is_empty() {
            debug!("测试实例 {} 使用 {} 个替身", id, replacements.len());
        }

        let manager = ReplacementManager::new(Arc::new(ReplacementSet::new(replacements)));
        let resolver = self.resolver(state, manager, releases.clone());
        resolver.inject(test_instance)?;
        Ok(resolver)
    }

    fn resolver(
        &self,
        state: &ClassState,
        replacements: ReplacementManager,
        releases: Arc<ReleaseStack>,
    ) -> ScopedResolver {
        ScopedResolver {
            registry: self.registry.clone(),
            engine: self.engine.clone(),
            bridge: self.bridge.clone(),
            resources: Some(state.resources.clone()),
            replacements,
            chain: InjectionChain::standard(self.engine.clone()),
            releases: Some(releases),
            options: ResolveOptions::from(&self.config),
            singletons: Some(self.process.clone()),
        }
    }
}

impl std::fmt::Debug for TestSetup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestSetup")
            .field("engine", &self.engine.name())
            .field("bridge", &self.bridge)
            .field("plugins", &self.plugins.len())
            .field("classes", &self.classes.len())
            .field("singleton_releases", &self.pending_singleton_releases())
            .finish()
    }
}

/// 测试准备器构建器
#[derive(Default)]
pub struct TestSetupBuilder {
    config: Option<ContainerConfig>,
    registry: Option<Arc<ComponentRegistry>>,
    engine: Option<Arc<dyn ResolutionEngine>>,
    bridge: Option<Arc<SessionBridge>>,
    migrator: Option<Arc<dyn DataSourceMigrator>>,
    plugins: Vec<Arc<dyn ReplacementPlugin>>,
}

impl TestSetupBuilder {
    /// 设置容器配置
    pub fn config(mut self, config: ContainerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// 使用指定的组件注册表（默认为进程级注册表）
    pub fn registry(mut self, registry: Arc<ComponentRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// 使用自定义解析引擎
    pub fn engine(mut self, engine: Arc<dyn ResolutionEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// 共享已有的会话式组件桥接器
    pub fn bridge(mut self, bridge: Arc<SessionBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// 设置数据源迁移器
    pub fn migrator(mut self, migrator: impl DataSourceMigrator + 'static) -> Self {
        self.migrator = Some(Arc::new(migrator));
        self
    }

    /// 添加替换插件
    pub fn plugin(mut self, plugin: impl ReplacementPlugin + 'static) -> Self {
        self.plugins.push(Arc::new(plugin));
        self
    }

    /// 校验配置并创建测试准备器
    ///
    /// 只指定注册表时创建独占的桥接器，单例依赖的释放动作随 [`TestSetup::shutdown`] 执行；
    /// 共享的桥接器上的单例随进程存在，其依赖不记录释放动作。
    pub fn build(self) -> ConfigResult<TestSetup> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let (registry, bridge, owns_bridge) = match (self.registry, self.bridge) {
            (Some(registry), Some(bridge)) => (registry, bridge, false),
            (Some(registry), None) => {
                let bridge = Arc::new(SessionBridge::new(&registry));
                (registry, bridge, true)
            }
            (None, bridge) => (
                global_registry(),
                bridge.unwrap_or_else(global_bridge),
                false,
            ),
        };
        let engine = self
            .engine
            .unwrap_or_else(|| Arc::new(RegistryEngine::new(registry.clone())));

        info!(
            "测试准备器初始化完成: 引擎 {}, {} 个组件类, {} 个会话组件",
            engine.name(),
            registry.component_classes().len(),
            registry.session_descriptors().len()
        );

        let process = Arc::new(ScopedResolver {
            registry: registry.clone(),
            engine: engine.clone(),
            bridge: bridge.clone(),
            resources: None,
            replacements: ReplacementManager::default(),
            chain: InjectionChain::standard(engine.clone()),
            releases: owns_bridge.then(|| Arc::new(ReleaseStack::new())),
            options: ResolveOptions::from(&config),
            singletons: None,
        });

        Ok(TestSetup {
            config,
            registry,
            engine,
            bridge,
            migrator: self.migrator,
            plugins: self.plugins,
            classes: DashMap::new(),
            process,
            scope: Scope::new("test-setup", ScopeLevel::Process),
        })
    }
}
