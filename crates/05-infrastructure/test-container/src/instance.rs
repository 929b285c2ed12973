//! 测试实例作用域

use crate::class::TestClass;
use crate::resolver::ScopedResolver;
use di_impl::ReplacementSet;
use infrastructure_common::{
    CleanupError, DependencyError, DependencyResult, InstanceState, Instance, ReleaseStack, Scope,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 测试实例作用域
///
/// 由 [`TestSetup::prepare_test_instance`](crate::TestSetup::prepare_test_instance) 返回，
/// 持有按获取顺序记录的释放动作。关闭时按后进先出顺序执行全部释放动作，
/// 未显式关闭的作用域在析构时尽力释放。
pub struct TestInstanceScope {
    id: String,
    scope: Scope,
    class: Arc<TestClass>,
    test_instance: Instance,
    resolver: ScopedResolver,
    releases: Arc<ReleaseStack>,
    state: InstanceState,
}

impl TestInstanceScope {
    pub(crate) fn new(
        id: String,
        scope: Scope,
        class: Arc<TestClass>,
        test_instance: Instance,
        resolver: ScopedResolver,
        releases: Arc<ReleaseStack>,
    ) -> Self {
        info!("测试实例已准备: {} ({})", id, class.name());
        Self {
            id,
            scope,
            class,
            test_instance,
            resolver,
            releases,
            state: InstanceState::Prepared,
        }
    }

    /// 测试实例标识
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 测试实例作用域
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// 所属测试类
    pub fn class(&self) -> &Arc<TestClass> {
        &self.class
    }

    /// 当前生命周期状态
    pub fn state(&self) -> InstanceState {
        self.state
    }

    /// 已完成注入的测试实例
    pub fn test_instance(&self) -> &Instance {
        &self.test_instance
    }

    /// 当前测试实例的替身集合
    pub fn replacements(&self) -> &ReplacementSet {
        self.resolver.replacements().replacements()
    }

    /// 已记录的释放动作数量
    pub fn pending_releases(&self) -> usize {
        self.releases.len()
    }

    /// 解析组件，未注册时返回 `None`
    pub fn resolve<T: ?Sized + 'static>(&self) -> DependencyResult<Option<Arc<T>>> {
        self.resolver.resolve_as::<T>()
    }

    /// 解析组件，未注册时返回错误
    pub fn require<T: ?Sized + 'static>(&self) -> DependencyResult<Arc<T>> {
        self.resolve::<T>()?
            .ok_or_else(|| DependencyError::ComponentNotRegistered {
                type_name: std::any::type_name::<T>().to_string(),
            })
    }

    /// 按名称解析资源
    pub fn resource(&self, name: &str) -> DependencyResult<Option<Instance>> {
        self.resolver.resource(name)
    }

    /// 标记测试体开始执行
    pub fn start(&mut self) {
        if self.state == InstanceState::Prepared {
            self.state = InstanceState::Running;
            debug!("测试实例开始运行: {}", self.id);
        }
    }

    /// 执行测试体并关闭作用域
    ///
    /// 测试体 panic 时作用域在析构中释放。
    pub fn run<R>(mut self, body: impl FnOnce(&Self) -> R) -> Result<R, CleanupError> {
        self.start();
        let output = body(&self);
        self.shutdown()?;
        Ok(output)
    }

    /// 关闭作用域，执行所有释放动作
    pub fn shutdown(mut self) -> Result<(), CleanupError> {
        self.finish()
    }

    fn finish(&mut self) -> Result<(), CleanupError> {
        if self.state == InstanceState::ShutDown {
            return Ok(());
        }
        self.state = InstanceState::ShutDown;

        let lifetime = chrono::Utc::now() - self.scope.created_at;
        info!(
            "关闭测试实例: {}, 释放动作 {} 个, 存活 {} ms",
            self.id,
            self.releases.len(),
            lifetime.num_milliseconds()
        );
        self.releases.drain()
    }
}

impl Drop for TestInstanceScope {
    fn drop(&mut self) {
        if self.state == InstanceState::ShutDown {
            return;
        }
        warn!("测试实例 {} 未显式关闭，析构时释放", self.id);
        if let Err(error) = self.finish() {
            warn!("测试实例 {} 释放失败: {}", self.id, error);
        }
    }
}

impl std::fmt::Debug for TestInstanceScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestInstanceScope")
            .field("id", &self.id)
            .field("class", &self.class.name())
            .field("state", &self.state)
            .field("resolver", &self.resolver)
            .finish()
    }
}
