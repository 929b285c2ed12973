//! 作用域解析器
//!
//! 把解析引擎、会话式组件桥接器与资源注册表组合成一个解析入口，
//! 并通过替换管理器包装两条生产管线。
//!
//! 单例随进程存在，首次创建时只经由进程级解析器注入：
//! 进程级解析器没有替身和测试类资源，其释放动作记录在测试准备器上。

use di_abstractions::{
    Injector, Producer, ResolutionContext, ResolutionEngine, ResolveOptions, Resolver,
};
use di_impl::{
    ComponentRegistry, InjectionChain, ReplacementManager, ResourceRegistry, SessionBridge,
};
use infrastructure_common::{
    BoxError, DependencyError, DependencyResult, InjectionPoint, Instance, Multiplicity,
    ReleaseStack, TypeInfo,
};
use std::sync::Arc;
use tracing::debug;

/// 作用域解析器
///
/// 同一类型同时注册为会话式组件和普通托管组件时，会话式组件优先。
pub struct ScopedResolver {
    pub(crate) registry: Arc<ComponentRegistry>,
    pub(crate) engine: Arc<dyn ResolutionEngine>,
    pub(crate) bridge: Arc<SessionBridge>,
    pub(crate) resources: Option<Arc<ResourceRegistry>>,
    pub(crate) replacements: ReplacementManager,
    pub(crate) chain: InjectionChain,
    pub(crate) releases: Option<Arc<ReleaseStack>>,
    pub(crate) options: ResolveOptions,
    pub(crate) singletons: Option<Arc<ScopedResolver>>,
}

impl ScopedResolver {
    /// 新的解析上下文
    pub fn context(&self) -> ResolutionContext {
        ResolutionContext::with_options(self.options.clone())
    }

    /// 是否为进程级解析器
    pub fn is_process_level(&self) -> bool {
        self.singletons.is_none()
    }

    /// 当前作用域的替换管理器
    pub fn replacements(&self) -> &ReplacementManager {
        &self.replacements
    }

    /// 按类型解析实例
    pub fn resolve_type(&self, target: &TypeInfo) -> DependencyResult<Option<Instance>> {
        let mut ctx = self.context();
        if let Some(instance) = self.resolve_session(target, &mut ctx)? {
            return Ok(Some(instance));
        }
        self.resolve_component(target, &mut ctx)
    }

    /// 按类型解析并转换为 `Arc<T>`
    pub fn resolve_as<T: ?Sized + 'static>(&self) -> DependencyResult<Option<Arc<T>>> {
        let target = TypeInfo::of::<T>();
        match self.resolve_type(&target)? {
            Some(instance) => instance
                .get::<T>()
                .map(Some)
                .ok_or_else(|| DependencyError::TypeMismatch {
                    field: target.short_name().to_string(),
                    expected: target.to_string(),
                    actual: instance.type_info().to_string(),
                }),
            None => Ok(None),
        }
    }

    /// 按名称解析资源
    pub fn resource(&self, name: &str) -> DependencyResult<Option<Instance>> {
        self.resolve_resource(&InjectionPoint::resource_named(name))
    }

    /// 对外部创建的实例（例如测试实例本身）执行注入链
    pub fn inject(&self, target: &Instance) -> DependencyResult<()> {
        let mut ctx = self.context();
        let injector = self.replacements.guard(self.chain_injector());
        injector(target, &mut ctx)
    }

    fn chain_injector(&self) -> Injector<'_> {
        Box::new(
            move |instance: &Instance, ctx: &mut ResolutionContext| -> DependencyResult<()> {
                self.chain.apply(instance, self, ctx)
            },
        )
    }

    fn record<F>(&self, name: String, action: F)
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        match &self.releases {
            Some(releases) => releases.push(name, action),
            None => debug!("进程级组件不记录释放动作: {}", name),
        }
    }

    fn record_pre_destroy(&self, instance: &Instance) {
        if instance.injectable().is_none() {
            return;
        }
        let hook = instance.clone();
        self.record(
            format!("pre_destroy {}", instance.type_info().short_name()),
            move || hook.pre_destroy(),
        );
    }
}

impl Resolver for ScopedResolver {
    fn resolve_component(
        &self,
        target: &TypeInfo,
        ctx: &mut ResolutionContext,
    ) -> DependencyResult<Option<Instance>> {
        let producer: Producer<'_> = Box::new(
            |ctx: &mut ResolutionContext| -> DependencyResult<Option<Instance>> {
                self.engine.produce(target, ctx)
            },
        );
        let (producer, injector) =
            self.replacements.wrap(target, producer, self.chain_injector());

        ctx.enter(target, |ctx| {
            let Some(instance) = producer(ctx)? else {
                return Ok(None);
            };
            injector(&instance, ctx)?;

            if !self.replacements.is_replacement(&instance) {
                instance.post_construct().map_err(|e| {
                    DependencyError::creation_failed(instance.type_info().to_string(), e)
                })?;
                self.record_pre_destroy(&instance);
            }
            Ok(Some(instance))
        })
    }

    fn resolve_session(
        &self,
        target: &TypeInfo,
        ctx: &mut ResolutionContext,
    ) -> DependencyResult<Option<Instance>> {
        // 桥接器内部的注入同样拒绝向替身注入
        let injector = self.replacements.guard(self.chain_injector());
        let acquire: Producer<'_> = Box::new(
            |ctx: &mut ResolutionContext| -> DependencyResult<Option<Instance>> {
                let Some(descriptor) = self.registry.find_session(target)? else {
                    return Ok(None);
                };
                match (descriptor.multiplicity(), &self.singletons) {
                    // 单例随进程存在，不捕获当前作用域的替身与资源
                    (Multiplicity::Singleton, Some(process)) => {
                        let injector = process.chain_injector();
                        self.bridge.acquire(descriptor, &*injector, ctx).map(Some)
                    }
                    _ => self.bridge.acquire(descriptor, &*injector, ctx).map(Some),
                }
            },
        );
        let producer = self.replacements.intercept(target, acquire);

        let Some(instance) = producer(ctx)? else {
            return Ok(None);
        };

        if !self.replacements.is_replacement(&instance) {
            if let Some(descriptor) = self.bridge.descriptor_for(instance.type_info()) {
                if descriptor.multiplicity() == Multiplicity::PerLookup {
                    let bridge = self.bridge.clone();
                    let descriptor = descriptor.clone();
                    let released = instance.clone();
                    self.record(
                        format!("release {}", descriptor.type_info().short_name()),
                        move || bridge.release(&descriptor, &released),
                    );
                }
            }
        }
        Ok(Some(instance))
    }

    fn resolve_resource(&self, point: &InjectionPoint) -> DependencyResult<Option<Instance>> {
        let name = point.resource_name().unwrap_or(point.field);
        let Some(resources) = &self.resources else {
            debug!("进程级解析器不提供测试类资源: {}", name);
            return Ok(None);
        };
        let resolved = resources
            .resolve(point)
            .map_err(|source| DependencyError::ResourceUnavailable {
                name: name.to_string(),
                source,
            })?;
        if resolved.is_none() {
            debug!("资源 {} 未找到", name);
        }
        Ok(resolved)
    }
}

impl std::fmt::Debug for ScopedResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedResolver")
            .field("engine", &self.engine.name())
            .field("chain", &self.chain)
            .field("replacements", &self.replacements.replacements().len())
            .field(
                "pending_releases",
                &self.releases.as_ref().map_or(0, |releases| releases.len()),
            )
            .field("process_level", &self.is_process_level())
            .finish()
    }
}
