//! 基于组件注册表的默认解析引擎

use crate::injection::inject_points;
use crate::registry::ComponentRegistry;
use di_abstractions::{ResolutionContext, ResolutionEngine, Resolver};
use infrastructure_common::{DependencyResult, InjectionKind, Instance, TypeInfo};
use std::sync::Arc;
use tracing::debug;

/// 注册表解析引擎
///
/// 用已发现的组件类创建普通托管组件，并注入其 `Component` 注入点。
#[derive(Debug, Clone)]
pub struct RegistryEngine {
    registry: Arc<ComponentRegistry>,
}

impl RegistryEngine {
    /// 基于组件注册表创建解析引擎
    pub fn new(registry: Arc<ComponentRegistry>) -> Self {
        Self { registry }
    }

    /// 引擎使用的组件注册表
    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }
}

impl ResolutionEngine for RegistryEngine {
    fn name(&self) -> &str {
        "registry"
    }

    fn produce(
        &self,
        target: &TypeInfo,
        _ctx: &mut ResolutionContext,
    ) -> DependencyResult<Option<Instance>> {
        match self.registry.find_class(target)? {
            Some(class) => {
                debug!("创建托管组件: {}", class.type_info().short_name());
                class.instantiate().map(Some)
            }
            None => Ok(None),
        }
    }

    fn inject(
        &self,
        instance: &Instance,
        resolver: &dyn Resolver,
        ctx: &mut ResolutionContext,
    ) -> DependencyResult<()> {
        inject_points(instance, resolver, ctx, |kind| {
            matches!(kind, InjectionKind::Component)
        })
    }
}
