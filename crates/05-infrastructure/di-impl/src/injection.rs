//! 注入链
//!
//! 每个新创建的实例依次经过：普通托管组件注入、会话式组件引用注入、
//! 命名资源注入。

use di_abstractions::{ResolutionContext, ResolutionEngine, Resolver};
use infrastructure_common::{DependencyError, DependencyResult, InjectionKind, Instance};
use std::sync::Arc;
use tracing::debug;

/// 注入阶段
pub trait InjectionStage: Send + Sync {
    /// 阶段名称
    fn name(&self) -> &str;

    /// 对实例执行本阶段的注入
    fn apply(
        &self,
        target: &Instance,
        resolver: &dyn Resolver,
        ctx: &mut ResolutionContext,
    ) -> DependencyResult<()>;
}

/// 引擎注入阶段：委托给解析引擎注入普通托管组件
pub struct EngineStage {
    engine: Arc<dyn ResolutionEngine>,
}

impl EngineStage {
    /// 使用指定解析引擎创建阶段
    pub fn new(engine: Arc<dyn ResolutionEngine>) -> Self {
        Self { engine }
    }
}

impl InjectionStage for EngineStage {
    fn name(&self) -> &str {
        self.engine.name()
    }

    fn apply(
        &self,
        target: &Instance,
        resolver: &dyn Resolver,
        ctx: &mut ResolutionContext,
    ) -> DependencyResult<()> {
        self.engine.inject(target, resolver, ctx)
    }
}

/// 会话式组件引用注入阶段
#[derive(Debug, Default)]
pub struct SessionReferenceStage;

impl InjectionStage for SessionReferenceStage {
    fn name(&self) -> &str {
        "session-reference"
    }

    fn apply(
        &self,
        target: &Instance,
        resolver: &dyn Resolver,
        ctx: &mut ResolutionContext,
    ) -> DependencyResult<()> {
        inject_points(target, resolver, ctx, |kind| {
            matches!(kind, InjectionKind::SessionRef)
        })
    }
}

/// 命名资源注入阶段
#[derive(Debug, Default)]
pub struct ResourceStage;

impl InjectionStage for ResourceStage {
    fn name(&self) -> &str {
        "resource"
    }

    fn apply(
        &self,
        target: &Instance,
        resolver: &dyn Resolver,
        ctx: &mut ResolutionContext,
    ) -> DependencyResult<()> {
        inject_points(target, resolver, ctx, |kind| {
            matches!(kind, InjectionKind::Resource { .. })
        })
    }
}

/// 注入链
#[derive(Clone, Default)]
pub struct InjectionChain {
    stages: Vec<Arc<dyn InjectionStage>>,
}

impl InjectionChain {
    /// 创建空注入链
    pub fn new() -> Self {
        Self::default()
    }

    /// 标准注入链：引擎 → 会话引用 → 命名资源
    pub fn standard(engine: Arc<dyn ResolutionEngine>) -> Self {
        Self::new()
            .with_stage(EngineStage::new(engine))
            .with_stage(SessionReferenceStage)
            .with_stage(ResourceStage)
    }

    /// 追加注入阶段
    pub fn with_stage(mut self, stage: impl InjectionStage + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// 阶段名称，按执行顺序
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// 依次执行所有注入阶段
    pub fn apply(
        &self,
        target: &Instance,
        resolver: &dyn Resolver,
        ctx: &mut ResolutionContext,
    ) -> DependencyResult<()> {
        for stage in &self.stages {
            stage.apply(target, resolver, ctx)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for InjectionChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InjectionChain")
            .field("stages", &self.stage_names())
            .finish()
    }
}

/// 解析并回填目标实例上满足 `filter` 的注入点
///
/// 必需注入点无法解析时返回 [`DependencyError::UnsatisfiedInjectionPoint`]，
/// 可选注入点则跳过。
pub fn inject_points(
    target: &Instance,
    resolver: &dyn Resolver,
    ctx: &mut ResolutionContext,
    filter: impl Fn(&InjectionKind) -> bool,
) -> DependencyResult<()> {
    let Some(injectable) = target.injectable() else {
        return Ok(());
    };

    for point in injectable
        .injection_points()
        .into_iter()
        .filter(|point| filter(&point.kind))
    {
        match resolver.resolve_point(&point, ctx)? {
            Some(value) => injectable.accept(&point, value)?,
            None if point.optional => {
                debug!(
                    "可选注入点未解析: {}.{}",
                    target.type_info().short_name(),
                    point.field
                );
            }
            None => {
                return Err(DependencyError::UnsatisfiedInjectionPoint {
                    owner: target.type_info().to_string(),
                    field: point.field.to_string(),
                    target: point
                        .resource_name()
                        .map_or_else(|| point.target.to_string(), |name| format!("资源 {name}")),
                });
            }
        }
    }
    Ok(())
}
