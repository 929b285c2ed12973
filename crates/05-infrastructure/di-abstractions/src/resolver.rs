//! 组件解析器抽象接口
//!
//! 提供注入点解析以及循环依赖检测的能力

use infrastructure_common::{
    ContainerConfig, DependencyError, DependencyResult, InjectionKind, InjectionPoint, Instance,
    TypeInfo,
};
use tracing::debug;

/// 组件解析器 trait
///
/// 注入链上的每个阶段都通过它获取依赖，实现方决定替换、
/// 会话式组件以及资源的查找顺序。未找到时返回 `Ok(None)`。
pub trait Resolver: Send + Sync {
    /// 解析普通托管组件
    fn resolve_component(
        &self,
        target: &TypeInfo,
        ctx: &mut ResolutionContext,
    ) -> DependencyResult<Option<Instance>>;

    /// 解析会话式组件
    fn resolve_session(
        &self,
        target: &TypeInfo,
        ctx: &mut ResolutionContext,
    ) -> DependencyResult<Option<Instance>>;

    /// 解析命名资源
    fn resolve_resource(&self, point: &InjectionPoint) -> DependencyResult<Option<Instance>>;

    /// 按注入点类型分派解析
    fn resolve_point(
        &self,
        point: &InjectionPoint,
        ctx: &mut ResolutionContext,
    ) -> DependencyResult<Option<Instance>> {
        match &point.kind {
            InjectionKind::Component => self.resolve_component(&point.target, ctx),
            InjectionKind::SessionRef => self.resolve_session(&point.target, ctx),
            InjectionKind::Resource { .. } => self.resolve_resource(point),
        }
    }
}

/// 解析上下文
#[derive(Debug, Clone, Default)]
pub struct ResolutionContext {
    /// 当前解析链，用于检测循环依赖
    pub resolution_chain: Vec<TypeInfo>,
    /// 解析选项
    pub options: ResolveOptions,
}

impl ResolutionContext {
    /// 创建新的解析上下文
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用指定选项创建解析上下文
    pub fn with_options(options: ResolveOptions) -> Self {
        Self {
            resolution_chain: Vec::new(),
            options,
        }
    }

    /// 当前解析深度
    pub fn depth(&self) -> usize {
        self.resolution_chain.len()
    }

    /// 添加类型到解析链
    pub fn push_type(&mut self, type_info: &TypeInfo) -> DependencyResult<()> {
        if self.resolution_chain.contains(type_info) {
            let chain = self.describe_chain(type_info);
            debug!("检测到循环依赖: {}", chain);
            return Err(DependencyError::CircularDependency {
                dependency_chain: chain,
            });
        }
        if self.depth() >= self.options.max_depth {
            return Err(DependencyError::DependencyResolutionFailed {
                type_name: type_info.to_string(),
                message: format!("解析深度超过上限 {}", self.options.max_depth),
            });
        }
        self.resolution_chain.push(type_info.clone());
        Ok(())
    }

    /// 从解析链中移除类型
    pub fn pop_type(&mut self) {
        self.resolution_chain.pop();
    }

    /// 在解析链中登记类型后执行 `f`，无论成功与否都会出栈
    pub fn enter<R>(
        &mut self,
        type_info: &TypeInfo,
        f: impl FnOnce(&mut Self) -> DependencyResult<R>,
    ) -> DependencyResult<R> {
        self.push_type(type_info)?;
        let result = f(self);
        self.pop_type();
        result
    }

    fn describe_chain(&self, closing: &TypeInfo) -> String {
        self.resolution_chain
            .iter()
            .chain(std::iter::once(closing))
            .map(TypeInfo::short_name)
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

/// 解析选项
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// 最大递归深度
    pub max_depth: usize,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self { max_depth: 64 }
    }
}

impl From<&ContainerConfig> for ResolveOptions {
    fn from(config: &ContainerConfig) -> Self {
        Self {
            max_depth: config.max_resolution_depth,
        }
    }
}
