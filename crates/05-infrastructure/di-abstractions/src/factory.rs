//! 组件创建与注入的函数类型
//!
//! 解析管线由一对"生产者/注入器"组成，替换管理器通过包装这对函数
//! 实现对测试替身的拦截。

use crate::resolver::{ResolutionContext, Resolver};
use infrastructure_common::{BoxError, DependencyResult, Instance, TypeInfo};
use std::sync::Arc;

/// 生产者：返回一个实例，或在无法提供时返回 `None`
pub type Producer<'a> =
    Box<dyn Fn(&mut ResolutionContext) -> DependencyResult<Option<Instance>> + 'a>;

/// 注入器：对已创建的实例执行字段注入
pub type Injector<'a> =
    Box<dyn Fn(&Instance, &mut ResolutionContext) -> DependencyResult<()> + 'a>;

/// 组件构造函数
pub type Constructor = Arc<dyn Fn() -> Result<Instance, BoxError> + Send + Sync>;

/// 解析引擎 trait
///
/// 负责普通托管组件（非会话式组件）的创建与注入。
pub trait ResolutionEngine: Send + Sync {
    /// 引擎名称
    fn name(&self) -> &str;

    /// 创建可赋值到目标类型的组件实例，未注册时返回 `None`
    fn produce(
        &self,
        target: &TypeInfo,
        ctx: &mut ResolutionContext,
    ) -> DependencyResult<Option<Instance>>;

    /// 向实例注入普通托管组件依赖
    fn inject(
        &self,
        instance: &Instance,
        resolver: &dyn Resolver,
        ctx: &mut ResolutionContext,
    ) -> DependencyResult<()>;
}
