//! 测试替身替换
//!
//! 通过包装"生产者/注入器"函数对，使解析管线在不感知替换存在的情况下
//! 优先返回当前测试实例登记的替身。

use di_abstractions::{Injector, Producer, ResolutionContext};
use infrastructure_common::{Instance, TypeInfo};
use std::sync::Arc;
use tracing::debug;

/// 替身集合
///
/// 按登记顺序保存，查找时第一个可赋值的替身胜出，不做歧义检查。
#[derive(Debug, Clone, Default)]
pub struct ReplacementSet {
    replacements: Vec<Instance>,
}

impl ReplacementSet {
    /// 创建替身集合
    pub fn new(replacements: Vec<Instance>) -> Self {
        Self { replacements }
    }

    /// 空集合
    pub fn empty() -> Self {
        Self::default()
    }

    /// 替身数量
    pub fn len(&self) -> usize {
        self.replacements.len()
    }

    /// 是否没有替身
    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty()
    }

    /// 按注册顺序遍历替身
    pub fn iter(&self) -> impl Iterator<Item = &Instance> {
        self.replacements.iter()
    }

    /// 查找第一个可赋值到目标类型的替身
    pub fn find(&self, target: &TypeInfo) -> Option<&Instance> {
        self.replacements
            .iter()
            .find(|replacement| replacement.is_assignable_to(target))
    }

    /// 实例是否为集合中的替身（按对象身份比较）
    pub fn contains(&self, instance: &Instance) -> bool {
        self.replacements
            .iter()
            .any(|replacement| replacement.same_object(instance))
    }
}

impl FromIterator<Instance> for ReplacementSet {
    fn from_iter<I: IntoIterator<Item = Instance>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// 替换管理器
///
/// 绑定一个测试实例的替身集合。
#[derive(Debug, Clone, Default)]
pub struct ReplacementManager {
    active: Arc<ReplacementSet>,
}

impl ReplacementManager {
    /// 使用作用域的替身集合创建管理器
    pub fn new(active: Arc<ReplacementSet>) -> Self {
        Self { active }
    }

    /// 当前替身集合
    pub fn replacements(&self) -> &ReplacementSet {
        &self.active
    }

    /// 实例是否为替身
    pub fn is_replacement(&self, instance: &Instance) -> bool {
        self.active.contains(instance)
    }

    /// 包装生产者：存在可赋值替身时直接返回替身，不调用原生产者
    pub fn intercept<'a>(
        &'a self,
        requested: &'a TypeInfo,
        producer: Producer<'a>,
    ) -> Producer<'a> {
        Box::new(move |ctx: &mut ResolutionContext| {
            if let Some(replacement) = self.active.find(requested) {
                debug!(
                    "使用替身 {} 替代 {}",
                    replacement.type_info().short_name(),
                    requested.short_name()
                );
                return Ok(Some(replacement.clone()));
            }
            producer(ctx)
        })
    }

    /// 包装注入器：拒绝向替身注入
    pub fn guard<'a>(&'a self, injector: Injector<'a>) -> Injector<'a> {
        Box::new(move |instance: &Instance, ctx: &mut ResolutionContext| {
            if self.active.contains(instance) {
                debug!("跳过替身注入: {}", instance.type_info().short_name());
                return Ok(());
            }
            injector(instance, ctx)
        })
    }

    /// 同时包装生产者与注入器
    pub fn wrap<'a>(
        &'a self,
        requested: &'a TypeInfo,
        producer: Producer<'a>,
        injector: Injector<'a>,
    ) -> (Producer<'a>, Injector<'a>) {
        (self.intercept(requested, producer), self.guard(injector))
    }
}
