//! 组件注册表
//!
//! 所有相关组件单元合并后的只读视图，发布后不再修改。

use crate::archive::{ComponentClass, ComponentUnit, SessionComponentDescriptor};
use infrastructure_common::{DependencyError, DependencyResult, TypeInfo};
use std::collections::HashSet;
use tracing::{debug, warn};

/// 组件注册表
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    units: Vec<ComponentUnit>,
    classes: HashSet<ComponentClass>,
    descriptors: HashSet<SessionComponentDescriptor>,
    // 按登记顺序保存，使查找结果与错误信息稳定
    class_order: Vec<ComponentClass>,
    descriptor_order: Vec<SessionComponentDescriptor>,
}

impl ComponentRegistry {
    /// 由相关组件单元构建注册表
    pub fn from_units(units: Vec<ComponentUnit>) -> Self {
        let mut registry = Self::default();

        for unit in &units {
            for class in unit.classes() {
                if registry.classes.insert(class.clone()) {
                    registry.class_order.push(class.clone());
                }
            }

            match unit.session_descriptors() {
                Ok(descriptors) => {
                    let mut sorted: Vec<_> = descriptors.iter().collect();
                    sorted.sort_by(|a, b| a.type_info().module_path.cmp(&b.type_info().module_path));
                    for descriptor in sorted {
                        if registry.descriptors.insert(descriptor.clone()) {
                            registry.descriptor_order.push(descriptor.clone());
                        }
                    }
                }
                Err(message) => warn!("组件单元 {} 的会话描述不可用: {}", unit.id(), message),
            }
        }

        debug!(
            "组件注册表构建完成: {} 个单元, {} 个组件类, {} 个会话组件",
            units.len(),
            registry.class_order.len(),
            registry.descriptor_order.len()
        );

        registry.units = units;
        registry
    }

    /// 所有组件类
    pub fn component_classes(&self) -> &HashSet<ComponentClass> {
        &self.classes
    }

    /// 所有会话式组件描述
    pub fn session_descriptors(&self) -> &HashSet<SessionComponentDescriptor> {
        &self.descriptors
    }

    /// 保留下来的组件单元
    pub fn units(&self) -> &[ComponentUnit] {
        &self.units
    }

    /// 组件单元标识
    pub fn unit_ids(&self) -> Vec<&str> {
        self.units.iter().map(ComponentUnit::id).collect()
    }

    /// 查找可赋值到目标类型的组件类
    ///
    /// 精确匹配优先；否则要求唯一的可赋值候选。
    pub fn find_class(&self, target: &TypeInfo) -> DependencyResult<Option<&ComponentClass>> {
        select(
            target,
            &self.class_order,
            |class| class.type_info(),
            |class| class.is_assignable_to(target),
        )
    }

    /// 查找可赋值到目标类型的会话式组件
    pub fn find_session(
        &self,
        target: &TypeInfo,
    ) -> DependencyResult<Option<&SessionComponentDescriptor>> {
        select(
            target,
            &self.descriptor_order,
            SessionComponentDescriptor::type_info,
            |descriptor| descriptor.bean_class().is_assignable_to(target),
        )
    }
}

fn select<'r, T>(
    target: &TypeInfo,
    items: &'r [T],
    type_of: impl Fn(&T) -> &TypeInfo,
    assignable: impl Fn(&T) -> bool,
) -> DependencyResult<Option<&'r T>> {
    if let Some(exact) = items.iter().find(|item| type_of(item) == target) {
        return Ok(Some(exact));
    }

    let candidates: Vec<&T> = items.iter().filter(|item| assignable(item)).collect();
    match candidates.as_slice() {
        [] => Ok(None),
        [single] => Ok(Some(*single)),
        many => Err(DependencyError::AmbiguousComponent {
            type_name: target.to_string(),
            candidates: many.iter().map(|item| type_of(item).to_string()).collect(),
        }),
    }
}
