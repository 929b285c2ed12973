//! 组件基础接口定义
//!
//! 提供组件实例、注入点以及注入目标的基础抽象

use crate::errors::{BoxError, DependencyError, DependencyResult};
use crate::metadata::TypeInfo;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 注入点类型
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InjectionKind {
    /// 普通托管组件
    Component,
    /// 会话式组件引用
    SessionRef,
    /// 命名资源
    Resource {
        /// 资源名称
        name: String,
    },
}

/// 注入点描述
#[derive(Debug, Clone)]
pub struct InjectionPoint {
    /// 字段名称
    pub field: &'static str,
    /// 注入点类型
    pub kind: InjectionKind,
    /// 目标类型
    pub target: TypeInfo,
    /// 是否为可选注入
    pub optional: bool,
}

impl InjectionPoint {
    /// 创建普通组件注入点
    pub fn component<T: ?Sized + 'static>(field: &'static str) -> Self {
        Self::new(field, InjectionKind::Component, TypeInfo::of::<T>())
    }

    /// 创建会话式组件引用注入点
    pub fn session<T: ?Sized + 'static>(field: &'static str) -> Self {
        Self::new(field, InjectionKind::SessionRef, TypeInfo::of::<T>())
    }

    /// 创建命名资源注入点
    pub fn resource<T: ?Sized + 'static>(field: &'static str, name: impl Into<String>) -> Self {
        Self::new(
            field,
            InjectionKind::Resource { name: name.into() },
            TypeInfo::of::<T>(),
        )
    }

    /// 仅按名称查找资源时使用的注入点
    pub fn resource_named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            "<lookup>",
            InjectionKind::Resource { name },
            TypeInfo::of::<dyn Any + Send + Sync>(),
        )
    }

    fn new(field: &'static str, kind: InjectionKind, target: TypeInfo) -> Self {
        Self {
            field,
            kind,
            target,
            optional: false,
        }
    }

    /// 设置为可选注入
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// 资源名称（仅资源注入点）
    pub fn resource_name(&self) -> Option<&str> {
        match &self.kind {
            InjectionKind::Resource { name } => Some(name),
            _ => None,
        }
    }
}

/// 可注入组件 trait
///
/// 组件通过 [`injection_points`](Injectable::injection_points) 声明依赖，
/// 容器解析后通过 [`accept`](Injectable::accept) 回填。字段通常使用
/// `OnceCell` 等内部可变容器保存。
pub trait Injectable: Send + Sync + 'static {
    /// 声明的注入点
    fn injection_points(&self) -> Vec<InjectionPoint> {
        Vec::new()
    }

    /// 接收一个已解析的注入值
    fn accept(&self, point: &InjectionPoint, _value: Instance) -> DependencyResult<()> {
        Err(DependencyError::UnknownInjectionPoint {
            owner: std::any::type_name::<Self>().to_string(),
            field: point.field.to_string(),
        })
    }

    /// 注入完成后的回调
    fn post_construct(&self) -> Result<(), BoxError> {
        Ok(())
    }

    /// 销毁前的回调
    fn pre_destroy(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// 组件实例
///
/// 类型擦除的共享对象。视图表记录该对象可赋值到的每个类型
/// （自身类型以及显式暴露的 trait object），身份由共享分配的地址决定。
#[derive(Clone)]
pub struct Instance {
    type_info: TypeInfo,
    address: usize,
    views: Arc<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
    injectable: Option<Arc<dyn Injectable>>,
}

impl Instance {
    /// 以可注入组件创建实例
    pub fn component<U: Injectable>(value: Arc<U>) -> InstanceBuilder<U> {
        let injectable: Arc<dyn Injectable> = value.clone();
        InstanceBuilder::new(value, Some(injectable))
    }

    /// 以普通值创建实例（不参与注入与生命周期回调）
    pub fn value<U: Any + Send + Sync>(value: Arc<U>) -> InstanceBuilder<U> {
        InstanceBuilder::new(value, None)
    }

    /// 实例的具体类型
    pub fn type_info(&self) -> &TypeInfo {
        &self.type_info
    }

    /// 以指定类型获取实例
    pub fn get<T: ?Sized + 'static>(&self) -> Option<Arc<T>> {
        self.views
            .get(&TypeId::of::<T>())
            .and_then(|view| view.downcast_ref::<Arc<T>>())
            .cloned()
    }

    /// 以注入点目标类型获取实例，类型不符时返回错误
    pub fn require<T: ?Sized + 'static>(&self, point: &InjectionPoint) -> DependencyResult<Arc<T>> {
        self.get::<T>().ok_or_else(|| DependencyError::TypeMismatch {
            field: point.field.to_string(),
            expected: std::any::type_name::<T>().to_string(),
            actual: self.type_info.to_string(),
        })
    }

    /// 检查是否可赋值到目标类型
    pub fn is_assignable_to(&self, target: &TypeInfo) -> bool {
        self.views.contains_key(&target.id)
    }

    /// 检查两个实例是否为同一对象
    pub fn same_object(&self, other: &Self) -> bool {
        self.address == other.address
    }

    /// 注入目标视图
    pub fn injectable(&self) -> Option<&Arc<dyn Injectable>> {
        self.injectable.as_ref()
    }

    /// 执行注入完成回调
    pub fn post_construct(&self) -> Result<(), BoxError> {
        self.injectable
            .as_ref()
            .map_or(Ok(()), |injectable| injectable.post_construct())
    }

    /// 执行销毁前回调
    pub fn pre_destroy(&self) -> Result<(), BoxError> {
        self.injectable
            .as_ref()
            .map_or(Ok(()), |injectable| injectable.pre_destroy())
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type", &self.type_info.module_path)
            .field("address", &format_args!("{:#x}", self.address))
            .field("views", &self.views.len())
            .field("injectable", &self.injectable.is_some())
            .finish()
    }
}

/// 实例构建器
pub struct InstanceBuilder<U> {
    value: Arc<U>,
    injectable: Option<Arc<dyn Injectable>>,
    views: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl<U: Any + Send + Sync> InstanceBuilder<U> {
    fn new(value: Arc<U>, injectable: Option<Arc<dyn Injectable>>) -> Self {
        let mut views: HashMap<TypeId, Box<dyn Any + Send + Sync>> = HashMap::new();
        views.insert(TypeId::of::<U>(), Box::new(value.clone()));
        Self {
            value,
            injectable,
            views,
        }
    }

    /// 暴露一个可赋值视图，例如 `view::<dyn Greeter>(|v| v)`
    pub fn view<T>(mut self, upcast: impl FnOnce(Arc<U>) -> Arc<T>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let view = upcast(self.value.clone());
        self.views.insert(TypeId::of::<T>(), Box::new(view));
        self
    }

    /// 构建实例
    pub fn build(self) -> Instance {
        Instance {
            type_info: TypeInfo::of::<U>(),
            address: Arc::as_ptr(&self.value).cast::<()>() as usize,
            views: Arc::new(self.views),
            injectable: self.injectable,
        }
    }
}
