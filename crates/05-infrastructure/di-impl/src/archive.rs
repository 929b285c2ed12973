//! 组件单元与组件类描述
//!
//! 组件单元通过 [`COMPONENT_UNITS`] 在链接期登记，例如：
//!
//! ```ignore
//! #[linkme::distributed_slice(di_impl::COMPONENT_UNITS)]
//! static ORDERS: fn() -> ComponentUnit = orders_unit;
//! ```

use di_abstractions::Constructor;
use infrastructure_common::{
    BoxError, DependencyError, DependencyResult, Injectable, Instance, InstanceBuilder,
    Multiplicity, TypeInfo,
};
use once_cell::sync::OnceCell;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::warn;

/// 链接期登记的组件单元构造函数
#[linkme::distributed_slice]
pub static COMPONENT_UNITS: [fn() -> ComponentUnit] = [..];

/// 可发现的组件类
#[derive(Clone)]
pub struct ComponentClass {
    type_info: TypeInfo,
    exposes: Vec<TypeInfo>,
    constructor: Constructor,
}

impl ComponentClass {
    /// 以构造函数创建组件类构建器
    pub fn builder<U, F>(constructor: F) -> ComponentClassBuilder<U>
    where
        U: Injectable,
        F: Fn() -> Result<U, BoxError> + Send + Sync + 'static,
    {
        ComponentClassBuilder {
            constructor: Arc::new(constructor),
            exposes: Vec::new(),
            views: Vec::new(),
        }
    }

    /// 以 `Default` 构造的组件类
    pub fn of<U: Injectable + Default>() -> Self {
        Self::builder(|| Ok(U::default())).build()
    }

    /// 组件类型
    pub fn type_info(&self) -> &TypeInfo {
        &self.type_info
    }

    /// 组件暴露的可赋值类型（不含自身）
    pub fn exposes(&self) -> &[TypeInfo] {
        &self.exposes
    }

    /// 是否可赋值到目标类型
    pub fn is_assignable_to(&self, target: &TypeInfo) -> bool {
        self.type_info == *target || self.exposes.contains(target)
    }

    /// 创建新实例
    pub fn instantiate(&self) -> DependencyResult<Instance> {
        (self.constructor)()
            .map_err(|e| DependencyError::creation_failed(self.type_info.to_string(), e))
    }
}

impl PartialEq for ComponentClass {
    fn eq(&self, other: &Self) -> bool {
        self.type_info == other.type_info
    }
}

impl Eq for ComponentClass {}

impl Hash for ComponentClass {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_info.hash(state);
    }
}

impl fmt::Debug for ComponentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentClass")
            .field("type", &self.type_info.name)
            .field("exposes", &self.exposes.iter().map(|t| &t.name).collect::<Vec<_>>())
            .finish()
    }
}

type ViewFn<U> = Arc<dyn Fn(InstanceBuilder<U>) -> InstanceBuilder<U> + Send + Sync>;

/// 组件类构建器
pub struct ComponentClassBuilder<U> {
    constructor: Arc<dyn Fn() -> Result<U, BoxError> + Send + Sync>,
    exposes: Vec<TypeInfo>,
    views: Vec<ViewFn<U>>,
}

impl<U: Injectable> ComponentClassBuilder<U> {
    /// 暴露可赋值类型，例如 `expose::<dyn Greeter>(|v| v)`
    pub fn expose<T>(mut self, upcast: fn(Arc<U>) -> Arc<T>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.exposes.push(TypeInfo::of::<T>());
        self.views
            .push(Arc::new(move |builder: InstanceBuilder<U>| builder.view(upcast)));
        self
    }

    /// 构建组件类
    pub fn build(self) -> ComponentClass {
        let Self {
            constructor,
            exposes,
            views,
        } = self;

        let constructor: Constructor = Arc::new(move || {
            let value = Arc::new(constructor()?);
            let builder = views
                .iter()
                .fold(Instance::component(value), |builder, view| view(builder));
            Ok(builder.build())
        });

        ComponentClass {
            type_info: TypeInfo::of::<U>(),
            exposes,
            constructor,
        }
    }
}

/// 会话式组件描述
///
/// 相等性只取决于组件类。
#[derive(Debug, Clone)]
pub struct SessionComponentDescriptor {
    class: ComponentClass,
    multiplicity: Multiplicity,
}

impl SessionComponentDescriptor {
    /// 创建描述
    pub fn new(class: ComponentClass, multiplicity: Multiplicity) -> Self {
        Self {
            class,
            multiplicity,
        }
    }

    /// 单例会话组件
    pub fn singleton(class: ComponentClass) -> Self {
        Self::new(class, Multiplicity::Singleton)
    }

    /// 按查找创建的会话组件
    pub fn per_lookup(class: ComponentClass) -> Self {
        Self::new(class, Multiplicity::PerLookup)
    }

    /// 组件类
    pub fn bean_class(&self) -> &ComponentClass {
        &self.class
    }

    /// 组件类型
    pub fn type_info(&self) -> &TypeInfo {
        self.class.type_info()
    }

    /// 实例数量策略
    pub fn multiplicity(&self) -> Multiplicity {
        self.multiplicity
    }
}

impl PartialEq for SessionComponentDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.class == other.class
    }
}

impl Eq for SessionComponentDescriptor {}

impl Hash for SessionComponentDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.class.hash(state);
    }
}

type DescriptorLoader =
    Box<dyn Fn() -> Result<Vec<SessionComponentDescriptor>, BoxError> + Send + Sync>;

/// 组件单元
///
/// 一个可发现的代码单元。会话式组件描述在首次访问时加载并缓存，
/// 之后不会重新计算。
pub struct ComponentUnit {
    id: String,
    classes: Vec<ComponentClass>,
    beans_marker: bool,
    extension_marker: bool,
    loader: Option<DescriptorLoader>,
    descriptors: OnceCell<Result<HashSet<SessionComponentDescriptor>, String>>,
}

impl ComponentUnit {
    /// 创建组件单元
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            classes: Vec::new(),
            beans_marker: false,
            extension_marker: false,
            loader: None,
            descriptors: OnceCell::new(),
        }
    }

    /// 添加候选组件类
    pub fn with_class(mut self, class: ComponentClass) -> Self {
        self.classes.push(class);
        self
    }

    /// 标记为包含组件标记文件
    pub fn with_beans_marker(mut self) -> Self {
        self.beans_marker = true;
        self
    }

    /// 标记为包含容器扩展
    pub fn with_extension_marker(mut self) -> Self {
        self.extension_marker = true;
        self
    }

    /// 设置会话式组件描述加载函数
    pub fn with_session_descriptors<F>(mut self, loader: F) -> Self
    where
        F: Fn() -> Result<Vec<SessionComponentDescriptor>, BoxError> + Send + Sync + 'static,
    {
        self.loader = Some(Box::new(loader));
        self
    }

    /// 单元标识
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 候选组件类
    pub fn classes(&self) -> &[ComponentClass] {
        &self.classes
    }

    /// 会话式组件描述（首次访问时加载）
    pub fn session_descriptors(&self) -> Result<&HashSet<SessionComponentDescriptor>, &str> {
        self.descriptors
            .get_or_init(|| match &self.loader {
                None => Ok(HashSet::new()),
                Some(loader) => loader()
                    .map(|descriptors| descriptors.into_iter().collect())
                    .map_err(|e| e.to_string()),
            })
            .as_ref()
            .map_err(String::as_str)
    }

    /// 是否与容器相关
    ///
    /// 描述加载失败时视为不相关。
    pub fn relevant(&self) -> bool {
        match self.session_descriptors() {
            Ok(descriptors) => {
                self.beans_marker || self.extension_marker || !descriptors.is_empty()
            }
            Err(message) => {
                warn!("组件单元 {} 元数据读取失败，已忽略: {}", self.id, message);
                false
            }
        }
    }
}

impl fmt::Debug for ComponentUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentUnit")
            .field("id", &self.id)
            .field("classes", &self.classes.len())
            .field("beans_marker", &self.beans_marker)
            .field("extension_marker", &self.extension_marker)
            .finish()
    }
}
