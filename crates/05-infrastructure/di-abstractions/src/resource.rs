//! 资源提供者抽象接口

use infrastructure_common::{BoxError, InjectionPoint, Instance, ResourceResult};
use std::sync::Arc;

/// 测试类信息
///
/// 传递给资源提供者工厂与数据源迁移器，不暴露测试类本身。
#[derive(Debug, Clone)]
pub struct TestClassInfo {
    /// 测试类ID
    pub id: uuid::Uuid,
    /// 测试类名称
    pub name: String,
    /// 继承链，从自身到最顶层基类
    pub lineage: Vec<String>,
}

impl TestClassInfo {
    /// 是否为指定类或其子类
    pub fn is_a(&self, class_name: &str) -> bool {
        self.lineage.iter().any(|name| name == class_name)
    }
}

/// 资源提供者 trait
pub trait ResourceProvider: Send + Sync {
    /// 提供者名称
    fn name(&self) -> &str;

    /// 提供者声明的资源名称，用于检测重名
    fn provided_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// 解析资源注入点，无法提供时返回 `None`
    fn resolve(&self, point: &InjectionPoint) -> ResourceResult<Option<Instance>>;

    /// 释放提供者持有的资源
    fn cleanup(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// 资源提供者工厂 trait
pub trait ResourceProviderFactory: Send + Sync {
    /// 工厂名称
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// 为测试类创建资源提供者
    fn create(&self, class: &TestClassInfo) -> Result<Arc<dyn ResourceProvider>, BoxError>;
}

impl<F> ResourceProviderFactory for F
where
    F: Fn(&TestClassInfo) -> Result<Arc<dyn ResourceProvider>, BoxError> + Send + Sync,
{
    fn create(&self, class: &TestClassInfo) -> Result<Arc<dyn ResourceProvider>, BoxError> {
        self(class)
    }
}

/// 按名称查找资源
pub trait ResourceLookup {
    /// 查找命名资源
    fn lookup(&self, name: &str) -> ResourceResult<Option<Instance>>;
}

/// 数据源迁移器 trait
///
/// 在测试类的一次性数据初始化方法之前执行一次。
pub trait DataSourceMigrator: Send + Sync {
    /// 执行迁移
    fn migrate(&self, class: &TestClassInfo, resources: &dyn ResourceLookup)
        -> Result<(), BoxError>;
}
