//! 测试类描述

use crate::setup::SetupContext;
use di_abstractions::{ResourceProviderFactory, TestClassInfo};
use infrastructure_common::{BoxError, ConfigError, ConfigResult};
use std::fmt;
use std::iter;
use std::sync::Arc;
use uuid::Uuid;

/// 一次性数据初始化函数
pub type DataSetupFn = Arc<dyn Fn(&SetupContext<'_>) -> Result<(), BoxError> + Send + Sync>;

/// 声明在某一层测试类上的数据初始化方法
#[derive(Clone)]
pub struct DataSetup {
    /// 声明该方法的测试类
    pub class: String,
    /// 方法名称
    pub name: String,
    /// 初始化函数
    pub run: DataSetupFn,
}

impl fmt::Debug for DataSetup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSetup")
            .field("class", &self.class)
            .field("name", &self.name)
            .finish()
    }
}

/// 测试类
///
/// 可以继承父测试类；资源提供者工厂与数据初始化方法按层级声明。
pub struct TestClass {
    id: Uuid,
    name: String,
    parent: Option<Arc<TestClass>>,
    providers: Vec<Arc<dyn ResourceProviderFactory>>,
    data_setups: Vec<DataSetup>,
}

impl TestClass {
    /// 创建测试类构建器
    pub fn builder(name: impl Into<String>) -> TestClassBuilder {
        TestClassBuilder {
            name: name.into(),
            parent: None,
            providers: Vec::new(),
            data_setups: Vec::new(),
        }
    }

    /// 测试类标识
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// 测试类名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 父测试类
    pub fn parent(&self) -> Option<&Arc<TestClass>> {
        self.parent.as_ref()
    }

    /// 继承链，从自身到最顶层基类
    pub fn lineage(&self) -> impl Iterator<Item = &TestClass> {
        iter::successors(Some(self), |class| class.parent.as_deref())
    }

    /// 传递给外部协作者的测试类信息
    pub fn info(&self) -> TestClassInfo {
        TestClassInfo {
            id: self.id,
            name: self.name.clone(),
            lineage: self.lineage().map(|class| class.name.clone()).collect(),
        }
    }

    /// 资源提供者工厂，从子类到基类
    pub fn provider_factories(&self) -> Vec<Arc<dyn ResourceProviderFactory>> {
        self.lineage()
            .flat_map(|class| class.providers.iter().cloned())
            .collect()
    }

    /// 收集数据初始化方法，从基类到子类
    ///
    /// 每一层最多允许声明一个。
    pub fn collect_data_setups(&self) -> ConfigResult<Vec<DataSetup>> {
        let mut levels: Vec<&TestClass> = self.lineage().collect();
        levels.reverse();

        let mut setups = Vec::new();
        for class in levels {
            match class.data_setups.as_slice() {
                [] => {}
                [setup] => setups.push(setup.clone()),
                many => {
                    return Err(ConfigError::DuplicateDataSetup {
                        class: class.name.clone(),
                        count: many.len(),
                    })
                }
            }
        }
        Ok(setups)
    }
}

impl fmt::Debug for TestClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestClass")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.name.as_str()))
            .field("providers", &self.providers.len())
            .field("data_setups", &self.data_setups)
            .finish()
    }
}

/// 测试类构建器
pub struct TestClassBuilder {
    name: String,
    parent: Option<Arc<TestClass>>,
    providers: Vec<Arc<dyn ResourceProviderFactory>>,
    data_setups: Vec<DataSetup>,
}

impl TestClassBuilder {
    /// 设置父测试类
    pub fn extends(mut self, parent: Arc<TestClass>) -> Self {
        self.parent = Some(parent);
        self
    }

    /// 声明资源提供者工厂
    pub fn resource_provider(mut self, factory: impl ResourceProviderFactory + 'static) -> Self {
        self.providers.push(Arc::new(factory));
        self
    }

    /// 声明一次性数据初始化方法
    pub fn data_setup<F>(mut self, name: impl Into<String>, run: F) -> Self
    where
        F: Fn(&SetupContext<'_>) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.data_setups.push(DataSetup {
            class: self.name.clone(),
            name: name.into(),
            run: Arc::new(run),
        });
        self
    }

    /// 构建测试类
    pub fn build(self) -> Arc<TestClass> {
        Arc::new(TestClass {
            id: Uuid::new_v4(),
            name: self.name,
            parent: self.parent,
            providers: self.providers,
            data_setups: self.data_setups,
        })
    }
}
