//! # Test Container
//!
//! 测试作用域组件容器：为每个测试类执行一次性数据初始化，
//! 为每个测试实例完成注入并在结束时释放所获取的资源。
//!
//! ## 使用方式
//!
//! 1. 通过 [`TestClass::builder`] 声明测试类、资源提供者与数据初始化方法
//! 2. 通过 [`TestSetup::builder`] 创建测试准备器（可选迁移器与替换插件）
//! 3. 调用 [`TestSetup::prepare_test_instance`] 得到 [`TestInstanceScope`]
//! 4. 测试结束后调用 [`TestInstanceScope::shutdown`]，测试类结束后调用
//!    [`TestSetup::finish_class`]
//!
//! ## 解析顺序
//!
//! 测试替身优先于会话式组件，会话式组件优先于普通托管组件。

pub mod class;
pub mod instance;
pub mod resolver;
pub mod setup;

pub use class::{DataSetup, DataSetupFn, TestClass, TestClassBuilder};
pub use instance::TestInstanceScope;
pub use resolver::ScopedResolver;
pub use setup::{ClassPhase, SetupContext, TestSetup, TestSetupBuilder};
