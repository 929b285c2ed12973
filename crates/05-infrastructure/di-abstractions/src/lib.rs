//! # Dependency Injection Abstractions
//!
//! 依赖注入抽象层，定义测试容器与外部协作者之间的接口。
//!
//! ## 核心接口
//!
//! - [`Resolver`] - 注入点解析入口
//! - [`ResolutionEngine`] - 普通托管组件的创建与注入引擎
//! - [`ResourceProvider`] / [`ResourceProviderFactory`] - 命名资源提供者
//! - [`DataSourceMigrator`] - 测试类级数据源迁移
//! - [`ReplacementPlugin`] - 测试替身（mock/stub）提供插件

pub mod factory;
pub mod plugin;
pub mod resolver;
pub mod resource;

pub use factory::*;
pub use plugin::*;
pub use resolver::*;
pub use resource::*;
