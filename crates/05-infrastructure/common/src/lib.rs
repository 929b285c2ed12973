//! # Infrastructure Common
//!
//! 这个 crate 提供了测试作用域组件容器的公共类型与工具。
//!
//! ## 核心组件
//!
//! - [`TypeInfo`] - 基于 `TypeId` 的类型信息
//! - [`Instance`] - 类型擦除的共享组件实例，携带可赋值视图表
//! - [`Injectable`] - 字段注入与生命周期回调
//! - [`ReleaseStack`] - 后进先出、失败隔离的释放动作栈
//! - [`ContainerConfig`] - 容器配置与日志初始化
//!
//! ## 设计原则
//!
//! - 基于 Rust 类型系统表达"可赋值"关系，不依赖运行时反射
//! - 错误统一使用 `thiserror` 定义
//! - 约定优于配置

pub mod component;
pub mod configuration;
pub mod errors;
pub mod lifecycle;
pub mod metadata;

pub use component::*;
pub use configuration::*;
pub use errors::*;
pub use lifecycle::*;
pub use metadata::*;
