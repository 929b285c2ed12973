//! # 依赖注入具体实现
//!
//! 提供组件单元发现、组件注册表、会话式组件桥接、测试替身替换
//! 以及测试类级资源注册表的实现。
//!
//! ## 数据流
//!
//! [`ArchiveDiscovery`] → [`ComponentRegistry`] → [`SessionBridge`] / [`ResourceRegistry`]，
//! 由 [`ReplacementManager`] 包装后交给测试容器驱动。

pub mod archive;
pub mod discovery;
pub mod engine;
pub mod injection;
pub mod registry;
pub mod replacement;
pub mod resource;
pub mod session;

pub use archive::*;
pub use discovery::*;
pub use engine::*;
pub use injection::*;
pub use registry::*;
pub use replacement::*;
pub use resource::*;
pub use session::*;
