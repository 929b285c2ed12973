//! 组件生命周期管理

use crate::errors::{BoxError, CleanupError, ReleaseFailure};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

/// 会话式组件的实例数量策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Multiplicity {
    /// 单例模式 - 整个进程生命周期内只创建一个实例
    Singleton,
    /// 按查找创建 - 每次获取都创建新实例
    PerLookup,
}

impl Default for Multiplicity {
    fn default() -> Self {
        Self::PerLookup
    }
}

/// 作用域层级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeLevel {
    /// 进程级
    Process,
    /// 测试类级
    TestClass,
    /// 测试实例级
    TestInstance,
}

/// 组件作用域
#[derive(Debug, Clone)]
pub struct Scope {
    pub id: uuid::Uuid,
    pub name: String,
    pub level: ScopeLevel,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Scope {
    /// 创建新作用域
    pub fn new(name: impl Into<String>, level: ScopeLevel) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            name: name.into(),
            level,
            created_at: chrono::Utc::now(),
        }
    }

    /// 创建子作用域
    pub fn child(&self, name: impl Into<String>, level: ScopeLevel) -> Self {
        Self::new(format!("{}.{}", self.name, name.into()), level)
    }
}

/// 测试实例生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    /// 已准备：资源已获取，注入已完成
    Prepared,
    /// 运行中
    Running,
    /// 已关闭
    ShutDown,
}

type ReleaseFn = Box<dyn FnOnce() -> Result<(), BoxError> + Send>;

/// 释放动作
pub struct ReleaseAction {
    name: String,
    action: ReleaseFn,
}

impl ReleaseAction {
    /// 创建释放动作
    pub fn new<F>(name: impl Into<String>, action: F) -> Self
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        Self {
            name: name.into(),
            action: Box::new(action),
        }
    }

    /// 动作名称
    pub fn name(&self) -> &str {
        &self.name
    }

    fn run(self) -> Result<(), ReleaseFailure> {
        let Self { name, action } = self;
        match panic::catch_unwind(AssertUnwindSafe(action)) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(ReleaseFailure {
                action: name,
                source,
            }),
            Err(payload) => Err(ReleaseFailure {
                action: name,
                source: panic_message(payload.as_ref()).into(),
            }),
        }
    }
}

impl std::fmt::Debug for ReleaseAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleaseAction")
            .field("name", &self.name)
            .field("action", &"<function>")
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("释放动作 panic: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("释放动作 panic: {message}")
    } else {
        "释放动作 panic".to_string()
    }
}

/// 释放动作栈
///
/// 按后进先出顺序执行；单个动作失败（或 panic）不会阻止其余动作执行，
/// 所有失败在最后汇总为 [`CleanupError`]。
#[derive(Debug, Default)]
pub struct ReleaseStack {
    actions: Mutex<Vec<ReleaseAction>>,
}

impl ReleaseStack {
    /// 创建空的释放动作栈
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录释放动作
    pub fn push<F>(&self, name: impl Into<String>, action: F)
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        self.actions.lock().push(ReleaseAction::new(name, action));
    }

    /// 已记录的动作数量
    pub fn len(&self) -> usize {
        self.actions.lock().len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.actions.lock().is_empty()
    }

    /// 执行并清空所有释放动作
    pub fn drain(&self) -> Result<(), CleanupError> {
        let actions = std::mem::take(&mut *self.actions.lock());
        let mut failures = Vec::new();

        for action in actions.into_iter().rev() {
            debug!("执行释放动作: {}", action.name());
            if let Err(failure) = action.run() {
                warn!("释放动作失败: {}", failure);
                failures.push(failure);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CleanupError { failures })
        }
    }
}
