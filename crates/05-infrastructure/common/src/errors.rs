//! 错误类型定义

use std::fmt;
use thiserror::Error;

/// 外部协作者返回的通用错误
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置解析失败: {source}")]
    ParseError { source: BoxError },

    #[error("配置验证失败: {message}")]
    ValidationError { message: String },

    #[error("测试类 {class} 在同一层级声明了 {count} 个一次性数据初始化方法，最多允许 1 个")]
    DuplicateDataSetup { class: String, count: usize },

    #[error("资源名称存在歧义: {name}, 同时由 {providers:?} 提供")]
    AmbiguousResource { name: String, providers: Vec<String> },

    #[error("日志初始化失败: {message}")]
    LoggingInitFailed { message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(source: config::ConfigError) -> Self {
        Self::ParseError {
            source: Box::new(source),
        }
    }
}

/// 依赖注入错误类型
#[derive(Error, Debug)]
pub enum DependencyError {
    #[error("组件未注册: {type_name}")]
    ComponentNotRegistered { type_name: String },

    #[error("组件创建失败: {type_name}, 原因: {source}")]
    ComponentCreationFailed { type_name: String, source: BoxError },

    #[error("循环依赖检测到: {dependency_chain}")]
    CircularDependency { dependency_chain: String },

    #[error("组件解析存在歧义: {type_name}, 候选: {candidates:?}")]
    AmbiguousComponent {
        type_name: String,
        candidates: Vec<String>,
    },

    #[error("依赖解析失败: {type_name}, 原因: {message}")]
    DependencyResolutionFailed { type_name: String, message: String },

    #[error("必需的注入点无法满足: {owner}.{field} ({target})")]
    UnsatisfiedInjectionPoint {
        owner: String,
        field: String,
        target: String,
    },

    #[error("组件 {owner} 不接受注入点: {field}")]
    UnknownInjectionPoint { owner: String, field: String },

    #[error("注入值类型不匹配: {field}, 期望 {expected}, 实际 {actual}")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("资源不可用: {name}, 原因: {source}")]
    ResourceUnavailable { name: String, source: ResourceError },
}

impl DependencyError {
    /// 创建组件创建失败错误
    pub fn creation_failed(type_name: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::ComponentCreationFailed {
            type_name: type_name.into(),
            source: source.into(),
        }
    }
}

/// 资源提供者错误类型
#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("资源提供者创建失败: {provider}, 原因: {source}")]
    ProviderCreationFailed { provider: String, source: BoxError },

    #[error("资源解析失败: {name}, 原因: {source}")]
    ResolutionFailed { name: String, source: BoxError },

    #[error("测试类 {class} 已结束，资源注册表不再提供资源")]
    RegistryClosed { class: String },

    #[error("资源配置错误: {source}")]
    Configuration {
        #[from]
        source: ConfigError,
    },
}

/// 生命周期管理错误类型
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("测试类初始化失败: {class}, 步骤: {step}, 原因: {source}")]
    SetupFailed {
        class: String,
        step: String,
        source: BoxError,
    },

    #[error("数据源迁移失败: {class}, 原因: {source}")]
    MigrationFailed { class: String, source: BoxError },

    #[error("替换插件执行失败: {plugin}, 原因: {source}")]
    PluginFailed { plugin: String, source: BoxError },
}

/// 单个释放动作的失败记录
#[derive(Debug)]
pub struct ReleaseFailure {
    /// 释放动作名称
    pub action: String,
    /// 失败原因
    pub source: BoxError,
}

impl fmt::Display for ReleaseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.action, self.source)
    }
}

impl std::error::Error for ReleaseFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// 清理错误：所有释放动作都执行完毕后汇总的失败集合
#[derive(Error, Debug)]
#[error("清理过程中有 {} 个释放动作失败: {}", .failures.len(), summarize(.failures))]
pub struct CleanupError {
    /// 失败记录，按执行顺序排列
    pub failures: Vec<ReleaseFailure>,
}

impl CleanupError {
    /// 合并多个清理结果，全部成功时返回 `Ok`
    pub fn merge(results: impl IntoIterator<Item = Result<(), Self>>) -> Result<(), Self> {
        let failures: Vec<ReleaseFailure> = results
            .into_iter()
            .filter_map(Result::err)
            .flat_map(|error| error.failures)
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Self { failures })
        }
    }

    /// 失败的释放动作名称
    pub fn actions(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.action.as_str()).collect()
    }
}

fn summarize(failures: &[ReleaseFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// 容器错误类型
#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("配置错误: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("依赖注入错误: {source}")]
    Dependency {
        #[from]
        source: DependencyError,
    },

    #[error("资源错误: {source}")]
    Resource {
        #[from]
        source: ResourceError,
    },

    #[error("生命周期错误: {source}")]
    Lifecycle {
        #[from]
        source: LifecycleError,
    },

    #[error("清理错误: {source}")]
    Cleanup {
        #[from]
        source: CleanupError,
    },
}

/// 结果类型别名
pub type ConfigResult<T> = Result<T, ConfigError>;
pub type DependencyResult<T> = Result<T, DependencyError>;
pub type ResourceResult<T> = Result<T, ResourceError>;
pub type LifecycleResult<T> = Result<T, LifecycleError>;
pub type ContainerResult<T> = Result<T, ContainerError>;
