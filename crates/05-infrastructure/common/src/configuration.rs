//! 容器配置与日志初始化

use crate::errors::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// 默认配置文件（可选）
const DEFAULT_CONFIG_FILE: &str = "config/test-container";

/// 环境变量前缀
const ENV_PREFIX: &str = "TEST_CONTAINER";

/// 容器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// 是否并行扫描组件单元
    pub parallel_discovery: bool,
    /// 最大解析深度
    pub max_resolution_depth: usize,
    /// 日志配置
    pub logging: LoggingConfig,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            parallel_discovery: true,
            max_resolution_depth: 64,
            logging: LoggingConfig::default(),
        }
    }
}

impl ContainerConfig {
    /// 从默认配置文件与环境变量加载配置
    pub fn load() -> ConfigResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(DEFAULT_CONFIG_FILE).required(false))
            .add_source(environment())
            .build()?;

        Self::finish(settings)
    }

    /// 从指定配置文件加载配置，环境变量仍然优先
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        debug!("加载容器配置文件: {}", path.display());

        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(true))
            .add_source(environment())
            .build()?;

        Self::finish(settings)
    }

    fn finish(settings: config::Config) -> ConfigResult<Self> {
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_resolution_depth == 0 {
            return Err(ConfigError::ValidationError {
                message: "max_resolution_depth 必须大于 0".to_string(),
            });
        }
        self.logging.filter()?;
        Ok(())
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志过滤指令，例如 `info` 或 `di_impl=debug`
    pub level: String,
    /// 是否显示目标
    pub show_target: bool,
    /// 是否显示线程ID
    pub show_thread_ids: bool,
    /// 是否使用 JSON 格式
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            show_target: true,
            show_thread_ids: false,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// 创建开发环境日志配置
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            show_target: true,
            show_thread_ids: true,
            json_format: false,
        }
    }

    fn filter(&self) -> ConfigResult<EnvFilter> {
        EnvFilter::try_new(&self.level).map_err(|e| ConfigError::ValidationError {
            message: format!("无效的日志级别 {}: {}", self.level, e),
        })
    }
}

/// 初始化日志系统
///
/// 全局订阅者只能设置一次，重复调用返回 [`ConfigError::LoggingInitFailed`]。
pub fn init_logging(config: &LoggingConfig) -> ConfigResult<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(config.filter()?)
        .with_target(config.show_target)
        .with_thread_ids(config.show_thread_ids);

    if config.json_format {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    }
    .map_err(|e| ConfigError::LoggingInitFailed {
        message: e.to_string(),
    })?;

    info!("日志系统初始化完成");
    Ok(())
}
