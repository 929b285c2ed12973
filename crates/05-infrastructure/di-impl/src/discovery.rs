//! 组件单元发现
//!
//! 扫描进程内的组件单元，筛选出相关单元并构建 [`ComponentRegistry`]。
//! 扫描结果在首次调用时计算并缓存，之后的调用只读取已发布的值。

use crate::archive::{ComponentUnit, COMPONENT_UNITS};
use crate::registry::ComponentRegistry;
use infrastructure_common::ContainerConfig;
use once_cell::sync::{Lazy, OnceCell};
use rayon::prelude::*;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// 组件单元来源
pub trait UnitSource: Send + Sync {
    /// 列出所有候选组件单元
    fn units(&self) -> Vec<ComponentUnit>;
}

impl<F> UnitSource for F
where
    F: Fn() -> Vec<ComponentUnit> + Send + Sync,
{
    fn units(&self) -> Vec<ComponentUnit> {
        self()
    }
}

/// 链接期登记的组件单元
#[derive(Debug, Default, Clone, Copy)]
pub struct LinkedUnitSource;

impl UnitSource for LinkedUnitSource {
    fn units(&self) -> Vec<ComponentUnit> {
        COMPONENT_UNITS.iter().map(|unit| unit()).collect()
    }
}

/// 组件单元发现器
pub struct ArchiveDiscovery {
    source: Box<dyn UnitSource>,
    parallel: bool,
    registry: OnceCell<Arc<ComponentRegistry>>,
    scans: AtomicUsize,
}

impl ArchiveDiscovery {
    /// 创建发现器
    pub fn new(source: impl UnitSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            parallel: true,
            registry: OnceCell::new(),
            scans: AtomicUsize::new(0),
        }
    }

    /// 基于链接期登记的组件单元创建发现器
    pub fn linked() -> Self {
        Self::new(LinkedUnitSource)
    }

    /// 应用容器配置
    pub fn with_config(mut self, config: &ContainerConfig) -> Self {
        self.parallel = config.parallel_discovery;
        self
    }

    /// 设置是否并行扫描
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// 发现组件并返回注册表
    pub fn discover(&self) -> Arc<ComponentRegistry> {
        self.registry
            .get_or_init(|| Arc::new(self.scan()))
            .clone()
    }

    /// 是否已经完成扫描
    pub fn is_discovered(&self) -> bool {
        self.registry.get().is_some()
    }

    /// 实际执行扫描的次数
    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    fn scan(&self) -> ComponentRegistry {
        self.scans.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();

        let units = dedupe(self.source.units());
        let total = units.len();
        info!("开始扫描组件单元: {} 个候选 (并行: {})", total, self.parallel);

        let relevant: Vec<ComponentUnit> = if self.parallel {
            units.into_par_iter().filter(ComponentUnit::relevant).collect()
        } else {
            units.into_iter().filter(ComponentUnit::relevant).collect()
        };

        info!(
            "组件单元扫描完成: 保留 {}/{} 个, 耗时 {:?}",
            relevant.len(),
            total,
            started.elapsed()
        );

        ComponentRegistry::from_units(relevant)
    }
}

impl std::fmt::Debug for ArchiveDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveDiscovery")
            .field("parallel", &self.parallel)
            .field("discovered", &self.is_discovered())
            .field("scans", &self.scan_count())
            .finish()
    }
}

fn dedupe(units: Vec<ComponentUnit>) -> Vec<ComponentUnit> {
    let mut seen = HashSet::new();
    units
        .into_iter()
        .filter(|unit| {
            let fresh = seen.insert(unit.id().to_string());
            if !fresh {
                debug!("忽略重复的组件单元: {}", unit.id());
            }
            fresh
        })
        .collect()
}

static GLOBAL_DISCOVERY: Lazy<ArchiveDiscovery> = Lazy::new(|| {
    let config = ContainerConfig::load().unwrap_or_else(|e| {
        warn!("容器配置加载失败，使用默认配置: {}", e);
        ContainerConfig::default()
    });
    ArchiveDiscovery::linked().with_config(&config)
});

/// 进程级组件单元发现器
pub fn global_discovery() -> &'static ArchiveDiscovery {
    &GLOBAL_DISCOVERY
}

/// 进程级组件注册表，首次调用时扫描链接期登记的组件单元
pub fn global_registry() -> Arc<ComponentRegistry> {
    GLOBAL_DISCOVERY.discover()
}
