//! 测试类级资源注册表
//!
//! 按测试类保存资源提供者链。提供者在首次需要时按顺序创建，
//! 解析结果按资源名称缓存，直到 [`ResourceRegistry::cleanup`] 被调用。

use di_abstractions::{ResourceLookup, ResourceProvider, ResourceProviderFactory, TestClassInfo};
use infrastructure_common::{
    CleanupError, ConfigError, InjectionPoint, Instance, ReleaseStack, ResourceError,
    ResourceResult,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 资源注册表状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryState {
    /// 提供者尚未创建
    Uninitialized,
    /// 提供者已创建
    Ready,
}

struct ProviderChain {
    providers: Vec<Arc<dyn ResourceProvider>>,
    handles: HashMap<String, Instance>,
}

/// 资源注册表
pub struct ResourceRegistry {
    class: TestClassInfo,
    factories: Vec<Arc<dyn ResourceProviderFactory>>,
    chain: Mutex<Option<ProviderChain>>,
    builds: AtomicUsize,
    closed: AtomicBool,
}

impl ResourceRegistry {
    /// 创建资源注册表，工厂按从子类到基类的顺序排列
    pub fn new(class: TestClassInfo, factories: Vec<Arc<dyn ResourceProviderFactory>>) -> Self {
        Self {
            class,
            factories,
            chain: Mutex::new(None),
            builds: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// 所属测试类
    pub fn class(&self) -> &TestClassInfo {
        &self.class
    }

    /// 当前状态
    pub fn state(&self) -> RegistryState {
        if self.chain.lock().is_some() {
            RegistryState::Ready
        } else {
            RegistryState::Uninitialized
        }
    }

    /// 是否已关闭
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// 提供者链被构建的次数
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    /// 确保提供者链已创建
    pub fn initialize(&self) -> ResourceResult<()> {
        let mut slot = self.chain.lock();
        self.ensure(&mut slot)?;
        Ok(())
    }

    /// 解析资源注入点，所有提供者都无法提供时返回 `None`
    pub fn resolve(&self, point: &InjectionPoint) -> ResourceResult<Option<Instance>> {
        let Some(name) = point.resource_name() else {
            return Ok(None);
        };

        let mut slot = self.chain.lock();
        let chain = self.ensure(&mut slot)?;

        if let Some(handle) = chain.handles.get(name) {
            return Ok(Some(handle.clone()));
        }

        for provider in &chain.providers {
            if let Some(handle) = provider.resolve(point)? {
                debug!("资源 {} 由 {} 提供", name, provider.name());
                chain.handles.insert(name.to_string(), handle.clone());
                return Ok(Some(handle));
            }
        }

        debug!("资源 {} 没有提供者 (测试类 {})", name, self.class.name);
        Ok(None)
    }

    /// 释放所有已创建的提供者并清空缓存
    ///
    /// 每个提供者只释放一次；之后的解析会重新创建提供者链。
    pub fn cleanup(&self) -> Result<(), CleanupError> {
        let Some(chain) = self.chain.lock().take() else {
            return Ok(());
        };

        info!(
            "清理测试类 {} 的 {} 个资源提供者",
            self.class.name,
            chain.providers.len()
        );
        release_providers(chain.providers)
    }

    /// 关闭注册表并释放提供者
    ///
    /// 关闭与提供者链的创建在同一把锁内判定，关闭后的解析返回
    /// [`ResourceError::RegistryClosed`]，不会再创建无人释放的提供者。
    pub fn close(&self) -> Result<(), CleanupError> {
        let chain = {
            let mut slot = self.chain.lock();
            self.closed.store(true, Ordering::SeqCst);
            slot.take()
        };
        debug!("资源注册表已关闭: {}", self.class.name);

        match chain {
            Some(chain) => release_providers(chain.providers),
            None => Ok(()),
        }
    }

    fn ensure<'s>(&self, slot: &'s mut Option<ProviderChain>) -> ResourceResult<&'s mut ProviderChain> {
        let chain = match slot.take() {
            Some(chain) => chain,
            None if self.is_closed() => {
                return Err(ResourceError::RegistryClosed {
                    class: self.class.name.clone(),
                })
            }
            None => self.build()?,
        };
        Ok(slot.insert(chain))
    }

    fn build(&self) -> ResourceResult<ProviderChain> {
        let mut providers: Vec<Arc<dyn ResourceProvider>> = Vec::new();
        let mut owners: HashMap<String, String> = HashMap::new();

        for factory in &self.factories {
            let provider = match factory.create(&self.class) {
                Ok(provider) => provider,
                Err(source) => {
                    discard(providers);
                    return Err(ResourceError::ProviderCreationFailed {
                        provider: factory.name().to_string(),
                        source,
                    });
                }
            };
            debug!("创建资源提供者 {} (测试类 {})", provider.name(), self.class.name);

            for name in provider.provided_names() {
                if let Some(existing) = owners.get(&name) {
                    let providers_of_name = vec![existing.clone(), provider.name().to_string()];
                    providers.push(provider);
                    discard(providers);
                    return Err(ConfigError::AmbiguousResource {
                        name,
                        providers: providers_of_name,
                    }
                    .into());
                }
                owners.insert(name, provider.name().to_string());
            }
            providers.push(provider);
        }

        self.builds.fetch_add(1, Ordering::SeqCst);
        info!(
            "测试类 {} 的资源提供者链已创建: {} 个提供者",
            self.class.name,
            providers.len()
        );

        Ok(ProviderChain {
            providers,
            handles: HashMap::new(),
        })
    }
}

impl ResourceLookup for ResourceRegistry {
    fn lookup(&self, name: &str) -> ResourceResult<Option<Instance>> {
        self.resolve(&InjectionPoint::resource_named(name))
    }
}

impl std::fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("class", &self.class.name)
            .field("factories", &self.factories.len())
            .field("state", &self.state())
            .field("builds", &self.build_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn release_providers(providers: Vec<Arc<dyn ResourceProvider>>) -> Result<(), CleanupError> {
    let releases = ReleaseStack::new();
    for provider in providers {
        let name = format!("{}::cleanup", provider.name());
        releases.push(name, move || provider.cleanup());
    }
    releases.drain()
}

// 构建失败时释放已经创建的提供者
fn discard(providers: Vec<Arc<dyn ResourceProvider>>) {
    if let Err(error) = release_providers(providers) {
        warn!("释放未完成的资源提供者链失败: {}", error);
    }
}
