//! 会话式组件生命周期桥接
//!
//! 每个会话式组件描述对应一个实例工厂，实例数量策略以数据形式保存在工厂表中。
//! 单例的首次创建登记在等待图中，互相引用的单例在不同线程上同时首次创建时
//! 返回循环依赖错误。

use crate::archive::SessionComponentDescriptor;
use crate::discovery::global_registry;
use crate::registry::ComponentRegistry;
use di_abstractions::ResolutionContext;
use infrastructure_common::{
    BoxError, DependencyError, DependencyResult, Instance, Multiplicity, TypeInfo,
};
use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::{debug, info, warn};

/// 会话式组件注入函数
pub type SessionInjector<'a> =
    &'a dyn Fn(&Instance, &mut ResolutionContext) -> DependencyResult<()>;

enum SingletonSlot {
    Empty,
    Creating(ThreadId),
    Ready(Instance),
}

struct InstanceFactory {
    descriptor: SessionComponentDescriptor,
    slot: Mutex<SingletonSlot>,
    ready: Condvar,
}

impl InstanceFactory {
    fn new(descriptor: SessionComponentDescriptor) -> Self {
        Self {
            descriptor,
            slot: Mutex::new(SingletonSlot::Empty),
            ready: Condvar::new(),
        }
    }

    fn create(
        &self,
        injector: SessionInjector<'_>,
        ctx: &mut ResolutionContext,
    ) -> DependencyResult<Instance> {
        let class = self.descriptor.bean_class();
        let instance = class.instantiate()?;

        injector(&instance, ctx).map_err(|e| wrap_failure(class.type_info(), e))?;
        instance
            .post_construct()
            .map_err(|e| DependencyError::creation_failed(class.type_info().to_string(), e))?;

        debug!("会话组件实例已创建: {}", class.type_info().short_name());
        Ok(instance)
    }
}

// 循环依赖保持原样向上传播，便于调用方识别
fn wrap_failure(bean: &TypeInfo, error: DependencyError) -> DependencyError {
    match error {
        DependencyError::CircularDependency { .. } => error,
        other => DependencyError::creation_failed(bean.to_string(), other),
    }
}

/// 单例创建等待图
#[derive(Default)]
struct WaitGraph {
    creators: HashMap<TypeId, ThreadId>,
    waiting: HashMap<ThreadId, TypeInfo>,
}

impl WaitGraph {
    /// 从目标组件的创建线程出发沿等待关系前进，回到当前线程即构成循环
    ///
    /// 返回的链以目标组件开头，以当前线程正在创建的组件结尾。
    fn cycle_through(&self, wanted: &TypeInfo, me: ThreadId) -> Option<Vec<TypeInfo>> {
        let mut chain = vec![wanted.clone()];
        let mut current = wanted.id;

        while let Some(owner) = self.creators.get(&current) {
            if *owner == me {
                return Some(chain);
            }
            let next = self.waiting.get(owner)?;
            if chain.iter().any(|seen| seen.id == next.id) {
                return None;
            }
            chain.push(next.clone());
            current = next.id;
        }
        None
    }
}

fn cycle_error(chain: &[TypeInfo]) -> DependencyError {
    let names: Vec<&str> = chain.iter().map(TypeInfo::short_name).collect();
    let closing = names.last().copied().unwrap_or_default();
    DependencyError::CircularDependency {
        dependency_chain: format!("{} -> {}", closing, names.join(" -> ")),
    }
}

// 正在进行的单例创建；未正常完成时（包括 panic）把槽位恢复为空并唤醒等待者
struct Creation<'b> {
    bridge: &'b SessionBridge,
    factory: &'b InstanceFactory,
    finished: bool,
}

impl Creation<'_> {
    fn finish(mut self, instance: Option<Instance>) {
        self.finished = true;
        self.complete(instance);
    }

    fn complete(&self, instance: Option<Instance>) {
        let mut slot = self.factory.slot.lock();
        *slot = match instance {
            Some(instance) => SingletonSlot::Ready(instance),
            None => SingletonSlot::Empty,
        };
        self.bridge
            .waits
            .lock()
            .creators
            .remove(&self.factory.descriptor.type_info().id);
        drop(slot);
        self.factory.ready.notify_all();
    }
}

impl Drop for Creation<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.complete(None);
        }
    }
}

/// 会话式组件桥接器
pub struct SessionBridge {
    factories: HashMap<TypeId, InstanceFactory>,
    waits: Mutex<WaitGraph>,
}

impl SessionBridge {
    /// 为注册表中的每个会话式组件描述创建实例工厂
    pub fn new(registry: &ComponentRegistry) -> Self {
        let factories: HashMap<_, _> = registry
            .session_descriptors()
            .iter()
            .map(|descriptor| {
                (
                    descriptor.type_info().id,
                    InstanceFactory::new(descriptor.clone()),
                )
            })
            .collect();

        info!("会话组件桥接器初始化完成: {} 个实例工厂", factories.len());
        Self {
            factories,
            waits: Mutex::new(WaitGraph::default()),
        }
    }

    /// 实例工厂数量
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// 是否没有任何实例工厂
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// 按组件类型查找描述
    pub fn descriptor_for(&self, bean: &TypeInfo) -> Option<&SessionComponentDescriptor> {
        self.factories.get(&bean.id).map(|factory| &factory.descriptor)
    }

    /// 单例是否已创建
    pub fn is_singleton_created(&self, bean: &TypeInfo) -> bool {
        self.factories
            .get(&bean.id)
            .is_some_and(|factory| matches!(*factory.slot.lock(), SingletonSlot::Ready(_)))
    }

    /// 获取会话式组件实例
    ///
    /// 单例在首次获取时创建，并发首次获取只会创建一个实例；
    /// 按查找创建的组件每次都构造新实例并完整注入。
    /// 组件类型在等待单例之前登记到解析链，因此同线程的循环引用会立即失败；
    /// 跨线程的循环引用由等待图检测。
    pub fn acquire(
        &self,
        descriptor: &SessionComponentDescriptor,
        injector: SessionInjector<'_>,
        ctx: &mut ResolutionContext,
    ) -> DependencyResult<Instance> {
        let bean = descriptor.type_info();
        let factory =
            self.factories
                .get(&bean.id)
                .ok_or_else(|| DependencyError::ComponentNotRegistered {
                    type_name: bean.to_string(),
                })?;

        ctx.enter(bean, |ctx| match factory.descriptor.multiplicity() {
            Multiplicity::Singleton => self.acquire_singleton(factory, injector, ctx),
            Multiplicity::PerLookup => factory.create(injector, ctx),
        })
    }

    fn acquire_singleton(
        &self,
        factory: &InstanceFactory,
        injector: SessionInjector<'_>,
        ctx: &mut ResolutionContext,
    ) -> DependencyResult<Instance> {
        let bean = factory.descriptor.type_info();
        let me = thread::current().id();

        let mut slot = factory.slot.lock();
        loop {
            let owner = match &*slot {
                SingletonSlot::Ready(instance) => return Ok(instance.clone()),
                SingletonSlot::Empty => break,
                SingletonSlot::Creating(owner) => *owner,
            };

            let mut waits = self.waits.lock();
            if let Some(chain) = waits.cycle_through(bean, me) {
                let error = cycle_error(&chain);
                warn!("检测到跨线程循环依赖: {}", error);
                return Err(error);
            }
            waits.waiting.insert(me, bean.clone());
            drop(waits);

            debug!("等待线程 {:?} 创建单例: {}", owner, bean.short_name());
            factory.ready.wait(&mut slot);
            self.waits.lock().waiting.remove(&me);
        }

        *slot = SingletonSlot::Creating(me);
        self.waits.lock().creators.insert(bean.id, me);
        drop(slot);

        let creation = Creation {
            bridge: self,
            factory,
            finished: false,
        };
        info!("创建单例会话组件: {}", bean.short_name());
        let result = factory.create(injector, ctx);
        creation.finish(result.as_ref().ok().cloned());
        result
    }

    /// 释放会话式组件实例
    ///
    /// 单例随进程存在，释放为空操作；按查找创建的实例执行销毁前回调。
    pub fn release(
        &self,
        descriptor: &SessionComponentDescriptor,
        instance: &Instance,
    ) -> Result<(), BoxError> {
        match descriptor.multiplicity() {
            Multiplicity::Singleton => Ok(()),
            Multiplicity::PerLookup => {
                debug!("释放会话组件实例: {}", descriptor.type_info().short_name());
                instance.pre_destroy()
            }
        }
    }
}

impl std::fmt::Debug for SessionBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBridge")
            .field("factories", &self.factories.len())
            .finish()
    }
}

static GLOBAL_BRIDGE: Lazy<Arc<SessionBridge>> =
    Lazy::new(|| Arc::new(SessionBridge::new(&global_registry())));

/// 进程级会话式组件桥接器
pub fn global_bridge() -> Arc<SessionBridge> {
    GLOBAL_BRIDGE.clone()
}
