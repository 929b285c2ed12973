//! di-impl 集成测试：链接期登记的组件单元、进程级注册表与会话式组件桥接
use di_abstractions::ResolutionContext;
use di_impl::{
    global_bridge, global_discovery, global_registry, ComponentClass, ComponentUnit,
    ReplacementManager, ReplacementSet, SessionComponentDescriptor, COMPONENT_UNITS,
};
use infrastructure_common::{
    BoxError, DependencyResult, Injectable, Instance, Multiplicity, TypeInfo,
};
use linkme::distributed_slice;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

trait Repository: Send + Sync {
    fn kind(&self) -> &'static str;
}

#[derive(Default)]
struct OrderRepository;

impl Repository for OrderRepository {
    fn kind(&self) -> &'static str {
        "orders"
    }
}

impl Injectable for OrderRepository {}

struct InMemoryRepository;

impl Repository for InMemoryRepository {
    fn kind(&self) -> &'static str {
        "memory"
    }
}

impl Injectable for InMemoryRepository {}

#[derive(Default)]
struct PlainService;
impl Injectable for PlainService {}

static SEQUENCE_CREATED: AtomicUsize = AtomicUsize::new(0);

struct Sequence {
    serial: usize,
}

impl Default for Sequence {
    fn default() -> Self {
        Self {
            serial: SEQUENCE_CREATED.fetch_add(1, Ordering::SeqCst),
        }
    }
}

impl Injectable for Sequence {}

#[derive(Default)]
struct RequestContext {
    destroyed: AtomicUsize,
}

impl Injectable for RequestContext {
    fn pre_destroy(&self) -> Result<(), BoxError> {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[distributed_slice(COMPONENT_UNITS)]
static ORDERS_UNIT: fn() -> ComponentUnit = orders_unit;

#[distributed_slice(COMPONENT_UNITS)]
static ORDERS_UNIT_COPY: fn() -> ComponentUnit = orders_unit;

#[distributed_slice(COMPONENT_UNITS)]
static PLAIN_UNIT: fn() -> ComponentUnit = plain_unit;

#[distributed_slice(COMPONENT_UNITS)]
static BROKEN_UNIT: fn() -> ComponentUnit = broken_unit;

fn orders_unit() -> ComponentUnit {
    ComponentUnit::new("orders")
        .with_beans_marker()
        .with_class(
            ComponentClass::builder(|| Ok(OrderRepository))
                .expose::<dyn Repository>(|v| v as Arc<dyn Repository>)
                .build(),
        )
        .with_session_descriptors(|| {
            Ok(vec![
                SessionComponentDescriptor::singleton(ComponentClass::of::<Sequence>()),
                SessionComponentDescriptor::per_lookup(ComponentClass::of::<RequestContext>()),
            ])
        })
}

fn plain_unit() -> ComponentUnit {
    ComponentUnit::new("plain").with_class(ComponentClass::of::<PlainService>())
}

fn broken_unit() -> ComponentUnit {
    ComponentUnit::new("broken")
        .with_beans_marker()
        .with_session_descriptors(|| Err("元数据格式错误".into()))
}

fn no_injection(_: &Instance, _: &mut ResolutionContext) -> DependencyResult<()> {
    Ok(())
}

#[test]
fn test_global_registry_keeps_relevant_units_only() {
    let registry = global_registry();

    assert_eq!(registry.unit_ids(), vec!["orders"]);
    assert!(registry
        .find_class(&TypeInfo::of::<dyn Repository>())
        .unwrap()
        .is_some());
    assert!(registry
        .find_class(&TypeInfo::of::<PlainService>())
        .unwrap()
        .is_none());
    assert_eq!(registry.session_descriptors().len(), 2);
}

#[test]
fn test_global_registry_is_scanned_once() {
    let handles: Vec<_> = (0..8).map(|_| thread::spawn(global_registry)).collect();
    let registries: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for registry in &registries {
        assert!(Arc::ptr_eq(registry, &registries[0]));
    }
    assert!(Arc::ptr_eq(&global_registry(), &registries[0]));
    assert!(global_discovery().is_discovered());
    assert_eq!(global_discovery().scan_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_singleton_session_component_shared_across_tasks() {
    let tasks: Vec<_> = (0..16)
        .map(|_| {
            tokio::task::spawn_blocking(|| {
                let registry = global_registry();
                let descriptor = registry
                    .find_session(&TypeInfo::of::<Sequence>())
                    .unwrap()
                    .unwrap();
                assert_eq!(descriptor.multiplicity(), Multiplicity::Singleton);
                let mut ctx = ResolutionContext::new();
                global_bridge()
                    .acquire(descriptor, &no_injection, &mut ctx)
                    .unwrap()
            })
        })
        .collect();

    let mut instances = Vec::new();
    for task in tasks {
        instances.push(task.await.unwrap());
    }

    for instance in &instances {
        assert!(instance.same_object(&instances[0]));
    }
    assert_eq!(SEQUENCE_CREATED.load(Ordering::SeqCst), 1);
    assert_eq!(instances[0].get::<Sequence>().unwrap().serial, 0);
}

#[test]
fn test_per_lookup_session_component_is_fresh_and_released() {
    let registry = global_registry();
    let bridge = global_bridge();
    let descriptor = registry
        .find_session(&TypeInfo::of::<RequestContext>())
        .unwrap()
        .unwrap();

    let mut ctx = ResolutionContext::new();
    let first = bridge.acquire(descriptor, &no_injection, &mut ctx).unwrap();
    let second = bridge.acquire(descriptor, &no_injection, &mut ctx).unwrap();
    assert!(!first.same_object(&second));

    bridge.release(descriptor, &first).unwrap();
    let released = first.get::<RequestContext>().unwrap();
    assert_eq!(released.destroyed.load(Ordering::SeqCst), 1);
    assert_eq!(
        second
            .get::<RequestContext>()
            .unwrap()
            .destroyed
            .load(Ordering::SeqCst),
        0
    );
}

#[test]
fn test_replacement_shadows_registered_component() {
    let registry = global_registry();
    let fake = Instance::component(Arc::new(InMemoryRepository))
        .view::<dyn Repository>(|v| v as Arc<dyn Repository>)
        .build();
    let manager = ReplacementManager::new(Arc::new(ReplacementSet::new(vec![fake.clone()])));

    let target = TypeInfo::of::<dyn Repository>();
    let produce: di_abstractions::Producer<'_> = Box::new(
        |_: &mut ResolutionContext| -> DependencyResult<Option<Instance>> {
            match registry.find_class(&target)? {
                Some(class) => class.instantiate().map(Some),
                None => Ok(None),
            }
        },
    );
    let producer = manager.intercept(&target, produce);

    let mut ctx = ResolutionContext::new();
    let resolved = producer(&mut ctx).unwrap().unwrap();
    assert!(resolved.same_object(&fake));
    assert_eq!(resolved.get::<dyn Repository>().unwrap().kind(), "memory");
    assert!(manager.is_replacement(&resolved));
}
