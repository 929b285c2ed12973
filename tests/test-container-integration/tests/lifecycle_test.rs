//! 测试容器集成测试：测试类准备、测试实例注入、测试替身与资源释放
use di_abstractions::{ResourceProvider, TestClassInfo};
use di_impl::{ComponentClass, ComponentUnit, SessionComponentDescriptor, COMPONENT_UNITS};
use infrastructure_common::{
    init_logging, BoxError, ConfigError, ContainerError, DependencyError, DependencyResult,
    Injectable, InjectionPoint, Instance, InstanceState, LoggingConfig, ResourceResult,
};
use linkme::distributed_slice;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use test_container::{SetupContext, TestClass, TestSetup};

static LOGGING: Once = Once::new();

fn setup_logging() {
    LOGGING.call_once(|| {
        let _ = init_logging(&LoggingConfig::development());
    });
}

// ---------------------------------------------------------------------------
// 组件
// ---------------------------------------------------------------------------

trait Clock: Send + Sync {
    fn source(&self) -> &'static str;
}

#[derive(Default)]
struct SystemClock;

impl Clock for SystemClock {
    fn source(&self) -> &'static str {
        "system"
    }
}

impl Injectable for SystemClock {}

static ID_GENERATORS: AtomicUsize = AtomicUsize::new(0);

struct IdGenerator {
    next: AtomicUsize,
}

impl Default for IdGenerator {
    fn default() -> Self {
        ID_GENERATORS.fetch_add(1, Ordering::SeqCst);
        Self {
            next: AtomicUsize::new(1),
        }
    }
}

impl IdGenerator {
    fn next_id(&self) -> usize {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

impl Injectable for IdGenerator {}

#[derive(Default)]
struct AuditTrail {
    clock: OnceCell<Arc<dyn Clock>>,
    destroyed: AtomicUsize,
}

impl Injectable for AuditTrail {
    fn injection_points(&self) -> Vec<InjectionPoint> {
        vec![InjectionPoint::component::<dyn Clock>("clock")]
    }

    fn accept(&self, point: &InjectionPoint, value: Instance) -> DependencyResult<()> {
        let _ = self.clock.set(value.require::<dyn Clock>(point)?);
        Ok(())
    }

    fn pre_destroy(&self) -> Result<(), BoxError> {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct OrderService {
    clock: OnceCell<Arc<dyn Clock>>,
    ids: OnceCell<Arc<IdGenerator>>,
    db: OnceCell<Arc<String>>,
}

impl Injectable for OrderService {
    fn injection_points(&self) -> Vec<InjectionPoint> {
        vec![
            InjectionPoint::component::<dyn Clock>("clock"),
            InjectionPoint::session::<IdGenerator>("ids"),
            InjectionPoint::resource::<String>("db", "db"),
        ]
    }

    fn accept(&self, point: &InjectionPoint, value: Instance) -> DependencyResult<()> {
        match point.field {
            "clock" => drop(self.clock.set(value.require::<dyn Clock>(point)?)),
            "ids" => drop(self.ids.set(value.require::<IdGenerator>(point)?)),
            "db" => drop(self.db.set(value.require::<String>(point)?)),
            _ => {}
        }
        Ok(())
    }
}

#[derive(Default)]
struct Journal {
    closed: AtomicUsize,
}

impl Injectable for Journal {
    fn pre_destroy(&self) -> Result<(), BoxError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// 进程级单例，持有时钟与日志
#[derive(Default)]
struct Ledger {
    clock: OnceCell<Arc<dyn Clock>>,
    journal: OnceCell<Arc<Journal>>,
}

impl Injectable for Ledger {
    fn injection_points(&self) -> Vec<InjectionPoint> {
        vec![
            InjectionPoint::component::<dyn Clock>("clock"),
            InjectionPoint::component::<Journal>("journal"),
        ]
    }

    fn accept(&self, point: &InjectionPoint, value: Instance) -> DependencyResult<()> {
        match point.field {
            "clock" => drop(self.clock.set(value.require::<dyn Clock>(point)?)),
            "journal" => drop(self.journal.set(value.require::<Journal>(point)?)),
            _ => {}
        }
        Ok(())
    }
}

/// 测试替身：声明了无法满足的注入点，被注入时准备会失败
#[derive(Default)]
struct FakeClock {
    injected: AtomicUsize,
}

impl Clock for FakeClock {
    fn source(&self) -> &'static str {
        "fake"
    }
}

impl Injectable for FakeClock {
    fn injection_points(&self) -> Vec<InjectionPoint> {
        vec![InjectionPoint::resource::<String>("missing", "missing")]
    }

    fn accept(&self, _: &InjectionPoint, _: Instance) -> DependencyResult<()> {
        self.injected.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[distributed_slice(COMPONENT_UNITS)]
static ORDER_UNIT: fn() -> ComponentUnit = order_unit;

fn order_unit() -> ComponentUnit {
    ComponentUnit::new("order-module")
        .with_beans_marker()
        .with_class(
            ComponentClass::builder(|| Ok(SystemClock))
                .expose::<dyn Clock>(|v| v as Arc<dyn Clock>)
                .build(),
        )
        .with_class(ComponentClass::of::<OrderService>())
        .with_class(ComponentClass::of::<Journal>())
        .with_session_descriptors(|| {
            Ok(vec![
                SessionComponentDescriptor::singleton(ComponentClass::of::<IdGenerator>()),
                SessionComponentDescriptor::singleton(ComponentClass::of::<Ledger>()),
                SessionComponentDescriptor::per_lookup(ComponentClass::of::<AuditTrail>()),
            ])
        })
}

// ---------------------------------------------------------------------------
// 测试实例与资源
// ---------------------------------------------------------------------------

#[derive(Default)]
struct OrderTest {
    service: OnceCell<Arc<OrderService>>,
    clock: OnceCell<Arc<dyn Clock>>,
    audit: OnceCell<Arc<AuditTrail>>,
    db: OnceCell<Arc<String>>,
    extra_resource: Option<&'static str>,
}

impl OrderTest {
    fn create() -> (Arc<Self>, Instance) {
        Self::with_extra_resource(None)
    }

    fn with_extra_resource(extra_resource: Option<&'static str>) -> (Arc<Self>, Instance) {
        let test = Arc::new(Self {
            extra_resource,
            ..Self::default()
        });
        let instance = Instance::component(test.clone()).build();
        (test, instance)
    }
}

impl Injectable for OrderTest {
    fn injection_points(&self) -> Vec<InjectionPoint> {
        let mut points = vec![
            InjectionPoint::component::<OrderService>("service"),
            InjectionPoint::component::<dyn Clock>("clock"),
            InjectionPoint::session::<AuditTrail>("audit"),
            InjectionPoint::resource::<String>("db", "db"),
        ];
        if let Some(name) = self.extra_resource {
            points.push(InjectionPoint::resource::<String>("extra", name));
        }
        points
    }

    fn accept(&self, point: &InjectionPoint, value: Instance) -> DependencyResult<()> {
        match point.field {
            "service" => drop(self.service.set(value.require::<OrderService>(point)?)),
            "clock" => drop(self.clock.set(value.require::<dyn Clock>(point)?)),
            "audit" => drop(self.audit.set(value.require::<AuditTrail>(point)?)),
            "db" => drop(self.db.set(value.require::<String>(point)?)),
            _ => {}
        }
        Ok(())
    }
}

#[derive(Default)]
struct LedgerTest {
    ledger: OnceCell<Arc<Ledger>>,
    clock: OnceCell<Arc<dyn Clock>>,
}

impl LedgerTest {
    fn create() -> (Arc<Self>, Instance) {
        let test = Arc::new(Self::default());
        let instance = Instance::component(test.clone()).build();
        (test, instance)
    }
}

impl Injectable for LedgerTest {
    fn injection_points(&self) -> Vec<InjectionPoint> {
        vec![
            InjectionPoint::session::<Ledger>("ledger"),
            InjectionPoint::component::<dyn Clock>("clock"),
        ]
    }

    fn accept(&self, point: &InjectionPoint, value: Instance) -> DependencyResult<()> {
        match point.field {
            "ledger" => drop(self.ledger.set(value.require::<Ledger>(point)?)),
            "clock" => drop(self.clock.set(value.require::<dyn Clock>(point)?)),
            _ => {}
        }
        Ok(())
    }
}

struct PlainTest;
impl Injectable for PlainTest {}

fn plain_instance() -> Instance {
    Instance::component(Arc::new(PlainTest)).build()
}

struct HandleProvider {
    name: &'static str,
    resource: &'static str,
    handle: Arc<String>,
    cleanups: Arc<AtomicUsize>,
    fail_cleanup: bool,
}

impl ResourceProvider for HandleProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn provided_names(&self) -> Vec<String> {
        vec![self.resource.to_string()]
    }

    fn resolve(&self, point: &InjectionPoint) -> ResourceResult<Option<Instance>> {
        Ok((point.resource_name() == Some(self.resource))
            .then(|| Instance::value(self.handle.clone()).build()))
    }

    fn cleanup(&self) -> Result<(), BoxError> {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        if self.fail_cleanup {
            Err(format!("{} 连接关闭失败", self.name).into())
        } else {
            Ok(())
        }
    }
}

#[derive(Clone, Default)]
struct ProviderStats {
    builds: Arc<AtomicUsize>,
    cleanups: Arc<AtomicUsize>,
}

impl ProviderStats {
    fn factory(
        &self,
        name: &'static str,
        resource: &'static str,
        fail_cleanup: bool,
    ) -> impl Fn(&TestClassInfo) -> Result<Arc<dyn ResourceProvider>, BoxError> + Send + Sync {
        let stats = self.clone();
        move |_: &TestClassInfo| -> Result<Arc<dyn ResourceProvider>, BoxError> {
            let n = stats.builds.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Arc::new(HandleProvider {
                name,
                resource,
                handle: Arc::new(format!("H{n}")),
                cleanups: stats.cleanups.clone(),
                fail_cleanup,
            }))
        }
    }

    fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    fn cleanups(&self) -> usize {
        self.cleanups.load(Ordering::SeqCst)
    }
}

fn db_class(name: &str, stats: &ProviderStats) -> Arc<TestClass> {
    TestClass::builder(name)
        .resource_provider(stats.factory("db-provider", "db", false))
        .build()
}

// ---------------------------------------------------------------------------
// 测试
// ---------------------------------------------------------------------------

#[test]
fn test_data_setup_runs_base_first_once_per_class() {
    setup_logging();
    let log = Arc::new(Mutex::new(Vec::new()));

    let base_log = log.clone();
    let base = TestClass::builder("RepositoryTestBase")
        .data_setup(
            "create_schema",
            move |ctx: &SetupContext<'_>| -> Result<(), BoxError> {
                base_log
                    .lock()
                    .push(format!("create_schema for {}", ctx.class().name()));
                Ok(())
            },
        )
        .build();

    let sub_log = log.clone();
    let sub = TestClass::builder("OrderRepositoryTest")
        .extends(base)
        .data_setup(
            "insert_orders",
            move |_: &SetupContext<'_>| -> Result<(), BoxError> {
                sub_log.lock().push("insert_orders".to_string());
                Ok(())
            },
        )
        .build();

    let setup = TestSetup::new().unwrap();
    for id in ["t1", "t2", "t3"] {
        let scope = setup
            .prepare_test_instance(id, &sub, plain_instance())
            .unwrap();
        scope.shutdown().unwrap();
    }

    assert_eq!(
        *log.lock(),
        vec!["create_schema for OrderRepositoryTest", "insert_orders"]
    );
    setup.finish_class(&sub).unwrap();
}

#[test]
fn test_duplicate_data_setup_is_a_configuration_error() {
    setup_logging();
    fn noop(_: &SetupContext<'_>) -> Result<(), BoxError> {
        Ok(())
    }
    let class = TestClass::builder("BrokenTest")
        .data_setup("first", noop)
        .data_setup("second", noop)
        .build();

    let setup = TestSetup::new().unwrap();
    match setup
        .prepare_test_instance("t1", &class, plain_instance())
        .unwrap_err()
    {
        ContainerError::Config {
            source: ConfigError::DuplicateDataSetup { class, count },
        } => {
            assert_eq!(class, "BrokenTest");
            assert_eq!(count, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_resource_handle_shared_within_class_and_rebuilt_after_finish() {
    setup_logging();
    let stats = ProviderStats::default();
    let class = db_class("OrderTest", &stats);
    let setup = TestSetup::new().unwrap();

    let mut handles = Vec::new();
    for id in ["t1", "t2"] {
        let (test, instance) = OrderTest::create();
        let scope = setup.prepare_test_instance(id, &class, instance).unwrap();
        handles.push(test.db.get().unwrap().clone());
        assert!(Arc::ptr_eq(
            test.db.get().unwrap(),
            test.service.get().unwrap().db.get().unwrap()
        ));
        scope.shutdown().unwrap();
    }
    assert_eq!(handles[0].as_str(), "H1");
    assert!(Arc::ptr_eq(&handles[0], &handles[1]));
    assert_eq!(stats.builds(), 1);

    setup.finish_class(&class).unwrap();
    assert_eq!(stats.cleanups(), 1);

    let (test, instance) = OrderTest::create();
    let scope = setup.prepare_test_instance("t3", &class, instance).unwrap();
    assert_eq!(test.db.get().unwrap().as_str(), "H2");
    assert_eq!(stats.builds(), 2);
    scope.shutdown().unwrap();
    setup.finish_class(&class).unwrap();
}

#[test]
fn test_replacement_takes_precedence_and_is_never_injected() {
    setup_logging();
    let fake_clock = Arc::new(FakeClock::default());
    let fake = Instance::component(fake_clock.clone())
        .view::<dyn Clock>(|v| v as Arc<dyn Clock>)
        .build();

    let setup = TestSetup::builder()
        .plugin(
            move |test_id: &str, _: &Instance| -> Result<Vec<Instance>, BoxError> {
                if test_id == "with-fake" {
                    Ok(vec![fake.clone()])
                } else {
                    Ok(Vec::new())
                }
            },
        )
        .build()
        .unwrap();
    let stats = ProviderStats::default();
    let class = db_class("ClockTest", &stats);

    let (test, instance) = OrderTest::create();
    let scope = setup
        .prepare_test_instance("with-fake", &class, instance)
        .unwrap();
    assert_eq!(scope.replacements().len(), 1);
    assert_eq!(test.clock.get().unwrap().source(), "fake");
    assert_eq!(
        test.service.get().unwrap().clock.get().unwrap().source(),
        "fake"
    );
    assert_eq!(
        test.audit.get().unwrap().clock.get().unwrap().source(),
        "fake"
    );
    assert_eq!(scope.require::<dyn Clock>().unwrap().source(), "fake");
    assert_eq!(fake_clock.injected.load(Ordering::SeqCst), 0);
    scope.shutdown().unwrap();

    let (test, instance) = OrderTest::create();
    let scope = setup
        .prepare_test_instance("without-fake", &class, instance)
        .unwrap();
    assert!(scope.replacements().is_empty());
    assert_eq!(test.clock.get().unwrap().source(), "system");
    scope.shutdown().unwrap();
    setup.finish_class(&class).unwrap();
}

#[test]
fn test_singleton_shared_and_per_lookup_released() {
    setup_logging();
    let stats = ProviderStats::default();
    let class = db_class("SessionTest", &stats);
    let setup = TestSetup::new().unwrap();

    let (first, instance) = OrderTest::create();
    let first_scope = setup.prepare_test_instance("t1", &class, instance).unwrap();
    let (second, instance) = OrderTest::create();
    let second_scope = setup.prepare_test_instance("t2", &class, instance).unwrap();

    let ids = first.service.get().unwrap().ids.get().unwrap();
    assert!(Arc::ptr_eq(
        ids,
        second.service.get().unwrap().ids.get().unwrap()
    ));
    assert!(ids.next_id() >= 1);
    assert_eq!(ID_GENERATORS.load(Ordering::SeqCst), 1);

    let first_audit = first.audit.get().unwrap().clone();
    let second_audit = second.audit.get().unwrap().clone();
    assert!(!Arc::ptr_eq(&first_audit, &second_audit));

    first_scope.shutdown().unwrap();
    assert_eq!(first_audit.destroyed.load(Ordering::SeqCst), 1);
    assert_eq!(second_audit.destroyed.load(Ordering::SeqCst), 0);

    second_scope.shutdown().unwrap();
    assert_eq!(second_audit.destroyed.load(Ordering::SeqCst), 1);
    setup.finish_class(&class).unwrap();
}

#[test]
fn test_singleton_with_dependencies_is_isolated_from_scope_doubles() {
    setup_logging();
    let setup = TestSetup::builder()
        .plugin(
            |test_id: &str, _: &Instance| -> Result<Vec<Instance>, BoxError> {
                if test_id != "ledger-a" {
                    return Ok(Vec::new());
                }
                Ok(vec![Instance::component(Arc::new(FakeClock::default()))
                    .view::<dyn Clock>(|v| v as Arc<dyn Clock>)
                    .build()])
            },
        )
        .build()
        .unwrap();
    let class = TestClass::builder("LedgerTest").build();

    let (a, instance) = LedgerTest::create();
    let a_scope = setup
        .prepare_test_instance("ledger-a", &class, instance)
        .unwrap();
    let ledger = a.ledger.get().unwrap().clone();
    assert_eq!(a.clock.get().unwrap().source(), "fake");
    assert_eq!(ledger.clock.get().unwrap().source(), "system");

    a_scope.shutdown().unwrap();
    let journal = ledger.journal.get().unwrap();
    assert_eq!(journal.closed.load(Ordering::SeqCst), 0);

    let (b, instance) = LedgerTest::create();
    let b_scope = setup
        .prepare_test_instance("ledger-b", &class, instance)
        .unwrap();
    assert!(Arc::ptr_eq(b.ledger.get().unwrap(), &ledger));
    assert_eq!(b.clock.get().unwrap().source(), "system");
    assert_eq!(ledger.clock.get().unwrap().source(), "system");

    b_scope.shutdown().unwrap();
    setup.finish_class(&class).unwrap();
    setup.shutdown().unwrap();
    assert_eq!(journal.closed.load(Ordering::SeqCst), 0);
}

#[test]
fn test_failed_preparation_releases_acquired_components() {
    setup_logging();
    let stats = ProviderStats::default();
    let class = db_class("QueueTest", &stats);
    let setup = TestSetup::new().unwrap();

    let (test, instance) = OrderTest::with_extra_resource(Some("queue"));
    match setup
        .prepare_test_instance("t1", &class, instance)
        .unwrap_err()
    {
        ContainerError::Dependency {
            source: DependencyError::UnsatisfiedInjectionPoint { field, target, .. },
        } => {
            assert_eq!(field, "extra");
            assert!(target.contains("queue"));
        }
        other => panic!("unexpected error: {other}"),
    }

    let audit = test.audit.get().unwrap();
    assert_eq!(audit.destroyed.load(Ordering::SeqCst), 1);
    setup.finish_class(&class).unwrap();
}

#[test]
fn test_cleanup_continues_after_provider_failure() {
    setup_logging();
    let stats = ProviderStats::default();
    let class = TestClass::builder("CacheTest")
        .resource_provider(stats.factory("db-provider", "db", true))
        .resource_provider(stats.factory("cache-provider", "cache", false))
        .build();
    let setup = TestSetup::new().unwrap();

    let (_, instance) = OrderTest::create();
    setup
        .prepare_test_instance("t1", &class, instance)
        .unwrap()
        .shutdown()
        .unwrap();

    let error = setup.finish_class(&class).unwrap_err();
    assert_eq!(error.actions(), vec!["db-provider::cleanup"]);
    assert_eq!(stats.cleanups(), 2);
}

#[test]
fn test_scope_run_and_drop_release_actions() {
    setup_logging();
    let stats = ProviderStats::default();
    let class = db_class("RunTest", &stats);
    let setup = TestSetup::new().unwrap();

    let (test, instance) = OrderTest::create();
    let scope = setup.prepare_test_instance("t1", &class, instance).unwrap();
    assert_eq!(scope.state(), InstanceState::Prepared);
    assert!(scope.pending_releases() > 0);

    let source = scope
        .run(|scope| {
            assert_eq!(scope.state(), InstanceState::Running);
            scope.require::<dyn Clock>().unwrap().source()
        })
        .unwrap();
    assert_eq!(source, "system");
    assert_eq!(
        test.audit.get().unwrap().destroyed.load(Ordering::SeqCst),
        1
    );

    let (test, instance) = OrderTest::create();
    drop(setup.prepare_test_instance("t2", &class, instance).unwrap());
    assert_eq!(
        test.audit.get().unwrap().destroyed.load(Ordering::SeqCst),
        1
    );
    setup.finish_class(&class).unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_preparation_runs_class_setup_once() {
    setup_logging();
    let stats = ProviderStats::default();
    let seeded = Arc::new(AtomicUsize::new(0));
    let counter = seeded.clone();
    let class = TestClass::builder("ConcurrentTest")
        .resource_provider(stats.factory("db-provider", "db", false))
        .data_setup(
            "seed",
            move |ctx: &SetupContext<'_>| -> Result<(), BoxError> {
                assert!(ctx.resource("db")?.is_some());
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        )
        .build();
    let setup = Arc::new(TestSetup::new().unwrap());

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let setup = setup.clone();
            let class = class.clone();
            tokio::task::spawn_blocking(move || {
                let (test, instance) = OrderTest::create();
                let scope = setup
                    .prepare_test_instance(format!("t{i}"), &class, instance)
                    .unwrap();
                let handle = test.db.get().unwrap().clone();
                scope.shutdown().unwrap();
                handle
            })
        })
        .collect();

    let mut handles = Vec::new();
    for task in tasks {
        handles.push(task.await.unwrap());
    }

    assert_eq!(seeded.load(Ordering::SeqCst), 1);
    assert_eq!(stats.builds(), 1);
    for handle in &handles {
        assert!(Arc::ptr_eq(handle, &handles[0]));
    }
    setup.shutdown().unwrap();
    assert_eq!(stats.cleanups(), 1);
}
