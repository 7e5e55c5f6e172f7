//! 集成测试支撑模块：可记录钩子调用的组件、状态跃迁记录器与装配好的运行时夹具。
//!
//! # 使用说明（How）
//! - 各测试文件以 `mod support;` 引入，按需使用其中的构造器；
//! - [`Journal`] 由同一组件的所有实例共享，记录顺序即钩子调用顺序；
//! - [`Fixture`] 把注册表、运行时与记录器装配在一起，测试只需关心元数据与服务注册。
#![allow(dead_code)]

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use parking_lot::Mutex;
use spark_component::{
    ActivationContext, Component, ComponentClass, ComponentError, ComponentManager,
    ComponentMetadata, ComponentRuntime, ComponentState, DeactivationReason,
    InMemoryServiceRegistry, LifecycleListener, ReferenceMetadata, RuntimeOptions, ServiceHandle,
    ServiceId, StateChange,
};

/// 钩子调用记录。
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Event {
    Construct,
    Activate,
    Deactivate(DeactivationReason),
    Bind(String, ServiceId),
    Unbind(String, ServiceId),
}

/// 共享的钩子调用日志。
#[derive(Debug, Default)]
pub struct Journal {
    events: Mutex<Vec<Event>>,
}

impl Journal {
    pub fn push(&self, event: Event) {
        self.events.lock().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().iter().filter(|event| predicate(event)).count()
    }

    pub fn activations(&self) -> usize {
        self.count(|event| matches!(event, Event::Activate))
    }

    pub fn deactivations(&self) -> usize {
        self.count(|event| matches!(event, Event::Deactivate(_)))
    }

    pub fn binds(&self) -> usize {
        self.count(|event| matches!(event, Event::Bind(..)))
    }

    pub fn unbinds(&self) -> usize {
        self.count(|event| matches!(event, Event::Unbind(..)))
    }
}

/// 激活钩子的行为开关。
#[derive(Debug, Default)]
pub struct Behavior {
    /// 剩余的构造失败次数。
    pub failing_constructions: AtomicUsize,
    /// 剩余的激活失败次数。
    pub failing_activations: AtomicUsize,
}

impl Behavior {
    fn should_fail(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
    }
}

/// 把全部钩子写入 [`Journal`] 的组件。
pub struct Recording {
    journal: Arc<Journal>,
    behavior: Arc<Behavior>,
}

impl Component for Recording {
    fn activate(&self, context: &ActivationContext) -> Result<(), ComponentError> {
        if Behavior::should_fail(&self.behavior.failing_activations) {
            return Err(ComponentError::activation(
                context.component_name(),
                "scripted activation failure",
            ));
        }
        self.journal.push(Event::Activate);
        Ok(())
    }

    fn deactivate(&self, _context: &ActivationContext, reason: &DeactivationReason) {
        self.journal.push(Event::Deactivate(reason.clone()));
    }

    fn bind(&self, reference: &str, service: &ServiceHandle) {
        self.journal
            .push(Event::Bind(reference.to_owned(), service.id()));
    }

    fn unbind(&self, reference: &str, service: &ServiceHandle) {
        self.journal
            .push(Event::Unbind(reference.to_owned(), service.id()));
    }
}

/// 记录所有状态跃迁的监听器。
#[derive(Debug, Default)]
pub struct StateLog {
    changes: Mutex<Vec<(String, ComponentState, ComponentState)>>,
}

impl StateLog {
    pub fn changes(&self) -> Vec<(String, ComponentState, ComponentState)> {
        self.changes.lock().clone()
    }

    /// 指定组件经历的目标状态序列。
    pub fn targets(&self, component: &str) -> Vec<ComponentState> {
        self.changes
            .lock()
            .iter()
            .filter(|(name, _, _)| name == component)
            .map(|(_, _, to)| *to)
            .collect()
    }

    pub fn clear(&self) {
        self.changes.lock().clear();
    }
}

impl LifecycleListener for StateLog {
    fn state_changed(&self, change: &StateChange) {
        self.changes
            .lock()
            .push((change.component.to_string(), change.from, change.to));
    }
}

/// 装配好的注册表 + 运行时 + 记录器。
pub struct Fixture {
    pub registry: Arc<InMemoryServiceRegistry>,
    pub runtime: Arc<ComponentRuntime>,
    pub journal: Arc<Journal>,
    pub behavior: Arc<Behavior>,
    pub states: Arc<StateLog>,
}

impl Fixture {
    pub fn new() -> Self {
        let registry = Arc::new(InMemoryServiceRegistry::new());
        let states = Arc::new(StateLog::default());
        let runtime = ComponentRuntime::new(
            RuntimeOptions::new(registry.clone()).with_listener(states.clone()),
        );
        Self {
            registry,
            runtime,
            journal: Arc::new(Journal::default()),
            behavior: Arc::new(Behavior::default()),
            states,
        }
    }

    /// 以 [`Recording`] 为实现对象的类。
    pub fn recording_class(&self) -> ComponentClass {
        let journal = Arc::clone(&self.journal);
        let behavior = Arc::clone(&self.behavior);
        ComponentClass::named("Recording").with_constructor(move || {
            if Behavior::should_fail(&behavior.failing_constructions) {
                return Err(ComponentError::instantiation(
                    "recording",
                    "Recording",
                    "scripted construction failure",
                ));
            }
            journal.push(Event::Construct);
            Ok(Arc::new(Recording {
                journal: Arc::clone(&journal),
                behavior: Arc::clone(&behavior),
            }) as Arc<dyn Component>)
        })
    }

    /// 注册一个带给定依赖的单例组件。
    pub fn register(&self, name: &str, references: Vec<ReferenceMetadata>) -> ComponentManager {
        let mut builder = ComponentMetadata::builder(name, self.recording_class());
        for reference in references {
            builder = builder.reference(reference);
        }
        let metadata = builder.build().expect("测试元数据必须合法");
        self.runtime.register(metadata).expect("测试组件名不应重复")
    }

    pub fn publish(&self, interface: &str, ranking: i32) -> ServiceHandle {
        self.registry.register_object(interface, ranking, ())
    }

    pub fn withdraw(&self, handle: &ServiceHandle) {
        assert!(self.registry.unregister(handle), "撤销的服务必须在册");
    }
}

/// 断言组件当前所有实例的追踪器都已清空。
pub fn assert_trackers_cleared(manager: &ComponentManager) {
    for instance in manager.instances() {
        assert_eq!(
            instance.context().allocated_edge_count(),
            0,
            "失活后实例 {} 的追踪器必须全部清空",
            instance.id()
        );
    }
}
