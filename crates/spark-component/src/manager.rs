//! # ComponentManager：单个组件配置的生命周期状态机
//!
//! ## 核心意图（Why）
//! - 每个组件配置对应一个管理器，负责 `Disabled → Unsatisfied → Satisfied → Active`
//!   的推进与 `Deactivating` / `Disposed` 的退出路径；
//! - 管理 0..N 个激活上下文：单例组件在满足时自动创建唯一上下文，工厂组件由宿主按需创建；
//! - 聚合依赖管理器的满足性，驱动构造、注入与激活钩子。
//!
//! ## 行为契约（What）
//! - **串行化**：所有请求（启用、禁用、处置、服务到达 / 离开、实例创建 / 处置）都以命令形式
//!   进入管理器自己的 FIFO 队列；同一时刻至多一个线程在排空队列，其它线程只负责入队；
//! - **重入**：钩子或监听器在排空线程上再次提交请求时，请求排在当前命令之后执行，
//!   既不丢弃也不拒绝；
//! - **失败局部化**：构造或激活钩子失败只回滚对应上下文，若无任何上下文保持激活，
//!   管理器回退到 `Unsatisfied`，等待下一次满足性事件重试；
//! - **通知**：状态跃迁在释放内部锁之后通知监听器；
//! - **发布**：组件声明了提供的服务时，每个上下文激活后发布一次，失活时在 `deactivate`
//!   钩子之前撤销。
//!
//! ## 风险提示（Trade-offs）
//! - 钩子在排空线程上同步执行，慢钩子只会拖慢本组件的队列；
//! - 跨线程提交的请求在返回时可能尚未执行，调用方应通过 `state()` 或监听器观察结果。

use std::{
    collections::VecDeque,
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::RwLock;
use serde::Serialize;

#[cfg(all(feature = "loom-model", any(loom, spark_loom)))]
use self::loom_queue::QueueMutex;
#[cfg(not(all(feature = "loom-model", any(loom, spark_loom))))]
use parking_lot::Mutex as QueueMutex;

use crate::{
    component::{AsAny, ComponentInstance, DeactivationReason},
    construct::ConstructionStrategy,
    context::{ActivationContext, InstanceId, InstanceState},
    dependency::DependencyManager,
    error::{ComponentError, panic_message},
    metadata::ComponentMetadata,
    observability::{ComponentLogger, LifecycleListener, LogLevel, StateChange},
    properties::{Properties, PropertiesProvider, merge},
    registry::ServiceRegistry,
    runtime::{ComponentActivator, RuntimeOptions},
    service::{ServiceHandle, ServiceId},
};

/// 运行时分配的组件标识。
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ComponentId(u64);

impl ComponentId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "component-{}", self.0)
    }
}

/// 组件级生命周期状态。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
pub enum ComponentState {
    Disabled,
    Unsatisfied,
    Satisfied,
    Active,
    Deactivating,
    /// 终态。
    Disposed,
}

impl ComponentState {
    pub const fn as_str(self) -> &'static str {
        match self {
            ComponentState::Disabled => "disabled",
            ComponentState::Unsatisfied => "unsatisfied",
            ComponentState::Satisfied => "satisfied",
            ComponentState::Active => "active",
            ComponentState::Deactivating => "deactivating",
            ComponentState::Disposed => "disposed",
        }
    }

    /// 状态机允许的直接跃迁。
    pub const fn can_transition_to(self, next: ComponentState) -> bool {
        use ComponentState::*;
        matches!(
            (self, next),
            (Disabled, Unsatisfied | Disposed)
                | (Unsatisfied, Satisfied | Disabled | Disposed)
                | (Satisfied, Active | Unsatisfied | Disabled | Disposed)
                | (Active, Deactivating)
                | (Deactivating, Unsatisfied | Disposed)
        )
    }

    /// 是否处于启用后的状态（未禁用且未处置）。
    pub const fn is_enabled(self) -> bool {
        !matches!(self, ComponentState::Disabled | ComponentState::Disposed)
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 组件的只读描述，供宿主诊断输出。
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ComponentDescription {
    pub name: String,
    pub id: u64,
    pub state: ComponentState,
    /// 工厂组件的工厂标识；单例为 `None`。
    pub factory_id: Option<String>,
    pub instances: Vec<InstanceDescription>,
}

/// 单个实例的描述：每条依赖当前绑定的服务标识，以及实例自身发布的服务标识。
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InstanceDescription {
    pub id: InstanceId,
    pub state: InstanceState,
    pub bound: Vec<(String, Vec<u64>)>,
    pub service: Option<u64>,
}

/// 进入管理器队列的请求。
pub(crate) enum Command {
    Enable,
    Disable,
    Dispose(DeactivationReason),
    ServiceArrived {
        index: usize,
        epoch: u64,
        handle: ServiceHandle,
    },
    ServiceDeparted {
        index: usize,
        epoch: u64,
        handle: ServiceHandle,
    },
    CreateInstance(Arc<ActivationContext>),
    DisposeInstance(InstanceId),
    RepublishService(InstanceId),
    Reevaluate,
}

impl Command {
    fn label(&self) -> &'static str {
        match self {
            Command::Enable => "enable",
            Command::Disable => "disable",
            Command::Dispose(_) => "dispose",
            Command::ServiceArrived { .. } => "service-arrived",
            Command::ServiceDeparted { .. } => "service-departed",
            Command::CreateInstance(_) => "create-instance",
            Command::DisposeInstance(_) => "dispose-instance",
            Command::RepublishService(_) => "republish-service",
            Command::Reevaluate => "reevaluate",
        }
    }
}

#[derive(Default)]
struct TransitionQueue {
    pending: VecDeque<Command>,
    draining: bool,
    /// 最近一次入队的启停请求，与入队顺序一致，先于执行可见。
    enable_requested: bool,
}

/// Loom 模型检查下，跃迁队列改用 `loom::sync::Mutex`，使排空协议的调度交错可被穷举。
#[cfg(all(feature = "loom-model", any(loom, spark_loom)))]
mod loom_queue {
    use std::sync::PoisonError;

    pub(super) struct QueueMutex<T>(loom::sync::Mutex<T>);

    impl<T> QueueMutex<T> {
        pub(super) fn new(value: T) -> Self {
            Self(loom::sync::Mutex::new(value))
        }

        pub(super) fn lock(&self) -> loom::sync::MutexGuard<'_, T> {
            self.0.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }
}

/// 排空线程异常退出时复位 `draining`，保证后续提交者能接手。
struct DrainGuard<'a> {
    queue: &'a QueueMutex<TransitionQueue>,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.queue.lock().draining = false;
        }
    }
}

pub(crate) struct ManagerInner {
    id: ComponentId,
    metadata: ComponentMetadata,
    dependencies: Vec<Arc<DependencyManager>>,
    registry: Arc<dyn ServiceRegistry>,
    construction: Arc<dyn ConstructionStrategy>,
    properties: Arc<dyn PropertiesProvider>,
    activator: Option<Weak<dyn ComponentActivator>>,
    logger: ComponentLogger,
    state: RwLock<ComponentState>,
    contexts: RwLock<Vec<Arc<ActivationContext>>>,
    listeners: RwLock<Vec<Arc<dyn LifecycleListener>>>,
    queue: QueueMutex<TransitionQueue>,
    next_instance: AtomicU64,
    self_ref: Weak<ManagerInner>,
}

impl ManagerInner {
    // ---- 队列 -------------------------------------------------------------

    /// 入队；若无人排空则由当前线程排空至队列为空。
    pub(crate) fn submit(&self, command: Command) {
        {
            let mut queue = self.queue.lock();
            match command {
                Command::Enable => queue.enable_requested = true,
                Command::Disable | Command::Dispose(_) => queue.enable_requested = false,
                _ => {}
            }
            queue.pending.push_back(command);
            if queue.draining {
                return;
            }
            queue.draining = true;
        }

        let _guard = DrainGuard { queue: &self.queue };
        loop {
            let next = {
                let mut queue = self.queue.lock();
                match queue.pending.pop_front() {
                    Some(command) => command,
                    None => {
                        queue.draining = false;
                        return;
                    }
                }
            };
            self.apply(next);
        }
    }

    fn apply(&self, command: Command) {
        tracing::trace!(
            component = self.metadata.name(),
            command = command.label(),
            state = self.state().as_str(),
            "applying component command"
        );
        match command {
            Command::Enable => self.on_enable(),
            Command::Disable => self.on_disable(),
            Command::Dispose(reason) => self.on_dispose(&reason),
            Command::ServiceArrived {
                index,
                epoch,
                handle,
            } => self.on_service_arrived(index, epoch, handle),
            Command::ServiceDeparted {
                index,
                epoch,
                handle,
            } => self.on_service_departed(index, epoch, &handle),
            Command::CreateInstance(context) => self.on_create_instance(context),
            Command::DisposeInstance(id) => self.on_dispose_instance(id),
            Command::RepublishService(id) => self.on_republish_service(id),
            Command::Reevaluate => self.evaluate(),
        }
    }

    // ---- 查询 -------------------------------------------------------------

    pub(crate) fn state(&self) -> ComponentState {
        *self.state.read()
    }

    pub(crate) fn dependency(&self, name: &str) -> Option<&DependencyManager> {
        self.dependencies
            .iter()
            .find(|dependency| dependency.name() == name)
            .map(Arc::as_ref)
    }

    pub(crate) fn activator(&self) -> Option<Arc<dyn ComponentActivator>> {
        self.activator.as_ref()?.upgrade()
    }

    fn contexts(&self) -> Vec<Arc<ActivationContext>> {
        self.contexts.read().clone()
    }

    fn context(&self, id: InstanceId) -> Option<Arc<ActivationContext>> {
        self.contexts
            .read()
            .iter()
            .find(|context| context.id() == id)
            .cloned()
    }

    fn contexts_in(&self, state: InstanceState) -> Vec<Arc<ActivationContext>> {
        self.contexts
            .read()
            .iter()
            .filter(|context| context.state() == state)
            .cloned()
            .collect()
    }

    fn new_context(&self, instance_properties: Properties) -> Arc<ActivationContext> {
        let id = InstanceId::new(self.next_instance.fetch_add(1, Ordering::Relaxed));
        ActivationContext::new(
            self.metadata.shared_name(),
            id,
            self.self_ref.clone(),
            self.dependencies.len(),
            instance_properties,
        )
    }

    /// 上下文发起的处置请求。
    pub(crate) fn dispose_context(&self, id: InstanceId) {
        if self.metadata.is_factory() {
            self.submit(Command::DisposeInstance(id));
        } else {
            self.submit(Command::Dispose(DeactivationReason::Disposed));
        }
    }

    // ---- 状态跃迁 ---------------------------------------------------------

    fn transition(&self, to: ComponentState) {
        let from = {
            let mut state = self.state.write();
            let from = *state;
            if from == to {
                return;
            }
            if !from.can_transition_to(to) {
                tracing::error!(
                    component = self.metadata.name(),
                    from = from.as_str(),
                    to = to.as_str(),
                    "illegal component state transition"
                );
                return;
            }
            *state = to;
            from
        };

        tracing::debug!(
            component = self.metadata.name(),
            from = from.as_str(),
            to = to.as_str(),
            "component state changed"
        );

        let change = StateChange {
            component: self.metadata.shared_name(),
            from,
            to,
        };
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            let notified = catch_unwind(AssertUnwindSafe(|| listener.state_changed(&change)));
            if let Err(payload) = notified {
                tracing::warn!(
                    component = self.metadata.name(),
                    panic = %panic_message(payload.as_ref()),
                    "lifecycle listener panicked"
                );
            }
        }
    }

    fn on_enable(&self) {
        match self.state() {
            ComponentState::Disabled => {}
            ComponentState::Disposed => {
                tracing::warn!(
                    component = self.metadata.name(),
                    "enable ignored: component is disposed"
                );
                return;
            }
            _ => return,
        }
        self.transition(ComponentState::Unsatisfied);
        for dependency in &self.dependencies {
            dependency.open();
        }
        self.evaluate();
    }

    fn on_disable(&self) {
        match self.state() {
            ComponentState::Disabled | ComponentState::Disposed => {
                tracing::trace!(
                    component = self.metadata.name(),
                    "disable ignored: component is not enabled"
                );
                return;
            }
            ComponentState::Active => {
                self.transition(ComponentState::Deactivating);
                self.teardown_active(&DeactivationReason::Disabled);
                self.transition(ComponentState::Unsatisfied);
            }
            _ => {}
        }
        self.close_dependencies();
        self.release_contexts();
        self.transition(ComponentState::Disabled);
    }

    fn on_dispose(&self, reason: &DeactivationReason) {
        match self.state() {
            ComponentState::Disposed => {
                tracing::trace!(
                    component = self.metadata.name(),
                    "dispose ignored: component already disposed"
                );
                return;
            }
            ComponentState::Active => {
                self.transition(ComponentState::Deactivating);
                self.teardown_active(reason);
            }
            _ => {}
        }
        self.close_dependencies();
        self.release_contexts();
        self.transition(ComponentState::Disposed);
        tracing::info!(component = self.metadata.name(), reason = %reason, "component disposed");
    }

    fn on_service_arrived(&self, index: usize, epoch: u64, handle: ServiceHandle) {
        if !self.state().is_enabled() {
            return;
        }
        let Some(dependency) = self.dependencies.get(index) else {
            return;
        };
        if !dependency.is_current(epoch) {
            return;
        }
        if !dependency.add_candidate(handle.clone()) {
            return;
        }
        tracing::trace!(
            component = self.metadata.name(),
            reference = dependency.name(),
            service_id = handle.id().get(),
            "service arrived"
        );

        for context in self.contexts_in(InstanceState::Active) {
            let outcome = dependency.bind(&context, &handle);
            tracing::trace!(
                component = self.metadata.name(),
                instance = context.id().get(),
                reference = dependency.name(),
                service_id = handle.id().get(),
                outcome = ?outcome,
                "bind evaluated"
            );
        }
        self.evaluate();
    }

    fn on_service_departed(&self, index: usize, epoch: u64, handle: &ServiceHandle) {
        if !self.state().is_enabled() {
            return;
        }
        let Some(dependency) = self.dependencies.get(index) else {
            return;
        };
        if !dependency.is_current(epoch) {
            return;
        }
        let was_candidate = dependency.remove_candidate(handle);

        let active = self.contexts_in(InstanceState::Active);
        let mut teardown = Vec::new();
        for context in &active {
            let outcome = dependency.unbind(context, handle);
            tracing::trace!(
                component = self.metadata.name(),
                instance = context.id().get(),
                reference = dependency.name(),
                service_id = handle.id().get(),
                outcome = ?outcome,
                "unbind evaluated"
            );
            if outcome.requires_teardown() {
                teardown.push(Arc::clone(context));
            }
        }

        if !teardown.is_empty() {
            let reason = DeactivationReason::ReferenceLost(dependency.name().to_owned());
            let whole_component =
                teardown.len() == active.len() && self.state() == ComponentState::Active;
            if whole_component {
                self.transition(ComponentState::Deactivating);
            }
            for context in &teardown {
                self.deactivate_context(context, &reason, InstanceState::Pending);
            }
            if whole_component {
                self.transition(ComponentState::Unsatisfied);
            }
        }

        if was_candidate || !teardown.is_empty() {
            self.evaluate();
        }
    }

    fn on_create_instance(&self, context: Arc<ActivationContext>) {
        if !self.state().is_enabled() {
            context.set_state(InstanceState::Disposed);
            tracing::debug!(
                component = self.metadata.name(),
                instance = context.id().get(),
                "instance creation dropped: component is not enabled"
            );
            return;
        }
        self.contexts.write().push(context);
        self.evaluate();
    }

    fn on_dispose_instance(&self, id: InstanceId) {
        let Some(context) = self.context(id) else {
            return;
        };

        if context.state() == InstanceState::Active {
            let last_active = self.contexts_in(InstanceState::Active).len() == 1
                && self.state() == ComponentState::Active;
            if last_active {
                self.transition(ComponentState::Deactivating);
            }
            self.deactivate_context(
                &context,
                &DeactivationReason::Disposed,
                InstanceState::Disposed,
            );
            self.contexts.write().retain(|known| known.id() != id);
            if last_active {
                self.transition(ComponentState::Unsatisfied);
                self.evaluate();
            }
        } else {
            context.reset();
            context.set_state(InstanceState::Disposed);
            self.contexts.write().retain(|known| known.id() != id);
        }
    }

    /// 根据依赖满足性推进状态，并尝试激活所有等待中的上下文。
    fn evaluate(&self) {
        let state = self.state();
        if !matches!(
            state,
            ComponentState::Unsatisfied | ComponentState::Satisfied | ComponentState::Active
        ) {
            return;
        }

        if let Some(missing) = self
            .dependencies
            .iter()
            .find(|dependency| !dependency.has_candidates())
        {
            match state {
                ComponentState::Satisfied => self.transition(ComponentState::Unsatisfied),
                ComponentState::Active => {
                    self.transition(ComponentState::Deactivating);
                    self.teardown_active(&DeactivationReason::ReferenceLost(
                        missing.name().to_owned(),
                    ));
                    self.transition(ComponentState::Unsatisfied);
                }
                _ => {}
            }
            return;
        }

        if state == ComponentState::Unsatisfied {
            self.transition(ComponentState::Satisfied);
        }

        if !self.metadata.is_factory() && self.contexts.read().is_empty() {
            let context = self.new_context(Properties::new());
            self.contexts.write().push(context);
        }

        let mut failed = false;
        let mut activated = Vec::new();
        for context in self.contexts_in(InstanceState::Pending) {
            if self.activate_context(&context) {
                activated.push(context);
            } else {
                failed = true;
            }
        }

        let any_active = !self.contexts_in(InstanceState::Active).is_empty();
        let current = self.state();
        if any_active {
            if current == ComponentState::Satisfied {
                self.transition(ComponentState::Active);
            }
        } else if failed && current == ComponentState::Satisfied {
            self.transition(ComponentState::Unsatisfied);
        }

        for context in &activated {
            self.publish_service(context);
        }
    }

    // ---- 服务发布 ---------------------------------------------------------

    /// 以实现对象发布组件声明的服务；注册表同步派发，消费方可能在本线程上被激活。
    fn publish_service(&self, context: &ActivationContext) {
        let Some(provided) = self.metadata.provided_service() else {
            return;
        };
        if context.state() != InstanceState::Active || context.service_handle().is_some() {
            return;
        }
        let Some(instance) = context.instance() else {
            return;
        };
        let handle = self.registry.publish(
            provided.interface(),
            provided.get_ranking(),
            context.service_properties(),
            instance.as_any_arc(),
        );
        tracing::debug!(
            component = self.metadata.name(),
            instance = context.id().get(),
            interface = provided.interface(),
            service_id = handle.id().get(),
            "component service published"
        );
        context.set_registration(handle);
    }

    fn withdraw_service(&self, context: &ActivationContext) {
        let Some(handle) = context.take_registration() else {
            return;
        };
        self.registry.withdraw(&handle);
        tracing::debug!(
            component = self.metadata.name(),
            instance = context.id().get(),
            service_id = handle.id().get(),
            "component service withdrawn"
        );
    }

    /// 上下文发起的服务属性更新。
    pub(crate) fn update_service_properties(
        &self,
        context: &ActivationContext,
        properties: Properties,
    ) -> Result<(), ComponentError> {
        if self.metadata.provided_service().is_none() {
            return Err(ComponentError::NoProvidedService {
                name: self.metadata.name().to_owned(),
            });
        }
        context.replace_service_overrides(properties);
        self.submit(Command::RepublishService(context.id()));
        Ok(())
    }

    fn on_republish_service(&self, id: InstanceId) {
        let Some(context) = self.context(id) else {
            return;
        };
        let Some(current) = context.service_handle() else {
            return;
        };
        if **current.properties() == context.service_properties() {
            return;
        }
        self.withdraw_service(&context);
        self.publish_service(&context);
    }

    // ---- 上下文激活 / 失活 -------------------------------------------------

    fn activate_context(&self, context: &Arc<ActivationContext>) -> bool {
        let name = self.metadata.name();
        context.set_state(InstanceState::Activating);
        context.refresh_properties(merge(
            self.metadata.properties(),
            self.properties.properties_for(&self.metadata),
            context.instance_properties(),
            name,
            self.id.get(),
        ));
        for dependency in &self.dependencies {
            dependency.bind_initial(context);
        }

        let constructed = catch_unwind(AssertUnwindSafe(|| {
            self.construction
                .construct(self.metadata.class(), context, &self.logger)
        }))
        .unwrap_or_else(|payload| {
            Err(ComponentError::instantiation(
                name,
                self.metadata.class().name(),
                format!(
                    "construction strategy panicked: {}",
                    panic_message(payload.as_ref())
                ),
            ))
        });
        let instance = match constructed {
            Ok(instance) => instance,
            Err(error) => {
                self.logger
                    .log_error(LogLevel::Warn, "component construction failed", &error);
                context.reset();
                context.set_state(InstanceState::Pending);
                return false;
            }
        };

        context.set_instance(Arc::clone(&instance));
        for (index, handle) in context.journal() {
            if let Some(dependency) = self.dependencies.get(index) {
                context.invoke_bind(dependency.name(), &handle);
            }
        }

        let activated = catch_unwind(AssertUnwindSafe(|| instance.activate(context)))
            .unwrap_or_else(|payload| {
                Err(ComponentError::activation(
                    name,
                    format!("activate panicked: {}", panic_message(payload.as_ref())),
                ))
            });
        if let Err(error) = activated {
            self.logger
                .log_error(LogLevel::Warn, "component activation failed", &error);
            self.unwind_bindings(context);
            context.reset();
            context.set_state(InstanceState::Pending);
            return false;
        }

        context.set_state(InstanceState::Active);
        tracing::info!(
            component = name,
            instance = context.id().get(),
            "component instance activated"
        );
        true
    }

    fn deactivate_context(
        &self,
        context: &Arc<ActivationContext>,
        reason: &DeactivationReason,
        final_state: InstanceState,
    ) {
        context.set_state(InstanceState::Deactivating);
        context.close();
        self.withdraw_service(context);
        if let Some(instance) = context.instance() {
            if let Err(payload) =
                catch_unwind(AssertUnwindSafe(|| instance.deactivate(context, reason)))
            {
                tracing::warn!(
                    component = self.metadata.name(),
                    instance = context.id().get(),
                    panic = %panic_message(payload.as_ref()),
                    "deactivate hook panicked"
                );
            }
        }
        self.unwind_bindings(context);
        context.reset();
        context.set_state(final_state);
        tracing::info!(
            component = self.metadata.name(),
            instance = context.id().get(),
            reason = %reason,
            "component instance deactivated"
        );
    }

    /// 按绑定逆序调用 `unbind` 钩子。
    fn unwind_bindings(&self, context: &ActivationContext) {
        for (index, handle) in context.journal().into_iter().rev() {
            if let Some(dependency) = self.dependencies.get(index) {
                context.invoke_unbind(dependency.name(), &handle);
            }
        }
    }

    fn teardown_active(&self, reason: &DeactivationReason) {
        for context in self.contexts_in(InstanceState::Active) {
            self.deactivate_context(&context, reason, InstanceState::Pending);
        }
    }

    fn close_dependencies(&self) {
        for dependency in &self.dependencies {
            dependency.close();
        }
    }

    /// 释放全部上下文，句柄持有者随后只会看到 `Disposed`。
    fn release_contexts(&self) {
        let released = std::mem::take(&mut *self.contexts.write());
        for context in released {
            context.reset();
            context.set_state(InstanceState::Disposed);
        }
    }
}

/// 单个组件配置的管理器句柄，克隆只增加引用计数。
#[derive(Clone)]
pub struct ComponentManager {
    inner: Arc<ManagerInner>,
}

impl ComponentManager {
    pub(crate) fn new(
        metadata: ComponentMetadata,
        id: ComponentId,
        options: &RuntimeOptions,
        activator: Option<Weak<dyn ComponentActivator>>,
    ) -> Self {
        let inner = Arc::new_cyclic(|self_ref: &Weak<ManagerInner>| {
            let dependencies = metadata
                .references()
                .iter()
                .map(|reference| {
                    Arc::new(DependencyManager::new(
                        reference.clone(),
                        metadata.shared_name(),
                        Arc::clone(options.registry()),
                        self_ref.clone(),
                    ))
                })
                .collect();
            ManagerInner {
                id,
                logger: ComponentLogger::new(metadata.shared_name(), id),
                metadata,
                dependencies,
                registry: Arc::clone(options.registry()),
                construction: Arc::clone(options.construction()),
                properties: Arc::clone(options.properties()),
                activator,
                state: RwLock::new(ComponentState::Disabled),
                contexts: RwLock::new(Vec::new()),
                listeners: RwLock::new(options.listeners().to_vec()),
                queue: QueueMutex::new(TransitionQueue::default()),
                next_instance: AtomicU64::new(1),
                self_ref: self_ref.clone(),
            }
        });
        Self { inner }
    }

    pub fn name(&self) -> &str {
        self.inner.metadata.name()
    }

    pub fn id(&self) -> ComponentId {
        self.inner.id
    }

    pub fn metadata(&self) -> &ComponentMetadata {
        &self.inner.metadata
    }

    pub fn state(&self) -> ComponentState {
        self.inner.state()
    }

    pub fn logger(&self) -> &ComponentLogger {
        &self.inner.logger
    }

    /// 请求启用；对已启用组件无效果。
    pub fn enable(&self) {
        self.inner.submit(Command::Enable);
    }

    /// 请求禁用；幂等，对已禁用组件既不跃迁也不通知。
    pub fn disable(&self) {
        self.inner.submit(Command::Disable);
    }

    /// 最近一次提交的启停请求是否为启用。
    ///
    /// 与 [`Self::state`] 不同，该值在请求入队时即更新；其它线程正在排空队列时，
    /// 状态可能尚未反映已提交的请求，而这里总是给出请求方的最新意图。处置后恒为 `false`。
    pub fn is_enable_requested(&self) -> bool {
        self.inner.queue.lock().enable_requested
    }

    /// 请求处置，进入终态 `Disposed`。
    pub fn dispose(&self) {
        self.dispose_with(DeactivationReason::Disposed);
    }

    /// 以指定原因处置，原因会传递给实现对象的 `deactivate` 钩子。
    pub fn dispose_with(&self, reason: DeactivationReason) {
        self.inner.submit(Command::Dispose(reason));
    }

    /// 请求重新评估满足性，常用于外部配置变化或构造失败后的重试。
    pub fn reevaluate(&self) {
        self.inner.submit(Command::Reevaluate);
    }

    /// 为工厂组件创建新实例。
    ///
    /// # 教案式说明
    /// - **前置条件**：组件为工厂形态，且处于 `Satisfied` 或 `Active`；
    /// - **后置条件**：返回的句柄立即可用；实例的激活经由队列执行，跨线程调用时可能稍后完成；
    /// - **错误**：单例组件返回 [`ComponentError::NotAFactory`]，已处置返回
    ///   [`ComponentError::Disposed`]，未满足返回 [`ComponentError::NotSatisfied`]。
    pub fn new_instance(&self, properties: Properties) -> Result<ComponentInstance, ComponentError> {
        let name = self.name().to_owned();
        if !self.inner.metadata.is_factory() {
            return Err(ComponentError::NotAFactory { name });
        }
        match self.state() {
            ComponentState::Satisfied | ComponentState::Active => {}
            ComponentState::Disposed => return Err(ComponentError::Disposed { name }),
            _ => return Err(ComponentError::NotSatisfied { name }),
        }
        let context = self.inner.new_context(properties);
        self.inner
            .submit(Command::CreateInstance(Arc::clone(&context)));
        Ok(ComponentInstance::new(context))
    }

    /// 当前存活的实例句柄。
    pub fn instances(&self) -> Vec<ComponentInstance> {
        self.inner
            .contexts()
            .into_iter()
            .map(ComponentInstance::new)
            .collect()
    }

    pub fn dependency_manager(&self, name: &str) -> Option<Arc<DependencyManager>> {
        self.inner
            .dependencies
            .iter()
            .find(|dependency| dependency.name() == name)
            .cloned()
    }

    /// 按依赖下标排列的依赖管理器。
    pub fn dependency_managers(&self) -> &[Arc<DependencyManager>] {
        &self.inner.dependencies
    }

    pub fn add_listener(&self, listener: Arc<dyn LifecycleListener>) {
        self.inner.listeners.write().push(listener);
    }

    pub fn describe(&self) -> ComponentDescription {
        let instances = self
            .inner
            .contexts()
            .iter()
            .map(|context| InstanceDescription {
                id: context.id(),
                state: context.state(),
                bound: self
                    .inner
                    .dependencies
                    .iter()
                    .map(|dependency| {
                        let ids = context
                            .peek_edge_info(dependency.index())
                            .map(|tracker| {
                                tracker
                                    .snapshot()
                                    .iter()
                                    .map(|handle| handle.id())
                                    .map(ServiceId::get)
                                    .collect()
                            })
                            .unwrap_or_default();
                        (dependency.name().to_owned(), ids)
                    })
                    .collect(),
                service: context.service_handle().map(|handle| handle.id().get()),
            })
            .collect();
        ComponentDescription {
            name: self.name().to_owned(),
            id: self.id().get(),
            state: self.state(),
            factory_id: self.inner.metadata.factory_id().map(str::to_owned),
            instances,
        }
    }
}

impl fmt::Debug for ComponentManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentManager")
            .field("name", &self.name())
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}
