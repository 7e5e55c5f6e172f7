//! # ActivationContext：单个实现对象的运行期上下文
//!
//! ## 核心意图（Why）
//! - 每个实现对象（单例组件的唯一实例，或工厂组件的每个实例）各自拥有一个上下文；
//! - 上下文按依赖下标保存绑定追踪器，依赖管理器只通过下标访问它们；
//! - 对实现对象暴露 `locate_service*`、属性视图、自身发布的服务与处置入口。
//!
//! ## 行为契约（What）
//! - 追踪器数组长度等于依赖数量，按下标惰性分配，每次失活后整体清空；
//! - 绑定日志记录激活期间的绑定顺序，失活与回滚时按逆序解绑；
//! - `locate_service` 只读取当前已绑定的服务，从不触发新的绑定；
//! - 组件声明了提供的服务时，上下文在激活期间持有该服务的注册句柄，失活时由管理器撤销；
//! - 上下文只弱引用所属管理器，管理器释放后查询返回空、请求返回 [`ComponentError::RuntimeUnavailable`]。
//!
//! ## 风险提示（Trade-offs）
//! - 每个槽位一把 `RwLock`，惰性分配只在激活路径上发生，读路径只需共享锁。

use std::{
    any::Any,
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{Arc, Weak},
};

use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::{
    component::{Component, ComponentInstance},
    edge::BindingTracker,
    error::{ComponentError, panic_message},
    manager::ManagerInner,
    properties::{Properties, PropertiesView},
    service::ServiceHandle,
};

/// 激活上下文标识，在所属组件内唯一。
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct InstanceId(u64);

impl InstanceId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "instance-{}", self.0)
    }
}

/// 单个实例的状态。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
pub enum InstanceState {
    /// 等待依赖满足或等待重试。
    Pending,
    Activating,
    Active,
    Deactivating,
    /// 终态。
    Disposed,
}

/// 单个实现对象的运行期上下文。
pub struct ActivationContext {
    id: InstanceId,
    component: Arc<str>,
    manager: Weak<ManagerInner>,
    self_ref: Weak<ActivationContext>,
    edges: Box<[RwLock<Option<Arc<BindingTracker>>>]>,
    instance: RwLock<Option<Arc<dyn Component>>>,
    journal: Mutex<Vec<(usize, ServiceHandle)>>,
    instance_properties: Properties,
    properties: ArcSwap<Properties>,
    registration: Mutex<Option<ServiceHandle>>,
    service_overrides: Mutex<Properties>,
    state: RwLock<InstanceState>,
}

impl ActivationContext {
    pub(crate) fn new(
        component: Arc<str>,
        id: InstanceId,
        manager: Weak<ManagerInner>,
        edge_count: usize,
        instance_properties: Properties,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            id,
            component,
            manager,
            self_ref: self_ref.clone(),
            edges: (0..edge_count).map(|_| RwLock::new(None)).collect(),
            instance: RwLock::new(None),
            journal: Mutex::new(Vec::new()),
            properties: ArcSwap::from_pointee(instance_properties.clone()),
            instance_properties,
            registration: Mutex::new(None),
            service_overrides: Mutex::new(Properties::new()),
            state: RwLock::new(InstanceState::Pending),
        })
    }

    /// 不隶属任何管理器的上下文，供构造策略单测使用。
    #[cfg(test)]
    pub(crate) fn detached(
        component: &str,
        id: InstanceId,
        edge_count: usize,
        instance_properties: Properties,
    ) -> Arc<Self> {
        Self::new(
            Arc::from(component),
            id,
            Weak::new(),
            edge_count,
            instance_properties,
        )
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn component_name(&self) -> &str {
        &self.component
    }

    pub fn state(&self) -> InstanceState {
        *self.state.read()
    }

    pub(crate) fn set_state(&self, state: InstanceState) {
        *self.state.write() = state;
    }

    /// 激活时刻合并后的属性快照。
    pub fn properties(&self) -> PropertiesView {
        PropertiesView::from(self.properties.load_full())
    }

    pub(crate) fn instance_properties(&self) -> &Properties {
        &self.instance_properties
    }

    pub(crate) fn refresh_properties(&self, merged: Properties) {
        self.properties.store(Arc::new(merged));
    }

    pub fn instance(&self) -> Option<Arc<dyn Component>> {
        self.instance.read().clone()
    }

    pub(crate) fn set_instance(&self, instance: Arc<dyn Component>) {
        *self.instance.write() = Some(instance);
    }

    /// 本上下文的宿主句柄。
    pub fn component_instance(&self) -> Option<ComponentInstance> {
        self.self_ref.upgrade().map(ComponentInstance::new)
    }

    // ---- 发布的服务 -------------------------------------------------------

    /// 本实例当前发布的服务；组件未声明提供服务或实例未激活时为 `None`。
    pub fn service_handle(&self) -> Option<ServiceHandle> {
        self.registration.lock().clone()
    }

    pub(crate) fn set_registration(&self, handle: ServiceHandle) {
        *self.registration.lock() = Some(handle);
    }

    pub(crate) fn take_registration(&self) -> Option<ServiceHandle> {
        self.registration.lock().take()
    }

    pub(crate) fn replace_service_overrides(&self, properties: Properties) {
        *self.service_overrides.lock() = properties;
    }

    /// 发布用的服务属性：合并属性之上叠加附加属性。
    pub(crate) fn service_properties(&self) -> Properties {
        let mut properties = self.properties().to_properties();
        properties.extend(self.service_overrides.lock().clone());
        properties
    }

    /// 替换本实例所发布服务的附加属性。
    ///
    /// # 教案式说明
    /// - **前置条件**：组件通过 `provides` 声明了提供的服务；
    /// - **后置条件**：附加属性覆盖在合并属性之上。实例已激活时，服务经由管理器队列以新属性
    ///   重新发布（先撤销旧注册再登记新注册，服务标识随之改变）；尚未激活时在下一次发布时生效；
    /// - **错误**：未声明服务返回 [`ComponentError::NoProvidedService`]，管理器已释放返回
    ///   [`ComponentError::RuntimeUnavailable`]。
    pub fn set_service_properties(&self, properties: Properties) -> Result<(), ComponentError> {
        self.manager
            .upgrade()
            .ok_or(ComponentError::RuntimeUnavailable)?
            .update_service_properties(self, properties)
    }

    // ---- 绑定追踪器 -------------------------------------------------------

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// 取得（必要时创建）下标对应的追踪器；下标越界返回 `None`。
    pub(crate) fn edge_info(&self, index: usize) -> Option<Arc<BindingTracker>> {
        let slot = self.edges.get(index)?;
        if let Some(tracker) = slot.read().as_ref() {
            return Some(Arc::clone(tracker));
        }
        let mut slot = slot.write();
        let tracker = slot.get_or_insert_with(|| Arc::new(BindingTracker::new()));
        Some(Arc::clone(tracker))
    }

    /// 只读查看追踪器，不会创建。
    pub fn peek_edge_info(&self, index: usize) -> Option<Arc<BindingTracker>> {
        self.edges.get(index)?.read().clone()
    }

    /// 已分配追踪器的槽位数。
    pub fn allocated_edge_count(&self) -> usize {
        self.edges.iter().filter(|slot| slot.read().is_some()).count()
    }

    fn close_edges(&self) {
        for slot in self.edges.iter() {
            if let Some(tracker) = slot.read().as_ref() {
                tracker.set_open(false);
            }
        }
    }

    fn clear_edge_infos(&self) {
        for slot in self.edges.iter() {
            if let Some(tracker) = slot.write().take() {
                tracker.set_open(false);
            }
        }
    }

    // ---- 绑定日志 ---------------------------------------------------------

    pub(crate) fn record_bind(&self, index: usize, handle: ServiceHandle) {
        self.journal.lock().push((index, handle));
    }

    pub(crate) fn forget_bind(&self, index: usize, handle: &ServiceHandle) {
        let mut journal = self.journal.lock();
        if let Some(position) = journal
            .iter()
            .position(|(bound_index, bound)| *bound_index == index && bound == handle)
        {
            journal.remove(position);
        }
    }

    pub(crate) fn replace_bind(&self, index: usize, previous: &ServiceHandle, next: ServiceHandle) {
        let mut journal = self.journal.lock();
        journal.retain(|(bound_index, bound)| !(*bound_index == index && bound == previous));
        journal.push((index, next));
    }

    /// 按绑定顺序排列的 `(依赖下标, 服务)` 快照。
    pub(crate) fn journal(&self) -> Vec<(usize, ServiceHandle)> {
        self.journal.lock().clone()
    }

    /// 关闭追踪器，停止接受动态绑定。
    pub(crate) fn close(&self) {
        self.close_edges();
    }

    /// 清空追踪器、绑定日志与实现对象。
    pub(crate) fn reset(&self) {
        self.clear_edge_infos();
        self.journal.lock().clear();
        self.instance.write().take();
    }

    // ---- 钩子调用 ---------------------------------------------------------

    pub(crate) fn invoke_bind(&self, reference: &str, handle: &ServiceHandle) {
        if let Some(instance) = self.instance() {
            self.guard_hook("bind", reference, handle, || instance.bind(reference, handle));
        }
    }

    pub(crate) fn invoke_unbind(&self, reference: &str, handle: &ServiceHandle) {
        if let Some(instance) = self.instance() {
            self.guard_hook("unbind", reference, handle, || {
                instance.unbind(reference, handle)
            });
        }
    }

    fn guard_hook<F>(&self, hook: &'static str, reference: &str, handle: &ServiceHandle, call: F)
    where
        F: FnOnce(),
    {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(call)) {
            tracing::warn!(
                component = &*self.component,
                instance = self.id.get(),
                reference,
                service_id = handle.id().get(),
                hook,
                panic = %panic_message(payload.as_ref()),
                "component hook panicked"
            );
        }
    }

    // ---- 实现对象可见的 API ---------------------------------------------

    /// 依赖名称对应的当前最优绑定；未绑定或未知依赖返回 `None`。
    pub fn locate_service(&self, reference: &str) -> Option<ServiceHandle> {
        let manager = self.manager.upgrade()?;
        manager.dependency(reference)?.service(self)
    }

    /// 若 `handle` 当前绑定在该依赖上则返回它。
    pub fn locate_service_ref(
        &self,
        reference: &str,
        handle: &ServiceHandle,
    ) -> Option<ServiceHandle> {
        let manager = self.manager.upgrade()?;
        let index = manager.dependency(reference)?.index();
        let tracker = self.peek_edge_info(index)?;
        tracker.contains(handle).then(|| handle.clone())
    }

    /// 依赖名称对应的全部绑定，按排序从优到劣。
    pub fn locate_services(&self, reference: &str) -> Vec<ServiceHandle> {
        self.manager
            .upgrade()
            .and_then(|manager| {
                manager
                    .dependency(reference)
                    .map(|dependency| dependency.services(self))
            })
            .unwrap_or_default()
    }

    /// 以具体类型取回当前最优绑定的服务对象。
    pub fn locate<T>(&self, reference: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.locate_service(reference)?.downcast::<T>()
    }

    /// 请求处置：工厂实例只处置自身，单例则处置整个组件；请求经由管理器队列异步执行。
    pub fn dispose(&self) {
        if let Some(manager) = self.manager.upgrade() {
            manager.dispose_context(self.id);
        }
    }

    /// 启用同一运行时中的另一个组件。
    pub fn enable_component(&self, name: &str) -> Result<(), ComponentError> {
        self.manager
            .upgrade()
            .ok_or(ComponentError::RuntimeUnavailable)?
            .activator()
            .ok_or(ComponentError::RuntimeUnavailable)?
            .enable_component(name)
    }

    /// 禁用同一运行时中的另一个组件。
    pub fn disable_component(&self, name: &str) -> Result<(), ComponentError> {
        self.manager
            .upgrade()
            .ok_or(ComponentError::RuntimeUnavailable)?
            .activator()
            .ok_or(ComponentError::RuntimeUnavailable)?
            .disable_component(name)
    }
}

impl fmt::Debug for ActivationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivationContext")
            .field("component", &self.component)
            .field("id", &self.id)
            .field("state", &self.state())
            .field("allocated_edges", &self.allocated_edge_count())
            .field("service", &self.service_handle().map(|handle| handle.id()))
            .finish()
    }
}
