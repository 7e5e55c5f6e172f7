//! # InMemoryServiceRegistry：进程内服务注册表
//!
//! ## 核心意图（Why）
//! - 为宿主与测试提供一个可直接使用的 [`ServiceRegistry`] 实现；
//! - 以 `DashMap` 保存订阅，以 `RwLock<BTreeMap>` 保存服务，遍历顺序与注册顺序一致。
//!
//! ## 行为契约（What）
//! - `register` / `unregister` 在调用线程上同步派发事件，派发时不持有服务表与订阅表的锁；
//! - 所有“变更 + 派发”在同一把可重入锁内完成，因此同一服务的事件严格按变更顺序送达，
//!   而监听器回调中再次注册服务（同线程重入）不会死锁；
//! - 变更总是先于派发写入服务表：撤销时服务先从表中移除，此后建立的订阅既收不到该服务的
//!   `Unregistering`，也不会在 `current_candidates` 中看到它。
//!
//! ## 风险提示（Trade-offs）
//! - 派发锁让不同线程的注册串行化；组件钩子若长时间阻塞，会推迟其它线程的注册完成时间。

use std::{
    any::Any,
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use dashmap::DashMap;
use parking_lot::{ReentrantMutex, RwLock};

use super::{ServiceEvent, ServiceListener, ServiceRegistry, SubscriptionId, TargetFilter};
use crate::{
    properties::Properties,
    service::{ServiceHandle, ServiceId},
};

struct Subscription {
    target: TargetFilter,
    listener: Arc<dyn ServiceListener>,
}

/// 进程内服务注册表。
pub struct InMemoryServiceRegistry {
    next_service_id: AtomicU64,
    next_subscription_id: AtomicU64,
    services: RwLock<BTreeMap<ServiceId, ServiceHandle>>,
    subscriptions: DashMap<SubscriptionId, Subscription>,
    delivery: ReentrantMutex<()>,
}

impl Default for InMemoryServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryServiceRegistry {
    pub fn new() -> Self {
        Self {
            next_service_id: AtomicU64::new(1),
            next_subscription_id: AtomicU64::new(1),
            services: RwLock::new(BTreeMap::new()),
            subscriptions: DashMap::new(),
            delivery: ReentrantMutex::new(()),
        }
    }

    /// 发布服务并通知匹配的订阅者。
    pub fn register(
        &self,
        interface: &str,
        ranking: i32,
        properties: Properties,
        object: Arc<dyn Any + Send + Sync>,
    ) -> ServiceHandle {
        let _delivery = self.delivery.lock();
        let id = ServiceId::new(self.next_service_id.fetch_add(1, Ordering::Relaxed));
        let handle = ServiceHandle::new(id, interface, ranking, properties, object);
        self.services.write().insert(id, handle.clone());
        tracing::trace!(service_id = id.get(), interface, ranking, "service registered");
        self.dispatch(&ServiceEvent::Registered(handle.clone()));
        handle
    }

    /// [`register`](Self::register) 的便捷形式：无额外属性。
    pub fn register_object<T>(&self, interface: &str, ranking: i32, object: T) -> ServiceHandle
    where
        T: Any + Send + Sync,
    {
        self.register(interface, ranking, Properties::new(), Arc::new(object))
    }

    /// 撤销服务；返回服务此前是否在册。
    ///
    /// 先从表中移除再派发 `Unregistering`；监听器通过事件携带的句柄访问服务对象。
    pub fn unregister(&self, handle: &ServiceHandle) -> bool {
        let _delivery = self.delivery.lock();
        if self.services.write().remove(&handle.id()).is_none() {
            return false;
        }
        tracing::trace!(service_id = handle.id().get(), "service unregistered");
        self.dispatch(&ServiceEvent::Unregistering(handle.clone()));
        true
    }

    /// 当前在册服务，按注册顺序排列。
    pub fn services(&self) -> Vec<ServiceHandle> {
        self.services.read().values().cloned().collect()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    fn dispatch(&self, event: &ServiceEvent) {
        let mut listeners: Vec<(SubscriptionId, Arc<dyn ServiceListener>)> = self
            .subscriptions
            .iter()
            .filter(|entry| entry.value().target.matches(event.handle()))
            .map(|entry| (*entry.key(), Arc::clone(&entry.value().listener)))
            .collect();
        listeners.sort_by_key(|(id, _)| *id);
        for (_, listener) in listeners {
            listener.service_changed(event);
        }
    }
}

impl ServiceRegistry for InMemoryServiceRegistry {
    fn subscribe(
        &self,
        target: &TargetFilter,
        listener: Arc<dyn ServiceListener>,
    ) -> SubscriptionId {
        let id = SubscriptionId::new(self.next_subscription_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions.insert(
            id,
            Subscription {
                target: target.clone(),
                listener,
            },
        );
        id
    }

    fn unsubscribe(&self, subscription: SubscriptionId) {
        self.subscriptions.remove(&subscription);
    }

    fn current_candidates(&self, target: &TargetFilter) -> Vec<ServiceHandle> {
        self.services
            .read()
            .values()
            .filter(|handle| target.matches(handle))
            .cloned()
            .collect()
    }

    fn publish(
        &self,
        interface: &str,
        ranking: i32,
        properties: Properties,
        object: Arc<dyn Any + Send + Sync>,
    ) -> ServiceHandle {
        self.register(interface, ranking, properties, object)
    }

    fn withdraw(&self, handle: &ServiceHandle) -> bool {
        self.unregister(handle)
    }
}

impl core::fmt::Debug for InMemoryServiceRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InMemoryServiceRegistry")
            .field("service_count", &self.services.read().len())
            .field("subscription_count", &self.subscriptions.len())
            .finish()
    }
}
