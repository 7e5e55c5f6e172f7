//! # 服务注册表接口
//!
//! ## 核心意图（Why）
//! - 注册表负责发布 / 撤销服务，并在变化时通知订阅者；对本引擎而言它是外部协作者；
//! - 引擎消费订阅、退订、排序与查询当前候选集四个能力，并借发布 / 撤销能力登记组件自身提供的服务。
//!
//! ## 行为契约（What）
//! - 同一服务的 `Registered` 必须先于其 `Unregistering` 送达；
//! - 订阅与候选快照之间不得遗漏撤销：服务在派发 `Unregistering` 之前必须已从
//!   `current_candidates` 的结果中消失，否则在派发期间订阅的组件会把已撤销的服务当作候选；
//! - 监听器可能在任意线程被调用，调用期间注册表不得持有会被回调重入的锁；
//! - 过滤匹配对引擎是黑盒，[`TargetFilter`] 仅是一个可比较的描述值。

mod in_memory;

use std::{any::Any, collections::BTreeMap, fmt, sync::Arc};

pub use in_memory::InMemoryServiceRegistry;

use crate::{
    properties::Properties,
    service::{ServiceHandle, ServiceRank},
};

/// 订阅标识。
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

/// 依赖的目标描述：服务接口名 + 必须相等的属性。
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TargetFilter {
    interface: String,
    required: BTreeMap<String, String>,
}

impl TargetFilter {
    pub fn interface(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            required: BTreeMap::new(),
        }
    }

    /// 追加一条属性等值约束。
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.required.insert(key.into(), value.into());
        self
    }

    pub fn interface_name(&self) -> &str {
        &self.interface
    }

    /// 判定服务是否匹配：接口名相等，且每条约束在服务属性中以相同文本出现。
    pub fn matches(&self, handle: &ServiceHandle) -> bool {
        handle.interface() == self.interface
            && self.required.iter().all(|(key, expected)| {
                handle
                    .properties()
                    .get(key)
                    .is_some_and(|actual| actual.to_string() == *expected)
            })
    }
}

impl fmt::Display for TargetFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.interface)?;
        for (key, value) in &self.required {
            write!(f, "({key}={value})")?;
        }
        Ok(())
    }
}

/// 注册表送达的服务变化。
#[derive(Clone, Debug)]
pub enum ServiceEvent {
    Registered(ServiceHandle),
    Unregistering(ServiceHandle),
}

impl ServiceEvent {
    pub fn handle(&self) -> &ServiceHandle {
        match self {
            ServiceEvent::Registered(handle) | ServiceEvent::Unregistering(handle) => handle,
        }
    }
}

/// 订阅者回调。
pub trait ServiceListener: Send + Sync {
    fn service_changed(&self, event: &ServiceEvent);
}

/// 引擎消费的注册表能力。
pub trait ServiceRegistry: Send + Sync {
    /// 订阅匹配 `target` 的服务变化。
    fn subscribe(&self, target: &TargetFilter, listener: Arc<dyn ServiceListener>)
    -> SubscriptionId;

    /// 取消订阅；对未知标识静默忽略。
    fn unsubscribe(&self, subscription: SubscriptionId);

    /// 服务排序键，越大越优先。
    fn rank(&self, handle: &ServiceHandle) -> ServiceRank {
        handle.natural_rank()
    }

    /// 当前匹配 `target` 的全部服务。
    ///
    /// 已开始派发 `Unregistering` 的服务不得再出现在结果中。
    fn current_candidates(&self, target: &TargetFilter) -> Vec<ServiceHandle>;

    /// 发布服务并通知匹配的订阅者。
    fn publish(
        &self,
        interface: &str,
        ranking: i32,
        properties: Properties,
        object: Arc<dyn Any + Send + Sync>,
    ) -> ServiceHandle;

    /// 撤销服务；返回服务此前是否在册。
    fn withdraw(&self, handle: &ServiceHandle) -> bool;
}
