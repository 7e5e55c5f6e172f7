//! 服务句柄与排序规则。
//!
//! 注册表发布的每个服务都以 [`ServiceHandle`] 形式流入引擎；句柄不可变，克隆只增加引用计数。

use std::{any::Any, cmp::Ordering, fmt, sync::Arc};

use crate::properties::{Properties, PropertiesView};

/// 注册表分配的服务标识，单调递增。
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ServiceId(u64);

impl ServiceId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 服务排序键：越大越优先。
///
/// # 契约说明 (What)
/// - 先比较 `ranking`，数值越大越优先；
/// - `ranking` 相同时比较 `ServiceId`，标识越小（越早注册）越优先；
/// - 因 `ServiceId` 唯一，该顺序是全序，贪婪策略下不存在“平局”。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ServiceRank {
    ranking: i32,
    service_id: ServiceId,
}

impl ServiceRank {
    pub const fn new(ranking: i32, service_id: ServiceId) -> Self {
        Self {
            ranking,
            service_id,
        }
    }

    pub const fn ranking(&self) -> i32 {
        self.ranking
    }

    pub const fn service_id(&self) -> ServiceId {
        self.service_id
    }
}

impl Ord for ServiceRank {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ranking
            .cmp(&other.ranking)
            .then_with(|| other.service_id.cmp(&self.service_id))
    }
}

impl PartialOrd for ServiceRank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct ServiceRecord {
    id: ServiceId,
    interface: Arc<str>,
    ranking: i32,
    properties: PropertiesView,
    object: Arc<dyn Any + Send + Sync>,
}

/// 注册表中一个已发布服务的句柄。
///
/// - 相等性与哈希只依据 [`ServiceId`]；
/// - `object` 以 `Arc<dyn Any + Send + Sync>` 保存，通过 [`ServiceHandle::downcast`] 取回具体类型。
#[derive(Clone)]
pub struct ServiceHandle {
    record: Arc<ServiceRecord>,
}

impl ServiceHandle {
    pub fn new(
        id: ServiceId,
        interface: impl Into<Arc<str>>,
        ranking: i32,
        properties: Properties,
        object: Arc<dyn Any + Send + Sync>,
    ) -> Self {
        Self {
            record: Arc::new(ServiceRecord {
                id,
                interface: interface.into(),
                ranking,
                properties: PropertiesView::new(properties),
                object,
            }),
        }
    }

    pub fn id(&self) -> ServiceId {
        self.record.id
    }

    pub fn interface(&self) -> &str {
        &self.record.interface
    }

    pub fn ranking(&self) -> i32 {
        self.record.ranking
    }

    pub fn properties(&self) -> &PropertiesView {
        &self.record.properties
    }

    /// 句柄自带的默认排序键，注册表可直接复用。
    pub fn natural_rank(&self) -> ServiceRank {
        ServiceRank::new(self.record.ranking, self.record.id)
    }

    pub fn downcast<T>(&self) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        Arc::clone(&self.record.object).downcast::<T>().ok()
    }
}

impl PartialEq for ServiceHandle {
    fn eq(&self, other: &Self) -> bool {
        self.record.id == other.record.id
    }
}

impl Eq for ServiceHandle {}

impl std::hash::Hash for ServiceHandle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.record.id.hash(state);
    }
}

impl fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("id", &self.record.id)
            .field("interface", &self.record.interface)
            .field("ranking", &self.record.ranking)
            .finish()
    }
}
