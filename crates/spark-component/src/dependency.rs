//! # DependencyManager：单条依赖的绑定协议
//!
//! ## 核心意图（Why）
//! - 一条依赖声明对应一个依赖管理器，由所属组件的全部激活上下文共享；
//! - 维护候选集（注册表中当前匹配的服务，按排序从优到劣），并在服务到达 / 离开时
//!   决定每个上下文的追踪器如何变化；
//! - 只通过稳定下标访问上下文中的追踪器，从不持有追踪器的长期引用。
//!
//! ## 行为契约（What）
//! - 所有修改性操作只在所属组件管理器的串行化线程上调用；
//! - 静态策略：激活后绑定不可变，新服务 [`BindOutcome::Deferred`]，已绑定服务离开时
//!   [`UnbindOutcome::Reactivate`]，由管理器整体失活后重新评估；
//! - 动态单值：贪婪策略下排序更高的服务到达时原子替换，组件先收到新服务的 `bind`
//!   再收到旧服务的 `unbind`；离开时优先以剩余最优候选替换；
//! - 动态多值：逐个追加 / 移除，必选依赖跌破最小值时要求失活。
//!
//! ## 风险提示（Trade-offs）
//! - 候选集以有序 `Vec` 保存，插入为 O(n)；单条依赖的候选数通常很小。

use std::{
    fmt,
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::{Mutex, RwLock};

use crate::{
    context::{ActivationContext, InstanceState},
    manager::{Command, ManagerInner},
    metadata::{Cardinality, ReferenceMetadata, ReferencePolicy, ReferencePolicyOption},
    registry::{ServiceEvent, ServiceListener, ServiceRegistry, SubscriptionId, TargetFilter},
    service::{ServiceHandle, ServiceRank},
};

/// 服务到达时对单个上下文的处理结果。
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BindOutcome {
    /// 上下文未激活、追踪器未打开、服务已绑定或不值得切换。
    Ignored,
    /// 静态依赖：仅作为候选记录，等待下一次激活。
    Deferred,
    /// 新增绑定并已调用 `bind` 钩子。
    Bound,
    /// 贪婪替换：已调用新服务的 `bind` 与旧服务的 `unbind`。
    Replaced { previous: ServiceHandle },
}

/// 服务离开时对单个上下文的处理结果。
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UnbindOutcome {
    /// 服务未绑定在该上下文上。
    NotBound,
    /// 已移除绑定并调用 `unbind` 钩子。
    Unbound,
    /// 已以替代服务重新绑定，无需失活。
    Rebound { replacement: ServiceHandle },
    /// 必选依赖无可替代，上下文需要失活。
    Deactivate,
    /// 静态依赖的已绑定服务离开，上下文需要整体失活后重新评估。
    Reactivate,
}

impl UnbindOutcome {
    pub fn requires_teardown(&self) -> bool {
        matches!(self, UnbindOutcome::Deactivate | UnbindOutcome::Reactivate)
    }
}

/// 注册表事件到组件管理器命令的转换器。
///
/// 每次订阅创建一个新的转换器并携带订阅代次，退订前已入队的旧代次事件在执行时被丢弃。
struct DependencyListener {
    manager: Weak<ManagerInner>,
    index: usize,
    epoch: u64,
}

impl ServiceListener for DependencyListener {
    fn service_changed(&self, event: &ServiceEvent) {
        let Some(manager) = self.manager.upgrade() else {
            return;
        };
        let command = match event {
            ServiceEvent::Registered(handle) => Command::ServiceArrived {
                index: self.index,
                epoch: self.epoch,
                handle: handle.clone(),
            },
            ServiceEvent::Unregistering(handle) => Command::ServiceDeparted {
                index: self.index,
                epoch: self.epoch,
                handle: handle.clone(),
            },
        };
        manager.submit(command);
    }
}

/// 单条依赖声明的运行期管理器。
pub struct DependencyManager {
    reference: ReferenceMetadata,
    component: Arc<str>,
    registry: Arc<dyn ServiceRegistry>,
    manager: Weak<ManagerInner>,
    epoch: AtomicU64,
    subscription: Mutex<Option<SubscriptionId>>,
    candidates: RwLock<Vec<(ServiceRank, ServiceHandle)>>,
}

impl DependencyManager {
    pub(crate) fn new(
        reference: ReferenceMetadata,
        component: Arc<str>,
        registry: Arc<dyn ServiceRegistry>,
        manager: Weak<ManagerInner>,
    ) -> Self {
        Self {
            reference,
            component,
            registry,
            manager,
            epoch: AtomicU64::new(0),
            subscription: Mutex::new(None),
            candidates: RwLock::new(Vec::new()),
        }
    }

    /// 依赖下标，等于声明位置。
    pub fn index(&self) -> usize {
        self.reference.index()
    }

    pub fn name(&self) -> &str {
        self.reference.name()
    }

    pub fn reference(&self) -> &ReferenceMetadata {
        &self.reference
    }

    pub fn cardinality(&self) -> Cardinality {
        self.reference.get_cardinality()
    }

    pub fn policy(&self) -> ReferencePolicy {
        self.reference.get_policy()
    }

    pub fn policy_option(&self) -> ReferencePolicyOption {
        self.reference.get_policy_option()
    }

    pub fn target(&self) -> &TargetFilter {
        self.reference.target_filter()
    }

    fn minimum(&self) -> usize {
        self.cardinality().minimum()
    }

    // ---- 候选集 -----------------------------------------------------------

    /// 订阅注册表并以当前匹配的服务填充候选集。
    ///
    /// 先订阅再取快照：快照之后到达的服务由订阅送达，重复项由 [`Self::add_candidate`] 去重；
    /// 撤销中的服务已不在快照里，见 [`ServiceRegistry::current_candidates`]。
    pub(crate) fn open(&self) {
        let mut subscription = self.subscription.lock();
        if subscription.is_none() {
            let listener: Arc<dyn ServiceListener> = Arc::new(DependencyListener {
                manager: self.manager.clone(),
                index: self.index(),
                epoch: self.epoch.fetch_add(1, Ordering::AcqRel) + 1,
            });
            *subscription = Some(self.registry.subscribe(self.target(), listener));
        }
        drop(subscription);

        for handle in self.registry.current_candidates(self.target()) {
            self.add_candidate(handle);
        }
        tracing::trace!(
            component = &*self.component,
            reference = self.name(),
            interface = self.target().interface_name(),
            candidates = self.candidates.read().len(),
            "dependency opened"
        );
    }

    /// 退订并清空候选集。
    pub(crate) fn close(&self) {
        if let Some(subscription) = self.subscription.lock().take() {
            self.registry.unsubscribe(subscription);
        }
        self.candidates.write().clear();
    }

    /// 事件是否来自当前仍然有效的订阅。
    pub(crate) fn is_current(&self, epoch: u64) -> bool {
        self.subscription.lock().is_some() && self.epoch.load(Ordering::Acquire) == epoch
    }

    /// 记录候选；已存在时返回 `false`。
    pub(crate) fn add_candidate(&self, handle: ServiceHandle) -> bool {
        let rank = self.registry.rank(&handle);
        let mut candidates = self.candidates.write();
        if candidates.iter().any(|(_, known)| *known == handle) {
            return false;
        }
        let position = candidates
            .iter()
            .position(|(known_rank, _)| *known_rank < rank)
            .unwrap_or(candidates.len());
        candidates.insert(position, (rank, handle));
        true
    }

    /// 移除候选；不存在时返回 `false`。
    pub(crate) fn remove_candidate(&self, handle: &ServiceHandle) -> bool {
        let mut candidates = self.candidates.write();
        let before = candidates.len();
        candidates.retain(|(_, known)| known != handle);
        candidates.len() != before
    }

    /// 候选数是否达到基数下限。
    pub fn has_candidates(&self) -> bool {
        self.candidates.read().len() >= self.minimum()
    }

    /// 当前候选，按排序从优到劣。
    pub fn candidates(&self) -> Vec<ServiceHandle> {
        self.candidates
            .read()
            .iter()
            .map(|(_, handle)| handle.clone())
            .collect()
    }

    fn best_candidate(&self, excluding: &ServiceHandle) -> Option<ServiceHandle> {
        self.candidates
            .read()
            .iter()
            .find(|(_, handle)| handle != excluding)
            .map(|(_, handle)| handle.clone())
    }

    // ---- 绑定协议 ---------------------------------------------------------

    /// 激活路径：以当前候选填充并打开追踪器，同时写入绑定日志。
    pub(crate) fn bind_initial(&self, context: &ActivationContext) {
        let Some(tracker) = context.edge_info(self.index()) else {
            return;
        };
        let chosen: Vec<ServiceHandle> = if self.cardinality().is_multiple() {
            self.candidates()
        } else {
            self.candidates().into_iter().take(1).collect()
        };
        for handle in &chosen {
            context.record_bind(self.index(), handle.clone());
        }
        tracker.reset_open(chosen);
    }

    /// 服务到达时更新单个上下文。
    pub(crate) fn bind(&self, context: &ActivationContext, handle: &ServiceHandle) -> BindOutcome {
        if context.state() != InstanceState::Active {
            return BindOutcome::Ignored;
        }
        let Some(tracker) = context.peek_edge_info(self.index()) else {
            return BindOutcome::Ignored;
        };
        if !tracker.is_open() || tracker.contains(handle) {
            return BindOutcome::Ignored;
        }
        if self.reference.is_static() {
            return BindOutcome::Deferred;
        }

        if self.cardinality().is_multiple() {
            tracker.insert(handle.clone());
            context.record_bind(self.index(), handle.clone());
            context.invoke_bind(self.name(), handle);
            return BindOutcome::Bound;
        }

        match tracker.first() {
            None => {
                tracker.insert(handle.clone());
                context.record_bind(self.index(), handle.clone());
                context.invoke_bind(self.name(), handle);
                BindOutcome::Bound
            }
            Some(current)
                if self.reference.is_greedy()
                    && self.registry.rank(handle) > self.registry.rank(&current) =>
            {
                if !tracker.replace(&current, handle.clone()) {
                    return BindOutcome::Ignored;
                }
                context.replace_bind(self.index(), &current, handle.clone());
                context.invoke_bind(self.name(), handle);
                context.invoke_unbind(self.name(), &current);
                BindOutcome::Replaced { previous: current }
            }
            Some(_) => BindOutcome::Ignored,
        }
    }

    /// 服务离开时更新单个上下文；调用前候选集中应已移除 `handle`。
    pub(crate) fn unbind(
        &self,
        context: &ActivationContext,
        handle: &ServiceHandle,
    ) -> UnbindOutcome {
        let Some(tracker) = context.peek_edge_info(self.index()) else {
            return UnbindOutcome::NotBound;
        };
        if !tracker.contains(handle) {
            return UnbindOutcome::NotBound;
        }
        if self.reference.is_static() {
            return UnbindOutcome::Reactivate;
        }

        if self.cardinality().is_multiple() {
            if self.cardinality().is_mandatory() && tracker.len() <= self.minimum() {
                return UnbindOutcome::Deactivate;
            }
            tracker.remove(handle);
            context.forget_bind(self.index(), handle);
            context.invoke_unbind(self.name(), handle);
            return UnbindOutcome::Unbound;
        }

        match self.best_candidate(handle) {
            Some(replacement) => {
                tracker.replace(handle, replacement.clone());
                context.replace_bind(self.index(), handle, replacement.clone());
                context.invoke_bind(self.name(), &replacement);
                context.invoke_unbind(self.name(), handle);
                UnbindOutcome::Rebound { replacement }
            }
            None if self.cardinality().is_mandatory() => UnbindOutcome::Deactivate,
            None => {
                tracker.remove(handle);
                context.forget_bind(self.index(), handle);
                context.invoke_unbind(self.name(), handle);
                UnbindOutcome::Unbound
            }
        }
    }

    /// 该上下文的追踪器是否达到基数下限。
    pub fn is_satisfied(&self, context: &ActivationContext) -> bool {
        let minimum = self.minimum();
        minimum == 0
            || context
                .peek_edge_info(self.index())
                .is_some_and(|tracker| tracker.len() >= minimum)
    }

    /// 该上下文上排序最优的绑定。
    pub fn service(&self, context: &ActivationContext) -> Option<ServiceHandle> {
        let tracker = context.peek_edge_info(self.index())?;
        tracker
            .snapshot()
            .into_iter()
            .max_by_key(|handle| self.registry.rank(handle))
    }

    /// 该上下文上的全部绑定，按排序从优到劣。
    pub fn services(&self, context: &ActivationContext) -> Vec<ServiceHandle> {
        let Some(tracker) = context.peek_edge_info(self.index()) else {
            return Vec::new();
        };
        let mut bound = tracker.snapshot();
        bound.sort_by_key(|handle| std::cmp::Reverse(self.registry.rank(handle)));
        bound
    }
}

impl fmt::Debug for DependencyManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyManager")
            .field("component", &self.component)
            .field("reference", &self.reference.name())
            .field("index", &self.index())
            .field("cardinality", &self.cardinality())
            .field("policy", &self.policy())
            .field("policy_option", &self.policy_option())
            .field("candidates", &self.candidates.read().len())
            .finish()
    }
}
