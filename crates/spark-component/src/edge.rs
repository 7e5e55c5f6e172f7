//! # BindingTracker：单实例、单依赖的绑定账本
//!
//! ## 核心意图（Why）
//! - 记录某个激活上下文在某条依赖上当前绑定的服务句柄，以及是否接受新的动态绑定；
//! - 只做簿记，不调用组件钩子，也不做任何排序决策。
//!
//! ## 行为契约（What）
//! - 每次变更都在同一把写锁内完成，读者只能看到变更前或变更后的完整集合；
//! - `replace` 在一次加锁内完成“换下旧句柄、换上新句柄”，不会暴露中间的空集合；
//! - 追踪器由激活上下文独占，从不在上下文之间共享。

use parking_lot::RwLock;

use crate::service::ServiceHandle;

#[derive(Debug, Default)]
struct TrackerState {
    bound: Vec<ServiceHandle>,
    open: bool,
}

/// 单条依赖在单个实例上的绑定集合。
#[derive(Debug, Default)]
pub struct BindingTracker {
    state: RwLock<TrackerState>,
}

impl BindingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 是否接受新的动态绑定。
    pub fn is_open(&self) -> bool {
        self.state.read().open
    }

    pub(crate) fn set_open(&self, open: bool) {
        self.state.write().open = open;
    }

    pub fn len(&self) -> usize {
        self.state.read().bound.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().bound.is_empty()
    }

    pub fn contains(&self, handle: &ServiceHandle) -> bool {
        self.state.read().bound.contains(handle)
    }

    /// 按绑定顺序返回的一致快照。
    pub fn snapshot(&self) -> Vec<ServiceHandle> {
        self.state.read().bound.clone()
    }

    pub fn first(&self) -> Option<ServiceHandle> {
        self.state.read().bound.first().cloned()
    }

    /// 追加句柄；已存在时返回 `false`。
    pub(crate) fn insert(&self, handle: ServiceHandle) -> bool {
        let mut state = self.state.write();
        if state.bound.contains(&handle) {
            return false;
        }
        state.bound.push(handle);
        true
    }

    /// 移除句柄；不存在时返回 `false`。
    pub(crate) fn remove(&self, handle: &ServiceHandle) -> bool {
        let mut state = self.state.write();
        match state.bound.iter().position(|bound| bound == handle) {
            Some(position) => {
                state.bound.remove(position);
                true
            }
            None => false,
        }
    }

    /// 原子地以 `next` 替换 `previous`，保持原位置；`previous` 未绑定时返回 `false` 且不做修改。
    pub(crate) fn replace(&self, previous: &ServiceHandle, next: ServiceHandle) -> bool {
        let mut state = self.state.write();
        match state.bound.iter().position(|bound| bound == previous) {
            Some(position) => {
                state.bound[position] = next;
                true
            }
            None => false,
        }
    }

    /// 以给定集合整体覆盖当前绑定，并打开追踪器。
    pub(crate) fn reset_open(&self, bound: Vec<ServiceHandle>) {
        let mut state = self.state.write();
        state.bound = bound;
        state.open = true;
    }
}
