//! # 组件实现对象契约
//!
//! ## 核心意图（Why）
//! - [`Component`] 是应用代码实现的唯一接口：激活、失活与动态绑定通知；
//! - [`ComponentInstance`] 是交给宿主的句柄，可读取实现对象并请求处置。
//!
//! ## 行为契约（What）
//! - 所有钩子都在所属组件管理器的串行化线程上调用，不会与同一组件的其它跃迁并发；
//! - 钩子内部再次调用 `enable` / `disable` / `dispose` 时，请求被排队到当前跃迁之后；
//! - 钩子 panic 会被捕获：`activate` 的 panic 视为激活失败，其余钩子的 panic 仅记录日志。

use std::{any::Any, fmt, sync::Arc};

use crate::{
    context::{ActivationContext, InstanceId, InstanceState},
    error::ComponentError,
    properties::PropertiesView,
    service::ServiceHandle,
};

/// 失活原因。
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DeactivationReason {
    /// 组件被显式禁用。
    Disabled,
    /// 依赖丢失且无法替换；携带引用名。
    ReferenceLost(String),
    /// 组件或实例被处置。
    Disposed,
    /// 宿主关闭。
    Shutdown,
}

impl fmt::Display for DeactivationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeactivationReason::Disabled => f.write_str("disabled"),
            DeactivationReason::ReferenceLost(reference) => {
                write!(f, "reference `{reference}` lost")
            }
            DeactivationReason::Disposed => f.write_str("disposed"),
            DeactivationReason::Shutdown => f.write_str("shutdown"),
        }
    }
}

/// 把实现对象转回 `Any`，用于按具体类型取回。
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T> AsAny for T
where
    T: Any + Send + Sync,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// 组件实现对象。
///
/// # 教案式说明
/// - **契约 (What)**：
///   - `bind` 在 `activate` 之前按绑定顺序调用，覆盖激活时刻已绑定的全部服务；
///   - 激活之后，动态依赖的变化通过 `bind` / `unbind` 增量送达；
///   - 失活时先调用 `deactivate`，再按绑定的逆序调用 `unbind`；
/// - **风险 (Trade-offs)**：钩子默认空实现，只关心部分事件的组件无需样板代码。
pub trait Component: AsAny {
    /// 激活钩子；返回错误将回滚本次激活。
    fn activate(&self, context: &ActivationContext) -> Result<(), ComponentError> {
        let _ = context;
        Ok(())
    }

    fn deactivate(&self, context: &ActivationContext, reason: &DeactivationReason) {
        let _ = (context, reason);
    }

    fn bind(&self, reference: &str, service: &ServiceHandle) {
        let _ = (reference, service);
    }

    fn unbind(&self, reference: &str, service: &ServiceHandle) {
        let _ = (reference, service);
    }
}

/// 指向单个激活上下文的宿主句柄。
#[derive(Clone)]
pub struct ComponentInstance {
    context: Arc<ActivationContext>,
}

impl ComponentInstance {
    pub(crate) fn new(context: Arc<ActivationContext>) -> Self {
        Self { context }
    }

    pub fn id(&self) -> InstanceId {
        self.context.id()
    }

    pub fn state(&self) -> InstanceState {
        self.context.state()
    }

    pub fn context(&self) -> &Arc<ActivationContext> {
        &self.context
    }

    pub fn properties(&self) -> PropertiesView {
        self.context.properties()
    }

    /// 当前实现对象；未激活或已失活时为 `None`。
    pub fn instance(&self) -> Option<Arc<dyn Component>> {
        self.context.instance()
    }

    /// 以具体类型取回实现对象。
    pub fn downcast<T>(&self) -> Option<Arc<T>>
    where
        T: Component,
    {
        self.instance()?.as_any_arc().downcast::<T>().ok()
    }

    /// 请求处置该实例，见 [`ActivationContext::dispose`]。
    pub fn dispose(&self) {
        self.context.dispose();
    }
}

impl fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("component", &self.context.component_name())
            .field("id", &self.context.id())
            .field("state", &self.context.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_render_for_logs() {
        assert_eq!(
            DeactivationReason::ReferenceLost("db".to_owned()).to_string(),
            "reference `db` lost"
        );
        assert_eq!(DeactivationReason::Shutdown.to_string(), "shutdown");
    }
}
