//! # 构造策略
//!
//! ## 核心意图（Why）
//! - 把“如何创建实现对象”从生命周期状态机中剥离出来，宿主可以替换为依赖注入式构造；
//! - 默认策略只接受无参构造器，与最朴素的组件模型保持一致。
//!
//! ## 行为契约（What）
//! - 构造器返回错误或发生 panic 时，统一转换为 [`ComponentError::Instantiation`]；
//! - 构造发生在绑定追踪器填充之后，因此注入式构造器可以通过上下文读取已绑定的服务；
//! - 策略不得自行调用绑定钩子，钩子由组件管理器在构造成功后按绑定顺序触发。

use std::{
    any::type_name,
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use crate::{
    component::Component,
    context::ActivationContext,
    error::{ComponentError, panic_message},
    observability::ComponentLogger,
};

type NoArgConstructor = Arc<dyn Fn() -> Result<Arc<dyn Component>, ComponentError> + Send + Sync>;
type InjectingConstructor =
    Arc<dyn Fn(&ActivationContext) -> Result<Arc<dyn Component>, ComponentError> + Send + Sync>;

/// 组件实现“类”：名称 + 可选的构造器集合。
///
/// # 教案式说明
/// - **意图 (Why)**：Rust 没有反射，构造能力需在注册时显式提供；
/// - **契约 (What)**：
///   - [`ComponentClass::of`] 为实现了 `Default` 的类型注册无参构造器；
///   - [`ComponentClass::named`] 只声明名称，不带任何构造器，默认策略下必然构造失败；
///   - 克隆只复制引用计数。
#[derive(Clone)]
pub struct ComponentClass {
    name: Arc<str>,
    no_arg: Option<NoArgConstructor>,
    injecting: Option<InjectingConstructor>,
}

impl ComponentClass {
    /// 以类型名为类名，注册 `T::default` 作为无参构造器。
    pub fn of<T>() -> Self
    where
        T: Component + Default,
    {
        Self::named(type_name::<T>())
            .with_constructor(|| Ok(Arc::new(T::default()) as Arc<dyn Component>))
    }

    /// 仅声明类名。
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            no_arg: None,
            injecting: None,
        }
    }

    /// 注册（或替换）无参构造器。
    pub fn with_constructor<F>(mut self, constructor: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn Component>, ComponentError> + Send + Sync + 'static,
    {
        self.no_arg = Some(Arc::new(constructor));
        self
    }

    /// 注册（或替换）接收激活上下文的构造器，仅 [`InjectingConstruction`] 会使用它。
    pub fn with_injecting_constructor<F>(mut self, constructor: F) -> Self
    where
        F: Fn(&ActivationContext) -> Result<Arc<dyn Component>, ComponentError>
            + Send
            + Sync
            + 'static,
    {
        self.injecting = Some(Arc::new(constructor));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_injecting_constructor(&self) -> bool {
        self.injecting.is_some()
    }

    fn construct_no_arg(&self, component: &str) -> Result<Arc<dyn Component>, ComponentError> {
        let constructor = self.no_arg.as_ref().ok_or_else(|| {
            ComponentError::instantiation(
                component,
                self.name(),
                "no public no-argument constructor",
            )
        })?;
        self.guarded(component, || constructor())
    }

    fn construct_injecting(
        &self,
        component: &str,
        context: &ActivationContext,
    ) -> Result<Arc<dyn Component>, ComponentError> {
        let constructor = self.injecting.as_ref().ok_or_else(|| {
            ComponentError::instantiation(component, self.name(), "no injecting constructor")
        })?;
        self.guarded(component, || constructor(context))
    }

    /// 执行构造器，并把错误与 panic 归一为实例化失败。
    fn guarded<F>(&self, component: &str, constructor: F) -> Result<Arc<dyn Component>, ComponentError>
    where
        F: FnOnce() -> Result<Arc<dyn Component>, ComponentError>,
    {
        match catch_unwind(AssertUnwindSafe(constructor)) {
            Ok(Ok(instance)) => Ok(instance),
            Ok(Err(error @ ComponentError::Instantiation { .. })) => Err(error),
            Ok(Err(error)) => Err(ComponentError::instantiation(
                component,
                self.name(),
                error.to_string(),
            )),
            Err(payload) => Err(ComponentError::instantiation(
                component,
                self.name(),
                format!("constructor panicked: {}", panic_message(payload.as_ref())),
            )),
        }
    }
}

impl fmt::Debug for ComponentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentClass")
            .field("name", &self.name)
            .field("no_arg", &self.no_arg.is_some())
            .field("injecting", &self.injecting.is_some())
            .finish()
    }
}

/// 可插拔的实例构造能力。
///
/// # 教案式说明
/// - **前置条件**：调用时上下文处于 `Activating`，所有依赖的追踪器已填充；
/// - **后置条件**：成功时返回尚未激活的实现对象；失败时不得留下副作用；
/// - **线程模型**：在组件管理器的串行化线程上调用。
pub trait ConstructionStrategy: Send + Sync {
    fn construct(
        &self,
        class: &ComponentClass,
        context: &ActivationContext,
        logger: &ComponentLogger,
    ) -> Result<Arc<dyn Component>, ComponentError>;
}

impl<F> ConstructionStrategy for F
where
    F: Fn(&ComponentClass, &ActivationContext, &ComponentLogger) -> Result<Arc<dyn Component>, ComponentError>
        + Send
        + Sync,
{
    fn construct(
        &self,
        class: &ComponentClass,
        context: &ActivationContext,
        logger: &ComponentLogger,
    ) -> Result<Arc<dyn Component>, ComponentError> {
        self(class, context, logger)
    }
}

/// 默认策略：只使用无参构造器。
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultConstruction;

impl ConstructionStrategy for DefaultConstruction {
    fn construct(
        &self,
        class: &ComponentClass,
        context: &ActivationContext,
        logger: &ComponentLogger,
    ) -> Result<Arc<dyn Component>, ComponentError> {
        logger.debug(&format!("constructing `{}`", class.name()));
        class.construct_no_arg(context.component_name())
    }
}

/// 注入式策略：优先使用接收上下文的构造器，缺失时退回无参构造器。
#[derive(Clone, Copy, Debug, Default)]
pub struct InjectingConstruction;

impl ConstructionStrategy for InjectingConstruction {
    fn construct(
        &self,
        class: &ComponentClass,
        context: &ActivationContext,
        logger: &ComponentLogger,
    ) -> Result<Arc<dyn Component>, ComponentError> {
        if class.has_injecting_constructor() {
            return class.construct_injecting(context.component_name(), context);
        }
        logger.debug(&format!(
            "`{}` has no injecting constructor; falling back to no-argument constructor",
            class.name()
        ));
        class.construct_no_arg(context.component_name())
    }
}
