#![deny(unsafe_code)]
#![allow(clippy::result_large_err)]
#![doc = "spark-component: 组件生命周期与动态依赖绑定引擎。"]
#![doc = ""]
#![doc = "== 核心构件 =="]
#![doc = "1. `ComponentManager`：单个组件配置的状态机，串行化自身的状态跃迁。"]
#![doc = "2. `DependencyManager`：单条依赖声明的绑定协议，按稳定下标访问每个实例的绑定追踪器。"]
#![doc = "3. `ActivationContext`：单个实现对象的运行期上下文，提供 `locate_service` 与处置入口。"]
#![doc = "4. `ConstructionStrategy`：可插拔的实例构造能力，默认要求无参构造器。"]
#![doc = ""]
#![doc = "服务注册表、配置存储与日志均视为外部协作者，仅通过窄接口消费。"]

pub mod component;
pub mod construct;
pub mod context;
pub mod dependency;
pub mod edge;
pub mod error;
pub mod manager;
pub mod metadata;
pub mod observability;
pub mod properties;
pub mod registry;
pub mod runtime;
pub mod service;

pub use component::{Component, ComponentInstance, DeactivationReason};
pub use construct::{ComponentClass, ConstructionStrategy, DefaultConstruction, InjectingConstruction};
pub use context::{ActivationContext, InstanceId, InstanceState};
pub use dependency::{BindOutcome, DependencyManager, UnbindOutcome};
pub use edge::BindingTracker;
pub use error::{ComponentError, Result};
pub use manager::{
    ComponentDescription, ComponentId, ComponentManager, ComponentState, InstanceDescription,
};
pub use metadata::{
    Cardinality, ComponentKind, ComponentMetadata, ComponentMetadataBuilder, ProvidedService,
    ReferenceMetadata, ReferencePolicy, ReferencePolicyOption,
};
pub use observability::{ComponentLogger, LifecycleListener, LogLevel, StateChange};
pub use properties::{EmptyProperties, Properties, PropertiesProvider, PropertiesView, PropertyValue};
pub use registry::{
    InMemoryServiceRegistry, ServiceEvent, ServiceListener, ServiceRegistry, SubscriptionId,
    TargetFilter,
};
pub use runtime::{ComponentActivator, ComponentRuntime, RuntimeOptions};
pub use service::{ServiceHandle, ServiceId, ServiceRank};
