//! # ComponentRuntime：组件管理器的顶层注册表
//!
//! ## 核心意图（Why）
//! - 宿主通过名称启用 / 禁用组件，并在启动与关闭时批量操作；
//! - 为激活上下文提供 [`ComponentActivator`]，使实现对象可以启停同一运行时中的其它组件。
//!
//! ## 行为契约（What）
//! - 组件名在运行时内唯一，重复注册返回 [`ComponentError::DuplicateComponent`]；
//! - 调用管理器之前先把句柄从 `DashMap` 中克隆出来，钩子中回调运行时不会与分片锁重入；
//! - `dispose_all` 按注册顺序的逆序处置，与启动顺序对称。

use std::sync::{
    Arc, Weak,
    atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::{
    component::DeactivationReason,
    construct::{ConstructionStrategy, DefaultConstruction},
    error::ComponentError,
    manager::{ComponentDescription, ComponentId, ComponentManager, ComponentState},
    metadata::ComponentMetadata,
    observability::LifecycleListener,
    properties::{EmptyProperties, PropertiesProvider},
    registry::ServiceRegistry,
};

/// 运行时向激活上下文暴露的启停能力。
pub trait ComponentActivator: Send + Sync {
    fn enable_component(&self, name: &str) -> Result<(), ComponentError>;

    fn disable_component(&self, name: &str) -> Result<(), ComponentError>;
}

/// 运行时的外部协作者。
#[derive(Clone)]
pub struct RuntimeOptions {
    registry: Arc<dyn ServiceRegistry>,
    construction: Arc<dyn ConstructionStrategy>,
    properties: Arc<dyn PropertiesProvider>,
    listeners: Vec<Arc<dyn LifecycleListener>>,
}

impl RuntimeOptions {
    /// 以注册表创建选项，默认使用 [`DefaultConstruction`] 与 [`EmptyProperties`]。
    pub fn new(registry: Arc<dyn ServiceRegistry>) -> Self {
        Self {
            registry,
            construction: Arc::new(DefaultConstruction),
            properties: Arc::new(EmptyProperties),
            listeners: Vec::new(),
        }
    }

    pub fn with_construction(mut self, construction: Arc<dyn ConstructionStrategy>) -> Self {
        self.construction = construction;
        self
    }

    pub fn with_properties(mut self, properties: Arc<dyn PropertiesProvider>) -> Self {
        self.properties = properties;
        self
    }

    /// 追加一个对所有组件生效的生命周期监听器。
    pub fn with_listener(mut self, listener: Arc<dyn LifecycleListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn registry(&self) -> &Arc<dyn ServiceRegistry> {
        &self.registry
    }

    pub fn construction(&self) -> &Arc<dyn ConstructionStrategy> {
        &self.construction
    }

    pub fn properties(&self) -> &Arc<dyn PropertiesProvider> {
        &self.properties
    }

    pub fn listeners(&self) -> &[Arc<dyn LifecycleListener>] {
        &self.listeners
    }
}

impl std::fmt::Debug for RuntimeOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeOptions")
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

/// 组件管理器的集合。
pub struct ComponentRuntime {
    options: RuntimeOptions,
    managers: DashMap<Arc<str>, ComponentManager>,
    order: RwLock<Vec<Arc<str>>>,
    next_component_id: AtomicU64,
    self_ref: Weak<ComponentRuntime>,
}

impl ComponentRuntime {
    pub fn new(options: RuntimeOptions) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            options,
            managers: DashMap::new(),
            order: RwLock::new(Vec::new()),
            next_component_id: AtomicU64::new(1),
            self_ref: self_ref.clone(),
        })
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    pub fn registry(&self) -> &Arc<dyn ServiceRegistry> {
        self.options.registry()
    }

    /// 注册组件配置；组件初始处于 `Disabled`。
    pub fn register(&self, metadata: ComponentMetadata) -> Result<ComponentManager, ComponentError> {
        let name = metadata.shared_name();
        let entry = match self.managers.entry(Arc::clone(&name)) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(ComponentError::DuplicateComponent {
                    name: name.to_string(),
                });
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => entry,
        };

        let id = ComponentId::new(self.next_component_id.fetch_add(1, Ordering::Relaxed));
        let activator: Weak<dyn ComponentActivator> = self.self_ref.clone();
        let manager = ComponentManager::new(metadata, id, &self.options, Some(activator));
        entry.insert(manager.clone());
        self.order.write().push(Arc::clone(&name));
        tracing::debug!(component = &*name, component_id = id.get(), "component registered");
        Ok(manager)
    }

    /// 处置并移除组件。
    pub fn unregister(&self, name: &str) -> Result<(), ComponentError> {
        let (_, manager) = self
            .managers
            .remove(name)
            .ok_or_else(|| ComponentError::UnknownComponent {
                name: name.to_owned(),
            })?;
        self.order.write().retain(|known| &**known != name);
        manager.dispose();
        Ok(())
    }

    pub fn manager(&self, name: &str) -> Option<ComponentManager> {
        self.managers.get(name).map(|entry| entry.value().clone())
    }

    fn require(&self, name: &str) -> Result<ComponentManager, ComponentError> {
        self.manager(name)
            .ok_or_else(|| ComponentError::UnknownComponent {
                name: name.to_owned(),
            })
    }

    pub fn enable(&self, name: &str) -> Result<(), ComponentError> {
        self.require(name)?.enable();
        Ok(())
    }

    /// 禁用组件；幂等。
    pub fn disable(&self, name: &str) -> Result<(), ComponentError> {
        self.require(name)?.disable();
        Ok(())
    }

    pub fn state(&self, name: &str) -> Option<ComponentState> {
        self.manager(name).map(|manager| manager.state())
    }

    /// 按注册顺序排列的组件名。
    pub fn component_names(&self) -> Vec<String> {
        self.order.read().iter().map(|name| name.to_string()).collect()
    }

    /// 按注册顺序排列的管理器。
    pub fn managers(&self) -> Vec<ComponentManager> {
        let order = self.order.read().clone();
        order.iter().filter_map(|name| self.manager(name)).collect()
    }

    /// 启用所有默认启用的组件。
    pub fn enable_all(&self) {
        for manager in self.managers() {
            if manager.metadata().is_enabled_by_default() {
                manager.enable();
            }
        }
    }

    pub fn disable_all(&self) {
        for manager in self.managers().into_iter().rev() {
            manager.disable();
        }
    }

    /// 按注册逆序处置全部组件。
    pub fn dispose_all(&self, reason: DeactivationReason) {
        for manager in self.managers().into_iter().rev() {
            manager.dispose_with(reason.clone());
        }
    }

    pub fn describe(&self) -> Vec<ComponentDescription> {
        self.managers().iter().map(ComponentManager::describe).collect()
    }
}

impl ComponentActivator for ComponentRuntime {
    fn enable_component(&self, name: &str) -> Result<(), ComponentError> {
        self.enable(name)
    }

    fn disable_component(&self, name: &str) -> Result<(), ComponentError> {
        self.disable(name)
    }
}

impl std::fmt::Debug for ComponentRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRuntime")
            .field("components", &self.component_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{construct::ComponentClass, registry::InMemoryServiceRegistry};

    fn runtime() -> Arc<ComponentRuntime> {
        ComponentRuntime::new(RuntimeOptions::new(Arc::new(InMemoryServiceRegistry::new())))
    }

    fn metadata(name: &str) -> ComponentMetadata {
        ComponentMetadata::builder(name, ComponentClass::named("Bare"))
            .build()
            .expect("valid metadata")
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let runtime = runtime();
        runtime.register(metadata("a")).expect("首次注册成功");
        assert_eq!(
            runtime.register(metadata("a")).err(),
            Some(ComponentError::DuplicateComponent {
                name: "a".to_owned()
            })
        );
    }

    #[test]
    fn unknown_names_are_reported() {
        let runtime = runtime();
        assert!(matches!(
            runtime.enable("missing"),
            Err(ComponentError::UnknownComponent { .. })
        ));
        assert!(runtime.unregister("missing").is_err());
    }

    #[test]
    fn names_follow_registration_order() {
        let runtime = runtime();
        for name in ["c", "a", "b"] {
            runtime.register(metadata(name)).expect("注册成功");
        }
        assert_eq!(runtime.component_names(), vec!["c", "a", "b"]);
        runtime.unregister("a").expect("已注册");
        assert_eq!(runtime.component_names(), vec!["c", "b"]);
    }
}
