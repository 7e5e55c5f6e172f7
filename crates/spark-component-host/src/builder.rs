use std::{fmt, sync::Arc};

use spark_component::{
    ComponentError, ComponentMetadata, ComponentRuntime, ConstructionStrategy,
    InMemoryServiceRegistry, LifecycleListener, RuntimeOptions, ServiceRegistry,
};
use thiserror::Error;

use crate::{
    config::HostConfig,
    host::Host,
    logging::{self, LoggingError},
    properties::ConfiguredProperties,
};

/// 构建宿主失败的原因。
#[derive(Debug, Error)]
pub enum HostBuildError {
    #[error("component registration failed: {0}")]
    Registration(#[from] ComponentError),
    #[error("host config refers to unknown component `{name}`")]
    UnknownComponent { name: String },
    #[error("logging installation failed: {0}")]
    Logging(#[from] LoggingError),
}

/// `HostBuilder` 聚合配置、注册表、构造策略与组件元数据的装配步骤。
///
/// # 教案级注释
/// - **设计目标 (Why)**
///   - 为宿主提供统一的装配入口，避免应用层重复处理配置加载、运行时选项与组件注册；
/// - **关键流程 (How)**
///   1. `with_config`：写入 [`HostConfig`]，它同时作为组件属性的来源；
///   2. `with_registry` / `with_construction` / `with_listener`：替换运行时的外部协作者；
///   3. `component`：按顺序登记组件元数据，登记顺序决定启动与关闭顺序；
///   4. `build`：创建 [`ComponentRuntime`]、注册全部组件并校验配置中的组件名。
/// - **契约说明 (What)**
///   - 未指定注册表时使用 [`InMemoryServiceRegistry`]；
///   - 配置中出现未登记的组件名时返回 [`HostBuildError::UnknownComponent`]；
///   - `build` 只做装配，不启用任何组件，启用由 [`Host::start`] 完成。
#[derive(Default)]
pub struct HostBuilder {
    config: HostConfig,
    registry: Option<Arc<dyn ServiceRegistry>>,
    construction: Option<Arc<dyn ConstructionStrategy>>,
    listeners: Vec<Arc<dyn LifecycleListener>>,
    components: Vec<ComponentMetadata>,
    install_logging: bool,
}

impl fmt::Debug for HostBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostBuilder")
            .field("components", &self.components.len())
            .field("configured", &self.config.components.len())
            .field("install_logging", &self.install_logging)
            .finish_non_exhaustive()
    }
}

impl HostBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: HostConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_registry(mut self, registry: Arc<dyn ServiceRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_construction(mut self, construction: Arc<dyn ConstructionStrategy>) -> Self {
        self.construction = Some(construction);
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn LifecycleListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// 在 `build` 时按 `[logging]` 段安装全局订阅者。
    pub fn with_logging(mut self) -> Self {
        self.install_logging = true;
        self
    }

    /// 登记组件。
    pub fn component(mut self, metadata: ComponentMetadata) -> Self {
        self.components.push(metadata);
        self
    }

    pub fn build(self) -> Result<Host, HostBuildError> {
        for name in self.config.components.keys() {
            if !self.components.iter().any(|metadata| metadata.name() == name) {
                return Err(HostBuildError::UnknownComponent { name: name.clone() });
            }
        }
        if self.install_logging {
            logging::install(&self.config.logging)?;
        }

        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(InMemoryServiceRegistry::new()) as Arc<dyn ServiceRegistry>);
        let properties = ConfiguredProperties::new(self.config);
        let mut options =
            RuntimeOptions::new(registry).with_properties(Arc::new(properties.clone()));
        if let Some(construction) = self.construction {
            options = options.with_construction(construction);
        }
        for listener in self.listeners {
            options = options.with_listener(listener);
        }

        let runtime = ComponentRuntime::new(options);
        for metadata in self.components {
            runtime.register(metadata)?;
        }
        tracing::debug!(
            components = runtime.component_names().len(),
            "component host assembled"
        );
        Ok(Host::new(runtime, properties))
    }
}
