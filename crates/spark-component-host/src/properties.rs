use std::{fmt, sync::Arc};

use arc_swap::ArcSwap;
use spark_component::{ComponentMetadata, Properties, PropertiesProvider};

use crate::config::HostConfig;

/// 以宿主配置为后端的属性提供者。
///
/// # 设计动机（Why）
/// - 组件在每次激活时读取属性，配置重载必须对之后的激活立即可见，又不能阻塞正在读取的线程；
/// - 采用 `ArcSwap<HostConfig>`：读路径无锁，写路径原子替换，旧快照随最后一个持有者释放。
///
/// # 核心契约（What）
/// - 克隆体共享同一份存储，运行时与宿主各持一份即可；
/// - [`Self::replace`] 只影响之后的读取，已经激活的实例保留各自的属性快照。
#[derive(Clone)]
pub struct ConfiguredProperties {
    inner: Arc<ArcSwap<HostConfig>>,
}

impl ConfiguredProperties {
    pub fn new(config: HostConfig) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(config)),
        }
    }

    /// 当前配置快照。
    #[inline]
    pub fn snapshot(&self) -> Arc<HostConfig> {
        self.inner.load_full()
    }

    /// 原子替换配置并返回旧快照。
    #[inline]
    pub fn replace(&self, next: HostConfig) -> Arc<HostConfig> {
        self.inner.swap(Arc::new(next))
    }
}

impl PropertiesProvider for ConfiguredProperties {
    fn properties_for(&self, component: &ComponentMetadata) -> Properties {
        self.inner.load().properties_for(component.name())
    }
}

impl fmt::Debug for ConfiguredProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfiguredProperties")
            .field("components", &self.inner.load().components.len())
            .finish_non_exhaustive()
    }
}
