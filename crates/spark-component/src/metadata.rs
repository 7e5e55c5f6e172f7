//! # 组件元数据
//!
//! ## 核心意图（Why）
//! - 描述一个组件配置：实现类、按声明顺序排列的依赖引用、默认属性、组件形态，
//!   以及激活后对外发布的服务；
//! - 元数据在构建完成后不可变，运行期只读。
//!
//! ## 行为契约（What）
//! - 每条引用的 `index` 等于其在声明列表中的位置，由 [`ComponentMetadataBuilder::build`] 统一分配，
//!   之后作为访问实例绑定追踪器的唯一键；
//! - 构建时校验组件名非空、引用名非空且唯一，违反时返回 [`ComponentError::InvalidMetadata`]。

use std::{collections::BTreeSet, fmt, str::FromStr, sync::Arc};

use crate::{
    construct::ComponentClass,
    error::ComponentError,
    properties::{Properties, PropertyValue},
    registry::TargetFilter,
};

/// 依赖基数。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Cardinality {
    /// `0..1`
    OptionalUnary,
    /// `1..1`
    MandatoryUnary,
    /// `0..n`
    OptionalMultiple,
    /// `1..n`
    MandatoryMultiple,
}

impl Cardinality {
    /// 满足依赖所需的最少绑定数。
    pub const fn minimum(self) -> usize {
        match self {
            Cardinality::OptionalUnary | Cardinality::OptionalMultiple => 0,
            Cardinality::MandatoryUnary | Cardinality::MandatoryMultiple => 1,
        }
    }

    pub const fn is_mandatory(self) -> bool {
        self.minimum() > 0
    }

    pub const fn is_multiple(self) -> bool {
        matches!(
            self,
            Cardinality::OptionalMultiple | Cardinality::MandatoryMultiple
        )
    }

    pub const fn notation(self) -> &'static str {
        match self {
            Cardinality::OptionalUnary => "0..1",
            Cardinality::MandatoryUnary => "1..1",
            Cardinality::OptionalMultiple => "0..n",
            Cardinality::MandatoryMultiple => "1..n",
        }
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.notation())
    }
}

impl FromStr for Cardinality {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "0..1" => Ok(Cardinality::OptionalUnary),
            "1..1" => Ok(Cardinality::MandatoryUnary),
            "0..n" => Ok(Cardinality::OptionalMultiple),
            "1..n" => Ok(Cardinality::MandatoryMultiple),
            other => Err(format!("unknown cardinality `{other}`")),
        }
    }
}

/// 绑定策略。
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum ReferencePolicy {
    /// 激活时一次性绑定，直到失活前不可变。
    #[default]
    Static,
    /// 激活期间允许重新绑定。
    Dynamic,
}

/// 策略选项。
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum ReferencePolicyOption {
    /// 倾向保留当前绑定。
    #[default]
    Reluctant,
    /// 倾向切换到排序更高的服务。
    Greedy,
}

/// 单条依赖声明。
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceMetadata {
    name: String,
    target: TargetFilter,
    cardinality: Cardinality,
    policy: ReferencePolicy,
    policy_option: ReferencePolicyOption,
    index: usize,
}

impl ReferenceMetadata {
    /// 以名称与接口名创建引用，默认 `1..1 / Static / Reluctant`。
    pub fn new(name: impl Into<String>, interface: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: TargetFilter::interface(interface),
            cardinality: Cardinality::MandatoryUnary,
            policy: ReferencePolicy::Static,
            policy_option: ReferencePolicyOption::Reluctant,
            index: 0,
        }
    }

    pub fn cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = cardinality;
        self
    }

    pub fn policy(mut self, policy: ReferencePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy_option(mut self, option: ReferencePolicyOption) -> Self {
        self.policy_option = option;
        self
    }

    /// 替换目标过滤器（接口名以新过滤器为准）。
    pub fn target(mut self, target: TargetFilter) -> Self {
        self.target = target;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target_filter(&self) -> &TargetFilter {
        &self.target
    }

    pub fn get_cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub fn get_policy(&self) -> ReferencePolicy {
        self.policy
    }

    pub fn get_policy_option(&self) -> ReferencePolicyOption {
        self.policy_option
    }

    pub fn is_static(&self) -> bool {
        self.policy == ReferencePolicy::Static
    }

    pub fn is_greedy(&self) -> bool {
        self.policy_option == ReferencePolicyOption::Greedy
    }

    /// 声明位置，构建后不可变。
    pub fn index(&self) -> usize {
        self.index
    }
}

/// 组件激活后以实现对象发布到注册表的服务。
///
/// 服务属性为实例的合并属性，再叠加 [`ActivationContext::set_service_properties`] 写入的附加属性。
///
/// [`ActivationContext::set_service_properties`]: crate::context::ActivationContext::set_service_properties
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProvidedService {
    interface: String,
    ranking: i32,
}

impl ProvidedService {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            ranking: 0,
        }
    }

    pub fn ranking(mut self, ranking: i32) -> Self {
        self.ranking = ranking;
        self
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn get_ranking(&self) -> i32 {
        self.ranking
    }
}

/// 组件形态。
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum ComponentKind {
    /// 依赖满足即创建唯一实例。
    #[default]
    Singleton,
    /// 由宿主按需创建多个实例，每个实例拥有独立的激活上下文。
    Factory { factory_id: String },
}

/// 不可变的组件配置。
#[derive(Clone)]
pub struct ComponentMetadata {
    name: Arc<str>,
    class: ComponentClass,
    references: Vec<ReferenceMetadata>,
    properties: Properties,
    kind: ComponentKind,
    provides: Option<ProvidedService>,
    enabled: bool,
}

impl ComponentMetadata {
    pub fn builder(name: impl Into<String>, class: ComponentClass) -> ComponentMetadataBuilder {
        ComponentMetadataBuilder {
            name: name.into(),
            class,
            references: Vec::new(),
            properties: Properties::new(),
            kind: ComponentKind::Singleton,
            provides: None,
            enabled: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    pub fn class(&self) -> &ComponentClass {
        &self.class
    }

    pub fn references(&self) -> &[ReferenceMetadata] {
        &self.references
    }

    pub fn reference(&self, name: &str) -> Option<&ReferenceMetadata> {
        self.references.iter().find(|reference| reference.name == name)
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn kind(&self) -> &ComponentKind {
        &self.kind
    }

    pub fn is_factory(&self) -> bool {
        matches!(self.kind, ComponentKind::Factory { .. })
    }

    pub fn factory_id(&self) -> Option<&str> {
        match &self.kind {
            ComponentKind::Factory { factory_id } => Some(factory_id),
            ComponentKind::Singleton => None,
        }
    }

    pub fn provided_service(&self) -> Option<&ProvidedService> {
        self.provides.as_ref()
    }

    /// 宿主启动时是否默认启用。
    pub fn is_enabled_by_default(&self) -> bool {
        self.enabled
    }
}

impl fmt::Debug for ComponentMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentMetadata")
            .field("name", &self.name)
            .field("class", &self.class.name())
            .field("references", &self.references)
            .field("kind", &self.kind)
            .field("provides", &self.provides)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// [`ComponentMetadata`] 的构建器。
pub struct ComponentMetadataBuilder {
    name: String,
    class: ComponentClass,
    references: Vec<ReferenceMetadata>,
    properties: Properties,
    kind: ComponentKind,
    provides: Option<ProvidedService>,
    enabled: bool,
}

impl ComponentMetadataBuilder {
    pub fn reference(mut self, reference: ReferenceMetadata) -> Self {
        self.references.push(reference);
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn factory(mut self, factory_id: impl Into<String>) -> Self {
        self.kind = ComponentKind::Factory {
            factory_id: factory_id.into(),
        };
        self
    }

    /// 声明激活后发布的服务。
    pub fn provides(mut self, service: ProvidedService) -> Self {
        self.provides = Some(service);
        self
    }

    /// 设置宿主启动时是否自动启用，默认启用。
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// 校验并冻结元数据，同时按声明位置分配引用下标。
    pub fn build(self) -> Result<ComponentMetadata, ComponentError> {
        if self.name.trim().is_empty() {
            return Err(ComponentError::InvalidMetadata {
                component: self.name,
                detail: "component name must not be empty".to_owned(),
            });
        }

        if let Some(provided) = &self.provides {
            if provided.interface.trim().is_empty() {
                return Err(ComponentError::InvalidMetadata {
                    component: self.name,
                    detail: "provided service interface must not be empty".to_owned(),
                });
            }
        }

        let mut seen = BTreeSet::new();
        let mut references = self.references;
        for (index, reference) in references.iter_mut().enumerate() {
            if reference.name.trim().is_empty() {
                return Err(ComponentError::InvalidMetadata {
                    component: self.name,
                    detail: format!("reference #{index} has an empty name"),
                });
            }
            if !seen.insert(reference.name.clone()) {
                return Err(ComponentError::InvalidMetadata {
                    component: self.name,
                    detail: format!("duplicate reference name `{}`", reference.name),
                });
            }
            reference.index = index;
        }

        Ok(ComponentMetadata {
            name: Arc::from(self.name),
            class: self.class,
            references,
            properties: self.properties,
            kind: self.kind,
            provides: self.provides,
            enabled: self.enabled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cardinality_minimum_and_notation() {
        for (notation, minimum, multiple) in [
            ("0..1", 0, false),
            ("1..1", 1, false),
            ("0..n", 0, true),
            ("1..n", 1, true),
        ] {
            let cardinality: Cardinality = notation.parse().expect("known notation");
            assert_eq!(cardinality.minimum(), minimum);
            assert_eq!(cardinality.is_multiple(), multiple);
            assert_eq!(cardinality.to_string(), notation);
        }
        assert!("2..n".parse::<Cardinality>().is_err());
    }

    #[test]
    fn build_assigns_indices_by_position() {
        let metadata = ComponentMetadata::builder("web", ComponentClass::named("Web"))
            .reference(ReferenceMetadata::new("log", "Log"))
            .reference(ReferenceMetadata::new("db", "Db"))
            .build()
            .expect("valid metadata");
        let indices: Vec<_> = metadata
            .references()
            .iter()
            .map(|reference| (reference.name().to_owned(), reference.index()))
            .collect();
        assert_eq!(indices, vec![("log".to_owned(), 0), ("db".to_owned(), 1)]);
    }

    #[test]
    fn duplicate_reference_names_are_rejected() {
        let result = ComponentMetadata::builder("web", ComponentClass::named("Web"))
            .reference(ReferenceMetadata::new("log", "Log"))
            .reference(ReferenceMetadata::new("log", "Other"))
            .build();
        assert!(matches!(
            result,
            Err(ComponentError::InvalidMetadata { ref detail, .. }) if detail.contains("duplicate")
        ));
    }

    #[test]
    fn factory_id_and_provided_service_are_exposed() {
        let metadata = ComponentMetadata::builder("pool", ComponentClass::named("Pool"))
            .factory("pool.factory")
            .provides(ProvidedService::new("Db").ranking(4))
            .build()
            .expect("valid metadata");
        assert_eq!(metadata.factory_id(), Some("pool.factory"));
        let provided = metadata.provided_service().expect("已声明服务");
        assert_eq!((provided.interface(), provided.get_ranking()), ("Db", 4));

        let blank = ComponentMetadata::builder("pool", ComponentClass::named("Pool"))
            .provides(ProvidedService::new(" "))
            .build();
        assert!(matches!(blank, Err(ComponentError::InvalidMetadata { .. })));
    }

    #[test]
    fn empty_component_name_is_rejected() {
        let result = ComponentMetadata::builder("  ", ComponentClass::named("Web")).build();
        assert!(matches!(result, Err(ComponentError::InvalidMetadata { .. })));
    }
}
