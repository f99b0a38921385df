//! Core value types shared by the tree, the serializer and the marshaller.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::settings::Settings;

/// Stable handle to an element inside one [`crate::Model`].
///
/// Ids are never reused after removal, so a stale id resolves to nothing
/// instead of aliasing another element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElementId(pub(crate) usize);

impl ElementId {
    /// The root model element of every tree.
    pub const ROOT: ElementId = ElementId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

impl Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The three element variants a tree is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Model,
    Category,
    Resource,
}

impl ElementKind {
    /// Root and category elements own child collections.
    pub fn is_container(self) -> bool {
        matches!(self, ElementKind::Model | ElementKind::Category)
    }
}

impl Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElementKind::Model => write!(f, "model"),
            ElementKind::Category => write!(f, "category"),
            ElementKind::Resource => write!(f, "resource"),
        }
    }
}

/// Where a resource stands in the translation workflow. Stored in model
/// documents as a lowercase word; `new` is the default and is omitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceState {
    /// Added to the model, no translation work done yet.
    #[default]
    New,

    /// Values exist for the model's languages.
    Translated,

    /// Translations were checked by a reviewer.
    Reviewed,

    /// Final; ready for code generation.
    Approved,

    /// The primary-language text changed after the resource was translated.
    Outdated,
}

impl ResourceState {
    pub fn is_default(&self) -> bool {
        *self == ResourceState::New
    }
}

/// One language value of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Value {
    pub language_name: String,
    pub value: Option<String>,
    /// Excluded from overwrite by automated import.
    pub locked: Option<bool>,
    /// Machine generated.
    pub auto: Option<bool>,
}

impl Value {
    pub fn new(language_name: impl Into<String>, value: Option<String>) -> Self {
        Self {
            language_name: language_name.into(),
            value,
            locked: None,
            auto: None,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked.unwrap_or(false)
    }

    pub fn is_auto(&self) -> bool {
        self.auto.unwrap_or(false)
    }
}

/// A formal parameter a resource value may reference at generation time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Parameter {
    pub name: String,
    pub description: Option<String>,
    /// Controls generation-time argument ordering.
    pub order: i32,
}

/// Generation scope flags stored with the model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelOptions {
    /// The model is a flat list of resources; categories are not allowed.
    #[serde(default, skip_serializing_if = "is_false")]
    pub resources_only: bool,

    /// Templates should emit the derived resource comment.
    #[serde(default, skip_serializing_if = "is_false")]
    pub generate_comments: bool,
}

impl ModelOptions {
    pub fn is_empty(&self) -> bool {
        *self == ModelOptions::default()
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Descriptor of the template a model is rendered through.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CodeGenerator {
    pub template_id: String,
    pub version: Option<String>,
    pub settings: Settings,
}

impl CodeGenerator {
    pub fn new(template_id: impl Into<String>) -> Self {
        Self {
            template_id: template_id.into(),
            version: None,
            settings: Settings::new(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_state_serde_names() {
        let json = serde_json::to_string(&ResourceState::Outdated).unwrap();
        assert_eq!(json, "\"outdated\"");
        let state: ResourceState = serde_json::from_str("\"reviewed\"").unwrap();
        assert_eq!(state, ResourceState::Reviewed);
        assert!(serde_json::from_str::<ResourceState>("\"needs_review\"").is_err());
        assert!(ResourceState::default().is_default());
    }

    #[test]
    fn test_element_kind_container() {
        assert!(ElementKind::Model.is_container());
        assert!(ElementKind::Category.is_container());
        assert!(!ElementKind::Resource.is_container());
    }

    #[test]
    fn test_model_options_skip_defaults() {
        let json = serde_json::to_string(&ModelOptions::default()).unwrap();
        assert_eq!(json, "{}");

        let options = ModelOptions {
            resources_only: true,
            ..ModelOptions::default()
        };
        let json = serde_json::to_string(&options).unwrap();
        assert_eq!(json, "{\"resourcesOnly\":true}");
    }

    #[test]
    fn test_value_flags() {
        let mut value = Value::new("en", Some("Hello".to_string()));
        assert!(!value.is_locked());
        value.locked = Some(true);
        assert!(value.is_locked());
        assert!(!value.is_auto());
    }
}
