//! Element records stored in a [`crate::Model`] arena.
//!
//! An [`Element`] carries what every tree node shares (name, description,
//! placement, cached path, scratch data). Its [`ElementBody`] is either a
//! [`Container`] (root model or category) or a [`ResourceBody`].

use std::{cmp::Ordering, collections::HashMap};

use crate::{
    error::Error,
    path::ElementPath,
    types::{ElementId, ElementKind, Parameter, ResourceState, Value},
};

/// Maximum length of a derived resource comment before it is cut.
pub const COMMENT_MAX_CHARS: usize = 80;

/// Ascending, case-insensitive sibling order. Ordinal order breaks ties so the
/// result is total.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Sibling name equality used by every uniqueness check.
pub fn names_equal(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// One node of the tree.
#[derive(Debug, Clone)]
pub struct Element {
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) kind: ElementKind,
    pub(crate) parent: Option<ElementId>,
    pub(crate) path: ElementPath,
    pub(crate) data: HashMap<String, serde_json::Value>,
    pub(crate) body: ElementBody,
}

#[derive(Debug, Clone)]
pub enum ElementBody {
    Container(Container),
    Resource(ResourceBody),
}

impl Element {
    pub(crate) fn new(kind: ElementKind, name: &str, description: Option<String>) -> Self {
        let body = match kind {
            ElementKind::Resource => ElementBody::Resource(ResourceBody::default()),
            ElementKind::Model | ElementKind::Category => {
                ElementBody::Container(Container::default())
            }
        };
        Self {
            name: name.to_string(),
            description,
            kind,
            parent: None,
            path: ElementPath::default(),
            data: HashMap::new(),
            body,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn parent(&self) -> Option<ElementId> {
        self.parent
    }

    /// Every element of a tree shares the same root.
    pub fn root(&self) -> ElementId {
        ElementId::ROOT
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Cached names from the root down to this element.
    pub fn path(&self) -> &ElementPath {
        &self.path
    }

    pub fn as_container(&self) -> Option<&Container> {
        match &self.body {
            ElementBody::Container(container) => Some(container),
            ElementBody::Resource(_) => None,
        }
    }

    pub fn as_resource(&self) -> Option<&ResourceBody> {
        match &self.body {
            ElementBody::Resource(resource) => Some(resource),
            ElementBody::Container(_) => None,
        }
    }

    pub fn as_resource_mut(&mut self) -> Option<&mut ResourceBody> {
        match &mut self.body {
            ElementBody::Resource(resource) => Some(resource),
            ElementBody::Container(_) => None,
        }
    }

    pub(crate) fn container_mut(&mut self) -> Option<&mut Container> {
        match &mut self.body {
            ElementBody::Container(container) => Some(container),
            ElementBody::Resource(_) => None,
        }
    }

    /// Stores process-local scratch data. It is never serialized.
    pub fn add_to_temp_data(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.data.insert(key.into(), value);
    }

    pub fn temp_data(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    pub fn clear_temp_data(&mut self) {
        self.data.clear();
    }
}

/// Child collections of a root model or category, both kept sorted by name.
#[derive(Debug, Clone, Default)]
pub struct Container {
    pub(crate) categories: Vec<ElementId>,
    pub(crate) resources: Vec<ElementId>,
    has_categories: bool,
    has_resources: bool,
}

impl Container {
    pub fn categories(&self) -> &[ElementId] {
        &self.categories
    }

    pub fn resources(&self) -> &[ElementId] {
        &self.resources
    }

    pub fn has_categories(&self) -> bool {
        self.has_categories
    }

    pub fn has_resources(&self) -> bool {
        self.has_resources
    }

    pub(crate) fn children_of_kind(&self, kind: ElementKind) -> &[ElementId] {
        match kind {
            ElementKind::Resource => &self.resources,
            _ => &self.categories,
        }
    }

    pub(crate) fn children_of_kind_mut(&mut self, kind: ElementKind) -> &mut Vec<ElementId> {
        match kind {
            ElementKind::Resource => &mut self.resources,
            _ => &mut self.categories,
        }
    }

    /// Recomputes the derived `has_*` flags.
    pub(crate) fn sync_flags(&mut self) {
        self.has_categories = !self.categories.is_empty();
        self.has_resources = !self.resources.is_empty();
    }
}

/// Leaf payload of a resource element.
#[derive(Debug, Clone, Default)]
pub struct ResourceBody {
    pub state: ResourceState,
    parameters: Vec<Parameter>,
    values: Vec<Value>,
    comment: String,
}

impl ResourceBody {
    /// Parameters ordered by their `order` field.
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Values ordered by language name.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn has_parameters(&self) -> bool {
        !self.parameters.is_empty()
    }

    pub fn has_values(&self) -> bool {
        !self.values.is_empty()
    }

    pub fn value(&self, language: &str) -> Option<&Value> {
        self.values.iter().find(|v| v.language_name == language)
    }

    pub fn value_mut(&mut self, language: &str) -> Option<&mut Value> {
        self.values.iter_mut().find(|v| v.language_name == language)
    }

    /// Text of the value for `language`, case-sensitive, no fallback.
    pub fn get_value(&self, language: &str, trim: bool) -> Option<&str> {
        let text = self.value(language)?.value.as_deref()?;
        Some(if trim { text.trim() } else { text })
    }

    pub fn has_value(&self, language: &str) -> bool {
        self.value(language).is_some()
    }

    /// Updates the value in place, or adds a new one.
    pub fn set_value(&mut self, language: &str, value: Option<String>) {
        match self.value_mut(language) {
            Some(existing) => existing.value = value,
            None => self.insert_value(Value::new(language, value)),
        }
    }

    /// Adds a value; fails when the language already has one.
    pub fn add_value(&mut self, value: Value) -> Result<&Value, Error> {
        if self.has_value(&value.language_name) {
            return Err(Error::DataMismatch(format!(
                "value for language `{}` already exists",
                value.language_name
            )));
        }
        let language = value.language_name.clone();
        self.insert_value(value);
        self.value(&language)
            .ok_or_else(|| Error::DataMismatch(format!("value `{language}` was not stored")))
    }

    pub fn remove_value(&mut self, language: &str) -> bool {
        let before = self.values.len();
        self.values.retain(|v| v.language_name != language);
        before != self.values.len()
    }

    fn insert_value(&mut self, value: Value) {
        let position = self
            .values
            .iter()
            .position(|v| v.language_name > value.language_name)
            .unwrap_or(self.values.len());
        self.values.insert(position, value);
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Adds a parameter. Without an explicit `order` the next free one
    /// (max existing + 1) is assigned.
    pub fn add_parameter(
        &mut self,
        name: &str,
        description: Option<String>,
        order: Option<i32>,
    ) -> Result<&Parameter, Error> {
        if name.is_empty() {
            return Err(Error::invalid_name(name));
        }
        if self.parameter(name).is_some() {
            return Err(Error::DataMismatch(format!(
                "parameter `{name}` already exists"
            )));
        }
        let order = match order {
            Some(order) => order,
            None => self.next_parameter_order().ok_or_else(|| {
                Error::DataMismatch(format!("no parameter order left after {}", i32::MAX))
            })?,
        };
        let position = self
            .parameters
            .iter()
            .position(|p| p.order > order)
            .unwrap_or(self.parameters.len());
        self.parameters.insert(
            position,
            Parameter {
                name: name.to_string(),
                description,
                order,
            },
        );
        Ok(&self.parameters[position])
    }

    pub fn remove_parameter(&mut self, name: &str) -> bool {
        let before = self.parameters.len();
        self.parameters.retain(|p| p.name != name);
        before != self.parameters.len()
    }

    /// `None` once the highest order is `i32::MAX`.
    fn next_parameter_order(&self) -> Option<i32> {
        match self.parameters.iter().map(|p| p.order).max() {
            Some(max) => max.checked_add(1),
            None => Some(0),
        }
    }

    /// Derived one-line comment; a snapshot taken at populate time.
    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn set_comment(&mut self, comment: impl Into<String>) {
        self.comment = comment.into();
    }

    /// Recomputes the comment from the primary-language value, falling back
    /// to `description`.
    pub fn refresh_comment(&mut self, primary_language: Option<&str>, description: Option<&str>) {
        let primary = primary_language.and_then(|lang| self.get_value(lang, false));
        self.comment = derive_comment(primary, description);
    }
}

/// First line of `value` (or `description` when the value is missing or
/// empty), cut to [`COMMENT_MAX_CHARS`] characters. A cut adds `...`; tabs
/// become single spaces.
pub fn derive_comment(value: Option<&str>, description: Option<&str>) -> String {
    let source = value
        .filter(|v| !v.is_empty())
        .or(description)
        .unwrap_or_default();

    let mut text = source;
    let mut truncated = false;
    for line_break in ["\r\n", "\n", "\r"] {
        if let Some(position) = text.find(line_break) {
            text = &text[..position];
            truncated = true;
            break;
        }
    }
    if let Some((cut, _)) = text.char_indices().nth(COMMENT_MAX_CHARS) {
        text = &text[..cut];
        truncated = true;
    }

    let mut comment = text.to_string();
    if truncated {
        comment.push_str("...");
    }
    comment.replace('\t', " ")
}
