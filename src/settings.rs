//! Template settings: schema registry, typed values and the marshaller that
//! converts between attribute trees and typed settings.
//!
//! A template definition declares, per group (usually a target language or
//! runtime family), an ordered list of properties. The marshaller uses it in
//! both directions:
//!
//! - [`SettingsMarshaller::node_to_settings`] reads a weakly-typed
//!   [`Node`] and coerces every known property to its declared type,
//! - [`SettingsMarshaller::settings_to_node`] writes typed settings back as
//!   string attributes, filling schema defaults,
//! - [`SettingsMarshaller::validate_settings`] reports the first violation.
//!
//! Groups and properties unknown to the schema are ignored, so older data
//! with legacy attributes still loads.

use std::{fmt::Display, io::BufRead};

use indexmap::IndexMap;
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{error::Error, node::Node, traits::Parser, types::CodeGenerator};

lazy_static! {
    static ref NUMBER_LITERAL: Regex =
        Regex::new(r"^[-+]?(\d+(\.\d*)?|\.\d+)([eE][-+]?\d+)?$").unwrap();
}

/// Name of the attribute-tree node holding all setting groups.
pub const SETTINGS_NODE: &str = "settings";
/// Name of the metadata child describing the code generator.
pub const CODE_GENERATOR_NODE: &str = "codeGenerator";

/// One typed setting value.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl Display for SettingValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingValue::Bool(value) => write!(f, "{}", value),
            SettingValue::Number(value) => write!(f, "{}", value),
            SettingValue::String(value) => write!(f, "{}", value),
        }
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        SettingValue::Bool(value)
    }
}

impl From<f64> for SettingValue {
    fn from(value: f64) -> Self {
        SettingValue::Number(value)
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        SettingValue::String(value.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        SettingValue::String(value)
    }
}

/// Property values of one group, keyed by property name.
pub type SettingsGroup = IndexMap<String, SettingValue>;

/// Typed settings of one template, keyed by group name. Key order is kept;
/// validation walks groups in this order.
pub type Settings = IndexMap<String, SettingsGroup>;

/// Declared type of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    Boolean,
    String,
    Number,
    /// One of the property's allowed `values`.
    List,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct ValidatorDefinition {
    regex: String,
    message: String,
}

/// A regex every value of a property must match.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(try_from = "ValidatorDefinition", into = "ValidatorDefinition")]
pub struct Validator {
    regex: Regex,
    message: String,
}

impl Validator {
    pub fn new(pattern: &str, message: impl Into<String>) -> Result<Self, Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            message: message.into(),
        })
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl TryFrom<ValidatorDefinition> for Validator {
    type Error = Error;

    fn try_from(definition: ValidatorDefinition) -> Result<Self, Self::Error> {
        Validator::new(&definition.regex, definition.message)
    }
}

impl From<Validator> for ValidatorDefinition {
    fn from(validator: Validator) -> Self {
        ValidatorDefinition {
            regex: validator.regex.as_str().to_string(),
            message: validator.message,
        }
    }
}

fn default_required() -> bool {
    true
}

fn is_true(value: &bool) -> bool {
    *value
}

/// Schema of one setting.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PropertyDefinition {
    pub name: String,

    #[serde(rename = "type")]
    pub property_type: PropertyType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<SettingValue>,

    #[serde(default = "default_required", skip_serializing_if = "is_true")]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validators: Vec<Validator>,

    /// Allowed entries for [`PropertyType::List`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<SettingValue>,
}

impl PropertyDefinition {
    pub fn new(name: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            name: name.into(),
            property_type,
            default: None,
            required: true,
            validators: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn with_default(mut self, default: impl Into<SettingValue>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn with_values<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SettingValue>,
    {
        self.values = values.into_iter().map(Into::into).collect();
        self
    }
}

/// Settings schema of one template.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TemplateDefinition {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Property lists keyed by group name, in declaration order.
    #[serde(default)]
    pub settings: IndexMap<String, Vec<PropertyDefinition>>,
}

impl TemplateDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            settings: IndexMap::new(),
        }
    }

    pub fn with_group(
        mut self,
        group: impl Into<String>,
        properties: Vec<PropertyDefinition>,
    ) -> Self {
        self.settings.insert(group.into(), properties);
        self
    }
}

/// Lookup of template definitions by template id.
pub trait TemplateRegistry {
    fn template(&self, template_id: &str) -> Option<&TemplateDefinition>;
}

/// In-memory [`TemplateRegistry`], loadable from a JSON array of definitions.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: IndexMap<String, TemplateDefinition>,
}

impl TemplateCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a definition.
    pub fn register(&mut self, definition: TemplateDefinition) {
        self.templates.insert(definition.id.clone(), definition);
    }

    pub fn with_template(mut self, definition: TemplateDefinition) -> Self {
        self.register(definition);
        self
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TemplateDefinition> {
        self.templates.values()
    }
}

impl TemplateRegistry for TemplateCatalog {
    fn template(&self, template_id: &str) -> Option<&TemplateDefinition> {
        self.templates.get(template_id)
    }
}

impl Parser for TemplateCatalog {
    /// Reads a JSON array of template definitions. A malformed schema, such
    /// as an unknown property type or an invalid validator regex, is a
    /// schema error.
    fn from_reader<R: BufRead>(reader: R) -> Result<Self, Error> {
        let definitions: Vec<TemplateDefinition> = serde_json::from_reader(reader)
            .map_err(|e| Error::schema_error(e.to_string()))?;
        let mut catalog = TemplateCatalog::new();
        for definition in definitions {
            catalog.register(definition);
        }
        Ok(catalog)
    }

    fn to_writer<W: std::io::Write>(&self, writer: W) -> Result<(), Error> {
        let definitions: Vec<&TemplateDefinition> = self.templates.values().collect();
        serde_json::to_writer_pretty(writer, &definitions).map_err(Error::Parse)
    }
}

/// First settings problem found by [`SettingsMarshaller::validate_settings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsViolation {
    pub group: String,
    pub property: String,
    pub message: String,
}

impl Display for SettingsViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}: {}", self.group, self.property, self.message)
    }
}

/// Message reported for a required property without a value.
pub const REQUIRED_MESSAGE: &str = "Value is required";

/// Converts settings between attribute trees and typed values using the
/// schemas of a [`TemplateRegistry`].
pub struct SettingsMarshaller<'r> {
    registry: &'r dyn TemplateRegistry,
}

impl<'r> SettingsMarshaller<'r> {
    pub fn new(registry: &'r dyn TemplateRegistry) -> Self {
        Self { registry }
    }

    pub fn template(&self, template_id: &str) -> Result<&'r TemplateDefinition, Error> {
        self.registry
            .template(template_id)
            .ok_or_else(|| Error::UnknownTemplate(template_id.to_string()))
    }

    /// Reads typed settings from a settings node. Each child whose name is a
    /// known group becomes a group; each schema property takes the attribute
    /// when present, otherwise the schema default.
    pub fn node_to_settings(&self, template_id: &str, node: &Node) -> Result<Settings, Error> {
        let template = self.template(template_id)?;
        let mut settings = Settings::new();

        for group_node in &node.childs {
            let Some(properties) = template.settings.get(&group_node.name) else {
                warn!(template = template_id, group = group_node.name.as_str(); "Ignoring unknown settings group");
                continue;
            };

            let mut group = SettingsGroup::new();
            for property in properties {
                let raw = group_node
                    .attr(&property.name)
                    .map(SettingValue::from)
                    .or_else(|| property.default.clone());
                if let Some(value) = convert_value_for_property(raw.as_ref(), property) {
                    group.insert(property.name.clone(), value);
                }
            }
            settings.insert(group_node.name.clone(), group);
        }

        debug!(template = template_id, groups = settings.len(); "Settings read from node");
        Ok(settings)
    }

    /// Writes settings as a settings node: one child per schema group, one
    /// attribute per defined value or schema default. Properties with neither
    /// are omitted.
    pub fn settings_to_node(&self, template_id: &str, settings: &Settings) -> Result<Node, Error> {
        let template = self.template(template_id)?;
        let mut node = Node::new(SETTINGS_NODE);

        for (group_name, properties) in &template.settings {
            let values = settings.get(group_name);
            let mut group_node = Node::new(group_name.as_str());
            for property in properties {
                let value = values
                    .and_then(|group| group.get(&property.name))
                    .or(property.default.as_ref());
                if let Some(value) = value {
                    group_node
                        .attrs
                        .insert(property.name.clone(), value.to_string());
                }
            }
            node.childs.push(group_node);
        }

        Ok(node)
    }

    /// Finds the first violation: groups in settings key order, properties
    /// in schema order, validators in declaration order. Content problems are
    /// returned, never raised; only an unknown template is an error.
    pub fn validate_settings(
        &self,
        template_id: &str,
        settings: &Settings,
    ) -> Result<Option<SettingsViolation>, Error> {
        let template = self.template(template_id)?;

        for (group_name, group) in settings {
            let Some(properties) = template.settings.get(group_name) else {
                continue;
            };
            for property in properties {
                let text = group.get(&property.name).map(SettingValue::to_string);
                let violation = |message: &str| SettingsViolation {
                    group: group_name.clone(),
                    property: property.name.clone(),
                    message: message.to_string(),
                };

                if property.required && text.as_deref().is_none_or(str::is_empty) {
                    return Ok(Some(violation(REQUIRED_MESSAGE)));
                }
                if let Some(text) = &text
                    && let Some(failed) = property.validators.iter().find(|v| !v.is_match(text))
                {
                    return Ok(Some(violation(failed.message())));
                }
            }
        }

        Ok(None)
    }

    /// Settings made only of schema defaults, one group per schema group.
    pub fn default_settings(&self, template_id: &str) -> Result<Settings, Error> {
        let node = self.settings_to_node(template_id, &Settings::new())?;
        self.node_to_settings(template_id, &node)
    }

    /// Builds the `codeGenerator` metadata node for a descriptor.
    pub fn code_generator_to_node(&self, generator: &CodeGenerator) -> Result<Node, Error> {
        let mut node = Node::new(CODE_GENERATOR_NODE).with_attr("templateId", &generator.template_id);
        if let Some(version) = &generator.version {
            node.attrs.insert("version".to_string(), version.clone());
        }
        node.childs
            .push(self.settings_to_node(&generator.template_id, &generator.settings)?);
        Ok(node)
    }

    /// Reads a descriptor from a `codeGenerator` metadata node.
    pub fn node_to_code_generator(&self, node: &Node) -> Result<CodeGenerator, Error> {
        let template_id = node
            .attr("templateId")
            .ok_or_else(|| Error::DataMismatch("code generator without templateId".to_string()))?;
        let settings = match node.child(SETTINGS_NODE) {
            Some(settings) => self.node_to_settings(template_id, settings)?,
            None => Settings::new(),
        };
        Ok(CodeGenerator {
            template_id: template_id.to_string(),
            version: node.attr("version").map(str::to_string),
            settings,
        })
    }
}

/// Coerces a raw value to the declared type of `property`.
///
/// - boolean: `"true"`/`"false"`, native booleans, numbers (non-zero is true)
/// - string: any value in its string form
/// - number: numbers, numeric strings, booleans as 1/0
/// - list: the allowed entry whose string form equals the value's
///
/// Values that cannot be coerced fall back to the schema default.
pub fn convert_value_for_property(
    value: Option<&SettingValue>,
    property: &PropertyDefinition,
) -> Option<SettingValue> {
    let value = value?;
    match property.property_type {
        PropertyType::Boolean => match value {
            SettingValue::Bool(b) => Some(SettingValue::Bool(*b)),
            SettingValue::Number(n) => Some(SettingValue::Bool(*n != 0.0)),
            SettingValue::String(s) => match s.trim() {
                "true" => Some(SettingValue::Bool(true)),
                "false" => Some(SettingValue::Bool(false)),
                other => parse_number(other)
                    .map(|n| SettingValue::Bool(n != 0.0))
                    .or_else(|| typed_default(property)),
            },
        },
        PropertyType::String => Some(SettingValue::String(value.to_string())),
        PropertyType::Number => match value {
            SettingValue::Number(n) => Some(SettingValue::Number(*n)),
            SettingValue::Bool(b) => Some(SettingValue::Number(if *b { 1.0 } else { 0.0 })),
            SettingValue::String(s) => parse_number(s.trim())
                .map(SettingValue::Number)
                .or_else(|| typed_default(property)),
        },
        PropertyType::List => {
            let text = value.to_string();
            property
                .values
                .iter()
                .find(|allowed| allowed.to_string() == text)
                .cloned()
                .or_else(|| property.default.clone())
        }
    }
}

fn parse_number(text: &str) -> Option<f64> {
    if NUMBER_LITERAL.is_match(text) {
        text.parse().ok()
    } else {
        None
    }
}

/// The schema default, when it already has the property's type.
fn typed_default(property: &PropertyDefinition) -> Option<SettingValue> {
    match (property.property_type, property.default.as_ref()?) {
        (PropertyType::Boolean, SettingValue::Bool(b)) => Some(SettingValue::Bool(*b)),
        (PropertyType::Number, SettingValue::Number(n)) => Some(SettingValue::Number(*n)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> TemplateCatalog {
        TemplateCatalog::new().with_template(
            TemplateDefinition::new("resx")
                .with_group(
                    "csharp",
                    vec![
                        PropertyDefinition::new("namespace", PropertyType::String)
                            .with_default("App")
                            .with_validator(
                                Validator::new(r"^[A-Za-z_][\w.]*$", "Invalid namespace").unwrap(),
                            ),
                        PropertyDefinition::new("internal", PropertyType::Boolean)
                            .with_default(false),
                        PropertyDefinition::new("indent", PropertyType::Number)
                            .with_default(4.0)
                            .optional(),
                        PropertyDefinition::new("access", PropertyType::List)
                            .with_values(["public", "internal"])
                            .with_default("public"),
                    ],
                )
                .with_group(
                    "typescript",
                    vec![PropertyDefinition::new("module", PropertyType::String)],
                ),
        )
    }

    #[test]
    fn test_convert_boolean() {
        let property = PropertyDefinition::new("b", PropertyType::Boolean).with_default(true);
        let convert = |v: SettingValue| convert_value_for_property(Some(&v), &property);
        assert_eq!(convert("false".into()), Some(SettingValue::Bool(false)));
        assert_eq!(convert(true.into()), Some(SettingValue::Bool(true)));
        assert_eq!(convert(0.0.into()), Some(SettingValue::Bool(false)));
        assert_eq!(convert(2.0.into()), Some(SettingValue::Bool(true)));
        assert_eq!(convert("maybe".into()), Some(SettingValue::Bool(true)));
        assert_eq!(convert_value_for_property(None, &property), None);
    }

    #[test]
    fn test_convert_string_and_number() {
        let string = PropertyDefinition::new("s", PropertyType::String);
        assert_eq!(
            convert_value_for_property(Some(&SettingValue::Number(3.0)), &string),
            Some(SettingValue::String("3".to_string()))
        );

        let number = PropertyDefinition::new("n", PropertyType::Number);
        assert_eq!(
            convert_value_for_property(Some(&"2.5".into()), &number),
            Some(SettingValue::Number(2.5))
        );
        assert_eq!(convert_value_for_property(Some(&"inf".into()), &number), None);
        assert_eq!(
            convert_value_for_property(Some(&true.into()), &number),
            Some(SettingValue::Number(1.0))
        );
    }

    #[test]
    fn test_convert_list_falls_back_to_default() {
        let list = PropertyDefinition::new("l", PropertyType::List)
            .with_values(["a", "b"])
            .with_default("a");
        assert_eq!(
            convert_value_for_property(Some(&"b".into()), &list),
            Some(SettingValue::String("b".to_string()))
        );
        assert_eq!(
            convert_value_for_property(Some(&"c".into()), &list),
            Some(SettingValue::String("a".to_string()))
        );
    }

    #[test]
    fn test_node_to_settings_fills_defaults_and_ignores_unknown() {
        let catalog = catalog();
        let marshaller = SettingsMarshaller::new(&catalog);
        let node = Node::new(SETTINGS_NODE)
            .with_child(
                Node::new("csharp")
                    .with_attr("internal", "true")
                    .with_attr("legacy", "x"),
            )
            .with_child(Node::new("cobol").with_attr("x", "y"));

        let settings = marshaller.node_to_settings("resx", &node).unwrap();
        assert_eq!(settings.len(), 1);
        let csharp = &settings["csharp"];
        assert_eq!(csharp["namespace"], SettingValue::String("App".to_string()));
        assert_eq!(csharp["internal"], SettingValue::Bool(true));
        assert_eq!(csharp["indent"], SettingValue::Number(4.0));
        assert_eq!(csharp["access"], SettingValue::String("public".to_string()));
        assert!(!csharp.contains_key("legacy"));
    }

    #[test]
    fn test_settings_to_node_omits_undefined() {
        let catalog = catalog();
        let marshaller = SettingsMarshaller::new(&catalog);
        let mut settings = Settings::new();
        settings.insert(
            "csharp".to_string(),
            SettingsGroup::from([("internal".to_string(), SettingValue::Bool(true))]),
        );

        let node = marshaller.settings_to_node("resx", &settings).unwrap();
        let csharp = node.child("csharp").unwrap();
        assert_eq!(csharp.attr("internal"), Some("true"));
        assert_eq!(csharp.attr("namespace"), Some("App"));
        assert_eq!(csharp.attr("indent"), Some("4"));

        let typescript = node.child("typescript").unwrap();
        assert!(typescript.attrs.is_empty());
    }

    #[test]
    fn test_unknown_template_is_an_error() {
        let catalog = catalog();
        let marshaller = SettingsMarshaller::new(&catalog);
        assert!(matches!(
            marshaller.node_to_settings("nope", &Node::new(SETTINGS_NODE)),
            Err(Error::UnknownTemplate(_))
        ));
        assert!(
            marshaller
                .validate_settings("nope", &Settings::new())
                .is_err()
        );
    }

    #[test]
    fn test_validate_reports_first_group_in_key_order() {
        let catalog = catalog();
        let marshaller = SettingsMarshaller::new(&catalog);
        let mut settings = Settings::new();
        settings.insert("typescript".to_string(), SettingsGroup::new());
        settings.insert(
            "csharp".to_string(),
            SettingsGroup::from([("namespace".to_string(), SettingValue::from("9bad"))]),
        );

        let violation = marshaller
            .validate_settings("resx", &settings)
            .unwrap()
            .unwrap();
        assert_eq!(violation.group, "typescript");
        assert_eq!(violation.property, "module");
        assert_eq!(violation.message, REQUIRED_MESSAGE);
    }

    #[test]
    fn test_validate_runs_validators() {
        let catalog = catalog();
        let marshaller = SettingsMarshaller::new(&catalog);
        let mut settings = marshaller.default_settings("resx").unwrap();
        settings["csharp"].insert("namespace".to_string(), "9bad".into());

        let violation = marshaller
            .validate_settings("resx", &settings)
            .unwrap()
            .unwrap();
        assert_eq!(violation.to_string(), "csharp.namespace: Invalid namespace");
    }

    #[test]
    fn test_validate_accepts_valid_settings() {
        let catalog = catalog();
        let marshaller = SettingsMarshaller::new(&catalog);
        let mut settings = Settings::new();
        settings.insert(
            "csharp".to_string(),
            SettingsGroup::from([
                ("namespace".to_string(), SettingValue::from("App.Strings")),
                ("internal".to_string(), SettingValue::Bool(false)),
                ("access".to_string(), SettingValue::from("internal")),
            ]),
        );
        assert_eq!(marshaller.validate_settings("resx", &settings).unwrap(), None);
    }

    #[test]
    fn test_catalog_rejects_unknown_property_type() {
        let json = r#"[{"id": "t", "settings": {"g": [{"name": "p", "type": "date"}]}}]"#;
        assert!(matches!(
            TemplateCatalog::from_str(json),
            Err(Error::Schema(_))
        ));
    }

    #[test]
    fn test_catalog_loads_validators() {
        let json = r#"[{
            "id": "t",
            "settings": {
                "g": [{
                    "name": "p",
                    "type": "string",
                    "required": false,
                    "validators": [{"regex": "^a", "message": "must start with a"}]
                }]
            }
        }]"#;
        let catalog = TemplateCatalog::from_str(json).unwrap();
        let property = &catalog.template("t").unwrap().settings["g"][0];
        assert!(!property.required);
        assert!(property.validators[0].is_match("abc"));
        assert!(!property.validators[0].is_match("bc"));

        let broken = r#"[{"id": "t", "settings": {"g": [{"name": "p", "type": "string",
            "validators": [{"regex": "(", "message": "x"}]}]}}]"#;
        assert!(TemplateCatalog::from_str(broken).is_err());
    }

    #[test]
    fn test_code_generator_node_round_trip() {
        let catalog = catalog();
        let marshaller = SettingsMarshaller::new(&catalog);
        let generator = CodeGenerator::new("resx")
            .with_version("2")
            .with_settings(marshaller.default_settings("resx").unwrap());

        let node = marshaller.code_generator_to_node(&generator).unwrap();
        assert_eq!(node.name, CODE_GENERATOR_NODE);
        assert_eq!(node.attr("version"), Some("2"));

        let read = marshaller.node_to_code_generator(&node).unwrap();
        assert_eq!(read, generator);
    }
}
