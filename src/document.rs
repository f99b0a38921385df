//! Serialized form of a model and conversion to and from the live tree.
//!
//! The wire shape is JSON with name → object maps for categories, resources,
//! parameters and values. Maps are `BTreeMap`s so output order is stable,
//! and absent optionals and empty collections are left out entirely, which
//! keeps `serialize(populate(serialize(tree)))` byte-identical.

use std::{
    collections::BTreeMap,
    io::{BufRead, Write},
};

use log::info;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::Error,
    model::{MODEL_FORMAT_VERSION, Model},
    node::Node,
    settings::SettingsMarshaller,
    traits::Parser,
    types::{ElementId, ModelOptions, ResourceState, Value},
};

fn default_version() -> u32 {
    MODEL_FORMAT_VERSION
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<Uuid>,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default, skip_serializing_if = "ModelOptions::is_empty")]
    pub options: ModelOptions,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub languages: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_language: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Node>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub categories: BTreeMap<String, CategoryDocument>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resources: BTreeMap<String, ResourceDocument>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CategoryDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub categories: BTreeMap<String, CategoryDocument>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resources: BTreeMap<String, ResourceDocument>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ResourceDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "ResourceState::is_default")]
    pub state: ResourceState,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, ParameterDocument>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<String, ValueDocument>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ParameterDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub order: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ValueDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto: Option<bool>,
}

impl Parser for ModelDocument {
    fn from_reader<R: BufRead>(reader: R) -> Result<Self, Error> {
        serde_json::from_reader(reader).map_err(Error::Parse)
    }

    fn to_writer<W: Write>(&self, writer: W) -> Result<(), Error> {
        serde_json::to_writer_pretty(writer, self).map_err(Error::Parse)
    }
}

/// Outcome of checking raw input before it reaches [`Model::from_document`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentValidation {
    pub success: bool,
    pub error: Option<String>,
    pub model: Option<ModelDocument>,
}

impl DocumentValidation {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            model: None,
        }
    }
}

/// Checks that `json` is a well-formed model: it parses, the model has a
/// name and no element is keyed by a blank name.
pub fn validate_document(json: &str) -> DocumentValidation {
    let document: ModelDocument = match serde_json::from_str(json) {
        Ok(document) => document,
        Err(e) => return DocumentValidation::failed(e.to_string()),
    };
    if document.name.trim().is_empty() {
        return DocumentValidation::failed("model name is empty");
    }
    if let Some(path) = find_blank_key("", &document.categories, &document.resources) {
        return DocumentValidation::failed(format!("blank element name under `{path}`"));
    }
    DocumentValidation {
        success: true,
        error: None,
        model: Some(document),
    }
}

fn find_blank_key(
    path: &str,
    categories: &BTreeMap<String, CategoryDocument>,
    resources: &BTreeMap<String, ResourceDocument>,
) -> Option<String> {
    let blank = |name: &String| name.trim().is_empty();
    if categories.keys().any(blank) || resources.keys().any(blank) {
        return Some(format!("{path}/"));
    }
    resources
        .iter()
        .find(|(_, resource)| {
            resource.parameters.keys().any(blank) || resource.values.keys().any(blank)
        })
        .map(|(name, _)| format!("{path}/{name}"))
        .or_else(|| {
            categories.iter().find_map(|(name, category)| {
                find_blank_key(
                    &format!("{path}/{name}"),
                    &category.categories,
                    &category.resources,
                )
            })
        })
}

impl Model {
    /// Builds the tree from a document that already passed validation.
    ///
    /// Fails on documents newer than [`MODEL_FORMAT_VERSION`] and on
    /// siblings whose names only differ by case. Resource comments are
    /// derived once here.
    pub fn from_document(document: ModelDocument) -> Result<Self, Error> {
        if document.version > MODEL_FORMAT_VERSION {
            return Err(Error::UnsupportedVersion {
                found: document.version,
                supported: MODEL_FORMAT_VERSION,
            });
        }

        let uid = document.uid.unwrap_or_else(Uuid::new_v4);
        let mut model = Model::with_uid(&document.name, uid)?;
        model.restore_version(document.version);
        model
            .element_mut(ElementId::ROOT)?
            .set_description(document.description);
        *model.options_mut() = document.options;
        for language in &document.languages {
            model.add_language(language, false);
        }
        model.set_primary_language(document.primary_language);
        model.set_metadata(document.metadata);

        populate_container(
            &mut model,
            ElementId::ROOT,
            document.categories,
            document.resources,
        )?;
        model.refresh_comments();

        info!(name = model.name(), elements = model.len(); "Model populated");
        Ok(model)
    }

    /// [`Model::from_document`] followed by reading the code generator
    /// descriptor out of the metadata.
    pub fn from_document_with_templates(
        document: ModelDocument,
        marshaller: &SettingsMarshaller<'_>,
    ) -> Result<Self, Error> {
        let mut model = Model::from_document(document)?;
        model.load_code_generator(marshaller)?;
        Ok(model)
    }

    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        Model::from_document(ModelDocument::from_str(json)?)
    }

    /// Maps the tree back to its serialized shape.
    pub fn to_document(&self) -> Result<ModelDocument, Error> {
        let (categories, resources) = self.collect_children(ElementId::ROOT)?;
        Ok(ModelDocument {
            uid: Some(self.uid()),
            name: self.name().to_string(),
            description: self.description().map(str::to_string),
            version: self.version(),
            options: self.options().clone(),
            languages: self.languages().to_vec(),
            primary_language: self.primary_language().map(str::to_string),
            metadata: self.metadata().cloned(),
            categories,
            resources,
        })
    }

    /// Pretty JSON form of [`Model::to_document`].
    pub fn to_json_string(&self) -> Result<String, Error> {
        let buffer = self.to_document()?.to_bytes()?;
        info!(name = self.name(), bytes = buffer.len(); "Model serialized");
        String::from_utf8(buffer).map_err(|e| Error::DataMismatch(e.to_string()))
    }

    fn collect_children(
        &self,
        id: ElementId,
    ) -> Result<
        (
            BTreeMap<String, CategoryDocument>,
            BTreeMap<String, ResourceDocument>,
        ),
        Error,
    > {
        let container = self.container(id)?;

        let mut categories = BTreeMap::new();
        for &child in container.categories() {
            let element = self.element(child)?;
            let (nested_categories, nested_resources) = self.collect_children(child)?;
            categories.insert(
                element.name().to_string(),
                CategoryDocument {
                    description: element.description().map(str::to_string),
                    categories: nested_categories,
                    resources: nested_resources,
                },
            );
        }

        let mut resources = BTreeMap::new();
        for &child in container.resources() {
            let element = self.element(child)?;
            let body = self.resource(child)?;
            resources.insert(
                element.name().to_string(),
                ResourceDocument {
                    description: element.description().map(str::to_string),
                    state: body.state,
                    parameters: body
                        .parameters()
                        .iter()
                        .map(|p| {
                            (
                                p.name.clone(),
                                ParameterDocument {
                                    description: p.description.clone(),
                                    order: p.order,
                                },
                            )
                        })
                        .collect(),
                    values: body
                        .values()
                        .iter()
                        .map(|v| {
                            (
                                v.language_name.clone(),
                                ValueDocument {
                                    value: v.value.clone(),
                                    locked: v.locked,
                                    auto: v.auto,
                                },
                            )
                        })
                        .collect(),
                },
            );
        }

        Ok((categories, resources))
    }
}

fn populate_container(
    model: &mut Model,
    parent: ElementId,
    categories: BTreeMap<String, CategoryDocument>,
    resources: BTreeMap<String, ResourceDocument>,
) -> Result<(), Error> {
    for (name, category) in categories {
        let id = model.add_category(parent, &name, category.description)?;
        populate_container(model, id, category.categories, category.resources)?;
    }

    for (name, resource) in resources {
        let id = model.add_resource(parent, &name, resource.description)?;
        let body = model.resource_mut(id)?;
        body.state = resource.state;
        for (parameter, definition) in resource.parameters {
            body.add_parameter(&parameter, definition.description, Some(definition.order))?;
        }
        for (language, value) in resource.values {
            body.add_value(Value {
                language_name: language,
                value: value.value,
                locked: value.locked,
                auto: value.auto,
            })?;
        }
    }
    Ok(())
}
