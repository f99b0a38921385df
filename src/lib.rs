//! In-memory document model for localization projects.
//!
//! A [`Model`] is a tree: the model root holds categories and resources,
//! categories nest further, and every resource carries one value per
//! language plus optional format parameters. Siblings of one kind are kept
//! sorted by name (case-insensitively) and unique, and every element knows
//! its name path from the root.
//!
//! Models persist as JSON documents ([`ModelDocument`]). Code-generator
//! settings are stored in a generic attribute tree ([`Node`]) and converted
//! to typed values by the schema-driven [`SettingsMarshaller`].
//!
//! ```rust
//! use locmodel::{ElementId, ElementKind, Model};
//!
//! let mut model = Model::new("App")?;
//! model.add_language("en", true);
//! let errors = model.add_category(ElementId::ROOT, "Errors", None)?;
//! let timeout = model.add_resource(errors, "Timeout", None)?;
//! model
//!     .resource_mut(timeout)?
//!     .set_value("en", Some("Timed out".to_string()));
//!
//! assert_eq!(model.element(timeout)?.path().to_string(), "/App/Errors/Timeout");
//! assert_eq!(
//!     model.element_by_path_str("Errors/Timeout", "/", ElementKind::Resource),
//!     Some(timeout)
//! );
//! Ok::<(), locmodel::Error>(())
//! ```

#![forbid(unsafe_code)]

pub mod document;
pub mod element;
pub mod error;
pub mod model;
pub mod node;
pub mod operations;
pub mod path;
pub mod settings;
pub mod traits;
pub mod types;

pub use crate::{
    document::{DocumentValidation, ModelDocument, validate_document},
    element::{Container, Element, ResourceBody},
    error::Error,
    model::{IterateOptions, MODEL_FORMAT_VERSION, Model},
    node::Node,
    operations::{
        ImportError, ImportMode, ImportOptions, ImportReport, ImportRow, clone_element,
        clone_model, copy_element, import_model, import_rows,
    },
    path::ElementPath,
    settings::{
        PropertyDefinition, PropertyType, SettingValue, Settings, SettingsMarshaller,
        SettingsViolation, TemplateCatalog, TemplateDefinition, TemplateRegistry,
    },
    traits::Parser,
    types::{
        CodeGenerator, ElementId, ElementKind, ModelOptions, Parameter, ResourceState, Value,
    },
};
