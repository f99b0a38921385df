//! All error types for the locmodel crate.
//!
//! These are contract and structural errors: they abort the current operation.
//! Content problems (duplicate names on probe-style edits, failing settings,
//! incompatible import sources) are reported as typed values instead.

use thiserror::Error;

use crate::types::{ElementId, ElementKind};

#[derive(Error, Debug)]
pub enum Error {
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("XML parse error: {0}")]
    XmlParse(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    XmlAttribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("CSV parse error: {0}")]
    CsvParse(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid regex: {0}")]
    Regex(#[from] regex::Error),

    #[error("invalid name `{0}`")]
    InvalidName(String),

    #[error("duplicate {kind} name `{name}`")]
    DuplicateName { kind: ElementKind, name: String },

    #[error("element {0} does not exist in this model")]
    UnknownElement(ElementId),

    #[error("element {id} is a {actual}, expected {expected}")]
    WrongElementKind {
        id: ElementId,
        expected: &'static str,
        actual: ElementKind,
    },

    #[error("unsupported model version {found}, newest supported is {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("unknown template `{0}`")]
    UnknownTemplate(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("invalid data: {0}")]
    DataMismatch(String),
}

impl Error {
    /// Creates a new invalid name error.
    pub fn invalid_name(name: impl Into<String>) -> Self {
        Error::InvalidName(name.into())
    }

    /// Creates a new schema definition error.
    pub fn schema_error(message: impl Into<String>) -> Self {
        Error::Schema(message.into())
    }

    pub(crate) fn duplicate(kind: ElementKind, name: impl Into<String>) -> Self {
        Error::DuplicateName {
            kind,
            name: name.into(),
        }
    }
}
