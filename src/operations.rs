//! High-level tree operations: cloning, copying between models and
//! import/merge of one model (or a flat list of rows) into another.

use std::io::BufRead;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    element::ResourceBody,
    error::Error,
    model::{Branch, IterateOptions, Model, validate_name},
    path::{DEFAULT_SEPARATOR, ElementPath},
    traits::Parser,
    types::{ElementId, ElementKind},
};

/// Deep-copies an element and its subtree under the same parent.
///
/// Without `new_name` the copy collides with the original, so the call
/// fails with [`Error::DuplicateName`]. The root cannot be cloned this way;
/// use [`clone_model`].
pub fn clone_element(
    model: &mut Model,
    id: ElementId,
    new_name: Option<&str>,
) -> Result<ElementId, Error> {
    let element = model.element(id)?;
    let Some(parent) = element.parent() else {
        return Err(Error::WrongElementKind {
            id,
            expected: "category or resource",
            actual: element.kind(),
        });
    };
    let branch = model.extract_branch(id)?;
    model.insert_branch(parent, branch, new_name)
}

/// Deep-copies an element of `source` under `parent` in `target`.
pub fn copy_element(
    source: &Model,
    id: ElementId,
    target: &mut Model,
    parent: ElementId,
    new_name: Option<&str>,
) -> Result<ElementId, Error> {
    let branch = source.extract_branch(id)?;
    target.insert_branch(parent, branch, new_name)
}

/// Independent copy of a whole model without scratch data.
///
/// The copy keeps the original's `uid`, so both report the same identity.
/// Build a new model with [`Model::new`] and [`copy_element`] when a fresh
/// identity is needed.
pub fn clone_model(model: &Model) -> Model {
    let mut copy = model.clone();
    copy.clear_all_temp_data();
    copy
}

/// How [`import_model`] reconciles the source with the target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    /// Update matching elements in place; optionally add unseen ones.
    #[default]
    Merge,
    /// Insert the whole source under a fresh category.
    ImportAsNew,
}

/// Options controlling import behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOptions {
    pub mode: ImportMode,
    /// Import from a private copy. When `false`, [`ImportMode::ImportAsNew`]
    /// moves the source's elements out of it.
    pub clone_source: bool,
    /// Create categories and resources the target does not have.
    pub add_new_elements: bool,
    /// Declare source languages the target does not have. Values in
    /// undeclared languages are skipped.
    pub add_new_languages: bool,
    /// Overwrite values marked `locked` in the target.
    pub overwrite_locked: bool,
    /// Name of the new category for [`ImportMode::ImportAsNew`]; defaults to
    /// the source model's name.
    pub branch_name: Option<String>,
    /// Container the source root is matched against.
    pub target: ElementId,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            mode: ImportMode::Merge,
            clone_source: true,
            add_new_elements: false,
            add_new_languages: false,
            overwrite_locked: false,
            branch_name: None,
            target: ElementId::ROOT,
        }
    }
}

impl ImportOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: ImportMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_clone_source(mut self, clone_source: bool) -> Self {
        self.clone_source = clone_source;
        self
    }

    pub fn with_new_elements(mut self, add_new_elements: bool) -> Self {
        self.add_new_elements = add_new_elements;
        self
    }

    pub fn with_new_languages(mut self, add_new_languages: bool) -> Self {
        self.add_new_languages = add_new_languages;
        self
    }

    pub fn with_overwrite_locked(mut self, overwrite_locked: bool) -> Self {
        self.overwrite_locked = overwrite_locked;
        self
    }

    pub fn with_branch_name(mut self, branch_name: impl Into<String>) -> Self {
        self.branch_name = Some(branch_name.into());
        self
    }

    pub fn with_target(mut self, target: ElementId) -> Self {
        self.target = target;
        self
    }
}

/// Counters of a successful import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub new_categories: usize,
    pub updated_categories: usize,
    pub new_resources: usize,
    pub updated_resources: usize,
    pub new_languages: usize,
    /// Values left alone because the target value is locked.
    pub skipped_locked: usize,
    /// Category created by [`ImportMode::ImportAsNew`].
    #[serde(skip)]
    pub branch: Option<ElementId>,
}

/// Why an import was refused. The target is untouched in every case.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("import source contains no categories or resources")]
    EmptySource,

    #[error("target model only allows resources, source contains categories")]
    CategoriesNotSupported,

    #[error("no source resource matches a target resource")]
    NoMatchingResources,

    #[error("target already contains a category named `{0}`")]
    NameConflict(String),

    #[error("import target {0} is not a category or model")]
    InvalidTarget(ElementId),

    #[error(transparent)]
    Model(#[from] Error),
}

/// Reconciles `source` into `target`.
///
/// Elements are matched by their name path below `options.target`. Every
/// precondition is checked before the first change, so a returned error
/// means the target was not modified.
pub fn import_model(
    target: &mut Model,
    source: &mut Model,
    options: &ImportOptions,
) -> Result<ImportReport, ImportError> {
    if target.container(options.target).is_err() {
        return Err(ImportError::InvalidTarget(options.target));
    }
    let source_root = source.container(ElementId::ROOT)?;
    if !source_root.has_categories() && !source_root.has_resources() {
        return Err(ImportError::EmptySource);
    }
    let needs_categories =
        source_root.has_categories() || options.mode == ImportMode::ImportAsNew;
    if target.options().resources_only && needs_categories {
        return Err(ImportError::CategoriesNotSupported);
    }

    let report = match options.mode {
        ImportMode::Merge => merge(target, source, options)?,
        ImportMode::ImportAsNew => import_as_new(target, source, options)?,
    };

    info!(
        mode:? = options.mode,
        new_categories = report.new_categories,
        updated_categories = report.updated_categories,
        new_resources = report.new_resources,
        updated_resources = report.updated_resources,
        new_languages = report.new_languages;
        "Import finished"
    );
    Ok(report)
}

fn merge(
    target: &mut Model,
    source: &Model,
    options: &ImportOptions,
) -> Result<ImportReport, ImportError> {
    if !options.add_new_elements && !has_matching_resource(target, source, options.target) {
        return Err(ImportError::NoMatchingResources);
    }

    let mut report = ImportReport::default();
    for language in languages_to_add(target, source, options) {
        target.add_language(&language, false);
        report.new_languages += 1;
    }
    merge_container(
        target,
        options.target,
        source,
        ElementId::ROOT,
        options,
        &mut report,
    )?;
    Ok(report)
}

fn import_as_new(
    target: &mut Model,
    source: &mut Model,
    options: &ImportOptions,
) -> Result<ImportReport, ImportError> {
    let name = options
        .branch_name
        .clone()
        .unwrap_or_else(|| source.name().to_string());
    validate_name(&name)?;
    if target.contains(options.target, &name, ElementKind::Category) {
        return Err(ImportError::NameConflict(name));
    }

    let new_languages = languages_to_add(target, source, options);
    let mut declared = target.languages().to_vec();
    declared.extend(new_languages.iter().cloned());

    let mut branch = source.extract_branch(ElementId::ROOT)?;
    retain_declared_languages(&mut branch, &declared);

    let mut report = ImportReport {
        new_categories: branch.count(ElementKind::Category) + 1,
        new_resources: branch.count(ElementKind::Resource),
        ..ImportReport::default()
    };
    report.branch = Some(target.insert_branch(options.target, branch, Some(&name))?);
    for language in &new_languages {
        target.add_language(language, false);
    }
    report.new_languages = new_languages.len();
    if !options.clone_source {
        source.remove_childs(ElementId::ROOT, true, true)?;
    }
    Ok(report)
}

/// Source languages the target would gain; nothing is changed yet.
fn languages_to_add(target: &Model, source: &Model, options: &ImportOptions) -> Vec<String> {
    if !options.add_new_languages {
        return Vec::new();
    }
    let mut languages: Vec<String> = Vec::new();
    for language in source.languages() {
        if !language.is_empty()
            && !target.has_language(language)
            && !languages.contains(language)
        {
            languages.push(language.clone());
        }
    }
    languages
}

fn has_matching_resource(target: &Model, source: &Model, target_root: ElementId) -> bool {
    let mut found = false;
    source.iterate_tree(
        &IterateOptions::new().with_categories(false),
        |_, element, _| {
            let path = element.path().clone_path(false);
            found = target
                .element_by_path(target_root, &path, ElementKind::Resource)
                .is_some();
            !found
        },
    );
    found
}

fn merge_container(
    target: &mut Model,
    target_id: ElementId,
    source: &Model,
    source_id: ElementId,
    options: &ImportOptions,
    report: &mut ImportReport,
) -> Result<(), ImportError> {
    let source_container = source.container(source_id)?;

    for &category in source_container.categories() {
        let element = source.element(category)?;
        match target.find(target_id, element.name(), ElementKind::Category) {
            Some(existing) => {
                if let Some(description) = element.description()
                    && target.element(existing)?.description() != Some(description)
                {
                    target
                        .element_mut(existing)?
                        .set_description(Some(description.to_string()));
                    report.updated_categories += 1;
                }
                merge_container(target, existing, source, category, options, report)?;
            }
            None if options.add_new_elements => {
                let mut branch = source.extract_branch(category)?;
                retain_declared_languages(&mut branch, target.languages());
                report.new_categories += branch.count(ElementKind::Category);
                report.new_resources += branch.count(ElementKind::Resource);
                target.insert_branch(target_id, branch, None)?;
            }
            None => {}
        }
    }

    for &resource in source_container.resources() {
        let element = source.element(resource)?;
        match target.find(target_id, element.name(), ElementKind::Resource) {
            Some(existing) => {
                let incoming = source.resource(resource)?;
                let declared = target.languages().to_vec();
                let body = target.resource_mut(existing)?;
                if merge_resource(body, incoming, &declared, options, report) {
                    report.updated_resources += 1;
                }
            }
            None if options.add_new_elements => {
                let mut branch = source.extract_branch(resource)?;
                retain_declared_languages(&mut branch, target.languages());
                target.insert_branch(target_id, branch, None)?;
                report.new_resources += 1;
            }
            None => {}
        }
    }
    Ok(())
}

/// Copies values (and, with `add_new_elements`, parameters) of `incoming`
/// into `body`. Returns whether anything changed.
fn merge_resource(
    body: &mut ResourceBody,
    incoming: &ResourceBody,
    declared: &[String],
    options: &ImportOptions,
    report: &mut ImportReport,
) -> bool {
    let mut changed = false;

    for value in incoming.values() {
        if !declared.contains(&value.language_name) {
            continue;
        }
        match body.value_mut(&value.language_name) {
            Some(existing) if existing.is_locked() && !options.overwrite_locked => {
                if existing.value != value.value {
                    report.skipped_locked += 1;
                }
            }
            Some(existing) => {
                if existing.value != value.value || existing.auto != value.auto {
                    existing.value = value.value.clone();
                    existing.auto = value.auto;
                    changed = true;
                }
            }
            None => {
                body.set_value(&value.language_name, value.value.clone());
                if let Some(added) = body.value_mut(&value.language_name) {
                    added.auto = value.auto;
                }
                changed = true;
            }
        }
    }

    if options.add_new_elements {
        for parameter in incoming.parameters() {
            if body.parameter(&parameter.name).is_none()
                && body
                    .add_parameter(
                        &parameter.name,
                        parameter.description.clone(),
                        Some(parameter.order),
                    )
                    .is_ok()
            {
                changed = true;
            }
        }
    }

    changed
}

/// Drops values in languages the target does not declare.
fn retain_declared_languages(branch: &mut Branch, declared: &[String]) {
    if let Some(resource) = branch.resource.as_mut() {
        let undeclared: Vec<String> = resource
            .values()
            .iter()
            .filter(|v| !declared.contains(&v.language_name))
            .map(|v| v.language_name.clone())
            .collect();
        for language in undeclared {
            resource.remove_value(&language);
        }
    }
    for child in branch.categories.iter_mut().chain(branch.resources.iter_mut()) {
        retain_declared_languages(child, declared);
    }
}

/// One flat import row: a resource path, a language and its text.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ImportRow {
    /// Category/resource names joined by `/`, without the model name.
    pub path: String,
    pub language: String,
    pub value: String,
}

impl ImportRow {
    pub fn new(
        path: impl Into<String>,
        language: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            language: language.into(),
            value: value.into(),
        }
    }
}

impl Parser for Vec<ImportRow> {
    /// Reads `path,language,value` records without a header line.
    fn from_reader<R: BufRead>(reader: R) -> Result<Self, Error> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(reader);
        let mut rows = Vec::new();
        for result in rdr.deserialize() {
            rows.push(result?);
        }
        Ok(rows)
    }

    fn to_writer<W: std::io::Write>(&self, writer: W) -> Result<(), Error> {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        for row in self {
            wtr.serialize(row)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// Builds a detached model from flat rows. Every path segment but the last
/// becomes a category; rows with an empty path or language are skipped.
pub fn rows_to_model(name: &str, rows: &[ImportRow]) -> Result<Model, Error> {
    let mut model = Model::new(name)?;
    for row in rows {
        let path = ElementPath::parse(&row.path, DEFAULT_SEPARATOR);
        let Some((resource_name, categories)) = path.segments().split_last() else {
            warn!(language = row.language.as_str(); "Skipping import row without path");
            continue;
        };
        if row.language.is_empty() {
            warn!(path = row.path.as_str(); "Skipping import row without language");
            continue;
        }

        let mut parent = ElementId::ROOT;
        for category in categories {
            parent = match model.find(parent, category, ElementKind::Category) {
                Some(existing) => existing,
                None => model.add_category(parent, category, None)?,
            };
        }
        let resource = match model.find(parent, resource_name, ElementKind::Resource) {
            Some(existing) => existing,
            None => model.add_resource(parent, resource_name, None)?,
        };
        model.add_language(&row.language, false);
        model
            .resource_mut(resource)?
            .set_value(&row.language, Some(row.value.clone()));
    }
    Ok(model)
}

/// Imports flat rows by turning them into a private source model first.
pub fn import_rows(
    target: &mut Model,
    rows: &[ImportRow],
    options: &ImportOptions,
) -> Result<ImportReport, ImportError> {
    let mut source = rows_to_model(target.name(), rows)?;
    let options = options.clone().with_clone_source(false);
    import_model(target, &mut source, &options)
}
