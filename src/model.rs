//! The root model element and owner of the element arena.
//!
//! [`Model`] stores every element of one tree in a node table addressed by
//! [`ElementId`]. Parent links and child lists are ids into that table, so
//! subtrees can be moved, copied between trees or dropped without reference
//! cycles. All structural edits go through `Model`, which keeps the sibling
//! order, name uniqueness, `has_*` flags and cached paths in sync.

use log::{debug, trace};
use uuid::Uuid;

use crate::{
    element::{Container, Element, ElementBody, ResourceBody, compare_names, names_equal},
    error::Error,
    node::Node,
    path::ElementPath,
    settings::{CODE_GENERATOR_NODE, SettingsMarshaller},
    types::{CodeGenerator, ElementId, ElementKind, ModelOptions},
};

/// Newest serialized model format this crate reads and writes.
pub const MODEL_FORMAT_VERSION: u32 = 1;

/// Name of the metadata root node created when a model has none.
pub const METADATA_NODE: &str = "metadata";

/// Which elements [`Model::iterate_tree`] hands to its callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterateOptions {
    pub model: bool,
    pub categories: bool,
    pub resources: bool,
}

impl Default for IterateOptions {
    fn default() -> Self {
        Self {
            model: false,
            categories: true,
            resources: true,
        }
    }
}

impl IterateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: bool) -> Self {
        self.model = model;
        self
    }

    pub fn with_categories(mut self, categories: bool) -> Self {
        self.categories = categories;
        self
    }

    pub fn with_resources(mut self, resources: bool) -> Self {
        self.resources = resources;
        self
    }
}

/// Detached copy of a subtree, used to move or copy elements within a tree
/// or between trees.
#[derive(Debug, Clone)]
pub(crate) struct Branch {
    pub(crate) kind: ElementKind,
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) resource: Option<ResourceBody>,
    pub(crate) categories: Vec<Branch>,
    pub(crate) resources: Vec<Branch>,
}

impl Branch {
    pub(crate) fn count(&self, kind: ElementKind) -> usize {
        let own = usize::from(self.kind == kind);
        own + self
            .categories
            .iter()
            .chain(self.resources.iter())
            .map(|child| child.count(kind))
            .sum::<usize>()
    }
}

/// A localization model: the root element plus model-wide settings.
#[derive(Debug, Clone)]
pub struct Model {
    nodes: Vec<Option<Element>>,
    uid: Uuid,
    version: u32,
    options: ModelOptions,
    languages: Vec<String>,
    primary_language: Option<String>,
    metadata: Option<Node>,
    code_generator: Option<CodeGenerator>,
}

impl Model {
    /// Creates an empty model with a fresh uid.
    pub fn new(name: &str) -> Result<Self, Error> {
        Self::with_uid(name, Uuid::new_v4())
    }

    pub(crate) fn with_uid(name: &str, uid: Uuid) -> Result<Self, Error> {
        validate_name(name)?;
        let mut root = Element::new(ElementKind::Model, name, None);
        root.path = ElementPath::root(name);
        Ok(Self {
            nodes: vec![Some(root)],
            uid,
            version: MODEL_FORMAT_VERSION,
            options: ModelOptions::default(),
            languages: Vec::new(),
            primary_language: None,
            metadata: None,
            code_generator: None,
        })
    }

    // ---- model-wide fields -------------------------------------------------

    pub fn uid(&self) -> Uuid {
        self.uid
    }

    pub fn name(&self) -> &str {
        self.root().name()
    }

    pub fn description(&self) -> Option<&str> {
        self.root().description()
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Raises the format version. Downgrades are rejected.
    pub fn set_version(&mut self, version: u32) -> bool {
        if version < self.version {
            debug!(current = self.version, requested = version; "Rejected model version downgrade");
            return false;
        }
        self.version = version;
        true
    }

    /// Version as read from a document; no downgrade check.
    pub(crate) fn restore_version(&mut self, version: u32) {
        self.version = version;
    }

    pub fn options(&self) -> &ModelOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut ModelOptions {
        &mut self.options
    }

    /// Declared languages in preference order. Never re-sorted.
    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    pub fn has_language(&self, language: &str) -> bool {
        self.languages.iter().any(|l| l == language)
    }

    pub fn primary_language(&self) -> Option<&str> {
        self.primary_language.as_deref()
    }

    /// Sets the primary language without checking it against `languages`.
    pub fn set_primary_language(&mut self, language: Option<String>) {
        self.primary_language = language;
    }

    /// Appends a language. Returns `false` when it is already declared or
    /// empty.
    pub fn add_language(&mut self, language: &str, is_primary: bool) -> bool {
        if language.is_empty() || self.has_language(language) {
            return false;
        }
        self.languages.push(language.to_string());
        if is_primary {
            self.primary_language = Some(language.to_string());
        }
        debug!(language = language, primary = is_primary; "Language added");
        true
    }

    /// Removes a language from the model and its value from every resource.
    /// A primary language that is removed is cleared as well.
    pub fn remove_language(&mut self, language: &str) -> bool {
        let Some(position) = self.languages.iter().position(|l| l == language) else {
            return false;
        };
        self.languages.remove(position);

        let mut purged = 0usize;
        for slot in self.nodes.iter_mut() {
            if let Some(resource) = slot.as_mut().and_then(Element::as_resource_mut)
                && resource.remove_value(language)
            {
                purged += 1;
            }
        }
        if self.primary_language.as_deref() == Some(language) {
            self.primary_language = None;
        }
        debug!(language = language, values = purged; "Language removed");
        true
    }

    /// The opaque metadata blob, as read.
    pub fn metadata(&self) -> Option<&Node> {
        self.metadata.as_ref()
    }

    pub(crate) fn set_metadata(&mut self, metadata: Option<Node>) {
        self.metadata = metadata;
    }

    pub fn code_generator(&self) -> Option<&CodeGenerator> {
        self.code_generator.as_ref()
    }

    /// Attaches (or with `None` detaches) the code generator descriptor and
    /// rewrites its node inside `metadata`. Other metadata content is kept.
    pub fn set_code_generator(
        &mut self,
        generator: Option<CodeGenerator>,
        marshaller: &SettingsMarshaller<'_>,
    ) -> Result<(), Error> {
        match &generator {
            Some(generator) => {
                let node = marshaller.code_generator_to_node(generator)?;
                self.metadata
                    .get_or_insert_with(|| Node::new(METADATA_NODE))
                    .set_child(node);
                debug!(template = generator.template_id.as_str(); "Code generator attached");
            }
            None => {
                if let Some(metadata) = self.metadata.as_mut() {
                    metadata.remove_child(CODE_GENERATOR_NODE);
                }
            }
        }
        self.code_generator = generator;
        Ok(())
    }

    /// Interprets the `codeGenerator` node of `metadata`, if any.
    pub fn load_code_generator(
        &mut self,
        marshaller: &SettingsMarshaller<'_>,
    ) -> Result<Option<&CodeGenerator>, Error> {
        let generator = match self
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.child(CODE_GENERATOR_NODE))
        {
            Some(node) => Some(marshaller.node_to_code_generator(node)?),
            None => None,
        };
        self.code_generator = generator;
        Ok(self.code_generator.as_ref())
    }

    // ---- element access ----------------------------------------------------

    pub fn root(&self) -> &Element {
        match self.nodes.first() {
            Some(Some(root)) => root,
            _ => unreachable!("the root slot is created with the model and never freed"),
        }
    }

    pub fn get(&self, id: ElementId) -> Option<&Element> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn element(&self, id: ElementId) -> Result<&Element, Error> {
        self.get(id).ok_or(Error::UnknownElement(id))
    }

    pub fn element_mut(&mut self, id: ElementId) -> Result<&mut Element, Error> {
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(Error::UnknownElement(id))
    }

    pub fn container(&self, id: ElementId) -> Result<&Container, Error> {
        let element = self.element(id)?;
        element.as_container().ok_or(Error::WrongElementKind {
            id,
            expected: "container",
            actual: element.kind,
        })
    }

    pub fn resource(&self, id: ElementId) -> Result<&ResourceBody, Error> {
        let element = self.element(id)?;
        element.as_resource().ok_or(Error::WrongElementKind {
            id,
            expected: "resource",
            actual: element.kind,
        })
    }

    pub fn resource_mut(&mut self, id: ElementId) -> Result<&mut ResourceBody, Error> {
        let element = self.element_mut(id)?;
        let actual = element.kind;
        element.as_resource_mut().ok_or(Error::WrongElementKind {
            id,
            expected: "resource",
            actual,
        })
    }

    pub fn categories(&self, id: ElementId) -> Result<&[ElementId], Error> {
        Ok(self.container(id)?.categories())
    }

    pub fn resources(&self, id: ElementId) -> Result<&[ElementId], Error> {
        Ok(self.container(id)?.resources())
    }

    /// Number of live elements, the root included.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.root()
            .as_container()
            .is_none_or(|c| !c.has_categories() && !c.has_resources())
    }

    /// Distance from the root; the root itself is level 0.
    pub fn level(&self, id: ElementId) -> Result<usize, Error> {
        let mut level = 0;
        let mut current = self.element(id)?.parent;
        while let Some(parent) = current {
            level += 1;
            current = self.element(parent)?.parent;
        }
        Ok(level)
    }

    /// All live resource ids, in tree order.
    pub fn resource_ids(&self) -> Vec<ElementId> {
        let mut ids = Vec::new();
        self.iterate_tree(&IterateOptions::new().with_categories(false), |id, _, _| {
            ids.push(id);
            true
        });
        ids
    }

    // ---- lookup ------------------------------------------------------------

    /// Case-insensitive lookup among the direct children of one kind.
    pub fn find(&self, parent: ElementId, name: &str, kind: ElementKind) -> Option<ElementId> {
        if kind == ElementKind::Model {
            return None;
        }
        let container = self.get(parent)?.as_container()?;
        container
            .children_of_kind(kind)
            .iter()
            .copied()
            .find(|&child| self.get(child).is_some_and(|e| names_equal(&e.name, name)))
    }

    pub fn contains(&self, parent: ElementId, name: &str, kind: ElementKind) -> bool {
        self.find(parent, name, kind).is_some()
    }

    /// Walks `path` from `start`: every segment but the last names a
    /// category, the last one is resolved against `kind`. A path carrying
    /// the root's own name (an element's cached path) has it skipped.
    pub fn element_by_path(
        &self,
        start: ElementId,
        path: &ElementPath,
        kind: ElementKind,
    ) -> Option<ElementId> {
        let segments = path.relative_segments();
        let (last, ancestors) = segments.split_last()?;
        let mut current = start;
        for segment in ancestors {
            current = self.find(current, segment, ElementKind::Category)?;
        }
        self.find(current, last, kind)
    }

    /// [`Model::element_by_path`] from the root for a path string.
    pub fn element_by_path_str(
        &self,
        path: &str,
        separator: &str,
        kind: ElementKind,
    ) -> Option<ElementId> {
        self.element_by_path(ElementId::ROOT, &ElementPath::parse(path, separator), kind)
    }

    // ---- structural edits --------------------------------------------------

    pub fn add_category(
        &mut self,
        parent: ElementId,
        name: &str,
        description: Option<String>,
    ) -> Result<ElementId, Error> {
        self.add_element(parent, ElementKind::Category, name, description)
    }

    pub fn add_resource(
        &mut self,
        parent: ElementId,
        name: &str,
        description: Option<String>,
    ) -> Result<ElementId, Error> {
        self.add_element(parent, ElementKind::Resource, name, description)
    }

    fn add_element(
        &mut self,
        parent: ElementId,
        kind: ElementKind,
        name: &str,
        description: Option<String>,
    ) -> Result<ElementId, Error> {
        validate_name(name)?;
        self.container(parent)?;
        if self.contains(parent, name, kind) {
            return Err(Error::duplicate(kind, name));
        }

        let id = ElementId(self.nodes.len());
        self.nodes.push(Some(Element::new(kind, name, description)));
        self.attach(parent, id)?;
        debug!(kind:? = kind, name = name, parent = parent.0; "Element added");
        Ok(id)
    }

    /// Renames an element and re-sorts it among its siblings.
    ///
    /// Returns `Ok(false)` when a different sibling of the same kind already
    /// uses the name. Changing only the case of a name is allowed.
    pub fn rename(&mut self, id: ElementId, new_name: &str) -> Result<bool, Error> {
        validate_name(new_name)?;
        let element = self.element(id)?;
        if element.name == new_name {
            return Ok(true);
        }
        let kind = element.kind;
        let parent = element.parent;

        match parent {
            Some(parent) => {
                if self
                    .find(parent, new_name, kind)
                    .is_some_and(|existing| existing != id)
                {
                    return Ok(false);
                }
                self.detach(id)?;
                self.element_mut(id)?.name = new_name.to_string();
                self.attach(parent, id)?;
            }
            None => {
                self.element_mut(id)?.name = new_name.to_string();
                self.refresh_paths(id)?;
            }
        }
        debug!(id = id.0, name = new_name; "Element renamed");
        Ok(true)
    }

    /// Moves an element under `new_parent`.
    ///
    /// Returns `Ok(false)` without changing anything when the element is the
    /// root, the destination is a resource, the destination is the current
    /// parent, the element itself or one of its descendants, or already holds
    /// a same-kind sibling with the same name.
    pub fn change_parent(&mut self, id: ElementId, new_parent: ElementId) -> Result<bool, Error> {
        let element = self.element(id)?;
        let destination = self.element(new_parent)?;
        let Some(old_parent) = element.parent else {
            return Ok(false);
        };
        if destination.kind == ElementKind::Resource || old_parent == new_parent {
            return Ok(false);
        }
        if self.is_ancestor_or_self(id, new_parent)? {
            return Ok(false);
        }
        if self.contains(new_parent, &element.name, element.kind) {
            return Ok(false);
        }

        self.detach(id)?;
        self.attach(new_parent, id)?;
        debug!(id = id.0, from = old_parent.0, to = new_parent.0; "Element moved");
        Ok(true)
    }

    /// Removes an element and its subtree. The root cannot be removed.
    pub fn remove_element(&mut self, id: ElementId) -> Result<bool, Error> {
        if self.element(id)?.is_root() {
            return Ok(false);
        }
        self.detach(id)?;
        let freed = self.free_subtree(id);
        debug!(id = id.0, freed = freed; "Element removed");
        Ok(true)
    }

    /// Clears the categories and/or resources of a container.
    pub fn remove_childs(
        &mut self,
        id: ElementId,
        categories: bool,
        resources: bool,
    ) -> Result<(), Error> {
        let container = self.container(id)?;
        let mut removed: Vec<ElementId> = Vec::new();
        if categories {
            removed.extend(container.categories());
        }
        if resources {
            removed.extend(container.resources());
        }

        for child in &removed {
            self.free_subtree(*child);
        }
        if let Some(container) = self.element_mut(id)?.container_mut() {
            if categories {
                container.categories.clear();
            }
            if resources {
                container.resources.clear();
            }
            container.sync_flags();
        }
        Ok(())
    }

    /// Recomputes the derived comment of every resource.
    pub fn refresh_comments(&mut self) {
        let primary = self.primary_language.clone();
        for slot in self.nodes.iter_mut() {
            let Some(element) = slot.as_mut() else {
                continue;
            };
            let description = element.description.clone();
            if let Some(resource) = element.as_resource_mut() {
                resource.refresh_comment(primary.as_deref(), description.as_deref());
            }
        }
    }

    /// Recomputes the derived comment of one resource.
    pub fn refresh_comment(&mut self, id: ElementId) -> Result<(), Error> {
        let primary = self.primary_language.clone();
        let element = self.element_mut(id)?;
        let description = element.description.clone();
        let actual = element.kind;
        element
            .as_resource_mut()
            .ok_or(Error::WrongElementKind {
                id,
                expected: "resource",
                actual,
            })?
            .refresh_comment(primary.as_deref(), description.as_deref());
        Ok(())
    }

    /// Clears the scratch data of every element.
    pub fn clear_all_temp_data(&mut self) {
        for element in self.nodes.iter_mut().flatten() {
            element.clear_temp_data();
        }
    }

    // ---- traversal ---------------------------------------------------------

    /// Depth-first, pre-order walk. Within a container categories (each
    /// followed by its subtree) come before resources.
    ///
    /// The callback receives the id, the element and a `leaf` flag that is
    /// true for the last element handed out among the children of one
    /// container (and for the root). Returning `false` stops the walk
    /// immediately; `iterate_tree` then returns `false` as well.
    pub fn iterate_tree<F>(&self, options: &IterateOptions, mut callback: F) -> bool
    where
        F: FnMut(ElementId, &Element, bool) -> bool,
    {
        if options.model && !callback(ElementId::ROOT, self.root(), true) {
            return false;
        }
        self.iterate_children(ElementId::ROOT, options, &mut callback)
    }

    fn iterate_children<F>(&self, id: ElementId, options: &IterateOptions, callback: &mut F) -> bool
    where
        F: FnMut(ElementId, &Element, bool) -> bool,
    {
        let Some(container) = self.get(id).and_then(Element::as_container) else {
            return true;
        };
        let last = if options.resources && container.has_resources() {
            container.resources.last().copied()
        } else if options.categories {
            container.categories.last().copied()
        } else {
            None
        };

        for &category in &container.categories {
            let Some(element) = self.get(category) else {
                continue;
            };
            if options.categories && !callback(category, element, Some(category) == last) {
                return false;
            }
            if !self.iterate_children(category, options, callback) {
                return false;
            }
        }
        if options.resources {
            for &resource in &container.resources {
                let Some(element) = self.get(resource) else {
                    continue;
                };
                if !callback(resource, element, Some(resource) == last) {
                    return false;
                }
            }
        }
        true
    }

    // ---- branches ----------------------------------------------------------

    /// Detached copy of the subtree rooted at `id`.
    pub(crate) fn extract_branch(&self, id: ElementId) -> Result<Branch, Error> {
        let element = self.element(id)?;
        let mut branch = Branch {
            kind: element.kind,
            name: element.name.clone(),
            description: element.description.clone(),
            resource: element.as_resource().cloned(),
            categories: Vec::new(),
            resources: Vec::new(),
        };
        if let Some(container) = element.as_container() {
            for &child in &container.categories {
                branch.categories.push(self.extract_branch(child)?);
            }
            for &child in &container.resources {
                branch.resources.push(self.extract_branch(child)?);
            }
        }
        Ok(branch)
    }

    /// Inserts a branch under `parent`, optionally under a new name.
    /// A root branch is inserted as a category.
    pub(crate) fn insert_branch(
        &mut self,
        parent: ElementId,
        branch: Branch,
        name: Option<&str>,
    ) -> Result<ElementId, Error> {
        let kind = match branch.kind {
            ElementKind::Resource => ElementKind::Resource,
            ElementKind::Model | ElementKind::Category => ElementKind::Category,
        };
        let name = name.unwrap_or(branch.name.as_str());
        let id = self.add_element(parent, kind, name, branch.description)?;

        if let Some(resource) = branch.resource
            && let Some(body) = self.element_mut(id)?.as_resource_mut()
        {
            *body = resource;
        }
        for child in branch.categories.into_iter().chain(branch.resources) {
            self.insert_branch(id, child, None)?;
        }
        Ok(id)
    }

    // ---- central invariant bookkeeping -------------------------------------

    /// Inserts `id` into `parent`'s sorted collection before the first
    /// sibling whose name sorts after it, then refreshes flags and paths.
    fn attach(&mut self, parent: ElementId, id: ElementId) -> Result<(), Error> {
        let element = self.element(id)?;
        let kind = element.kind;
        let name = element.name.clone();

        let siblings = self.container(parent)?.children_of_kind(kind);
        let position = siblings
            .iter()
            .position(|&sibling| {
                self.get(sibling)
                    .is_some_and(|s| compare_names(&s.name, &name).is_gt())
            })
            .unwrap_or(siblings.len());

        if let Some(container) = self.element_mut(parent)?.container_mut() {
            container.children_of_kind_mut(kind).insert(position, id);
            container.sync_flags();
        }
        self.element_mut(id)?.parent = Some(parent);
        self.refresh_paths(id)?;
        trace!(id = id.0, parent = parent.0, position = position; "Element attached");
        Ok(())
    }

    /// Removes `id` from its parent's collection. The element keeps its
    /// slot; callers either re-attach or free it.
    fn detach(&mut self, id: ElementId) -> Result<(), Error> {
        let element = self.element(id)?;
        let kind = element.kind;
        let Some(parent) = element.parent else {
            return Ok(());
        };
        if let Some(container) = self.element_mut(parent)?.container_mut() {
            container.children_of_kind_mut(kind).retain(|&child| child != id);
            container.sync_flags();
        }
        self.element_mut(id)?.parent = None;
        Ok(())
    }

    /// Refreshes the cached path of `id` and of its whole subtree.
    fn refresh_paths(&mut self, id: ElementId) -> Result<(), Error> {
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            let element = self.element(current)?;
            let path = match element.parent {
                Some(parent) => {
                    let mut path = ElementPath::default();
                    path.refresh(self.element(parent)?.path(), &element.name);
                    path
                }
                None => ElementPath::root(&element.name),
            };
            if let Some(container) = element.as_container() {
                pending.extend(container.categories.iter().chain(container.resources.iter()));
            }
            self.element_mut(current)?.path = path;
        }
        Ok(())
    }

    fn is_ancestor_or_self(&self, ancestor: ElementId, id: ElementId) -> Result<bool, Error> {
        let mut current = Some(id);
        while let Some(candidate) = current {
            if candidate == ancestor {
                return Ok(true);
            }
            current = self.element(candidate)?.parent;
        }
        Ok(false)
    }

    /// Frees the slots of a detached subtree; returns how many were freed.
    fn free_subtree(&mut self, id: ElementId) -> usize {
        let mut freed = 0;
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            let Some(element) = self.nodes.get_mut(current.0).and_then(Option::take) else {
                continue;
            };
            if let ElementBody::Container(container) = element.body {
                pending.extend(container.categories);
                pending.extend(container.resources);
            }
            freed += 1;
        }
        freed
    }
}

pub(crate) fn validate_name(name: &str) -> Result<(), Error> {
    if name.trim().is_empty() {
        Err(Error::invalid_name(name))
    } else {
        Ok(())
    }
}
