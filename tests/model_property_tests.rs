use locmodel::element::compare_names;
use locmodel::{
    ElementId, ElementKind, Model, PropertyDefinition, PropertyType, Settings, SettingsMarshaller,
    TemplateCatalog, TemplateDefinition,
};
use proptest::prelude::*;
use std::cmp::Ordering;
use std::collections::BTreeSet;

fn name_strategy() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[A-Za-z][A-Za-z0-9_]{0,7}").expect("valid name regex")
}

fn value_strategy() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[A-Za-z0-9 _\\-\\.,!\\?]{1,30}").expect("valid value regex")
}

fn assert_sorted(model: &Model, ids: &[ElementId]) -> Result<(), TestCaseError> {
    for pair in ids.windows(2) {
        let left = model.element(pair[0]).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let right = model.element(pair[1]).map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_ne!(
            compare_names(left.name(), right.name()),
            Ordering::Greater,
            "{} sorted after {}",
            left.name(),
            right.name()
        );
    }
    Ok(())
}

fn folded(model: &Model, ids: &[ElementId]) -> Vec<String> {
    ids.iter()
        .filter_map(|&id| model.get(id))
        .map(|element| element.name().to_lowercase())
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn siblings_stay_sorted_and_unique(
        names in prop::collection::vec(name_strategy(), 1..24),
        renames in prop::collection::vec((0usize..24, name_strategy()), 0..8),
    ) {
        let mut model = Model::new("Root").map_err(|e| TestCaseError::fail(e.to_string()))?;
        let mut added = Vec::new();
        let mut expected = BTreeSet::new();
        for name in &names {
            match model.add_resource(ElementId::ROOT, name, None) {
                Ok(id) => {
                    prop_assert!(expected.insert(name.to_lowercase()));
                    added.push(id);
                }
                Err(_) => {
                    prop_assert!(expected.contains(&name.to_lowercase()));
                }
            }
        }

        for (index, new_name) in &renames {
            let id = added[index % added.len()];
            model.rename(id, new_name).map_err(|e| TestCaseError::fail(e.to_string()))?;
        }

        let resources = model
            .resources(ElementId::ROOT)
            .map_err(|e| TestCaseError::fail(e.to_string()))?
            .to_vec();
        prop_assert_eq!(resources.len(), added.len());
        assert_sorted(&model, &resources)?;

        let names = folded(&model, &resources);
        let unique: BTreeSet<_> = names.iter().cloned().collect();
        prop_assert_eq!(unique.len(), names.len());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn document_round_trip_preserves_values(
        entries in prop::collection::btree_map(
            (name_strategy(), name_strategy()),
            (value_strategy(), value_strategy()),
            1..10,
        ),
    ) {
        let mut model = Model::new("Root").map_err(|e| TestCaseError::fail(e.to_string()))?;
        model.add_language("en", true);
        model.add_language("fr", false);

        let mut written = 0;
        for ((category, resource), (en, fr)) in &entries {
            let parent = match model.find(ElementId::ROOT, category, ElementKind::Category) {
                Some(id) => id,
                None => model
                    .add_category(ElementId::ROOT, category, None)
                    .map_err(|e| TestCaseError::fail(e.to_string()))?,
            };
            if model.contains(parent, resource, ElementKind::Resource) {
                continue;
            }
            let id = model
                .add_resource(parent, resource, None)
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            let body = model.resource_mut(id).map_err(|e| TestCaseError::fail(e.to_string()))?;
            body.set_value("en", Some(en.clone()));
            body.set_value("fr", Some(fr.clone()));
            written += 1;
        }

        model.refresh_comments();
        let json = model.to_json_string().map_err(|e| TestCaseError::fail(e.to_string()))?;
        let reloaded = Model::from_json_str(&json).map_err(|e| TestCaseError::fail(e.to_string()))?;

        prop_assert_eq!(reloaded.uid(), model.uid());
        prop_assert_eq!(reloaded.len(), model.len());
        prop_assert_eq!(reloaded.resource_ids().len(), written);
        for id in model.resource_ids() {
            let element = model.element(id).map_err(|e| TestCaseError::fail(e.to_string()))?;
            let path = element.path().clone_path(false);
            let twin = reloaded
                .element_by_path(ElementId::ROOT, &path, ElementKind::Resource)
                .ok_or_else(|| TestCaseError::fail(format!("missing {}", element.path())))?;
            let original = model.resource(id).map_err(|e| TestCaseError::fail(e.to_string()))?;
            let copy = reloaded.resource(twin).map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(original.values(), copy.values());
            prop_assert_eq!(original.comment(), copy.comment());
        }
    }
}

fn settings_catalog() -> TemplateCatalog {
    TemplateCatalog::new().with_template(
        TemplateDefinition::new("generator").with_group(
            "output",
            vec![
                PropertyDefinition::new("name", PropertyType::String),
                PropertyDefinition::new("enabled", PropertyType::Boolean).with_default(true),
                PropertyDefinition::new("indent", PropertyType::Number).with_default(4.0),
            ],
        ),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn settings_survive_node_round_trip(
        name in name_strategy(),
        enabled in any::<bool>(),
        indent in 0u32..64,
    ) {
        let catalog = settings_catalog();
        let marshaller = SettingsMarshaller::new(&catalog);

        let mut settings = Settings::new();
        let group = settings.entry("output".to_string()).or_default();
        group.insert("name".to_string(), name.as_str().into());
        group.insert("enabled".to_string(), enabled.into());
        group.insert("indent".to_string(), f64::from(indent).into());

        let node = marshaller
            .settings_to_node("generator", &settings)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let back = marshaller
            .node_to_settings("generator", &node)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(&back, &settings);

        let violation = marshaller
            .validate_settings("generator", &back)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert!(violation.is_none());
    }
}
