use indoc::indoc;
use locmodel::settings::REQUIRED_MESSAGE;
use locmodel::traits::Parser;
use locmodel::{
    ElementId, ElementKind, ImportOptions, ImportRow, Model, Node, SettingValue,
    SettingsMarshaller, TemplateCatalog, import_rows,
};
use std::fs;

const TEMPLATES: &str = indoc! {r#"
    [
      {
        "id": "android",
        "name": "Android resources",
        "settings": {
          "output": [
            { "name": "package", "type": "string",
              "validators": [ { "regex": "^[a-z][a-z0-9_]*(\\.[a-z][a-z0-9_]*)+$", "message": "Invalid package" } ] },
            { "name": "splitFiles", "type": "boolean", "default": false },
            { "name": "plurals", "type": "list", "values": ["none", "icu"], "default": "none" }
          ],
          "comments": [
            { "name": "maxWidth", "type": "number", "default": 80, "required": false }
          ]
        }
      }
    ]
"#};

const SETTINGS_XML: &str = indoc! {r#"
    <settings>
      <output package="com.example.shop" splitFiles="true" plurals="gettext"/>
      <legacy enabled="true"/>
    </settings>
"#};

#[test]
fn test_catalog_file_drives_marshalling() {
    let tmp = tempfile::tempdir().expect("create temp dir");
    let path = tmp.path().join("templates.json");
    fs::write(&path, TEMPLATES).expect("write templates");

    let catalog = TemplateCatalog::read_from(&path).expect("load catalog");
    assert_eq!(catalog.len(), 1);
    let marshaller = SettingsMarshaller::new(&catalog);

    let node = Node::from_xml_str(SETTINGS_XML).expect("parse settings xml");
    let settings = marshaller.node_to_settings("android", &node).unwrap();
    assert_eq!(settings.len(), 1);
    let output = &settings["output"];
    assert_eq!(
        output.get("package"),
        Some(&SettingValue::String("com.example.shop".to_string()))
    );
    assert_eq!(output.get("splitFiles"), Some(&SettingValue::Bool(true)));
    assert_eq!(
        output.get("plurals"),
        Some(&SettingValue::String("none".to_string()))
    );
    assert_eq!(marshaller.validate_settings("android", &settings).unwrap(), None);

    let mut broken = settings.clone();
    broken["output"].insert("package".to_string(), "Shop".into());
    let violation = marshaller
        .validate_settings("android", &broken)
        .unwrap()
        .expect("violation");
    assert_eq!(violation.property, "package");
    assert_eq!(violation.message, "Invalid package");

    broken["output"].insert("package".to_string(), "".into());
    let violation = marshaller
        .validate_settings("android", &broken)
        .unwrap()
        .expect("violation");
    assert_eq!(violation.message, REQUIRED_MESSAGE);
}

#[test]
fn test_default_settings_written_as_xml() {
    let catalog = TemplateCatalog::from_str(TEMPLATES).expect("load catalog");
    let marshaller = SettingsMarshaller::new(&catalog);

    let defaults = marshaller.default_settings("android").unwrap();
    assert_eq!(defaults.len(), 2);
    assert!(defaults["output"].get("package").is_none());
    assert_eq!(defaults["comments"].get("maxWidth"), Some(&SettingValue::Number(80.0)));

    let xml = marshaller
        .settings_to_node("android", &defaults)
        .unwrap()
        .to_xml_string()
        .unwrap();
    let reparsed = Node::from_xml_str(&xml).unwrap();
    assert_eq!(reparsed.child("output").and_then(|n| n.attr("plurals")), Some("none"));
    assert_eq!(reparsed.child("comments").and_then(|n| n.attr("maxWidth")), Some("80"));
}

#[test]
fn test_import_rows_from_csv_file() {
    let tmp = tempfile::tempdir().expect("create temp dir");
    let path = tmp.path().join("rows.csv");
    fs::write(
        &path,
        indoc! {r#"
            Checkout/Total,en,Total
            Checkout/Total,de,Summe
            "Checkout/Pay now",en,"Pay, now"
        "#},
    )
    .expect("write rows");

    let rows = Vec::<ImportRow>::read_from(&path).expect("read rows");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2], ImportRow::new("Checkout/Pay now", "en", "Pay, now"));

    let mut target = Model::new("Shop").unwrap();
    target.add_language("en", true);
    let checkout = target.add_category(ElementId::ROOT, "Checkout", None).unwrap();
    target.add_resource(checkout, "Total", None).unwrap();

    let options = ImportOptions::new()
        .with_new_elements(true)
        .with_new_languages(true);
    let report = import_rows(&mut target, &rows, &options).unwrap();
    assert_eq!(report.new_languages, 1);
    assert_eq!(report.new_resources, 1);
    assert_eq!(report.updated_resources, 1);

    let pay = target
        .element_by_path_str("Checkout/Pay now", "/", ElementKind::Resource)
        .expect("imported resource");
    assert_eq!(target.resource(pay).unwrap().get_value("en", false), Some("Pay, now"));

    let out = tmp.path().join("rows-out.csv");
    rows.write_to(&out).expect("write rows");
    assert_eq!(Vec::<ImportRow>::read_from(&out).unwrap(), rows);
}
