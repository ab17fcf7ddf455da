use super::common::obj;
use nexus_search::{ConnectorConfig, ConnectorError, FieldType, ModelSchema, RefreshPolicy, in_memory};
use serde_json::json;
use std::collections::HashMap;
use std::io::Write;

const USER_TOML: &str = r#"
[connector]
index_prefix = "test"
refresh = true
default_limit = 2

[model]
name = "User"

[model.fields]
seq = { type = "number", id = true }
name = { type = "string", sort = true }
birthday = { type = "date" }
"#;

#[test]
fn one_file_holds_model_and_connector() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(USER_TOML.as_bytes()).unwrap();

    let schema = ModelSchema::from_toml_path(file.path()).unwrap();
    assert_eq!(schema.id_field(), "seq");
    assert_eq!(schema.field_type("birthday"), FieldType::Date);
    assert!(schema.is_sortable("name"));

    let cfg = ConnectorConfig::load(Some(file.path())).unwrap();
    assert_eq!(cfg.refresh, RefreshPolicy::True);
    assert_eq!(cfg.default_limit, Some(2));
    assert_eq!(cfg.index_for(&schema), "test_user");
}

#[test]
fn schema_files_need_exactly_one_identifier() {
    let none = "[model]\nname = \"A\"\n[model.fields]\nx = { type = \"string\" }\n";
    assert!(matches!(ModelSchema::from_toml_str(none), Err(ConnectorError::Validation(_))));
    let two = "[model]\nname = \"A\"\n[model.fields]\nx = { type = \"string\", id = true }\ny = { type = \"number\", id = true }\n";
    assert!(matches!(ModelSchema::from_toml_str(two), Err(ConnectorError::Validation(_))));
    let bad_type = "[model]\nname = \"A\"\n[model.fields]\nx = { type = \"blob\", id = true }\n";
    assert!(matches!(ModelSchema::from_toml_str(bad_type), Err(ConnectorError::Config(_))));
}

#[test]
fn unknown_connector_keys_are_rejected() {
    let err = ConnectorConfig::from_toml_str("[connector]\nshards = 3\n").unwrap_err();
    assert!(matches!(err, ConnectorError::Config(_)));
    assert!(ConnectorConfig::from_toml_str("[connector]\nrefresh = \"sometimes\"\n").is_err());
    assert!(ConnectorConfig::from_toml_str("[connector]\nupsert_attempts = 0\n").is_err());
}

#[test]
fn environment_overrides_file_values() {
    let mut cfg = ConnectorConfig::from_toml_str(USER_TOML).unwrap();
    let env: HashMap<&str, &str> = [
        ("NEXUS_SEARCH_REFRESH", "wait_for"),
        ("NEXUS_SEARCH_NODES", "http://a:9200, http://b:9200"),
        ("NEXUS_SEARCH_UPSERT_ATTEMPTS", "5"),
    ]
    .into_iter()
    .collect();
    cfg.apply_overrides(|k| env.get(k).map(|v| (*v).to_string())).unwrap();
    assert_eq!(cfg.refresh, RefreshPolicy::WaitFor);
    assert_eq!(cfg.nodes, ["http://a:9200", "http://b:9200"]);
    assert_eq!(cfg.upsert_attempts, 5);
    assert_eq!(cfg.index_prefix, "test");

    let err = cfg.apply_overrides(|k| (k == "NEXUS_SEARCH_MAX_RESULT_WINDOW").then(|| "lots".to_string()));
    assert!(matches!(err, Err(ConnectorError::Config(_))));
}

#[test]
fn missing_explicit_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ConnectorConfig::load(Some(dir.path().join("absent.toml").as_path())).unwrap_err();
    assert!(matches!(err, ConnectorError::Config(_)));
}

#[tokio::test]
async fn configured_default_limit_applies_to_finds() {
    let schema = ModelSchema::from_toml_str(USER_TOML).unwrap();
    let cfg = ConnectorConfig::from_toml_str(USER_TOML).unwrap();
    let c = in_memory(schema, cfg).unwrap();
    assert_eq!(c.index(), "test_user");
    for seq in 0..4 {
        c.create(obj(json!({"seq": seq, "name": format!("n{seq}")}))).await.unwrap();
    }
    // refresh = true: visible without polling
    assert_eq!(c.find(&c.filter(&json!({})).unwrap()).await.unwrap().len(), 2);
    assert_eq!(c.find(&c.filter(&json!({"limit": 3})).unwrap()).await.unwrap().len(), 3);
}
