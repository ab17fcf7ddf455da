#![no_main]
use libfuzzer_sys::fuzz_target;
use nexus_search::{FieldType, ModelSchema};

fuzz_target!(|data: &[u8]| {
    if data.len() > 8192 { return; }
    if let Ok(s) = std::str::from_utf8(data) {
        let Ok(schema) = ModelSchema::builder("Fuzz")
            .id("seq", FieldType::Number)
            .sortable("name", FieldType::String)
            .field("born", FieldType::Date)
            .field("vip", FieldType::Boolean)
            .build()
        else {
            return;
        };
        // Parsing and translation should never panic
        if let Ok(filter) = nexus_search::query::parse_filter_json(s, &schema) {
            let _ = nexus_search::query::QueryBuilder::new(&schema, "fuzz", 10_000).build(&filter);
        }
    }
});
